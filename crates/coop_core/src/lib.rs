//! # Coop Core
//!
//! Host-authoritative replication of structure deconstruction and material
//! refunds between the two processes of a cooperative session.
//!
//! The host owns world state. A client that deconstructs a structure only
//! asks; the host destroys it, materializes the refunded ingredients as
//! world objects, replicates them and answers with their identifiers. The
//! client then credits the refund to its own player's inventory.
//!
//! This crate contains **only** the replication logic:
//! - No transport (frames are handed to a [`outbound::Transport`])
//! - No engine (services come through [`capability::GameWorld`])
//! - No global state (everything lives in a [`session::Session`])
//!
//! ## Crate Structure
//!
//! - [`session`] - Per-session context and message dispatch
//! - [`deconstruct`] - Deconstruction request/authority/refund protocol
//! - [`mirror`] - Identifier to local state index
//! - [`message`] - Protocol messages and frame codec
//! - [`outbound`] - Outbound queue and the transport seam
//! - [`hooks`] - Interception of engine actions
//! - [`inventory`] - Inventories and refund placement
//! - [`sandbox`] - In-memory engine for tests and headless runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod capability;
pub mod config;
pub mod deconstruct;
pub mod error;
pub mod hooks;
pub mod inventory;
pub mod math;
pub mod message;
pub mod mirror;
pub mod outbound;
pub mod role;
pub mod sandbox;
pub mod session;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capability::{GameWorld, CAPABILITY_VERSION};
    pub use crate::config::SessionConfig;
    pub use crate::deconstruct::{
        compute_refund, DeconstructOutcome, DeconstructPhase, DeconstructionTracker,
    };
    pub use crate::error::{Result, SyncError};
    pub use crate::hooks::{ActionEvent, HookDecision, HookRegistry};
    pub use crate::inventory::{
        Inventory, InformationKind, Notification, RefundPlacement, ResolvedRefund,
    };
    pub use crate::math::{Fixed, Vec3Fixed};
    pub use crate::message::{
        DeconstructOrigin, Message, MessageDeconstruct, MessageWorldObject, PROTOCOL_VERSION,
    };
    pub use crate::mirror::{Resolution, WorldObjectMirror};
    pub use crate::outbound::{LoopbackEndpoint, LoopbackTransport, OutboundQueue, Transport};
    pub use crate::role::Role;
    pub use crate::sandbox::SandboxWorld;
    pub use crate::session::{Received, Session, SessionStats, TickReport};
    pub use crate::world::{
        GameObjectHandle, Group, GroupCatalog, GroupId, InventoryId, Recipe, WorldObject,
        WorldObjectId,
        FRESH_ID,
    };
}
