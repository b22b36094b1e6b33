//! Error types for the replication core.
//!
//! Every variant here is recoverable at the session level: the offending
//! message (or batch entry) is logged and discarded, the session keeps going.

use thiserror::Error;

use crate::role::Role;
use crate::world::WorldObjectId;

/// Result type alias using [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type for the replication core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A message referenced an identifier absent from the local mirror.
    #[error("Unknown WorldObject {0}")]
    UnknownWorldObject(WorldObjectId),

    /// The WorldObject is known but has no live representation bound.
    #[error("Unknown GameObject for WorldObject {0}")]
    UnknownGameObject(WorldObjectId),

    /// The WorldObject was already destroyed by this process.
    #[error("Unknown WorldObject {0} (already destroyed)")]
    AlreadyDestroyed(WorldObjectId),

    /// A frame could not be decoded.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A frame was produced by a peer speaking another protocol version.
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolVersionMismatch {
        /// Version this session speaks.
        expected: u32,
        /// Version stamped on the frame.
        actual: u32,
    },

    /// A message arrived that this role must never handle.
    #[error("{message} is not valid for role {role}")]
    RoleViolation {
        /// Role of the receiving session.
        role: Role,
        /// Description of the rejected message.
        message: String,
    },

    /// A group identifier is not present in the catalog.
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// Configuration could not be loaded.
    #[error("Failed to load config '{path}': {message}")]
    ConfigError {
        /// Path of the config file.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid internal state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SyncError {
    /// Whether the error stems from an identifier the mirror cannot resolve.
    #[must_use]
    pub const fn is_unresolved_id(&self) -> bool {
        matches!(
            self,
            Self::UnknownWorldObject(_) | Self::UnknownGameObject(_) | Self::AlreadyDestroyed(_)
        )
    }
}
