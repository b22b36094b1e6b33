//! Session context: the explicit owner of all per-session replication state.
//!
//! A [`Session`] is created when a cooperative session starts and dropped
//! when it ends. It holds the role, the world object mirror, the outbound
//! queue and the deconstruction tracker, and is passed into every handler.
//! Nothing here is global.
//!
//! # Example
//!
//! ```
//! use coop_core::config::SessionConfig;
//! use coop_core::outbound::LoopbackTransport;
//! use coop_core::role::Role;
//! use coop_core::session::Session;
//!
//! let (transport, _peer) = LoopbackTransport::channel();
//! let mut session = Session::new(Role::Client, SessionConfig::default(), 1, Box::new(transport));
//!
//! assert!(session.role().is_client());
//! session.tick();
//! assert_eq!(session.current_tick(), 1);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::capability::{GameWorld, CAPABILITY_VERSION};
use crate::config::SessionConfig;
use crate::deconstruct::{DeconstructOutcome, DeconstructionTracker};
use crate::error::{Result, SyncError};
use crate::message::{decode_frame, Message, MessageWorldObject};
use crate::mirror::WorldObjectMirror;
use crate::outbound::{OutboundQueue, Transport};
use crate::role::Role;
use crate::world::{GameObjectHandle, InventoryId, WorldObject, WorldObjectId};

/// Counters describing what a session has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames handed to [`Session::receive_frame`].
    pub frames_received: u64,
    /// Frames discarded as undecodable or from a foreign protocol version.
    pub frames_rejected: u64,
    /// Messages whose handler completed.
    pub messages_applied: u64,
    /// Recovered conditions that were logged and skipped.
    pub warnings: u64,
    /// Refund items that went into the local inventory.
    pub refunds_placed: u64,
    /// Refund items dropped on the floor.
    pub refunds_dropped: u64,
}

/// What a received message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A world object snapshot was applied.
    WorldObject {
        /// The replicated id.
        id: WorldObjectId,
        /// Whether a new local object was instantiated for it.
        created: bool,
    },
    /// A deconstruction message was handled.
    Deconstruct(DeconstructOutcome),
}

/// Result of one [`Session::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// The tick just entered.
    pub tick: u64,
    /// Frames flushed to the transport.
    pub flushed: usize,
    /// Client requests still waiting for the host.
    pub awaiting_reply: usize,
}

/// Replication state owned by one process for one session.
#[derive(Debug)]
pub struct Session {
    pub(crate) role: Role,
    pub(crate) config: SessionConfig,
    pub(crate) mirror: WorldObjectMirror,
    pub(crate) outbound: OutboundQueue,
    pub(crate) local_inventory: InventoryId,
    pub(crate) tracker: DeconstructionTracker,
    /// Refund items already resolved into an inventory or onto the floor.
    pub(crate) credited: HashSet<WorldObjectId>,
    pub(crate) tick: u64,
    pub(crate) stats: SessionStats,
}

impl Session {
    /// Start a session.
    ///
    /// `local_inventory` is the carried inventory of the local player, the
    /// destination of refunds credited to this process.
    #[must_use]
    pub fn new(
        role: Role,
        config: SessionConfig,
        local_inventory: InventoryId,
        transport: Box<dyn Transport>,
    ) -> Self {
        tracing::info!(%role, local_inventory, "session started");
        let outbound = OutboundQueue::new(config.protocol_version, transport);
        Self {
            role,
            config,
            mirror: WorldObjectMirror::new(),
            outbound,
            local_inventory,
            tracker: DeconstructionTracker::new(),
            credited: HashSet::new(),
            tick: 0,
            stats: SessionStats::default(),
        }
    }

    /// Role of this process.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The world object mirror.
    #[must_use]
    pub const fn mirror(&self) -> &WorldObjectMirror {
        &self.mirror
    }

    /// Mutable access to the mirror, for local-only bind/unbind.
    pub fn mirror_mut(&mut self) -> &mut WorldObjectMirror {
        &mut self.mirror
    }

    /// The local player's carried inventory.
    #[must_use]
    pub const fn local_inventory(&self) -> InventoryId {
        self.local_inventory
    }

    /// In-flight deconstructions.
    #[must_use]
    pub const fn tracker(&self) -> &DeconstructionTracker {
        &self.tracker
    }

    /// Session counters.
    #[must_use]
    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Messages produced but not yet flushed.
    #[must_use]
    pub fn pending_messages(&self) -> &[Message] {
        self.outbound.pending()
    }

    /// Refuse engines implementing another capability contract.
    pub fn ensure_capability<W: GameWorld + ?Sized>(&self, world: &W) -> Result<()> {
        let version = world.capability_version();
        if version != CAPABILITY_VERSION {
            return Err(SyncError::InvalidState(format!(
                "GameWorld capability version {version}, expected {CAPABILITY_VERSION}"
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Local bookkeeping
    // ------------------------------------------------------------------------

    /// Track a world object created by normal gameplay, optionally binding
    /// its representation.
    pub fn register(
        &mut self,
        object: WorldObject,
        game_object: Option<GameObjectHandle>,
    ) -> Result<()> {
        let id = object.id;
        self.mirror.track(object);
        if let Some(go) = game_object {
            self.mirror.bind(id, go)?;
        }
        Ok(())
    }

    /// Queue a snapshot of a tracked object for the client. Host only.
    pub fn replicate(&mut self, id: WorldObjectId) -> Result<()> {
        if !self.role.is_host() {
            return Err(SyncError::RoleViolation {
                role: self.role,
                message: "SendWorldObject".to_string(),
            });
        }
        let object = self
            .mirror
            .lookup(id)
            .ok_or(SyncError::UnknownWorldObject(id))?;
        self.outbound.enqueue(MessageWorldObject::from(object));
        Ok(())
    }

    /// Queue a message for the peer.
    pub fn send(&mut self, message: impl Into<Message>) {
        self.outbound.enqueue(message);
    }

    /// Hand every queued message to the transport.
    pub fn flush(&mut self) -> usize {
        self.outbound.flush()
    }

    /// Flush now if the config asks handlers to.
    pub(crate) fn signal(&mut self) {
        if self.config.flush_on_send {
            self.outbound.flush();
        }
    }

    /// Advance one tick: flush coalesced messages and report waiting requests.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let flushed = self.outbound.flush();
        let awaiting_reply = self.tracker.awaiting_reply().len();
        if flushed > 0 {
            tracing::debug!(tick = self.tick, flushed, "tick flushed outbound messages");
        }
        TickReport {
            tick: self.tick,
            flushed,
            awaiting_reply,
        }
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Decode and apply one frame from the peer.
    ///
    /// Undecodable frames are logged and discarded; the session continues.
    pub fn receive_frame<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        frame: &[u8],
    ) -> Result<Received> {
        self.stats.frames_received += 1;
        let message = match decode_frame(self.config.protocol_version, frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.frames_rejected += 1;
                tracing::warn!("receive_frame: discarding frame of {} bytes: {}", frame.len(), e);
                return Err(e);
            }
        };
        self.receive(world, message)
    }

    /// Apply one decoded message from the peer.
    pub fn receive<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: Message,
    ) -> Result<Received> {
        self.ensure_capability(world)?;

        let (handler, result) = match message {
            Message::WorldObject(mwo) => (
                "ReceiveMessageWorldObject",
                self.apply_world_object(world, &mwo)
                    .map(|created| Received::WorldObject { id: mwo.id, created }),
            ),
            Message::Deconstruct(md) => (
                "ReceiveMessageDeconstruct",
                self.receive_deconstruct(world, md).map(Received::Deconstruct),
            ),
        };

        match &result {
            Ok(_) => self.stats.messages_applied += 1,
            Err(e) => {
                self.stats.warnings += 1;
                tracing::warn!("{handler}: {e}");
            }
        }
        result
    }

    /// Upsert a replicated world object. Client only.
    ///
    /// Returns `true` when a new local object was instantiated.
    fn apply_world_object<W: GameWorld + ?Sized>(
        &mut self,
        world: &mut W,
        message: &MessageWorldObject,
    ) -> Result<bool> {
        if !self.role.is_client() {
            return Err(SyncError::RoleViolation {
                role: self.role,
                message: "MessageWorldObject".to_string(),
            });
        }
        if self.mirror.is_destroyed(message.id) {
            return Err(SyncError::AlreadyDestroyed(message.id));
        }

        if let Some(object) = self.mirror.lookup_mut(message.id) {
            message.apply_to(object);
            return Ok(false);
        }

        let mut object = world.create_world_object(&message.group, message.id)?;
        if object.id != message.id {
            return Err(SyncError::InvalidState(format!(
                "world assigned id {} while mirroring {}",
                object.id, message.id
            )));
        }
        message.apply_to(&mut object);
        tracing::debug!("ReceiveMessageWorldObject: created {}", object);
        self.mirror.track(object);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3Fixed;
    use crate::message::{encode_frame, MessageDeconstruct, PROTOCOL_VERSION};
    use crate::outbound::{LoopbackEndpoint, LoopbackTransport};
    use crate::sandbox::SandboxWorld;
    use crate::world::{Group, GroupCatalog, GroupId};

    fn session(role: Role) -> (Session, LoopbackEndpoint) {
        let (transport, endpoint) = LoopbackTransport::channel();
        (
            Session::new(role, SessionConfig::default(), 1, Box::new(transport)),
            endpoint,
        )
    }

    fn world() -> SandboxWorld {
        SandboxWorld::new(GroupCatalog::from_groups([Group::item("Iron", "Iron")]))
    }

    fn snapshot(id: WorldObjectId) -> MessageWorldObject {
        let object = WorldObject::new(id, GroupId::new("Iron")).at(Vec3Fixed::from_ints(1, 0, 1));
        MessageWorldObject::from(&object)
    }

    #[test]
    fn test_client_creates_mirrored_object_with_explicit_id() {
        let (mut client, _) = session(Role::Client);
        let mut world = world();

        let received = client.receive(&mut world, snapshot(77).into()).unwrap();

        assert_eq!(received, Received::WorldObject { id: 77, created: true });
        let mirrored = client.mirror().lookup(77).unwrap();
        assert_eq!(mirrored.position, Vec3Fixed::from_ints(1, 0, 1));
        assert!(world.is_live(77));
    }

    #[test]
    fn test_world_object_sync_is_idempotent() {
        let (mut client, _) = session(Role::Client);
        let mut world = world();

        client.receive(&mut world, snapshot(77).into()).unwrap();
        let again = client.receive(&mut world, snapshot(77).into()).unwrap();

        assert_eq!(again, Received::WorldObject { id: 77, created: false });
        assert_eq!(client.mirror().len(), 1);
        assert_eq!(world.live_count(), 1);
    }

    #[test]
    fn test_host_rejects_world_object_sync() {
        let (mut host, _) = session(Role::Host);
        let mut world = world();

        let err = host.receive(&mut world, snapshot(1).into()).unwrap_err();

        assert!(matches!(err, SyncError::RoleViolation { role: Role::Host, .. }));
        assert_eq!(host.stats().warnings, 1);
        assert!(host.mirror().is_empty());
    }

    #[test]
    fn test_malformed_frame_is_discarded() {
        let (mut client, _) = session(Role::Client);
        let mut world = world();

        let err = client.receive_frame(&mut world, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SyncError::MalformedMessage(_)));

        // session keeps working afterwards
        let frame = encode_frame(PROTOCOL_VERSION, &snapshot(5).into()).unwrap();
        assert!(client.receive_frame(&mut world, &frame).is_ok());
        assert_eq!(client.stats().frames_received, 2);
        assert_eq!(client.stats().frames_rejected, 1);
        assert_eq!(client.stats().messages_applied, 1);
    }

    #[test]
    fn test_replicate_is_host_only() {
        let (mut client, _) = session(Role::Client);
        client.register(WorldObject::new(3, GroupId::new("Iron")), None).unwrap();
        assert!(matches!(
            client.replicate(3),
            Err(SyncError::RoleViolation { .. })
        ));

        let (mut host, endpoint) = session(Role::Host);
        host.register(WorldObject::new(3, GroupId::new("Iron")), None).unwrap();
        host.replicate(3).unwrap();
        assert_eq!(host.pending_messages().len(), 1);
        assert_eq!(host.replicate(4), Err(SyncError::UnknownWorldObject(4)));

        host.flush();
        assert_eq!(endpoint.in_flight(), 1);
    }

    #[test]
    fn test_tick_flushes_coalesced_messages() {
        let (transport, endpoint) = LoopbackTransport::channel();
        let config = SessionConfig {
            flush_on_send: false,
            ..SessionConfig::default()
        };
        let mut session = Session::new(Role::Client, config, 1, Box::new(transport));
        session.send(MessageDeconstruct::request(1));
        session.send(MessageDeconstruct::request(2));
        assert_eq!(endpoint.in_flight(), 0);

        let report = session.tick();
        assert_eq!(report.tick, 1);
        assert_eq!(report.flushed, 2);
        assert_eq!(endpoint.in_flight(), 2);
    }
}
