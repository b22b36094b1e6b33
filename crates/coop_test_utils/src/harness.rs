//! Paired host/client sessions connected over an in-process loopback.
//!
//! [`CoopPair`] owns both processes of a cooperative session: each side has
//! its own [`Session`] and [`SandboxWorld`], and frames only cross through
//! the loopback pipes. Delivery is explicit so tests can interleave, drop or
//! duplicate frames to exercise the failure paths.

use std::collections::BTreeMap;

use coop_core::capability::GameWorld;
use coop_core::config::SessionConfig;
use coop_core::error::Result;
use coop_core::hooks::{ActionEvent, HookDecision, HookRegistry};
use coop_core::math::Vec3Fixed;
use coop_core::message::{decode_frame, Message};
use coop_core::outbound::{LoopbackEndpoint, LoopbackTransport};
use coop_core::role::Role;
use coop_core::sandbox::SandboxWorld;
use coop_core::session::{Received, Session};
use coop_core::world::{GroupCatalog, GroupId, InventoryId, WorldObject, WorldObjectId, FRESH_ID};

use crate::fixtures::group_counts;

pub use coop_core::sandbox::{CLIENT_INVENTORY, HOST_INVENTORY};

/// Default inventory capacity of both players.
pub const DEFAULT_CAPACITY: usize = 32;

/// One side of the pair.
#[derive(Debug)]
pub struct Peer {
    /// Replication state.
    pub session: Session,
    /// Engine state.
    pub world: SandboxWorld,
    /// Frames sent to this peer and not yet delivered.
    inbox: LoopbackEndpoint,
}

impl Peer {
    fn new(
        role: Role,
        config: SessionConfig,
        catalog: GroupCatalog,
        inventory: InventoryId,
        capacity: usize,
        outbox: LoopbackTransport,
        inbox: LoopbackEndpoint,
    ) -> Self {
        let mut world = SandboxWorld::new(catalog);
        world.add_inventory(inventory, capacity);
        Self {
            session: Session::new(role, config, inventory, Box::new(outbox)),
            world,
            inbox,
        }
    }

    /// Frames waiting for delivery to this peer.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inbox.in_flight()
    }

    /// Groups of every item this peer's player received, inventory first,
    /// then floor.
    #[must_use]
    pub fn received_groups(&self) -> Vec<GroupId> {
        let inventory = self
            .world
            .inventory(self.session.local_inventory())
            .map(|inv| inv.items().to_vec())
            .unwrap_or_default();
        let floor = self.world.floor().iter().map(|(id, _)| *id);
        inventory
            .into_iter()
            .chain(floor)
            .filter_map(|id| self.world.live_object(id).map(|wo| wo.group.clone()))
            .collect()
    }
}

/// Host and client of one cooperative session.
#[derive(Debug)]
pub struct CoopPair {
    /// The authoritative process.
    pub host: Peer,
    /// The requesting process.
    pub client: Peer,
    hooks: HookRegistry<SandboxWorld>,
    last_to_client: Option<Vec<u8>>,
    last_to_host: Option<Vec<u8>>,
}

impl CoopPair {
    /// Create a pair with default config and inventory capacity.
    #[must_use]
    pub fn new(catalog: GroupCatalog) -> Self {
        Self::with_capacities(catalog, DEFAULT_CAPACITY, DEFAULT_CAPACITY)
    }

    /// Create a pair with explicit inventory capacities.
    #[must_use]
    pub fn with_capacities(
        catalog: GroupCatalog,
        host_capacity: usize,
        client_capacity: usize,
    ) -> Self {
        Self::with_config(catalog, SessionConfig::default(), host_capacity, client_capacity)
    }

    /// Create a pair sharing one session config.
    #[must_use]
    pub fn with_config(
        catalog: GroupCatalog,
        config: SessionConfig,
        host_capacity: usize,
        client_capacity: usize,
    ) -> Self {
        let (host_out, client_in) = LoopbackTransport::channel();
        let (client_out, host_in) = LoopbackTransport::channel();
        Self {
            host: Peer::new(
                Role::Host,
                config.clone(),
                catalog.clone(),
                HOST_INVENTORY,
                host_capacity,
                host_out,
                host_in,
            ),
            client: Peer::new(
                Role::Client,
                config,
                catalog,
                CLIENT_INVENTORY,
                client_capacity,
                client_out,
                client_in,
            ),
            hooks: HookRegistry::with_core_hooks(),
            last_to_client: None,
            last_to_host: None,
        }
    }

    /// Build a structure on the host, replicate it and bind the client's
    /// representation.
    ///
    /// # Panics
    ///
    /// Panics if the group is unknown or the client cannot mirror it.
    pub fn spawn_structure(
        &mut self,
        group: &str,
        position: Vec3Fixed,
        panels: &[&str],
        from_scene: bool,
    ) -> WorldObjectId {
        let id = self.spawn_host_only(group, position, panels, from_scene);

        self.host.session.replicate(id).expect("host replicates");
        self.host.session.flush();
        for result in self.deliver_to_client() {
            result.expect("client mirrors structure");
        }

        let panels: Vec<GroupId> = panels.iter().map(|p| GroupId::new(*p)).collect();
        let go = self.client.world.spawn_game_object(position, panels, from_scene);
        self.client
            .session
            .mirror_mut()
            .bind(id, go)
            .expect("client binds structure");
        id
    }

    /// Build a structure on the host without telling the client.
    ///
    /// # Panics
    ///
    /// Panics if the group is unknown.
    pub fn spawn_host_only(
        &mut self,
        group: &str,
        position: Vec3Fixed,
        panels: &[&str],
        from_scene: bool,
    ) -> WorldObjectId {
        let mut object: WorldObject = self
            .host
            .world
            .create_world_object(&GroupId::new(group), FRESH_ID)
            .expect("structure group in catalog");
        object.position = position;
        object.dont_save = from_scene;
        let id = object.id;

        let panels: Vec<GroupId> = panels.iter().map(|p| GroupId::new(*p)).collect();
        let go = self.host.world.spawn_game_object(position, panels, from_scene);
        self.host
            .session
            .register(object, Some(go))
            .expect("host registers structure");
        id
    }

    /// The client player finishes deconstructing `target`.
    pub fn client_deconstruct(&mut self, target: WorldObjectId) -> HookDecision {
        let event = ActionEvent::DeconstructFinalize { target };
        self.hooks
            .dispatch_before(&mut self.client.session, &mut self.client.world, &event)
    }

    /// The host player finishes deconstructing `target`.
    pub fn host_deconstruct(&mut self, target: WorldObjectId) -> HookDecision {
        let event = ActionEvent::DeconstructFinalize { target };
        self.hooks
            .dispatch_before(&mut self.host.session, &mut self.host.world, &event)
    }

    /// Deliver every frame in flight to the client.
    pub fn deliver_to_client(&mut self) -> Vec<Result<Received>> {
        let frames = self.client.inbox.drain();
        if let Some(last) = frames.last() {
            self.last_to_client = Some(last.clone());
        }
        frames
            .iter()
            .map(|frame| self.client.session.receive_frame(&mut self.client.world, frame))
            .collect()
    }

    /// Deliver the oldest frame in flight to the client.
    pub fn deliver_one_to_client(&mut self) -> Option<Result<Received>> {
        let frame = self.client.inbox.recv()?;
        let result = self.client.session.receive_frame(&mut self.client.world, &frame);
        self.last_to_client = Some(frame);
        Some(result)
    }

    /// Decode the oldest frame headed to the client without delivering it.
    pub fn peek_next_to_client(&self) -> Option<Result<Message>> {
        let frame = self.client.inbox.peek()?;
        Some(decode_frame(self.client.session.config().protocol_version, &frame))
    }

    /// Deliver every frame in flight to the host.
    pub fn deliver_to_host(&mut self) -> Vec<Result<Received>> {
        let frames = self.host.inbox.drain();
        if let Some(last) = frames.last() {
            self.last_to_host = Some(last.clone());
        }
        frames
            .iter()
            .map(|frame| self.host.session.receive_frame(&mut self.host.world, frame))
            .collect()
    }

    /// Deliver in both directions until nothing is in flight.
    pub fn pump(&mut self) -> Vec<Result<Received>> {
        let mut results = Vec::new();
        while self.host.in_flight() > 0 || self.client.in_flight() > 0 {
            results.extend(self.deliver_to_host());
            results.extend(self.deliver_to_client());
        }
        results
    }

    /// Deliver the last frame the client received a second time.
    pub fn redeliver_last_to_client(&mut self) -> Option<Result<Received>> {
        let frame = self.last_to_client.clone()?;
        Some(self.client.session.receive_frame(&mut self.client.world, &frame))
    }

    /// Deliver the last frame the host received a second time.
    pub fn redeliver_last_to_host(&mut self) -> Option<Result<Received>> {
        let frame = self.last_to_host.clone()?;
        Some(self.host.session.receive_frame(&mut self.host.world, &frame))
    }

    /// Lose the oldest frame headed to the client.
    pub fn drop_next_to_client(&mut self) -> bool {
        self.client.inbox.recv().is_some()
    }

    /// Lose the oldest frame headed to the host.
    pub fn drop_next_to_host(&mut self) -> bool {
        self.host.inbox.recv().is_some()
    }

    /// Advance both sessions one tick.
    pub fn tick(&mut self) {
        self.host.session.tick();
        self.client.session.tick();
    }
}

/// Assert two group multisets are equal, ignoring order.
///
/// # Panics
///
/// Panics with both multisets when they differ.
pub fn assert_conserved(expected: &[GroupId], actual: &[GroupId]) {
    let expected: BTreeMap<_, _> = group_counts(expected);
    let actual: BTreeMap<_, _> = group_counts(actual);
    assert_eq!(
        actual, expected,
        "refund not conserved\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
}
