//! Headless scenario runner.
//!
//! Drives a host and a client [`Session`], each over its own
//! [`SandboxWorld`], connected by in-process loopback pipes. Frames only
//! move when a step says so, which is how scenarios stage races, losses and
//! duplicates.

use std::collections::HashMap;

use coop_core::capability::GameWorld;
use coop_core::deconstruct::DeconstructOutcome;
use coop_core::error::Result as SyncResult;
use coop_core::hooks::{ActionEvent, HookDecision, HookRegistry};
use coop_core::math::Vec3Fixed;
use coop_core::outbound::{LoopbackEndpoint, LoopbackTransport};
use coop_core::role::Role;
use coop_core::sandbox::{SandboxWorld, CLIENT_INVENTORY, HOST_INVENTORY};
use coop_core::session::{Received, Session};
use coop_core::world::{GameObjectHandle, GroupId, InventoryId, WorldObjectId, FRESH_ID};

use crate::report::{
    count_groups, merge_counts, EventRecord, GroupCounts, PeerReport, ScenarioReport,
    StructureReport,
};
use crate::scenario::{Scenario, ScenarioError, Side, Step, StructureSetup};

/// Upper bound on delivery rounds when settling.
const MAX_SETTLE_ROUNDS: usize = 64;

struct Process {
    session: Session,
    world: SandboxWorld,
    inbox: LoopbackEndpoint,
    last_delivered: Option<Vec<u8>>,
}

impl Process {
    fn new(
        role: Role,
        scenario: &Scenario,
        inventory: InventoryId,
        capacity: usize,
        outbox: LoopbackTransport,
        inbox: LoopbackEndpoint,
    ) -> Self {
        let mut world = SandboxWorld::new(scenario.catalog());
        world.add_inventory(inventory, capacity);
        Self {
            session: Session::new(role, scenario.config.clone(), inventory, Box::new(outbox)),
            world,
            inbox,
            last_delivered: None,
        }
    }

    fn received(&self) -> (GroupCounts, GroupCounts) {
        let group_of = |id: &WorldObjectId| self.world.live_object(*id).map(|wo| wo.group.clone());
        let inventory: Vec<GroupId> = self
            .world
            .inventory(self.session.local_inventory())
            .map(|inv| inv.items().iter().filter_map(group_of).collect())
            .unwrap_or_default();
        let floor: Vec<GroupId> =
            self.world.floor().iter().filter_map(|(id, _)| group_of(id)).collect();
        (count_groups(&inventory), count_groups(&floor))
    }

    fn report(&self) -> PeerReport {
        let (inventory, floor) = self.received();
        PeerReport {
            inventory,
            floor,
            stats: *self.session.stats(),
            double_destroys: self.world.double_destroys(),
            awaiting_reply: self
                .session
                .tracker()
                .awaiting_reply()
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        }
    }
}

struct TrackedStructure {
    setup: StructureSetup,
    id: WorldObjectId,
    expected: GroupCounts,
    refunded: Option<GroupCounts>,
}

/// Runs one scenario to completion.
pub struct ScenarioRunner {
    scenario: Scenario,
    host: Process,
    client: Process,
    hooks: HookRegistry<SandboxWorld>,
    structures: Vec<TrackedStructure>,
    by_id: HashMap<WorldObjectId, usize>,
    events: Vec<EventRecord>,
    current_step: Option<usize>,
}

impl ScenarioRunner {
    /// Set up both processes and build the scenario's structures.
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let (host_out, client_in) = LoopbackTransport::channel();
        let (client_out, host_in) = LoopbackTransport::channel();
        let host = Process::new(
            Role::Host,
            &scenario,
            HOST_INVENTORY,
            scenario.host_capacity,
            host_out,
            host_in,
        );
        let client = Process::new(
            Role::Client,
            &scenario,
            CLIENT_INVENTORY,
            scenario.client_capacity,
            client_out,
            client_in,
        );
        host.session.ensure_capability(&host.world)?;

        let mut runner = Self {
            scenario,
            host,
            client,
            hooks: HookRegistry::with_core_hooks(),
            structures: Vec::new(),
            by_id: HashMap::new(),
            events: Vec::new(),
            current_step: None,
        };
        let setups = runner.scenario.structures.clone();
        for setup in setups {
            runner.build_structure(setup)?;
        }
        Ok(runner)
    }

    /// Execute every step, settle in-flight frames and report.
    pub fn run(mut self) -> Result<ScenarioReport, ScenarioError> {
        tracing::info!(
            scenario = %self.scenario.name,
            steps = self.scenario.steps.len(),
            "running scenario"
        );
        let steps = self.scenario.steps.clone();
        for (index, step) in steps.iter().enumerate() {
            self.current_step = Some(index);
            tracing::debug!(step = index, ?step, "executing step");
            self.execute(step)?;
        }
        self.current_step = None;
        self.settle();
        Ok(self.into_report())
    }

    fn build_structure(&mut self, setup: StructureSetup) -> Result<(), ScenarioError> {
        let (x, y, z) = setup.position;
        let position = Vec3Fixed::from_ints(x, y, z);
        let group = GroupId::new(setup.group.as_str());
        let panels: Vec<GroupId> = setup.panels.iter().map(|p| GroupId::new(p.as_str())).collect();

        let mut object = self.host.world.create_world_object(&group, FRESH_ID)?;
        object.position = position;
        object.dont_save = setup.from_scene;
        let id = object.id;
        let go = self.host.world.spawn_game_object(position, panels.clone(), setup.from_scene);
        self.host.session.register(object, Some(go))?;

        self.host.session.replicate(id)?;
        self.host.session.flush();
        for result in self.deliver(Side::Client) {
            result?;
        }
        let client_go: GameObjectHandle =
            self.client
                .world
                .spawn_game_object(position, panels.clone(), setup.from_scene);
        self.client.session.mirror_mut().bind(id, client_go)?;

        let mut expected = self.host.world.recipe_ingredients(&group)?;
        for panel in &panels {
            expected.extend(self.host.world.recipe_ingredients(panel)?);
        }
        tracing::info!(name = %setup.name, id, panels = panels.len(), "structure built");

        self.by_id.insert(id, self.structures.len());
        self.structures.push(TrackedStructure {
            setup,
            id,
            expected: count_groups(&expected),
            refunded: None,
        });
        Ok(())
    }

    fn structure_id(&self, name: &str) -> Result<WorldObjectId, ScenarioError> {
        self.structures
            .iter()
            .find(|s| s.setup.name == name)
            .map(|s| s.id)
            .ok_or_else(|| ScenarioError::Invalid(format!("unknown structure '{name}'")))
    }

    fn execute(&mut self, step: &Step) -> Result<(), ScenarioError> {
        match step {
            Step::HostDeconstruct(name) => {
                let target = self.structure_id(name)?;
                let before = self.host.received();
                let decision = self.finalize(Side::Host, target);
                let after = self.host.received();
                if decision.is_veto() {
                    self.record_refund(target, diff_counts(&before, &after));
                }
            }
            Step::ClientDeconstruct(name) => {
                let target = self.structure_id(name)?;
                self.finalize(Side::Client, target);
            }
            Step::DuplicateLastDelivery(side) => {
                let process = self.process_mut(*side);
                match process.last_delivered.clone() {
                    Some(frame) => {
                        let result = process.session.receive_frame(&mut process.world, &frame);
                        self.observe(*side, &result);
                    }
                    None => {
                        self.event(*side, "nothing delivered yet to duplicate".to_string(), false);
                    }
                }
            }
            Step::DropNextDelivery(side) => {
                let dropped = self.process_mut(*side).inbox.recv().is_some();
                self.event(*side, format!("dropped next frame: {dropped}"), false);
            }
            Step::Tick => {
                let host = self.host.session.tick();
                let client = self.client.session.tick();
                tracing::debug!(
                    tick = host.tick,
                    host_flushed = host.flushed,
                    client_flushed = client.flushed,
                    "tick"
                );
                self.settle();
            }
        }
        Ok(())
    }

    /// Fire the deconstruct finalize hooks on one side.
    fn finalize(&mut self, side: Side, target: WorldObjectId) -> HookDecision {
        let event = ActionEvent::DeconstructFinalize { target };
        let process = match side {
            Side::Host => &mut self.host,
            Side::Client => &mut self.client,
        };
        let decision = self.hooks.dispatch_before(&mut process.session, &mut process.world, &event);
        if !decision.is_veto() {
            // no hook took over; the engine runs its own finalize
            if let Some(object) = process.session.mirror().lookup(target).cloned() {
                process.world.destroy_world_object(&object);
            }
        }
        self.event(side, format!("deconstruct #{target}: {decision:?}"), false);
        decision
    }

    /// Deliver in both directions until nothing is in flight.
    fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            if self.host.inbox.in_flight() == 0 && self.client.inbox.in_flight() == 0 {
                return;
            }
            for side in [Side::Host, Side::Client] {
                self.deliver(side);
            }
        }
        tracing::warn!("settle: frames still in flight after {MAX_SETTLE_ROUNDS} rounds");
    }

    fn deliver(&mut self, side: Side) -> Vec<SyncResult<Received>> {
        let frames = self.process_mut(side).inbox.drain();
        let mut results = Vec::with_capacity(frames.len());
        for frame in frames {
            let process = self.process_mut(side);
            let result = process.session.receive_frame(&mut process.world, &frame);
            process.last_delivered = Some(frame);
            self.observe(side, &result);
            results.push(result);
        }
        results
    }

    fn observe(&mut self, side: Side, result: &SyncResult<Received>) {
        match result {
            Ok(Received::Deconstruct(DeconstructOutcome::Authorized { target, groups, .. })) => {
                self.record_refund(*target, count_groups(groups));
                self.event(side, format!("authorized #{target}, {} items", groups.len()), false);
            }
            Ok(Received::Deconstruct(outcome)) => {
                self.event(side, format!("{outcome:?}"), false);
            }
            Ok(Received::WorldObject { id, created }) => {
                tracing::trace!(id, created, "world object sync");
            }
            Err(e) => self.event(side, e.to_string(), true),
        }
    }

    fn record_refund(&mut self, target: WorldObjectId, counts: GroupCounts) {
        if let Some(&index) = self.by_id.get(&target) {
            self.structures[index].refunded = Some(counts);
        }
    }

    fn event(&mut self, side: Side, detail: String, warning: bool) {
        self.events.push(EventRecord {
            step: self.current_step,
            side: format!("{side:?}"),
            detail,
            warning,
        });
    }

    fn process_mut(&mut self, side: Side) -> &mut Process {
        match side {
            Side::Host => &mut self.host,
            Side::Client => &mut self.client,
        }
    }

    fn into_report(self) -> ScenarioReport {
        let structures: Vec<StructureReport> = self
            .structures
            .iter()
            .map(|s| StructureReport {
                name: s.setup.name.clone(),
                id: s.id,
                expected_refund: s.expected.clone(),
                refunded: s.refunded.clone(),
                destroyed_on_host: !self.host.world.is_live(s.id),
                destroyed_on_client: !self.client.world.is_live(s.id),
            })
            .collect();
        let host = self.host.report();
        let client = self.client.report();
        let conserved = ScenarioReport::evaluate_conservation(&structures, &host, &client);
        if !conserved {
            tracing::warn!(scenario = %self.scenario.name, "refund not conserved");
        }
        ScenarioReport {
            scenario: self.scenario.name,
            ticks: self.host.session.current_tick(),
            structures,
            host,
            client,
            conserved,
            events: self.events,
        }
    }
}

/// Groups present in `after` beyond those in `before`.
fn diff_counts(
    before: &(GroupCounts, GroupCounts),
    after: &(GroupCounts, GroupCounts),
) -> GroupCounts {
    let mut total_before = before.0.clone();
    merge_counts(&mut total_before, &before.1);
    let mut diff = after.0.clone();
    merge_counts(&mut diff, &after.1);
    for (group, count) in total_before {
        if let Some(entry) = diff.get_mut(&group) {
            *entry = entry.saturating_sub(count);
        }
    }
    diff.retain(|_, count| *count > 0);
    diff
}

/// Load and run a scenario file.
pub fn run_scenario_file(path: &std::path::Path) -> Result<ScenarioReport, ScenarioError> {
    let scenario = Scenario::load(path)?;
    ScenarioRunner::new(scenario)?.run()
}
