//! JSON report of a headless scenario run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use coop_core::session::SessionStats;
use coop_core::world::{GroupId, WorldObjectId};

/// Multiset of groups keyed by group id.
pub type GroupCounts = BTreeMap<String, usize>;

/// Count groups into a multiset.
pub fn count_groups<'a>(groups: impl IntoIterator<Item = &'a GroupId>) -> GroupCounts {
    let mut counts = GroupCounts::new();
    for group in groups {
        *counts.entry(group.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Add `other` into `total`.
pub fn merge_counts(total: &mut GroupCounts, other: &GroupCounts) {
    for (group, count) in other {
        *total.entry(group.clone()).or_insert(0) += count;
    }
}

/// What happened to one structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureReport {
    /// Scenario name of the structure.
    pub name: String,
    /// World object id assigned by the host.
    pub id: WorldObjectId,
    /// Ingredients its recipes say it refunds.
    pub expected_refund: GroupCounts,
    /// Ingredients the host actually refunded, if it was deconstructed.
    pub refunded: Option<GroupCounts>,
    /// Gone from the host world.
    pub destroyed_on_host: bool,
    /// Gone from the client world.
    pub destroyed_on_client: bool,
}

impl StructureReport {
    /// Whether a deconstructed structure refunded exactly its recipes.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.refunded
            .as_ref()
            .map_or(true, |refunded| *refunded == self.expected_refund)
    }
}

/// End state of one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReport {
    /// Items in the player's inventory.
    pub inventory: GroupCounts,
    /// Items on the floor.
    pub floor: GroupCounts,
    /// Session counters.
    pub stats: SessionStats,
    /// Structures destroyed twice by the engine.
    pub double_destroys: u32,
    /// Client requests never answered.
    pub awaiting_reply: Vec<WorldObjectId>,
}

impl PeerReport {
    /// Inventory and floor combined.
    #[must_use]
    pub fn received(&self) -> GroupCounts {
        let mut total = self.inventory.clone();
        merge_counts(&mut total, &self.floor);
        total
    }
}

/// Result of one delivered frame or local action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Step index the event belongs to; `None` for setup and settling.
    pub step: Option<usize>,
    /// Process the event happened on.
    pub side: String,
    /// Short description.
    pub detail: String,
    /// Whether the core reported a recovered condition.
    pub warning: bool,
}

/// Complete report of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks elapsed.
    pub ticks: u64,
    /// Per-structure results, in scenario order.
    pub structures: Vec<StructureReport>,
    /// Host end state.
    pub host: PeerReport,
    /// Client end state.
    pub client: PeerReport,
    /// Every structure refunded its recipes and every refunded item reached
    /// exactly one player.
    pub conserved: bool,
    /// Chronological event log.
    pub events: Vec<EventRecord>,
}

impl ScenarioReport {
    /// Evaluate the conservation verdict from the other fields.
    #[must_use]
    pub fn evaluate_conservation(
        structures: &[StructureReport],
        host: &PeerReport,
        client: &PeerReport,
    ) -> bool {
        let mut refunded = GroupCounts::new();
        for structure in structures {
            if !structure.is_conserved() {
                return false;
            }
            if let Some(counts) = &structure.refunded {
                merge_counts(&mut refunded, counts);
            }
        }
        let mut received = host.received();
        merge_counts(&mut received, &client.received());
        received == refunded
    }

    /// Number of events flagged as warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.events.iter().filter(|e| e.warning).count()
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
