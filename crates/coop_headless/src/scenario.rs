//! Scenario loading and configuration.
//!
//! A scenario describes a cooperative session to replay headlessly: the
//! group catalog, the structures the host has built, both players'
//! inventory capacities and an ordered list of steps.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use coop_core::config::SessionConfig;
use coop_core::world::{Group, GroupCatalog, GroupId};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario references something it never defines.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The replication core refused the setup.
    #[error("Session setup failed: {0}")]
    Setup(#[from] coop_core::error::SyncError),
}

/// Inventory capacity used when a scenario does not set one.
pub const DEFAULT_CAPACITY: usize = 32;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Receiving side of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The authoritative process.
    Host,
    /// The requesting process.
    Client,
}

/// One action of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// The host player finishes deconstructing the named structure.
    HostDeconstruct(String),
    /// The client player finishes deconstructing the named structure.
    ClientDeconstruct(String),
    /// Deliver the last frame the given side received once more.
    DuplicateLastDelivery(Side),
    /// Lose the oldest frame in flight to the given side.
    DropNextDelivery(Side),
    /// Advance both sessions one tick and deliver everything in flight.
    Tick,
}

/// A structure present at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSetup {
    /// Name steps refer to.
    pub name: String,
    /// Constructible group of the structure.
    pub group: String,
    /// Position in whole world units.
    pub position: (i32, i32, i32),
    /// Groups of the attached panels, in scan order.
    #[serde(default)]
    pub panels: Vec<String>,
    /// Pre-placed by the scene rather than built by a player.
    #[serde(default)]
    pub from_scene: bool,
}

impl StructureSetup {
    /// A player-built structure without panels.
    #[must_use]
    pub fn new(name: &str, group: &str, position: (i32, i32, i32)) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            position,
            panels: Vec::new(),
            from_scene: false,
        }
    }

    /// Builder-style panel list.
    #[must_use]
    pub fn with_panels(mut self, panels: &[&str]) -> Self {
        self.panels = panels.iter().map(|p| (*p).to_string()).collect();
        self
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Every group the scenario uses.
    pub groups: Vec<Group>,
    /// Structures built before the first step.
    pub structures: Vec<StructureSetup>,
    /// Capacity of the host player's inventory.
    #[serde(default = "default_capacity")]
    pub host_capacity: usize,
    /// Capacity of the client player's inventory.
    #[serde(default = "default_capacity")]
    pub client_capacity: usize,
    /// Session config shared by both processes.
    #[serde(default)]
    pub config: SessionConfig,
    /// Actions in order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check every name and group reference resolves.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let catalog = self.catalog();
        for group in &self.groups {
            let Some(recipe) = &group.recipe else {
                continue;
            };
            if let Some(missing) = recipe
                .ingredient_groups()
                .iter()
                .find(|ingredient| !catalog.contains(ingredient))
            {
                return Err(ScenarioError::Invalid(format!(
                    "recipe of '{}' uses unknown group '{missing}'",
                    group.id
                )));
            }
        }
        for structure in &self.structures {
            for group in std::iter::once(&structure.group).chain(&structure.panels) {
                if !catalog.contains(&GroupId::new(group.as_str())) {
                    return Err(ScenarioError::Invalid(format!(
                        "structure '{}' uses unknown group '{group}'",
                        structure.name
                    )));
                }
            }
        }
        for step in &self.steps {
            if let Step::HostDeconstruct(name) | Step::ClientDeconstruct(name) = step {
                if self.structure(name).is_none() {
                    return Err(ScenarioError::Invalid(format!(
                        "step refers to unknown structure '{name}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Catalog built from the scenario's groups.
    #[must_use]
    pub fn catalog(&self) -> GroupCatalog {
        GroupCatalog::from_groups(self.groups.iter().cloned())
    }

    /// Structure setup by name.
    #[must_use]
    pub fn structure(&self, name: &str) -> Option<&StructureSetup> {
        self.structures.iter().find(|s| s.name == name)
    }

    /// Names of the built-in scenarios.
    pub const BUILTIN: [&'static str; 3] = ["scenario_a", "scenario_b", "scenario_c"];

    /// Built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "scenario_a" | "a" => Some(Self::scenario_a()),
            "scenario_b" | "b" => Some(Self::scenario_b()),
            "scenario_c" | "c" => Some(Self::scenario_c()),
            _ => None,
        }
    }

    /// Foundation with one wall panel, deconstructed by the client.
    #[must_use]
    pub fn scenario_a() -> Self {
        Self {
            name: "scenario_a".to_string(),
            description: "Client deconstructs a foundation with one panel; the refund reaches it"
                .to_string(),
            groups: standard_groups(),
            structures: vec![
                StructureSetup::new("foundation", "Foundation", (4, 0, 4)).with_panels(&["Panel"]),
            ],
            host_capacity: DEFAULT_CAPACITY,
            client_capacity: DEFAULT_CAPACITY,
            config: SessionConfig::default(),
            steps: vec![Step::ClientDeconstruct("foundation".to_string()), Step::Tick],
        }
    }

    /// Client with a full inventory; the refund lands on the floor.
    #[must_use]
    pub fn scenario_b() -> Self {
        Self {
            name: "scenario_b".to_string(),
            description: "Client inventory has no free slot; the refunded iron is dropped"
                .to_string(),
            groups: standard_groups(),
            structures: vec![StructureSetup::new("panel", "Panel", (2, 0, 3))],
            host_capacity: DEFAULT_CAPACITY,
            client_capacity: 0,
            config: SessionConfig::default(),
            steps: vec![Step::ClientDeconstruct("panel".to_string()), Step::Tick],
        }
    }

    /// Host and client deconstruct the same structure in the same tick.
    #[must_use]
    pub fn scenario_c() -> Self {
        Self {
            name: "scenario_c".to_string(),
            description: "The client's request races the host's own deconstruction and is dropped"
                .to_string(),
            groups: standard_groups(),
            structures: vec![StructureSetup::new("foundation", "Foundation", (0, 0, 0))],
            host_capacity: DEFAULT_CAPACITY,
            client_capacity: DEFAULT_CAPACITY,
            config: SessionConfig::default(),
            steps: vec![
                Step::HostDeconstruct("foundation".to_string()),
                Step::ClientDeconstruct("foundation".to_string()),
                Step::Tick,
            ],
        }
    }
}

/// Groups used by the built-in scenarios.
fn standard_groups() -> Vec<Group> {
    let g = GroupId::new;
    vec![
        Group::item("Iron", "Iron"),
        Group::item("Carbon", "Carbon"),
        Group::item("Glass", "Glass"),
        Group::constructible("Foundation", "Foundation", [g("Iron"), g("Iron"), g("Carbon")]),
        Group::constructible("Panel", "Wall Panel", [g("Iron")]),
        Group::constructible("WindowPanel", "Window Panel", [g("Glass"), g("Iron")]),
    ]
}
