//! Headless runner for cooperative deconstruction scenarios.
//!
//! Replays a scripted session between a host and a client process without
//! an engine or a network: both sides run over a [`coop_core::sandbox::SandboxWorld`]
//! and exchange frames through in-process loopback pipes.
//!
//! - **CI verification**: built-in scenarios assert refund conservation
//! - **Failure staging**: scenarios can drop or duplicate deliveries
//!
//! # Output
//!
//! - **stdout**: the JSON report
//! - **stderr**: logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run a scenario file
//! cargo run -p coop_headless -- run --scenario crates/coop_headless/scenarios/scenario_a.ron
//!
//! # Run the built-in scenarios
//! cargo run -p coop_headless -- builtin
//! ```

pub mod report;
pub mod runner;
pub mod scenario;

pub use report::{PeerReport, ScenarioReport, StructureReport};
pub use runner::{run_scenario_file, ScenarioRunner};
pub use scenario::{Scenario, ScenarioError, Side, Step, StructureSetup};
