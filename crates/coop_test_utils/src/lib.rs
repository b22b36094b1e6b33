//! # Coop Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Recipe catalog and structure fixtures
//! - Paired host/client sessions over a loopback transport
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod harness;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
