//! GreenArb Gate Library
//!
//! Dual-revenue admission gate: every tick it reads the latest GPU telemetry
//! and cross-listed quotes, values the arbitrage spread against energy cost
//! and carbon exposure, fires one actuation and appends the decision to the
//! audit ledger.

pub mod actuator;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod gate;
pub mod ledger;
pub mod model;
pub mod models;
pub mod stats;

#[cfg(test)]
mod gate_tests;

pub use config::GateConfig;
pub use error::{FeedKind, GateError};
pub use gate::{CycleOutcome, Gate};
