//! Step-wise thermal governor.
//!
//! Optional. Moves one cooling device a single state at a time toward
//! whatever keeps the temperature under a trip point. The synchronous
//! core never depends on it.

mod config;
mod controller;
mod trend;

pub use config::GovernorConfig;
pub use controller::StepWiseGovernor;
pub use trend::Trend;
