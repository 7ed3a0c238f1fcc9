//! In-process health-state tracking.
//!
//! Subsystems register [`health::Warnable`] conditions at startup, report
//! them unhealthy or healthy on a [`health::Tracker`], and observers read
//! ordered snapshots or watch transitions.

pub mod config;
pub mod error;
pub mod health;
pub mod observability;

pub use config::HealthConfig;
pub use error::{ConfigError, HealthError};
pub use health::{
    register, Args, OptionalTracker, State, Tracker, UnhealthyState, Warnable, WarnableCode,
};
