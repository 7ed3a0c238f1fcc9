//! Crate error types.

use thiserror::Error;

pub use crate::config::loader::ConfigError;

/// Aggregate health of a tracker, as an error value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    /// One or more warnables are visibly unhealthy; texts in code order.
    #[error("{}", .0.join("; "))]
    Unhealthy(Vec<String>),
}
