//! Unhealthy-state and snapshot types.
//!
//! # States
//! - Healthy: no entry for the warnable in the tracker
//! - Unhealthy: one [`UnhealthyState`] entry, replaced on every new report
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: set_unhealthy (unless suppressed by the grace window)
//! Unhealthy → Unhealthy: set_unhealthy with different args (replace)
//! Unhealthy → Healthy: set_healthy
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::health::warnable::{Args, Warnable, WarnableCode};

/// Why a warnable is currently unhealthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhealthyState {
    pub warnable_code: WarnableCode,
    pub title: String,
    /// Text rendered from `args` when the state was set.
    pub text: String,
    pub args: Args,
    /// When the warnable first became unhealthy in this episode.
    pub broken_since: SystemTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<WarnableCode>,
}

/// Point-in-time view of a tracker, ordered by warnable code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub warnings: Vec<UnhealthyState>,
}

/// A transition delivered to async subscribers.
#[derive(Debug, Clone)]
pub struct HealthChange {
    pub warnable: Arc<Warnable>,
    /// `None` when the warnable became healthy.
    pub state: Option<UnhealthyState>,
}

impl HealthChange {
    pub fn is_healthy(&self) -> bool {
        self.state.is_none()
    }
}
