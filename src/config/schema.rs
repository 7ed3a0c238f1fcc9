//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the tracker and the
//! `health-tracker` binary. All types derive Serde traits for
//! deserialization from config files.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::{Args, Warnable, WarnableText};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthConfig {
    /// Tracker settings.
    pub tracker: TrackerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Warnables the binary registers at startup.
    pub warnables: Vec<WarnableConfig>,

    /// Scripted mutations the binary replays, in order.
    pub events: Vec<EventConfig>,
}

/// Tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Length of the startup grace window in milliseconds.
    pub startup_grace_ms: u64,
}

impl TrackerConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { startup_grace_ms: 5_000 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable lines.
    pub json: bool,

    /// Install the Prometheus recorder.
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics: false,
        }
    }
}

/// A warnable definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarnableConfig {
    /// Unique warnable code.
    pub code: String,

    #[serde(default)]
    pub title: String,

    /// Text template with `{arg}` placeholders.
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub map_debug_flag: String,

    #[serde(default)]
    pub ignored_during_startup: bool,

    #[serde(default)]
    pub time_to_visible_ms: u64,

    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl WarnableConfig {
    /// Build the warnable this entry describes.
    pub fn to_warnable(&self) -> Warnable {
        let mut warnable = Warnable::new(self.code.as_str())
            .title(self.title.as_str())
            .map_debug_flag(self.map_debug_flag.as_str())
            .ignored_during_startup(self.ignored_during_startup)
            .time_to_visible(Duration::from_millis(self.time_to_visible_ms));
        if let Some(template) = &self.text {
            warnable = warnable.text(WarnableText::Template(template.clone()));
        }
        for dep in &self.depends_on {
            warnable = warnable.depends_on(dep.as_str());
        }
        warnable
    }
}

/// A scripted tracker mutation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventConfig {
    Unhealthy {
        warnable: String,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
    Healthy {
        warnable: String,
    },
    IpnState {
        state: String,
        want_running: bool,
    },
}

impl EventConfig {
    /// Code of the warnable this event targets, if any.
    pub fn warnable(&self) -> Option<&str> {
        match self {
            EventConfig::Unhealthy { warnable, .. } | EventConfig::Healthy { warnable } => {
                Some(warnable)
            }
            EventConfig::IpnState { .. } => None,
        }
    }

    /// Apply the event to `tracker`, resolving codes through `warnables`.
    /// Events for unknown codes are skipped.
    pub fn apply(
        &self,
        tracker: &crate::health::Tracker,
        warnables: &BTreeMap<String, Arc<Warnable>>,
    ) {
        match self {
            EventConfig::Unhealthy { warnable, args } => match warnables.get(warnable) {
                Some(w) => tracker.set_unhealthy(w, Args::from(args.clone())),
                None => tracing::warn!(warnable = %warnable, "Event references unknown warnable"),
            },
            EventConfig::Healthy { warnable } => match warnables.get(warnable) {
                Some(w) => tracker.set_healthy(w),
                None => tracing::warn!(warnable = %warnable, "Event references unknown warnable"),
            },
            EventConfig::IpnState { state, want_running } => {
                tracker.set_ipn_state(state, *want_running);
            }
        }
    }
}
