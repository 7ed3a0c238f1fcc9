//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (registry.rs):
//!     Each subsystem registers its warnables
//!     → Duplicate code panics
//!
//! Reporting (tracker.rs):
//!     set_unhealthy / set_healthy
//!     → Grace filter (ignored_during_startup)
//!     → State store updated under lock
//!     → Watchers notified outside the lock (watcher.rs)
//!     → Call returns once every watcher has seen it
//!
//! Reading (tracker.rs, state.rs):
//!     strings / current_state / append_warnable_debug_flags
//!     → Ordered by warnable code
//! ```
//!
//! # Design Decisions
//! - Warnables are process-global, trackers are per instance
//! - Only genuine transitions reach watchers
//! - An absent tracker is a valid tracker (optional.rs)

pub mod optional;
pub mod registry;
pub mod state;
pub mod tracker;
pub mod warnable;
pub mod watcher;

pub use optional::OptionalTracker;
pub use registry::{register, registered, registered_codes};
pub use state::{HealthChange, State, UnhealthyState};
pub use tracker::{Tracker, DEFAULT_STARTUP_GRACE};
pub use warnable::{Args, TextFn, Warnable, WarnableCode, WarnableText, ARG_DURATION, ARG_ERROR, ARG_SERVER_NAME};
pub use watcher::WatcherHandle;
