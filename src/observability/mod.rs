//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Tracker transitions produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log output (stdout, pretty or JSON)
//!     → Prometheus exposition text rendered by the binary
//! ```
//!
//! # Design Decisions
//! - Log and metric updates happen outside the tracker lock
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
