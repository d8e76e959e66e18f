//! Vigil Telemetry
//!
//! Metrics for engine builds and snapshot hand-off.
//!
//! Provides:
//! - In-process atomic counters with point-in-time snapshots
//! - Mirrored counters on the `metrics` facade for whichever recorder the
//!   host process installs

pub mod metrics;

pub use metrics::{BuildKind, ReloadMetrics, ReloadSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{BuildKind, ReloadMetrics, ReloadSnapshot};
}
