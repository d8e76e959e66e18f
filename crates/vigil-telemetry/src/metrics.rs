//! Engine build and swap metrics

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Which control-plane operation ran a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    /// Build followed by publish
    Replace,
    /// Build that is discarded after checking
    Validate,
}

impl BuildKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Validate => "validate",
        }
    }
}

/// Metrics collector for engine builds and snapshot hand-off
#[derive(Clone)]
pub struct ReloadMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    validations: AtomicU64,
    snapshots_published: AtomicU64,
    fetches: AtomicU64,
    total_build_us: AtomicU64,
}

impl ReloadMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                builds_succeeded: AtomicU64::new(0),
                builds_failed: AtomicU64::new(0),
                validations: AtomicU64::new(0),
                snapshots_published: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                total_build_us: AtomicU64::new(0),
            }),
        }
    }

    /// Record a finished build
    pub fn record_build(&self, kind: BuildKind, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        if success {
            self.inner.builds_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.builds_failed.fetch_add(1, Ordering::Relaxed);
        }
        if kind == BuildKind::Validate {
            self.inner.validations.fetch_add(1, Ordering::Relaxed);
        }

        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.inner
            .total_build_us
            .fetch_add(elapsed_us, Ordering::Relaxed);

        ::metrics::counter!(
            "vigil_engine_builds_total",
            "kind" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!("vigil_engine_build_latency_us", "kind" => kind.as_str())
            .record(elapsed_us as f64);
        trace!(kind = kind.as_str(), outcome, elapsed_us, "engine build recorded");
    }

    /// Record a snapshot pushed to the evaluation path
    pub fn record_publish(&self) {
        self.inner.snapshots_published.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("vigil_engine_swaps_total").increment(1);
    }

    /// Record a fetch from the evaluation path
    pub fn record_fetch(&self) {
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> ReloadSnapshot {
        ReloadSnapshot {
            builds_succeeded: self.inner.builds_succeeded.load(Ordering::Relaxed),
            builds_failed: self.inner.builds_failed.load(Ordering::Relaxed),
            validations: self.inner.validations.load(Ordering::Relaxed),
            snapshots_published: self.inner.snapshots_published.load(Ordering::Relaxed),
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            total_build_us: self.inner.total_build_us.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ReloadMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReloadMetrics").field(&self.snapshot()).finish()
    }
}

impl Default for ReloadMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSnapshot {
    pub builds_succeeded: u64,
    pub builds_failed: u64,
    pub validations: u64,
    pub snapshots_published: u64,
    pub fetches: u64,
    pub total_build_us: u64,
}

impl ReloadSnapshot {
    /// Total builds, successful or not
    pub fn total_builds(&self) -> u64 {
        self.builds_succeeded + self.builds_failed
    }

    /// Calculate average build latency
    pub fn avg_build_us(&self) -> u64 {
        match self.total_builds() {
            0 => 0,
            n => self.total_build_us / n,
        }
    }

    /// Fraction of builds that failed
    pub fn failure_rate(&self) -> f64 {
        match self.total_builds() {
            0 => 0.0,
            n => self.builds_failed as f64 / n as f64,
        }
    }
}
