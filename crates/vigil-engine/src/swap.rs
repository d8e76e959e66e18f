//! Swap coordinator
//!
//! Two roles share a [`SwappableEngine`]. The control role calls
//! [`replace`](SwappableEngine::replace), [`validate`](SwappableEngine::validate)
//! and [`reconfigure`](SwappableEngine::reconfigure); builds run synchronously
//! on the caller's thread. The data role calls
//! [`fetch`](SwappableEngine::fetch) once per batch; it never waits on a build
//! and always gets a complete, immutable snapshot.
//!
//! The capture handle is shared with every build but only cloned there. The
//! inspector behind it is dereferenced during evaluation, on the data role's
//! thread.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::{CaptureHandle, Error, FilterCheckInfo, FilterCheckList, Result};
use vigil_rules::{LoadReport, RuleFile, RulesEngine};
use vigil_telemetry::{BuildKind, ReloadMetrics};

use crate::builder::{BuiltEngine, EngineBuilder};
use crate::config::EngineConfig;
use crate::slot::{PendingSlot, SlotReceiver};
use crate::EngineSnapshot;

/// Builds engines and hands them off to the evaluation path
#[derive(Debug)]
pub struct SwappableEngine {
    config: RwLock<Arc<EngineConfig>>,
    capture: RwLock<Option<CaptureHandle>>,
    plugin_filter_checks: RwLock<FilterCheckList>,
    // Serializes control-role builds so publish order follows call order
    control: Mutex<()>,
    pending: PendingSlot<RulesEngine>,
    metrics: ReloadMetrics,
}

impl SwappableEngine {
    /// Create a coordinator with no capture handle and no published engine
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            capture: RwLock::new(None),
            plugin_filter_checks: RwLock::new(FilterCheckList::new()),
            control: Mutex::new(()),
            pending: PendingSlot::new(),
            metrics: ReloadMetrics::new(),
        })
    }

    /// Create a coordinator, attach `capture` and publish an engine with no rules
    ///
    /// After `init` returns, `fetch` succeeds.
    pub fn init(config: EngineConfig, capture: CaptureHandle) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.attach_capture(capture);
        engine.replace(&[])?;
        Ok(engine)
    }

    /// Attach the capture handle used by subsequent builds
    pub fn attach_capture(&self, capture: CaptureHandle) {
        *self.capture.write() = Some(capture);
    }

    /// The configuration subsequent builds use
    pub fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config.read())
    }

    /// Register plugin filter checks for subsequent builds
    ///
    /// Published snapshots keep the list they were built with.
    pub fn register_plugin_filter_check(&self, check: FilterCheckInfo) {
        debug!(check = %check.name, "Registering plugin filter check");
        self.plugin_filter_checks.write().add(check);
    }

    /// Filter checks shared by the plugin sources of the current snapshot
    ///
    /// Before the first successful build this is the registered template.
    pub fn plugin_filter_checks(&self) -> Arc<FilterCheckList> {
        match self.pending.latest() {
            Some(published) => Arc::clone(published.value.sources().plugin_filter_checks()),
            None => Arc::new(self.plugin_filter_checks.read().clone()),
        }
    }

    /// Build a new engine from `rules_files` and publish it
    ///
    /// On failure nothing is published and the current snapshot stays in use.
    pub fn replace(&self, rules_files: &[RuleFile]) -> Result<LoadReport> {
        let _control = self.control.lock();
        let config = self.config();
        let built = self.build(&config, rules_files, BuildKind::Replace)?;
        Ok(self.publish(built))
    }

    /// Run the full build pipeline without publishing the result
    ///
    /// A successful validation means `replace` with the same files and
    /// configuration succeeds too, as long as nothing external changes.
    pub fn validate(&self, rules_files: &[RuleFile]) -> Result<LoadReport> {
        let config = self.config();
        let built = self.build(&config, rules_files, BuildKind::Validate)?;
        Ok(built.report)
    }

    /// Build with a new configuration and publish the result
    ///
    /// The configuration is only committed when the build succeeds.
    pub fn reconfigure(
        &self,
        config: EngineConfig,
        rules_files: &[RuleFile],
    ) -> Result<LoadReport> {
        config.validate()?;
        let _control = self.control.lock();
        let config = Arc::new(config);
        let built = self.build(&config, rules_files, BuildKind::Replace)?;
        *self.config.write() = config;
        info!("Configuration updated");
        Ok(self.publish(built))
    }

    /// The most recently published snapshot
    ///
    /// Never blocks on a running build. Fails only before the first
    /// successful `replace`.
    pub fn fetch(&self) -> Result<EngineSnapshot> {
        let published = self.pending.latest().ok_or(Error::EngineNotInitialized)?;
        self.metrics.record_fetch();
        Ok(published.value)
    }

    /// Number of snapshots published so far
    pub fn generation(&self) -> u64 {
        self.pending.generation()
    }

    /// Watch published snapshots from an async data role
    pub fn subscribe(&self) -> SlotReceiver<RulesEngine> {
        self.pending.subscribe()
    }

    /// Build and swap metrics
    pub fn metrics(&self) -> &ReloadMetrics {
        &self.metrics
    }

    fn build(
        &self,
        config: &Arc<EngineConfig>,
        rules_files: &[RuleFile],
        kind: BuildKind,
    ) -> Result<BuiltEngine> {
        let builder = EngineBuilder::new(Arc::clone(config))
            .with_capture(self.capture.read().clone())
            .with_plugin_filter_checks(self.plugin_filter_checks.read().clone());

        let start = Instant::now();
        let result = builder.build(rules_files);
        self.metrics.record_build(kind, result.is_ok(), start.elapsed());

        if let Err(e) = &result {
            warn!(error = %e, files = rules_files.len(), "Engine build failed");
        }
        result
    }

    fn publish(&self, built: BuiltEngine) -> LoadReport {
        let rules = built.snapshot.num_rules();
        let generation = self.pending.push(built.snapshot);
        self.metrics.record_publish();
        info!(generation, rules, "Published new engine");
        built.report
    }
}
