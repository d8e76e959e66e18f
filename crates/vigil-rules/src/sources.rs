//! Per-engine registry of event-source factories

use std::collections::BTreeMap;
use std::sync::Arc;

use vigil_core::{FilterCheckList, FilterFactory, FormatterFactory};

/// Filter and formatter factories for one event source
#[derive(Debug, Clone)]
pub struct SourceBinding {
    /// Compiles rule conditions for the source
    pub filter: Arc<dyn FilterFactory>,

    /// Renders rule outputs for the source
    pub formatter: Arc<dyn FormatterFactory>,
}

/// Source name → factory pair, plus the plugin filter checks of one build
///
/// A registry is built fresh for every engine. Factories may capture
/// per-build settings such as JSON output, so they are never shared across
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct SourceFactoryRegistry {
    bindings: BTreeMap<String, SourceBinding>,
    plugin_filter_checks: Arc<FilterCheckList>,
}

impl SourceFactoryRegistry {
    /// Create an empty registry sharing `plugin_filter_checks` with its plugin factories
    pub fn new(plugin_filter_checks: Arc<FilterCheckList>) -> Self {
        Self {
            bindings: BTreeMap::new(),
            plugin_filter_checks,
        }
    }

    /// Register the factories for a source, replacing any earlier binding
    pub fn register(
        &mut self,
        name: impl Into<String>,
        filter: Arc<dyn FilterFactory>,
        formatter: Arc<dyn FormatterFactory>,
    ) {
        self.bindings
            .insert(name.into(), SourceBinding { filter, formatter });
    }

    /// Get the factories for a source
    pub fn get(&self, name: &str) -> Option<&SourceBinding> {
        self.bindings.get(name)
    }

    /// Whether a source is registered
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Registered source names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.bindings.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no source is registered
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Filter checks shared by this build's plugin-sourced factories
    pub fn plugin_filter_checks(&self) -> &Arc<FilterCheckList> {
        &self.plugin_filter_checks
    }
}
