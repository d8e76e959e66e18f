//! Engine configuration

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use vigil_core::{Error, EventSource, Priority, Result, K8S_AUDIT_SOURCE, SYSCALL_SOURCE};

/// Everything a build needs to know besides the rules files
///
/// Read-only once handed to the coordinator; changing it means calling
/// `reconfigure`, which runs a new build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render rule outputs as JSON
    pub json_output: bool,

    /// Include warnings in load reports and log per-file details
    pub verbose: bool,

    /// Substitute `output_format` for `%container.info` instead of appending it
    pub replace_container_info: bool,

    /// Extra text applied to every rule output
    pub output_format: String,

    /// Least severe priority that is still evaluated
    pub min_priority: Priority,

    /// Enabled event sources
    pub event_sources: BTreeSet<String>,

    /// Loaded plugins, checked against rule requirements
    pub plugin_infos: Vec<PluginInfo>,

    /// Disable every rule whose name contains one of these
    pub disabled_rule_substrings: Vec<String>,

    /// Disable every rule carrying one of these tags
    pub disabled_rule_tags: BTreeSet<String>,

    /// When non-empty, only rules carrying one of these tags stay enabled
    pub enabled_rule_tags: BTreeSet<String>,
}

/// A loaded plugin and its version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name
    pub name: String,

    /// Plugin version
    pub version: Version,
}

impl PluginInfo {
    /// Describe a loaded plugin
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            json_output: false,
            verbose: false,
            replace_container_info: false,
            output_format: String::new(),
            min_priority: Priority::Debug,
            event_sources: [SYSCALL_SOURCE.to_string(), K8S_AUDIT_SOURCE.to_string()].into(),
            plugin_infos: Vec::new(),
            disabled_rule_substrings: Vec::new(),
            disabled_rule_tags: BTreeSet::new(),
            enabled_rule_tags: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, or use defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.event_sources.is_empty() {
            return Err(Error::config("at least one event source must be enabled"));
        }
        if let Some(empty) = self.event_sources.iter().find(|s| s.trim().is_empty()) {
            return Err(Error::config(format!("invalid event source name '{}'", empty)));
        }
        Ok(())
    }

    /// Whether `source` is enabled. Exact match.
    pub fn contains_event_source(&self, source: &str) -> bool {
        self.event_sources.contains(source)
    }

    /// Enabled sources resolved to built-in or plugin sources
    pub fn sources(&self) -> impl Iterator<Item = EventSource> + '_ {
        self.event_sources.iter().map(|s| EventSource::from_name(s))
    }
}
