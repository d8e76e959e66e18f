//! Rule and plugin-requirement definitions

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vigil_core::{CompiledFilter, Priority, SYSCALL_SOURCE};

/// A single detection rule as written in a rules file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier
    #[serde(rename = "rule")]
    pub name: String,

    /// Description of what this rule detects
    #[serde(default)]
    pub desc: String,

    /// Filter condition, in the source's filter language
    pub condition: String,

    /// Output template rendered when the rule matches
    pub output: String,

    /// Severity of a match
    pub priority: Priority,

    /// Event source the rule applies to
    #[serde(default = "default_source")]
    pub source: String,

    /// Free-form tags used for bulk enable/disable
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Rule {
    /// Whether the rule carries any of the given tags
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

/// A rule whose condition has been accepted by its source's filter factory
#[derive(Debug, Clone)]
pub struct LoadedRule {
    /// The rule definition, including its current enabled state
    pub rule: Rule,

    /// The compiled condition
    pub filter: CompiledFilter,
}

/// Minimum plugin version declared by a rules file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRequirement {
    /// Plugin name
    pub name: String,

    /// Lowest compatible version
    pub version: Version,
}

impl PluginRequirement {
    /// Whether `found` satisfies this requirement
    ///
    /// Versions are compatible when the major versions match and `found` is
    /// not older than the requirement.
    pub fn is_satisfied_by(&self, found: &Version) -> bool {
        found.major == self.version.major && *found >= self.version
    }
}

/// `required_plugin_versions` item of a rules file
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RequiredPluginVersions {
    pub required_plugin_versions: Vec<PluginRequirement>,
}

fn default_source() -> String {
    SYSCALL_SOURCE.to_string()
}

fn default_true() -> bool {
    true
}
