//! Vigil Rules
//!
//! Rule files, per-file load results, and the rule-set engine that backs
//! each published snapshot.
//!
//! Rules files are YAML sequences and may contain:
//! - `rule` items (condition, output, priority, source, tags)
//! - `required_plugin_versions` items gating which plugin versions may run
//!   with the rules

pub mod engine;
pub mod file;
pub mod rule;
pub mod sources;

pub use engine::RulesEngine;
pub use file::{LoadReport, LoadResult, RuleFile};
pub use rule::{LoadedRule, PluginRequirement, Rule};
pub use sources::{SourceBinding, SourceFactoryRegistry};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::RulesEngine;
    pub use crate::file::{LoadReport, LoadResult, RuleFile};
    pub use crate::rule::{LoadedRule, Rule};
    pub use crate::sources::SourceFactoryRegistry;
}
