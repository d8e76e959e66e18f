//! Error types for Vigil

/// Result type alias using Vigil's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for engine build and swap operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No capture handle has been attached, so no engine can be built
    #[error("no capture handle attached, cannot build engine")]
    NoCaptureHandle,

    /// One or more rule files failed to load; carries the aggregate report
    #[error("rule load failed: {0}")]
    RuleLoadFailed(String),

    /// A configured plugin does not satisfy a rule file's version requirement
    #[error(
        "plugin {name} version {found_version} not compatible with \
         required plugin version {required_version}"
    )]
    PluginIncompatible {
        /// Plugin name
        name: String,
        /// Version of the plugin that is available
        found_version: String,
        /// Version the loaded rules require
        required_version: String,
    },

    /// `fetch` was called before any successful `replace`
    #[error("no engine, must call replace() first")]
    EngineNotInitialized,

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid field pattern
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    /// Create a new rule load failure from an aggregate report
    pub fn rule_load_failed(report: impl Into<String>) -> Self {
        Self::RuleLoadFailed(report.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new plugin incompatibility error
    pub fn plugin_incompatible(
        name: impl Into<String>,
        found_version: impl Into<String>,
        required_version: impl Into<String>,
    ) -> Self {
        Self::PluginIncompatible {
            name: name.into(),
            found_version: found_version.into(),
            required_version: required_version.into(),
        }
    }

    /// The detail text a caller should surface for a failed build
    ///
    /// For `RuleLoadFailed` this is the report itself, without the prefix
    /// added by `Display`.
    pub fn detail(&self) -> String {
        match self {
            Self::RuleLoadFailed(report) => report.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_incompatible_message() {
        let err = Error::plugin_incompatible("k8saudit", "0.1.0", "0.2.0");
        assert_eq!(
            err.to_string(),
            "plugin k8saudit version 0.1.0 not compatible with required plugin version 0.2.0"
        );
    }

    #[test]
    fn test_detail_returns_raw_report() {
        let err = Error::rule_load_failed("a.yaml: Invalid\n");
        assert_eq!(err.detail(), "a.yaml: Invalid\n");
        assert!(err.to_string().starts_with("rule load failed"));
    }
}
