//! Engine builder
//!
//! Turns a configuration and a list of rules files into a fully wired,
//! immutable engine snapshot. The builder never touches shared state: it
//! either returns a snapshot or an error.

use std::sync::Arc;
use tracing::{debug, info};

use vigil_core::{CaptureHandle, Error, FilterCheckList, Result};
use vigil_rules::{LoadReport, LoadResult, RuleFile, RulesEngine, SourceFactoryRegistry};

use crate::config::EngineConfig;
use crate::factory::source_factories;
use crate::EngineSnapshot;

/// A successfully built engine and the report from loading its rules
#[derive(Debug)]
pub struct BuiltEngine {
    /// The finished snapshot
    pub snapshot: EngineSnapshot,

    /// Per-file load results
    pub report: LoadReport,
}

/// Builds engine snapshots from a configuration
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: Arc<EngineConfig>,
    capture: Option<CaptureHandle>,
    plugin_filter_checks: FilterCheckList,
}

impl EngineBuilder {
    /// Create a builder with no capture handle and no plugin filter checks
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            capture: None,
            plugin_filter_checks: FilterCheckList::new(),
        }
    }

    /// Attach the capture handle syscall and plugin factories are bound to
    pub fn with_capture(mut self, capture: Option<CaptureHandle>) -> Self {
        self.capture = capture;
        self
    }

    /// Filter checks to copy into the new engine's plugin registry
    pub fn with_plugin_filter_checks(mut self, checks: FilterCheckList) -> Self {
        self.plugin_filter_checks = checks;
        self
    }

    /// Build a new engine from `rules_files`
    ///
    /// Every file is loaded even after one fails, so the error report covers
    /// all of them. An empty list yields an engine with no rules.
    pub fn build(&self, rules_files: &[RuleFile]) -> Result<BuiltEngine> {
        let config = self.config.as_ref();
        config.validate()?;
        let capture = self.capture.as_ref().ok_or(Error::NoCaptureHandle)?;

        // Fresh copy per build; factories of this build share it read-only.
        let checks = Arc::new(self.plugin_filter_checks.clone());
        let registry = SourceFactoryRegistry::new(Arc::clone(&checks));
        let mut engine = RulesEngine::with_registry(registry);

        engine.set_extra(config.output_format.clone(), config.replace_container_info);
        engine.set_min_priority(config.min_priority);

        for source in config.sources() {
            let (filter, formatter) =
                source_factories(&source, capture, &checks, config.json_output)?;
            engine.add_source(source.name(), filter, formatter);
        }

        let results: Vec<LoadResult> = rules_files
            .iter()
            .map(|file| engine.load_rules(file, config.verbose))
            .collect();
        let report = LoadReport::from_results(results, config.verbose);
        if !report.successful() {
            return Err(Error::rule_load_failed(report.into_text()));
        }

        for plugin in &config.plugin_infos {
            if let Err(required) = engine.is_plugin_compatible(&plugin.name, &plugin.version) {
                return Err(Error::plugin_incompatible(
                    &plugin.name,
                    plugin.version.to_string(),
                    required.to_string(),
                ));
            }
            let declared = engine.required_plugin_versions(&plugin.name);
            if !declared.is_empty() {
                debug!(
                    plugin = %plugin.name,
                    version = %plugin.version,
                    requirements = declared.len(),
                    "Plugin satisfies rules requirements"
                );
            }
        }

        apply_rule_filters(&mut engine, config);

        Ok(BuiltEngine {
            snapshot: Arc::new(engine),
            report,
        })
    }
}

/// Apply the configured enable/disable filters
///
/// Order is fixed: substrings, then disabled tags, then enabled tags. The
/// enabled-tags step starts by disabling everything, so it overrides both
/// earlier steps.
pub fn apply_rule_filters(engine: &mut RulesEngine, config: &EngineConfig) {
    for substring in &config.disabled_rule_substrings {
        info!(substring = %substring, "Disabling rules matching substring");
        engine.enable_rule(substring, false);
    }

    if !config.disabled_rule_tags.is_empty() {
        for tag in &config.disabled_rule_tags {
            info!(tag = %tag, "Disabling rules with tag");
        }
        engine.enable_rule_by_tag(&config.disabled_rule_tags, false);
    }

    if !config.enabled_rule_tags.is_empty() {
        // Only the tagged rules should end up enabled.
        engine.enable_rule("", false);
        for tag in &config.enabled_rule_tags {
            info!(tag = %tag, "Enabling rules with tag");
        }
        engine.enable_rule_by_tag(&config.enabled_rule_tags, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;
    use std::collections::BTreeSet;
    use vigil_core::{FilterCheckInfo, OfflineInspector, OutputFormat};

    use crate::config::PluginInfo;

    const RULES: &str = r#"
- rule: Shell in container
  condition: evt.type = execve and proc.name = bash
  output: "shell spawned (user=%user.name)"
  priority: WARNING
  tags: [container, shell]
- rule: Write below etc
  condition: evt.type = open and fd.name startswith /etc
  output: "file below /etc opened"
  priority: ERROR
  tags: [filesystem]
- rule: Create privileged pod
  source: k8s_audit
  condition: ka.verb = create and ka.req.pod.containers.privileged = true
  output: "privileged pod created (user=%ka.user.name)"
  priority: WARNING
  tags: [k8s]
"#;

    fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(Arc::new(config))
            .with_capture(Some(CaptureHandle::new(OfflineInspector::default())))
    }

    fn rules() -> Vec<RuleFile> {
        vec![RuleFile::new("rules.yaml", RULES)]
    }

    #[test]
    fn test_no_capture_handle() {
        let err = EngineBuilder::new(Arc::new(EngineConfig::default()))
            .build(&[RuleFile::new("broken.yaml", "not: [valid")])
            .unwrap_err();
        assert!(matches!(err, Error::NoCaptureHandle));
    }

    #[test]
    fn test_invalid_config_rejected_before_build() {
        let config = EngineConfig {
            event_sources: BTreeSet::new(),
            ..EngineConfig::default()
        };
        let err = builder(config).build(&rules()).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_k8s_rule_with_registry_host_value() {
        let files = vec![RuleFile::new(
            "k8s.yaml",
            "- rule: Untrusted registry\n  source: k8s_audit\n  \
             condition: ka.req.pod.containers.image startswith docker.io/\n  \
             output: \"image %ka.req.pod.containers.image\"\n  priority: WARNING\n",
        )];
        let built = builder(EngineConfig::default()).build(&files).unwrap();
        assert_eq!(built.snapshot.num_rules(), 1);
    }

    #[test]
    fn test_empty_rules_list_builds_empty_engine() {
        let built = builder(EngineConfig::default()).build(&[]).unwrap();
        assert_eq!(built.snapshot.num_rules(), 0);
        assert_eq!(built.snapshot.sources().names(), vec!["k8s_audit", "syscall"]);
        assert_eq!(built.report.text(), "");
    }

    #[test]
    fn test_every_source_gets_factories() {
        let mut config = EngineConfig::default();
        config.event_sources.insert("aws_cloudtrail".to_string());
        config.json_output = true;

        let mut checks = FilterCheckList::new();
        checks.add(FilterCheckInfo::new("cloudtrail", ["ct.name"]));

        let built = builder(config)
            .with_plugin_filter_checks(checks.clone())
            .build(&[])
            .unwrap();
        let sources = built.snapshot.sources();
        assert_eq!(sources.len(), 3);
        for name in ["syscall", "k8s_audit", "aws_cloudtrail"] {
            let binding = sources.get(name).unwrap();
            assert_eq!(binding.filter.source(), name);
            assert_eq!(binding.formatter.output_format(), OutputFormat::Json);
        }
        assert_eq!(**sources.plugin_filter_checks(), checks);
    }

    #[test]
    fn test_settings_applied_to_engine() {
        let config = EngineConfig {
            output_format: "host=%evt.hostname".to_string(),
            min_priority: vigil_core::Priority::Error,
            ..EngineConfig::default()
        };
        let built = builder(config).build(&rules()).unwrap();
        let engine = &built.snapshot;

        assert_eq!(
            engine.rule_output("Write below etc").unwrap(),
            "file below /etc opened host=%evt.hostname"
        );
        assert_eq!(engine.active_rules("syscall").count(), 1);
    }

    #[test]
    fn test_load_failure_reports_every_file() {
        let files = vec![
            RuleFile::new("first.yaml", RULES),
            RuleFile::new(
                "second.yaml",
                "- rule: Broken\n  condition: (evt.type\n  output: x\n  priority: INFO\n",
            ),
            RuleFile::new(
                "third.yaml",
                "- rule: Fine\n  condition: evt.type = open\n  output: x\n  priority: INFO\n",
            ),
        ];
        let err = builder(EngineConfig::default()).build(&files).unwrap_err();

        let Error::RuleLoadFailed(report) = err else {
            panic!("expected RuleLoadFailed, got {:?}", err);
        };
        assert!(report.contains("first.yaml: Ok"));
        assert!(report.contains("second.yaml: Invalid"));
        assert!(report.contains("third.yaml: Ok"));
    }

    #[test]
    fn test_single_file_report_omits_filename() {
        let files = vec![RuleFile::new("only.yaml", "- rule: x\n  output: y\n  priority: INFO\n")];
        let err = builder(EngineConfig::default()).build(&files).unwrap_err();
        let report = err.detail();
        assert!(report.starts_with("Invalid\n"));
        assert!(!report.contains("only.yaml"));
    }

    #[test]
    fn test_warnings_only_when_verbose() {
        let content = format!("{}- macro: unused\n  condition: x.y = 1\n", RULES);
        let files = vec![RuleFile::new("rules.yaml", content)];

        let quiet = builder(EngineConfig::default()).build(&files).unwrap();
        assert_eq!(quiet.report.warning_count(), 1);
        assert!(!quiet.report.text().contains("Warnings"));

        let verbose = builder(EngineConfig {
            verbose: true,
            ..EngineConfig::default()
        })
        .build(&files)
        .unwrap();
        assert!(verbose
            .report
            .text()
            .contains("1 Warnings:\n- item 3: unknown item kind 'macro', skipping"));
    }

    #[test]
    fn test_plugin_incompatible() {
        let files = vec![RuleFile::new(
            "plugins.yaml",
            "- required_plugin_versions:\n    - name: k8saudit\n      version: 0.5.0\n",
        )];
        let config = EngineConfig {
            plugin_infos: vec![
                PluginInfo::new("json", Version::new(0, 7, 0)),
                PluginInfo::new("k8saudit", Version::new(0, 4, 2)),
            ],
            ..EngineConfig::default()
        };

        let err = builder(config).build(&files).unwrap_err();
        match err {
            Error::PluginIncompatible {
                name,
                found_version,
                required_version,
            } => {
                assert_eq!(name, "k8saudit");
                assert_eq!(found_version, "0.4.2");
                assert_eq!(required_version, "0.5.0");
            }
            other => panic!("expected PluginIncompatible, got {:?}", other),
        }
    }

    #[test]
    fn test_disable_by_substring_and_tag() {
        let config = EngineConfig {
            disabled_rule_substrings: vec!["etc".to_string()],
            disabled_rule_tags: ["k8s".to_string()].into(),
            ..EngineConfig::default()
        };
        let built = builder(config).build(&rules()).unwrap();
        let engine = &built.snapshot;

        assert_eq!(engine.is_enabled("Shell in container"), Some(true));
        assert_eq!(engine.is_enabled("Write below etc"), Some(false));
        assert_eq!(engine.is_enabled("Create privileged pod"), Some(false));
    }

    #[test]
    fn test_enabled_tags_override_disables() {
        let files = vec![RuleFile::new(
            "tags.yaml",
            r#"
- rule: A
  condition: evt.type = open
  output: a
  priority: INFO
  tags: [T]
- rule: B
  condition: evt.type = open
  output: b
  priority: INFO
  tags: [U]
- rule: C
  condition: evt.type = open
  output: c
  priority: INFO
"#,
        )];
        let config = EngineConfig {
            disabled_rule_tags: ["T".to_string()].into(),
            enabled_rule_tags: ["U".to_string()].into(),
            disabled_rule_substrings: vec!["B".to_string()],
            ..EngineConfig::default()
        };

        let built = builder(config).build(&files).unwrap();
        let enabled: Vec<&str> = built
            .snapshot
            .enabled_rules()
            .map(|r| r.rule.name.as_str())
            .collect();
        assert_eq!(enabled, vec!["B"]);
    }
}
