//! Rule-set engine
//!
//! Holds the rules loaded for one snapshot together with the source
//! factories they were compiled against. An engine is mutated only while it
//! is being built; once shared it is read-only.

use semver::Version;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use vigil_core::{FilterFactory, FormatterFactory, Priority};

use crate::file::{LoadResult, RuleFile};
use crate::rule::{LoadedRule, PluginRequirement, RequiredPluginVersions, Rule};
use crate::sources::SourceFactoryRegistry;

const CONTAINER_INFO: &str = "%container.info";

/// Rule-set engine
#[derive(Debug, Default)]
pub struct RulesEngine {
    sources: SourceFactoryRegistry,
    rules: Vec<LoadedRule>,
    required_plugin_versions: BTreeMap<String, Vec<PluginRequirement>>,
    extra: String,
    replace_container_info: bool,
    min_priority: Priority,
}

impl RulesEngine {
    /// Create an engine with no sources and no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine around an existing source registry
    pub fn with_registry(sources: SourceFactoryRegistry) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Register the factories for an event source
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        filter: Arc<dyn FilterFactory>,
        formatter: Arc<dyn FormatterFactory>,
    ) {
        self.sources.register(name, filter, formatter);
    }

    /// Set the text appended to (or substituted into) every rule output
    pub fn set_extra(&mut self, extra: impl Into<String>, replace_container_info: bool) {
        self.extra = extra.into();
        self.replace_container_info = replace_container_info;
    }

    /// Set the least severe priority that still counts as active
    pub fn set_min_priority(&mut self, priority: Priority) {
        self.min_priority = priority;
    }

    /// Load one rules file
    ///
    /// A rules file is a YAML sequence of `rule` and `required_plugin_versions`
    /// items. Nothing from a file with errors is added to the engine.
    pub fn load_rules(&mut self, file: &RuleFile, verbose: bool) -> LoadResult {
        let mut result = LoadResult::new(file.name());

        let items = match serde_yaml::from_str::<Value>(file.content()) {
            Ok(Value::Sequence(items)) => items,
            Ok(Value::Null) => {
                result.add_warning("file contains no rules");
                return result;
            }
            Ok(_) => {
                result.add_error("rules content is not a YAML sequence");
                return result;
            }
            Err(e) => {
                result.add_error(format!("invalid YAML: {}", e));
                return result;
            }
        };

        let mut staged: Vec<LoadedRule> = Vec::new();
        let mut requirements: Vec<PluginRequirement> = Vec::new();

        for (index, item) in items.into_iter().enumerate() {
            let Some(map) = item.as_mapping() else {
                result.add_error(format!("item {}: expected a mapping", index));
                continue;
            };

            if map.contains_key("rule") {
                match serde_yaml::from_value::<Rule>(item) {
                    Ok(rule) => self.stage_rule(rule, &mut staged, &mut result),
                    Err(e) => result.add_error(format!("item {}: invalid rule: {}", index, e)),
                }
            } else if map.contains_key("required_plugin_versions") {
                match serde_yaml::from_value::<RequiredPluginVersions>(item) {
                    Ok(req) => requirements.extend(req.required_plugin_versions),
                    Err(e) => result.add_error(format!(
                        "item {}: invalid required_plugin_versions: {}",
                        index, e
                    )),
                }
            } else {
                let kind = map
                    .keys()
                    .next()
                    .and_then(|k| k.as_str())
                    .unwrap_or("<unknown>")
                    .to_string();
                result.add_warning(format!(
                    "item {}: unknown item kind '{}', skipping",
                    index, kind
                ));
            }
        }

        if !result.successful {
            return result;
        }

        let rule_count = staged.len();
        for loaded in staged {
            match self
                .rules
                .iter_mut()
                .find(|r| r.rule.name == loaded.rule.name)
            {
                Some(existing) => *existing = loaded,
                None => self.rules.push(loaded),
            }
        }
        for req in requirements {
            self.required_plugin_versions
                .entry(req.name.clone())
                .or_default()
                .push(req);
        }

        if verbose {
            debug!(
                file = %file.name(),
                rules = rule_count,
                warnings = result.warnings.len(),
                "loaded rules file"
            );
        }

        result
    }

    fn stage_rule(&self, rule: Rule, staged: &mut Vec<LoadedRule>, result: &mut LoadResult) {
        if rule.output.trim().is_empty() {
            result.add_error(format!("rule {}: output is empty", rule.name));
            return;
        }

        let Some(binding) = self.sources.get(&rule.source) else {
            result.add_warning(format!(
                "rule {}: source {} is not enabled, skipping",
                rule.name, rule.source
            ));
            return;
        };

        let filter = match binding.filter.compile(&rule.condition) {
            Ok(filter) => filter,
            Err(e) => {
                result.add_error(format!("rule {}: {}", rule.name, e));
                return;
            }
        };

        let redefined = self.rules.iter().any(|r| r.rule.name == rule.name)
            || staged.iter().any(|r| r.rule.name == rule.name);
        if redefined {
            result.add_warning(format!("rule {}: redefined, later definition wins", rule.name));
            staged.retain(|r| r.rule.name != rule.name);
        }

        staged.push(LoadedRule { rule, filter });
    }

    /// Enable or disable every rule whose name contains `substring`
    ///
    /// The empty substring matches every rule. Returns the number of rules
    /// matched.
    pub fn enable_rule(&mut self, substring: &str, enabled: bool) -> usize {
        let mut matched = 0;
        for loaded in self
            .rules
            .iter_mut()
            .filter(|r| r.rule.name.contains(substring))
        {
            loaded.rule.enabled = enabled;
            matched += 1;
        }
        matched
    }

    /// Enable or disable every rule carrying any of `tags`
    pub fn enable_rule_by_tag(&mut self, tags: &BTreeSet<String>, enabled: bool) -> usize {
        let mut matched = 0;
        for loaded in self.rules.iter_mut().filter(|r| r.rule.has_any_tag(tags)) {
            loaded.rule.enabled = enabled;
            matched += 1;
        }
        matched
    }

    /// Check a plugin version against the loaded rules' requirements
    ///
    /// `Err` carries the first requirement the version does not satisfy.
    /// Plugins the rules never mention are always compatible.
    pub fn is_plugin_compatible(&self, name: &str, version: &Version) -> Result<(), Version> {
        match self
            .required_plugin_versions
            .get(name)
            .and_then(|reqs| reqs.iter().find(|r| !r.is_satisfied_by(version)))
        {
            Some(req) => Err(req.version.clone()),
            None => Ok(()),
        }
    }

    /// Declared version requirements for a plugin
    pub fn required_plugin_versions(&self, name: &str) -> &[PluginRequirement] {
        self.required_plugin_versions
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of loaded rules, enabled or not
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// All loaded rules in load order
    pub fn rules(&self) -> &[LoadedRule] {
        &self.rules
    }

    /// Look up a rule by name
    pub fn rule(&self, name: &str) -> Option<&LoadedRule> {
        self.rules.iter().find(|r| r.rule.name == name)
    }

    /// Whether the named rule is enabled, or `None` if it is not loaded
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.rule(name).map(|r| r.rule.enabled)
    }

    /// Enabled rules in load order
    pub fn enabled_rules(&self) -> impl Iterator<Item = &LoadedRule> {
        self.rules.iter().filter(|r| r.rule.enabled)
    }

    /// Rules that take part in evaluation for `source`
    ///
    /// A rule is active when it is enabled and at least as severe as the
    /// minimum priority.
    pub fn active_rules<'a>(
        &'a self,
        source: &'a str,
    ) -> impl Iterator<Item = &'a LoadedRule> + 'a {
        let min = self.min_priority;
        self.rules.iter().filter(move |r| {
            r.rule.enabled && r.rule.source == source && r.rule.priority.meets(min)
        })
    }

    /// The minimum priority
    pub fn min_priority(&self) -> Priority {
        self.min_priority
    }

    /// The source registry this engine was built with
    pub fn sources(&self) -> &SourceFactoryRegistry {
        &self.sources
    }

    /// A rule's output template with the configured extra applied
    pub fn rule_output(&self, name: &str) -> Option<String> {
        self.rule(name).map(|r| self.apply_extra(&r.rule.output))
    }

    /// Render a rule's output with its source's formatter
    pub fn render_output(&self, name: &str, fields: &BTreeMap<String, String>) -> Option<String> {
        let loaded = self.rule(name)?;
        let binding = self.sources.get(&loaded.rule.source)?;
        Some(binding.formatter.render(&self.apply_extra(&loaded.rule.output), fields))
    }

    fn apply_extra(&self, output: &str) -> String {
        if self.extra.is_empty() {
            return output.to_string();
        }
        if self.replace_container_info && output.contains(CONTAINER_INFO) {
            return output.replace(CONTAINER_INFO, &self.extra);
        }
        format!("{} {}", output, self.extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{check_condition_syntax, CompiledFilter, OutputFormat};

    #[derive(Debug)]
    struct PlainFilter(&'static str);

    impl FilterFactory for PlainFilter {
        fn source(&self) -> &str {
            self.0
        }

        fn compile(&self, condition: &str) -> Result<CompiledFilter, String> {
            check_condition_syntax(condition)?;
            Ok(CompiledFilter {
                source: self.0.to_string(),
                condition: condition.to_string(),
                fields: Vec::new(),
            })
        }
    }

    #[derive(Debug, Default)]
    struct EchoFormatter(OutputFormat);

    impl FormatterFactory for EchoFormatter {
        fn set_output_format(&mut self, format: OutputFormat) {
            self.0 = format;
        }

        fn output_format(&self) -> OutputFormat {
            self.0
        }

        fn render(&self, output: &str, _fields: &BTreeMap<String, String>) -> String {
            output.to_string()
        }
    }

    fn engine() -> RulesEngine {
        let mut engine = RulesEngine::new();
        engine.add_source(
            "syscall",
            Arc::new(PlainFilter("syscall")),
            Arc::new(EchoFormatter::default()),
        );
        engine
    }

    const RULES: &str = r#"
- required_plugin_versions:
    - name: cloudtrail
      version: 0.2.0
- rule: Shell in container
  condition: evt.type = execve and proc.name = bash
  output: "shell (%container.info)"
  priority: WARNING
  tags: [container, shell]
- rule: Write below etc
  condition: evt.type = open and fd.name startswith /etc
  output: "write below etc"
  priority: ERROR
  tags: [filesystem]
- rule: Cloudtrail console login
  source: aws_cloudtrail
  condition: ct.name = ConsoleLogin
  output: login
  priority: NOTICE
"#;

    #[test]
    fn test_load_rules_skips_unknown_sources() {
        let mut engine = engine();
        let res = engine.load_rules(&RuleFile::new("rules.yaml", RULES), false);

        assert!(res.successful, "{:?}", res.errors);
        assert_eq!(engine.num_rules(), 2);
        assert_eq!(res.warnings.len(), 1);
        assert!(res.warnings[0].contains("aws_cloudtrail"));
    }

    #[test]
    fn test_failed_file_adds_nothing() {
        let mut engine = engine();
        let content = r#"
- rule: Good
  condition: evt.type = execve
  output: ok
  priority: INFO
- rule: Bad
  condition: (evt.type = execve
  output: bad
  priority: INFO
"#;
        let res = engine.load_rules(&RuleFile::new("bad.yaml", content), false);
        assert!(!res.successful);
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].starts_with("rule Bad:"));
        assert_eq!(engine.num_rules(), 0);
    }

    #[test]
    fn test_non_sequence_and_empty_files() {
        let mut engine = engine();
        let res = engine.load_rules(&RuleFile::new("map.yaml", "rule: x"), false);
        assert!(!res.successful);

        let res = engine.load_rules(&RuleFile::new("empty.yaml", ""), false);
        assert!(res.successful);
        assert_eq!(res.warnings, vec!["file contains no rules".to_string()]);
    }

    #[test]
    fn test_redefinition_replaces_rule() {
        let mut engine = engine();
        engine.load_rules(&RuleFile::new("a.yaml", RULES), false);
        let override_rules = r#"
- rule: Write below etc
  condition: evt.type = open
  output: "overridden"
  priority: CRITICAL
"#;
        let res = engine.load_rules(&RuleFile::new("b.yaml", override_rules), false);
        assert!(res.successful);
        assert_eq!(res.warnings.len(), 1);
        assert_eq!(engine.num_rules(), 2);
        assert_eq!(engine.rule("Write below etc").unwrap().rule.priority, Priority::Critical);
    }

    #[test]
    fn test_enable_by_substring_and_tag() {
        let mut engine = engine();
        engine.load_rules(&RuleFile::new("rules.yaml", RULES), false);

        assert_eq!(engine.enable_rule("etc", false), 1);
        assert_eq!(engine.is_enabled("Write below etc"), Some(false));
        assert_eq!(engine.enabled_rules().count(), 1);

        assert_eq!(engine.enable_rule("", false), 2);
        let tags: BTreeSet<String> = ["filesystem".to_string()].into();
        assert_eq!(engine.enable_rule_by_tag(&tags, true), 1);
        assert_eq!(engine.is_enabled("Write below etc"), Some(true));
        assert_eq!(engine.is_enabled("Shell in container"), Some(false));
        assert_eq!(engine.is_enabled("missing"), None);
    }

    #[test]
    fn test_plugin_compatibility() {
        let mut engine = engine();
        engine.load_rules(&RuleFile::new("rules.yaml", RULES), false);

        assert!(engine.is_plugin_compatible("cloudtrail", &Version::new(0, 2, 3)).is_ok());
        assert_eq!(
            engine.is_plugin_compatible("cloudtrail", &Version::new(0, 1, 0)),
            Err(Version::new(0, 2, 0))
        );
        assert!(engine.is_plugin_compatible("okta", &Version::new(0, 0, 1)).is_ok());

        let declared = engine.required_plugin_versions("cloudtrail");
        assert_eq!(declared.len(), 1);
        assert_eq!(declared[0].version, Version::new(0, 2, 0));
        assert!(engine.required_plugin_versions("okta").is_empty());
    }

    #[test]
    fn test_min_priority_filters_active_rules() {
        let mut engine = engine();
        engine.load_rules(&RuleFile::new("rules.yaml", RULES), false);

        engine.set_min_priority(Priority::Error);
        let active: Vec<_> = engine.active_rules("syscall").map(|r| r.rule.name.as_str()).collect();
        assert_eq!(active, vec!["Write below etc"]);
    }

    #[test]
    fn test_extra_output() {
        let mut engine = engine();
        engine.load_rules(&RuleFile::new("rules.yaml", RULES), false);

        engine.set_extra("k8s=%k8s.pod.name", true);
        assert_eq!(engine.rule_output("Shell in container").unwrap(), "shell (k8s=%k8s.pod.name)");
        assert_eq!(
            engine.rule_output("Write below etc").unwrap(),
            "write below etc k8s=%k8s.pod.name"
        );

        engine.set_extra("k8s=%k8s.pod.name", false);
        assert_eq!(
            engine.render_output("Shell in container", &BTreeMap::new()).unwrap(),
            "shell (%container.info) k8s=%k8s.pod.name"
        );
    }
}
