//! Filter and formatter factory traits
//!
//! Every event source needs a filter factory (turns rule conditions into
//! per-event matchers) and a formatter factory (renders rule outputs). The
//! expression languages themselves belong to the evaluation engine; the
//! factories here only check what the build step needs to know: that a
//! condition is well formed and that its fields exist for the source.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::capture::CaptureHandle;
use crate::types::OutputFormat;

/// A rule condition accepted by a filter factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    /// Source the condition was compiled for
    pub source: String,

    /// Original condition text
    pub condition: String,

    /// Fields referenced by the condition, in order of first use
    pub fields: Vec<String>,
}

/// Builds filters for one event source
pub trait FilterFactory: Send + Sync + Debug {
    /// Name of the source this factory serves
    fn source(&self) -> &str;

    /// Compile a rule condition, returning a human-readable error on failure
    fn compile(&self, condition: &str) -> Result<CompiledFilter, String>;

    /// Capture handle the factory's filters read events through, if any
    fn capture(&self) -> Option<&CaptureHandle> {
        None
    }
}

/// Renders rule outputs for one event source
pub trait FormatterFactory: Send + Sync + Debug {
    /// Switch between text and JSON rendering
    fn set_output_format(&mut self, format: OutputFormat);

    /// Current rendering mode
    fn output_format(&self) -> OutputFormat;

    /// Render an output template against extracted field values
    fn render(&self, output: &str, fields: &BTreeMap<String, String>) -> String;

    /// Capture handle fields are extracted through, if any
    fn capture(&self) -> Option<&CaptureHandle> {
        None
    }
}

/// Operators whose right-hand side is a parenthesized value list
const LIST_OPERATORS: [&str; 3] = ["in", "intersects", "pmatch"];

/// Field scanner shared by the concrete factories
#[derive(Debug, Clone)]
pub struct FieldScanner {
    quoted: Regex,
    token: Regex,
    field: Regex,
    placeholder: Regex,
}

/// Where the condition walker is in a `<field> <op> <value>` comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Operand,
    Rest,
}

impl FieldScanner {
    /// Compile the scanner patterns
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            quoted: Regex::new(r#""[^"]*"|'[^']*'"#)?,
            token: Regex::new(r"[(),]|[=<>!]+|[^\s(),=<>!]+")?,
            field: Regex::new(r"^[a-z][a-z0-9_]*(?:\.[a-z0-9_]+)+(?:\[[^\]]*\])?$")?,
            placeholder: Regex::new(r"%([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)+(?:\[[^\]]*\])?)")?,
        })
    }

    /// Fields referenced by a condition
    ///
    /// Only tokens in operand position count: the start of the condition, or
    /// right after `and`, `or`, `not` or an opening parenthesis. Comparison
    /// values, value lists and quoted literals are never fields, so
    /// `image startswith docker.io/` does not yield `docker.io`.
    pub fn condition_fields(&self, condition: &str) -> Vec<String> {
        let stripped = self.quoted.replace_all(condition, " ");
        let mut fields: Vec<String> = Vec::new();
        // true for each open parenthesis that starts a value list
        let mut groups: Vec<bool> = Vec::new();
        let mut position = Position::Operand;
        let mut previous = "";

        for m in self.token.find_iter(&stripped) {
            let token = m.as_str();
            let in_list = groups.last().copied().unwrap_or(false);

            match token {
                "(" => {
                    let list = in_list || LIST_OPERATORS.contains(&previous);
                    groups.push(list);
                    position = Position::Operand;
                }
                ")" => {
                    groups.pop();
                    position = Position::Rest;
                }
                _ if in_list => {}
                "and" | "or" | "not" => position = Position::Operand,
                _ if position == Position::Operand => {
                    if self.field.is_match(token) && !fields.iter().any(|f| f == token) {
                        fields.push(token.to_string());
                    }
                    position = Position::Rest;
                }
                _ => {}
            }
            previous = token;
        }
        fields
    }

    /// Fields referenced by `%field` placeholders in an output template
    pub fn output_fields(&self, output: &str) -> Vec<String> {
        self.placeholder
            .captures_iter(output)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Substitute `%field` placeholders; unknown fields render as `<NA>`
    pub fn substitute(&self, output: &str, fields: &BTreeMap<String, String>) -> String {
        self.placeholder
            .replace_all(output, |caps: &regex::Captures<'_>| {
                fields
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| "<NA>".to_string())
            })
            .into_owned()
    }
}

/// Check that a condition is non-empty and well nested, skipping quoted text
pub fn check_condition_syntax(condition: &str) -> Result<(), String> {
    if condition.trim().is_empty() {
        return Err("condition is empty".to_string());
    }

    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;
    for c in condition.chars() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced ')' in condition: {}", condition));
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(format!("unterminated string in condition: {}", condition));
    }
    if depth != 0 {
        return Err(format!("unbalanced '(' in condition: {}", condition));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_fields_skip_literals() {
        let scanner = FieldScanner::new().unwrap();
        let fields = scanner.condition_fields(
            r#"evt.type = execve and proc.name = "evil.sh"
               and (proc.pname in ('a.b', bash) or evt.type = open)"#,
        );
        assert_eq!(fields, vec!["evt.type", "proc.name", "proc.pname"]);
    }

    #[test]
    fn test_dotted_values_are_not_fields() {
        let scanner = FieldScanner::new().unwrap();
        let fields = scanner.condition_fields(
            "ka.req.pod.containers.image startswith docker.io/ \
             and not (ka.target.namespace in (kube.system, ops.tools) or ka.verb=get)",
        );
        assert_eq!(
            fields,
            vec!["ka.req.pod.containers.image", "ka.target.namespace", "ka.verb"]
        );
    }

    #[test]
    fn test_unary_operator_and_macros() {
        let scanner = FieldScanner::new().unwrap();
        let fields =
            scanner.condition_fields("spawned_process and ct.srcip exists or evt.num > 1.5");
        assert_eq!(fields, vec!["ct.srcip", "evt.num"]);
    }

    #[test]
    fn test_indexed_field_kept_whole() {
        let scanner = FieldScanner::new().unwrap();
        let fields = scanner.condition_fields("ka.req.pod.containers.image[0] != nginx");
        assert_eq!(fields, vec!["ka.req.pod.containers.image[0]"]);
    }

    #[test]
    fn test_substitute_placeholders() {
        let scanner = FieldScanner::new().unwrap();
        let mut values = BTreeMap::new();
        values.insert("proc.name".to_string(), "bash".to_string());

        let out = scanner.substitute("shell %proc.name by %user.name", &values);
        assert_eq!(out, "shell bash by <NA>");
        assert_eq!(
            scanner.output_fields("shell %proc.name by %user.name"),
            vec!["proc.name", "user.name"]
        );
    }

    #[test]
    fn test_condition_syntax() {
        assert!(check_condition_syntax("(a.b = 1)").is_ok());
        assert!(check_condition_syntax("   ").is_err());
        assert!(check_condition_syntax("(a.b = 1").is_err());
        assert!(check_condition_syntax("a.b = 1)").is_err());
        assert!(check_condition_syntax(r#"proc.cmdline contains "(""#).is_ok());
        assert!(check_condition_syntax("proc.cmdline contains ')' and (a.b = 1)").is_ok());
        assert!(check_condition_syntax(r#"(proc.cmdline contains ")""#).is_err());
        assert!(check_condition_syntax(r#"proc.name = "bash"#).is_err());
    }
}
