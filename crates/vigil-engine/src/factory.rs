//! Filter and formatter factories for each kind of event source
//!
//! Syscall and plugin factories are bound to the capture handle. They only
//! keep the handle; the inspector behind it is dereferenced during
//! evaluation, on the thread that fetched the snapshot.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use vigil_core::{
    check_condition_syntax, CaptureHandle, CompiledFilter, EventSource, FieldScanner,
    FilterCheckList, FilterFactory, FormatterFactory, OutputFormat, Result, K8S_AUDIT_SOURCE,
    SYSCALL_SOURCE,
};

/// Field prefixes understood by the Kubernetes audit source
const K8S_AUDIT_PREFIXES: [&str; 2] = ["ka.", "jevt."];

/// Event fields every capture-backed source exposes
const EVT_PREFIX: &str = "evt.";

/// Build the factory pair for one source
///
/// When `json_output` is set the formatter renders JSON.
pub fn source_factories(
    source: &EventSource,
    capture: &CaptureHandle,
    plugin_filter_checks: &Arc<FilterCheckList>,
    json_output: bool,
) -> Result<(Arc<dyn FilterFactory>, Arc<dyn FormatterFactory>)> {
    let scanner = FieldScanner::new()?;

    let filter: Arc<dyn FilterFactory>;
    let mut formatter: Box<dyn FormatterFactory>;
    match source {
        EventSource::Syscall => {
            filter = Arc::new(SyscallFilterFactory::new(capture.clone(), scanner.clone()));
            formatter = Box::new(EventFormatterFactory::new(capture.clone(), scanner));
        }
        EventSource::K8sAudit => {
            filter = Arc::new(JsonEventFilterFactory::new(scanner.clone()));
            formatter = Box::new(JsonEventFormatterFactory::new(scanner));
        }
        EventSource::Plugin(name) => {
            filter = Arc::new(PluginFilterFactory::new(
                name.clone(),
                capture.clone(),
                Arc::clone(plugin_filter_checks),
                scanner.clone(),
            ));
            formatter = Box::new(EventFormatterFactory::new(capture.clone(), scanner));
        }
    }

    if json_output {
        formatter.set_output_format(OutputFormat::Json);
    }

    Ok((filter, Arc::from(formatter)))
}

fn compile_with(
    source: &str,
    scanner: &FieldScanner,
    condition: &str,
    mut check_field: impl FnMut(&str) -> std::result::Result<(), String>,
) -> std::result::Result<CompiledFilter, String> {
    check_condition_syntax(condition)?;
    let fields = scanner.condition_fields(condition);
    for field in &fields {
        check_field(field)?;
    }
    Ok(CompiledFilter {
        source: source.to_string(),
        condition: condition.to_string(),
        fields,
    })
}

/// Filter factory for syscall events
#[derive(Debug)]
pub struct SyscallFilterFactory {
    capture: CaptureHandle,
    scanner: FieldScanner,
}

impl SyscallFilterFactory {
    /// Create a factory bound to the capture handle
    pub fn new(capture: CaptureHandle, scanner: FieldScanner) -> Self {
        Self { capture, scanner }
    }
}

impl FilterFactory for SyscallFilterFactory {
    fn source(&self) -> &str {
        SYSCALL_SOURCE
    }

    fn compile(&self, condition: &str) -> std::result::Result<CompiledFilter, String> {
        compile_with(SYSCALL_SOURCE, &self.scanner, condition, |_| Ok(()))
    }

    fn capture(&self) -> Option<&CaptureHandle> {
        Some(&self.capture)
    }
}

/// Filter factory for Kubernetes audit events (JSON documents)
#[derive(Debug)]
pub struct JsonEventFilterFactory {
    scanner: FieldScanner,
}

impl JsonEventFilterFactory {
    /// Create a factory
    pub fn new(scanner: FieldScanner) -> Self {
        Self { scanner }
    }
}

impl FilterFactory for JsonEventFilterFactory {
    fn source(&self) -> &str {
        K8S_AUDIT_SOURCE
    }

    fn compile(&self, condition: &str) -> std::result::Result<CompiledFilter, String> {
        compile_with(K8S_AUDIT_SOURCE, &self.scanner, condition, |field| {
            if K8S_AUDIT_PREFIXES.iter().any(|p| field.starts_with(p)) {
                Ok(())
            } else {
                Err(format!("field {} is not a {} field", field, K8S_AUDIT_SOURCE))
            }
        })
    }
}

/// Filter factory for a plugin-provided source
///
/// Fields resolve through the filter checks shared by every plugin source of
/// the same build.
#[derive(Debug)]
pub struct PluginFilterFactory {
    source: String,
    capture: CaptureHandle,
    checks: Arc<FilterCheckList>,
    scanner: FieldScanner,
}

impl PluginFilterFactory {
    /// Create a factory for `source`
    pub fn new(
        source: impl Into<String>,
        capture: CaptureHandle,
        checks: Arc<FilterCheckList>,
        scanner: FieldScanner,
    ) -> Self {
        Self {
            source: source.into(),
            capture,
            checks,
            scanner,
        }
    }
}

impl FilterFactory for PluginFilterFactory {
    fn source(&self) -> &str {
        &self.source
    }

    fn compile(&self, condition: &str) -> std::result::Result<CompiledFilter, String> {
        compile_with(&self.source, &self.scanner, condition, |field| {
            if field.starts_with(EVT_PREFIX) || self.checks.contains_field(field) {
                Ok(())
            } else {
                Err(format!("unknown field {} for source {}", field, self.source))
            }
        })
    }

    fn capture(&self) -> Option<&CaptureHandle> {
        Some(&self.capture)
    }
}

fn render_with(
    scanner: &FieldScanner,
    format: OutputFormat,
    output: &str,
    fields: &BTreeMap<String, String>,
) -> String {
    let text = scanner.substitute(output, fields);
    match format {
        OutputFormat::Text => text,
        OutputFormat::Json => {
            let output_fields: Map<String, Value> = scanner
                .output_fields(output)
                .into_iter()
                .map(|f| {
                    let value = fields.get(&f).map_or(Value::Null, |v| Value::String(v.clone()));
                    (f, value)
                })
                .collect();
            json!({ "output": text, "output_fields": output_fields }).to_string()
        }
    }
}

/// Formatter factory for capture-backed sources (syscall and plugins)
#[derive(Debug)]
pub struct EventFormatterFactory {
    capture: CaptureHandle,
    scanner: FieldScanner,
    format: OutputFormat,
}

impl EventFormatterFactory {
    /// Create a text formatter bound to the capture handle
    pub fn new(capture: CaptureHandle, scanner: FieldScanner) -> Self {
        Self {
            capture,
            scanner,
            format: OutputFormat::Text,
        }
    }
}

impl FormatterFactory for EventFormatterFactory {
    fn set_output_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    fn output_format(&self) -> OutputFormat {
        self.format
    }

    fn render(&self, output: &str, fields: &BTreeMap<String, String>) -> String {
        render_with(&self.scanner, self.format, output, fields)
    }

    fn capture(&self) -> Option<&CaptureHandle> {
        Some(&self.capture)
    }
}

/// Formatter factory for Kubernetes audit events
#[derive(Debug)]
pub struct JsonEventFormatterFactory {
    scanner: FieldScanner,
    format: OutputFormat,
}

impl JsonEventFormatterFactory {
    /// Create a text formatter
    pub fn new(scanner: FieldScanner) -> Self {
        Self {
            scanner,
            format: OutputFormat::Text,
        }
    }
}

impl FormatterFactory for JsonEventFormatterFactory {
    fn set_output_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    fn output_format(&self) -> OutputFormat {
        self.format
    }

    fn render(&self, output: &str, fields: &BTreeMap<String, String>) -> String {
        render_with(&self.scanner, self.format, output, fields)
    }
}
