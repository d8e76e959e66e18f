//! Rules files and per-file load results

use std::fmt;
use std::fmt::Write as _;
use std::path::Path;

use vigil_core::Result;

/// A rules source: a name (usually the path) and its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFile {
    name: String,
    content: String,
}

impl RuleFile {
    /// Create a rules file from in-memory content
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a rules file from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(path.display().to_string(), content))
    }

    /// Read several rules files, stopping at the first unreadable one
    ///
    /// Convenience for callers that start from paths; the engine build
    /// itself only ever sees already-read files.
    pub fn open_all<I, P>(paths: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(Self::open).collect()
    }

    /// Name used in load reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw text
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Outcome of loading one rules file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Name of the file that was loaded
    pub filename: String,

    /// Whether the file loaded without errors
    pub successful: bool,

    /// Errors, in the order they were found
    pub errors: Vec<String>,

    /// Warnings, in the order they were found
    pub warnings: Vec<String>,
}

impl LoadResult {
    /// Start a successful, empty result for `filename`
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            successful: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record an error; the file is no longer successful
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.successful = false;
        self.errors.push(msg.into());
    }

    /// Record a warning
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Human-readable summary
    ///
    /// ```text
    /// rules.yaml: Invalid
    /// 1 Errors:
    /// - rule Foo: condition is empty
    /// ```
    pub fn as_string(&self, include_filename: bool, include_warnings: bool) -> String {
        let mut os = String::new();

        if include_filename {
            let _ = write!(os, "{}: ", self.filename);
        }
        os.push_str(if self.successful { "Ok" } else { "Invalid" });
        os.push('\n');

        if !self.errors.is_empty() {
            let _ = writeln!(os, "{} Errors:", self.errors.len());
            for err in &self.errors {
                let _ = writeln!(os, "- {}", err);
            }
        }

        if include_warnings && !self.warnings.is_empty() {
            let _ = writeln!(os, "{} Warnings:", self.warnings.len());
            for warning in &self.warnings {
                let _ = writeln!(os, "- {}", warning);
            }
        }

        os
    }
}

/// Aggregate result of loading every rules file of one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    results: Vec<LoadResult>,
    text: String,
}

impl LoadReport {
    /// Fold per-file results into one report
    ///
    /// Filenames are included only when more than one file was loaded;
    /// warnings only when `include_warnings` is set.
    pub fn from_results(results: Vec<LoadResult>, include_warnings: bool) -> Self {
        let include_filenames = results.len() > 1;
        let text = results
            .iter()
            .map(|r| r.as_string(include_filenames, include_warnings))
            .collect();
        Self { results, text }
    }

    /// Whether every file loaded
    pub fn successful(&self) -> bool {
        self.results.iter().all(|r| r.successful)
    }

    /// Per-file results, in load order
    pub fn results(&self) -> &[LoadResult] {
        &self.results
    }

    /// Total warnings across files, whether or not they appear in the text
    pub fn warning_count(&self) -> usize {
        self.results.iter().map(|r| r.warnings.len()).sum()
    }

    /// The aggregate text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the report, keeping only its text
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
