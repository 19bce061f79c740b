//! Validation diagnostics and report rendering

use serde::{Deserialize, Serialize};
use std::fmt;

const LINE_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// What kind of check produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Required node or attribute absent
    Missing,
    /// Literal attribute with a different value
    ValueMismatch,
    /// Attribute value of the wrong type
    TypeMismatch,
    /// Dimension size or variable dimension list differs
    DimensionMismatch,
    /// Variable stored with a different data type
    DataTypeMismatch,
    /// Present in the file, absent from the definition
    UnknownElement,
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::Missing => "missing",
            Category::ValueMismatch => "value_mismatch",
            Category::TypeMismatch => "type_mismatch",
            Category::DimensionMismatch => "dimension_mismatch",
            Category::DataTypeMismatch => "data_type_mismatch",
            Category::UnknownElement => "unknown_element",
        }
    }
}

fn error() -> Severity {
    Severity::Error
}

fn warning() -> Severity {
    Severity::Warning
}

/// Severity assigned to each category. Configured under `[check.severity]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityPolicy {
    #[serde(default = "error")]
    pub missing: Severity,
    #[serde(default = "error")]
    pub value_mismatch: Severity,
    #[serde(default = "error")]
    pub type_mismatch: Severity,
    #[serde(default = "error")]
    pub dimension_mismatch: Severity,
    #[serde(default = "error")]
    pub data_type_mismatch: Severity,
    #[serde(default = "warning")]
    pub unknown_element: Severity,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        Self {
            missing: Severity::Error,
            value_mismatch: Severity::Error,
            type_mismatch: Severity::Error,
            dimension_mismatch: Severity::Error,
            data_type_mismatch: Severity::Error,
            unknown_element: Severity::Warning,
        }
    }
}

impl SeverityPolicy {
    pub fn severity_for(&self, category: Category) -> Severity {
        match category {
            Category::Missing => self.missing,
            Category::ValueMismatch => self.value_mismatch,
            Category::TypeMismatch => self.type_mismatch,
            Category::DimensionMismatch => self.dimension_mismatch,
            Category::DataTypeMismatch => self.data_type_mismatch,
            Category::UnknownElement => self.unknown_element,
        }
    }
}

/// One finding, addressed by its path from the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: Vec<String>,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// The constraint that failed, e.g. `<float32: derived_from_file>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl Diagnostic {
    pub fn path_string(&self) -> String {
        self.path.join(" -> ")
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.path_string(), self.message)
    }
}

/// How much of a report to print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Passed checks too
    #[default]
    All,
    WarningsAndErrors,
    ErrorsOnly,
    Quiet,
}

impl Verbosity {
    fn shows(&self, severity: Severity) -> bool {
        match self {
            Verbosity::All | Verbosity::WarningsAndErrors => true,
            Verbosity::ErrorsOnly => severity == Severity::Error,
            Verbosity::Quiet => false,
        }
    }
}

/// Diagnostics in traversal order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
    /// Paths of checks that passed, each with the number of diagnostics
    /// recorded before it so the two interleave in traversal order
    #[serde(default)]
    pub passed: Vec<(usize, Vec<String>)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn pass(&mut self, path: Vec<String>) {
        self.passed.push((self.diagnostics.len(), path));
    }

    /// Checks made, passed or not
    pub fn check_count(&self) -> usize {
        self.passed.len() + self.diagnostics.len()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// No error-severity diagnostics
    pub fn is_compliant(&self) -> bool {
        self.error_count() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Summary line: `OK`, or `ERROR (2 errors, 1 warnings)`
    pub fn summary(&self) -> String {
        if self.is_compliant() {
            "OK".to_string()
        } else {
            format!(
                "ERROR ({} errors, {} warnings)",
                self.error_count(),
                self.warning_count()
            )
        }
    }

    /// Human-readable report. Quiet rendering is empty; the caller relies on
    /// the exit status alone.
    pub fn render(&self, verbosity: Verbosity, file: &str, definition: &str) -> String {
        if verbosity == Verbosity::Quiet {
            return String::new();
        }

        let rule = "-".repeat(LINE_LEN);
        let mut out = Vec::new();
        out.push(rule.clone());
        out.push(format!("Checking {} against {}", file, definition));
        out.push(rule.clone());

        let mut passed = self.passed.iter().peekable();
        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            while let Some((_, path)) = passed.next_if(|(position, _)| *position <= index) {
                if verbosity == Verbosity::All {
                    out.push(format!("{:<7} {}", "OK", path.join(" -> ")));
                }
            }
            if verbosity.shows(diagnostic.severity) {
                out.push(format!("{:<7} {}", diagnostic.severity.to_string(), diagnostic));
            }
        }
        if verbosity == Verbosity::All {
            for (_, path) in passed {
                out.push(format!("{:<7} {}", "OK", path.join(" -> ")));
            }
            out.push(format!("{} checks", self.check_count()));
        }

        out.push(self.summary());
        out.push(rule);
        out.join("\n") + "\n"
    }
}
