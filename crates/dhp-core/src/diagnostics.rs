//! Structural diagnostics for street-graph validation.
//!
//! [`StreetGraph::validate_into`](crate::StreetGraph::validate_into) reports
//! its findings here instead of failing on the first defect, so a single
//! pass can surface every data issue at once. Errors mark graphs a
//! clustering run cannot trust; warnings flag oddities that are safe to
//! cluster but worth a log line. Findings name the graph element that
//! triggered them — the graph is the source of truth, not an input file.
//!
//! # Example
//!
//! ```
//! use dhp_core::diagnostics::Diagnostics;
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("structure", "street graph has no buildings");
//! diag.add_error_with_entity("geometry", "non-finite position", "b7");
//!
//! assert!(diag.has_errors());
//! assert_eq!(diag.summary(), "1 error, 1 warning");
//! ```

use serde::Serialize;
use std::fmt;

/// Weight of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Odd but clusterable, e.g. a zero-length segment.
    Warning,
    /// The graph cannot be trusted for a run, e.g. non-finite coordinates.
    Error,
}

/// One validation finding, optionally naming the element that caused it.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key, e.g. "structure" or "geometry".
    pub category: String,
    pub message: String,
    /// Name of the offending element, e.g. a building or segment label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{severity}:{}] {}", self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({entity})")?;
        }
        Ok(())
    }
}

/// Findings collected over one validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.push(Severity::Warning, category, message, None);
    }

    /// Warn about a specific named element.
    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.push(Severity::Warning, category, message, Some(entity));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.push(Severity::Error, category, message, None);
    }

    /// Flag a specific named element as unusable.
    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.push(Severity::Error, category, message, Some(entity));
    }

    fn push(&mut self, severity: Severity, category: &str, message: &str, entity: Option<&str>) {
        self.issues.push(DiagnosticIssue {
            severity,
            category: category.to_string(),
            message: message.to_string(),
            entity: entity.map(str::to_string),
        });
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Error findings in insertion order.
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning findings in insertion order.
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Count summary for a log line, e.g. "2 errors, 1 warning".
    pub fn summary(&self) -> String {
        fn counted(count: usize, noun: &str) -> String {
            if count == 1 {
                format!("1 {noun}")
            } else {
                format!("{count} {noun}s")
            }
        }

        match (self.error_count(), self.warning_count()) {
            (0, 0) => "no issues".to_string(),
            (e, 0) => counted(e, "error"),
            (0, w) => counted(w, "warning"),
            (e, w) => format!("{}, {}", counted(e, "error"), counted(w, "warning")),
        }
    }
}
