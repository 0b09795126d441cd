//! Diagnostics collected during evaluation, graph building and walks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the operation.
    Error,
    /// Informational; the operation continues.
    Warning,
}

/// What part of the engine produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Malformed or invalid configuration.
    Config,
    /// An expression failed to evaluate.
    Evaluation,
    /// A value needed now is only known after apply.
    UnknownValue,
    /// A sensitive value reached a place that forbids it.
    SensitivityViolation,
    /// The dependency graph contains a cycle.
    Cycle,
    /// A provider action failed.
    ProviderAction,
    /// Recorded state no longer matches reality or the plan.
    Drift,
    /// A node did not run because a dependency failed.
    Skipped,
    /// A node did not run because the walk was cancelled.
    Cancelled,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Evaluation => "evaluation",
            Self::UnknownValue => "unknown value",
            Self::SensitivityViolation => "sensitivity",
            Self::Cycle => "cycle",
            Self::ProviderAction => "provider",
            Self::Drift => "drift",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Where in the configuration a diagnostic points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// Configuration file name.
    pub file: String,
    /// Attribute path within the file, e.g. `resources[0].attributes.name`.
    pub path: String,
    /// Byte offset where the expression text starts.
    pub start: usize,
    /// Byte offset where the expression text ends.
    pub end: usize,
}

impl SourceRange {
    /// Creates a range covering a whole attribute.
    #[must_use]
    pub fn new(file: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            path: path.into(),
            start: 0,
            end: 0,
        }
    }

    /// Returns the same location narrowed to a byte span.
    #[must_use]
    pub fn span(&self, start: usize, end: usize) -> Self {
        Self {
            file: self.file.clone(),
            path: self.path.clone(),
            start,
            end,
        }
    }

    /// Returns a location for a child attribute.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let path = if segment.starts_with('[') || self.path.is_empty() {
            format!("{}{segment}", self.path)
        } else {
            format!("{}.{segment}", self.path)
        };
        Self::new(self.file.clone(), path)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end > self.start {
            write!(f, "{} {} [{}..{}]", self.file, self.path, self.start, self.end)
        } else {
            write!(f, "{} {}", self.file, self.path)
        }
    }
}

/// One problem or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Category.
    pub kind: DiagnosticKind,
    /// One-line summary.
    pub summary: String,
    /// Longer explanation.
    pub detail: String,
    /// Configuration location, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<SourceRange>,
    /// Set when the problem stems from a value that is not yet known.
    #[serde(default)]
    pub caused_by_unknown: bool,
    /// Graph node the diagnostic belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
            caused_by_unknown: false,
            address: None,
        }
    }

    /// Creates a warning diagnostic.
    #[must_use]
    pub fn warning(
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, summary, detail)
        }
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_subject(mut self, subject: Option<SourceRange>) -> Self {
        self.subject = subject;
        self
    }

    /// Tags the diagnostic as caused by an unknown value.
    #[must_use]
    pub const fn caused_by_unknown(mut self) -> Self {
        self.caused_by_unknown = true;
        self
    }

    /// Attaches the graph node address, unless one is already set.
    #[must_use]
    pub fn for_address(mut self, address: impl Into<String>) -> Self {
        if self.address.is_none() {
            self.address = Some(address.into());
        }
        self
    }

    /// Returns true for errors.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{label}: {}", self.summary)?;
        if let Some(address) = &self.address {
            write!(f, " ({address})")?;
        }
        if let Some(subject) = &self.subject {
            write!(f, "\n  on {subject}")?;
        }
        if !self.detail.is_empty() {
            write!(f, "\n  {}", self.detail)?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Moves all diagnostics from `other` into `self`.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Adds one diagnostic, builder style.
    #[must_use]
    pub fn with(mut self, diagnostic: Diagnostic) -> Self {
        self.push(diagnostic);
        self
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Iterates over error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    /// Iterates over warning diagnostics.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_error())
    }

    /// Number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Iterates over all diagnostics.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Orders diagnostics by node address, keeping the order within a node.
    /// Diagnostics without an address come first.
    pub fn sort_by_address(&mut self) {
        self.0.sort_by(|a, b| a.address.cmp(&b.address));
    }

    /// Sets the node address on every diagnostic that lacks one.
    #[must_use]
    pub fn for_address(self, address: &str) -> Self {
        Self(self.0.into_iter().map(|d| d.for_address(address)).collect())
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
