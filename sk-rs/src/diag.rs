//! Compile diagnostics.
//!
//! Problems in a script never abort compilation of the file: they are
//! recorded here, logged through `tracing`, and the offending line or
//! section is skipped.  The error count decides whether a compiled unit may
//! be cached.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    /// 1-based line, 0 when not tied to a line.
    pub line: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{sev}: {} ({})", self.message, file.display()),
            (Some(file), line) => {
                write!(f, "{sev}: {} ({}, line {line})", self.message, file.display())
            }
            (None, 0) => write!(f, "{sev}: {}", self.message),
            (None, line) => write!(f, "{sev}: {} (line {line})", self.message),
        }
    }
}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// Diagnostics collected while compiling one file.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diag: Diagnostic) {
        let file = diag.file.as_deref().map(Path::display);
        match diag.severity {
            Severity::Error => {
                self.errors += 1;
                error!(target: "script", file = ?file, line = diag.line, "{}", diag.message);
            }
            Severity::Warning => {
                warn!(target: "script", file = ?file, line = diag.line, "{}", diag.message);
            }
        }
        self.entries.push(diag);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

// ── DiagnosticLog ─────────────────────────────────────────────────────────────

/// Process-wide diagnostic log with a running error count.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    inner: Mutex<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Diagnostic>,
    errors: usize,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append diagnostics that were already reported through `tracing`.
    pub fn extend(&self, diags: impl IntoIterator<Item = Diagnostic>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for d in diags {
            if d.severity == Severity::Error {
                inner.errors += 1;
            }
            inner.entries.push(d);
        }
    }

    /// Report a file-level error that happened outside a compile context.
    pub fn error(&self, file: &Path, message: impl Into<String>) {
        let mut diags = Diagnostics::new();
        diags.report(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            file: Some(file.to_owned()),
            line: 0,
        });
        self.extend(diags.into_entries());
    }

    pub fn error_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).errors
    }

    /// Snapshot of every diagnostic reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
