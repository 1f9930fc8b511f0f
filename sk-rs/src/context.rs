//! Per-compilation state.
//!
//! Everything that is file-scoped while a script compiles lives in one
//! [`CompileContext`] value that is passed down through every compiler call.
//! Two files never share a context, so they can be compiled on different
//! threads, and a single trigger can be compiled in isolation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::delay::DelayState;
use crate::diag::{Diagnostic, Diagnostics, Severity};
use crate::event::ActiveEvent;
use crate::value::ItemType;

#[derive(Debug, Default)]
pub struct CompileContext {
    /// Script being compiled; `None` for standalone compiles.
    pub file: Option<PathBuf>,
    /// Event whose body is being compiled.
    pub event: Option<ActiveEvent>,
    /// Whether a suspension point has occurred on the current path.
    pub delay: DelayState,
    /// `options` section: name → replacement text.
    pub options: HashMap<String, String>,
    /// `aliases` section: lowercased name → item type.
    pub aliases: HashMap<String, ItemType>,
    depth: usize,
    line: usize,
    diagnostics: Diagnostics,
}

impl CompileContext {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    pub fn for_file(file: &Path) -> Self {
        Self::new(Some(file.to_owned()))
    }

    /// Line later diagnostics are attributed to.
    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.report(Severity::Error, message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.report(Severity::Warning, message.into());
    }

    fn report(&mut self, severity: Severity, message: String) {
        self.diagnostics.report(Diagnostic {
            severity,
            message,
            file: self.file.clone(),
            line: self.line,
        });
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.error_count()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Current block nesting depth (0 inside a trigger body).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn enter_block(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Indentation for debug output of the current block.
    pub(crate) fn indent(&self) -> String {
        "    ".repeat(self.depth)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
