//! Pluggable sink for `@warn`, `@debug` and deprecation notices.

use std::ops::Range;
use std::sync::Mutex;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// A non-fatal message raised while compiling.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub deprecation: bool,
    pub file: Option<String>,
    pub file_id: usize,
    pub span: Option<Range<usize>>,
    pub line: usize,
    /// Innermost frame first.
    pub trace: Vec<String>,
}

impl Warning {
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::new(Severity::Warning).with_message(&self.message);
        if let Some(span) = &self.span {
            diagnostic = diagnostic.with_labels(vec![Label::primary(self.file_id, span.clone())]);
        }
        if self.deprecation {
            diagnostic = diagnostic.with_notes(vec!["deprecated".to_string()]);
        }
        diagnostic
    }
}

pub trait Logger: Send + Sync {
    fn warn(&self, warning: &Warning);
    fn debug(&self, message: &str);
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn warn(&self, warning: &Warning) {
        let file = warning.file.as_deref().unwrap_or("stdin");
        if warning.deprecation {
            tracing::warn!(file, line = warning.line, "DEPRECATION WARNING: {}", warning.message);
        } else {
            tracing::warn!(file, line = warning.line, "WARNING: {}", warning.message);
        }
    }

    fn debug(&self, message: &str) {
        tracing::debug!("{}", message);
    }
}

/// Keeps warnings and debug output in memory.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    warnings: Mutex<Vec<Warning>>,
    debug: Mutex<Vec<String>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        CollectingLogger::default()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn debug_messages(&self) -> Vec<String> {
        self.debug.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.clear();
        }
        if let Ok(mut debug) = self.debug.lock() {
            debug.clear();
        }
    }
}

impl Logger for CollectingLogger {
    fn warn(&self, warning: &Warning) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning.clone());
        }
    }

    fn debug(&self, message: &str) {
        if let Ok(mut debug) = self.debug.lock() {
            debug.push(message.to_string());
        }
    }
}
