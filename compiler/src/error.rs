use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use scss::ast::SourcePos;
use scss::parser::ParseError;
use thiserror::Error;

/// Evaluation-time failures.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Undefined variable: \"${0}\".")]
    UndefinedVariable(String),
    #[error("Undefined mixin {0}.")]
    UndefinedMixin(String),
    #[error("Undefined function {0}.")]
    UndefinedFunction(String),
    #[error("{function}: missing argument ${name}.")]
    MissingArgument { function: String, name: String },
    #[error("{0}")]
    Argument(String),
    #[error("${name}: {value} is not {} {expected}.", article(.expected))]
    Type {
        name: String,
        value: String,
        expected: String,
    },
    #[error("Incompatible units {0} and {1}.")]
    IncompatibleUnits(String, String),
    #[error("Undefined operation \"{left} {op} {right}\".")]
    UndefinedOperation {
        left: String,
        op: String,
        right: String,
    },
    #[error("{0} isn't a valid CSS value.")]
    InvalidCss(String),
    #[error("Invalid selector \"{selector}\": {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("\"{origin}\" failed to @extend \"{target}\". The selector \"{target}\" was not found.")]
    UnmatchedExtend { origin: String, target: String },
    #[error("{0}")]
    User(String),
    #[error("File to import not found or unreadable: {0}.")]
    ImportNotFound(String),
    #[error("An @import loop has been found: {0} imports itself")]
    ImportLoop(String),
    #[error("Maximum call stack size of {0} exceeded")]
    StackOverflow(usize),
    #[error("Variable lookup for ${0} exceeded the scope depth limit")]
    ScopeDepth(String),
    #[error("{0}")]
    Parse(ParseError),
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("{0}")]
    Custom(String),
}

/// Indefinite article for a type name in an error message.
fn article(noun: &str) -> &'static str {
    match noun.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

impl CompileError {
    pub fn custom(message: impl Into<String>) -> Self {
        CompileError::Custom(message.into())
    }

    pub fn type_error(name: &str, value: impl fmt::Display, expected: &str) -> Self {
        CompileError::Type {
            name: name.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// A compile error enriched with its source location and call stack.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: CompileError,
    pub span: Option<Range<usize>>,
    pub file_id: usize,
    /// Logical name of the file the error occurred in.
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
    /// Innermost frame first.
    pub trace: Vec<String>,
}

impl DiagnosticError {
    pub fn new(error: CompileError, pos: &SourcePos, file: Option<String>) -> Self {
        DiagnosticError {
            error,
            span: Some(pos.span.clone()),
            file_id: pos.file_id,
            file,
            line: pos.line,
            column: pos.column,
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut diagnostic = Diagnostic::new(Severity::Error).with_message(self.error.to_string());
        if let Some(span) = &self.span {
            diagnostic = diagnostic.with_labels(vec![Label::primary(self.file_id, span.clone())]);
        }
        if !self.trace.is_empty() {
            let mut note = String::from("call stack:");
            for line in &self.trace {
                note.push_str("\n  ");
                note.push_str(line);
            }
            diagnostic = diagnostic.with_notes(vec![note]);
        }
        diagnostic
    }
}

impl From<CompileError> for DiagnosticError {
    fn from(error: CompileError) -> Self {
        DiagnosticError {
            error,
            span: None,
            file_id: 0,
            file: None,
            line: 0,
            column: 0,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if self.line > 0 {
            match &self.file {
                Some(file) => write!(f, ": {} on line {}, at column {}", file, self.line, self.column)?,
                None => write!(f, ": line {}, column {}", self.line, self.column)?,
            }
        }
        for line in &self.trace {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticError {}

/// Error returned by a top-level compile.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] DiagnosticError),
}

impl Error {
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        match self {
            Error::Parse(err) => err.to_diagnostic(),
            Error::Compile(err) => err.to_diagnostic(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_and_trace() {
        let pos = SourcePos {
            file_id: 0,
            span: 4..9,
            line: 2,
            column: 5,
        };
        let err = DiagnosticError::new(
            CompileError::UndefinedVariable("x".into()),
            &pos,
            Some("a.scss".into()),
        )
        .with_trace(vec!["#0 @include m a.scss on line 7".into()]);
        let text = err.to_string();
        assert!(text.starts_with("Undefined variable: \"$x\"."));
        assert!(text.contains("a.scss on line 2, at column 5"));
        assert!(text.ends_with("#0 @include m a.scss on line 7"));
        assert_eq!(err.to_diagnostic().notes.len(), 1);
    }

    #[test]
    fn missing_argument_names_the_parameter() {
        let err = CompileError::MissingArgument {
            function: "f".into(),
            name: "a".into(),
        };
        assert_eq!(err.to_string(), "f: missing argument $a.");
    }

    #[test]
    fn type_errors_pick_the_article() {
        assert_eq!(
            CompileError::type_error("n", "1.5", "int").to_string(),
            "$n: 1.5 is not an int."
        );
        assert_eq!(
            CompileError::type_error("map", "1px", "map").to_string(),
            "$map: 1px is not a map."
        );
    }
}
