//! Error types for the checker and the interpreter.
//!
//! Parse failures live in [`crate::parse`]; this module covers the static
//! checking phase (`CheckError`, a diagnostic with optional file context) and
//! the evaluation phase (`RunError`). A `RunError` unwinds until a `recover`
//! frame intercepts it or the host boundary converts it into a non-zero exit.

use std::{fmt, path::PathBuf};

use crate::{arena::Kind, parse::ParseError};

/// Result alias for interpreter operations.
pub type RunResult<T> = Result<T, RunError>;

/// A fault raised during evaluation.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A paren list head that names nothing callable.
    UnknownCallable(String),
    /// A datum whose inner head is not a known directive.
    UnknownDatumCallable(String),
    /// A paren list whose head is not a symbol.
    NotCallable(Kind),
    /// Wrong number of arguments at a call site.
    Arity {
        callee: String,
        expected: usize,
        got: usize,
    },
    /// A value of the wrong kind where a specific kind was required.
    KindMismatch {
        context: &'static str,
        expected: Kind,
        got: Kind,
    },
    /// A special form used with a malformed shape.
    InvalidForm {
        form: &'static str,
        message: String,
    },
    /// A `:type` symbol that resolves to neither a base type nor a form.
    UnknownType(String),
    /// `done` evaluated with no enclosing `do`.
    DoneOutsideLoop,
    /// A failed `assert`, carrying its message.
    AssertionFailed(String),
    /// `at` past the end of a collection.
    IndexOutOfRange { index: i64, len: usize },
    /// An import or kernel load after the kernel lock transitioned.
    LoadLocked { what: &'static str },
    ImportFailed { path: String, message: String },
    /// A cycle in the import graph; the message enumerates the chain.
    CircularImport(String),
    KernelLoad { kernel: String, message: String },
    /// Second registration of an already-registered kernel function.
    DuplicateKernelFunction(String),
    /// A parse failure from the `eval` special form.
    Parse(ParseError),
    Io { path: String, message: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCallable(name) => write!(f, "unknown callable symbol: {name}"),
            Self::UnknownDatumCallable(name) => {
                write!(f, "unknown datum callable symbol: {name}")
            }
            Self::NotCallable(kind) => write!(f, "cannot call non-symbol value of kind {kind}"),
            Self::Arity {
                callee,
                expected,
                got,
            } => write!(f, "{callee} expects {expected} argument(s), got {got}"),
            Self::KindMismatch {
                context,
                expected,
                got,
            } => write!(f, "{context}: expected {expected}, got {got}"),
            Self::InvalidForm { form, message } => write!(f, "{form}: {message}"),
            Self::UnknownType(symbol) => write!(f, "invalid type symbol: {symbol}"),
            Self::DoneOutsideLoop => write!(f, "done called outside of do loop"),
            Self::AssertionFailed(message) => write!(f, "assertion failed: {message}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for collection of length {len}")
            }
            Self::LoadLocked { what } => {
                write!(f, "{what} attempted after the kernel lock transitioned")
            }
            Self::ImportFailed { path, message } => {
                write!(f, "import of {path} failed: {message}")
            }
            Self::CircularImport(message) => write!(f, "{message}"),
            Self::KernelLoad { kernel, message } => {
                write!(f, "failed to load kernel {kernel}: {message}")
            }
            Self::DuplicateKernelFunction(name) => {
                write!(f, "kernel function already registered: {name}")
            }
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::Io { path, message } => write!(f, "{path}: {message}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ParseError> for RunError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

/// A diagnostic from the type-checking phase.
#[derive(Debug, Clone)]
pub struct CheckError {
    message: String,
    file: Option<PathBuf>,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
        }
    }

    /// Attaches the file being checked, keeping an already-recorded file.
    #[must_use]
    pub fn in_file(mut self, file: &std::path::Path) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_path_buf());
        }
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "type check failed in {}: {}", file.display(), self.message),
            None => write!(f, "type check failed: {}", self.message),
        }
    }
}

impl std::error::Error for CheckError {}
