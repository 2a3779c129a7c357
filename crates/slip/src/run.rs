//! Host-visible entry point for running a source file.
//!
//! `Core::run` performs the full pipeline: type check (all static
//! diagnostics surface before any evaluation), parse, interpret, lock the
//! kernel registries, and map the outcome to a process-style exit code.

use std::{fmt, path::PathBuf};

use tracing::{debug, error, info};

use crate::{
    check::Checker,
    interp::Interp,
    io::SharedPrint,
    parse::parse,
};

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct Options {
    pub file_path: PathBuf,
    pub include_paths: Vec<PathBuf>,
    pub working_directory: PathBuf,
    /// Fail the check on `match` pattern/value kind mismatches instead of
    /// warning.
    pub strict_match: bool,
}

impl Options {
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            include_paths: Vec::new(),
            working_directory: PathBuf::from("."),
            strict_match: false,
        }
    }
}

/// Construction-time failures of [`Core`].
#[derive(Debug)]
pub enum SetupError {
    MissingFile(PathBuf),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile(path) => write!(f, "file does not exist: {}", path.display()),
        }
    }
}

impl std::error::Error for SetupError {}

/// One configured run of the language core.
#[derive(Debug)]
pub struct Core {
    options: Options,
}

impl Core {
    /// Validates the options; the source file must exist.
    pub fn new(options: Options) -> Result<Self, SetupError> {
        if !options.file_path.exists() {
            return Err(SetupError::MissingFile(options.file_path));
        }
        Ok(Self { options })
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Checks, parses, and evaluates the configured file. Returns 0 on
    /// success and 1 on any diagnostic.
    #[must_use]
    pub fn run(&self) -> i32 {
        self.run_inner(None)
    }

    /// Same as [`Core::run`] with a caller-provided debug writer.
    #[must_use]
    pub fn run_with_print(&self, print: SharedPrint) -> i32 {
        self.run_inner(Some(print))
    }

    fn run_inner(&self, print: Option<SharedPrint>) -> i32 {
        let options = &self.options;
        info!(file = %options.file_path.display(), "loading source file");

        let mut checker = Checker::new(
            options.include_paths.clone(),
            options.working_directory.clone(),
        );
        checker.set_strict_match(options.strict_match);
        if let Err(e) = checker.check_file(&options.file_path) {
            error!("{e}");
            return 1;
        }

        let source = match std::fs::read_to_string(&options.file_path) {
            Ok(source) => source,
            Err(e) => {
                error!(file = %options.file_path.display(), "failed to read source: {e}");
                return 1;
            }
        };
        debug!(bytes = source.len(), "source loaded");

        let root = match parse(&source) {
            Ok(root) => root,
            Err(e) => {
                error!(position = e.position, "parse error: {e}");
                return 1;
            }
        };
        info!("parse successful");

        let mut interp = match print {
            Some(print) => Interp::with_print(
                options.include_paths.clone(),
                options.working_directory.clone(),
                print,
            ),
            None => Interp::new(
                options.include_paths.clone(),
                options.working_directory.clone(),
            ),
        };

        if let Err(e) = interp.eval(&root) {
            error!("{e}");
            return 1;
        }

        for name in interp.kernels().function_names() {
            debug!(function = name, "kernel function available");
        }
        interp.lock();
        info!("execution complete");
        0
    }
}
