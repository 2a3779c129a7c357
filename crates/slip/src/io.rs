//! Output handling for the `debug` special form.
//!
//! Implement [`PrintWriter`] to capture or redirect debug output from
//! evaluated programs. The default implementation `StdPrint` writes to
//! stdout.

use std::{cell::RefCell, rc::Rc};

/// Receives one line per `debug` argument.
pub trait PrintWriter {
    fn write_line(&mut self, line: &str);
}

/// Shared writer handle threaded through the interpreter and any child
/// interpreters created for imports.
pub type SharedPrint = Rc<RefCell<dyn PrintWriter>>;

/// Wraps a writer into the shared handle the interpreter expects.
pub fn shared_print<W: PrintWriter + 'static>(writer: W) -> SharedPrint {
    Rc::new(RefCell::new(writer))
}

/// Default writer: one line to stdout per call.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Collects all output into a string; useful for testing or capturing debug
/// output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// The collected output so far.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }
}

/// Ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: &str) {}
}
