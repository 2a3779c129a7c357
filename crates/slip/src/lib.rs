//! An S-expression language runtime: the slip core.
//!
//! A program is a single value in the slip format, usually a bracket list of
//! expressions. Running a file goes through four stages:
//!
//! 1. **Parse**: [`parse`] turns source text into a compact value graph
//!    ([`Value`]) over a contiguous arena with interned symbols.
//! 2. **Check**: [`Checker`] walks the graph without executing it,
//!    validating every call against its callable's signature, registering
//!    lambda signatures, and resolving imports and kernel declarations.
//! 3. **Evaluate**: [`Interp`] walks the same graph and produces values,
//!    dispatching special forms, user lambdas, and kernel functions.
//! 4. **Lock**: the first non-declarative top-level expression flips a
//!    one-way latch, after which further imports and kernel loads are
//!    refused.
//!
//! [`Core`] ties the stages together behind the host contract used by the
//! CLI. Native kernels plug in through the ABI defined in the `slip-abi`
//! crate; host applications can register Rust functions directly on the
//! [`KernelRegistry`].
//!
//! ```
//! use slip::{Interp, parse};
//!
//! let program = parse("[ (def x 41) (eq x 41) ]").unwrap();
//! let mut interp = Interp::new(vec![], ".".into());
//! let result = interp.eval(&program).unwrap();
//! assert_eq!(result.as_int(), Some(1));
//! ```

mod arena;
mod check;
mod error;
mod ffi;
mod imports;
mod intern;
mod interp;
mod io;
mod kernel;
mod parse;
mod run;
mod scope;
mod types;
mod value;

pub use crate::{
    arena::{Kind, UNIT_SIZE},
    check::Checker,
    error::{CheckError, RunError, RunResult},
    intern::SymbolTable,
    interp::Interp,
    io::{CollectStringPrint, NoPrint, PrintWriter, SharedPrint, StdPrint, shared_print},
    kernel::{
        HostKernelFn, KernelEntry, KernelManifest, KernelRegistry, MANIFEST_FILE,
        ManifestFunction, library_file_name, parse_manifest, read_manifest,
    },
    parse::{ParseError, ParseErrorKind, parse},
    run::{Core, Options, SetupError},
    scope::{LambdaDef, LambdaStore, Param, ScopeStack},
    types::{FormTable, Signature, TypeInfo, resolve_type_symbol, types_match},
    value::Value,
};
