//! The C-compatible contract between the slip runtime and native kernels.
//!
//! A kernel is a shared library that exports a single symbol:
//!
//! ```c
//! void kernel_init(slip_registry_t registry, const struct slip_api_table *api);
//! ```
//!
//! At load time the runtime calls `kernel_init` with an opaque registration
//! handle and a table of callbacks. The kernel registers its functions through
//! `register_function`; each registered function is later invoked with the
//! interpreter context and the *unevaluated* argument list, and may evaluate
//! arguments through the `eval` callback.
//!
//! Every `*mut SlipObject` returned by a constructor or by `eval` is owned by
//! the kernel until it is either returned from the kernel function (ownership
//! passes back to the runtime) or released with `release`. Strings obtained
//! from `as_string` / `as_symbol` are separate allocations and must be freed
//! with `free_string`.

use std::ffi::{c_char, c_int, c_void};

/// Opaque registration handle passed to `kernel_init`.
pub type SlipRegistry = c_void;
/// Opaque interpreter context passed to every kernel function.
pub type SlipContext = c_void;
/// Opaque value handle.
pub type SlipObject = c_void;

/// Value kind tags as seen across the ABI.
///
/// The discriminants match the runtime's on-the-wire tag values and must
/// never be renumbered.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipKind {
    None = 0,
    Some = 1,
    ParenList = 2,
    BraceList = 4,
    Str = 5,
    Symbol = 7,
    Rune = 8,
    Int = 9,
    Real = 10,
    BracketList = 11,
    Error = 12,
    Datum = 13,
    Aberrant = 14,
}

impl SlipKind {
    /// Maps a raw tag back to a kind, if the tag is known.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Some),
            2 => Some(Self::ParenList),
            4 => Some(Self::BraceList),
            5 => Some(Self::Str),
            7 => Some(Self::Symbol),
            8 => Some(Self::Rune),
            9 => Some(Self::Int),
            10 => Some(Self::Real),
            11 => Some(Self::BracketList),
            12 => Some(Self::Error),
            13 => Some(Self::Datum),
            14 => Some(Self::Aberrant),
            _ => None,
        }
    }
}

/// A kernel-provided function: receives the interpreter context and the
/// unevaluated call form (a paren list whose head is the function symbol).
pub type KernelFn =
    unsafe extern "C" fn(ctx: *mut SlipContext, args: *mut SlipObject) -> *mut SlipObject;

/// The callback table handed to `kernel_init`.
///
/// All function pointers are valid for the lifetime of the process; kernels
/// commonly stash the table pointer in a static during initialisation.
#[repr(C)]
pub struct SlipApiTable {
    /// Registers `function` under the loading kernel's prefix. `return_kind`
    /// is a [`SlipKind`] tag; `variadic` is 0 or 1. Returns 0 on success and
    /// non-zero when the name is already taken or the registry is locked.
    pub register_function: unsafe extern "C" fn(
        registry: *mut SlipRegistry,
        name: *const c_char,
        function: KernelFn,
        return_kind: u32,
        variadic: c_int,
    ) -> c_int,

    /// Evaluates `obj` in the interpreter's current context. A runtime fault
    /// is surfaced as an `Error`-kind object rather than unwinding across the
    /// boundary.
    pub eval: unsafe extern "C" fn(ctx: *mut SlipContext, obj: *mut SlipObject) -> *mut SlipObject,

    /// Returns the [`SlipKind`] tag of `obj`.
    pub get_kind: unsafe extern "C" fn(obj: *mut SlipObject) -> u32,
    pub as_int: unsafe extern "C" fn(obj: *mut SlipObject) -> i64,
    pub as_real: unsafe extern "C" fn(obj: *mut SlipObject) -> f64,
    /// Returns a newly allocated NUL-terminated copy of a string value, or a
    /// null pointer when `obj` is not a string. Free with `free_string`.
    pub as_string: unsafe extern "C" fn(obj: *mut SlipObject) -> *mut c_char,
    /// Returns a newly allocated NUL-terminated symbol name, or null when
    /// `obj` is not a symbol. Free with `free_string`.
    pub as_symbol: unsafe extern "C" fn(obj: *mut SlipObject) -> *mut c_char,

    pub list_size: unsafe extern "C" fn(obj: *mut SlipObject) -> usize,
    /// Returns the element at `index` of a list object, or null when out of
    /// range. The returned object is owned by the kernel.
    pub list_at: unsafe extern "C" fn(obj: *mut SlipObject, index: usize) -> *mut SlipObject,

    /// Returns 1 when `obj` is a `Some` wrapper carrying a value.
    pub some_has_value: unsafe extern "C" fn(obj: *mut SlipObject) -> c_int,
    /// Unwraps a `Some` object; null when `obj` is not a `Some`.
    pub some_get_value: unsafe extern "C" fn(obj: *mut SlipObject) -> *mut SlipObject,

    pub create_int: unsafe extern "C" fn(value: i64) -> *mut SlipObject,
    pub create_real: unsafe extern "C" fn(value: f64) -> *mut SlipObject,
    pub create_string: unsafe extern "C" fn(value: *const c_char) -> *mut SlipObject,
    pub create_symbol: unsafe extern "C" fn(name: *const c_char) -> *mut SlipObject,
    pub create_none: unsafe extern "C" fn() -> *mut SlipObject,
    /// Wraps `message` as an error value carrying a string payload.
    pub create_error: unsafe extern "C" fn(message: *const c_char) -> *mut SlipObject,
    pub create_paren_list:
        unsafe extern "C" fn(objects: *const *mut SlipObject, count: usize) -> *mut SlipObject,
    pub create_bracket_list:
        unsafe extern "C" fn(objects: *const *mut SlipObject, count: usize) -> *mut SlipObject,
    pub create_brace_list:
        unsafe extern "C" fn(objects: *const *mut SlipObject, count: usize) -> *mut SlipObject,

    /// Releases an object handle without returning it to the runtime.
    pub release: unsafe extern "C" fn(obj: *mut SlipObject),
    /// Frees a string returned by `as_string` / `as_symbol`.
    pub free_string: unsafe extern "C" fn(s: *mut c_char),
}

/// Name of the initialisation symbol every kernel library must export.
pub const KERNEL_INIT_SYMBOL: &[u8] = b"kernel_init";

/// Signature of the `kernel_init` entry point.
pub type KernelInitFn =
    unsafe extern "C" fn(registry: *mut SlipRegistry, api: *const SlipApiTable);
