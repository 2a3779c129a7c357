//! Kernel manifests, the callable registry, and native library loading.
//!
//! A kernel is a directory containing a `kernel.slip` manifest and a shared
//! library. The manifest is itself a slip value:
//!
//! ```text
//! #(define-kernel kv "slip_kv" [
//!     (define-function store (key :str value :any) :none)
//! ])
//! ```
//!
//! The type checker consumes manifests to learn signatures; the interpreter
//! additionally loads the library and lets it register function pointers
//! through the ABI (see [`crate::ffi`]). Host code (and tests) may register
//! Rust functions directly through [`KernelRegistry::register_host`]; both
//! paths land in the same registry and are dispatched identically, so a
//! callable is always one of: special form, kernel entry, or lambda id.

use std::path::Path;

use ahash::AHashSet;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::{
    arena::Kind,
    error::{RunError, RunResult},
    ffi,
    interp::Interp,
    parse::parse,
    types::{FormTable, Signature, TypeInfo, resolve_type_symbol},
    value::Value,
};

/// File name of the kernel declaration manifest.
pub const MANIFEST_FILE: &str = "kernel.slip";

/// A host-side kernel function: receives the interpreter and the unevaluated
/// call form.
pub type HostKernelFn = fn(&mut Interp, &Value) -> RunResult<Value>;

/// One registered kernel callable.
#[derive(Clone, Copy)]
pub enum KernelEntry {
    /// A function pointer obtained from a loaded shared library.
    Native(slip_abi::KernelFn),
    /// A function registered directly by the host.
    Host(HostKernelFn),
}

impl std::fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native(_) => f.write_str("KernelEntry::Native"),
            Self::Host(_) => f.write_str("KernelEntry::Host"),
        }
    }
}

/// One declared function in a kernel manifest.
#[derive(Debug, Clone)]
pub struct ManifestFunction {
    pub name: String,
    pub params: SmallVec<[TypeInfo; 4]>,
    pub ret: TypeInfo,
    pub variadic: bool,
}

impl ManifestFunction {
    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature {
            params: self.params.clone(),
            ret: self.ret.clone(),
            variadic: self.variadic,
        }
    }
}

/// A parsed `kernel.slip` manifest.
#[derive(Debug, Clone)]
pub struct KernelManifest {
    pub name: String,
    pub library: String,
    pub functions: Vec<ManifestFunction>,
}

/// Parses manifest source. Malformed function entries are skipped with a
/// warning; a malformed manifest head is an error.
pub fn parse_manifest(source: &str) -> Result<KernelManifest, String> {
    let value = parse(source).map_err(|e| format!("failed to parse manifest: {e}"))?;
    if value.kind() != Kind::Datum {
        return Err("manifest must start with #(define-kernel ...)".to_owned());
    }
    let inner = value.inner().ok_or("manifest datum is empty")?;
    if inner.kind() != Kind::ParenList {
        return Err("define-kernel must be a paren list".to_owned());
    }
    if inner.len() < 4 {
        return Err("define-kernel requires: name, library, function list".to_owned());
    }
    if inner.element(0).and_then(|h| h.symbol_name().map(str::to_owned))
        != Some("define-kernel".to_owned())
    {
        return Err("manifest must start with #(define-kernel ...)".to_owned());
    }

    let name = inner
        .element(1)
        .and_then(|v| v.symbol_name().map(str::to_owned))
        .ok_or("kernel name must be a symbol")?;
    let library = inner
        .element(2)
        .and_then(|v| v.string_value())
        .ok_or("kernel library must be a string")?;
    let functions_list = inner
        .element(3)
        .filter(|v| v.kind() == Kind::BracketList)
        .ok_or("kernel functions must be a bracket list")?;

    // Manifest type symbols resolve against base types only; forms are a
    // per-program construct.
    let forms = FormTable::new();
    let mut functions = Vec::new();
    for entry in functions_list.elements() {
        match parse_manifest_function(&entry, &forms) {
            Some(function) => functions.push(function),
            None => warn!("skipping malformed function definition in kernel manifest"),
        }
    }

    Ok(KernelManifest {
        name,
        library,
        functions,
    })
}

fn parse_manifest_function(entry: &Value, forms: &FormTable) -> Option<ManifestFunction> {
    if entry.kind() != Kind::ParenList || entry.len() < 4 {
        return None;
    }
    if entry.element(0)?.symbol_name()? != "define-function" {
        return None;
    }
    let name = entry.element(1)?.symbol_name()?.to_owned();
    let params_list = entry.element(2).filter(|v| v.kind() == Kind::ParenList)?;
    let ret_symbol = entry.element(3)?;
    let ret = resolve_type_symbol(ret_symbol.symbol_name()?, forms)?;

    let mut params = SmallVec::new();
    let mut variadic = false;
    let count = params_list.len();
    let mut index = 0;
    while index + 1 < count {
        let type_symbol = params_list.element(index + 1)?;
        let param = resolve_type_symbol(type_symbol.symbol_name()?, forms)?;
        if param.variadic {
            variadic = true;
        }
        params.push(param);
        index += 2;
    }

    Some(ManifestFunction {
        name,
        params,
        ret,
        variadic,
    })
}

/// Reads and parses the manifest inside a kernel directory.
pub fn read_manifest(kernel_dir: &Path) -> Result<KernelManifest, String> {
    let manifest_path = kernel_dir.join(MANIFEST_FILE);
    let source = std::fs::read_to_string(&manifest_path)
        .map_err(|e| format!("could not read {}: {e}", manifest_path.display()))?;
    parse_manifest(&source)
}

/// Platform file name for a kernel's shared library.
#[must_use]
pub fn library_file_name(basename: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{basename}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{basename}.dylib")
    } else {
        format!("lib{basename}.so")
    }
}

/// Qualified-name → callable map shared by every dispatch path.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    functions: IndexMap<String, KernelEntry>,
    loaded: AHashSet<String>,
    // Loaded libraries are never unloaded while the registry lives; dropping
    // one would invalidate the function pointers registered from it.
    libraries: Vec<libloading::Library>,
}

impl KernelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, qualified_name: &str) -> bool {
        self.functions.contains_key(qualified_name)
    }

    #[must_use]
    pub fn get(&self, qualified_name: &str) -> Option<KernelEntry> {
        self.functions.get(qualified_name).copied()
    }

    /// Names of every registered function, in registration order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_loaded(&self, kernel_name: &str) -> bool {
        self.loaded.contains(kernel_name)
    }

    /// Registers a callable under its qualified `kernel/function` name.
    /// Registering an already-taken name is refused.
    pub fn register(&mut self, qualified_name: &str, entry: KernelEntry) -> RunResult<()> {
        if self.functions.contains_key(qualified_name) {
            return Err(RunError::DuplicateKernelFunction(qualified_name.to_owned()));
        }
        debug!(function = qualified_name, "registered kernel function");
        self.functions.insert(qualified_name.to_owned(), entry);
        Ok(())
    }

    /// Registers a host-side function. Convenience for embedders and tests.
    pub fn register_host(&mut self, qualified_name: &str, function: HostKernelFn) -> RunResult<()> {
        self.register(qualified_name, KernelEntry::Host(function))
    }

    /// Loads the kernel at `kernel_dir` and lets it register its functions.
    ///
    /// Loading the same kernel name twice is a no-op.
    pub fn load_kernel(&mut self, kernel_name: &str, kernel_dir: &Path) -> RunResult<()> {
        if self.loaded.contains(kernel_name) {
            debug!(kernel = kernel_name, "kernel already loaded");
            return Ok(());
        }

        let manifest = read_manifest(kernel_dir).map_err(|message| RunError::KernelLoad {
            kernel: kernel_name.to_owned(),
            message,
        })?;

        let library_path = kernel_dir.join(library_file_name(&manifest.library));
        // SAFETY: loading a kernel runs arbitrary library initialisation
        // code; that is the point of the plug-in mechanism, and the path was
        // resolved from the operator-configured include roots.
        let library = unsafe { libloading::Library::new(&library_path) }.map_err(|e| {
            RunError::KernelLoad {
                kernel: kernel_name.to_owned(),
                message: format!("could not load {}: {e}", library_path.display()),
            }
        })?;

        let init: slip_abi::KernelInitFn = {
            // SAFETY: the symbol is declared with the ABI's documented
            // signature; a library exporting it with a different shape is
            // undefined behaviour no host can guard against.
            let symbol = unsafe {
                library.get::<slip_abi::KernelInitFn>(slip_abi::KERNEL_INIT_SYMBOL)
            }
            .map_err(|e| RunError::KernelLoad {
                kernel: kernel_name.to_owned(),
                message: format!("missing kernel_init entry point: {e}"),
            })?;
            *symbol
        };

        let mut session = RegistrationSession {
            registry: self as *mut Self,
            prefix: kernel_name.to_owned(),
        };
        // SAFETY: the session pointer stays valid for the duration of the
        // call, and the API table is 'static.
        unsafe {
            init(
                (&raw mut session).cast::<slip_abi::SlipRegistry>(),
                &ffi::API_TABLE,
            );
        }

        self.loaded.insert(kernel_name.to_owned());
        self.libraries.push(library);
        debug!(kernel = kernel_name, "kernel loaded");
        Ok(())
    }
}

/// Registration context handed (as an opaque pointer) to `kernel_init`.
///
/// Prefixes every registered name with the loading kernel's name so plug-ins
/// cannot claim symbols outside their namespace.
pub(crate) struct RegistrationSession {
    pub registry: *mut KernelRegistry,
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"#(define-kernel kv "slip_kv" [
        (define-function store (key :str value :any) :none)
        (define-function fetch (key :str) :any)
        (define-function tail (items :int..) :int)
    ])"#;

    #[test]
    fn manifest_parses_signatures() {
        let manifest = parse_manifest(MANIFEST).unwrap();
        assert_eq!(manifest.name, "kv");
        assert_eq!(manifest.library, "slip_kv");
        assert_eq!(manifest.functions.len(), 3);

        let store = &manifest.functions[0];
        assert_eq!(store.name, "store");
        assert_eq!(store.params.len(), 2);
        assert_eq!(store.params[0].kind, Kind::Str);
        assert_eq!(store.params[1].kind, Kind::None);
        assert_eq!(store.ret.kind, Kind::None);
        assert!(!store.variadic);

        let tail = &manifest.functions[2];
        assert!(tail.variadic);
        assert_eq!(tail.ret.kind, Kind::Int);
    }

    #[test]
    fn manifest_requires_define_kernel_head() {
        assert!(parse_manifest("(define-kernel kv \"lib\" [])").is_err());
        assert!(parse_manifest("#(other kv \"lib\" [])").is_err());
        assert!(parse_manifest("#(define-kernel kv \"lib\")").is_err());
    }

    #[test]
    fn malformed_function_entries_are_skipped() {
        let manifest = parse_manifest(
            r#"#(define-kernel kv "lib" [
                (define-function good () :int)
                (not-a-function 1 2 3)
                (define-function bad (x :nope) :int)
            ])"#,
        )
        .unwrap();
        assert_eq!(manifest.functions.len(), 1);
        assert_eq!(manifest.functions[0].name, "good");
    }

    #[test]
    fn duplicate_registration_is_refused() {
        fn stub(_: &mut Interp, _: &Value) -> RunResult<Value> {
            Ok(Value::none())
        }

        let mut registry = KernelRegistry::new();
        registry.register_host("kv/store", stub).unwrap();
        let err = registry.register_host("kv/store", stub).unwrap_err();
        assert!(matches!(err, RunError::DuplicateKernelFunction(_)));
        assert!(registry.has("kv/store"));
        assert_eq!(registry.function_names().count(), 1);
    }
}
