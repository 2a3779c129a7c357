//! The tree-walking evaluator.
//!
//! Evaluation dispatches on the value kind: literals are self-evaluating,
//! symbols resolve through the scope stack, paren lists are calls, bracket
//! lists are sequencing blocks, and datum values go through a side table of
//! declarative directives. A callable head resolves to exactly one of three
//! things, in order: a special form, a kernel function (qualified
//! `kernel/name` symbols), or a lambda id carried by an aberrant value.
//!
//! The interpreter also owns the one-way kernel lock: the first non-datum
//! element evaluated inside a sequencing block flips it, and every later
//! import or kernel load is refused.

mod datum;
mod forms;

use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    arena::Kind,
    error::{RunError, RunResult},
    imports::ImportTracker,
    io::{SharedPrint, StdPrint, shared_print},
    kernel::{KernelEntry, KernelRegistry},
    scope::{LambdaDef, LambdaStore, Param, ScopeStack},
    types::FormTable,
    value::Value,
};

/// One `do` loop in flight.
#[derive(Debug, Default)]
struct LoopFrame {
    done: bool,
    result: Value,
    iteration: i64,
}

/// Per-run evaluation context.
pub struct Interp {
    include_paths: Vec<PathBuf>,
    working_dir: PathBuf,
    scopes: ScopeStack<Value>,
    lambdas: LambdaStore,
    loops: Vec<LoopFrame>,
    forms: FormTable,
    exports: IndexMap<String, Value>,
    kernels: KernelRegistry,
    imports: ImportTracker,
    locked: bool,
    print: SharedPrint,
}

impl Interp {
    /// Creates an interpreter with debug output going to stdout.
    #[must_use]
    pub fn new(include_paths: Vec<PathBuf>, working_dir: PathBuf) -> Self {
        Self::with_print(include_paths, working_dir, shared_print(StdPrint))
    }

    /// Creates an interpreter with a caller-provided debug writer.
    #[must_use]
    pub fn with_print(
        include_paths: Vec<PathBuf>,
        working_dir: PathBuf,
        print: SharedPrint,
    ) -> Self {
        let mut scopes = ScopeStack::new();
        scopes.push();
        Self {
            include_paths,
            working_dir,
            scopes,
            lambdas: LambdaStore::new(),
            loops: Vec::new(),
            forms: FormTable::new(),
            exports: IndexMap::new(),
            kernels: KernelRegistry::new(),
            imports: ImportTracker::default(),
            locked: false,
            print,
        }
    }

    /// Read-write access to the kernel registry, for embedders that register
    /// host functions before running a program.
    pub fn kernels_mut(&mut self) -> &mut KernelRegistry {
        &mut self.kernels
    }

    #[must_use]
    pub fn kernels(&self) -> &KernelRegistry {
        &self.kernels
    }

    /// Exported bindings of the evaluated program, in declaration order.
    #[must_use]
    pub fn exports(&self) -> &IndexMap<String, Value> {
        &self.exports
    }

    /// Whether the kernel lock has transitioned.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Flips the one-way kernel lock.
    pub fn lock(&mut self) {
        if !self.locked {
            self.locked = true;
            debug!("kernel lock engaged, no more imports or kernel loads");
        }
    }

    /// Looks a name up through the scope stack.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.lookup(name)
    }

    /// Evaluates a value and produces a value.
    pub fn eval(&mut self, value: &Value) -> RunResult<Value> {
        match value.kind() {
            Kind::None | Kind::Int | Kind::Real | Kind::Str | Kind::Rune | Kind::Error
            | Kind::Aberrant | Kind::BraceList => Ok(value.clone()),

            // A quoted value evaluates to what it wraps.
            Kind::Some => Ok(value.inner().unwrap_or_else(|| value.clone())),

            Kind::Symbol => {
                let name = value.symbol_name().unwrap_or_default();
                match self.scopes.lookup(name) {
                    Some(bound) => Ok(bound.clone()),
                    // Unresolved symbols evaluate to themselves; call sites
                    // that need a binding fail explicitly.
                    None => Ok(value.clone()),
                }
            }

            Kind::ParenList => self.eval_call(value),
            Kind::Datum => self.eval_datum(value),

            Kind::BracketList => {
                let mut result = Value::none();
                for element in value.elements() {
                    if !self.locked && element.kind() != Kind::Datum {
                        self.lock();
                    }
                    result = self.eval(&element)?;
                }
                Ok(result)
            }
        }
    }

    fn eval_call(&mut self, call: &Value) -> RunResult<Value> {
        if call.is_empty() {
            return Ok(call.clone());
        }
        let head = call.element(0).unwrap_or_default();
        let Some(name) = head.symbol_name() else {
            return Err(RunError::NotCallable(head.kind()));
        };

        if let Some(handler) = forms::lookup(name) {
            return handler(self, call);
        }

        if name.contains('/') {
            if let Some(entry) = self.kernels.get(name) {
                return self.call_kernel(entry, call);
            }
        }

        let name = name.to_owned();
        let resolved = self.eval(&head)?;
        if let Some(lambda_id) = resolved.aberrant_id() {
            return self.call_lambda_form(lambda_id, call);
        }

        Err(RunError::UnknownCallable(name))
    }

    fn call_kernel(&mut self, entry: KernelEntry, call: &Value) -> RunResult<Value> {
        match entry {
            KernelEntry::Host(function) => function(self, call),
            KernelEntry::Native(function) => crate::ffi::call_native(self, function, call),
        }
    }

    /// Calls a lambda from a call form, evaluating arguments left to right.
    fn call_lambda_form(&mut self, lambda_id: u64, call: &Value) -> RunResult<Value> {
        let mut args = Vec::with_capacity(call.len().saturating_sub(1));
        for index in 1..call.len() {
            let arg = call.element(index).unwrap_or_default();
            args.push(self.eval(&arg)?);
        }
        self.call_lambda(lambda_id, args)
    }

    /// Calls a lambda with already-evaluated arguments.
    ///
    /// Arity or argument-kind mismatches raise; a return-kind mismatch yields
    /// an error value instead.
    pub(crate) fn call_lambda(&mut self, lambda_id: u64, args: Vec<Value>) -> RunResult<Value> {
        let def = self
            .lambdas
            .get(lambda_id)
            .ok_or_else(|| RunError::UnknownCallable(format!("lambda {lambda_id}")))?;
        let params: Vec<Param> = def.params.iter().cloned().collect();
        let return_kind = def.return_kind;
        let body = def.body.clone();

        if args.len() != params.len() {
            return Err(RunError::Arity {
                callee: "function".to_owned(),
                expected: params.len(),
                got: args.len(),
            });
        }
        for (param, arg) in params.iter().zip(&args) {
            if param.kind != Kind::None && arg.kind() != param.kind {
                return Err(RunError::KindMismatch {
                    context: "function argument",
                    expected: param.kind,
                    got: arg.kind(),
                });
            }
        }

        self.push_scope();
        for (param, arg) in params.iter().zip(args) {
            self.scopes.define(&param.name, arg);
        }
        let result = self.eval(&body);
        self.pop_scope();
        let result = result?;

        if return_kind != Kind::None && result.kind() != return_kind {
            return Ok(Value::error_message("function returned unexpected type"));
        }
        Ok(result)
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push();
    }

    /// Pops the topmost frame, dropping every lambda registered inside it.
    pub(crate) fn pop_scope(&mut self) {
        self.lambdas.purge_at_or_above(self.scopes.depth());
        self.scopes.pop();
    }

    /// Pops scopes (and their lambdas) down to `depth`. Used when an error
    /// unwinds into a `recover` frame past arbitrarily many pushed scopes.
    fn unwind_to_depth(&mut self, depth: usize) {
        while self.scopes.depth() > depth {
            self.pop_scope();
        }
    }

    fn register_lambda(&mut self, params: Vec<Param>, return_kind: Kind, body: Value) -> u64 {
        let id = self.lambdas.allocate_id();
        self.lambdas.register(
            id,
            LambdaDef {
                params: params.into(),
                return_kind,
                body,
                depth: self.scopes.depth(),
            },
        );
        id
    }

    /// Renders a value for `debug` output. Aberrant values render as their
    /// registered signature, e.g. `:fn<int,int>int`.
    #[must_use]
    pub fn render(&self, value: &Value) -> String {
        if let Some(id) = value.aberrant_id() {
            if let Some(def) = self.lambdas.get(id) {
                let params: Vec<String> =
                    def.params.iter().map(|p| p.kind.to_string()).collect();
                return format!(":fn<{}>{}", params.join(","), def.return_kind);
            }
        }
        value.to_string()
    }
}
