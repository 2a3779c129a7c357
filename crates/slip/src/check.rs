//! The static checking pass.
//!
//! Walks a parsed graph once, before any evaluation, keeping a scope stack of
//! type records in parallel with the bindings the interpreter will create
//! later. Every call is validated against its callable's signature, lambdas
//! are registered and their bodies checked against the declared return type,
//! imports are resolved recursively with cycle detection, and kernel
//! manifests contribute signatures for `kernel/function` calls.

use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::{
    arena::Kind,
    error::CheckError,
    imports::{resolve_file, resolve_kernel_dir},
    kernel::read_manifest,
    parse::parse,
    scope::ScopeStack,
    types::{FormTable, Signature, TypeInfo, resolve_type_symbol, types_match},
    value::Value,
};

type CheckResult = Result<TypeInfo, CheckError>;

/// Per-run type checking context.
pub struct Checker {
    include_paths: Vec<PathBuf>,
    working_dir: PathBuf,
    /// Promotes match-arm pattern mismatches from warnings to errors.
    strict_match: bool,
    scopes: ScopeStack<TypeInfo>,
    forms: FormTable,
    /// Kernel signatures keyed by qualified `kernel/function` name.
    kernel_signatures: IndexMap<String, Signature>,
    loaded_kernels: AHashSet<String>,
    lambda_signatures: AHashMap<u64, Signature>,
    next_lambda_id: u64,
    checked_files: AHashSet<PathBuf>,
    in_progress: AHashSet<PathBuf>,
    check_stack: Vec<PathBuf>,
    exports: IndexMap<String, TypeInfo>,
    loop_depth: usize,
}

impl Checker {
    #[must_use]
    pub fn new(include_paths: Vec<PathBuf>, working_dir: PathBuf) -> Self {
        let mut scopes = ScopeStack::new();
        scopes.push();
        Self {
            include_paths,
            working_dir,
            strict_match: false,
            scopes,
            forms: FormTable::new(),
            kernel_signatures: IndexMap::new(),
            loaded_kernels: AHashSet::new(),
            lambda_signatures: AHashMap::new(),
            next_lambda_id: 1,
            checked_files: AHashSet::new(),
            in_progress: AHashSet::new(),
            check_stack: Vec::new(),
            exports: IndexMap::new(),
            loop_depth: 0,
        }
    }

    /// When set, a `match` arm whose pattern kind disagrees with the value
    /// kind fails the check instead of logging a warning.
    pub fn set_strict_match(&mut self, strict: bool) {
        self.strict_match = strict;
    }

    /// Exported bindings of the most recently checked source, in declaration
    /// order.
    #[must_use]
    pub fn exports(&self) -> &IndexMap<String, TypeInfo> {
        &self.exports
    }

    #[must_use]
    pub fn has_form(&self, name: &str) -> bool {
        self.forms.contains(name)
    }

    /// Type-checks a file, resolving its imports recursively.
    ///
    /// Re-checking an already-checked file is a no-op; re-entering a file
    /// that is still being checked is a circular-import error whose message
    /// enumerates the chain.
    pub fn check_file(&mut self, file_path: &Path) -> Result<(), CheckError> {
        if !file_path.exists() {
            return Err(CheckError::new(format!(
                "file does not exist: {}",
                file_path.display()
            )));
        }
        let canonical = file_path.canonicalize().map_err(|e| {
            CheckError::new(format!("could not canonicalize {}: {e}", file_path.display()))
        })?;

        if self.checked_files.contains(&canonical) {
            debug!(file = %canonical.display(), "file already checked");
            return Ok(());
        }
        if self.in_progress.contains(&canonical) {
            return Err(CheckError::new(self.cycle_message(&canonical)));
        }

        self.in_progress.insert(canonical.clone());
        self.check_stack.push(canonical.clone());

        let result = std::fs::read_to_string(&canonical)
            .map_err(|e| CheckError::new(format!("failed to open file: {e}")).in_file(&canonical))
            .and_then(|source| {
                self.check_source(&source, &canonical.display().to_string())
                    .map(|_| ())
                    .map_err(|e| e.in_file(&canonical))
            });

        self.in_progress.remove(&canonical);
        self.check_stack.pop();
        if result.is_ok() {
            self.checked_files.insert(canonical);
        }
        result
    }

    /// Type-checks in-memory source, returning the type of the root value.
    pub fn check_source(&mut self, source: &str, source_name: &str) -> CheckResult {
        info!(source = source_name, "type checking");
        let root = parse(source)
            .map_err(|e| CheckError::new(format!("parse error in {source_name}: {e}")))?;
        let result = self.eval_type(&root)?;
        info!(source = source_name, "type checking passed");
        Ok(result)
    }

    fn cycle_message(&self, repeated: &Path) -> String {
        let mut message = String::from("circular import detected:\n");
        for file in &self.check_stack {
            message.push_str(&format!("  {} imports\n", file.display()));
        }
        message.push_str(&format!("  {} (cycle detected)", repeated.display()));
        message
    }

    /// The evaluated type of a value.
    pub fn eval_type(&mut self, value: &Value) -> CheckResult {
        match value.kind() {
            Kind::Int | Kind::Real | Kind::Str | Kind::Rune | Kind::Some | Kind::Error
            | Kind::Aberrant | Kind::None => Ok(TypeInfo::of(value.kind())),

            Kind::Symbol => {
                let name = value.symbol_name().unwrap_or_default();
                match self.scopes.lookup(name) {
                    Some(info) => Ok(info.clone()),
                    None => Ok(TypeInfo::of(Kind::Symbol)),
                }
            }

            Kind::ParenList => self.eval_call_type(value),
            Kind::Datum => self.eval_datum_type(value),

            Kind::BracketList => {
                let mut last = TypeInfo::of(Kind::None);
                for element in value.elements() {
                    last = self.eval_type(&element)?;
                }
                Ok(last)
            }

            Kind::BraceList => Ok(TypeInfo::of(Kind::BraceList)),
        }
    }

    fn eval_call_type(&mut self, call: &Value) -> CheckResult {
        if call.is_empty() {
            return Ok(TypeInfo::of(Kind::ParenList));
        }
        let head = call.element(0).unwrap_or_default();
        let Some(name) = head.symbol_name() else {
            return Err(CheckError::new(format!(
                "cannot call non-symbol value of kind {}",
                head.kind()
            )));
        };
        let name = name.to_owned();

        match name.as_str() {
            "def" => return self.check_def(call),
            "fn" => return self.check_fn(call),
            "if" => return self.check_if(call),
            "match" => return self.check_match(call),
            "reflect" => return self.check_reflect(call),
            "try" => return self.check_try(call),
            "recover" => return self.check_recover(call),
            "assert" => return self.check_assert(call),
            "eval" => return self.check_eval(call),
            "apply" => return self.check_apply(call),
            "export" => return self.check_export(call),
            "debug" => return self.check_debug(call),
            "cast" => return self.check_cast(call),
            "do" => return self.check_do(call),
            "done" => return self.check_done(call),
            "at" => return self.check_at(call),
            "eq" => return self.check_eq(call),
            _ => {}
        }

        if let Some(info) = self.scopes.lookup(&name).cloned() {
            if info.kind == Kind::Aberrant {
                let signature = info
                    .lambda_id
                    .and_then(|id| self.lambda_signatures.get(&id))
                    .cloned()
                    .ok_or_else(|| {
                        CheckError::new(format!("lambda {name} has no signature information"))
                    })?;
                return self.validate_call(&name, &signature, call);
            }
        }

        if name.contains('/') {
            if let Some(signature) = self.kernel_signatures.get(&name).cloned() {
                return self.validate_call(&name, &signature, call);
            }
        }

        Err(CheckError::new(format!("unknown callable symbol: {name}")))
    }

    /// Validates argument count and types against a signature and yields the
    /// declared return type.
    fn validate_call(&mut self, name: &str, signature: &Signature, call: &Value) -> CheckResult {
        let argc = call.len() - 1;

        if !signature.variadic && argc != signature.params.len() {
            return Err(CheckError::new(format!(
                "{name} expects {} argument(s), got {argc}",
                signature.params.len()
            )));
        }

        let mut fixed = signature.params.len();
        if signature.variadic && fixed > 0 {
            fixed -= 1;
        }
        if argc < fixed {
            return Err(CheckError::new(format!(
                "{name} expects at least {fixed} argument(s), got {argc}"
            )));
        }

        for index in 0..fixed {
            let arg = call.element(index + 1).unwrap_or_default();
            let arg_type = self.eval_type(&arg)?;
            if !types_match(&signature.params[index], &arg_type) {
                return Err(CheckError::new(format!(
                    "{name} argument {} type mismatch: expected {}, got {}",
                    index + 1,
                    signature.params[index].kind,
                    arg_type.kind
                )));
            }
        }

        if signature.variadic && !signature.params.is_empty() {
            let variadic_param = signature.params[signature.params.len() - 1].clone();
            for index in fixed..argc {
                let arg = call.element(index + 1).unwrap_or_default();
                let arg_type = self.eval_type(&arg)?;
                if !types_match(&variadic_param, &arg_type) {
                    return Err(CheckError::new(format!(
                        "{name} variadic argument {} type mismatch: expected {}, got {}",
                        index + 1,
                        variadic_param.kind,
                        arg_type.kind
                    )));
                }
            }
        }

        Ok(signature.ret.clone())
    }

    fn expect_arity(call: &Value, form: &str, expected: usize) -> Result<(), CheckError> {
        let argc = call.len() - 1;
        if argc != expected {
            return Err(CheckError::new(format!(
                "{form} requires exactly {expected} argument(s), got {argc}"
            )));
        }
        Ok(())
    }

    // --- special forms ----------------------------------------------------

    fn check_def(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "def", 2)?;
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| CheckError::new("def requires first argument to be a symbol"))?;
        if self.scopes.has(&name, true) {
            return Err(CheckError::new(format!(
                "symbol '{name}' is already defined in current scope"
            )));
        }
        let value_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        self.scopes.define(&name, value_type);
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_fn(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "fn", 3)?;
        let params_obj = call.element(1).unwrap_or_default();
        let return_obj = call.element(2).unwrap_or_default();
        let body_obj = call.element(3).unwrap_or_default();

        if params_obj.kind() != Kind::ParenList {
            return Err(CheckError::new("fn: first argument must be parameter list"));
        }
        let return_symbol = return_obj
            .symbol_name()
            .ok_or_else(|| CheckError::new("fn: second argument must be return type symbol"))?;
        if body_obj.kind() != Kind::BracketList {
            return Err(CheckError::new(
                "fn: third argument must be bracket list (function body)",
            ));
        }

        let return_type = resolve_type_symbol(return_symbol, &self.forms)
            .ok_or_else(|| CheckError::new(format!("fn: invalid return type: {return_symbol}")))?;

        let mut params: SmallVec<[TypeInfo; 4]> = SmallVec::new();
        let mut names = Vec::new();
        let count = params_obj.len();
        let mut index = 0;
        while index < count {
            if index + 1 >= count {
                return Err(CheckError::new("fn: parameters must be in pairs (name :type)"));
            }
            let name = params_obj
                .element(index)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| CheckError::new("fn: parameter name must be a symbol"))?;
            let type_symbol = params_obj
                .element(index + 1)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| CheckError::new("fn: parameter type must be a type symbol"))?;
            let param_type = resolve_type_symbol(&type_symbol, &self.forms).ok_or_else(|| {
                CheckError::new(format!("fn: invalid parameter type: {type_symbol}"))
            })?;
            names.push(name);
            params.push(param_type);
            index += 2;
        }

        self.scopes.push();
        for (name, param_type) in names.iter().zip(params.iter()) {
            self.scopes.define(name, param_type.clone());
        }
        let body_type = self.eval_type(&body_obj);
        self.scopes.pop();
        let body_type = body_type?;

        if !types_match(&return_type, &body_type) {
            return Err(CheckError::new(format!(
                "fn: body returns type {}, but declared return type is {}",
                body_type.kind, return_type.kind
            )));
        }

        let lambda_id = self.next_lambda_id;
        self.next_lambda_id += 1;
        self.lambda_signatures.insert(
            lambda_id,
            Signature {
                params,
                ret: return_type,
                variadic: false,
            },
        );

        Ok(TypeInfo {
            kind: Kind::Aberrant,
            lambda_id: Some(lambda_id),
            ..TypeInfo::default()
        })
    }

    fn check_if(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "if", 3)?;
        let condition_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        if condition_type.kind != Kind::Int {
            return Err(CheckError::new("if: condition must be an integer"));
        }
        let true_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        let false_type = self.eval_type(&call.element(3).unwrap_or_default())?;
        if !types_match(&true_type, &false_type) {
            return Err(CheckError::new(format!(
                "if: both branches must return the same type, got {} and {}",
                true_type.kind, false_type.kind
            )));
        }
        Ok(true_type)
    }

    fn check_match(&mut self, call: &Value) -> CheckResult {
        if call.len() < 3 {
            return Err(CheckError::new(
                "match requires at least 2 arguments: value and one handler",
            ));
        }
        let value_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        if value_type.kind == Kind::Aberrant {
            return Err(CheckError::new("match: cannot match on aberrant (lambda) types"));
        }

        for index in 2..call.len() {
            let handler = call.element(index).unwrap_or_default();
            if handler.kind() != Kind::ParenList {
                return Err(CheckError::new(
                    "match: handlers must be paren lists like (pattern result)",
                ));
            }
            if handler.len() != 2 {
                return Err(CheckError::new(
                    "match: handler must have exactly 2 elements: (pattern result)",
                ));
            }
            let pattern_type = self.eval_type(&handler.element(0).unwrap_or_default())?;
            if pattern_type.kind != value_type.kind {
                if self.strict_match {
                    return Err(CheckError::new(format!(
                        "match: pattern type {} does not match value type {}",
                        pattern_type.kind, value_type.kind
                    )));
                }
                warn!(
                    pattern = %pattern_type.kind,
                    value = %value_type.kind,
                    "match: pattern type does not match value type"
                );
            }
            self.eval_type(&handler.element(1).unwrap_or_default())?;
        }

        Ok(TypeInfo::of(Kind::None))
    }

    fn check_reflect(&mut self, call: &Value) -> CheckResult {
        if call.len() < 3 {
            return Err(CheckError::new(
                "reflect requires at least 2 arguments: value and one handler",
            ));
        }
        self.eval_type(&call.element(1).unwrap_or_default())?;

        for index in 2..call.len() {
            let handler = call.element(index).unwrap_or_default();
            if handler.kind() != Kind::ParenList {
                return Err(CheckError::new(
                    "reflect: handlers must be paren lists like (:type body)",
                ));
            }
            if handler.len() != 2 {
                return Err(CheckError::new(
                    "reflect: handler must have exactly 2 elements: (:type body)",
                ));
            }
            let type_symbol = handler
                .element(0)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| CheckError::new("reflect: handler type must be a symbol like :int"))?;
            if resolve_type_symbol(&type_symbol, &self.forms).is_none() {
                return Err(CheckError::new(format!(
                    "reflect: invalid type symbol: {type_symbol}"
                )));
            }
            self.eval_type(&handler.element(1).unwrap_or_default())?;
        }

        Ok(TypeInfo::of(Kind::None))
    }

    fn check_try(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "try", 2)?;
        let body_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        let handler = call.element(2).unwrap_or_default();

        let handler_type = if handler.kind() == Kind::BracketList {
            self.scopes.push();
            self.scopes.define("$error", TypeInfo::of(Kind::Aberrant));
            let handler_type = self.eval_type(&handler);
            self.scopes.pop();
            handler_type?
        } else {
            self.eval_type(&handler)?
        };

        if !types_match(&body_type, &handler_type) {
            return Err(CheckError::new(format!(
                "try: body and handler must return the same type, got {} and {}",
                body_type.kind, handler_type.kind
            )));
        }
        Ok(body_type)
    }

    fn check_recover(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "recover", 2)?;
        let body = call.element(1).unwrap_or_default();
        let handler = call.element(2).unwrap_or_default();
        if body.kind() != Kind::BracketList {
            return Err(CheckError::new("recover: body must be a bracket list"));
        }
        if handler.kind() != Kind::BracketList {
            return Err(CheckError::new("recover: handler must be a bracket list"));
        }

        let body_type = self.eval_type(&body)?;

        self.scopes.push();
        self.scopes.define("$exception", TypeInfo::of(Kind::Str));
        let handler_type = self.eval_type(&handler);
        self.scopes.pop();
        let handler_type = handler_type?;

        if !types_match(&body_type, &handler_type) {
            return Err(CheckError::new(format!(
                "recover: body and handler must return the same type, got {} and {}",
                body_type.kind, handler_type.kind
            )));
        }
        Ok(body_type)
    }

    fn check_assert(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "assert", 2)?;
        let condition_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        let message_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        if condition_type.kind != Kind::Int {
            return Err(CheckError::new("assert: condition must be an integer"));
        }
        if message_type.kind != Kind::Str {
            return Err(CheckError::new("assert: message must be a string"));
        }
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_eval(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "eval", 1)?;
        let code_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        if code_type.kind != Kind::Str {
            return Err(CheckError::new("eval: argument must be a string"));
        }
        // The evaluated content is not checked statically.
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_apply(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "apply", 2)?;
        let lambda_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        if lambda_type.kind != Kind::Aberrant {
            return Err(CheckError::new(
                "apply: first argument must be a lambda (aberrant type)",
            ));
        }
        let args_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        if args_type.kind != Kind::BraceList {
            return Err(CheckError::new(
                "apply: second argument must be a brace list of arguments",
            ));
        }
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_export(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "export", 2)?;
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| {
                CheckError::new("export: first argument must be a symbol (export name)")
            })?;
        let value_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        self.scopes.define(&name, value_type.clone());
        self.exports.insert(name, value_type);
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_debug(&mut self, call: &Value) -> CheckResult {
        for index in 1..call.len() {
            self.eval_type(&call.element(index).unwrap_or_default())?;
        }
        Ok(TypeInfo::of(Kind::Int))
    }

    fn check_cast(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "cast", 2)?;
        let type_symbol = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| CheckError::new("cast: first argument must be a type symbol"))?;
        let expected = resolve_type_symbol(&type_symbol, &self.forms)
            .ok_or_else(|| CheckError::new(format!("cast: invalid type symbol: {type_symbol}")))?;
        self.eval_type(&call.element(2).unwrap_or_default())?;
        Ok(expected)
    }

    fn check_do(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "do", 1)?;
        let body = call.element(1).unwrap_or_default();
        if body.kind() != Kind::BracketList {
            return Err(CheckError::new("do: body must be a bracket list"));
        }

        self.loop_depth += 1;
        self.scopes.push();
        self.scopes.define("$iterations", TypeInfo::of(Kind::Int));
        let body_type = self.eval_type(&body);
        self.scopes.pop();
        self.loop_depth -= 1;
        body_type?;

        Ok(TypeInfo::of(Kind::Aberrant))
    }

    fn check_done(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "done", 1)?;
        if self.loop_depth == 0 {
            return Err(CheckError::new("done called outside of do loop"));
        }
        self.eval_type(&call.element(1).unwrap_or_default())?;
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_at(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "at", 2)?;
        let index_type = self.eval_type(&call.element(1).unwrap_or_default())?;
        if index_type.kind != Kind::Int {
            return Err(CheckError::new("at: index must be an integer"));
        }
        let collection_type = self.eval_type(&call.element(2).unwrap_or_default())?;
        if !(collection_type.kind.is_list() || collection_type.kind == Kind::Str) {
            return Err(CheckError::new("at: collection must be a list or string type"));
        }
        // The element type is unknown statically.
        Ok(TypeInfo::of(Kind::None))
    }

    fn check_eq(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "eq", 2)?;
        self.eval_type(&call.element(1).unwrap_or_default())?;
        self.eval_type(&call.element(2).unwrap_or_default())?;
        Ok(TypeInfo::of(Kind::Int))
    }

    // --- datum forms ------------------------------------------------------

    fn eval_datum_type(&mut self, value: &Value) -> CheckResult {
        let Some(inner) = value.inner() else {
            return Ok(TypeInfo::of(Kind::Datum));
        };
        if inner.kind() != Kind::ParenList || inner.is_empty() {
            return Ok(TypeInfo::of(Kind::Datum));
        }
        let Some(name) = inner.element(0).and_then(|h| h.symbol_name().map(str::to_owned)) else {
            return Ok(TypeInfo::of(Kind::Datum));
        };
        match name.as_str() {
            "import" => self.check_import(&inner),
            "load" => self.check_load(&inner),
            "define-form" => self.check_define_form(&inner),
            "debug" => self.check_debug(&inner),
            _ => Ok(TypeInfo::of(Kind::Datum)),
        }
    }

    fn check_import(&mut self, call: &Value) -> CheckResult {
        if call.len() < 3 {
            return Err(CheckError::new(
                "import requires at least 2 arguments: symbol and file_path",
            ));
        }
        if (call.len() - 1) % 2 != 0 {
            return Err(CheckError::new(
                "import requires pairs of arguments: symbol file_path [symbol file_path ...]",
            ));
        }

        let mut index = 1;
        while index < call.len() {
            let prefix = call
                .element(index)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| CheckError::new("import: symbol arguments must be symbols"))?;
            let file_path = call
                .element(index + 1)
                .and_then(|v| v.string_value())
                .ok_or_else(|| CheckError::new("import: file path arguments must be strings"))?;
            index += 2;

            let resolved = resolve_file(&file_path, &self.include_paths, &self.working_dir)
                .ok_or_else(|| {
                    CheckError::new(format!("import: could not resolve file: {file_path}"))
                })?;
            let canonical = resolved.canonicalize().map_err(|e| {
                CheckError::new(format!("import: could not canonicalize {file_path}: {e}"))
            })?;

            if self.checked_files.contains(&canonical) {
                debug!(file = %canonical.display(), "file already checked");
                continue;
            }

            let (exports, child_signatures) = self.check_child_file(&canonical).map_err(|e| {
                CheckError::new(format!(
                    "import: type checking failed for {}: {}",
                    canonical.display(),
                    e.message()
                ))
            })?;

            let mut remapping: AHashMap<u64, u64> = AHashMap::new();
            for (old_id, signature) in child_signatures {
                let new_id = self.next_lambda_id;
                self.next_lambda_id += 1;
                self.lambda_signatures.insert(new_id, signature);
                remapping.insert(old_id, new_id);
            }

            for (export_name, export_type) in exports {
                let mut remapped = export_type;
                if let Some(old_id) = remapped.lambda_id {
                    remapped.lambda_id = remapping.get(&old_id).copied();
                }
                let qualified = format!("{prefix}/{export_name}");
                debug!(symbol = %qualified, "imported binding");
                self.scopes.define(&qualified, remapped);
            }
        }

        Ok(TypeInfo::of(Kind::None))
    }

    /// Runs a nested check in a child context that shares this checker's
    /// file-tracking state, returning the child's exports and lambda
    /// signatures.
    fn check_child_file(
        &mut self,
        path: &Path,
    ) -> Result<(IndexMap<String, TypeInfo>, AHashMap<u64, Signature>), CheckError> {
        let mut child = Self::new(self.include_paths.clone(), self.working_dir.clone());
        child.strict_match = self.strict_match;
        std::mem::swap(&mut child.checked_files, &mut self.checked_files);
        std::mem::swap(&mut child.in_progress, &mut self.in_progress);
        std::mem::swap(&mut child.check_stack, &mut self.check_stack);

        let result = child.check_file(path);

        std::mem::swap(&mut child.checked_files, &mut self.checked_files);
        std::mem::swap(&mut child.in_progress, &mut self.in_progress);
        std::mem::swap(&mut child.check_stack, &mut self.check_stack);

        result.map(|()| (child.exports, child.lambda_signatures))
    }

    fn check_load(&mut self, call: &Value) -> CheckResult {
        if call.len() < 2 {
            return Err(CheckError::new("load requires at least 1 argument: kernel_name"));
        }

        for index in 1..call.len() {
            let kernel_name = call
                .element(index)
                .and_then(|v| v.string_value())
                .ok_or_else(|| {
                    CheckError::new("load: all arguments must be strings (kernel names)")
                })?;

            if self.loaded_kernels.contains(&kernel_name) {
                debug!(kernel = %kernel_name, "kernel types already loaded");
                continue;
            }

            let kernel_dir =
                resolve_kernel_dir(&kernel_name, &self.include_paths, &self.working_dir)
                    .ok_or_else(|| {
                        CheckError::new(format!("load: could not resolve kernel: {kernel_name}"))
                    })?;

            let manifest = read_manifest(&kernel_dir).map_err(|message| {
                CheckError::new(format!(
                    "load: failed to load kernel types for {kernel_name}: {message}"
                ))
            })?;

            for function in &manifest.functions {
                let qualified = format!("{kernel_name}/{}", function.name);
                if self.kernel_signatures.contains_key(&qualified) {
                    return Err(CheckError::new(format!(
                        "load: kernel function already registered: {qualified}"
                    )));
                }
                debug!(function = %qualified, "registered kernel function type");
                self.kernel_signatures.insert(qualified, function.signature());
            }
            self.loaded_kernels.insert(kernel_name);
        }

        Ok(TypeInfo::of(Kind::None))
    }

    fn check_define_form(&mut self, call: &Value) -> CheckResult {
        Self::expect_arity(call, "define-form", 2)?;
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| CheckError::new("define-form: name must be a symbol"))?;
        let elements_obj = call.element(2).unwrap_or_default();
        if elements_obj.kind() != Kind::BraceList {
            return Err(CheckError::new("define-form: elements must be a brace list"));
        }

        let mut elements = Vec::with_capacity(elements_obj.len());
        for element in elements_obj.elements() {
            let type_symbol = element.symbol_name().ok_or_else(|| {
                CheckError::new("define-form: element descriptors must be type symbols")
            })?;
            // Previously declared forms are valid element types here.
            let info = resolve_type_symbol(type_symbol, &self.forms).ok_or_else(|| {
                CheckError::new(format!("define-form: invalid type symbol: {type_symbol}"))
            })?;
            elements.push(info);
        }

        self.forms.define(&name, elements);
        Ok(TypeInfo::of(Kind::None))
    }
}
