//! The datum side table: declarative directives evaluated through `#(…)`.
//!
//! Data directives run before the kernel lock transitions: `import` pulls
//! another file's exports in under a prefix, `load` wires up a native
//! kernel, and `define-form` registers a structural tuple type. Any other
//! datum head falls back to the standard special forms, so `#(debug …)`
//! works in declarative position.

use std::path::Path;

use tracing::{debug, info};

use crate::{
    arena::Kind,
    error::{RunError, RunResult},
    imports::{resolve_file, resolve_kernel_dir},
    interp::{Interp, forms},
    parse::parse,
    scope::LambdaDef,
    types::resolve_type_symbol,
    value::Value,
};

impl Interp {
    pub(super) fn eval_datum(&mut self, value: &Value) -> RunResult<Value> {
        let Some(inner) = value.inner() else {
            return Ok(value.clone());
        };
        if inner.kind() != Kind::ParenList || inner.is_empty() {
            return Ok(value.clone());
        }
        let Some(name) = inner.element(0).and_then(|h| h.symbol_name().map(str::to_owned))
        else {
            return Ok(value.clone());
        };

        match name.as_str() {
            "import" => self.datum_import(&inner),
            "load" => self.datum_load(&inner),
            "define-form" => self.datum_define_form(&inner),
            _ => match forms::lookup(&name) {
                Some(handler) => handler(self, &inner),
                None => Err(RunError::UnknownDatumCallable(name)),
            },
        }
    }

    fn datum_import(&mut self, call: &Value) -> RunResult<Value> {
        if call.len() < 3 || (call.len() - 1) % 2 != 0 {
            return Err(RunError::InvalidForm {
                form: "import",
                message: "requires pairs of arguments: symbol file_path".to_owned(),
            });
        }

        let mut index = 1;
        while index < call.len() {
            let prefix = call
                .element(index)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| RunError::InvalidForm {
                    form: "import",
                    message: "symbol arguments must be symbols".to_owned(),
                })?;
            let file_path = call
                .element(index + 1)
                .and_then(|v| v.string_value())
                .ok_or_else(|| RunError::InvalidForm {
                    form: "import",
                    message: "file path arguments must be strings".to_owned(),
                })?;
            index += 2;

            self.attempt_import(&prefix, &file_path)?;
        }

        Ok(Value::none())
    }

    /// Resolves, evaluates, and installs one import. Refused once the kernel
    /// lock has transitioned; importing an already-imported file is a no-op.
    pub fn attempt_import(&mut self, prefix: &str, file_path: &str) -> RunResult<()> {
        if self.locked {
            return Err(RunError::LoadLocked { what: "import" });
        }

        let resolved = resolve_file(file_path, &self.include_paths, &self.working_dir)
            .ok_or_else(|| RunError::ImportFailed {
                path: file_path.to_owned(),
                message: "could not resolve file".to_owned(),
            })?;
        let canonical = resolved.canonicalize().map_err(|e| RunError::Io {
            path: resolved.display().to_string(),
            message: e.to_string(),
        })?;

        if self.imports.imported.contains(&canonical) {
            debug!(file = %canonical.display(), "file already imported");
            return Ok(());
        }
        if self.imports.in_progress.contains(&canonical) {
            return Err(RunError::CircularImport(
                self.imports.cycle_message(&canonical),
            ));
        }

        info!(file = %canonical.display(), symbol = prefix, "importing file");
        self.imports.in_progress.insert(canonical.clone());
        self.imports.stack.push(canonical.clone());

        let result = self.import_file(&canonical, prefix);

        self.imports.in_progress.remove(&canonical);
        self.imports.stack.pop();
        if result.is_ok() {
            self.imports.imported.insert(canonical);
        }
        result
    }

    fn import_file(&mut self, canonical: &Path, prefix: &str) -> RunResult<()> {
        let source = std::fs::read_to_string(canonical).map_err(|e| RunError::Io {
            path: canonical.display().to_string(),
            message: e.to_string(),
        })?;
        let parsed = parse(&source).map_err(|e| RunError::ImportFailed {
            path: canonical.display().to_string(),
            message: e.to_string(),
        })?;

        // The imported file runs in a child interpreter that shares this
        // one's kernel registry and import tracking, so nested imports see
        // the same cycle state and kernel loads land in the shared registry.
        let mut child = Self::with_print(
            self.include_paths.clone(),
            self.working_dir.clone(),
            self.print.clone(),
        );
        std::mem::swap(&mut child.kernels, &mut self.kernels);
        std::mem::swap(&mut child.imports, &mut self.imports);
        let evaluated = child.eval(&parsed);
        std::mem::swap(&mut child.kernels, &mut self.kernels);
        std::mem::swap(&mut child.imports, &mut self.imports);

        evaluated.map_err(|e| RunError::ImportFailed {
            path: canonical.display().to_string(),
            message: e.to_string(),
        })?;

        for (export_name, export_value) in &child.exports {
            let qualified = format!("{prefix}/{export_name}");
            let mut installed = export_value.detached();

            // Exported lambdas need their definition copied across and the
            // child's id remapped to a freshly allocated one.
            if let Some(child_id) = export_value.aberrant_id() {
                let Some(def) = child.lambdas.get(child_id) else {
                    return Err(RunError::ImportFailed {
                        path: canonical.display().to_string(),
                        message: format!("missing lambda definition for export {export_name}"),
                    });
                };
                let new_id = self.lambdas.allocate_id();
                self.lambdas.register(
                    new_id,
                    LambdaDef {
                        params: def.params.clone(),
                        return_kind: def.return_kind,
                        body: def.body.clone(),
                        depth: self.scopes.depth(),
                    },
                );
                installed = Value::aberrant(new_id);
                debug!(symbol = %qualified, lambda = new_id, "copied exported lambda");
            }

            debug!(symbol = %qualified, "exported symbol");
            self.scopes.define(&qualified, installed);
        }

        Ok(())
    }

    fn datum_load(&mut self, call: &Value) -> RunResult<Value> {
        if call.len() < 2 {
            return Err(RunError::InvalidForm {
                form: "load",
                message: "requires at least 1 argument: kernel_name".to_owned(),
            });
        }

        for index in 1..call.len() {
            let kernel_name = call
                .element(index)
                .and_then(|v| v.string_value())
                .ok_or_else(|| RunError::InvalidForm {
                    form: "load",
                    message: "all arguments must be strings (kernel names)".to_owned(),
                })?;
            self.attempt_load(&kernel_name)?;
        }

        Ok(Value::none())
    }

    /// Resolves and loads one kernel. Refused once the kernel lock has
    /// transitioned; loading an already-loaded kernel is a no-op.
    pub fn attempt_load(&mut self, kernel_name: &str) -> RunResult<()> {
        if self.locked {
            return Err(RunError::LoadLocked { what: "kernel load" });
        }
        let kernel_dir = resolve_kernel_dir(kernel_name, &self.include_paths, &self.working_dir)
            .ok_or_else(|| RunError::KernelLoad {
                kernel: kernel_name.to_owned(),
                message: "could not resolve kernel".to_owned(),
            })?;
        self.kernels.load_kernel(kernel_name, &kernel_dir)
    }

    fn datum_define_form(&mut self, call: &Value) -> RunResult<Value> {
        if call.len() - 1 != 2 {
            return Err(RunError::InvalidForm {
                form: "define-form",
                message: format!("requires exactly 2 argument(s), got {}", call.len() - 1),
            });
        }
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| RunError::InvalidForm {
                form: "define-form",
                message: "name must be a symbol".to_owned(),
            })?;
        let elements_obj = call.element(2).unwrap_or_default();
        if elements_obj.kind() != Kind::BraceList {
            return Err(RunError::InvalidForm {
                form: "define-form",
                message: "elements must be a brace list".to_owned(),
            });
        }

        let mut elements = Vec::with_capacity(elements_obj.len());
        for element in elements_obj.elements() {
            let type_symbol = element.symbol_name().ok_or_else(|| RunError::InvalidForm {
                form: "define-form",
                message: "element descriptors must be type symbols".to_owned(),
            })?;
            let info = resolve_type_symbol(type_symbol, &self.forms)
                .ok_or_else(|| RunError::UnknownType(type_symbol.to_owned()))?;
            elements.push(info);
        }

        self.forms.define(&name, elements);
        Ok(Value::none())
    }
}
