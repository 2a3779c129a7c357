//! Runtime handlers for the special forms.

use crate::{
    arena::Kind,
    error::{RunError, RunResult},
    interp::{Interp, LoopFrame},
    parse::parse,
    scope::Param,
    types::resolve_type_symbol,
    value::Value,
};

pub(super) type FormHandler = fn(&mut Interp, &Value) -> RunResult<Value>;

/// Resolves a special-form name to its handler.
pub(super) fn lookup(name: &str) -> Option<FormHandler> {
    Some(match name {
        "def" => Interp::form_def,
        "fn" => Interp::form_fn,
        "if" => Interp::form_if,
        "match" => Interp::form_match,
        "reflect" => Interp::form_reflect,
        "try" => Interp::form_try,
        "recover" => Interp::form_recover,
        "assert" => Interp::form_assert,
        "eval" => Interp::form_eval,
        "apply" => Interp::form_apply,
        "export" => Interp::form_export,
        "debug" => Interp::form_debug,
        "cast" => Interp::form_cast,
        "do" => Interp::form_do,
        "done" => Interp::form_done,
        "at" => Interp::form_at,
        "eq" => Interp::form_eq,
        _ => return None,
    })
}

fn expect_arity(call: &Value, form: &'static str, expected: usize) -> RunResult<()> {
    let argc = call.len() - 1;
    if argc != expected {
        return Err(RunError::Arity {
            callee: form.to_owned(),
            expected,
            got: argc,
        });
    }
    Ok(())
}

impl Interp {
    fn form_def(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "def", 2)?;
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| RunError::InvalidForm {
                form: "def",
                message: "first argument must be a symbol".to_owned(),
            })?;
        let value = self.eval(&call.element(2).unwrap_or_default())?;
        self.scopes.define(&name, value);
        Ok(Value::none())
    }

    fn form_fn(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "fn", 3)?;
        let params_obj = call.element(1).unwrap_or_default();
        let return_obj = call.element(2).unwrap_or_default();
        let body = call.element(3).unwrap_or_default();

        if params_obj.kind() != Kind::ParenList {
            return Err(RunError::InvalidForm {
                form: "fn",
                message: "first argument must be parameter list".to_owned(),
            });
        }
        let return_symbol =
            return_obj
                .symbol_name()
                .ok_or_else(|| RunError::InvalidForm {
                    form: "fn",
                    message: "second argument must be return type symbol".to_owned(),
                })?;
        if body.kind() != Kind::BracketList {
            return Err(RunError::InvalidForm {
                form: "fn",
                message: "third argument must be bracket list (function body)".to_owned(),
            });
        }

        let return_kind = resolve_type_symbol(return_symbol, &self.forms)
            .ok_or_else(|| RunError::UnknownType(return_symbol.to_owned()))?
            .kind;

        let mut params = Vec::new();
        let count = params_obj.len();
        let mut index = 0;
        while index < count {
            if index + 1 >= count {
                return Err(RunError::InvalidForm {
                    form: "fn",
                    message: "parameters must be in pairs (name :type)".to_owned(),
                });
            }
            let name = params_obj
                .element(index)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| RunError::InvalidForm {
                    form: "fn",
                    message: "parameter name must be a symbol".to_owned(),
                })?;
            let type_symbol = params_obj
                .element(index + 1)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| RunError::InvalidForm {
                    form: "fn",
                    message: "parameter type must be a type symbol".to_owned(),
                })?;
            let kind = resolve_type_symbol(&type_symbol, &self.forms)
                .ok_or(RunError::UnknownType(type_symbol))?
                .kind;
            params.push(Param { name, kind });
            index += 2;
        }

        let id = self.register_lambda(params, return_kind, body);
        Ok(Value::aberrant(id))
    }

    fn form_if(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "if", 3)?;
        let condition = self.eval(&call.element(1).unwrap_or_default())?;
        let truth = condition.as_int().ok_or(RunError::KindMismatch {
            context: "if condition",
            expected: Kind::Int,
            got: condition.kind(),
        })?;
        let branch = if truth != 0 { 2 } else { 3 };
        self.eval(&call.element(branch).unwrap_or_default())
    }

    fn form_match(&mut self, call: &Value) -> RunResult<Value> {
        if call.len() < 3 {
            return Err(RunError::InvalidForm {
                form: "match",
                message: "requires a value and at least one handler".to_owned(),
            });
        }
        let value = self.eval(&call.element(1).unwrap_or_default())?;

        for index in 2..call.len() {
            let arm = call.element(index).unwrap_or_default();
            if arm.kind() != Kind::ParenList || arm.len() != 2 {
                return Err(RunError::InvalidForm {
                    form: "match",
                    message: "handlers must be paren lists like (pattern result)".to_owned(),
                });
            }
            let pattern = self.eval(&arm.element(0).unwrap_or_default())?;
            if pattern.structural_eq(&value) {
                return self.eval(&arm.element(1).unwrap_or_default());
            }
        }
        Ok(Value::none())
    }

    fn form_reflect(&mut self, call: &Value) -> RunResult<Value> {
        if call.len() < 3 {
            return Err(RunError::InvalidForm {
                form: "reflect",
                message: "requires a value and at least one handler".to_owned(),
            });
        }
        let value = self.eval(&call.element(1).unwrap_or_default())?;

        for index in 2..call.len() {
            let arm = call.element(index).unwrap_or_default();
            if arm.kind() != Kind::ParenList || arm.len() != 2 {
                return Err(RunError::InvalidForm {
                    form: "reflect",
                    message: "handlers must be paren lists like (:type body)".to_owned(),
                });
            }
            let type_symbol = arm
                .element(0)
                .and_then(|v| v.symbol_name().map(str::to_owned))
                .ok_or_else(|| RunError::InvalidForm {
                    form: "reflect",
                    message: "handler type must be a symbol like :int".to_owned(),
                })?;
            let info = resolve_type_symbol(&type_symbol, &self.forms)
                .ok_or(RunError::UnknownType(type_symbol))?;
            let matched = if info.form.is_some() {
                value.kind() == Kind::BraceList
            } else {
                value.kind() == info.kind
            };
            if matched {
                return self.eval(&arm.element(1).unwrap_or_default());
            }
        }
        Ok(Value::none())
    }

    fn form_try(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "try", 2)?;
        let body = call.element(1).unwrap_or_default();

        let depth = self.scopes.depth();
        let loop_depth = self.loops.len();
        let error_value = match self.eval(&body) {
            Ok(value) if value.kind() != Kind::Error => return Ok(value),
            Ok(error_value) => error_value,
            // A fault raised inside the body is converted to an error value
            // for the handler. It may have unwound out of arbitrarily many
            // scopes and loop frames; restore both first.
            Err(error) => {
                self.unwind_to_depth(depth);
                self.loops.truncate(loop_depth);
                Value::error_message(&error.to_string())
            }
        };

        let handler = call.element(2).unwrap_or_default();
        if handler.kind() == Kind::BracketList {
            self.push_scope();
            self.scopes.define("$error", error_value);
            let result = self.eval(&handler);
            self.pop_scope();
            result
        } else {
            self.eval(&handler)
        }
    }

    fn form_recover(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "recover", 2)?;
        let body = call.element(1).unwrap_or_default();
        let handler = call.element(2).unwrap_or_default();
        if body.kind() != Kind::BracketList || handler.kind() != Kind::BracketList {
            return Err(RunError::InvalidForm {
                form: "recover",
                message: "body and handler must be bracket lists".to_owned(),
            });
        }

        let depth = self.scopes.depth();
        let loop_depth = self.loops.len();
        match self.eval(&body) {
            Ok(value) => Ok(value),
            Err(error) => {
                // The fault may have unwound out of arbitrarily many scopes
                // and loop frames; restore both before running the handler.
                self.unwind_to_depth(depth);
                self.loops.truncate(loop_depth);

                self.push_scope();
                self.scopes.define("$exception", Value::string(&error.to_string()));
                let result = self.eval(&handler);
                self.pop_scope();
                result
            }
        }
    }

    fn form_assert(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "assert", 2)?;
        let condition = self.eval(&call.element(1).unwrap_or_default())?;
        let truth = condition.as_int().ok_or(RunError::KindMismatch {
            context: "assert condition",
            expected: Kind::Int,
            got: condition.kind(),
        })?;
        if truth != 0 {
            return Ok(Value::none());
        }

        let message_value = self.eval(&call.element(2).unwrap_or_default())?;
        let message = message_value.string_value().ok_or(RunError::KindMismatch {
            context: "assert message",
            expected: Kind::Str,
            got: message_value.kind(),
        })?;
        Err(RunError::AssertionFailed(message))
    }

    fn form_eval(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "eval", 1)?;
        let code_value = self.eval(&call.element(1).unwrap_or_default())?;
        let code = code_value.string_value().ok_or(RunError::KindMismatch {
            context: "eval argument",
            expected: Kind::Str,
            got: code_value.kind(),
        })?;
        let parsed = parse(&code)?;
        self.eval(&parsed)
    }

    fn form_apply(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "apply", 2)?;
        let lambda = self.eval(&call.element(1).unwrap_or_default())?;
        let lambda_id = lambda.aberrant_id().ok_or(RunError::KindMismatch {
            context: "apply lambda",
            expected: Kind::Aberrant,
            got: lambda.kind(),
        })?;
        let args_list = self.eval(&call.element(2).unwrap_or_default())?;
        if args_list.kind() != Kind::BraceList {
            return Err(RunError::KindMismatch {
                context: "apply arguments",
                expected: Kind::BraceList,
                got: args_list.kind(),
            });
        }

        let mut args = Vec::with_capacity(args_list.len());
        for element in args_list.elements() {
            args.push(self.eval(&element)?);
        }
        self.call_lambda(lambda_id, args)
    }

    fn form_export(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "export", 2)?;
        let name = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| RunError::InvalidForm {
                form: "export",
                message: "first argument must be a symbol (export name)".to_owned(),
            })?;
        let value = self.eval(&call.element(2).unwrap_or_default())?;
        self.scopes.define(&name, value.clone());
        self.exports.insert(name, value);
        Ok(Value::none())
    }

    fn form_debug(&mut self, call: &Value) -> RunResult<Value> {
        for index in 1..call.len() {
            let value = self.eval(&call.element(index).unwrap_or_default())?;
            let line = self.render(&value);
            self.print.borrow_mut().write_line(&line);
        }
        Ok(Value::none())
    }

    fn form_cast(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "cast", 2)?;
        let type_symbol = call
            .element(1)
            .and_then(|v| v.symbol_name().map(str::to_owned))
            .ok_or_else(|| RunError::InvalidForm {
                form: "cast",
                message: "first argument must be a type symbol".to_owned(),
            })?;
        if resolve_type_symbol(&type_symbol, &self.forms).is_none() {
            return Err(RunError::UnknownType(type_symbol));
        }
        // The static type changes; the value does not.
        self.eval(&call.element(2).unwrap_or_default())
    }

    fn form_do(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "do", 1)?;
        let body = call.element(1).unwrap_or_default();
        if body.kind() != Kind::BracketList {
            return Err(RunError::InvalidForm {
                form: "do",
                message: "body must be a bracket list".to_owned(),
            });
        }

        self.loops.push(LoopFrame {
            done: false,
            result: Value::none(),
            iteration: 1,
        });
        self.push_scope();

        let outcome = self.run_do_body(&body);

        self.pop_scope();
        let frame = self.loops.pop().unwrap_or_default();
        outcome.map(|()| frame.result)
    }

    fn run_do_body(&mut self, body: &Value) -> RunResult<()> {
        loop {
            let iteration = self.loops.last().map_or(1, |frame| frame.iteration);
            self.scopes.define("$iterations", Value::int(iteration));
            self.eval(body)?;
            match self.loops.last_mut() {
                Some(frame) if !frame.done => frame.iteration += 1,
                _ => return Ok(()),
            }
        }
    }

    fn form_done(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "done", 1)?;
        let value = self.eval(&call.element(1).unwrap_or_default())?;
        let frame = self.loops.last_mut().ok_or(RunError::DoneOutsideLoop)?;
        frame.result = value;
        frame.done = true;
        Ok(Value::none())
    }

    fn form_at(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "at", 2)?;
        let index_value = self.eval(&call.element(1).unwrap_or_default())?;
        let index = index_value.as_int().ok_or(RunError::KindMismatch {
            context: "at index",
            expected: Kind::Int,
            got: index_value.kind(),
        })?;
        let collection = self.eval(&call.element(2).unwrap_or_default())?;
        if !(collection.kind().is_list() || collection.kind() == Kind::Str) {
            return Err(RunError::KindMismatch {
                context: "at collection",
                expected: Kind::ParenList,
                got: collection.kind(),
            });
        }

        let out_of_range = RunError::IndexOutOfRange {
            index,
            len: collection.len(),
        };
        let position = usize::try_from(index).map_err(|_| out_of_range.clone())?;
        collection.element(position).ok_or(out_of_range)
    }

    fn form_eq(&mut self, call: &Value) -> RunResult<Value> {
        expect_arity(call, "eq", 2)?;
        let lhs = self.eval(&call.element(1).unwrap_or_default())?;
        let rhs = self.eval(&call.element(2).unwrap_or_default())?;
        Ok(Value::int(i64::from(lhs.structural_eq(&rhs))))
    }
}
