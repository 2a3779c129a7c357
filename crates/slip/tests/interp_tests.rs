use std::{cell::RefCell, path::PathBuf, rc::Rc};

use slip::{
    CollectStringPrint, Interp, Kind, NoPrint, RunError, SharedPrint, Value, parse, shared_print,
};

fn interp() -> Interp {
    Interp::with_print(Vec::new(), PathBuf::from("."), shared_print(NoPrint))
}

fn eval(source: &str) -> Result<Value, RunError> {
    let program = parse(source).unwrap_or_else(|e| panic!("{source:?} should parse: {e}"));
    interp().eval(&program)
}

fn eval_ok(source: &str) -> Value {
    eval(source).unwrap_or_else(|e| panic!("{source:?} should evaluate, got {e}"))
}

fn eval_err(source: &str) -> RunError {
    eval(source).expect_err(&format!("{source:?} should fail"))
}

/// Evaluates with a capturing debug writer and returns (result, output).
fn eval_capturing(source: &str) -> (Result<Value, RunError>, String) {
    let sink = Rc::new(RefCell::new(CollectStringPrint::new()));
    let shared: SharedPrint = sink.clone();
    let mut interp = Interp::with_print(Vec::new(), PathBuf::from("."), shared);
    let program = parse(source).unwrap();
    let result = interp.eval(&program);
    let output = sink.borrow().output().to_owned();
    (result, output)
}

#[test]
fn arithmetic_and_binding() {
    let (result, output) = eval_capturing("[ (def x 41) (def y 1) (debug x y) ]");
    assert_eq!(result.unwrap().kind(), Kind::None);
    assert!(output.contains("41"), "output: {output}");
    assert!(output.contains('1'), "output: {output}");
}

#[test]
fn literals_self_evaluate() {
    assert_eq!(eval_ok("41").as_int(), Some(41));
    assert_eq!(eval_ok("2.5").as_real(), Some(2.5));
    assert_eq!(eval_ok("\"hi\"").string_value().as_deref(), Some("hi"));
    assert_eq!(eval_ok("{1 2}").kind(), Kind::BraceList);
    assert_eq!(eval_ok("@\"boom\"").kind(), Kind::Error);
    assert_eq!(eval_ok("()").kind(), Kind::ParenList);
}

#[test]
fn quoted_values_unwrap_on_evaluation() {
    assert_eq!(eval_ok("'5").as_int(), Some(5));
    // The inner value is not invoked.
    assert_eq!(eval_ok("'(def x 1)").kind(), Kind::ParenList);
}

#[test]
fn unresolved_symbols_evaluate_to_themselves() {
    assert_eq!(eval_ok("unbound").symbol_name(), Some("unbound"));
}

#[test]
fn def_binds_in_current_scope() {
    assert_eq!(eval_ok("[ (def x 41) x ]").as_int(), Some(41));
}

#[test]
fn lambda_call_with_matching_types() {
    assert_eq!(
        eval_ok("[ (def inc (fn (n :int) :int [ n ])) (inc 5) ]").as_int(),
        Some(5)
    );
}

#[test]
fn lambda_arity_mismatch_raises() {
    let err = eval_err("[ (def inc (fn (n :int) :int [ n ])) (inc 1 2) ]");
    assert!(matches!(err, RunError::Arity { expected: 1, got: 2, .. }), "got: {err}");
}

#[test]
fn lambda_argument_kind_mismatch_raises() {
    let err = eval_err("[ (def inc (fn (n :int) :int [ n ])) (inc \"s\") ]");
    assert!(matches!(err, RunError::KindMismatch { .. }), "got: {err}");
}

#[test]
fn lambda_return_kind_mismatch_yields_error_value() {
    // The call does not raise; it produces an error value the caller can
    // inspect or hand to `try`.
    let value = eval_ok("[ (def f (fn () :int [ \"s\" ])) (f) ]");
    assert_eq!(value.kind(), Kind::Error);
}

#[test]
fn any_typed_parameters_skip_the_kind_check() {
    assert_eq!(
        eval_ok("[ (def id (fn (v :any) :none [ v ])) (id \"s\") ]").kind(),
        Kind::Str
    );
}

#[test]
fn if_selects_on_nonzero_integer() {
    assert_eq!(eval_ok("(if 1 \"a\" \"b\")").string_value().as_deref(), Some("a"));
    assert_eq!(eval_ok("(if 0 \"a\" \"b\")").string_value().as_deref(), Some("b"));
}

#[test]
fn match_takes_first_structurally_equal_arm() {
    assert_eq!(
        eval_ok("(match 2 (1 \"one\") (2 \"two\"))").string_value().as_deref(),
        Some("two")
    );
    assert_eq!(eval_ok("(match 3 (1 \"one\"))").kind(), Kind::None);
    assert_eq!(
        eval_ok("(match {1 2} ({1 2} \"pair\"))").string_value().as_deref(),
        Some("pair")
    );
}

#[test]
fn reflect_dispatches_on_runtime_kind() {
    assert_eq!(eval_ok("(reflect 2.5 (:int 1) (:real 2))").as_int(), Some(2));
    assert_eq!(eval_ok("(reflect \"s\" (:int 1))").kind(), Kind::None);
}

#[test]
fn try_passes_through_non_error_values() {
    assert_eq!(eval_ok("(try 7 0)").as_int(), Some(7));
}

#[test]
fn try_hands_error_values_to_the_handler() {
    assert_eq!(eval_ok("(try @\"boom\" [ 42 ])").as_int(), Some(42));

    let (result, output) = eval_capturing("(try @\"boom\" [ (debug $error) 42 ])");
    assert_eq!(result.unwrap().as_int(), Some(42));
    assert!(output.contains("boom"), "output: {output}");
}

#[test]
fn try_converts_raised_faults_to_error_values() {
    // The body raises; the fault reaches the handler as an error value
    // rather than propagating past the frame.
    assert_eq!(eval_ok("(try (assert 0 \"boom\") [ 42 ])").as_int(), Some(42));

    let (result, output) = eval_capturing("(try (assert 0 \"boom\") [ (debug $error) 42 ])");
    assert_eq!(result.unwrap().as_int(), Some(42));
    assert!(output.contains("boom"), "output: {output}");
}

#[test]
fn try_restores_scope_depth_after_unwinding() {
    // The fault fires inside a lambda call, past a pushed frame; the handler
    // still sees the outer binding.
    let value = eval_ok(
        "[ (def x 41) \
           (def f (fn () :none [ (assert 0 \"inner\") ])) \
           (try (f) [ x ]) ]",
    );
    assert_eq!(value.as_int(), Some(41));
}

#[test]
fn recover_catches_runtime_faults() {
    let value = eval_ok("(recover [ (assert 0 \"nope\") 1 ] [ $exception ])");
    assert_eq!(value.kind(), Kind::Str);
    assert!(value.string_value().unwrap().contains("nope"));
}

#[test]
fn recover_passes_through_successful_bodies() {
    assert_eq!(eval_ok("(recover [ 5 ] [ 0 ])").as_int(), Some(5));
}

#[test]
fn recover_restores_scope_depth_after_unwinding() {
    // The fault fires inside a lambda call, past a pushed frame; the handler
    // still sees the outer binding.
    let value = eval_ok(
        "[ (def x 41) \
           (def f (fn () :none [ (assert 0 \"inner\") ])) \
           (recover [ (f) 0 ] [ x ]) ]",
    );
    assert_eq!(value.as_int(), Some(41));
}

#[test]
fn assert_passes_on_nonzero() {
    assert_eq!(eval_ok("(assert 1 \"fine\")").kind(), Kind::None);
    let err = eval_err("(assert 0 \"broken\")");
    assert!(matches!(err, RunError::AssertionFailed(ref m) if m == "broken"), "got: {err}");
}

#[test]
fn eval_form_runs_parsed_source_in_context() {
    assert_eq!(eval_ok("[ (eval \"(def z 9)\") z ]").as_int(), Some(9));
    let err = eval_err("(eval \"(unclosed\")");
    assert!(matches!(err, RunError::Parse(_)), "got: {err}");
}

#[test]
fn apply_calls_with_brace_list_arguments() {
    assert_eq!(
        eval_ok("[ (def id (fn (n :int) :int [ n ])) (apply id {5}) ]").as_int(),
        Some(5)
    );
}

#[test]
fn cast_is_a_structural_no_op() {
    let value = eval_ok("[ #(define-form pair {:int :int}) (cast :pair {1 2}) ]");
    assert_eq!(value.kind(), Kind::BraceList);
    assert_eq!(value.len(), 2);
    assert_eq!(value.element(0).unwrap().as_int(), Some(1));
}

#[test]
fn composite_form_and_cast_end_to_end() {
    let (result, output) = eval_capturing(
        "[ #(define-form pair {:int :int}) (def p (cast :pair {1 2})) (debug p) ]",
    );
    assert_eq!(result.unwrap().kind(), Kind::None);
    assert!(output.contains("{1 2}"), "output: {output}");
}

#[test]
fn do_loops_until_done_and_counts_iterations() {
    let value = eval_ok("(do [ (if (eq $iterations 3) (done $iterations) 0) ])");
    assert_eq!(value.as_int(), Some(3));
}

#[test]
fn do_yields_the_done_value() {
    assert_eq!(eval_ok("(do [ (done \"finished\") ])").string_value().as_deref(), Some("finished"));
}

#[test]
fn nested_do_loops_exit_innermost_first() {
    let value = eval_ok("(do [ (def inner (do [ (done 5) ])) (done inner) ])");
    assert_eq!(value.as_int(), Some(5));
}

#[test]
fn done_outside_do_raises() {
    assert!(matches!(eval_err("(done 1)"), RunError::DoneOutsideLoop));
}

#[test]
fn at_indexes_lists_and_strings() {
    assert_eq!(eval_ok("(at 1 {10 20})").as_int(), Some(20));
    assert_eq!(eval_ok("(at 0 \"hi\")").as_rune(), Some('h'));
    assert!(matches!(
        eval_err("(at 5 {1 2})"),
        RunError::IndexOutOfRange { index: 5, len: 2 }
    ));
    assert!(matches!(eval_err("(at -1 {1})"), RunError::IndexOutOfRange { .. }));
}

#[test]
fn eq_compares_structurally() {
    assert_eq!(eval_ok("(eq 1 1)").as_int(), Some(1));
    assert_eq!(eval_ok("(eq 1 2)").as_int(), Some(0));
    assert_eq!(eval_ok("(eq {1 \"a\"} {1 \"a\"})").as_int(), Some(1));
    assert_eq!(eval_ok("(eq 1 1.0)").as_int(), Some(0));
    assert_eq!(eval_ok("(eq 'sym 'sym)").as_int(), Some(1));
}

#[test]
fn export_records_bindings_in_order() {
    let mut interp = interp();
    let program = parse("[ (export a 1) (export b \"s\") ]").unwrap();
    interp.eval(&program).unwrap();
    let names: Vec<&str> = interp.exports().keys().map(String::as_str).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(interp.exports().get("a").unwrap().as_int(), Some(1));
}

#[test]
fn debug_renders_lambda_signatures() {
    let (_, output) = eval_capturing(
        "[ (def add (fn (a :int b :real) :int [ a ])) (debug add) ]",
    );
    assert!(output.contains(":fn<int,real>int"), "output: {output}");
}

#[test]
fn unknown_callable_raises() {
    assert!(matches!(eval_err("(frobnicate 1)"), RunError::UnknownCallable(_)));
}

#[test]
fn non_symbol_head_raises() {
    assert!(matches!(eval_err("(1 2)"), RunError::NotCallable(Kind::Int)));
}

#[test]
fn unknown_datum_directive_raises() {
    assert!(matches!(
        eval_err("#(mystery 1)"),
        RunError::UnknownDatumCallable(_)
    ));
}

#[test]
fn datum_debug_falls_back_to_the_standard_form() {
    let (result, output) = eval_capturing("#(debug 41)");
    assert_eq!(result.unwrap().kind(), Kind::None);
    assert!(output.contains("41"), "output: {output}");
}

#[test]
fn lambdas_do_not_outlive_their_scope() {
    // The inner lambda is registered inside the outer lambda's frame and is
    // purged when that frame pops; the escaped aberrant id no longer
    // resolves.
    let err = eval_err(
        "[ (def make (fn () :aberrant [ (fn () :int [ 1 ]) ])) \
           (def leaked (make)) \
           (leaked) ]",
    );
    assert!(matches!(err, RunError::UnknownCallable(_)), "got: {err}");
}

#[test]
fn shadowing_follows_scope_discipline() {
    // The parameter shadows the outer x inside the body only.
    let value = eval_ok(
        "[ (def x 1) \
           (def f (fn (x :int) :int [ x ])) \
           (def y (f 2)) \
           (if (eq x 1) (eq y 2) 0) ]",
    );
    assert_eq!(value.as_int(), Some(1));
}
