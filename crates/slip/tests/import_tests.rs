use std::{fs, path::PathBuf};

use slip::{Checker, Interp, Kind, NoPrint, RunError, parse, shared_print};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn checker_for(dir: &TempDir) -> Checker {
    Checker::new(vec![dir.path().to_path_buf()], dir.path().to_path_buf())
}

fn interp_for(dir: &TempDir) -> Interp {
    Interp::with_print(
        vec![dir.path().to_path_buf()],
        dir.path().to_path_buf(),
        shared_print(NoPrint),
    )
}

const UTIL: &str = "[ (export answer 41) (export ident (fn (n :int) :int [ n ])) ]";

#[test]
fn checker_installs_prefixed_exports() {
    let dir = TempDir::new().unwrap();
    write(&dir, "util.slip", UTIL);
    let main = write(
        &dir,
        "main.slip",
        "[ #(import util \"util.slip\") (def x util/answer) (util/ident x) ]",
    );

    checker_for(&dir).check_file(&main).unwrap();
}

#[test]
fn checker_validates_imported_lambda_calls() {
    let dir = TempDir::new().unwrap();
    write(&dir, "util.slip", UTIL);
    let main = write(
        &dir,
        "main.slip",
        "[ #(import util \"util.slip\") (util/ident \"not an int\") ]",
    );

    let err = checker_for(&dir).check_file(&main).unwrap_err();
    assert!(err.message().contains("type mismatch"), "got: {}", err.message());
}

#[test]
fn checker_reports_unresolved_imports() {
    let dir = TempDir::new().unwrap();
    let main = write(&dir, "main.slip", "[ #(import util \"missing.slip\") ]");

    let err = checker_for(&dir).check_file(&main).unwrap_err();
    assert!(err.message().contains("could not resolve"), "got: {}", err.message());
}

#[test]
fn circular_import_names_the_cycle() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.slip", "[ #(import b \"b.slip\") (export from_a 1) ]");
    write(&dir, "b.slip", "[ #(import a \"a.slip\") (export from_b 2) ]");

    let err = checker_for(&dir).check_file(&a).unwrap_err();
    let message = err.message();
    assert!(message.contains("circular import detected"), "got: {message}");
    assert!(message.contains("a.slip"), "got: {message}");
    assert!(message.contains("b.slip"), "got: {message}");
    assert!(message.contains("cycle detected"), "got: {message}");
}

#[test]
fn checking_a_file_twice_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let main = write(&dir, "main.slip", "[ (def x 1) ]");

    let mut checker = checker_for(&dir);
    checker.check_file(&main).unwrap();
    // The second pass is absorbed by the checked-files set; re-defining x
    // would fail if the file were re-walked in the same context.
    checker.check_file(&main).unwrap();
}

#[test]
fn importing_the_same_file_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write(&dir, "util.slip", UTIL);
    let main = write(
        &dir,
        "main.slip",
        "[ #(import util \"util.slip\" util \"util.slip\") (util/ident util/answer) ]",
    );

    checker_for(&dir).check_file(&main).unwrap();

    let source = fs::read_to_string(&main).unwrap();
    let mut interp = interp_for(&dir);
    let value = interp.eval(&parse(&source).unwrap()).unwrap();
    assert_eq!(value.as_int(), Some(41));
}

#[test]
fn runtime_import_binds_values_and_lambdas() {
    let dir = TempDir::new().unwrap();
    write(&dir, "util.slip", UTIL);

    let mut interp = interp_for(&dir);
    let program = parse("[ #(import util \"util.slip\") (util/ident util/answer) ]").unwrap();
    let value = interp.eval(&program).unwrap();
    assert_eq!(value.as_int(), Some(41));

    assert_eq!(interp.lookup("util/answer").unwrap().as_int(), Some(41));
    assert_eq!(interp.lookup("util/ident").unwrap().kind(), Kind::Aberrant);
}

#[test]
fn runtime_circular_import_fails() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.slip", "[ #(import b \"b.slip\") (export from_a 1) ]");
    write(&dir, "b.slip", "[ #(import a \"a.slip\") (export from_b 2) ]");

    let mut interp = interp_for(&dir);
    let program = parse("[ #(import a \"a.slip\") ]").unwrap();
    let err = interp.eval(&program).unwrap_err();
    assert!(err.to_string().contains("cycle detected"), "got: {err}");
}

#[test]
fn kernel_lock_refuses_late_imports() {
    // The first import runs; the `def` between the two transitions the lock;
    // the second import is refused.
    let dir = TempDir::new().unwrap();
    write(&dir, "x.slip", "[ (export v 1) ]");
    write(&dir, "z.slip", "[ (export w 2) ]");

    let mut interp = interp_for(&dir);
    let program =
        parse("[ #(import x \"x.slip\") (def y 1) #(import z \"z.slip\") ]").unwrap();
    let err = interp.eval(&program).unwrap_err();
    assert!(matches!(err, RunError::LoadLocked { .. }), "got: {err}");

    // The first import did land before the lock.
    assert_eq!(interp.lookup("x/v").unwrap().as_int(), Some(1));
    assert!(interp.is_locked());
}

#[test]
fn locked_interpreter_refuses_both_loaders() {
    let dir = TempDir::new().unwrap();
    write(&dir, "util.slip", UTIL);

    let mut interp = interp_for(&dir);
    interp.lock();
    assert!(matches!(
        interp.attempt_import("util", "util.slip"),
        Err(RunError::LoadLocked { .. })
    ));
    assert!(matches!(
        interp.attempt_load("kv"),
        Err(RunError::LoadLocked { .. })
    ));
}

#[test]
fn imports_resolve_through_include_paths() {
    let lib = TempDir::new().unwrap();
    write(&lib, "util.slip", UTIL);
    let work = TempDir::new().unwrap();

    // Working directory does not contain the file; the include root does.
    let mut interp = Interp::with_print(
        vec![lib.path().to_path_buf()],
        work.path().to_path_buf(),
        shared_print(NoPrint),
    );
    let program = parse("[ #(import util \"util.slip\") util/answer ]").unwrap();
    assert_eq!(interp.eval(&program).unwrap().as_int(), Some(41));
}

#[test]
fn import_failures_propagate_from_the_imported_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "broken.slip", "[ (def x ]"); // does not parse

    let mut interp = interp_for(&dir);
    let program = parse("[ #(import b \"broken.slip\") ]").unwrap();
    let err = interp.eval(&program).unwrap_err();
    assert!(matches!(err, RunError::ImportFailed { .. }), "got: {err}");
}
