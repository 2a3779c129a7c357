use std::{cell::RefCell, fs, rc::Rc};

use slip::{CollectStringPrint, Core, Options, SharedPrint};
use tempfile::TempDir;

fn run_file(source: &str) -> (i32, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("main.slip");
    fs::write(&path, source).unwrap();

    let mut options = Options::new(path);
    options.working_directory = dir.path().to_path_buf();
    let core = Core::new(options).unwrap();

    let sink = Rc::new(RefCell::new(CollectStringPrint::new()));
    let shared: SharedPrint = sink.clone();
    let code = core.run_with_print(shared);
    let output = sink.borrow().output().to_owned();
    (code, output)
}

#[test]
fn missing_file_fails_construction() {
    let err = Core::new(Options::new("/no/such/file.slip")).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn successful_run_returns_zero() {
    let (code, output) = run_file("[ (def x 41) (def y 1) (debug x y) ]");
    assert_eq!(code, 0);
    assert!(output.contains("41"), "output: {output}");
    assert!(output.contains('1'), "output: {output}");
}

#[test]
fn type_errors_surface_before_evaluation() {
    // The program would debug-print if it ran; the checker stops it first.
    let (code, output) = run_file("[ (debug \"ran\") (def bad (fn (n :int) :int [ \"hi\" ])) ]");
    assert_eq!(code, 1);
    assert!(output.is_empty(), "nothing should evaluate, got: {output}");
}

#[test]
fn parse_errors_return_nonzero() {
    let (code, _) = run_file("[ (def x 1");
    assert_eq!(code, 1);
}

#[test]
fn runtime_faults_return_nonzero() {
    let (code, _) = run_file("[ (assert 0 \"always fails\") ]");
    assert_eq!(code, 1);
}

#[test]
fn recovered_faults_still_succeed() {
    let (code, output) = run_file("[ (recover [ (assert 0 \"boom\") 1 ] [ (debug $exception) 2 ]) ]");
    assert_eq!(code, 0);
    assert!(output.contains("boom"), "output: {output}");
}
