use std::{cell::RefCell, fs, path::PathBuf, rc::Rc};

use slip::{
    Checker, CollectStringPrint, Interp, Kind, NoPrint, RunError, RunResult, SharedPrint, Value,
    parse, shared_print,
};
use tempfile::TempDir;

const KV_MANIFEST: &str = r#"#(define-kernel kv "slip_kv" [
    (define-function store (key :str value :any) :none)
    (define-function fetch (key :str) :any)
    (define-function sum (values :int..) :int)
])"#;

/// Creates an include root containing a `kv` kernel directory with the
/// manifest (and no library; checker-side tests never load one).
fn kernel_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    let kernel_dir = dir.path().join("kv");
    fs::create_dir(&kernel_dir).unwrap();
    fs::write(kernel_dir.join("kernel.slip"), KV_MANIFEST).unwrap();
    dir
}

fn checker_for(dir: &TempDir) -> Checker {
    Checker::new(vec![dir.path().to_path_buf()], dir.path().to_path_buf())
}

fn check(dir: &TempDir, source: &str) -> Result<slip::TypeInfo, slip::CheckError> {
    checker_for(dir).check_source(source, "<test>")
}

#[test]
fn load_registers_kernel_signatures() {
    let dir = kernel_root();
    check(&dir, "[ #(load \"kv\") (kv/store \"k\" 1) (kv/fetch \"k\") ]").unwrap();
}

#[test]
fn loading_the_same_kernel_twice_is_a_no_op() {
    let dir = kernel_root();
    check(&dir, "[ #(load \"kv\" \"kv\") (kv/fetch \"k\") ]").unwrap();
}

#[test]
fn kernel_calls_validate_arity() {
    let dir = kernel_root();
    let err = check(&dir, "[ #(load \"kv\") (kv/store \"k\") ]").unwrap_err();
    assert!(err.message().contains("argument"), "got: {}", err.message());
}

#[test]
fn kernel_calls_validate_argument_types() {
    let dir = kernel_root();
    let err = check(&dir, "[ #(load \"kv\") (kv/store 1 2) ]").unwrap_err();
    assert!(err.message().contains("type mismatch"), "got: {}", err.message());
}

#[test]
fn variadic_kernel_signatures_check_every_tail_argument() {
    let dir = kernel_root();
    check(&dir, "[ #(load \"kv\") (kv/sum 1 2 3 4) ]").unwrap();
    let err = check(&dir, "[ #(load \"kv\") (kv/sum 1 \"2\") ]").unwrap_err();
    assert!(err.message().contains("variadic"), "got: {}", err.message());
}

#[test]
fn unresolved_kernel_name_fails_the_check() {
    let dir = TempDir::new().unwrap();
    let err = check(&dir, "[ #(load \"missing\") ]").unwrap_err();
    assert!(err.message().contains("could not resolve kernel"), "got: {}", err.message());
}

#[test]
fn unknown_kernel_function_fails_the_check() {
    let dir = kernel_root();
    let err = check(&dir, "[ #(load \"kv\") (kv/nope 1) ]").unwrap_err();
    assert!(err.message().contains("unknown callable"), "got: {}", err.message());
}

#[test]
fn runtime_load_without_library_reports_the_library() {
    let dir = kernel_root();
    let mut interp = Interp::with_print(
        vec![dir.path().to_path_buf()],
        dir.path().to_path_buf(),
        shared_print(NoPrint),
    );
    let err = interp.eval(&parse("[ #(load \"kv\") ]").unwrap()).unwrap_err();
    match err {
        RunError::KernelLoad { kernel, message } => {
            assert_eq!(kernel, "kv");
            assert!(message.contains("slip_kv"), "got: {message}");
        }
        other => panic!("expected KernelLoad, got {other}"),
    }
}

fn host_add(interp: &mut Interp, call: &Value) -> RunResult<Value> {
    let mut total = 0;
    for index in 1..call.len() {
        let value = interp.eval(&call.element(index).unwrap_or_default())?;
        total += value.as_int().unwrap_or(0);
    }
    Ok(Value::int(total))
}

fn host_fail(_: &mut Interp, _: &Value) -> RunResult<Value> {
    Ok(Value::error_message("kernel says no"))
}

#[test]
fn host_kernel_functions_dispatch_like_any_callable() {
    let mut interp = Interp::with_print(Vec::new(), PathBuf::from("."), shared_print(NoPrint));
    interp.kernels_mut().register_host("math/add", host_add).unwrap();

    let program = parse("[ (def x 20) (math/add x 21 1) ]").unwrap();
    assert_eq!(interp.eval(&program).unwrap().as_int(), Some(42));
}

#[test]
fn kernel_reported_errors_arrive_as_error_values() {
    let sink = Rc::new(RefCell::new(CollectStringPrint::new()));
    let shared: SharedPrint = sink.clone();
    let mut interp = Interp::with_print(Vec::new(), PathBuf::from("."), shared);
    interp.kernels_mut().register_host("bad/call", host_fail).unwrap();

    // `try` sees the kernel's error value like any other.
    let program = parse("(try (bad/call) [ (debug $error) 7 ])").unwrap();
    assert_eq!(interp.eval(&program).unwrap().as_int(), Some(7));
    assert!(sink.borrow().output().contains("kernel says no"));
}

#[test]
fn duplicate_kernel_registration_is_refused() {
    let mut interp = Interp::with_print(Vec::new(), PathBuf::from("."), shared_print(NoPrint));
    interp.kernels_mut().register_host("math/add", host_add).unwrap();
    let err = interp
        .kernels_mut()
        .register_host("math/add", host_add)
        .unwrap_err();
    assert!(matches!(err, RunError::DuplicateKernelFunction(_)));
}

#[test]
fn unregistered_qualified_names_fall_through_to_scope() {
    // A qualified symbol with no kernel entry still resolves through the
    // scope stack (imports bind names of this shape).
    let mut interp = Interp::with_print(Vec::new(), PathBuf::from("."), shared_print(NoPrint));
    let program = parse("[ (def util/val (fn () :int [ 3 ])) (util/val) ]").unwrap();
    assert_eq!(interp.eval(&program).unwrap().as_int(), Some(3));
}

#[test]
fn kind_tags_match_the_abi() {
    // The ABI's tag numbering is the arena's; kernels rely on this.
    assert_eq!(Kind::None as u32, slip_abi::SlipKind::None as u32);
    assert_eq!(Kind::Some as u32, slip_abi::SlipKind::Some as u32);
    assert_eq!(Kind::ParenList as u32, slip_abi::SlipKind::ParenList as u32);
    assert_eq!(Kind::BraceList as u32, slip_abi::SlipKind::BraceList as u32);
    assert_eq!(Kind::Str as u32, slip_abi::SlipKind::Str as u32);
    assert_eq!(Kind::Symbol as u32, slip_abi::SlipKind::Symbol as u32);
    assert_eq!(Kind::Rune as u32, slip_abi::SlipKind::Rune as u32);
    assert_eq!(Kind::Int as u32, slip_abi::SlipKind::Int as u32);
    assert_eq!(Kind::Real as u32, slip_abi::SlipKind::Real as u32);
    assert_eq!(Kind::BracketList as u32, slip_abi::SlipKind::BracketList as u32);
    assert_eq!(Kind::Error as u32, slip_abi::SlipKind::Error as u32);
    assert_eq!(Kind::Datum as u32, slip_abi::SlipKind::Datum as u32);
    assert_eq!(Kind::Aberrant as u32, slip_abi::SlipKind::Aberrant as u32);
}
