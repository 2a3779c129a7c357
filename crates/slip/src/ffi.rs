//! The runtime side of the native-kernel ABI.
//!
//! Every callback in [`API_TABLE`] is an `extern "C"` shim that casts the
//! opaque handles back to their concrete types: `SlipContext` is a
//! [`crate::interp::Interp`], `SlipRegistry` is a
//! [`crate::kernel::RegistrationSession`], and `SlipObject` is a boxed
//! [`Value`]. Object handles are heap boxes whose ownership follows the ABI
//! contract: constructors hand ownership to the kernel, and the kernel hands
//! it back by returning the object or calling `release`.

use std::ffi::{CStr, CString, c_char, c_int};

use slip_abi::{KernelFn, SlipApiTable, SlipContext, SlipObject, SlipRegistry};

use crate::{
    arena::Kind,
    error::RunResult,
    interp::Interp,
    kernel::{KernelEntry, RegistrationSession},
    value::Value,
};

/// Invokes a native kernel function with the unevaluated call form.
///
/// A null return is treated as `none`. Faults inside the kernel surface as
/// `Error` values built by the kernel itself; the boundary never unwinds.
pub(crate) fn call_native(interp: &mut Interp, function: KernelFn, form: &Value) -> RunResult<Value> {
    let ctx = std::ptr::from_mut(interp).cast::<SlipContext>();
    let args = Box::into_raw(Box::new(form.clone())).cast::<SlipObject>();
    // SAFETY: ctx and args are valid for the duration of the call; the
    // kernel contract forbids retaining either past its return.
    let ret = unsafe { function(ctx, args) };
    // SAFETY: args was created by Box::into_raw above and is not retained by
    // the kernel.
    drop(unsafe { Box::from_raw(args.cast::<Value>()) });
    if ret.is_null() {
        return Ok(Value::none());
    }
    // SAFETY: per the ABI contract, a non-null return is a boxed Value whose
    // ownership passes back to the runtime.
    Ok(*unsafe { Box::from_raw(ret.cast::<Value>()) })
}

fn box_value(value: Value) -> *mut SlipObject {
    Box::into_raw(Box::new(value)).cast::<SlipObject>()
}

/// # Safety
/// `obj` must be a live object handle produced by this table.
unsafe fn value_ref<'a>(obj: *mut SlipObject) -> Option<&'a Value> {
    // SAFETY: deferred to the caller.
    unsafe { obj.cast::<Value>().as_ref() }
}

unsafe extern "C" fn api_register_function(
    registry: *mut SlipRegistry,
    name: *const c_char,
    function: KernelFn,
    _return_kind: u32,
    _variadic: c_int,
) -> c_int {
    if registry.is_null() || name.is_null() {
        return 1;
    }
    // SAFETY: the registry handle passed to kernel_init is a live
    // RegistrationSession for the duration of initialisation.
    let session = unsafe { &mut *registry.cast::<RegistrationSession>() };
    // SAFETY: name is a NUL-terminated string per the ABI contract.
    let Ok(local_name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return 1;
    };
    let qualified = format!("{}/{}", session.prefix, local_name);
    // SAFETY: the session's registry pointer is derived from the live
    // &mut KernelRegistry driving the load.
    let registry = unsafe { &mut *session.registry };
    match registry.register(&qualified, KernelEntry::Native(function)) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

unsafe extern "C" fn api_eval(ctx: *mut SlipContext, obj: *mut SlipObject) -> *mut SlipObject {
    if ctx.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: the context handle is the interpreter that invoked the kernel,
    // alive for the duration of the call.
    let interp = unsafe { &mut *ctx.cast::<Interp>() };
    // SAFETY: obj is a live object handle.
    let Some(value) = (unsafe { value_ref(obj) }) else {
        return std::ptr::null_mut();
    };
    match interp.eval(value) {
        Ok(result) => box_value(result),
        // Kernel-visible faults arrive as error values, not unwinds.
        Err(error) => box_value(Value::error_message(&error.to_string())),
    }
}

unsafe extern "C" fn api_get_kind(obj: *mut SlipObject) -> u32 {
    // SAFETY: obj is a live object handle (or null, mapped to None).
    unsafe { value_ref(obj) }.map_or(Kind::None as u32, |v| v.kind() as u32)
}

unsafe extern "C" fn api_as_int(obj: *mut SlipObject) -> i64 {
    // SAFETY: obj is a live object handle.
    unsafe { value_ref(obj) }.and_then(Value::as_int).unwrap_or(0)
}

unsafe extern "C" fn api_as_real(obj: *mut SlipObject) -> f64 {
    // SAFETY: obj is a live object handle.
    unsafe { value_ref(obj) }.and_then(Value::as_real).unwrap_or(0.0)
}

fn to_c_string(text: Option<String>) -> *mut c_char {
    match text.and_then(|t| CString::new(t).ok()) {
        Some(s) => s.into_raw(),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn api_as_string(obj: *mut SlipObject) -> *mut c_char {
    // SAFETY: obj is a live object handle.
    to_c_string(unsafe { value_ref(obj) }.and_then(Value::string_value))
}

unsafe extern "C" fn api_as_symbol(obj: *mut SlipObject) -> *mut c_char {
    // SAFETY: obj is a live object handle.
    to_c_string(unsafe { value_ref(obj) }.and_then(|v| v.symbol_name().map(str::to_owned)))
}

unsafe extern "C" fn api_list_size(obj: *mut SlipObject) -> usize {
    // SAFETY: obj is a live object handle.
    unsafe { value_ref(obj) }.map_or(0, Value::len)
}

unsafe extern "C" fn api_list_at(obj: *mut SlipObject, index: usize) -> *mut SlipObject {
    // SAFETY: obj is a live object handle.
    match unsafe { value_ref(obj) }.and_then(|v| v.element(index)) {
        Some(element) => box_value(element),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn api_some_has_value(obj: *mut SlipObject) -> c_int {
    // SAFETY: obj is a live object handle.
    let is_some = unsafe { value_ref(obj) }
        .is_some_and(|v| v.kind() == Kind::Some && v.inner().is_some());
    c_int::from(is_some)
}

unsafe extern "C" fn api_some_get_value(obj: *mut SlipObject) -> *mut SlipObject {
    // SAFETY: obj is a live object handle.
    match unsafe { value_ref(obj) }.filter(|v| v.kind() == Kind::Some).and_then(Value::inner) {
        Some(inner) => box_value(inner),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn api_create_int(value: i64) -> *mut SlipObject {
    box_value(Value::int(value))
}

unsafe extern "C" fn api_create_real(value: f64) -> *mut SlipObject {
    box_value(Value::real(value))
}

/// # Safety
/// `value` must be null or a NUL-terminated string.
unsafe fn c_str_or_empty<'a>(value: *const c_char) -> &'a str {
    if value.is_null() {
        return "";
    }
    // SAFETY: deferred to the caller.
    unsafe { CStr::from_ptr(value) }.to_str().unwrap_or("")
}

unsafe extern "C" fn api_create_string(value: *const c_char) -> *mut SlipObject {
    // SAFETY: value is a NUL-terminated string per the ABI contract.
    box_value(Value::string(unsafe { c_str_or_empty(value) }))
}

unsafe extern "C" fn api_create_symbol(name: *const c_char) -> *mut SlipObject {
    // SAFETY: name is a NUL-terminated string per the ABI contract.
    box_value(Value::symbol(unsafe { c_str_or_empty(name) }))
}

unsafe extern "C" fn api_create_none() -> *mut SlipObject {
    box_value(Value::none())
}

unsafe extern "C" fn api_create_error(message: *const c_char) -> *mut SlipObject {
    // SAFETY: message is a NUL-terminated string per the ABI contract.
    box_value(Value::error_message(unsafe { c_str_or_empty(message) }))
}

/// # Safety
/// `objects` must point at `count` live object handles.
unsafe fn collect_items(objects: *const *mut SlipObject, count: usize) -> Vec<Value> {
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        // SAFETY: deferred to the caller.
        let handle = unsafe { *objects.add(index) };
        // SAFETY: each handle is a live object handle.
        match unsafe { value_ref(handle) } {
            Some(value) => items.push(value.clone()),
            None => items.push(Value::none()),
        }
    }
    items
}

unsafe extern "C" fn api_create_paren_list(
    objects: *const *mut SlipObject,
    count: usize,
) -> *mut SlipObject {
    // SAFETY: objects points at count live handles per the ABI contract.
    box_value(Value::list(Kind::ParenList, &unsafe { collect_items(objects, count) }))
}

unsafe extern "C" fn api_create_bracket_list(
    objects: *const *mut SlipObject,
    count: usize,
) -> *mut SlipObject {
    // SAFETY: objects points at count live handles per the ABI contract.
    box_value(Value::list(Kind::BracketList, &unsafe { collect_items(objects, count) }))
}

unsafe extern "C" fn api_create_brace_list(
    objects: *const *mut SlipObject,
    count: usize,
) -> *mut SlipObject {
    // SAFETY: objects points at count live handles per the ABI contract.
    box_value(Value::list(Kind::BraceList, &unsafe { collect_items(objects, count) }))
}

unsafe extern "C" fn api_release(obj: *mut SlipObject) {
    if obj.is_null() {
        return;
    }
    // SAFETY: obj is an owned object handle being returned to the runtime.
    drop(unsafe { Box::from_raw(obj.cast::<Value>()) });
}

unsafe extern "C" fn api_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    // SAFETY: s was produced by CString::into_raw in this module.
    drop(unsafe { CString::from_raw(s) });
}

/// The callback table handed to every `kernel_init`.
pub(crate) static API_TABLE: SlipApiTable = SlipApiTable {
    register_function: api_register_function,
    eval: api_eval,
    get_kind: api_get_kind,
    as_int: api_as_int,
    as_real: api_as_real,
    as_string: api_as_string,
    as_symbol: api_as_symbol,
    list_size: api_list_size,
    list_at: api_list_at,
    some_has_value: api_some_has_value,
    some_get_value: api_some_get_value,
    create_int: api_create_int,
    create_real: api_create_real,
    create_string: api_create_string,
    create_symbol: api_create_symbol,
    create_none: api_create_none,
    create_error: api_create_error,
    create_paren_list: api_create_paren_list,
    create_bracket_list: api_create_bracket_list,
    create_brace_list: api_create_brace_list,
    release: api_release,
    free_string: api_free_string,
};
