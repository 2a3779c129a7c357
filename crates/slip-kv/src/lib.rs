//! A sample kernel: an in-process key-value store.
//!
//! Built as a `cdylib` and deployed next to its `kernel.slip` manifest, this
//! kernel contributes `kv/store`, `kv/fetch`, and `kv/erase`. Values are
//! stored as strings; `fetch` re-parses integers and reals so round-tripped
//! numbers come back with their original kind.

use std::{
    collections::HashMap,
    ffi::{CStr, CString},
    sync::{Mutex, OnceLock},
};

use slip_abi::{SlipApiTable, SlipContext, SlipKind, SlipObject, SlipRegistry};

/// The callback table handed to `kernel_init`; valid for the process
/// lifetime per the ABI contract.
struct ApiHandle(*const SlipApiTable);

// SAFETY: the table is 'static and immutable per the ABI contract.
unsafe impl Send for ApiHandle {}
// SAFETY: as above; shared reads only.
unsafe impl Sync for ApiHandle {}

static API: OnceLock<ApiHandle> = OnceLock::new();

fn api() -> Option<&'static SlipApiTable> {
    // SAFETY: the runtime guarantees the table outlives the loaded library.
    API.get().map(|handle| unsafe { &*handle.0 })
}

fn store() -> &'static Mutex<HashMap<String, String>> {
    static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Reads a string out of an object handle, freeing the ABI-side allocation.
///
/// # Safety
/// `obj` must be a live object handle.
unsafe fn read_string(api: &SlipApiTable, obj: *mut SlipObject) -> Option<String> {
    // SAFETY: obj is a live handle per the caller contract.
    let raw = unsafe { (api.as_string)(obj) };
    if raw.is_null() {
        return None;
    }
    // SAFETY: raw was allocated by the runtime's as_string.
    let text = unsafe { CStr::from_ptr(raw) }.to_str().ok().map(str::to_owned);
    // SAFETY: raw came from as_string and is freed exactly once.
    unsafe { (api.free_string)(raw) };
    text
}

/// Renders any supported value as its storage string.
///
/// # Safety
/// `obj` must be a live object handle.
unsafe fn value_to_string(api: &SlipApiTable, obj: *mut SlipObject) -> String {
    // SAFETY: obj is a live handle per the caller contract.
    let kind = SlipKind::from_raw(unsafe { (api.get_kind)(obj) });
    match kind {
        // SAFETY: as above.
        Some(SlipKind::Int) => unsafe { (api.as_int)(obj) }.to_string(),
        // SAFETY: as above.
        Some(SlipKind::Real) => unsafe { (api.as_real)(obj) }.to_string(),
        // SAFETY: as above.
        Some(SlipKind::Str) => unsafe { read_string(api, obj) }.unwrap_or_default(),
        _ => String::new(),
    }
}

fn make_string(api: &SlipApiTable, text: &str) -> *mut SlipObject {
    let Ok(c_text) = CString::new(text) else {
        // SAFETY: create_none takes no arguments.
        return unsafe { (api.create_none)() };
    };
    // SAFETY: c_text is NUL-terminated and outlives the call.
    unsafe { (api.create_string)(c_text.as_ptr()) }
}

/// Re-parses a stored string into the most specific value kind.
fn string_to_value(api: &SlipApiTable, text: &str) -> *mut SlipObject {
    if let Ok(int_value) = text.parse::<i64>() {
        // SAFETY: plain scalar constructor.
        return unsafe { (api.create_int)(int_value) };
    }
    if let Ok(real_value) = text.parse::<f64>() {
        if text.contains(['.', 'e', 'E']) {
            // SAFETY: plain scalar constructor.
            return unsafe { (api.create_real)(real_value) };
        }
    }
    make_string(api, text)
}

fn make_error(api: &SlipApiTable, message: &str) -> *mut SlipObject {
    let Ok(c_message) = CString::new(message) else {
        // SAFETY: create_none takes no arguments.
        return unsafe { (api.create_none)() };
    };
    // SAFETY: c_message is NUL-terminated and outlives the call.
    unsafe { (api.create_error)(c_message.as_ptr()) }
}

/// Evaluates argument `index` of the call form and returns its string form.
///
/// # Safety
/// `ctx` and `args` must be the live handles passed to the kernel function.
unsafe fn eval_string_arg(
    api: &SlipApiTable,
    ctx: *mut SlipContext,
    args: *mut SlipObject,
    index: usize,
) -> Option<String> {
    // SAFETY: args is a live list handle.
    let arg = unsafe { (api.list_at)(args, index) };
    if arg.is_null() {
        return None;
    }
    // SAFETY: ctx is the live interpreter context; arg is a live handle.
    let evaluated = unsafe { (api.eval)(ctx, arg) };
    // SAFETY: arg is owned by this kernel and returned to the runtime here.
    unsafe { (api.release)(arg) };
    if evaluated.is_null() {
        return None;
    }
    // SAFETY: evaluated is a live handle.
    let text = unsafe { read_string(api, evaluated) };
    // SAFETY: evaluated is owned by this kernel.
    unsafe { (api.release)(evaluated) };
    text
}

unsafe extern "C" fn kv_store(ctx: *mut SlipContext, args: *mut SlipObject) -> *mut SlipObject {
    let Some(api) = api() else {
        return std::ptr::null_mut();
    };
    // SAFETY: ctx/args are the live handles for this call.
    let Some(key) = (unsafe { eval_string_arg(api, ctx, args, 1) }) else {
        return make_error(api, "kv/store requires a string key");
    };

    // SAFETY: args is a live list handle.
    let value_arg = unsafe { (api.list_at)(args, 2) };
    if value_arg.is_null() {
        return make_error(api, "kv/store requires a value");
    }
    // SAFETY: ctx is live; value_arg is a live handle.
    let evaluated = unsafe { (api.eval)(ctx, value_arg) };
    // SAFETY: value_arg is owned by this kernel.
    unsafe { (api.release)(value_arg) };
    // SAFETY: evaluated is a live handle (or null, handled below).
    let stored = if evaluated.is_null() {
        String::new()
    } else {
        unsafe { value_to_string(api, evaluated) }
    };
    if !evaluated.is_null() {
        // SAFETY: evaluated is owned by this kernel.
        unsafe { (api.release)(evaluated) };
    }

    if let Ok(mut map) = store().lock() {
        map.insert(key, stored);
    }
    // SAFETY: plain constructor.
    unsafe { (api.create_none)() }
}

unsafe extern "C" fn kv_fetch(ctx: *mut SlipContext, args: *mut SlipObject) -> *mut SlipObject {
    let Some(api) = api() else {
        return std::ptr::null_mut();
    };
    // SAFETY: ctx/args are the live handles for this call.
    let Some(key) = (unsafe { eval_string_arg(api, ctx, args, 1) }) else {
        return make_error(api, "kv/fetch requires a string key");
    };

    let stored = store().lock().ok().and_then(|map| map.get(&key).cloned());
    match stored {
        Some(text) => string_to_value(api, &text),
        None => make_error(api, &format!("kv/fetch: no value for key {key}")),
    }
}

unsafe extern "C" fn kv_erase(ctx: *mut SlipContext, args: *mut SlipObject) -> *mut SlipObject {
    let Some(api) = api() else {
        return std::ptr::null_mut();
    };
    // SAFETY: ctx/args are the live handles for this call.
    let Some(key) = (unsafe { eval_string_arg(api, ctx, args, 1) }) else {
        return make_error(api, "kv/erase requires a string key");
    };

    let removed = store()
        .lock()
        .ok()
        .is_some_and(|mut map| map.remove(&key).is_some());
    // SAFETY: plain scalar constructor.
    unsafe { (api.create_int)(i64::from(removed)) }
}

/// Kernel entry point called by the runtime at load time.
///
/// # Safety
/// `registry` and `api` must be the live handles the runtime passes during
/// kernel initialisation.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kernel_init(registry: *mut SlipRegistry, api: *const SlipApiTable) {
    if api.is_null() {
        return;
    }
    let _ = API.set(ApiHandle(api));
    // SAFETY: api is valid per the entry-point contract.
    let table = unsafe { &*api };

    for (name, function, return_kind) in [
        ("store", kv_store as slip_abi::KernelFn, SlipKind::None),
        ("fetch", kv_fetch as slip_abi::KernelFn, SlipKind::None),
        ("erase", kv_erase as slip_abi::KernelFn, SlipKind::Int),
    ] {
        let Ok(c_name) = CString::new(name) else {
            continue;
        };
        // SAFETY: registry is live for the duration of kernel_init; c_name
        // is NUL-terminated.
        unsafe {
            (table.register_function)(registry, c_name.as_ptr(), function, return_kind as u32, 0);
        }
    }
}
