//! Host functions and the call primitive

use crate::externs::{wasm_extern_t, ExternHeader, WASM_EXTERN_FUNC};
use crate::store::{forbid_in_finalizer, wasm_store_t, FinalizerScope, StoreObject};
use crate::trap::{
    new_coded_trap, new_message_trap, wasm_trap_t, WASMTIME_TRAP_CODE_INTERRUPT,
    WASMTIME_TRAP_CODE_STACK_OVERFLOW,
};
use crate::types::{wasm_functype_t, FuncTypeObject};
use crate::val::{wasm_val_t, wasm_valkind_t};
use crate::{slice_or_empty, slice_or_empty_mut};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::Ordering;

/// Opaque handle to a function
#[repr(C)]
pub struct wasm_func_t {
    _private: [u8; 0],
}

/// Opaque handle to the calling context passed to host callbacks
#[repr(C)]
pub struct wasmtime_caller_t {
    _private: [u8; 0],
}

/// Host callback invoked by the engine.
///
/// The callback must fill all `nresults` slots when it returns NULL. When it
/// returns a trap, ownership of the trap moves to the engine and the result
/// slots are ignored. The callback must not unwind.
pub type wasmtime_func_callback_with_env_t = unsafe extern "C" fn(
    env: *mut c_void,
    caller: *mut wasmtime_caller_t,
    args: *const wasm_val_t,
    nargs: usize,
    results: *mut wasm_val_t,
    nresults: usize,
) -> *mut wasm_trap_t;

/// Finalizer run on `env` when the function is deleted
pub type wasm_finalizer_t = Option<unsafe extern "C" fn(env: *mut c_void)>;

// Internal representation of a function (not exposed to C)
#[repr(C)]
struct FuncObject {
    header: ExternHeader,
    store: *const StoreObject,
    params: Box<[wasm_valkind_t]>,
    results: Box<[wasm_valkind_t]>,
    callback: wasmtime_func_callback_with_env_t,
    env: *mut c_void,
    finalizer: wasm_finalizer_t,
}

// Internal representation of a caller (not exposed to C)
struct CallerObject {
    depth: u32,
}

impl FuncObject {
    unsafe fn from_raw<'a>(func: *const wasm_func_t) -> &'a FuncObject {
        &*(func as *const FuncObject)
    }
}

/// Register a host function
///
/// # Arguments
/// * `store` - Store the function belongs to
/// * `ty` - Function type (copied; the caller keeps ownership)
/// * `callback` - Trampoline invoked on every call
/// * `env` - Opaque environment passed to `callback`
/// * `finalizer` - Run on `env` exactly once when the function is deleted
///
/// # Safety
/// `store` must outlive the function. The function must be freed with
/// `wasm_func_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_func_new_with_env(
    store: *mut wasm_store_t,
    ty: *const wasm_functype_t,
    callback: wasmtime_func_callback_with_env_t,
    env: *mut c_void,
    finalizer: wasm_finalizer_t,
) -> *mut wasm_func_t {
    forbid_in_finalizer("wasmtime_func_new_with_env");
    if store.is_null() || ty.is_null() {
        return ptr::null_mut();
    }
    let ty = FuncTypeObject::from_raw(ty);
    let func = Box::new(FuncObject {
        header: ExternHeader {
            kind: WASM_EXTERN_FUNC,
        },
        store: store as *const StoreObject,
        params: ty.params.clone(),
        results: ty.results.clone(),
        callback,
        env,
        finalizer,
    });
    Box::into_raw(func) as *mut wasm_func_t
}

/// Get a copy of the function's type
///
/// # Safety
/// `func` must be valid. The result must be freed with `wasm_functype_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_type(func: *const wasm_func_t) -> *mut wasm_functype_t {
    let func = FuncObject::from_raw(func);
    FuncTypeObject {
        params: func.params.clone(),
        results: func.results.clone(),
    }
    .into_raw()
}

/// Number of parameters
///
/// # Safety
/// `func` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_param_arity(func: *const wasm_func_t) -> usize {
    FuncObject::from_raw(func).params.len()
}

/// Number of results
///
/// # Safety
/// `func` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_result_arity(func: *const wasm_func_t) -> usize {
    FuncObject::from_raw(func).results.len()
}

/// Call a function
///
/// Arguments are borrowed by the callee. On success the result slots are
/// owned by the caller.
///
/// # Returns
/// * NULL on success
/// * A trap owned by the caller otherwise (interrupt, call depth exhausted,
///   arity or kind mismatch, or a trap reported by the host callback)
///
/// # Safety
/// `func` must be valid; `args`/`results` must be valid for `nargs`/`nresults`.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_call(
    func: *const wasm_func_t,
    args: *const wasm_val_t,
    nargs: usize,
    results: *mut wasm_val_t,
    nresults: usize,
) -> *mut wasm_trap_t {
    let func = FuncObject::from_raw(func);
    let store = &*func.store;

    if store.interrupt.swap(false, Ordering::AcqRel) {
        return new_coded_trap(WASMTIME_TRAP_CODE_INTERRUPT);
    }

    let args = slice_or_empty(args, nargs);
    if args.len() != func.params.len() || nresults != func.results.len() {
        return new_message_trap(format!(
            "wasm trap: expected {} arguments and {} results, got {} and {}",
            func.params.len(),
            func.results.len(),
            args.len(),
            nresults
        ));
    }
    if let Some(i) = args.iter().zip(func.params.iter()).position(|(a, k)| a.kind != *k) {
        return new_message_trap(format!("wasm trap: argument {} has the wrong kind", i));
    }

    let depth = store.depth.fetch_add(1, Ordering::AcqRel);
    if depth >= store.config.max_call_depth {
        store.depth.fetch_sub(1, Ordering::AcqRel);
        return new_coded_trap(WASMTIME_TRAP_CODE_STACK_OVERFLOW);
    }

    let mut caller = CallerObject { depth: depth + 1 };
    let results = slice_or_empty_mut(results, nresults);
    let trap = (func.callback)(
        func.env,
        &mut caller as *mut CallerObject as *mut wasmtime_caller_t,
        args.as_ptr(),
        args.len(),
        results.as_mut_ptr(),
        results.len(),
    );

    store.depth.fetch_sub(1, Ordering::AcqRel);
    trap
}

/// Current nesting depth of host calls on the caller's store (1 for a top-level call)
///
/// # Safety
/// `caller` must be the pointer passed to the running callback.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_caller_depth(caller: *const wasmtime_caller_t) -> u32 {
    (*(caller as *const CallerObject)).depth
}

/// View the function as an extern (borrowed, same address)
///
/// # Safety
/// `func` must be valid. The extern must not be deleted separately.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_as_extern(func: *mut wasm_func_t) -> *mut wasm_extern_t {
    func as *mut wasm_extern_t
}

/// Free a function and run its finalizer
///
/// While the finalizer runs, allocation and free functions of this engine
/// must not be called on the current thread.
///
/// # Safety
/// `func` must have been returned by `wasmtime_func_new_with_env()` and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn wasm_func_delete(func: *mut wasm_func_t) {
    forbid_in_finalizer("wasm_func_delete");
    if func.is_null() {
        return;
    }
    let func = Box::from_raw(func as *mut FuncObject);
    if let Some(finalizer) = func.finalizer {
        let _scope = FinalizerScope::enter();
        finalizer(func.env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{wasm_config_t, wasm_engine_delete, wasm_engine_new_with_config, wasm_store_delete, wasm_store_new};
    use crate::trap::{wasm_trap_delete, wasmtime_trap_code};
    use crate::types::{wasm_functype_delete, wasm_functype_new};
    use crate::val::{wasm_val_union, WASM_I32};
    use std::sync::atomic::AtomicUsize;

    static FINALIZED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn add_one(
        _env: *mut c_void,
        _caller: *mut wasmtime_caller_t,
        args: *const wasm_val_t,
        _nargs: usize,
        results: *mut wasm_val_t,
        _nresults: usize,
    ) -> *mut wasm_trap_t {
        let x = (*args).of.i32;
        *results = wasm_val_t {
            kind: WASM_I32,
            of: wasm_val_union { i32: x + 1 },
        };
        ptr::null_mut()
    }

    unsafe extern "C" fn count_finalize(_env: *mut c_void) {
        FINALIZED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_call_and_finalize() {
        let kinds = [WASM_I32];
        unsafe {
            let engine = wasm_engine_new_with_config(&wasm_config_t {
                max_memory_pages: 1,
                max_call_depth: 4,
            });
            let store = wasm_store_new(engine);
            let ty = wasm_functype_new(kinds.as_ptr(), 1, kinds.as_ptr(), 1);
            let func = wasmtime_func_new_with_env(store, ty, add_one, ptr::null_mut(), Some(count_finalize));
            wasm_functype_delete(ty);

            assert_eq!(wasm_func_param_arity(func), 1);
            assert_eq!(wasm_func_result_arity(func), 1);

            let args = [wasm_val_t {
                kind: WASM_I32,
                of: wasm_val_union { i32: 41 },
            }];
            let mut results = [wasm_val_t::zeroed()];
            let trap = wasm_func_call(func, args.as_ptr(), 1, results.as_mut_ptr(), 1);
            assert!(trap.is_null());
            assert_eq!(results[0].of.i32, 42);

            let before = FINALIZED.load(Ordering::SeqCst);
            wasm_func_delete(func);
            assert_eq!(FINALIZED.load(Ordering::SeqCst), before + 1);

            wasm_store_delete(store);
            wasm_engine_delete(engine);
        }
    }

    #[test]
    fn test_arity_mismatch_traps() {
        let kinds = [WASM_I32];
        unsafe {
            let engine = wasm_engine_new_with_config(&wasm_config_t {
                max_memory_pages: 1,
                max_call_depth: 4,
            });
            let store = wasm_store_new(engine);
            let ty = wasm_functype_new(kinds.as_ptr(), 1, kinds.as_ptr(), 1);
            let func = wasmtime_func_new_with_env(store, ty, add_one, ptr::null_mut(), None);
            wasm_functype_delete(ty);

            let mut results = [wasm_val_t::zeroed()];
            let trap = wasm_func_call(func, ptr::null(), 0, results.as_mut_ptr(), 1);
            assert!(!trap.is_null());
            let mut code = 0;
            assert!(!wasmtime_trap_code(trap, &mut code));
            wasm_trap_delete(trap);

            wasm_func_delete(func);
            wasm_store_delete(store);
            wasm_engine_delete(engine);
        }
    }
}
