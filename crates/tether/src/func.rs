//! Host functions and calls into the engine
//!
//! A host closure is registered with the engine together with a single
//! `extern "C"` trampoline. Per call the trampoline:
//!
//! 1. Decodes the borrowed argument buffer following the signature
//! 2. Runs the closure under `catch_unwind`
//! 3. Validates the results against the signature and encodes them
//! 4. Returns null, a trap, or (after a captured panic) a sentinel trap
//!
//! See [`bridge`](crate::bridge) for how captured panics reach the caller.

mod typed;

pub use typed::{IntoFunc, TypedFunc, WasmParams, WasmResults, WasmRet, WasmTy};

use crate::bridge::{self, CallFrame};
use crate::error::{Error, Trap};
use crate::externals::Extern;
use crate::freelist;
use crate::handle::Handle;
use crate::store::{native_ptr, Store, StoreInner};
use crate::types::FuncType;
use crate::val::{release_raw, Val};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Weak};
use tether_capi as sys;

/// Generic host callback
pub(crate) type Callback =
    Arc<dyn Fn(Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + Send + Sync + 'static>;

/// What the engine's `env` pointer refers to.
///
/// Shared between the engine and the function's owning handle. The handle
/// detaches the callback when it is dropped; the engine's reference is
/// released by the finalizer.
pub(crate) struct FuncEnv {
    callback: Mutex<Option<Callback>>,
    ty: FuncType,
    // Weak: a pending function must not keep its store alive.
    store: Weak<StoreInner>,
}

impl FuncEnv {
    /// Drop the callback, and with it every handle it captured.
    pub(crate) fn detach(&self) {
        let callback = self.callback.lock().take();
        drop(callback);
    }
}

/// Context handed to host functions
pub struct Caller<'a> {
    ptr: *mut sys::wasmtime_caller_t,
    store: &'a Store,
}

impl<'a> Caller<'a> {
    /// The store the called function belongs to
    pub fn store(&self) -> &'a Store {
        self.store
    }

    /// Nesting depth of host calls on this store, 1 for a top-level call
    pub fn depth(&self) -> u32 {
        unsafe { sys::wasmtime_caller_depth(self.ptr) }
    }
}

impl fmt::Debug for Caller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller").field("depth", &self.depth()).finish()
    }
}

/// A function callable through the engine
#[derive(Clone)]
pub struct Func {
    handle: Arc<Handle<sys::wasm_func_t>>,
    ty: FuncType,
}

impl Func {
    /// Register a host closure taking and returning raw values.
    ///
    /// The closure must return exactly the values `ty` declares; anything
    /// else panics at the call site that invoked it.
    ///
    /// The closure is dropped as soon as the last owning handle to the
    /// function is, so it may capture the store or its memories. A closure
    /// that captures its own `Func` keeps itself alive.
    pub fn new<F>(store: &Store, ty: FuncType, func: F) -> Func
    where
        F: Fn(Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + Send + Sync + 'static,
    {
        Func::from_callback(store, ty, Arc::new(func))
    }

    /// Register a closure with typed parameters and results.
    ///
    /// The signature is derived from the closure's types. A leading
    /// [`Caller`] parameter and a `Result<_, Trap>` return are allowed and
    /// do not appear in the signature.
    pub fn wrap<Params, Results>(store: &Store, func: impl IntoFunc<Params, Results>) -> Func {
        func.into_func(store)
    }

    pub(crate) fn from_callback(store: &Store, ty: FuncType, callback: Callback) -> Func {
        store.flush();

        let env = Arc::new(FuncEnv {
            callback: Mutex::new(Some(callback)),
            ty: ty.clone(),
            store: store.downgrade(),
        });
        let raw_env = Arc::into_raw(Arc::clone(&env));
        let native_ty = ty.to_native();
        let ptr = unsafe {
            let ptr = sys::wasmtime_func_new_with_env(
                store.as_ptr(),
                native_ty,
                trampoline,
                raw_env as *mut c_void,
                Some(finalize),
            );
            sys::wasm_functype_delete(native_ty);
            ptr
        };
        if ptr.is_null() {
            drop(unsafe { Arc::from_raw(raw_env) });
        }
        let ptr = native_ptr(ptr, "wasmtime_func_new_with_env");

        log::debug!("registered host function {} at {:p}", ty, ptr);
        Func {
            handle: unsafe { Handle::acquire(ptr, store, Some(env)) },
            ty,
        }
    }

    pub(crate) fn from_handle(handle: Arc<Handle<sys::wasm_func_t>>) -> Func {
        let ty = unsafe {
            let native = sys::wasm_func_type(handle.as_ptr());
            let ty = FuncType::from_native(native);
            sys::wasm_functype_delete(native);
            ty
        };
        Func { handle, ty }
    }

    /// The function's signature
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Number of parameters
    pub fn param_arity(&self) -> usize {
        unsafe { sys::wasm_func_param_arity(self.handle.as_ptr()) }
    }

    /// Number of results
    pub fn result_arity(&self) -> usize {
        unsafe { sys::wasm_func_result_arity(self.handle.as_ptr()) }
    }

    /// The store this function belongs to
    pub fn store(&self) -> &Store {
        self.handle.store()
    }

    /// Call the function.
    ///
    /// Returns the results, or the trap the call raised. A panic raised by a
    /// host function during the call resumes here with its original payload.
    ///
    /// # Panics
    /// If `params` does not match the signature ("wrong number of
    /// arguments" / "wrong type of argument").
    pub fn call(&self, params: &[Val]) -> Result<Vec<Val>, Trap> {
        let store = self.handle.store();
        store.flush();

        let expected = self.ty.params();
        if params.len() != expected.len() {
            panic!(
                "wrong number of arguments: expected {}, got {}",
                expected.len(),
                params.len()
            );
        }
        for (i, (param, ty)) in params.iter().zip(expected).enumerate() {
            if param.ty() != *ty {
                panic!(
                    "wrong type of argument {}: expected {}, found {}",
                    i,
                    ty,
                    param.ty()
                );
            }
        }

        let args: Vec<sys::wasm_val_t> = params.iter().cloned().map(Val::into_raw).collect();
        let mut results: Vec<sys::wasm_val_t> = (0..self.ty.results().len())
            .map(|_| sys::wasm_val_t::zeroed())
            .collect();

        let frame = CallFrame::enter();
        let trap = unsafe {
            sys::wasm_func_call(
                self.handle.as_ptr(),
                args.as_ptr(),
                args.len(),
                results.as_mut_ptr(),
                results.len(),
            )
        };
        let fault = frame.take_fault();
        drop(frame);

        for arg in &args {
            unsafe { release_raw(arg) };
        }

        if let Some(payload) = fault {
            if !trap.is_null() {
                unsafe { sys::wasm_trap_delete(trap) };
            }
            panic::resume_unwind(payload);
        }
        if !trap.is_null() {
            return Err(unsafe { Trap::from_native(trap) });
        }

        Ok(results
            .into_iter()
            .zip(self.ty.results())
            .map(|(raw, ty)| unsafe { Val::from_raw_owned(raw, *ty) })
            .collect())
    }

    /// A statically typed view of this function.
    ///
    /// Fails with [`Error::SignatureMismatch`] if `Params`/`Results` do not
    /// describe this function's signature.
    pub fn typed<Params, Results>(&self) -> Result<TypedFunc<Params, Results>, Error>
    where
        Params: WasmParams,
        Results: WasmResults,
    {
        let expected = FuncType::new(Params::valtypes(), Results::valtypes());
        if expected != self.ty {
            return Err(Error::SignatureMismatch {
                expected,
                found: self.ty.clone(),
            });
        }
        Ok(TypedFunc::new_unchecked(self.clone()))
    }

    /// Type-erased view sharing this function's ownership
    pub fn as_extern(&self) -> Extern {
        let ptr = unsafe { sys::wasm_func_as_extern(self.handle.as_ptr()) };
        let ptr = native_ptr(ptr, "wasm_func_as_extern");
        Extern::from_handle(unsafe { Handle::borrow(ptr, self.store(), self.handle.owner(), ()) })
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("ty", &self.ty)
            .field("handle", &self.handle)
            .finish()
    }
}

// ============================================================================
// Trampoline
// ============================================================================

unsafe extern "C" fn trampoline(
    env: *mut c_void,
    caller: *mut sys::wasmtime_caller_t,
    args: *const sys::wasm_val_t,
    nargs: usize,
    results: *mut sys::wasm_val_t,
    nresults: usize,
) -> *mut sys::wasm_trap_t {
    let env = &*(env as *const FuncEnv);
    let store = match Store::upgrade(&env.store) {
        Some(store) => store,
        None => {
            return Trap::new("host function called after its store was dropped")
                .to_native(ptr::null_mut())
        }
    };

    let callback = env.callback.lock().clone();
    let callback = match callback {
        Some(callback) => callback,
        None => {
            return Trap::new("host function called after it was released")
                .to_native(store.as_ptr())
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        invoke(env, &callback, &store, caller, args, nargs, results, nresults)
    }));

    match outcome {
        Ok(Ok(())) => ptr::null_mut(),
        Ok(Err(trap)) => trap.to_native(store.as_ptr()),
        Err(payload) => match bridge::capture(payload) {
            Ok(()) => bridge::sentinel_trap(store.as_ptr()),
            Err(refused) => {
                let message = bridge::panic_message(refused.payload());
                log::error!("host function panicked {}: {}", refused.reason(), message);
                Trap::new(format!("{}: {}", bridge::SENTINEL_MESSAGE, message))
                    .to_native(store.as_ptr())
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn invoke(
    env: &FuncEnv,
    callback: &Callback,
    store: &Store,
    caller: *mut sys::wasmtime_caller_t,
    args: *const sys::wasm_val_t,
    nargs: usize,
    results: *mut sys::wasm_val_t,
    nresults: usize,
) -> Result<(), Trap> {
    let raw_args: &[sys::wasm_val_t] = if nargs == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(args, nargs)
    };
    let params: Vec<Val> = raw_args
        .iter()
        .zip(env.ty.params())
        .map(|(raw, ty)| Val::from_raw_borrowed(raw, *ty))
        .collect();

    let caller = Caller { ptr: caller, store };
    let values = callback(caller, &params)?;

    let declared = env.ty.results();
    if values.len() != declared.len() {
        panic!(
            "callback produced wrong number of results: expected {}, got {}",
            declared.len(),
            values.len()
        );
    }
    if nresults != declared.len() {
        panic!(
            "engine provided {} result slots for {} declared results",
            nresults,
            declared.len()
        );
    }
    for (i, (value, ty)) in values.iter().zip(declared).enumerate() {
        if value.ty() != *ty {
            panic!(
                "callback produced wrong type of result {}: expected {}, found {}",
                i,
                ty,
                value.ty()
            );
        }
    }

    if nresults > 0 {
        let slots = std::slice::from_raw_parts_mut(results, nresults);
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = value.into_raw();
        }
    }
    Ok(())
}

/// Runs inside the engine while it deletes a function. Dropping the
/// environment may drop handles, so it is handed back to the registry.
unsafe extern "C" fn finalize(env: *mut c_void) {
    let env = Arc::from_raw(env as *const FuncEnv);
    freelist::retire(Box::new(env));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Engine;
    use crate::types::ValType;

    fn store() -> Store {
        Store::new(&Engine::default())
    }

    #[test]
    fn test_generic_call() {
        let store = store();
        let ty = FuncType::new([ValType::I32, ValType::I32], [ValType::I32]);
        let add = Func::new(&store, ty, |_, args| {
            Ok(vec![Val::I32(args[0].unwrap_i32() + args[1].unwrap_i32())])
        });
        assert_eq!(add.param_arity(), 2);
        assert_eq!(add.result_arity(), 1);
        assert_eq!(add.call(&[Val::I32(2), Val::I32(3)]), Ok(vec![Val::I32(5)]));
    }

    #[test]
    fn test_trap_is_returned() {
        let store = store();
        let f = Func::new(&store, FuncType::new([], []), |_, _| Err(Trap::new("nope")));
        assert_eq!(f.call(&[]).unwrap_err().message(), "nope");
    }

    #[test]
    #[should_panic(expected = "wrong number of arguments")]
    fn test_wrong_argument_count_panics() {
        let store = store();
        let f = Func::new(&store, FuncType::new([ValType::I32], []), |_, _| Ok(vec![]));
        let _ = f.call(&[]);
    }

    #[test]
    #[should_panic(expected = "wrong type of argument")]
    fn test_wrong_argument_type_panics() {
        let store = store();
        let f = Func::new(&store, FuncType::new([ValType::I32], []), |_, _| Ok(vec![]));
        let _ = f.call(&[Val::I64(1)]);
    }

    #[test]
    fn test_caller_store_is_function_store() {
        let store = store();
        let expected = store.as_ptr() as usize;
        let f = Func::new(&store, FuncType::new([], [ValType::I32]), move |caller, _| {
            Ok(vec![Val::I32((caller.store().as_ptr() as usize == expected) as i32)])
        });
        assert_eq!(f.call(&[]), Ok(vec![Val::I32(1)]));
    }

    #[test]
    fn test_panic_without_host_frame_becomes_trap() {
        let store = store();
        let f = Func::new(&store, FuncType::new([], []), |_, _| panic!("boom"));
        // Enter the engine directly, as an engine-initiated call would.
        let trap = unsafe {
            let trap = sys::wasm_func_call(f.handle.as_ptr(), ptr::null(), 0, ptr::null_mut(), 0);
            assert!(!trap.is_null());
            Trap::from_native(trap)
        };
        assert_eq!(trap.message(), "host function panicked: boom");
    }

    #[test]
    fn test_panic_with_pending_fault_becomes_trap() {
        let store = store();
        let f = Func::new(&store, FuncType::new([], []), |_, _| panic!("second"));
        let frame = CallFrame::enter();
        bridge::capture(Box::new("first")).unwrap();

        let trap = unsafe {
            let trap = sys::wasm_func_call(f.handle.as_ptr(), ptr::null(), 0, ptr::null_mut(), 0);
            Trap::from_native(trap)
        };
        let fault = frame.take_fault().unwrap();
        drop(frame);

        assert_eq!(trap.message(), "host function panicked: second");
        assert_eq!(bridge::panic_message(&fault), "first");
    }

    #[test]
    fn test_result_slot_mismatch_is_reported_separately() {
        let store = store();
        let f = Func::new(&store, FuncType::new([], [ValType::I32]), |_, _| {
            Ok(vec![Val::I32(1)])
        });
        let env = f.handle.state().clone().unwrap();

        let frame = CallFrame::enter();
        let mut slots = [sys::wasm_val_t::zeroed(), sys::wasm_val_t::zeroed()];
        let trap = unsafe {
            trampoline(
                Arc::as_ptr(&env) as *mut c_void,
                ptr::null_mut(),
                ptr::null(),
                0,
                slots.as_mut_ptr(),
                slots.len(),
            )
        };
        let fault = frame.take_fault().unwrap();
        drop(frame);
        unsafe { sys::wasm_trap_delete(trap) };

        assert_eq!(
            bridge::panic_message(&fault),
            "engine provided 2 result slots for 1 declared results"
        );
    }

    #[test]
    fn test_dropping_owner_detaches_callback() {
        let store = store();
        let f = Func::new(&store, FuncType::new([], []), |_, _| Ok(vec![]));
        let env = f.handle.state().clone().unwrap();
        let view = f.as_extern().into_func().unwrap();

        drop(f);
        assert!(env.callback.lock().is_some());
        drop(view);
        assert!(env.callback.lock().is_none());
        store.flush();
    }

    #[test]
    fn test_signature_roundtrips_through_extern_view() {
        let store = store();
        let ty = FuncType::new([ValType::F64], [ValType::ExternRef]);
        let f = Func::new(&store, ty.clone(), |_, _| Ok(vec![Val::ExternRef(None)]));
        let back = f.as_extern().into_func().unwrap();
        assert_eq!(back.ty(), &ty);
    }
}
