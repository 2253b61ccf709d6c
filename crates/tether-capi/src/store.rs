//! Engines, stores and interrupt handles

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to an engine
#[repr(C)]
pub struct wasm_engine_t {
    _private: [u8; 0],
}

/// Opaque handle to a store
#[repr(C)]
pub struct wasm_store_t {
    _private: [u8; 0],
}

/// Opaque handle to an interrupt handle
#[repr(C)]
pub struct wasmtime_interrupt_handle_t {
    _private: [u8; 0],
}

/// Engine configuration
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct wasm_config_t {
    /// Hard cap on the number of pages any memory may reach
    pub max_memory_pages: u32,
    /// Maximum nesting of `wasm_func_call` on one store
    pub max_call_depth: u32,
}

// Internal representation of an engine (not exposed to C)
struct EngineObject {
    config: wasm_config_t,
}

// Internal representation of a store (not exposed to C)
pub(crate) struct StoreObject {
    pub(crate) config: wasm_config_t,
    pub(crate) interrupt: Arc<AtomicBool>,
    pub(crate) depth: AtomicU32,
}

// Internal representation of an interrupt handle (not exposed to C)
struct InterruptObject {
    flag: Arc<AtomicBool>,
}

impl StoreObject {
    pub(crate) unsafe fn from_raw<'a>(store: *const wasm_store_t) -> &'a StoreObject {
        &*(store as *const StoreObject)
    }
}

// ============================================================================
// Finalizer Guard
// ============================================================================

thread_local! {
    static FINALIZING: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as running a function finalizer.
pub(crate) struct FinalizerScope(());

impl FinalizerScope {
    pub(crate) fn enter() -> Self {
        FINALIZING.with(|f| f.set(f.get() + 1));
        FinalizerScope(())
    }
}

impl Drop for FinalizerScope {
    fn drop(&mut self) {
        FINALIZING.with(|f| f.set(f.get() - 1));
    }
}

/// Abort if an allocation or free is attempted from inside a finalizer.
///
/// The engine's internal state is not reentrant while a finalizer runs.
pub(crate) fn forbid_in_finalizer(op: &str) {
    if FINALIZING.with(|f| f.get()) > 0 {
        log::error!("{} called while a function finalizer is running", op);
        std::process::abort();
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Create a new engine
///
/// # Safety
/// `config` must be NULL or point to a valid `wasm_config_t`.
/// The returned engine must be freed with `wasm_engine_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_engine_new_with_config(config: *const wasm_config_t) -> *mut wasm_engine_t {
    if config.is_null() {
        return ptr::null_mut();
    }
    let engine = Box::new(EngineObject { config: *config });
    Box::into_raw(engine) as *mut wasm_engine_t
}

/// Destroy an engine. Stores created from it stay valid.
///
/// # Safety
/// `engine` must have been returned by `wasm_engine_new_with_config()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_engine_delete(engine: *mut wasm_engine_t) {
    if engine.is_null() {
        return;
    }
    drop(Box::from_raw(engine as *mut EngineObject));
}

// ============================================================================
// Store Lifecycle
// ============================================================================

/// Create a new store in `engine`
///
/// # Safety
/// `engine` must be valid. The store must be freed with `wasm_store_delete()`
/// after every function created in it has been deleted.
#[no_mangle]
pub unsafe extern "C" fn wasm_store_new(engine: *mut wasm_engine_t) -> *mut wasm_store_t {
    if engine.is_null() {
        return ptr::null_mut();
    }
    let engine = &*(engine as *const EngineObject);
    let store = Box::new(StoreObject {
        config: engine.config,
        interrupt: Arc::new(AtomicBool::new(false)),
        depth: AtomicU32::new(0),
    });
    Box::into_raw(store) as *mut wasm_store_t
}

/// Destroy a store
///
/// # Safety
/// `store` must have been returned by `wasm_store_new()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_store_delete(store: *mut wasm_store_t) {
    forbid_in_finalizer("wasm_store_delete");
    if store.is_null() {
        return;
    }
    drop(Box::from_raw(store as *mut StoreObject));
}

// ============================================================================
// Interrupt Handles
// ============================================================================

/// Create an interrupt handle for `store`
///
/// The handle may outlive the store and may be used from any thread.
///
/// # Safety
/// `store` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_interrupt_handle_new(
    store: *mut wasm_store_t,
) -> *mut wasmtime_interrupt_handle_t {
    forbid_in_finalizer("wasmtime_interrupt_handle_new");
    if store.is_null() {
        return ptr::null_mut();
    }
    let store = StoreObject::from_raw(store);
    let handle = Box::new(InterruptObject {
        flag: Arc::clone(&store.interrupt),
    });
    Box::into_raw(handle) as *mut wasmtime_interrupt_handle_t
}

/// Request that the next call into the store traps with an interrupt
///
/// # Safety
/// `handle` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_interrupt_handle_interrupt(handle: *mut wasmtime_interrupt_handle_t) {
    let handle = &*(handle as *const InterruptObject);
    handle.flag.store(true, Ordering::Release);
}

/// Free an interrupt handle
///
/// # Safety
/// `handle` must have been returned by `wasmtime_interrupt_handle_new()`.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_interrupt_handle_delete(handle: *mut wasmtime_interrupt_handle_t) {
    forbid_in_finalizer("wasmtime_interrupt_handle_delete");
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle as *mut InterruptObject));
}
