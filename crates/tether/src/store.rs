//! Engine and Store
//!
//! A [`Store`] owns the native store and the registry of pending native
//! frees. Every handle keeps its store alive, so the native store is
//! deleted only after every handle is gone and the registry is drained.

use crate::config::Config;
use crate::freelist::FreeList;
use crate::interrupt::InterruptHandle;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};
use tether_capi as sys;

/// Check a pointer returned by an engine constructor that cannot fail for
/// valid inputs.
pub(crate) fn native_ptr<T>(ptr: *mut T, what: &str) -> NonNull<T> {
    match NonNull::new(ptr) {
        Some(ptr) => ptr,
        None => panic!("native engine returned null from {}", what),
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    ptr: NonNull<sys::wasm_engine_t>,
    config: Config,
}

// The native engine is immutable after creation.
unsafe impl Send for EngineInner {}
unsafe impl Sync for EngineInner {}

impl Drop for EngineInner {
    fn drop(&mut self) {
        unsafe { sys::wasm_engine_delete(self.ptr.as_ptr()) }
    }
}

/// Shared engine configuration; cheap to clone
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with default configuration
    pub fn new() -> Engine {
        Engine::with_config(Config::default())
    }

    /// Create an engine with the given configuration
    pub fn with_config(config: Config) -> Engine {
        let native = config.to_native();
        let ptr = unsafe { sys::wasm_engine_new_with_config(&native) };
        log::debug!(
            "created engine (max_memory_pages={}, max_call_depth={})",
            config.max_memory_pages,
            config.max_call_depth
        );
        Engine {
            inner: Arc::new(EngineInner {
                ptr: native_ptr(ptr, "wasm_engine_new_with_config"),
                config,
            }),
        }
    }

    /// The configuration this engine was created with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .finish()
    }
}

// ============================================================================
// Store
// ============================================================================

pub(crate) struct StoreInner {
    ptr: NonNull<sys::wasm_store_t>,
    freelist: FreeList,
    engine: Engine,
}

// The native store is only mutated by engine calls; the registry is locked.
unsafe impl Send for StoreInner {}
unsafe impl Sync for StoreInner {}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.freelist.flush();
        unsafe { sys::wasm_store_delete(self.ptr.as_ptr()) }
        log::debug!("deleted store {:p}", self.ptr);
    }
}

/// A collection of native objects sharing one registry; cheap to clone
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store in `engine`
    pub fn new(engine: &Engine) -> Store {
        let ptr = unsafe { sys::wasm_store_new(engine.inner.ptr.as_ptr()) };
        Store {
            inner: Arc::new(StoreInner {
                ptr: native_ptr(ptr, "wasm_store_new"),
                freelist: FreeList::new(),
                engine: engine.clone(),
            }),
        }
    }

    /// The engine this store belongs to
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Release every native object whose last owning handle was dropped.
    ///
    /// This runs automatically before the store allocates and before every
    /// call into the engine. Returns the number of objects released.
    pub fn flush(&self) -> usize {
        self.inner.freelist.flush()
    }

    /// Number of native objects waiting to be released
    pub fn pending(&self) -> usize {
        self.inner.freelist.len()
    }

    /// Create a handle that can interrupt calls into this store from any thread
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(self)
    }

    /// Whether both values refer to the same store
    pub fn same(a: &Store, b: &Store) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn as_ptr(&self) -> *mut sys::wasm_store_t {
        self.inner.ptr.as_ptr()
    }

    pub(crate) fn freelist(&self) -> &FreeList {
        &self.inner.freelist
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<StoreInner>) -> Option<Store> {
        weak.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("ptr", &self.inner.ptr)
            .field("pending", &self.pending())
            .finish()
    }
}
