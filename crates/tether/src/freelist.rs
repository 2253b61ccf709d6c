//! Deferred reclamation of native engine objects
//!
//! Dropping the last owning handle of a native object never calls into the
//! engine. The pointer is queued here and released at the next safe point:
//!
//! ```text
//! Drop for Handle<T>  ──defer──▶  Pending { memories, funcs, externs, interrupts }
//!                                        │
//! Memory::new / Func::new / Func::call ──flush──▶ wasm_*_delete (lock released)
//! ```
//!
//! A function's closure is detached from its environment as soon as the
//! last owning handle is dropped, so handles captured by the closure are
//! queued too and cannot keep the store alive from inside the queue.
//!
//! Deleting a function runs its finalizer inside the engine, where further
//! engine calls are forbidden. The finalizer therefore only hands its
//! environment to [`retire`]; the environment is dropped by the flushing
//! thread once the engine has returned.

use crate::func::FuncEnv;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::Arc;
use tether_capi as sys;

/// A native object kind the registry knows how to release.
///
/// # Safety
/// `delete` must be the engine's free function for `Self`, and `queue`
/// must return the same queue for every call.
pub(crate) unsafe trait Native: 'static {
    /// Name used in log output
    const KIND: &'static str;

    /// Host-side state carried by every handle to an object of this kind
    type State: Send + Sync + 'static;

    /// The pending queue for this kind
    fn queue(pending: &mut Pending) -> &mut Vec<NonNull<Self>>;

    /// Release one object.
    ///
    /// # Safety
    /// `ptr` must be an owned, live object of this kind.
    unsafe fn delete(ptr: NonNull<Self>);

    /// Called when the last owning handle is dropped, before its pointer is
    /// queued. Must not call into the engine.
    fn detach(_state: &Self::State) {}
}

unsafe impl Native for sys::wasm_memory_t {
    const KIND: &'static str = "memory";
    // Serializes host access with growth
    type State = Arc<RwLock<()>>;

    fn queue(pending: &mut Pending) -> &mut Vec<NonNull<Self>> {
        &mut pending.memories
    }

    unsafe fn delete(ptr: NonNull<Self>) {
        sys::wasm_memory_delete(ptr.as_ptr())
    }
}

unsafe impl Native for sys::wasm_func_t {
    const KIND: &'static str = "func";
    // Set on the owning handle only
    type State = Option<Arc<FuncEnv>>;

    fn queue(pending: &mut Pending) -> &mut Vec<NonNull<Self>> {
        &mut pending.funcs
    }

    unsafe fn delete(ptr: NonNull<Self>) {
        sys::wasm_func_delete(ptr.as_ptr())
    }

    fn detach(state: &Self::State) {
        if let Some(env) = state {
            env.detach();
        }
    }
}

unsafe impl Native for sys::wasm_extern_t {
    const KIND: &'static str = "extern";
    type State = ();

    fn queue(pending: &mut Pending) -> &mut Vec<NonNull<Self>> {
        &mut pending.externs
    }

    unsafe fn delete(ptr: NonNull<Self>) {
        sys::wasm_extern_delete(ptr.as_ptr())
    }
}

unsafe impl Native for sys::wasmtime_interrupt_handle_t {
    const KIND: &'static str = "interrupt handle";
    type State = ();

    fn queue(pending: &mut Pending) -> &mut Vec<NonNull<Self>> {
        &mut pending.interrupts
    }

    unsafe fn delete(ptr: NonNull<Self>) {
        sys::wasmtime_interrupt_handle_delete(ptr.as_ptr())
    }
}

/// Native pointers waiting to be released, one queue per kind
#[derive(Default)]
pub(crate) struct Pending {
    memories: Vec<NonNull<sys::wasm_memory_t>>,
    funcs: Vec<NonNull<sys::wasm_func_t>>,
    externs: Vec<NonNull<sys::wasm_extern_t>>,
    interrupts: Vec<NonNull<sys::wasmtime_interrupt_handle_t>>,
}

// The queued pointers are owned by the registry and only dereferenced by
// the engine's free functions.
unsafe impl Send for Pending {}

impl Pending {
    fn len(&self) -> usize {
        self.memories.len() + self.funcs.len() + self.externs.len() + self.interrupts.len()
    }

    /// Release every queued pointer. Must be called without the lock held.
    unsafe fn release(self) {
        release_all(self.memories);
        release_all(self.externs);
        release_all(self.interrupts);
        release_all(self.funcs);
    }
}

unsafe fn release_all<T: Native>(queue: Vec<NonNull<T>>) {
    for ptr in queue {
        log::trace!("releasing {} {:p}", T::KIND, ptr);
        T::delete(ptr);
    }
}

/// The per-store registry of pending native frees
#[derive(Default)]
pub(crate) struct FreeList {
    pending: Mutex<Pending>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an owned pointer for release. Never calls into the engine.
    pub(crate) fn defer<T: Native>(&self, ptr: NonNull<T>) {
        let mut pending = self.pending.lock();
        let queue = T::queue(&mut pending);
        debug_assert!(
            !queue.contains(&ptr),
            "{} {:p} queued for release twice",
            T::KIND,
            ptr
        );
        queue.push(ptr);
        log::trace!("deferred {} {:p}", T::KIND, ptr);
    }

    /// Number of pointers waiting to be released
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Release everything queued, including whatever the releases queue in
    /// turn. Returns the number of native objects released.
    pub(crate) fn flush(&self) -> usize {
        let mut released = 0;
        loop {
            let batch = std::mem::take(&mut *self.pending.lock());
            let count = batch.len();
            unsafe { batch.release() };
            let dropped = drop_retired();
            released += count;
            if count == 0 && !dropped {
                break;
            }
        }
        if released > 0 {
            log::debug!("released {} native objects", released);
        }
        released
    }
}

// ============================================================================
// Retired finalizer environments
// ============================================================================

thread_local! {
    static RETIRED: RefCell<Vec<Box<dyn Any + Send>>> = const { RefCell::new(Vec::new()) };
}

/// Park a value released by an engine finalizer until the engine returns.
///
/// Called from inside the engine, so it must not call back into it.
pub(crate) fn retire(value: Box<dyn Any + Send>) {
    RETIRED.with(|r| r.borrow_mut().push(value));
}

/// Drop everything retired on this thread. Returns whether anything was dropped.
fn drop_retired() -> bool {
    let mut dropped = false;
    loop {
        let retired = RETIRED.with(|r| std::mem::take(&mut *r.borrow_mut()));
        if retired.is_empty() {
            return dropped;
        }
        dropped = true;
        drop(retired);
    }
}
