//! Cross-thread interruption of calls into a store

use crate::handle::Handle;
use crate::store::{native_ptr, Store};
use std::fmt;
use std::sync::Arc;
use tether_capi as sys;

/// Requests that the next call into a store traps with
/// [`TrapCode::Interrupt`](crate::TrapCode::Interrupt).
///
/// Can be cloned and sent to other threads. A request stays pending until
/// a call consumes it.
#[derive(Clone)]
pub struct InterruptHandle {
    handle: Arc<Handle<sys::wasmtime_interrupt_handle_t>>,
}

impl InterruptHandle {
    pub(crate) fn new(store: &Store) -> InterruptHandle {
        store.flush();
        let ptr = unsafe { sys::wasmtime_interrupt_handle_new(store.as_ptr()) };
        let ptr = native_ptr(ptr, "wasmtime_interrupt_handle_new");
        InterruptHandle {
            handle: unsafe { Handle::acquire(ptr, store, ()) },
        }
    }

    /// Request an interrupt
    pub fn interrupt(&self) {
        log::debug!("interrupt requested via {:p}", self.handle.as_ptr());
        unsafe { sys::wasmtime_interrupt_handle_interrupt(self.handle.as_ptr()) }
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InterruptHandle").field(&self.handle).finish()
    }
}
