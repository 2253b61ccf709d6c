//! Panic capture across native frames
//!
//! A panic must never unwind through the engine. Each host call into the
//! engine pushes a [`CallFrame`]; a trampoline that catches a panic parks
//! the payload in the innermost frame and returns a sentinel trap so the
//! engine unwinds normally. The call that owns the frame then discards the
//! sentinel and resumes the panic with its original payload.
//!
//! ```text
//! Func::call ─push frame─▶ engine ─▶ trampoline ─catch_unwind─▶ closure panics
//!     ▲                                   │
//!     └── resume_unwind(payload) ◀─ sentinel trap ◀─ capture(payload)
//! ```
//!
//! Frames form a per-thread stack so reentrant calls each own their slot.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use tether_capi as sys;

/// Panic payload
pub(crate) type Payload = Box<dyn Any + Send + 'static>;

/// Message of the trap used only to unwind the engine after a captured panic
pub(crate) const SENTINEL_MESSAGE: &str = "host function panicked";

thread_local! {
    static FRAMES: RefCell<Vec<Option<Payload>>> = const { RefCell::new(Vec::new()) };
}

/// One host-to-engine call on the current thread
pub(crate) struct CallFrame {
    index: usize,
    // Frames belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl CallFrame {
    pub(crate) fn enter() -> CallFrame {
        let index = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(None);
            frames.len() - 1
        });
        CallFrame {
            index,
            _not_send: PhantomData,
        }
    }

    /// Take the panic captured during this call, if any
    pub(crate) fn take_fault(&self) -> Option<Payload> {
        FRAMES.with(|frames| frames.borrow_mut()[self.index].take())
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.len(), self.index + 1, "call frames popped out of order");
            frames.truncate(self.index);
        })
    }
}

/// A payload [`capture`] could not park
#[derive(Debug)]
pub(crate) enum Refused {
    /// No host call on this thread; the engine called in on its own
    NoFrame(Payload),
    /// The innermost frame already holds an earlier panic
    Occupied(Payload),
}

impl Refused {
    pub(crate) fn payload(&self) -> &Payload {
        match self {
            Refused::NoFrame(payload) | Refused::Occupied(payload) => payload,
        }
    }

    /// Why the payload was refused, for log output
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Refused::NoFrame(_) => "outside a host call",
            Refused::Occupied(_) => "while an earlier panic was pending",
        }
    }
}

/// Park a caught panic in the innermost frame.
pub(crate) fn capture(payload: Payload) -> Result<(), Refused> {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(slot) if slot.is_none() => {
                *slot = Some(payload);
                Ok(())
            }
            Some(_) => Err(Refused::Occupied(payload)),
            None => Err(Refused::NoFrame(payload)),
        }
    })
}

/// Trap returned to the engine after a capture; never seen by host code
pub(crate) fn sentinel_trap(store: *mut sys::wasm_store_t) -> *mut sys::wasm_trap_t {
    unsafe { sys::wasm_trap_new(store, SENTINEL_MESSAGE.as_ptr(), SENTINEL_MESSAGE.len()) }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &Payload) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
