//! Error types: traps and API errors

use crate::types::{FuncType, MemoryType};
use std::fmt;
use tether_capi as sys;

/// Engine-detected trap conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapCode {
    /// The configured call depth was exceeded
    StackOverflow,
    /// Execution was interrupted through an [`InterruptHandle`](crate::InterruptHandle)
    Interrupt,
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapCode::StackOverflow => write!(f, "call stack exhausted"),
            TrapCode::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// A recoverable, VM-visible error.
///
/// Traps are ordinary values: host functions return them to fail a call,
/// and [`Func::call`](crate::Func::call) returns them when a call fails.
/// They never unwind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Trap {
    message: String,
    code: Option<TrapCode>,
}

impl Trap {
    /// Create a trap with a message
    pub fn new(message: impl Into<String>) -> Self {
        Trap {
            message: message.into(),
            code: None,
        }
    }

    /// The trap's message, exactly as it was created
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The engine trap code, for traps raised by the engine itself
    pub fn code(&self) -> Option<TrapCode> {
        self.code
    }

    /// Take ownership of a native trap, copying it out and freeing it.
    ///
    /// # Safety
    /// `trap` must be a non-null trap owned by the caller.
    pub(crate) unsafe fn from_native(trap: *mut sys::wasm_trap_t) -> Trap {
        let mut len = 0;
        let ptr = sys::wasm_trap_message(trap, &mut len);
        let message = if ptr.is_null() {
            String::new()
        } else {
            String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned()
        };

        let mut raw_code = 0;
        let code = if sys::wasmtime_trap_code(trap, &mut raw_code) {
            match raw_code {
                sys::WASMTIME_TRAP_CODE_STACK_OVERFLOW => Some(TrapCode::StackOverflow),
                sys::WASMTIME_TRAP_CODE_INTERRUPT => Some(TrapCode::Interrupt),
                _ => None,
            }
        } else {
            None
        };

        sys::wasm_trap_delete(trap);
        Trap { message, code }
    }

    /// Create a native trap carrying this trap's message.
    ///
    /// Ownership of the result passes to whoever receives it (the engine,
    /// when returned from a trampoline).
    pub(crate) fn to_native(&self, store: *mut sys::wasm_store_t) -> *mut sys::wasm_trap_t {
        unsafe { sys::wasm_trap_new(store, self.message.as_ptr(), self.message.len()) }
    }
}

/// Errors returned by the embedding API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A typed view was requested with a signature the function doesn't have
    #[error("signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch {
        /// Signature requested by the caller
        expected: FuncType,
        /// Signature of the function
        found: FuncType,
    },

    /// A memory access fell outside the memory's current data size
    #[error("out of bounds memory access: offset {offset} + length {len} exceeds size {size}")]
    OutOfBounds {
        /// Byte offset of the access
        offset: usize,
        /// Length of the access in bytes
        len: usize,
        /// Data size of the memory at the time of the access
        size: usize,
    },

    /// The engine refused to create a memory of this type
    #[error("engine rejected memory type {0}")]
    InvalidMemoryType(MemoryType),
}
