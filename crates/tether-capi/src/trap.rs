//! Traps: the engine's error channel

use crate::slice_or_empty;
use std::ptr;

/// Opaque handle to a trap
#[repr(C)]
pub struct wasm_trap_t {
    _private: [u8; 0],
}

/// Trap code for engine-detected conditions
pub type wasmtime_trap_code_t = u8;

/// The engine's call depth limit was reached
pub const WASMTIME_TRAP_CODE_STACK_OVERFLOW: wasmtime_trap_code_t = 0;
/// Execution was interrupted through an interrupt handle
pub const WASMTIME_TRAP_CODE_INTERRUPT: wasmtime_trap_code_t = 1;

// Internal representation of a trap (not exposed to C)
struct TrapObject {
    message: String,
    code: Option<wasmtime_trap_code_t>,
}

/// Create a trap carrying an engine trap code
pub(crate) fn new_coded_trap(code: wasmtime_trap_code_t) -> *mut wasm_trap_t {
    let message = match code {
        WASMTIME_TRAP_CODE_STACK_OVERFLOW => "wasm trap: call stack exhausted",
        _ => "wasm trap: interrupt",
    };
    into_raw(TrapObject {
        message: message.to_string(),
        code: Some(code),
    })
}

/// Create a trap from an engine-side message
pub(crate) fn new_message_trap(message: impl Into<String>) -> *mut wasm_trap_t {
    into_raw(TrapObject {
        message: message.into(),
        code: None,
    })
}

fn into_raw(trap: TrapObject) -> *mut wasm_trap_t {
    Box::into_raw(Box::new(trap)) as *mut wasm_trap_t
}

/// Create a trap with a message
///
/// # Arguments
/// * `store` - Store the trap belongs to (may be NULL)
/// * `message` - UTF-8 bytes of the message, need not be NUL-terminated
/// * `len` - Length of `message` in bytes
///
/// # Safety
/// `message` must be valid for `len` reads. The trap must be freed with
/// `wasm_trap_delete()` unless it is returned from a host callback, in which
/// case the engine takes ownership.
#[no_mangle]
pub unsafe extern "C" fn wasm_trap_new(
    _store: *mut crate::store::wasm_store_t,
    message: *const u8,
    len: usize,
) -> *mut wasm_trap_t {
    let bytes = slice_or_empty(message, len);
    new_message_trap(String::from_utf8_lossy(bytes).into_owned())
}

/// Get the message of a trap
///
/// # Safety
/// `trap` must be valid and `out_len` writable. The bytes live as long as the trap.
#[no_mangle]
pub unsafe extern "C" fn wasm_trap_message(trap: *const wasm_trap_t, out_len: *mut usize) -> *const u8 {
    if trap.is_null() {
        *out_len = 0;
        return ptr::null();
    }
    let trap = &*(trap as *const TrapObject);
    *out_len = trap.message.len();
    trap.message.as_ptr()
}

/// Get the trap code, if the engine produced this trap
///
/// # Returns
/// * true and writes `code` if the trap has a code
/// * false for traps created through `wasm_trap_new()`
///
/// # Safety
/// `trap` must be valid and `code` writable.
#[no_mangle]
pub unsafe extern "C" fn wasmtime_trap_code(trap: *const wasm_trap_t, code: *mut wasmtime_trap_code_t) -> bool {
    let trap = &*(trap as *const TrapObject);
    match trap.code {
        Some(c) => {
            *code = c;
            true
        }
        None => false,
    }
}

/// Free a trap
///
/// # Safety
/// `trap` must be owned by the caller and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn wasm_trap_delete(trap: *mut wasm_trap_t) {
    if trap.is_null() {
        return;
    }
    drop(Box::from_raw(trap as *mut TrapObject));
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn message_of(trap: *const wasm_trap_t) -> String {
        let mut len = 0;
        let ptr = wasm_trap_message(trap, &mut len);
        String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned()
    }

    #[test]
    fn test_message_trap_has_no_code() {
        let msg = "boom";
        unsafe {
            let trap = wasm_trap_new(ptr::null_mut(), msg.as_ptr(), msg.len());
            assert_eq!(message_of(trap), "boom");
            let mut code = 0xff;
            assert!(!wasmtime_trap_code(trap, &mut code));
            wasm_trap_delete(trap);
        }
    }

    #[test]
    fn test_coded_trap() {
        unsafe {
            let trap = new_coded_trap(WASMTIME_TRAP_CODE_INTERRUPT);
            let mut code = 0xff;
            assert!(wasmtime_trap_code(trap, &mut code));
            assert_eq!(code, WASMTIME_TRAP_CODE_INTERRUPT);
            assert_eq!(message_of(trap), "wasm trap: interrupt");
            wasm_trap_delete(trap);
        }
    }
}
