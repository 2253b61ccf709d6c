//! Extern views over functions and memories
//!
//! Every extern-capable object starts with an [`ExternHeader`], so a
//! `wasm_extern_t*` is the same address as the object it views.

use crate::func::{wasm_func_delete, wasm_func_t};
use crate::memory::{wasm_memory_delete, wasm_memory_t};
use std::ptr;

/// Opaque handle to an extern
#[repr(C)]
pub struct wasm_extern_t {
    _private: [u8; 0],
}

/// Extern kind tag
pub type wasm_externkind_t = u8;

/// The extern is a function
pub const WASM_EXTERN_FUNC: wasm_externkind_t = 0;
/// The extern is a memory
pub const WASM_EXTERN_MEMORY: wasm_externkind_t = 3;

/// Common prefix of every extern-capable object
#[repr(C)]
pub(crate) struct ExternHeader {
    pub(crate) kind: wasm_externkind_t,
}

unsafe fn header<'a>(ext: *const wasm_extern_t) -> &'a ExternHeader {
    &*(ext as *const ExternHeader)
}

/// Get the kind of an extern
///
/// # Safety
/// `ext` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_extern_kind(ext: *const wasm_extern_t) -> wasm_externkind_t {
    header(ext).kind
}

/// View an extern as a memory
///
/// # Returns
/// * The memory (borrowed, same lifetime as `ext`)
/// * NULL if the extern is not a memory
///
/// # Safety
/// `ext` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_extern_as_memory(ext: *mut wasm_extern_t) -> *mut wasm_memory_t {
    if header(ext).kind == WASM_EXTERN_MEMORY {
        ext as *mut wasm_memory_t
    } else {
        ptr::null_mut()
    }
}

/// View an extern as a function
///
/// # Returns
/// * The function (borrowed, same lifetime as `ext`)
/// * NULL if the extern is not a function
///
/// # Safety
/// `ext` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_extern_as_func(ext: *mut wasm_extern_t) -> *mut wasm_func_t {
    if header(ext).kind == WASM_EXTERN_FUNC {
        ext as *mut wasm_func_t
    } else {
        ptr::null_mut()
    }
}

/// Free an owned extern and the object it wraps
///
/// # Safety
/// `ext` must be owned by the caller. Views obtained from
/// `wasm_memory_as_extern()`/`wasm_func_as_extern()` are borrowed and must
/// not be passed here.
#[no_mangle]
pub unsafe extern "C" fn wasm_extern_delete(ext: *mut wasm_extern_t) {
    if ext.is_null() {
        return;
    }
    match header(ext).kind {
        WASM_EXTERN_MEMORY => wasm_memory_delete(ext as *mut wasm_memory_t),
        WASM_EXTERN_FUNC => wasm_func_delete(ext as *mut wasm_func_t),
        other => log::error!("wasm_extern_delete: unknown extern kind {}", other),
    }
}
