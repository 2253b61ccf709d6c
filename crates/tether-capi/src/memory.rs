//! Linear memories

use crate::externs::{wasm_extern_t, ExternHeader, WASM_EXTERN_MEMORY};
use crate::store::{forbid_in_finalizer, wasm_store_t, StoreObject};
use crate::types::{wasm_limits_t, wasm_memorytype_t, MemoryTypeObject};
use std::ptr;

/// Size of one memory page in bytes
pub const WASM_PAGE_SIZE: usize = 0x10000;

/// Opaque handle to a memory
#[repr(C)]
pub struct wasm_memory_t {
    _private: [u8; 0],
}

// Internal representation of a memory (not exposed to C)
#[repr(C)]
struct MemoryObject {
    header: ExternHeader,
    data: Vec<u8>,
    limits: wasm_limits_t,
    cap_pages: u32,
}

impl MemoryObject {
    unsafe fn from_raw<'a>(mem: *const wasm_memory_t) -> &'a MemoryObject {
        &*(mem as *const MemoryObject)
    }

    unsafe fn from_raw_mut<'a>(mem: *mut wasm_memory_t) -> &'a mut MemoryObject {
        &mut *(mem as *mut MemoryObject)
    }

    fn pages(&self) -> u32 {
        (self.data.len() / WASM_PAGE_SIZE) as u32
    }

    /// Effective upper bound in pages: the type's maximum clamped by the engine cap.
    fn max_pages(&self) -> u32 {
        self.limits.max.min(self.cap_pages)
    }
}

/// Create a new memory with `ty`'s minimum size, zero-filled
///
/// # Returns
/// * NULL if the minimum exceeds the engine's page cap
///
/// # Safety
/// `store` and `ty` must be valid. The memory must be freed with
/// `wasm_memory_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_new(
    store: *mut wasm_store_t,
    ty: *const wasm_memorytype_t,
) -> *mut wasm_memory_t {
    forbid_in_finalizer("wasm_memory_new");
    if store.is_null() || ty.is_null() {
        return ptr::null_mut();
    }
    let store = StoreObject::from_raw(store);
    let limits = MemoryTypeObject::from_raw(ty).limits;
    if limits.min > store.config.max_memory_pages {
        return ptr::null_mut();
    }
    let memory = Box::new(MemoryObject {
        header: ExternHeader {
            kind: WASM_EXTERN_MEMORY,
        },
        data: vec![0; limits.min as usize * WASM_PAGE_SIZE],
        limits,
        cap_pages: store.config.max_memory_pages,
    });
    Box::into_raw(memory) as *mut wasm_memory_t
}

/// Get a copy of the memory's type
///
/// # Safety
/// `mem` must be valid. The result must be freed with `wasm_memorytype_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_type(mem: *const wasm_memory_t) -> *mut wasm_memorytype_t {
    let mem = MemoryObject::from_raw(mem);
    MemoryTypeObject { limits: mem.limits }.into_raw()
}

/// Base address of the memory's data
///
/// Invalidated by `wasm_memory_grow()`.
///
/// # Safety
/// `mem` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_data(mem: *mut wasm_memory_t) -> *mut u8 {
    MemoryObject::from_raw_mut(mem).data.as_mut_ptr()
}

/// Number of bytes valid at `wasm_memory_data()`
///
/// # Safety
/// `mem` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_data_size(mem: *const wasm_memory_t) -> usize {
    MemoryObject::from_raw(mem).data.len()
}

/// Current size in pages
///
/// # Safety
/// `mem` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_size(mem: *const wasm_memory_t) -> u32 {
    MemoryObject::from_raw(mem).pages()
}

/// Grow the memory by `delta` pages
///
/// # Returns
/// * true on success (new pages are zero-filled)
/// * false if the new size would exceed the type's maximum or the engine cap
///
/// # Safety
/// `mem` must be valid.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_grow(mem: *mut wasm_memory_t, delta: u32) -> bool {
    let mem = MemoryObject::from_raw_mut(mem);
    let new_pages = match mem.pages().checked_add(delta) {
        Some(n) if n <= mem.max_pages() => n,
        _ => return false,
    };
    mem.data.resize(new_pages as usize * WASM_PAGE_SIZE, 0);
    true
}

/// View the memory as an extern (borrowed, same address)
///
/// # Safety
/// `mem` must be valid. The extern must not be deleted separately.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_as_extern(mem: *mut wasm_memory_t) -> *mut wasm_extern_t {
    mem as *mut wasm_extern_t
}

/// Free a memory
///
/// # Safety
/// `mem` must have been returned by `wasm_memory_new()` and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn wasm_memory_delete(mem: *mut wasm_memory_t) {
    forbid_in_finalizer("wasm_memory_delete");
    if mem.is_null() {
        return;
    }
    drop(Box::from_raw(mem as *mut MemoryObject));
}
