//! Reference native engine for tether
//!
//! This crate provides the narrow C ABI that the `tether` embedding layer
//! consumes. It is a stand-in for a real WebAssembly runtime library and only
//! implements what the embedding needs:
//! - Engines and stores (with configurable limits)
//! - Function and memory types
//! - Linear memories
//! - Host functions registered with a trampoline, an environment pointer
//!   and a finalizer, plus a call primitive
//! - Traps and extern views
//! - Interrupt handles
//!
//! The API follows these principles:
//! - ABI-stable (uses only C-compatible types)
//! - Opaque pointers for engine objects
//! - Manual memory management through one `*_delete` function per kind
//! - Allocation and free functions must not be called while the engine is
//!   running a function finalizer; doing so aborts the process

#![allow(non_camel_case_types)]

mod externs;
mod func;
mod memory;
mod store;
mod trap;
mod types;
mod val;

pub use externs::{
    wasm_extern_as_func, wasm_extern_as_memory, wasm_extern_delete, wasm_extern_kind,
    wasm_extern_t, wasm_externkind_t, WASM_EXTERN_FUNC, WASM_EXTERN_MEMORY,
};
pub use func::{
    wasm_finalizer_t, wasm_func_as_extern, wasm_func_call, wasm_func_delete,
    wasm_func_param_arity, wasm_func_result_arity, wasm_func_t, wasm_func_type,
    wasmtime_caller_depth, wasmtime_caller_t, wasmtime_func_callback_with_env_t,
    wasmtime_func_new_with_env,
};
pub use memory::{
    wasm_memory_as_extern, wasm_memory_data, wasm_memory_data_size, wasm_memory_delete,
    wasm_memory_grow, wasm_memory_new, wasm_memory_size, wasm_memory_t, wasm_memory_type,
    WASM_PAGE_SIZE,
};
pub use store::{
    wasm_config_t, wasm_engine_delete, wasm_engine_new_with_config, wasm_engine_t,
    wasm_store_delete, wasm_store_new, wasm_store_t, wasmtime_interrupt_handle_delete,
    wasmtime_interrupt_handle_interrupt, wasmtime_interrupt_handle_new,
    wasmtime_interrupt_handle_t,
};
pub use trap::{
    wasm_trap_delete, wasm_trap_message, wasm_trap_new, wasm_trap_t, wasmtime_trap_code,
    wasmtime_trap_code_t, WASMTIME_TRAP_CODE_INTERRUPT, WASMTIME_TRAP_CODE_STACK_OVERFLOW,
};
pub use types::{
    wasm_functype_delete, wasm_functype_new, wasm_functype_params, wasm_functype_results,
    wasm_functype_t, wasm_limits_t, wasm_memorytype_delete, wasm_memorytype_limits,
    wasm_memorytype_new, wasm_memorytype_t, WASM_LIMITS_MAX_DEFAULT,
};
pub use val::{
    wasm_val_t, wasm_val_union, wasm_valkind_t, WASM_EXTERNREF, WASM_F32, WASM_F64, WASM_I32,
    WASM_I64,
};

/// Borrow a C array as a slice, tolerating a NULL pointer for empty arrays.
///
/// # Safety
/// When `len > 0`, `ptr` must be valid for `len` reads for the lifetime `'a`.
pub(crate) unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if len == 0 || ptr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

/// Mutable variant of [`slice_or_empty`].
///
/// # Safety
/// When `len > 0`, `ptr` must be valid for `len` writes for the lifetime `'a`.
pub(crate) unsafe fn slice_or_empty_mut<'a, T>(ptr: *mut T, len: usize) -> &'a mut [T] {
    if len == 0 || ptr.is_null() {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(ptr, len)
    }
}
