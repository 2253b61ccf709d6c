//! Function and memory type descriptors

use crate::val::{is_valid_kind, wasm_valkind_t};
use crate::slice_or_empty;
use std::ptr;

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque handle to a function type
#[repr(C)]
pub struct wasm_functype_t {
    _private: [u8; 0],
}

/// Opaque handle to a memory type
#[repr(C)]
pub struct wasm_memorytype_t {
    _private: [u8; 0],
}

/// Memory limits in pages
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct wasm_limits_t {
    /// Initial size in pages
    pub min: u32,
    /// Maximum size in pages, `WASM_LIMITS_MAX_DEFAULT` for unbounded
    pub max: u32,
}

/// Sentinel for "no maximum"
pub const WASM_LIMITS_MAX_DEFAULT: u32 = u32::MAX;

// Internal representation of a function type (not exposed to C)
pub(crate) struct FuncTypeObject {
    pub(crate) params: Box<[wasm_valkind_t]>,
    pub(crate) results: Box<[wasm_valkind_t]>,
}

// Internal representation of a memory type (not exposed to C)
pub(crate) struct MemoryTypeObject {
    pub(crate) limits: wasm_limits_t,
}

impl FuncTypeObject {
    pub(crate) fn into_raw(self) -> *mut wasm_functype_t {
        Box::into_raw(Box::new(self)) as *mut wasm_functype_t
    }

    pub(crate) unsafe fn from_raw<'a>(ty: *const wasm_functype_t) -> &'a FuncTypeObject {
        &*(ty as *const FuncTypeObject)
    }
}

impl MemoryTypeObject {
    pub(crate) fn into_raw(self) -> *mut wasm_memorytype_t {
        Box::into_raw(Box::new(self)) as *mut wasm_memorytype_t
    }

    pub(crate) unsafe fn from_raw<'a>(ty: *const wasm_memorytype_t) -> &'a MemoryTypeObject {
        &*(ty as *const MemoryTypeObject)
    }
}

// ============================================================================
// Function Types
// ============================================================================

/// Create a function type from parameter and result kind arrays
///
/// # Returns
/// * Non-null pointer on success
/// * NULL if any kind is not a valid value kind
///
/// # Safety
/// `params`/`results` must be valid for `nparams`/`nresults` reads.
/// The returned type must be freed with `wasm_functype_delete()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_functype_new(
    params: *const wasm_valkind_t,
    nparams: usize,
    results: *const wasm_valkind_t,
    nresults: usize,
) -> *mut wasm_functype_t {
    let params = slice_or_empty(params, nparams);
    let results = slice_or_empty(results, nresults);
    if !params.iter().chain(results).all(|k| is_valid_kind(*k)) {
        return ptr::null_mut();
    }
    FuncTypeObject {
        params: params.into(),
        results: results.into(),
    }
    .into_raw()
}

/// Get the parameter kinds of a function type
///
/// # Safety
/// `ty` must be a valid function type and `out_len` must be writable.
/// The returned array is valid until the type is deleted.
#[no_mangle]
pub unsafe extern "C" fn wasm_functype_params(
    ty: *const wasm_functype_t,
    out_len: *mut usize,
) -> *const wasm_valkind_t {
    let ty = FuncTypeObject::from_raw(ty);
    *out_len = ty.params.len();
    ty.params.as_ptr()
}

/// Get the result kinds of a function type
///
/// # Safety
/// Same as `wasm_functype_params()`.
#[no_mangle]
pub unsafe extern "C" fn wasm_functype_results(
    ty: *const wasm_functype_t,
    out_len: *mut usize,
) -> *const wasm_valkind_t {
    let ty = FuncTypeObject::from_raw(ty);
    *out_len = ty.results.len();
    ty.results.as_ptr()
}

/// Free a function type
///
/// # Safety
/// `ty` must have been returned by this engine and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn wasm_functype_delete(ty: *mut wasm_functype_t) {
    if ty.is_null() {
        return;
    }
    drop(Box::from_raw(ty as *mut FuncTypeObject));
}

// ============================================================================
// Memory Types
// ============================================================================

/// Create a memory type
///
/// # Returns
/// * NULL if `min > max`
///
/// # Safety
/// `limits` must point to a valid `wasm_limits_t`.
#[no_mangle]
pub unsafe extern "C" fn wasm_memorytype_new(limits: *const wasm_limits_t) -> *mut wasm_memorytype_t {
    if limits.is_null() {
        return ptr::null_mut();
    }
    let limits = *limits;
    if limits.min > limits.max {
        return ptr::null_mut();
    }
    MemoryTypeObject { limits }.into_raw()
}

/// Get the limits of a memory type
///
/// # Safety
/// `ty` must be a valid memory type; the result lives as long as `ty`.
#[no_mangle]
pub unsafe extern "C" fn wasm_memorytype_limits(ty: *const wasm_memorytype_t) -> *const wasm_limits_t {
    &MemoryTypeObject::from_raw(ty).limits
}

/// Free a memory type
///
/// # Safety
/// `ty` must have been returned by this engine and not freed yet.
#[no_mangle]
pub unsafe extern "C" fn wasm_memorytype_delete(ty: *mut wasm_memorytype_t) {
    if ty.is_null() {
        return;
    }
    drop(Box::from_raw(ty as *mut MemoryTypeObject));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::val::{WASM_F64, WASM_I32, WASM_I64};

    #[test]
    fn test_functype_roundtrip() {
        let params = [WASM_I32, WASM_I64];
        let results = [WASM_F64];
        unsafe {
            let ty = wasm_functype_new(params.as_ptr(), 2, results.as_ptr(), 1);
            assert!(!ty.is_null());

            let mut len = 0;
            let p = wasm_functype_params(ty, &mut len);
            assert_eq!(std::slice::from_raw_parts(p, len), &params);
            let r = wasm_functype_results(ty, &mut len);
            assert_eq!(std::slice::from_raw_parts(r, len), &results);

            wasm_functype_delete(ty);
        }
    }

    #[test]
    fn test_functype_rejects_unknown_kind() {
        let params = [42u8];
        unsafe {
            let ty = wasm_functype_new(params.as_ptr(), 1, ptr::null(), 0);
            assert!(ty.is_null());
        }
    }

    #[test]
    fn test_memorytype_rejects_inverted_limits() {
        let limits = wasm_limits_t { min: 2, max: 1 };
        unsafe {
            assert!(wasm_memorytype_new(&limits).is_null());
        }
    }
}
