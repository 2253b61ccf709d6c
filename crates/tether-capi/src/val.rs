//! Value representation at the C boundary

use std::ffi::c_void;
use std::fmt;

/// Value kind tag
pub type wasm_valkind_t = u8;

/// 32-bit integer
pub const WASM_I32: wasm_valkind_t = 0;
/// 64-bit integer
pub const WASM_I64: wasm_valkind_t = 1;
/// 32-bit float
pub const WASM_F32: wasm_valkind_t = 2;
/// 64-bit float
pub const WASM_F64: wasm_valkind_t = 3;
/// Opaque host reference (nullable)
pub const WASM_EXTERNREF: wasm_valkind_t = 128;

/// Payload of a [`wasm_val_t`]. The active field is selected by `kind`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union wasm_val_union {
    /// Active for `WASM_I32`
    pub i32: i32,
    /// Active for `WASM_I64`
    pub i64: i64,
    /// Active for `WASM_F32`
    pub f32: f32,
    /// Active for `WASM_F64`
    pub f64: f64,
    /// Active for `WASM_EXTERNREF`; the engine never dereferences it
    pub ref_: *mut c_void,
}

/// Tagged value passed in argument and result buffers
#[repr(C)]
#[derive(Clone, Copy)]
pub struct wasm_val_t {
    /// Kind tag
    pub kind: wasm_valkind_t,
    /// Payload
    pub of: wasm_val_union,
}

impl wasm_val_t {
    /// Zero value used to initialize result buffers.
    pub const fn zeroed() -> Self {
        wasm_val_t {
            kind: WASM_I64,
            of: wasm_val_union { i64: 0 },
        }
    }
}

impl Default for wasm_val_t {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for wasm_val_t {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        unsafe {
            match self.kind {
                WASM_I32 => write!(f, "wasm_val_t::I32({})", self.of.i32),
                WASM_I64 => write!(f, "wasm_val_t::I64({})", self.of.i64),
                WASM_F32 => write!(f, "wasm_val_t::F32({})", self.of.f32),
                WASM_F64 => write!(f, "wasm_val_t::F64({})", self.of.f64),
                WASM_EXTERNREF => write!(f, "wasm_val_t::ExternRef({:p})", self.of.ref_),
                other => write!(f, "wasm_val_t::Unknown(kind={})", other),
            }
        }
    }
}

/// Whether `kind` is a value kind this engine understands
pub(crate) fn is_valid_kind(kind: wasm_valkind_t) -> bool {
    matches!(
        kind,
        WASM_I32 | WASM_I64 | WASM_F32 | WASM_F64 | WASM_EXTERNREF
    )
}
