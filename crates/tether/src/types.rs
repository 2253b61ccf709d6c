//! Value, function and memory type descriptors

use std::fmt;
use std::sync::Arc;
use tether_capi as sys;

/// Kind of a single VM-level value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Nullable opaque host reference
    ExternRef,
}

impl ValType {
    pub(crate) fn to_native(self) -> sys::wasm_valkind_t {
        match self {
            ValType::I32 => sys::WASM_I32,
            ValType::I64 => sys::WASM_I64,
            ValType::F32 => sys::WASM_F32,
            ValType::F64 => sys::WASM_F64,
            ValType::ExternRef => sys::WASM_EXTERNREF,
        }
    }

    pub(crate) fn from_native(kind: sys::wasm_valkind_t) -> Option<ValType> {
        match kind {
            sys::WASM_I32 => Some(ValType::I32),
            sys::WASM_I64 => Some(ValType::I64),
            sys::WASM_F32 => Some(ValType::F32),
            sys::WASM_F64 => Some(ValType::F64),
            sys::WASM_EXTERNREF => Some(ValType::ExternRef),
            _ => None,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
            ValType::ExternRef => write!(f, "externref"),
        }
    }
}

/// Signature of a function at the VM boundary.
///
/// Immutable once constructed; clones share the same storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    params: Arc<[ValType]>,
    results: Arc<[ValType]>,
}

impl FuncType {
    /// Create a signature from parameter and result kinds
    pub fn new(
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
    ) -> Self {
        FuncType {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    /// Parameter kinds, in order
    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    /// Result kinds, in order
    pub fn results(&self) -> &[ValType] {
        &self.results
    }

    /// Build a native function type. The caller owns the result.
    pub(crate) fn to_native(&self) -> *mut sys::wasm_functype_t {
        let params: Vec<_> = self.params.iter().map(|t| t.to_native()).collect();
        let results: Vec<_> = self.results.iter().map(|t| t.to_native()).collect();
        unsafe {
            sys::wasm_functype_new(params.as_ptr(), params.len(), results.as_ptr(), results.len())
        }
    }

    /// Copy a native function type. The caller keeps ownership of `ty`.
    ///
    /// # Safety
    /// `ty` must be a valid native function type.
    pub(crate) unsafe fn from_native(ty: *const sys::wasm_functype_t) -> FuncType {
        let mut len = 0;
        let params = sys::wasm_functype_params(ty, &mut len);
        let params = decode_kinds(params, len);
        let results = sys::wasm_functype_results(ty, &mut len);
        let results = decode_kinds(results, len);
        FuncType::new(params, results)
    }
}

unsafe fn decode_kinds(ptr: *const sys::wasm_valkind_t, len: usize) -> Vec<ValType> {
    if len == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, len)
        .iter()
        .filter_map(|k| ValType::from_native(*k))
        .collect()
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> (")?;
        for (i, r) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        write!(f, ")")
    }
}

/// Limits of a linear memory, in pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    minimum: u32,
    maximum: Option<u32>,
}

impl MemoryType {
    /// Create a memory type
    pub fn new(minimum: u32, maximum: Option<u32>) -> Self {
        MemoryType { minimum, maximum }
    }

    /// Initial size in pages
    pub fn minimum(&self) -> u32 {
        self.minimum
    }

    /// Maximum size in pages, if bounded
    pub fn maximum(&self) -> Option<u32> {
        self.maximum
    }

    pub(crate) fn to_native(self) -> *mut sys::wasm_memorytype_t {
        let limits = sys::wasm_limits_t {
            min: self.minimum,
            max: self.maximum.unwrap_or(sys::WASM_LIMITS_MAX_DEFAULT),
        };
        unsafe { sys::wasm_memorytype_new(&limits) }
    }

    /// # Safety
    /// `ty` must be a valid native memory type.
    pub(crate) unsafe fn from_native(ty: *const sys::wasm_memorytype_t) -> MemoryType {
        let limits = *sys::wasm_memorytype_limits(ty);
        let maximum = (limits.max != sys::WASM_LIMITS_MAX_DEFAULT).then_some(limits.max);
        MemoryType::new(limits.min, maximum)
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.maximum {
            Some(max) => write!(f, "memory {}..{}", self.minimum, max),
            None => write!(f, "memory {}..", self.minimum),
        }
    }
}
