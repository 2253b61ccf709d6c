//! Val: one VM-level datum and its native encoding
//!
//! # Ownership across the engine
//!
//! ```text
//! arguments: borrowed by the callee   (caller releases after the call)
//! results:   owned by the caller      (callee transfers on success)
//! ```
//!
//! Only `ExternRef` carries ownership; a raw externref slot that is owned
//! holds exactly one strong count of the reference.

use crate::types::ValType;
use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use tether_capi as sys;

// ============================================================================
// ExternRef
// ============================================================================

struct ExternData {
    value: Box<dyn Any + Send + Sync>,
}

/// Opaque host reference that can be passed through the VM.
///
/// Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct ExternRef {
    inner: Arc<ExternData>,
}

impl ExternRef {
    /// Wrap a host value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ExternRef {
            inner: Arc::new(ExternData {
                value: Box::new(value),
            }),
        }
    }

    /// The wrapped value
    pub fn data(&self) -> &(dyn Any + Send + Sync) {
        &*self.inner.value
    }

    /// The wrapped value, if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.value.downcast_ref::<T>()
    }

    /// Whether both references point at the same host value
    pub fn ptr_eq(a: &ExternRef, b: &ExternRef) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Number of live references (including this one)
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn into_raw(self) -> *mut c_void {
        Arc::into_raw(self.inner) as *mut c_void
    }

    /// Reclaim the strong count held by an owned raw slot.
    unsafe fn from_raw(ptr: *mut c_void) -> Self {
        ExternRef {
            inner: Arc::from_raw(ptr as *const ExternData),
        }
    }

    /// New reference to a value held by a borrowed raw slot.
    unsafe fn clone_raw(ptr: *mut c_void) -> Self {
        Arc::increment_strong_count(ptr as *const ExternData);
        Self::from_raw(ptr)
    }
}

impl PartialEq for ExternRef {
    fn eq(&self, other: &Self) -> bool {
        ExternRef::ptr_eq(self, other)
    }
}

impl Eq for ExternRef {}

impl fmt::Debug for ExternRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternRef({:p})", Arc::as_ptr(&self.inner))
    }
}

// ============================================================================
// Val
// ============================================================================

/// A VM-level value.
///
/// Floats are stored as raw bits so that values compare bit-for-bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float, as bits
    F32(u32),
    /// 64-bit float, as bits
    F64(u64),
    /// Nullable host reference
    ExternRef(Option<ExternRef>),
}

macro_rules! accessors {
    ($($get:ident $unwrap:ident $variant:ident $ty:ty => $conv:expr,)*) => {$(
        /// The value, if it has this kind
        pub fn $get(&self) -> Option<$ty> {
            match self {
                Val::$variant(v) => Some($conv(v)),
                _ => None,
            }
        }

        /// The value, panicking if it has a different kind
        pub fn $unwrap(&self) -> $ty {
            match self.$get() {
                Some(v) => v,
                None => panic!("expected {}, found {}", ValType::$variant, self.ty()),
            }
        }
    )*};
}

impl Val {
    /// The kind of this value
    pub fn ty(&self) -> ValType {
        match self {
            Val::I32(_) => ValType::I32,
            Val::I64(_) => ValType::I64,
            Val::F32(_) => ValType::F32,
            Val::F64(_) => ValType::F64,
            Val::ExternRef(_) => ValType::ExternRef,
        }
    }

    /// Zero value (or null reference) of a kind
    pub fn default_for(ty: ValType) -> Val {
        match ty {
            ValType::I32 => Val::I32(0),
            ValType::I64 => Val::I64(0),
            ValType::F32 => Val::F32(0),
            ValType::F64 => Val::F64(0),
            ValType::ExternRef => Val::ExternRef(None),
        }
    }

    accessors! {
        i32 unwrap_i32 I32 i32 => |v: &i32| *v,
        i64 unwrap_i64 I64 i64 => |v: &i64| *v,
        f32 unwrap_f32 F32 f32 => |v: &u32| f32::from_bits(*v),
        f64 unwrap_f64 F64 f64 => |v: &u64| f64::from_bits(*v),
        externref unwrap_externref ExternRef Option<ExternRef> => |v: &Option<ExternRef>| v.clone(),
    }

    /// Encode into an owned raw value (one strong count for a reference).
    pub(crate) fn into_raw(self) -> sys::wasm_val_t {
        let (kind, of) = match self {
            Val::I32(v) => (sys::WASM_I32, sys::wasm_val_union { i32: v }),
            Val::I64(v) => (sys::WASM_I64, sys::wasm_val_union { i64: v }),
            Val::F32(v) => (sys::WASM_F32, sys::wasm_val_union { f32: f32::from_bits(v) }),
            Val::F64(v) => (sys::WASM_F64, sys::wasm_val_union { f64: f64::from_bits(v) }),
            Val::ExternRef(r) => {
                let ptr = r.map_or(std::ptr::null_mut(), ExternRef::into_raw);
                (sys::WASM_EXTERNREF, sys::wasm_val_union { ref_: ptr })
            }
        };
        sys::wasm_val_t { kind, of }
    }

    /// Decode a borrowed raw value of kind `ty`; the slot keeps its ownership.
    ///
    /// # Safety
    /// `raw` must be a valid value whose payload matches its kind.
    pub(crate) unsafe fn from_raw_borrowed(raw: &sys::wasm_val_t, ty: ValType) -> Val {
        Self::decode(raw, ty, |p| ExternRef::clone_raw(p))
    }

    /// Decode an owned raw value of kind `ty`, taking its ownership.
    ///
    /// # Safety
    /// `raw` must be a valid owned value and must not be used afterwards.
    pub(crate) unsafe fn from_raw_owned(raw: sys::wasm_val_t, ty: ValType) -> Val {
        Self::decode(&raw, ty, |p| ExternRef::from_raw(p))
    }

    unsafe fn decode(
        raw: &sys::wasm_val_t,
        ty: ValType,
        externref: impl FnOnce(*mut c_void) -> ExternRef,
    ) -> Val {
        assert_eq!(
            raw.kind,
            ty.to_native(),
            "engine passed a value of the wrong kind for {}",
            ty
        );
        match ty {
            ValType::I32 => Val::I32(raw.of.i32),
            ValType::I64 => Val::I64(raw.of.i64),
            ValType::F32 => Val::F32(raw.of.f32.to_bits()),
            ValType::F64 => Val::F64(raw.of.f64.to_bits()),
            ValType::ExternRef => {
                let ptr = raw.of.ref_;
                Val::ExternRef((!ptr.is_null()).then(|| externref(ptr)))
            }
        }
    }
}

/// Drop the ownership held by an owned raw value.
///
/// # Safety
/// `raw` must be an owned value produced by [`Val::into_raw`] and not used afterwards.
pub(crate) unsafe fn release_raw(raw: &sys::wasm_val_t) {
    if raw.kind == sys::WASM_EXTERNREF && !raw.of.ref_.is_null() {
        drop(ExternRef::from_raw(raw.of.ref_));
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<i32> for Val {
    fn from(v: i32) -> Val {
        Val::I32(v)
    }
}

impl From<u32> for Val {
    fn from(v: u32) -> Val {
        Val::I32(v as i32)
    }
}

impl From<i64> for Val {
    fn from(v: i64) -> Val {
        Val::I64(v)
    }
}

impl From<u64> for Val {
    fn from(v: u64) -> Val {
        Val::I64(v as i64)
    }
}

impl From<f32> for Val {
    fn from(v: f32) -> Val {
        Val::F32(v.to_bits())
    }
}

impl From<f64> for Val {
    fn from(v: f64) -> Val {
        Val::F64(v.to_bits())
    }
}

impl From<ExternRef> for Val {
    fn from(v: ExternRef) -> Val {
        Val::ExternRef(Some(v))
    }
}

impl From<Option<ExternRef>> for Val {
    fn from(v: Option<ExternRef>) -> Val {
        Val::ExternRef(v)
    }
}
