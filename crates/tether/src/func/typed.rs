//! Typed host functions
//!
//! Signatures of typed closures are derived from their Rust types through
//! the traits below. Each supported scalar type maps to one value kind:
//!
//! | Rust                  | Kind        |
//! |-----------------------|-------------|
//! | `i32`, `u32`          | `i32`       |
//! | `i64`, `u64`          | `i64`       |
//! | `f32`                 | `f32`       |
//! | `f64`                 | `f64`       |
//! | `Option<ExternRef>`   | `externref` |
//!
//! Any other parameter or result type fails to compile.

use super::{Caller, Func};
use crate::error::Trap;
use crate::store::Store;
use crate::types::{FuncType, ValType};
use crate::val::{ExternRef, Val};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

// ============================================================================
// Scalars
// ============================================================================

/// A Rust type that maps to a single value kind
pub trait WasmTy: Send + Sized + 'static {
    #[doc(hidden)]
    fn valtype() -> ValType;
    #[doc(hidden)]
    fn into_val(self) -> Val;
    #[doc(hidden)]
    fn from_val(val: Val) -> Self;
}

macro_rules! scalar_ty {
    ($($ty:ty => $kind:ident $unwrap:ident;)*) => {$(
        impl WasmTy for $ty {
            fn valtype() -> ValType {
                ValType::$kind
            }

            fn into_val(self) -> Val {
                Val::from(self)
            }

            #[allow(clippy::unnecessary_cast)]
            fn from_val(val: Val) -> Self {
                val.$unwrap() as $ty
            }
        }
    )*};
}

scalar_ty! {
    i32 => I32 unwrap_i32;
    u32 => I32 unwrap_i32;
    i64 => I64 unwrap_i64;
    u64 => I64 unwrap_i64;
    f32 => F32 unwrap_f32;
    f64 => F64 unwrap_f64;
}

impl WasmTy for Option<ExternRef> {
    fn valtype() -> ValType {
        ValType::ExternRef
    }

    fn into_val(self) -> Val {
        Val::ExternRef(self)
    }

    fn from_val(val: Val) -> Self {
        match val {
            Val::ExternRef(r) => r,
            other => panic!("expected externref, found {}", other.ty()),
        }
    }
}

// ============================================================================
// Parameter and result lists
// ============================================================================

/// A list of parameters: `()`, a single [`WasmTy`], or a tuple of them
pub trait WasmParams: Sized {
    #[doc(hidden)]
    fn valtypes() -> Vec<ValType>;
    #[doc(hidden)]
    fn into_vals(self) -> Vec<Val>;
    #[doc(hidden)]
    fn from_vals(vals: &[Val]) -> Self;
}

/// A list of results; same shapes as [`WasmParams`]
pub trait WasmResults: WasmParams {}

impl<T: WasmParams> WasmResults for T {}

impl<T: WasmTy> WasmParams for T {
    fn valtypes() -> Vec<ValType> {
        vec![T::valtype()]
    }

    fn into_vals(self) -> Vec<Val> {
        vec![self.into_val()]
    }

    fn from_vals(vals: &[Val]) -> Self {
        <(T,)>::from_vals(vals).0
    }
}

fn next_val(vals: &mut impl Iterator<Item = Val>) -> Val {
    match vals.next() {
        Some(val) => val,
        None => panic!("wrong number of values for typed signature"),
    }
}

/// What a typed closure may return: results, or results or a trap
pub trait WasmRet {
    #[doc(hidden)]
    type Results: WasmResults;
    #[doc(hidden)]
    fn into_results(self) -> Result<Self::Results, Trap>;
}

impl<T: WasmTy> WasmRet for T {
    type Results = T;

    fn into_results(self) -> Result<T, Trap> {
        Ok(self)
    }
}

impl<T: WasmTy> WasmRet for Result<T, Trap> {
    type Results = T;

    fn into_results(self) -> Result<T, Trap> {
        self
    }
}

macro_rules! impl_tuples {
    ($($t:ident)*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<$($t: WasmTy,)*> WasmParams for ($($t,)*) {
            fn valtypes() -> Vec<ValType> {
                vec![$($t::valtype()),*]
            }

            fn into_vals(self) -> Vec<Val> {
                let ($($t,)*) = self;
                vec![$($t.into_val()),*]
            }

            fn from_vals(vals: &[Val]) -> Self {
                let mut vals = vals.iter().cloned();
                ($($t::from_val(next_val(&mut vals)),)*)
            }
        }

        impl<$($t: WasmTy,)*> WasmRet for ($($t,)*) {
            type Results = Self;

            fn into_results(self) -> Result<Self, Trap> {
                Ok(self)
            }
        }

        impl<$($t: WasmTy,)*> WasmRet for Result<($($t,)*), Trap> {
            type Results = ($($t,)*);

            fn into_results(self) -> Result<Self::Results, Trap> {
                self
            }
        }
    };
}

// ============================================================================
// Closures
// ============================================================================

/// A closure that can be registered with [`Func::wrap`]
pub trait IntoFunc<Params, Results>: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_func(self, store: &Store) -> Func;
}

macro_rules! impl_into_func {
    ($($args:ident)*) => {
        #[allow(non_snake_case)]
        impl<F, $($args,)* R> IntoFunc<($($args,)*), R> for F
        where
            F: Fn($($args),*) -> R + Send + Sync + 'static,
            $($args: WasmTy,)*
            R: WasmRet,
        {
            fn into_func(self, store: &Store) -> Func {
                let f = move |_: Caller<'_>, $($args: $args),*| self($($args),*);
                IntoFunc::<(Caller<'_>, $($args,)*), R>::into_func(f, store)
            }
        }

        #[allow(non_snake_case)]
        impl<F, $($args,)* R> IntoFunc<(Caller<'_>, $($args,)*), R> for F
        where
            F: Fn(Caller<'_>, $($args),*) -> R + Send + Sync + 'static,
            $($args: WasmTy,)*
            R: WasmRet,
        {
            fn into_func(self, store: &Store) -> Func {
                let ty = FuncType::new(
                    <($($args,)*) as WasmParams>::valtypes(),
                    <R::Results as WasmParams>::valtypes(),
                );
                Func::from_callback(
                    store,
                    ty,
                    Arc::new(move |caller: Caller<'_>, vals: &[Val]| {
                        let ($($args,)*) = <($($args,)*) as WasmParams>::from_vals(vals);
                        let results = self(caller, $($args),*).into_results()?;
                        Ok(results.into_vals())
                    }),
                )
            }
        }
    };
}

macro_rules! for_each_function_signature {
    ($mac:ident) => {
        $mac!();
        $mac!(A1);
        $mac!(A1 A2);
        $mac!(A1 A2 A3);
        $mac!(A1 A2 A3 A4);
        $mac!(A1 A2 A3 A4 A5);
        $mac!(A1 A2 A3 A4 A5 A6);
        $mac!(A1 A2 A3 A4 A5 A6 A7);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8 A9);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10 A11);
        $mac!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10 A11 A12);
    };
}

for_each_function_signature!(impl_tuples);
for_each_function_signature!(impl_into_func);

// ============================================================================
// TypedFunc
// ============================================================================

/// A [`Func`] whose signature was checked against `Params` and `Results`
pub struct TypedFunc<Params, Results> {
    func: Func,
    _marker: PhantomData<fn(Params) -> Results>,
}

impl<Params, Results> TypedFunc<Params, Results>
where
    Params: WasmParams,
    Results: WasmResults,
{
    pub(crate) fn new_unchecked(func: Func) -> Self {
        TypedFunc {
            func,
            _marker: PhantomData,
        }
    }

    /// The untyped function
    pub fn func(&self) -> &Func {
        &self.func
    }

    /// Call the function with typed arguments
    pub fn call(&self, params: Params) -> Result<Results, Trap> {
        let results = self.func.call(&params.into_vals())?;
        Ok(Results::from_vals(&results))
    }
}

impl<Params, Results> Clone for TypedFunc<Params, Results> {
    fn clone(&self) -> Self {
        TypedFunc {
            func: self.func.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Params, Results> fmt::Debug for TypedFunc<Params, Results> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFunc").field("func", &self.func).finish()
    }
}
