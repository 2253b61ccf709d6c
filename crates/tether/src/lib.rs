//! Tether - Host-function bridge and deferred native resource reclamation
//!
//! This crate lets host code register Rust closures as functions callable
//! through an embedded VM engine, call engine functions, and own the
//! engine's native objects (memories, functions, extern views, interrupt
//! handles) without ever freeing them from an unsafe point.
//!
//! # Example
//!
//! ```ignore
//! use tether::{Caller, Engine, Func, Memory, MemoryType, Store, Trap};
//!
//! let store = Store::new(&Engine::default());
//! let memory = Memory::new(&store, MemoryType::new(1, Some(4)))?;
//!
//! let checked_div = Func::wrap(&store, |_: Caller<'_>, a: i32, b: i32| {
//!     if b == 0 {
//!         return Err(Trap::new("division by zero"));
//!     }
//!     Ok(a / b)
//! });
//!
//! let div = checked_div.typed::<(i32, i32), i32>()?;
//! assert_eq!(div.call((7, 2))?, 3);
//! assert!(div.call((1, 0)).is_err());
//! ```
//!
//! # Reclamation
//!
//! Dropping the last owning handle only queues its native pointer on the
//! store. Queued objects are released before the store allocates, before
//! each call into the engine, when the store is dropped, or on
//! [`Store::flush`].
//!
//! A function's closure is dropped as soon as its last owning handle is, so
//! closures may capture the store and its memories without leaking them.
//!
//! # Panics in host functions
//!
//! A panic inside a host function never unwinds through the engine. It is
//! caught at the engine boundary and resumed, with its original payload, by
//! the [`Func::call`] that entered the engine.

#![warn(missing_docs)]

mod bridge;
mod config;
pub mod defaults;
mod error;
mod externals;
mod freelist;
mod func;
mod handle;
mod interrupt;
mod memory;
mod store;
mod types;
mod val;

pub use config::Config;
pub use defaults::WASM_PAGE_SIZE;
pub use error::{Error, Trap, TrapCode};
pub use externals::{Extern, ExternKind};
pub use func::{Caller, Func, IntoFunc, TypedFunc, WasmParams, WasmResults, WasmRet, WasmTy};
pub use interrupt::InterruptHandle;
pub use memory::Memory;
pub use store::{Engine, Store};
pub use types::{FuncType, MemoryType, ValType};
pub use val::{ExternRef, Val};
