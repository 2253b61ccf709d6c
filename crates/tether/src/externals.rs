//! Type-erased extern values

use crate::func::Func;
use crate::handle::Handle;
use crate::memory::{self, Memory};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use tether_capi as sys;

/// Kind of object behind an [`Extern`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternKind {
    /// A function
    Func,
    /// A linear memory
    Memory,
}

/// A function or memory viewed without its concrete type.
///
/// Views never own the native object; they keep its owner alive.
#[derive(Clone)]
pub struct Extern {
    handle: Arc<Handle<sys::wasm_extern_t>>,
}

impl Extern {
    pub(crate) fn from_handle(handle: Arc<Handle<sys::wasm_extern_t>>) -> Extern {
        Extern { handle }
    }

    /// What this extern is
    pub fn kind(&self) -> ExternKind {
        match unsafe { sys::wasm_extern_kind(self.handle.as_ptr()) } {
            sys::WASM_EXTERN_FUNC => ExternKind::Func,
            sys::WASM_EXTERN_MEMORY => ExternKind::Memory,
            other => panic!("native engine returned unknown extern kind {}", other),
        }
    }

    /// The function, if this is one
    pub fn into_func(self) -> Option<Func> {
        let ptr = NonNull::new(unsafe { sys::wasm_extern_as_func(self.handle.as_ptr()) })?;
        let handle =
            unsafe { Handle::borrow(ptr, self.handle.store(), self.handle.owner(), None) };
        Some(Func::from_handle(handle))
    }

    /// The memory, if this is one
    pub fn into_memory(self) -> Option<Memory> {
        let ptr = NonNull::new(unsafe { sys::wasm_extern_as_memory(self.handle.as_ptr()) })?;
        // the owner of a memory view is the memory's owning handle
        let owner = self.handle.owner();
        let access = memory::shared_access(&owner)?;
        let handle = unsafe { Handle::borrow(ptr, self.handle.store(), owner, access) };
        Some(Memory::from_handle(handle))
    }
}

impl From<Func> for Extern {
    fn from(func: Func) -> Extern {
        func.as_extern()
    }
}

impl From<Memory> for Extern {
    fn from(memory: Memory) -> Extern {
        memory.as_extern()
    }
}

impl fmt::Debug for Extern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extern")
            .field("kind", &self.kind())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Engine, Store};
    use crate::types::{FuncType, MemoryType};

    #[test]
    fn test_kind_and_downcast() {
        let store = Store::new(&Engine::default());
        let mem = Memory::new(&store, MemoryType::new(1, None)).unwrap();
        let func = Func::new(&store, FuncType::new([], []), |_, _| Ok(vec![]));

        let ext = Extern::from(mem.clone());
        assert_eq!(ext.kind(), ExternKind::Memory);
        assert!(ext.clone().into_func().is_none());
        assert_eq!(ext.into_memory().unwrap().data_ptr(), mem.data_ptr());

        let ext = func.as_extern();
        assert_eq!(ext.kind(), ExternKind::Func);
        assert!(ext.clone().into_memory().is_none());
        assert!(ext.into_func().is_some());
    }
}
