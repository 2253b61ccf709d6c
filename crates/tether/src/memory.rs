//! Linear memories

use crate::error::Error;
use crate::externals::Extern;
use crate::handle::{Handle, Owner};
use crate::store::{native_ptr, Store};
use crate::types::MemoryType;
use parking_lot::RwLock;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use tether_capi as sys;

/// A linear memory owned by a store.
///
/// Clones and views share one lock: [`read`](Memory::read) calls run
/// concurrently, while [`write`](Memory::write) and [`grow`](Memory::grow)
/// are exclusive. The pointer from [`data_ptr`](Memory::data_ptr) is
/// outside that lock and is invalidated by growing.
#[derive(Clone)]
pub struct Memory {
    handle: Arc<Handle<sys::wasm_memory_t>>,
}

impl Memory {
    /// Create a memory of the given type.
    ///
    /// Fails with [`Error::InvalidMemoryType`] if the limits are inverted or
    /// the minimum exceeds the engine's page cap.
    pub fn new(store: &Store, ty: MemoryType) -> Result<Memory, Error> {
        store.flush();

        let native_ty = ty.to_native();
        if native_ty.is_null() {
            return Err(Error::InvalidMemoryType(ty));
        }
        let ptr = unsafe {
            let ptr = sys::wasm_memory_new(store.as_ptr(), native_ty);
            sys::wasm_memorytype_delete(native_ty);
            ptr
        };
        let ptr = NonNull::new(ptr).ok_or(Error::InvalidMemoryType(ty))?;

        log::trace!("created {} at {:p}", ty, ptr);
        Ok(Memory {
            handle: unsafe { Handle::acquire(ptr, store, Arc::new(RwLock::new(()))) },
        })
    }

    pub(crate) fn from_handle(handle: Arc<Handle<sys::wasm_memory_t>>) -> Memory {
        Memory { handle }
    }

    /// The memory's type
    pub fn ty(&self) -> MemoryType {
        unsafe {
            let native = sys::wasm_memory_type(self.handle.as_ptr());
            let ty = MemoryType::from_native(native);
            sys::wasm_memorytype_delete(native);
            ty
        }
    }

    fn access(&self) -> &RwLock<()> {
        self.handle.state()
    }

    /// Base address of the memory's bytes.
    ///
    /// Dereferencing the pointer is only sound while no other thread grows
    /// or writes this memory; [`read`](Memory::read) and
    /// [`write`](Memory::write) are the synchronized alternatives.
    pub fn data_ptr(&self) -> *mut u8 {
        let _guard = self.access().read();
        unsafe { sys::wasm_memory_data(self.handle.as_ptr()) }
    }

    /// Number of addressable bytes
    pub fn data_size(&self) -> usize {
        let _guard = self.access().read();
        self.data_size_unlocked()
    }

    fn data_size_unlocked(&self) -> usize {
        unsafe { sys::wasm_memory_data_size(self.handle.as_ptr()) }
    }

    /// Current size in pages
    pub fn size(&self) -> u32 {
        let _guard = self.access().read();
        unsafe { sys::wasm_memory_size(self.handle.as_ptr()) }
    }

    /// Grow by `delta` pages. Returns `false` if the engine refuses.
    pub fn grow(&self, delta: u32) -> bool {
        let grown = {
            let _guard = self.access().write();
            unsafe { sys::wasm_memory_grow(self.handle.as_ptr(), delta) }
        };
        if !grown {
            log::debug!("memory {:p} refused to grow by {} pages", self.handle.as_ptr(), delta);
        }
        grown
    }

    /// Copy bytes starting at `offset` into `buf`
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), Error> {
        let _guard = self.access().read();
        self.check_bounds(offset, buf.len())?;
        unsafe {
            let data = sys::wasm_memory_data(self.handle.as_ptr());
            std::ptr::copy_nonoverlapping(data.add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `data` into the memory starting at `offset`
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), Error> {
        let _guard = self.access().write();
        self.check_bounds(offset, data.len())?;
        unsafe {
            let base = sys::wasm_memory_data(self.handle.as_ptr());
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset), data.len());
        }
        Ok(())
    }

    /// Caller holds the access lock
    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), Error> {
        let size = self.data_size_unlocked();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(Error::OutOfBounds { offset, len, size }),
        }
    }

    /// The store this memory belongs to
    pub fn store(&self) -> &Store {
        self.handle.store()
    }

    /// Type-erased view sharing this memory's ownership
    pub fn as_extern(&self) -> Extern {
        let ptr = unsafe { sys::wasm_memory_as_extern(self.handle.as_ptr()) };
        let ptr = native_ptr(ptr, "wasm_memory_as_extern");
        Extern::from_handle(unsafe { Handle::borrow(ptr, self.store(), self.handle.owner(), ()) })
    }
}

/// The access lock of the memory owning `owner`, if `owner` is a memory
pub(crate) fn shared_access(owner: &Owner) -> Option<Arc<RwLock<()>>> {
    let memory = Arc::clone(owner)
        .downcast::<Handle<sys::wasm_memory_t>>()
        .ok()?;
    Some(Arc::clone(memory.state()))
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.size())
            .field("handle", &self.handle)
            .finish()
    }
}
