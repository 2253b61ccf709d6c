//! Resource handles: owning and borrowed wrappers around native pointers

use crate::freelist::Native;
use crate::store::Store;
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Whatever keeps a borrowed view's native object alive
pub(crate) type Owner = Arc<dyn Any + Send + Sync>;

/// A native engine object.
///
/// An owning handle (no `owner`) detaches its host state and queues its
/// pointer on the store's registry when dropped. A borrowed view holds its
/// owner instead and never queues anything.
pub(crate) struct Handle<T: Native> {
    ptr: NonNull<T>,
    store: Store,
    owner: Option<Owner>,
    state: T::State,
}

// Native objects are only reached through the engine's API, which the
// registry serializes for frees; the pointer itself carries no thread affinity.
unsafe impl<T: Native> Send for Handle<T> {}
unsafe impl<T: Native> Sync for Handle<T> {}

impl<T: Native> Handle<T> {
    /// Take ownership of a freshly created native object.
    ///
    /// # Safety
    /// `ptr` must be owned by the caller and belong to `store`.
    pub(crate) unsafe fn acquire(ptr: NonNull<T>, store: &Store, state: T::State) -> Arc<Self> {
        Arc::new(Handle {
            ptr,
            store: store.clone(),
            owner: None,
            state,
        })
    }

    /// Create a view of a native object kept alive by `owner`.
    ///
    /// # Safety
    /// `ptr` must stay valid for as long as `owner` is alive.
    pub(crate) unsafe fn borrow(
        ptr: NonNull<T>,
        store: &Store,
        owner: Owner,
        state: T::State,
    ) -> Arc<Self> {
        Arc::new(Handle {
            ptr,
            store: store.clone(),
            owner: Some(owner),
            state,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn state(&self) -> &T::State {
        &self.state
    }

    pub(crate) fn is_owning(&self) -> bool {
        self.owner.is_none()
    }

    /// The authoritative owner for views derived from this handle
    pub(crate) fn owner(self: &Arc<Self>) -> Owner {
        match &self.owner {
            Some(owner) => Arc::clone(owner),
            None => Arc::clone(self) as Owner,
        }
    }
}

impl<T: Native> Drop for Handle<T> {
    fn drop(&mut self) {
        if self.owner.is_none() {
            T::detach(&self.state);
            self.store.freelist().defer(self.ptr);
        }
    }
}

impl<T: Native> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &T::KIND)
            .field("ptr", &self.ptr)
            .field("owning", &self.is_owning())
            .finish()
    }
}
