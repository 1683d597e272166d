//! Type-erased values
//!
//! An [`ErasedValue`] hides the static type of a value and carries only its
//! dynamic [`TypeIdentity`]. Storage is reference counted: cloning an erased
//! value shares the storage, so a mutation through a mirror must never write
//! into storage that another holder can still observe.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::identity::TypeIdentity;

/// Storage behind an erased value
pub type AnyStorage = dyn Any + Send + Sync;

/// Bound satisfied by every value that can be read or written through a mirror
pub trait Reflectable: Any + Clone + Send + Sync {}

impl<T: Any + Clone + Send + Sync> Reflectable for T {}

/// A value whose static type has been hidden
#[derive(Clone)]
pub struct ErasedValue {
    /// Dynamic type of the stored value
    identity: TypeIdentity,
    /// Shared storage
    storage: Arc<AnyStorage>,
}

impl ErasedValue {
    /// Erase a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            identity: TypeIdentity::of::<T>(),
            storage: Arc::new(value),
        }
    }

    /// Wrap storage produced by a value-operations shim
    pub(crate) fn from_box(identity: TypeIdentity, storage: Box<AnyStorage>) -> Self {
        Self {
            identity,
            storage: Arc::from(storage),
        }
    }

    /// Dynamic type of the value
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.identity
    }

    /// Check whether the value is a `T`
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.identity.is::<T>()
    }

    /// Borrow the value as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.storage.downcast_ref::<T>()
    }

    /// Take the value out as a `T`
    ///
    /// Moves the value out when this is the only holder of the storage and
    /// clones it otherwise. Returns `self` unchanged on a type mismatch.
    pub fn try_take<T: Reflectable>(self) -> Result<T, ErasedValue> {
        let identity = self.identity;
        match self.storage.downcast::<T>() {
            Ok(typed) => Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone())),
            Err(storage) => Err(ErasedValue { identity, storage }),
        }
    }

    /// Borrow the value as `dyn Any`
    #[inline]
    pub fn as_any(&self) -> &AnyStorage {
        &*self.storage
    }

    /// Check whether another holder shares this value's storage
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.storage) > 1 || Arc::weak_count(&self.storage) > 0
    }

    /// Check whether two erased values share the same storage
    pub fn shares_storage_with(&self, other: &ErasedValue) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.storage), Arc::as_ptr(&other.storage))
    }

    /// Address of the first byte of the stored value
    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u8 {
        Arc::as_ptr(&self.storage).cast::<u8>()
    }

    /// Writable address of the stored value, if no other holder exists
    pub(crate) fn unique_mut_ptr(&mut self) -> Option<*mut u8> {
        Arc::get_mut(&mut self.storage).map(|value| (value as *mut AnyStorage).cast::<u8>())
    }
}

/// Erase a field value read through a safe typed view
///
/// A field that already holds an [`ErasedValue`] is returned as-is (sharing
/// its storage) instead of being wrapped a second time.
pub fn erase_field<T: Reflectable>(value: &T) -> ErasedValue {
    match (value as &dyn Any).downcast_ref::<ErasedValue>() {
        Some(erased) => erased.clone(),
        None => ErasedValue::new(value.clone()),
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErasedValue({})", self.identity.name())
    }
}
