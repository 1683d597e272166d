//! Raw field access
//!
//! This is the only module that reads or writes value bytes through raw
//! addresses. Every operation is dispatched through a [`ValueOps`] table of
//! monomorphised shims, so copying out runs the field type's `Clone` (a real
//! retain for `Arc`, `String`, `Vec`, ...) and reinitialising runs the old
//! value's drop glue before moving the new value in.
//!
//! Callers must only pass addresses of initialised, properly aligned values
//! whose dynamic type is exactly the type the shim was built for.

use std::ptr;

use crate::identity::TypeIdentity;
use crate::value::{AnyStorage, ErasedValue, Reflectable};

/// Clone the value at an address into fresh boxed storage
pub type CloneBoxFn = unsafe fn(*const u8) -> Box<AnyStorage>;

/// Drop the value at an address and move an erased value into its place
///
/// Returns the erased value back untouched if its type does not match.
pub type WriteOverFn = unsafe fn(*mut u8, ErasedValue) -> Result<(), ErasedValue>;

/// Copy, destroy and move operations for one concrete type
#[derive(Debug, Clone, Copy)]
pub struct ValueOps {
    identity: TypeIdentity,
    size: usize,
    align: usize,
    clone_box: CloneBoxFn,
    write_over: WriteOverFn,
}

/// Generic clone shim for copying a value out through a function pointer
unsafe fn clone_box_shim<T: Reflectable>(src: *const u8) -> Box<AnyStorage> {
    Box::new((*src.cast::<T>()).clone())
}

/// Generic drop-then-move shim for reinitialising a value in place
unsafe fn write_over_shim<T: Reflectable>(dst: *mut u8, value: ErasedValue) -> Result<(), ErasedValue> {
    let value = value.try_take::<T>()?;
    let slot = dst.cast::<T>();
    ptr::drop_in_place(slot);
    ptr::write(slot, value);
    Ok(())
}

impl ValueOps {
    /// Operations table for `T`
    pub fn of<T: Reflectable>() -> Self {
        Self {
            identity: TypeIdentity::of::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            clone_box: clone_box_shim::<T>,
            write_over: write_over_shim::<T>,
        }
    }

    /// Type these operations act on
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.identity
    }

    /// Byte size of the type
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the type
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Clone the whole value at `src` into independently owned storage
    ///
    /// # Safety
    ///
    /// `src` must point to an initialised value of exactly this type.
    pub unsafe fn clone_whole(&self, src: *const u8) -> ErasedValue {
        ErasedValue::from_box(self.identity, (self.clone_box)(src))
    }

    /// Clone the whole value at `src` into a box that can still be mutated
    ///
    /// # Safety
    ///
    /// `src` must point to an initialised value of exactly this type.
    pub(crate) unsafe fn clone_boxed(&self, src: *const u8) -> Box<AnyStorage> {
        (self.clone_box)(src)
    }
}

/// How a field's bytes are interpreted
#[derive(Debug, Clone, Copy)]
pub enum FieldSlot {
    /// A field of one concrete type
    Typed(ValueOps),
    /// A field declared as [`ErasedValue`]; its dynamic type varies per instance
    Erased,
}

impl FieldSlot {
    /// Slot for a field of type `T`
    pub fn of<T: Reflectable>() -> Self {
        if TypeIdentity::of::<T>().is::<ErasedValue>() {
            FieldSlot::Erased
        } else {
            FieldSlot::Typed(ValueOps::of::<T>())
        }
    }

    /// Static type stored in the slot
    pub fn declared_identity(&self) -> TypeIdentity {
        match self {
            FieldSlot::Typed(ops) => ops.identity(),
            FieldSlot::Erased => TypeIdentity::of::<ErasedValue>(),
        }
    }

    /// Byte size of the slot
    pub fn size(&self) -> usize {
        match self {
            FieldSlot::Typed(ops) => ops.size(),
            FieldSlot::Erased => std::mem::size_of::<ErasedValue>(),
        }
    }

    /// Alignment the slot's offset must satisfy
    pub fn align(&self) -> usize {
        match self {
            FieldSlot::Typed(ops) => ops.align(),
            FieldSlot::Erased => std::mem::align_of::<ErasedValue>(),
        }
    }

    /// Copy the value at `address` out as an independently owned erased value
    ///
    /// For an erased slot the stored value is returned directly, sharing its
    /// storage, rather than wrapped a second time.
    ///
    /// # Safety
    ///
    /// `address` must point to an initialised, aligned value of the slot's type.
    pub unsafe fn copy_out(&self, address: *const u8) -> ErasedValue {
        match self {
            FieldSlot::Typed(ops) => ops.clone_whole(address),
            FieldSlot::Erased => (*address.cast::<ErasedValue>()).clone(),
        }
    }

    /// Destroy the value at `address` and move `value` into its place
    ///
    /// A typed slot rejects a value of any other type and hands it back
    /// without touching memory. An erased slot accepts any value.
    ///
    /// # Safety
    ///
    /// `address` must point to an initialised, aligned value of the slot's
    /// type, inside storage the caller has exclusive access to.
    pub unsafe fn reinitialize_in_place(
        &self,
        address: *mut u8,
        value: ErasedValue,
    ) -> Result<(), ErasedValue> {
        match self {
            FieldSlot::Typed(ops) => (ops.write_over)(address, value),
            FieldSlot::Erased => {
                let slot = address.cast::<ErasedValue>();
                ptr::drop_in_place(slot);
                ptr::write(slot, value);
                Ok(())
            }
        }
    }
}
