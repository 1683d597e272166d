//! Type identities
//!
//! A [`TypeIdentity`] is a handle to "a type". Two identities are equal
//! exactly when they denote the same Rust type: comparison and hashing use
//! the [`TypeId`] only, never the shape of the type, so two distinct structs
//! with identical field layouts are different identities.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity handle for a runtime type
#[derive(Clone, Copy)]
pub struct TypeIdentity {
    /// Underlying type handle (the only thing compared or hashed)
    id: TypeId,
    /// Compiler-provided type name, for diagnostics
    name: &'static str,
}

impl TypeIdentity {
    /// Identity of the static type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Identity of the type of `value`
    ///
    /// For a concrete value this is its exact type. For type-erased values use
    /// [`ErasedValue::identity`](crate::ErasedValue::identity), which reports
    /// the dynamic type.
    #[inline]
    pub fn of_val<T: Any>(_value: &T) -> Self {
        Self::of::<T>()
    }

    /// The raw type handle
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Compiler-provided name of the type
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether this identity denotes `T`
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeIdentity {}

impl Hash for TypeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIdentity({})", self.name)
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A capability that registered types may conform to
///
/// Capabilities are keyed by the identity of any `'static` type, usually a
/// trait object such as `dyn Validate`. Conformance is not derived from the
/// trait system; it is declared when the type is registered.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability(TypeIdentity);

impl Capability {
    /// Capability keyed by `C`
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self(TypeIdentity::of::<C>())
    }

    /// Name of the capability key type
    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.0.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[derive(Clone)]
    struct Left {
        _a: u32,
        _b: u32,
    }

    #[derive(Clone)]
    struct Right {
        _a: u32,
        _b: u32,
    }

    trait Marker {}

    #[test]
    fn test_identity_equality() {
        assert_eq!(TypeIdentity::of::<u32>(), TypeIdentity::of::<u32>());
        assert_ne!(TypeIdentity::of::<u32>(), TypeIdentity::of::<i32>());
    }

    #[test]
    fn test_same_layout_different_types() {
        assert_ne!(TypeIdentity::of::<Left>(), TypeIdentity::of::<Right>());
    }

    #[test]
    fn test_of_val() {
        let left = Left { _a: 1, _b: 2 };
        assert_eq!(TypeIdentity::of_val(&left), TypeIdentity::of::<Left>());
        assert!(TypeIdentity::of_val(&7u8).is::<u8>());
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let mut set = FxHashSet::default();
        set.insert(TypeIdentity::of::<String>());
        set.insert(TypeIdentity::of::<String>());
        set.insert(TypeIdentity::of::<&'static str>());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_capability_keys() {
        assert_eq!(Capability::of::<dyn Marker>(), Capability::of::<dyn Marker>());
        assert_ne!(Capability::of::<dyn Marker>(), Capability::of::<Left>());
        assert!(Capability::of::<dyn Marker>().name().contains("Marker"));
    }
}
