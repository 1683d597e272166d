//! Memory layout descriptors
//!
//! A [`LayoutDescriptor`] records the in-memory facts about one registered
//! type: byte size, kind, the ordered list of its *direct* fields and, for
//! classes, the descriptor of the embedded supertype. Descriptors are built
//! once per type by the registry and shared behind `Arc` afterwards.

use std::fmt;
use std::sync::Arc;

use crate::access::{FieldSlot, ValueOps};
use crate::error::{MirrorError, MirrorResult};
use crate::identity::TypeIdentity;
use crate::value::{AnyStorage, ErasedValue};

/// Safe typed view producing a value's direct field values in declaration order
pub type ChildrenView = fn(&AnyStorage) -> Vec<ErasedValue>;

/// Unwrap the payload of an optional wrapper, if present
pub type UnwrapFn = fn(&AnyStorage) -> Option<ErasedValue>;

/// Offset a field projection reaches inside a live value, `None` for a value of another type
pub type OffsetCheck = Arc<dyn Fn(&AnyStorage) -> Option<usize> + Send + Sync>;

/// Hand the supertype value embedded in a live value to a visitor
pub type EmbedAccess = Arc<dyn Fn(&AnyStorage, &mut dyn FnMut(&AnyStorage)) + Send + Sync>;

/// Projections recorded at registration, replayed against live values
///
/// Fields registered through a projection are only read by offset after the
/// projection has been seen to land at that offset in the value being read.
#[derive(Clone, Default)]
pub(crate) struct Placement {
    /// Direct field index and its projection
    pub(crate) fields: Vec<(usize, OffsetCheck)>,
    /// Projection of the embedded supertype
    pub(crate) embed: Option<(OffsetCheck, EmbedAccess)>,
}

impl fmt::Debug for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placement")
            .field("fields", &self.fields.len())
            .field("embed", &self.embed.is_some())
            .finish()
    }
}

/// Kind classification of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Struct with named fields
    Record,
    /// Tuple with positional (optionally labeled) elements
    Tuple,
    /// Struct that may embed a supertype
    Class,
    /// `Option<T>` around a registered type
    Optional,
    /// Anything without reflectable structure
    Opaque,
}

impl LayoutKind {
    /// Whether values of this kind are decomposed into fields
    pub fn is_product(self) -> bool {
        matches!(self, LayoutKind::Record | LayoutKind::Tuple | LayoutKind::Class)
    }
}

/// A named, typed slot at a byte offset inside its owner
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    ty: TypeIdentity,
    offset: usize,
    owner: TypeIdentity,
    slot: FieldSlot,
}

impl FieldDescriptor {
    pub(crate) fn new(name: String, offset: usize, owner: TypeIdentity, slot: FieldSlot) -> Self {
        Self {
            name,
            ty: slot.declared_identity(),
            offset,
            owner,
            slot,
        }
    }

    /// Field name (positional index for unlabeled tuple elements)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type stored in the field
    ///
    /// For an unresolved erased slot this is the identity of [`ErasedValue`]
    /// until the descriptor cache repairs it.
    #[inline]
    pub fn ty(&self) -> TypeIdentity {
        self.ty
    }

    /// Byte offset from the start of the value the descriptor was resolved against
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Type that declares the field
    #[inline]
    pub fn owner(&self) -> TypeIdentity {
        self.owner
    }

    /// How the field's bytes are read and written
    #[inline]
    pub fn slot(&self) -> &FieldSlot {
        &self.slot
    }

    /// Whether the field is an erased slot whose concrete type is not yet known
    pub fn is_unresolved(&self) -> bool {
        matches!(self.slot, FieldSlot::Erased) && self.ty.is::<ErasedValue>()
    }

    /// Whether `value` may be stored in this field
    pub fn accepts(&self, value: &ErasedValue) -> bool {
        self.is_unresolved() || value.identity() == self.ty
    }

    /// Copy of this descriptor with its offset shifted by `base`
    pub(crate) fn rebased(&self, base: usize) -> Self {
        Self {
            offset: self.offset + base,
            ..self.clone()
        }
    }

    /// Copy of this descriptor with the dynamic type recovered from an instance
    pub(crate) fn resolved_as(&self, ty: TypeIdentity) -> Self {
        Self { ty, ..self.clone() }
    }

    /// Same field: same declaring type and name
    ///
    /// Offsets are not compared, so a supertype's descriptor matches its
    /// rebased copy in a subclass.
    pub(crate) fn same_slot(&self, other: &FieldDescriptor) -> bool {
        self.owner == other.owner && self.name == other.name
    }
}

/// In-memory structure of one registered type
#[derive(Debug)]
pub struct LayoutDescriptor {
    pub(crate) owner: TypeIdentity,
    pub(crate) name: String,
    pub(crate) kind: LayoutKind,
    pub(crate) ops: ValueOps,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) supertype: Option<Arc<LayoutDescriptor>>,
    pub(crate) supertype_offset: usize,
    pub(crate) view: Option<ChildrenView>,
    pub(crate) unwrap: Option<UnwrapFn>,
    pub(crate) placement: Placement,
}

impl LayoutDescriptor {
    /// Type described
    #[inline]
    pub fn owner(&self) -> TypeIdentity {
        self.owner
    }

    /// Registered name of the type
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte size of a value
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.ops.size()
    }

    /// Kind classification
    #[inline]
    pub fn kind(&self) -> LayoutKind {
        self.kind
    }

    /// Value operations for the whole type
    #[inline]
    pub fn ops(&self) -> &ValueOps {
        &self.ops
    }

    /// Direct fields in declaration order
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Direct field by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Immediate supertype, for classes that embed one
    pub fn supertype(&self) -> Option<&Arc<LayoutDescriptor>> {
        self.supertype.as_ref()
    }

    /// Offset at which the supertype's storage is embedded
    pub fn supertype_offset(&self) -> usize {
        self.supertype_offset
    }

    /// Whether a safe children view is registered
    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    /// Types in the supertype chain, most derived first
    pub fn chain(&self) -> impl Iterator<Item = &LayoutDescriptor> {
        std::iter::successors(Some(self), |layout| layout.supertype.as_deref())
    }

    /// All fields of the supertype chain, base-most first, offsets relative to this type
    pub fn all_field_descriptors(&self) -> Vec<FieldDescriptor> {
        let mut all = match &self.supertype {
            Some(base) => base
                .all_field_descriptors()
                .iter()
                .map(|field| field.rebased(self.supertype_offset))
                .collect(),
            None => Vec::new(),
        };
        all.extend(self.fields.iter().cloned());
        all
    }

    /// A record whose only field is an erased slot covering the whole value
    ///
    /// Raw offset decoding is not used for this shape; reads go through the
    /// registered children view instead.
    pub fn is_erased_wrapper(&self) -> bool {
        match self.fields.as_slice() {
            [only] => {
                matches!(only.slot, FieldSlot::Erased)
                    && only.offset == 0
                    && self.byte_size() == std::mem::size_of::<ErasedValue>()
            }
            _ => false,
        }
    }

    /// Check every recorded projection of this type and its supertypes against `value`
    ///
    /// Must succeed before any field of `value` is read by offset.
    pub(crate) fn verify_placement(&self, value: &ErasedValue) -> MirrorResult<()> {
        if value.identity() != self.owner {
            return Err(MirrorError::Unreflectable {
                type_name: value.identity().name().to_string(),
            });
        }
        self.verify_storage(value.as_any())
    }

    fn verify_storage(&self, value: &AnyStorage) -> MirrorResult<()> {
        for (index, check) in &self.placement.fields {
            let field = &self.fields[*index];
            self.expect_offset(field.name(), field.offset, check(value))?;
        }

        let Some((check, access)) = &self.placement.embed else {
            return Ok(());
        };
        let Some(base) = &self.supertype else {
            return Ok(());
        };
        self.expect_offset(base.name(), self.supertype_offset, check(value))?;

        let mut verified = Ok(());
        access(value, &mut |inner: &AnyStorage| verified = base.verify_storage(inner));
        verified
    }

    fn expect_offset(&self, field: &str, declared: usize, measured: Option<usize>) -> MirrorResult<()> {
        match measured {
            Some(actual) if actual == declared => Ok(()),
            measured => Err(MirrorError::MisplacedField {
                owner: self.name.clone(),
                field: field.to_string(),
                declared,
                actual: measured.unwrap_or(usize::MAX),
            }),
        }
    }

    /// Safe general-reflection values of the direct fields, if a view is registered
    pub(crate) fn view_children(&self, subject: &ErasedValue) -> Option<Vec<ErasedValue>> {
        self.view.map(|view| view(subject.as_any()))
    }

    /// Payload of an optional wrapper
    pub(crate) fn unwrap_optional(&self, subject: &ErasedValue) -> Option<ErasedValue> {
        self.unwrap.and_then(|unwrap| unwrap(subject.as_any()))
    }
}
