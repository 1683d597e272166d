//! Instance mirrors
//!
//! An [`InstanceMirror`] pairs a type-erased value with the layout of its
//! dynamic type and gives generic read and write access to the value's
//! fields, including the fields of embedded supertypes.
//!
//! Writes never touch storage another holder can observe. Unless the mirror
//! is the only holder of its subject (and the reflector allows in-place
//! mutation), a write clones the whole subject, reinitialises the field
//! inside the clone and publishes the clone as the new subject.
//!
//! Misuse (an unknown field name, a value of the wrong type, a descriptor
//! from another type) is reported by the `try_*` methods as an error. The
//! plain methods treat it as a bug: it is logged and then panics.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::cache::FieldTable;
use crate::error::{MirrorError, MirrorResult};
use crate::identity::TypeIdentity;
use crate::layout::{FieldDescriptor, LayoutDescriptor, LayoutKind};
use crate::reflector::Reflector;
use crate::value::{AnyStorage, ErasedValue, Reflectable};

/// A live pairing of a value with its layout
#[derive(Debug, Clone)]
pub struct InstanceMirror {
    reflector: Reflector,
    subject: ErasedValue,
    layout: Arc<LayoutDescriptor>,
    table: Arc<FieldTable>,
}

#[track_caller]
fn report_misuse(err: MirrorError) -> ! {
    error!(%err, "reflection misuse");
    panic!("{err}");
}

impl InstanceMirror {
    /// Mirror `value`, unwrapping optional wrappers
    ///
    /// Returns `None` for an absent optional (including a `None` class
    /// reference), for opaque values, and for values whose type was never
    /// registered; the last is logged as a warning. A value whose registered
    /// projections do not land at their registered offsets is logged as an
    /// error and also gives `None`; [`reflecting`](Self::reflecting) reports it.
    pub fn new(reflector: &Reflector, value: ErasedValue) -> Option<Self> {
        match Self::build(reflector, value) {
            Ok(mirror) => mirror,
            Err(err) => {
                error!(%err, "value does not match its registered layout");
                None
            }
        }
    }

    fn build(reflector: &Reflector, value: ErasedValue) -> MirrorResult<Option<Self>> {
        let Some(layout) = reflector.registry().describe(value.identity()) else {
            warn!(ty = %value.identity(), "no layout registered, value cannot be mirrored");
            return Ok(None);
        };

        match layout.kind() {
            LayoutKind::Optional => {
                return match layout.unwrap_optional(&value) {
                    Some(payload) => Self::build(reflector, payload),
                    None => Ok(None),
                };
            }
            LayoutKind::Opaque => {
                debug!(ty = %layout.name(), "opaque value has no fields to mirror");
                return Ok(None);
            }
            LayoutKind::Record | LayoutKind::Tuple | LayoutKind::Class => {}
        }

        layout.verify_placement(&value)?;
        let table = reflector.cache().ensure_cached(&layout, Some(&value));
        Ok(Some(Self {
            reflector: reflector.clone(),
            subject: value,
            layout,
            table,
        }))
    }

    /// Mirror `value`, or fail with the name of the type that cannot be reflected
    ///
    /// When the value is an erased value nested inside another erased value,
    /// the inner value is tried as well before giving up. A value that does
    /// not match its registered layout fails with that mismatch.
    pub fn reflecting(reflector: &Reflector, value: ErasedValue) -> MirrorResult<Self> {
        if let Some(mirror) = Self::build(reflector, value.clone())? {
            return Ok(mirror);
        }

        if reflector.config().retry_boxed {
            if let Some(inner) = value.downcast_ref::<ErasedValue>() {
                if let Some(mirror) = Self::build(reflector, inner.clone())? {
                    return Ok(mirror);
                }
            }
        }

        let identity = value.identity();
        let type_name = reflector
            .registry()
            .name_of(identity)
            .unwrap_or(identity.name())
            .to_string();
        Err(MirrorError::Unreflectable { type_name })
    }

    /// The reflector this mirror was created from
    pub fn reflector(&self) -> &Reflector {
        &self.reflector
    }

    /// Current value
    pub fn subject(&self) -> &ErasedValue {
        &self.subject
    }

    /// Give up the mirror and keep the current value
    pub fn into_subject(self) -> ErasedValue {
        self.subject
    }

    /// Dynamic type of the subject
    pub fn identity(&self) -> TypeIdentity {
        self.subject.identity()
    }

    /// Layout of the subject's type
    pub fn layout(&self) -> &Arc<LayoutDescriptor> {
        &self.layout
    }

    /// Layout of the immediate supertype, for classes that embed one
    pub fn supertype(&self) -> Option<&Arc<LayoutDescriptor>> {
        self.layout.supertype()
    }

    /// Fields declared by the subject's own type
    pub fn field_descriptors(&self) -> &[FieldDescriptor] {
        self.table.direct()
    }

    /// Fields of the whole supertype chain, base-most first
    pub fn all_field_descriptors(&self) -> &[FieldDescriptor] {
        self.table.all()
    }

    /// Field descriptor by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.table.get(name)
    }

    /// Direct fields with their current values, in declaration order
    pub fn children(&self) -> impl Iterator<Item = (&str, ErasedValue)> + '_ {
        self.table
            .direct()
            .iter()
            .map(move |field| (field.name(), self.read(field)))
    }

    /// Fields of the whole supertype chain with their values, base-most first
    pub fn all_children(&self) -> impl Iterator<Item = (&str, ErasedValue)> + '_ {
        self.table
            .all()
            .iter()
            .map(move |field| (field.name(), self.read(field)))
    }

    /// Read a field
    ///
    /// `field` may come from this mirror, from another mirror of the same
    /// type, or from the layout of any type in the subject's supertype chain;
    /// it is matched by owner and name, never by its own offset.
    pub fn try_get(&self, field: &FieldDescriptor) -> MirrorResult<ErasedValue> {
        let field = self.resolve(field)?;
        Ok(self.read(field))
    }

    /// Read a field; panics if it does not belong to the subject's type
    #[track_caller]
    pub fn get(&self, field: &FieldDescriptor) -> ErasedValue {
        match self.try_get(field) {
            Ok(value) => value,
            Err(err) => report_misuse(err),
        }
    }

    /// Read a field by name
    pub fn try_get_named(&self, name: &str) -> MirrorResult<ErasedValue> {
        let field = self.lookup(name)?;
        Ok(self.read(field))
    }

    /// Read a field by name; panics on an unknown name
    #[track_caller]
    pub fn get_named(&self, name: &str) -> ErasedValue {
        match self.try_get_named(name) {
            Ok(value) => value,
            Err(err) => report_misuse(err),
        }
    }

    /// Read a field by name as a `T`
    ///
    /// Returns `None` if the name is unknown or the field holds another type.
    pub fn get_as<T: Reflectable>(&self, name: &str) -> Option<T> {
        self.try_get_named(name).ok()?.try_take().ok()
    }

    /// Write a field
    ///
    /// `field` is matched like in [`try_get`](Self::try_get).
    pub fn try_set(&mut self, field: &FieldDescriptor, value: ErasedValue) -> MirrorResult<()> {
        let field = self.resolve(field)?.clone();
        self.write(&field, value)
    }

    /// Write a field; panics on a foreign field or a value of the wrong type
    #[track_caller]
    pub fn set(&mut self, field: &FieldDescriptor, value: ErasedValue) {
        if let Err(err) = self.try_set(field, value) {
            report_misuse(err);
        }
    }

    /// Write a field by name
    pub fn try_set_named(&mut self, name: &str, value: ErasedValue) -> MirrorResult<()> {
        let field = self.lookup(name)?.clone();
        self.write(&field, value)
    }

    /// Write a field by name; panics on an unknown name or a value of the wrong type
    #[track_caller]
    pub fn set_named(&mut self, name: &str, value: ErasedValue) {
        if let Err(err) = self.try_set_named(name, value) {
            report_misuse(err);
        }
    }

    fn lookup(&self, name: &str) -> MirrorResult<&FieldDescriptor> {
        self.table.get(name).ok_or_else(|| MirrorError::UnknownField {
            type_name: self.layout.name().to_string(),
            field: name.to_string(),
        })
    }

    /// The table's copy of `field`, which carries the repaired type and rebased offset
    ///
    /// A supertype's descriptor still carries the offset inside the
    /// supertype, so matching is by owner and name.
    fn resolve(&self, field: &FieldDescriptor) -> MirrorResult<&FieldDescriptor> {
        self.table
            .all()
            .iter()
            .find(|candidate| candidate.same_slot(field))
            .ok_or_else(|| MirrorError::ForeignField {
                field: field.name().to_string(),
                owner: field.owner().name().to_string(),
                type_name: self.layout.name().to_string(),
            })
    }

    fn read(&self, field: &FieldDescriptor) -> ErasedValue {
        // A lone erased slot spanning the whole value is read through the
        // typed view rather than by offset.
        if self.layout.is_erased_wrapper() && field.owner() == self.layout.owner() {
            if let Some(mut children) = self.layout.view_children(&self.subject) {
                if children.len() == 1 {
                    return children.swap_remove(0);
                }
            }
        }

        // SAFETY: `field` comes from the table of the subject's own type and
        // the subject passed that type's placement checks, so its offset and
        // slot describe initialised bytes inside the subject.
        unsafe { field.slot().copy_out(self.subject.as_ptr().add(field.offset())) }
    }

    fn write(&mut self, field: &FieldDescriptor, value: ErasedValue) -> MirrorResult<()> {
        if !field.accepts(&value) {
            return Err(mismatch(field, &value));
        }

        if self.reflector.config().mutate_unique_in_place {
            if let Some(base) = self.subject.unique_mut_ptr() {
                // SAFETY: no other holder can observe the subject's storage,
                // and the field lies inside it.
                return unsafe { field.slot().reinitialize_in_place(base.add(field.offset()), value) }
                    .map_err(|rejected| mismatch(field, &rejected));
            }
        }

        let ops = *self.layout.ops();
        // SAFETY: the subject is a value of exactly the layout's type.
        let mut copy = unsafe { ops.clone_boxed(self.subject.as_ptr()) };
        let base = (&mut *copy as *mut AnyStorage).cast::<u8>();
        // SAFETY: `copy` is a fresh, exclusively owned clone of the subject.
        let written = unsafe { field.slot().reinitialize_in_place(base.add(field.offset()), value) };
        written.map_err(|rejected| mismatch(field, &rejected))?;

        self.subject = ErasedValue::from_box(ops.identity(), copy);
        Ok(())
    }
}

fn mismatch(field: &FieldDescriptor, value: &ErasedValue) -> MirrorError {
    MirrorError::FieldTypeMismatch {
        field: field.name().to_string(),
        expected: field.ty().name().to_string(),
        found: value.identity().name().to_string(),
    }
}
