//! Type registry
//!
//! Rust has no runtime reflection, so every type that should be reflected is
//! registered here explicitly: its kind, its direct fields with their
//! `offset_of!` offsets, the supertype it embeds (for classes), the
//! capabilities it conforms to, and an optional safe children view.
//!
//! A registry is assembled with [`TypeRegistryBuilder`] and frozen by
//! [`TypeRegistryBuilder::build`], which validates the whole set at once.
//! After that it is immutable and can be shared freely across threads.
//!
//! Fields are normally registered through a projection closure, which ties
//! the field's type to the struct at compile time and its offset to the
//! struct at run time: every value is checked against its projections before
//! any of its fields is read by offset. Registering a bare offset
//! ([`RecordBuilder::field`], [`ClassBuilder::extends`]) skips both checks
//! and is `unsafe`.
//!
//! ```rust,ignore
//! let mut builder = TypeRegistryBuilder::with_primitives();
//! builder.record::<Point>("Point", |r| {
//!     r.project("x", offset_of!(Point, x), |p| &p.x)
//!         .project("y", offset_of!(Point, y), |p| &p.y);
//! });
//! let registry = builder.build()?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::access::{FieldSlot, ValueOps};
use crate::error::{MirrorError, MirrorResult};
use crate::identity::{Capability, TypeIdentity};
use crate::layout::{
    ChildrenView, EmbedAccess, FieldDescriptor, LayoutDescriptor, LayoutKind, OffsetCheck, Placement, UnwrapFn,
};
use crate::value::{erase_field, AnyStorage, ErasedValue, Reflectable};

/// Registration record for one type
#[derive(Debug)]
struct TypeEntry {
    identity: TypeIdentity,
    name: String,
    kind: LayoutKind,
    ops: ValueOps,
    fields: Vec<FieldDescriptor>,
    /// Embedded supertype and the offset of its storage
    supertype: Option<(TypeIdentity, usize)>,
    view: Option<ChildrenView>,
    unwrap: Option<UnwrapFn>,
    placement: Placement,
    /// Descriptor, built on first use
    layout: OnceCell<Arc<LayoutDescriptor>>,
}

impl TypeEntry {
    fn new(identity: TypeIdentity, name: String, kind: LayoutKind, ops: ValueOps) -> Self {
        Self {
            identity,
            name,
            kind,
            ops,
            fields: Vec::new(),
            supertype: None,
            view: None,
            unwrap: None,
            placement: Placement::default(),
            layout: OnceCell::new(),
        }
    }
}

/// Field list under construction for a record or class `T`
pub struct RecordBuilder<T> {
    owner: TypeIdentity,
    fields: Vec<FieldDescriptor>,
    view: Option<ChildrenView>,
    capabilities: Vec<Capability>,
    checks: Vec<(usize, OffsetCheck)>,
    _marker: PhantomData<fn(&T)>,
}

/// Offset `project` reaches inside a live `T`
fn offset_check<T: Reflectable, F: 'static>(project: fn(&T) -> &F) -> OffsetCheck {
    Arc::new(move |value: &AnyStorage| {
        let value = value.downcast_ref::<T>()?;
        let base = (value as *const T).cast::<u8>();
        let field = (project(value) as *const F).cast::<u8>();
        Some((field as usize).wrapping_sub(base as usize))
    })
}

impl<T: Reflectable> RecordBuilder<T> {
    fn new() -> Self {
        Self {
            owner: TypeIdentity::of::<T>(),
            fields: Vec::new(),
            view: None,
            capabilities: Vec::new(),
            checks: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a field of type `F` at `offset`, unchecked
    ///
    /// Prefer [`project`](Self::project).
    ///
    /// # Safety
    ///
    /// In every value of `T`, the bytes at `offset` must hold an initialised
    /// `F` that is part of the value itself, e.g. `offset` comes from
    /// `offset_of!(T, field)` and `F` is that field's type.
    pub unsafe fn field<F: Reflectable>(&mut self, name: &str, offset: usize) -> &mut Self {
        self.push_field::<F>(name, offset);
        self
    }

    /// Add a field at `offset`, typed and located by a projection
    ///
    /// The field's type is `F`, the projection's result. Values are checked
    /// before they are read: if the projection does not land at `offset`,
    /// mirroring the value fails with [`MirrorError::MisplacedField`].
    pub fn project<F: Reflectable>(&mut self, name: &str, offset: usize, project: fn(&T) -> &F) -> &mut Self {
        let index = self.push_field::<F>(name, offset);
        self.checks.push((index, offset_check(project)));
        self
    }

    fn push_field<F: Reflectable>(&mut self, name: &str, offset: usize) -> usize {
        self.fields
            .push(FieldDescriptor::new(name.to_string(), offset, self.owner, FieldSlot::of::<F>()));
        self.fields.len() - 1
    }

    /// Register the safe children view used for general reflection
    pub fn view(&mut self, view: ChildrenView) -> &mut Self {
        self.view = Some(view);
        self
    }

    /// Declare that `T` conforms to capability `C`
    pub fn conforms<C: ?Sized + 'static>(&mut self) -> &mut Self {
        self.capabilities.push(Capability::of::<C>());
        self
    }
}

/// Field list and supertype under construction for a class `T`
pub struct ClassBuilder<T> {
    record: RecordBuilder<T>,
    supertype: Option<(TypeIdentity, usize)>,
    embed: Option<(OffsetCheck, EmbedAccess)>,
}

impl<T: Reflectable> ClassBuilder<T> {
    /// Embed the storage of class `B` at `offset` as the immediate supertype, unchecked
    ///
    /// Prefer [`extends_via`](Self::extends_via).
    ///
    /// # Safety
    ///
    /// In every value of `T`, the bytes at `offset` must hold an initialised
    /// `B` that is part of the value itself.
    pub unsafe fn extends<B: 'static>(&mut self, offset: usize) -> &mut Self {
        self.supertype = Some((TypeIdentity::of::<B>(), offset));
        self.embed = None;
        self
    }

    /// Embed class `B` at `offset` as the immediate supertype, located by a projection
    ///
    /// Checked against every value like [`RecordBuilder::project`]; the
    /// supertype's own projections are replayed on the embedded value.
    pub fn extends_via<B: Reflectable>(&mut self, offset: usize, project: fn(&T) -> &B) -> &mut Self {
        let access: EmbedAccess = Arc::new(move |value: &AnyStorage, visit: &mut dyn FnMut(&AnyStorage)| {
            if let Some(value) = value.downcast_ref::<T>() {
                visit(project(value));
            }
        });
        self.supertype = Some((TypeIdentity::of::<B>(), offset));
        self.embed = Some((offset_check(project), access));
        self
    }

    /// Add a field of type `F` at `offset`, unchecked
    ///
    /// # Safety
    ///
    /// Same contract as [`RecordBuilder::field`].
    pub unsafe fn field<F: Reflectable>(&mut self, name: &str, offset: usize) -> &mut Self {
        self.record.push_field::<F>(name, offset);
        self
    }

    /// Add a field at `offset`, taking its type from a projection closure
    pub fn project<F: Reflectable>(&mut self, name: &str, offset: usize, project: fn(&T) -> &F) -> &mut Self {
        self.record.project(name, offset, project);
        self
    }

    /// Register the safe children view for the class's direct fields
    pub fn view(&mut self, view: ChildrenView) -> &mut Self {
        self.record.view(view);
        self
    }

    /// Declare that `T` conforms to capability `C`
    pub fn conforms<C: ?Sized + 'static>(&mut self) -> &mut Self {
        self.record.conforms::<C>();
        self
    }
}

/// Tuples whose element layout can be registered
///
/// # Safety
///
/// Each `(slot, offset)` from [`elements`](Self::elements) must describe an
/// initialised element of exactly the slot's type at that offset.
pub unsafe trait TupleLayout: Reflectable {
    /// Element slots and offsets, in declaration order
    fn elements() -> Vec<(FieldSlot, usize)>;

    /// Element values of a tuple, in declaration order
    fn children(value: &AnyStorage) -> Vec<ErasedValue>;
}

macro_rules! impl_tuple_layout {
    ($($name:ident . $idx:tt),+) => {
        // SAFETY: slots and offsets both come from the tuple's own element types.
        unsafe impl<$($name: Reflectable),+> TupleLayout for ($($name,)+) {
            fn elements() -> Vec<(FieldSlot, usize)> {
                vec![$((FieldSlot::of::<$name>(), std::mem::offset_of!(Self, $idx))),+]
            }

            fn children(value: &AnyStorage) -> Vec<ErasedValue> {
                match value.downcast_ref::<Self>() {
                    Some(tuple) => vec![$(erase_field(&tuple.$idx)),+],
                    None => Vec::new(),
                }
            }
        }
    };
}

impl_tuple_layout!(A.0);
impl_tuple_layout!(A.0, B.1);
impl_tuple_layout!(A.0, B.1, C.2);
impl_tuple_layout!(A.0, B.1, C.2, D.3);
impl_tuple_layout!(A.0, B.1, C.2, D.3, E.4);
impl_tuple_layout!(A.0, B.1, C.2, D.3, E.4, F.5);
impl_tuple_layout!(A.0, B.1, C.2, D.3, E.4, F.5, G.6);
impl_tuple_layout!(A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);

/// Whether `size` bytes at `offset` lie inside an `owner_size`-byte value
fn fits(offset: usize, size: usize, owner_size: usize) -> bool {
    offset.checked_add(size).is_some_and(|end| end <= owner_size)
}

/// Payload of an `Option<T>`
fn unwrap_option_shim<T: Reflectable>(value: &AnyStorage) -> Option<ErasedValue> {
    value.downcast_ref::<Option<T>>()?.as_ref().map(erase_field)
}

/// Builder for a [`TypeRegistry`]
///
/// Registration calls never fail on their own; problems are collected and
/// the first one is reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    entries: Vec<TypeEntry>,
    index: FxHashMap<TypeIdentity, usize>,
    name_to_id: FxHashMap<String, usize>,
    conformances: FxHashMap<TypeIdentity, FxHashSet<Capability>>,
    errors: Vec<MirrorError>,
}

macro_rules! register_primitives {
    ($builder:expr; $($ty:ty => $name:literal),+ $(,)?) => {
        $( $builder.opaque::<$ty>($name); )+
    };
}

impl TypeRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with the primitive types registered as opaque
    pub fn with_primitives() -> Self {
        let mut builder = Self::new();
        register_primitives!(builder;
            bool => "bool",
            char => "char",
            i8 => "i8",
            i16 => "i16",
            i32 => "i32",
            i64 => "i64",
            i128 => "i128",
            isize => "isize",
            u8 => "u8",
            u16 => "u16",
            u32 => "u32",
            u64 => "u64",
            u128 => "u128",
            usize => "usize",
            f32 => "f32",
            f64 => "f64",
            String => "String",
            &'static str => "str",
        );
        builder
    }

    /// Register `T` as a type without reflectable structure
    pub fn opaque<T: Reflectable>(&mut self, name: &str) -> &mut Self {
        let entry = TypeEntry::new(TypeIdentity::of::<T>(), name.to_string(), LayoutKind::Opaque, ValueOps::of::<T>());
        self.insert(entry);
        self
    }

    /// Register `T` as a record and describe its fields
    pub fn record<T: Reflectable>(&mut self, name: &str, describe: impl FnOnce(&mut RecordBuilder<T>)) -> &mut Self {
        let mut record = RecordBuilder::<T>::new();
        describe(&mut record);
        self.finish_struct(name, LayoutKind::Record, record, None, None);
        self
    }

    /// Register `T` as a class and describe its fields and supertype
    pub fn class<T: Reflectable>(&mut self, name: &str, describe: impl FnOnce(&mut ClassBuilder<T>)) -> &mut Self {
        let mut class = ClassBuilder {
            record: RecordBuilder::<T>::new(),
            supertype: None,
            embed: None,
        };
        describe(&mut class);
        self.finish_struct(name, LayoutKind::Class, class.record, class.supertype, class.embed);
        self
    }

    /// Register the tuple type `T`
    ///
    /// Elements take their label from `labels` by position; missing or empty
    /// labels fall back to the element's index.
    pub fn tuple<T: TupleLayout>(&mut self, name: &str, labels: &[&str]) -> &mut Self {
        let owner = TypeIdentity::of::<T>();
        let mut entry = TypeEntry::new(owner, name.to_string(), LayoutKind::Tuple, ValueOps::of::<T>());
        entry.fields = T::elements()
            .into_iter()
            .enumerate()
            .map(|(position, (slot, offset))| {
                let label = match labels.get(position) {
                    Some(label) if !label.is_empty() => label.to_string(),
                    _ => position.to_string(),
                };
                FieldDescriptor::new(label, offset, owner, slot)
            })
            .collect();
        entry.view = Some(T::children);
        if self.insert(entry) {
            self.optional_named::<T>(name);
        }
        self
    }

    /// Register `Option<T>` as an optional wrapper around `T`
    ///
    /// Records, classes and tuples get their optional wrapper registered
    /// automatically; this is for wrapping other types.
    pub fn optional<T: Reflectable>(&mut self) -> &mut Self {
        let inner = TypeIdentity::of::<T>();
        let name = match self.index.get(&inner) {
            Some(&id) => self.entries[id].name.clone(),
            None => inner.name().to_string(),
        };
        self.optional_named::<T>(&name);
        self
    }

    /// Declare that `T` conforms to capability `C`
    ///
    /// `T` does not need to be registered for its conformance to be recorded.
    pub fn conform<T: ?Sized + 'static, C: ?Sized + 'static>(&mut self) -> &mut Self {
        self.conformances
            .entry(TypeIdentity::of::<T>())
            .or_default()
            .insert(Capability::of::<C>());
        self
    }

    /// Validate the registrations and freeze them
    pub fn build(self) -> MirrorResult<TypeRegistry> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let registry = TypeRegistry {
            entries: self.entries,
            index: self.index,
            name_to_id: self.name_to_id,
            conformances: self.conformances,
        };
        registry.validate_hierarchy()?;

        debug!(
            types = registry.entries.len(),
            conformances = registry.conformances.len(),
            "type registry built"
        );
        Ok(registry)
    }

    fn finish_struct<T: Reflectable>(
        &mut self,
        name: &str,
        kind: LayoutKind,
        record: RecordBuilder<T>,
        supertype: Option<(TypeIdentity, usize)>,
        embed: Option<(OffsetCheck, EmbedAccess)>,
    ) {
        let mut entry = TypeEntry::new(record.owner, name.to_string(), kind, ValueOps::of::<T>());
        entry.fields = record.fields;
        entry.view = record.view;
        entry.supertype = supertype;
        entry.placement = Placement {
            fields: record.checks,
            embed,
        };

        for capability in record.capabilities {
            self.conformances.entry(record.owner).or_default().insert(capability);
        }
        if self.insert(entry) {
            self.optional_named::<T>(name);
        }
    }

    fn optional_named<T: Reflectable>(&mut self, inner_name: &str) {
        let identity = TypeIdentity::of::<Option<T>>();
        let name = format!("Option<{inner_name}>");
        if self.index.contains_key(&identity) || self.name_to_id.contains_key(&name) {
            return;
        }
        let mut entry = TypeEntry::new(identity, name, LayoutKind::Optional, ValueOps::of::<Option<T>>());
        entry.unwrap = Some(unwrap_option_shim::<T>);
        self.insert(entry);
    }

    /// Add an entry, recording an error instead if it is a duplicate or malformed
    fn insert(&mut self, entry: TypeEntry) -> bool {
        if self.index.contains_key(&entry.identity) || self.name_to_id.contains_key(&entry.name) {
            self.errors.push(MirrorError::DuplicateType { name: entry.name });
            return false;
        }

        let size = entry.ops.size();
        for field in &entry.fields {
            let slot = field.slot();
            if !fits(field.offset(), slot.size(), size) {
                self.errors.push(MirrorError::FieldOutOfBounds {
                    owner: entry.name.clone(),
                    field: field.name().to_string(),
                    offset: field.offset(),
                    size: slot.size(),
                    owner_size: size,
                });
                return false;
            }
            if field.offset() % slot.align() != 0 {
                self.errors.push(MirrorError::MisalignedField {
                    owner: entry.name.clone(),
                    field: field.name().to_string(),
                    offset: field.offset(),
                    align: slot.align(),
                });
                return false;
            }
        }

        let id = self.entries.len();
        self.index.insert(entry.identity, id);
        self.name_to_id.insert(entry.name.clone(), id);
        self.entries.push(entry);
        true
    }
}

/// Frozen set of registered types
#[derive(Debug)]
pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    index: FxHashMap<TypeIdentity, usize>,
    name_to_id: FxHashMap<String, usize>,
    conformances: FxHashMap<TypeIdentity, FxHashSet<Capability>>,
}

impl TypeRegistry {
    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if a type is registered
    pub fn contains(&self, ty: TypeIdentity) -> bool {
        self.index.contains_key(&ty)
    }

    /// Resolve a type by its registered name
    pub fn type_named(&self, name: &str) -> Option<TypeIdentity> {
        self.name_to_id.get(name).map(|&id| self.entries[id].identity)
    }

    /// Registered name of a type
    pub fn name_of(&self, ty: TypeIdentity) -> Option<&str> {
        self.index.get(&ty).map(|&id| self.entries[id].name.as_str())
    }

    /// Kind of a registered type
    pub fn kind_of(&self, ty: TypeIdentity) -> Option<LayoutKind> {
        self.index.get(&ty).map(|&id| self.entries[id].kind)
    }

    /// Whether values of this type can be mirrored and descended into
    pub fn is_reflectable(&self, ty: TypeIdentity) -> bool {
        self.kind_of(ty)
            .is_some_and(|kind| kind.is_product() || kind == LayoutKind::Optional)
    }

    /// Whether `ty` conforms to `capability`
    pub fn conforms_to(&self, ty: TypeIdentity, capability: Capability) -> bool {
        self.conformances
            .get(&ty)
            .is_some_and(|capabilities| capabilities.contains(&capability))
    }

    /// Layout descriptor of a registered type
    ///
    /// Built on first request and shared afterwards; supertype descriptors are
    /// the same `Arc`s handed out for the supertypes themselves.
    pub fn describe(&self, ty: TypeIdentity) -> Option<Arc<LayoutDescriptor>> {
        self.index.get(&ty).map(|&id| self.describe_entry(id))
    }

    /// Iterate over registered type identities with their names
    pub fn iter(&self) -> impl Iterator<Item = (TypeIdentity, &str)> {
        self.entries.iter().map(|entry| (entry.identity, entry.name.as_str()))
    }

    fn describe_entry(&self, id: usize) -> Arc<LayoutDescriptor> {
        let entry = &self.entries[id];
        entry
            .layout
            .get_or_init(|| {
                let (supertype, supertype_offset) = match entry.supertype {
                    Some((base, offset)) => (self.describe(base), offset),
                    None => (None, 0),
                };
                trace!(name = %entry.name, kind = ?entry.kind, fields = entry.fields.len(), "describing type");
                Arc::new(LayoutDescriptor {
                    owner: entry.identity,
                    name: entry.name.clone(),
                    kind: entry.kind,
                    ops: entry.ops,
                    fields: entry.fields.clone(),
                    supertype,
                    supertype_offset,
                    view: entry.view,
                    unwrap: entry.unwrap,
                    placement: entry.placement.clone(),
                })
            })
            .clone()
    }

    /// Every supertype is a registered class that fits inside its subclass,
    /// and no class reaches itself through its supertype chain
    fn validate_hierarchy(&self) -> MirrorResult<()> {
        for entry in &self.entries {
            let Some((base, offset)) = entry.supertype else {
                continue;
            };
            let Some(&base_id) = self.index.get(&base) else {
                return Err(MirrorError::UnknownSupertype {
                    class: entry.name.clone(),
                    supertype: base.name().to_string(),
                });
            };
            let base_entry = &self.entries[base_id];
            if base_entry.kind != LayoutKind::Class {
                return Err(MirrorError::SupertypeNotClass {
                    class: entry.name.clone(),
                    supertype: base_entry.name.clone(),
                });
            }
            if !fits(offset, base_entry.ops.size(), entry.ops.size()) {
                return Err(MirrorError::FieldOutOfBounds {
                    owner: entry.name.clone(),
                    field: base_entry.name.clone(),
                    offset,
                    size: base_entry.ops.size(),
                    owner_size: entry.ops.size(),
                });
            }
            if offset % base_entry.ops.align() != 0 {
                return Err(MirrorError::MisalignedField {
                    owner: entry.name.clone(),
                    field: base_entry.name.clone(),
                    offset,
                    align: base_entry.ops.align(),
                });
            }

            let mut seen = FxHashSet::default();
            seen.insert(entry.identity);
            let mut next = Some(base);
            while let Some(current) = next {
                if !seen.insert(current) {
                    return Err(MirrorError::CyclicHierarchy {
                        class: entry.name.clone(),
                    });
                }
                next = self
                    .index
                    .get(&current)
                    .and_then(|&id| self.entries[id].supertype)
                    .map(|(ty, _)| ty);
            }
        }
        Ok(())
    }
}
