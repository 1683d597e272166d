//! Descriptor cache
//!
//! Maps each type to its [`FieldTable`]: every field of the type and its
//! supertype chain, base-most first, with offsets relative to the type and
//! with erased slots repaired to the dynamic type observed in one live
//! instance.
//!
//! All reads and writes go through one mutex. Tables are computed before the
//! lock is taken and inserted only if absent, so a table is never replaced
//! once published and no reflection work runs while the lock is held.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::identity::TypeIdentity;
use crate::layout::{FieldDescriptor, LayoutDescriptor};
use crate::value::ErasedValue;

/// All fields of one type, in base-to-derived order, addressable by name
#[derive(Debug)]
pub struct FieldTable {
    owner: TypeIdentity,
    ordered: Vec<FieldDescriptor>,
    by_name: FxHashMap<String, usize>,
    /// Index of the first field declared by the owner itself
    direct_start: usize,
}

impl FieldTable {
    /// Flatten a layout's fields and repair unresolved slots from `sample`
    ///
    /// `sample` is ignored unless it is a value of exactly the layout's type
    /// that passes the layout's placement checks.
    pub fn build(layout: &LayoutDescriptor, sample: Option<&ErasedValue>) -> Self {
        let sample = sample.filter(|value| layout.verify_placement(value).is_ok());
        let mut ordered = layout.all_field_descriptors();
        let direct_start = ordered.len() - layout.fields().len();

        if let Some(sample) = sample {
            for field in ordered.iter_mut().filter(|field| field.is_unresolved()) {
                // SAFETY: `sample` is a verified value of the layout's type and
                // `field` is an erased slot at its rebased offset.
                let observed = unsafe { field.slot().copy_out(sample.as_ptr().add(field.offset())) };
                debug!(
                    owner = %layout.name(),
                    field = %field.name(),
                    resolved = %observed.identity(),
                    "repaired erased field type"
                );
                *field = field.resolved_as(observed.identity());
            }
        }

        let by_name = ordered
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name().to_string(), index))
            .collect();

        Self {
            owner: layout.owner(),
            ordered,
            by_name,
            direct_start,
        }
    }

    /// Type the table describes
    pub fn owner(&self) -> TypeIdentity {
        self.owner
    }

    /// Field by name; a subclass field shadows a supertype field of the same name
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&index| &self.ordered[index])
    }

    /// All fields, base-most type first
    pub fn all(&self) -> &[FieldDescriptor] {
        &self.ordered
    }

    /// Fields declared by the owner itself
    pub fn direct(&self) -> &[FieldDescriptor] {
        &self.ordered[self.direct_start..]
    }

    /// Whether `field` is one of this table's fields
    pub fn contains(&self, field: &FieldDescriptor) -> bool {
        self.ordered.iter().any(|candidate| candidate.same_slot(field))
    }

    /// Number of fields, inherited ones included
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Check if the table has no fields
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Shared type-to-field-table map
#[derive(Debug, Default)]
pub struct DescriptorCache {
    tables: Mutex<FxHashMap<TypeIdentity, Arc<FieldTable>>>,
}

impl DescriptorCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table for a type, if one has been built
    pub fn fields_by_name(&self, ty: TypeIdentity) -> Option<Arc<FieldTable>> {
        self.tables.lock().get(&ty).cloned()
    }

    /// Table for a layout, building and caching it on first request
    ///
    /// Later calls for the same type return the first published table
    /// without rebuilding it.
    pub fn ensure_cached(&self, layout: &LayoutDescriptor, sample: Option<&ErasedValue>) -> Arc<FieldTable> {
        if let Some(table) = self.fields_by_name(layout.owner()) {
            return table;
        }

        let table = Arc::new(FieldTable::build(layout, sample));
        self.tables
            .lock()
            .entry(layout.owner())
            .or_insert_with(|| {
                debug!(owner = %layout.name(), fields = table.len(), "cached field table");
                table
            })
            .clone()
    }

    /// Number of cached types
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    /// Check if nothing has been cached yet
    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistryBuilder;
    use std::mem::offset_of;

    #[derive(Clone)]
    struct Holder {
        tag: u8,
        payload: ErasedValue,
    }

    fn holder_layout() -> Arc<LayoutDescriptor> {
        let mut builder = TypeRegistryBuilder::with_primitives();
        builder.record::<Holder>("Holder", |r| {
            r.project("tag", offset_of!(Holder, tag), |h| &h.tag)
                .project("payload", offset_of!(Holder, payload), |h| &h.payload);
        });
        let registry = builder.build().unwrap();
        registry.describe(TypeIdentity::of::<Holder>()).unwrap()
    }

    #[test]
    fn test_ensure_cached_idempotent() {
        let cache = DescriptorCache::new();
        let layout = holder_layout();
        assert!(cache.fields_by_name(layout.owner()).is_none());

        let first = cache.ensure_cached(&layout, None);
        let second = cache.ensure_cached(&layout, None);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_repair_from_sample() {
        let cache = DescriptorCache::new();
        let layout = holder_layout();
        let sample = ErasedValue::new(Holder {
            tag: 1,
            payload: ErasedValue::new(String::from("inner")),
        });

        let table = cache.ensure_cached(&layout, Some(&sample));
        let payload = table.get("payload").unwrap();
        assert!(!payload.is_unresolved());
        assert_eq!(payload.ty(), TypeIdentity::of::<String>());
        assert_eq!(table.get("tag").unwrap().ty(), TypeIdentity::of::<u8>());
    }

    #[test]
    fn test_sample_of_other_type_ignored() {
        let layout = holder_layout();
        let table = FieldTable::build(&layout, Some(&ErasedValue::new(5u32)));
        assert!(table.get("payload").unwrap().is_unresolved());
    }

    #[derive(Clone)]
    struct Pair {
        left: ErasedValue,
        right: ErasedValue,
    }

    #[test]
    fn test_repair_ignores_short_view() {
        let mut builder = TypeRegistryBuilder::with_primitives();
        builder.record::<Pair>("Pair", |r| {
            r.project("left", offset_of!(Pair, left), |p| &p.left)
                .project("right", offset_of!(Pair, right), |p| &p.right)
                .view(|any| match any.downcast_ref::<Pair>() {
                    Some(pair) => vec![pair.right.clone()],
                    None => Vec::new(),
                });
        });
        let registry = builder.build().unwrap();
        let layout = registry.describe(TypeIdentity::of::<Pair>()).unwrap();
        let sample = ErasedValue::new(Pair {
            left: ErasedValue::new(1u8),
            right: ErasedValue::new(String::from("r")),
        });

        let table = FieldTable::build(&layout, Some(&sample));
        assert_eq!(table.get("left").unwrap().ty(), TypeIdentity::of::<u8>());
        assert_eq!(table.get("right").unwrap().ty(), TypeIdentity::of::<String>());
    }

    #[test]
    fn test_misplaced_sample_ignored() {
        let mut builder = TypeRegistryBuilder::with_primitives();
        builder.record::<Pair>("Pair", |r| {
            r.project("left", offset_of!(Pair, right), |p| &p.left);
        });
        let registry = builder.build().unwrap();
        let layout = registry.describe(TypeIdentity::of::<Pair>()).unwrap();
        let sample = ErasedValue::new(Pair {
            left: ErasedValue::new(1u8),
            right: ErasedValue::new(2u16),
        });

        let table = FieldTable::build(&layout, Some(&sample));
        assert!(table.get("left").unwrap().is_unresolved());
    }

    #[test]
    fn test_repair_happens_once() {
        let cache = DescriptorCache::new();
        let layout = holder_layout();
        let first = ErasedValue::new(Holder {
            tag: 1,
            payload: ErasedValue::new(1i32),
        });
        let second = ErasedValue::new(Holder {
            tag: 2,
            payload: ErasedValue::new(1.0f64),
        });

        cache.ensure_cached(&layout, Some(&first));
        let table = cache.ensure_cached(&layout, Some(&second));
        assert_eq!(table.get("payload").unwrap().ty(), TypeIdentity::of::<i32>());
    }
}
