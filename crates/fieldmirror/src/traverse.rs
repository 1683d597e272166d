//! Capability-filtered traversal of a mirror's children

use tracing::error;

use crate::identity::Capability;
use crate::mirror::InstanceMirror;
use crate::value::ErasedValue;

impl InstanceMirror {
    /// Partition the subject's direct fields by capability
    ///
    /// Every field declared by the subject's own type is reported exactly
    /// once: to `on_match` if its value's type conforms to `capability`,
    /// otherwise to `on_miss`. Inherited fields are not visited; use
    /// [`all_children`](Self::all_children) for those.
    pub fn for_each_child(
        &self,
        capability: Capability,
        mut on_match: impl FnMut(&str, &ErasedValue),
        mut on_miss: impl FnMut(&str, &ErasedValue),
    ) {
        let registry = self.reflector().registry();
        for (name, value) in self.children() {
            if registry.conforms_to(value.identity(), capability) {
                on_match(name, &value);
            } else {
                on_miss(name, &value);
            }
        }
    }

    /// Visit every conforming value reachable through the subject's fields
    ///
    /// Unlike [`for_each_child`](Self::for_each_child) this covers inherited
    /// fields too, base-most first. Descends depth-first into every
    /// reflectable child, whether or not it conforms; absent optionals are
    /// skipped.
    ///
    /// # Panics
    ///
    /// Panics if a child is itself an [`InstanceMirror`].
    pub fn recursive_for_each_child(&self, capability: Capability, mut on_match: impl FnMut(&str, &ErasedValue)) {
        self.descend(capability, &mut on_match);
    }

    fn descend(&self, capability: Capability, on_match: &mut dyn FnMut(&str, &ErasedValue)) {
        let reflector = self.reflector();
        let registry = reflector.registry();

        for (name, value) in self.all_children() {
            if value.is::<InstanceMirror>() {
                error!(owner = %self.layout().name(), field = %name, "mirror nested inside a reflected value");
                panic!("field `{name}` of `{}` holds an InstanceMirror", self.layout().name());
            }

            if registry.conforms_to(value.identity(), capability) {
                on_match(name, &value);
            }

            if registry.is_reflectable(value.identity()) {
                if let Some(child) = InstanceMirror::new(reflector, value) {
                    child.descend(capability, on_match);
                }
            }
        }
    }
}
