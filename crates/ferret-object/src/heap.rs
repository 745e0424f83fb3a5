//! Heap bookkeeping: write barriers and guard-invalidation walks.
//!
//! There is no collector here. The heap exists so two contracts stay
//! observable and testable. First, owning stub fields announce themselves
//! through a pre-write barrier when a stub is published, while weak fields
//! never do. Second, mutations that could leave holder-only guard chains
//! stale reshape the affected prototype objects, which is what makes
//! two-guard prototype stubs sound.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::atom::PropertyKey;
use crate::object::{JsObject, ObjectRef};
use crate::shape::Shape;

/// Longest prototype chain the invalidation walks will follow. Chains in
/// practice are a handful of links; the cap keeps a corrupted graph from
/// hanging the walker.
const MAX_PROTO_CHAIN: usize = 64;

/// Process heap handle. See the module docs.
#[derive(Default)]
pub struct Heap {
    pre_barriers: AtomicU64,
}

impl Heap {
    /// Create a heap.
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------------
    // Barriers
    // ---------------------------------------------------------------------------

    /// Record one pre-write barrier. Called once per owning stub field when
    /// stub data is built for publication.
    pub fn note_pre_write_barrier(&self) {
        self.pre_barriers.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of pre-write barriers recorded so far.
    pub fn pre_write_barrier_count(&self) -> u64 {
        self.pre_barriers.load(Ordering::Relaxed)
    }

    // ---------------------------------------------------------------------------
    // Guard invalidation
    // ---------------------------------------------------------------------------

    /// Flag `obj` as being used as a prototype, reshaping once. Idempotent.
    pub fn mark_used_as_prototype(&self, obj: &ObjectRef) {
        let shape = obj.shape();
        if !shape.is_used_as_prototype() {
            obj.replace_shape(shape.as_prototype());
        }
    }

    /// A property named `key` was added to `proto_obj`, which some object
    /// uses as a prototype. Any holder further up the chain that owns `key`
    /// is now shadowed: reshape it so stubs guarding its old shape miss,
    /// and poison teleporting through it.
    pub fn note_prototype_shadowing_add(&self, proto_obj: &JsObject, key: &PropertyKey) {
        let mut current = proto_obj.proto();
        let mut hops = 0;
        while let Some(obj) = current {
            if hops >= MAX_PROTO_CHAIN {
                break;
            }
            let shape = obj.shape();
            if shape.property(key).is_some() {
                shape.invalidate_teleporting();
                obj.replace_shape(shape.reshaped_invalidated());
            }
            current = obj.proto();
            hops += 1;
        }
    }

    /// The prototype link of an object with `old_shape` was replaced. Every
    /// object on the old chain may have been a holder for some stub that
    /// walked through the mutated object, so reshape them all.
    pub fn note_proto_mutation(&self, old_shape: &Shape) {
        let mut current = old_shape.proto().cloned();
        let mut hops = 0;
        while let Some(obj) = current {
            if hops >= MAX_PROTO_CHAIN {
                break;
            }
            let shape = obj.shape();
            shape.invalidate_teleporting();
            obj.replace_shape(shape.reshaped_invalidated());
            current = obj.proto();
            hops += 1;
        }
    }

    /// A dense element appeared on a prototype object. Element storage is
    /// not part of the shape, so reshape the object itself to break
    /// hole-load stubs that guarded the chain.
    pub fn note_prototype_element_add(&self, proto_obj: &JsObject) {
        let shape = proto_obj.shape();
        proto_obj.replace_shape(shape.reshaped());
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::realm::Realm;
    use crate::shape::PropertyAttributes;
    use crate::value::Value;
    use std::sync::Arc;

    #[test]
    fn test_barrier_counter() {
        let heap = Heap::new();
        assert_eq!(heap.pre_write_barrier_count(), 0);
        heap.note_pre_write_barrier();
        heap.note_pre_write_barrier();
        assert_eq!(heap.pre_write_barrier_count(), 2);
    }

    #[test]
    fn test_shadowing_add_reshapes_holder() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let atoms = AtomTable::new();
        let attrs = PropertyAttributes::default_data();
        let key = PropertyKey::Atom(atoms.intern("x"));

        // grandparent owns "x"; parent sits between it and the receiver.
        let grandparent = realm.new_plain_object();
        grandparent.define_data_property(&heap, key.clone(), Value::Int32(1), attrs);
        let parent = realm.new_plain_object();
        parent.set_prototype(&heap, Some(Arc::clone(&grandparent)));
        let receiver = realm.new_plain_object();
        receiver.set_prototype(&heap, Some(Arc::clone(&parent)));

        let grandparent_shape = grandparent.shape().id();
        let receiver_shape = receiver.shape().id();

        // Adding "x" to parent shadows grandparent's copy.
        parent.define_data_property(&heap, key.clone(), Value::Int32(2), attrs);

        assert_ne!(grandparent.shape().id(), grandparent_shape);
        assert!(grandparent.shape().is_teleporting_invalidated());
        // The receiver itself is untouched.
        assert_eq!(receiver.shape().id(), receiver_shape);
    }

    #[test]
    fn test_unrelated_add_does_not_reshape() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let atoms = AtomTable::new();
        let attrs = PropertyAttributes::default_data();

        let parent = realm.new_plain_object();
        parent.define_data_property(
            &heap,
            PropertyKey::Atom(atoms.intern("x")),
            Value::Int32(1),
            attrs,
        );
        let child = realm.new_plain_object();
        child.set_prototype(&heap, Some(Arc::clone(&parent)));

        let parent_shape = parent.shape().id();
        // "y" shadows nothing above the child.
        child.define_data_property(
            &heap,
            PropertyKey::Atom(atoms.intern("y")),
            Value::Int32(2),
            attrs,
        );
        assert_eq!(parent.shape().id(), parent_shape);
        assert!(!parent.shape().is_teleporting_invalidated());
    }

    #[test]
    fn test_proto_mutation_reshapes_old_chain() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);

        let top = realm.new_plain_object();
        let middle = realm.new_plain_object();
        middle.set_prototype(&heap, Some(Arc::clone(&top)));
        let bottom = realm.new_plain_object();
        bottom.set_prototype(&heap, Some(Arc::clone(&middle)));

        let top_shape = top.shape().id();
        let middle_shape = middle.shape().id();

        // Re-pointing the middle link strands the old upper chain.
        middle.set_prototype(&heap, None);

        assert_ne!(top.shape().id(), top_shape);
        assert!(top.shape().is_teleporting_invalidated());
        assert_ne!(middle.shape().id(), middle_shape);
        assert!(bottom.shape().proto().is_some());
    }

    #[test]
    fn test_element_add_on_prototype_reshapes_it() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);

        let proto = realm.new_array();
        let child = realm.new_plain_object();
        child.set_prototype(&heap, Some(Arc::clone(&proto)));

        let proto_shape = proto.shape().id();
        proto.set_element(&heap, 0, Value::Int32(1));
        assert_ne!(proto.shape().id(), proto_shape);
    }
}
