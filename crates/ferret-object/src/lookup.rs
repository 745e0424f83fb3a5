//! Pure property lookup.
//!
//! Cache generation must inspect the object graph without running script,
//! allocating on the JS heap or mutating anything. The walk refuses exotic
//! receivers (`NotPure`) and fails softly when its step budget runs out, so
//! a pathological chain degrades to "no stub" rather than an error.

use std::sync::Arc;

use thiserror::Error;

use crate::atom::PropertyKey;
use crate::object::ObjectRef;
use crate::shape::PropertyInfo;

/// Default number of walk steps a single lookup may spend.
pub const DEFAULT_LOOKUP_STEPS: u32 = 256;

/// Soft failure: the lookup spent its whole budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pure property lookup ran out of budget")]
pub struct LookupLimit;

/// Step budget for pure walks. Models internal resource exhaustion: callers
/// treat an exhausted budget as "do not optimize", never as a hard error.
#[derive(Debug, Clone, Copy)]
pub struct LookupBudget {
    remaining: u32,
}

impl LookupBudget {
    /// Budget with an explicit step count.
    pub const fn new(steps: u32) -> Self {
        Self { remaining: steps }
    }

    /// Spend one step.
    pub fn step(&mut self) -> Result<(), LookupLimit> {
        if self.remaining == 0 {
            return Err(LookupLimit);
        }
        self.remaining -= 1;
        Ok(())
    }

    /// Steps left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Default for LookupBudget {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_STEPS)
    }
}

/// Where a pure lookup found (or did not find) a property.
#[derive(Debug, Clone)]
pub enum PropertyLocation {
    /// Own property of the receiver.
    Own {
        /// Table entry on the receiver's shape.
        info: PropertyInfo,
    },
    /// Own dense element of the receiver.
    OwnElement {
        /// Element index.
        index: u32,
    },
    /// Property on a prototype.
    OnProto {
        /// The object that owns the property.
        holder: ObjectRef,
        /// Chain depth of the holder; the first prototype is depth 1.
        depth: u32,
        /// Table entry on the holder's shape.
        info: PropertyInfo,
    },
    /// Dense element on a prototype. No stub pattern covers this; callers
    /// decline to optimize.
    OnProtoElement {
        /// The object that owns the element.
        holder: ObjectRef,
        /// Chain depth of the holder.
        depth: u32,
    },
    /// Walked the whole chain without finding the key.
    Missing,
    /// The walk hit an object whose lookup behavior is not observable
    /// without running script (a proxy).
    NotPure,
}

/// Walk `obj` and its prototype chain for `key` without side effects.
pub fn pure_lookup_property(
    obj: &ObjectRef,
    key: &PropertyKey,
    budget: &mut LookupBudget,
) -> Result<PropertyLocation, LookupLimit> {
    let mut current = Arc::clone(obj);
    let mut depth = 0u32;

    loop {
        budget.step()?;
        if current.is_proxy() {
            return Ok(PropertyLocation::NotPure);
        }

        if let PropertyKey::Index(index) = key
            && current.element(*index).is_some()
        {
            return Ok(if depth == 0 {
                PropertyLocation::OwnElement { index: *index }
            } else {
                PropertyLocation::OnProtoElement { holder: current, depth }
            });
        }

        if let Some(info) = current.shape().property(key) {
            return Ok(if depth == 0 {
                PropertyLocation::Own { info }
            } else {
                PropertyLocation::OnProto { holder: current, depth, info }
            });
        }

        let proto = current.proto();
        match proto {
            Some(next) => {
                current = next;
                depth += 1;
            }
            None => return Ok(PropertyLocation::Missing),
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::heap::Heap;
    use crate::object::ForwardingHandler;
    use crate::realm::Realm;
    use crate::shape::PropertyAttributes;
    use crate::value::Value;

    fn setup() -> (Heap, Arc<Realm>, AtomTable) {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        (heap, realm, AtomTable::new())
    }

    #[test]
    fn test_own_and_proto_hits() {
        let (heap, realm, atoms) = setup();
        let key = PropertyKey::Atom(atoms.intern("x"));
        let attrs = PropertyAttributes::default_data();

        let parent = realm.new_plain_object();
        parent.define_data_property(&heap, key.clone(), Value::Int32(1), attrs);
        let child = realm.new_plain_object();
        child.set_prototype(&heap, Some(Arc::clone(&parent)));

        let mut budget = LookupBudget::default();
        match pure_lookup_property(&parent, &key, &mut budget).unwrap() {
            PropertyLocation::Own { .. } => {}
            other => panic!("expected own hit, got {other:?}"),
        }
        match pure_lookup_property(&child, &key, &mut budget).unwrap() {
            PropertyLocation::OnProto { holder, depth, .. } => {
                assert!(Arc::ptr_eq(&holder, &parent));
                assert_eq!(depth, 1);
            }
            other => panic!("expected proto hit, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_walks_whole_chain() {
        let (_, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let key = PropertyKey::Atom(atoms.intern("nope"));
        let mut budget = LookupBudget::default();
        assert!(matches!(
            pure_lookup_property(&obj, &key, &mut budget).unwrap(),
            PropertyLocation::Missing
        ));
    }

    #[test]
    fn test_element_locations() {
        let (heap, realm, _) = setup();
        let arr = realm.new_array();
        arr.set_element(&heap, 2, Value::Int32(5));
        let mut budget = LookupBudget::default();
        assert!(matches!(
            pure_lookup_property(&arr, &PropertyKey::Index(2), &mut budget).unwrap(),
            PropertyLocation::OwnElement { index: 2 }
        ));

        let child = realm.new_plain_object();
        child.set_prototype(&heap, Some(Arc::clone(&arr)));
        assert!(matches!(
            pure_lookup_property(&child, &PropertyKey::Index(2), &mut budget).unwrap(),
            PropertyLocation::OnProtoElement { depth: 1, .. }
        ));
    }

    #[test]
    fn test_proxy_is_not_pure() {
        let (heap, realm, atoms) = setup();
        let target = realm.new_plain_object();
        let proxy = realm.new_proxy(Arc::clone(&target), Box::new(ForwardingHandler));
        let key = PropertyKey::Atom(atoms.intern("x"));
        let mut budget = LookupBudget::default();

        assert!(matches!(
            pure_lookup_property(&proxy, &key, &mut budget).unwrap(),
            PropertyLocation::NotPure
        ));

        // A proxy anywhere on the chain poisons the walk.
        let child = realm.new_plain_object();
        child.set_prototype(&heap, Some(proxy));
        assert!(matches!(
            pure_lookup_property(&child, &key, &mut budget).unwrap(),
            PropertyLocation::NotPure
        ));
    }

    #[test]
    fn test_budget_exhaustion_is_soft() {
        let (heap, realm, atoms) = setup();
        let key = PropertyKey::Atom(atoms.intern("deep"));

        // Chain longer than the budget.
        let mut head = realm.new_plain_object_with_proto(None);
        for _ in 0..10 {
            let next = realm.new_plain_object_with_proto(None);
            next.set_prototype(&heap, Some(Arc::clone(&head)));
            head = next;
        }
        let mut tiny = LookupBudget::new(3);
        assert!(matches!(
            pure_lookup_property(&head, &key, &mut tiny),
            Err(LookupLimit)
        ));

        let mut enough = LookupBudget::default();
        assert!(pure_lookup_property(&head, &key, &mut enough).is_ok());
    }
}
