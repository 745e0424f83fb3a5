//! Generation context.
//!
//! Everything a generator may consult while probing: the current realm
//! and heap, the allocation site of the executing frame (when there is
//! one), a step budget for pure lookups, and the diagnostics sink.
//! Generators must stay pure; the context deliberately exposes no way
//! to run script or mutate objects.

use std::sync::Arc;

use ferret_object::{
    AllocSite, Heap, LookupBudget, ObjectRef, PropertyKey, PropertyLocation, Realm, Shape,
    pure_lookup_property,
};

use crate::diagnostics::DiagnosticsSink;

/// Read-only view of the runtime for one attach attempt.
pub struct GenerationContext<'rt> {
    realm: &'rt Realm,
    heap: &'rt Heap,
    alloc_site: Option<Arc<AllocSite>>,
    budget: LookupBudget,
    sink: Option<&'rt dyn DiagnosticsSink>,
}

impl<'rt> GenerationContext<'rt> {
    /// Context with the default lookup budget and no frame.
    pub fn new(realm: &'rt Realm, heap: &'rt Heap) -> Self {
        Self {
            realm,
            heap,
            alloc_site: None,
            budget: LookupBudget::default(),
            sink: None,
        }
    }

    /// Attach the executing frame's allocation site. Allocation stubs
    /// decline to attach without one.
    pub fn with_alloc_site(mut self, site: Arc<AllocSite>) -> Self {
        self.alloc_site = Some(site);
        self
    }

    /// Override the pure-lookup step budget.
    pub fn with_budget(mut self, budget: LookupBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Route attach events to `sink` instead of the default tracing
    /// sink.
    pub fn with_sink(mut self, sink: &'rt dyn DiagnosticsSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The realm the cached bytecode executes in.
    pub fn realm(&self) -> &Realm {
        self.realm
    }

    /// The heap, for barrier bookkeeping at publish time.
    pub fn heap(&self) -> &Heap {
        self.heap
    }

    /// Allocation site of the executing frame, when known.
    pub fn alloc_site(&self) -> Option<&Arc<AllocSite>> {
        self.alloc_site.as_ref()
    }

    /// The configured sink, when any.
    pub(crate) fn sink(&self) -> Option<&'rt dyn DiagnosticsSink> {
        self.sink
    }

    /// Pure lookup against the shared budget. Exhaustion reads as
    /// `None`: the probe declines and the site simply stays cold.
    pub fn pure_lookup(&mut self, obj: &ObjectRef, key: &PropertyKey) -> Option<PropertyLocation> {
        pure_lookup_property(obj, key, &mut self.budget).ok()
    }

    /// Whether a shape belongs to this context's realm. Cross-realm
    /// receivers disqualify the teleporting guard pattern.
    pub fn same_realm(&self, shape: &Shape) -> bool {
        shape.realm() == self.realm.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_object::Value;
    use ferret_object::shape::PropertyAttributes;

    #[test]
    fn test_lookup_budget_exhaustion_is_soft() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let obj = realm.new_plain_object();
        let key = PropertyKey::Atom(realm.intern("x"));
        obj.define_data_property(&heap, key.clone(), Value::Int32(1), PropertyAttributes::default_data());

        let mut ctx = GenerationContext::new(&realm, &heap).with_budget(LookupBudget::new(0));
        assert!(ctx.pure_lookup(&obj, &key).is_none());

        let mut ctx = GenerationContext::new(&realm, &heap);
        assert!(matches!(ctx.pure_lookup(&obj, &key), Some(PropertyLocation::Own { .. })));
    }

    #[test]
    fn test_same_realm_checks_shape_realm() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let other = Realm::new(&heap);
        let local = realm.new_plain_object();
        let foreign = other.new_plain_object();

        let ctx = GenerationContext::new(&realm, &heap);
        assert!(ctx.same_realm(&local.shape()));
        assert!(!ctx.same_realm(&foreign.shape()));
    }
}
