//! End-to-end attach scenarios: miss, probe, publish, hit.

use std::sync::Arc;

use ferret_ic::{
    AttachDecision, CacheKey, CacheKind, CallIrGenerator, CompareIrGenerator, EvalOutcome,
    GenerationContext, GetIteratorIrGenerator, GetPropIrGenerator, ICMode, InlineCacheSite,
    SetPropIrGenerator,
};
use ferret_object::shape::{ClassKind, PropertyAttributes};
use ferret_object::{
    AllocSite, FuseIndex, ForwardingHandler, Heap, NativeCallArgs, ObjectRef, PropertyKey, Realm,
    Script, Value,
};

fn define_x(realm: &Realm, heap: &Heap, obj: &ObjectRef, value: i32) {
    obj.define_data_property(
        heap,
        PropertyKey::Atom(realm.intern("x")),
        Value::Int32(value),
        PropertyAttributes::default_data(),
    );
}

fn x_key(realm: &Realm) -> CacheKey {
    CacheKey::Constant(PropertyKey::Atom(realm.intern("x")))
}

#[test]
fn test_monomorphic_get_prop_attaches_once() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetProp);
    let obj = realm.new_plain_object();
    define_x(&realm, &heap, &obj, 11);

    let mut ctx = GenerationContext::new(&realm, &heap);
    for round in 0..3 {
        let mut generator = GetPropIrGenerator::new(Value::Object(obj.clone()), x_key(&realm));
        let run = site.run_cached(&mut ctx, &mut generator);
        assert_eq!(run.hit, round > 0);
        assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(11)))));
    }
    assert_eq!(site.stub_count(), 1);
    assert_eq!(site.mode(), ICMode::Specialized);
}

#[test]
fn test_shape_churn_escalates_to_megamorphic() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetProp);
    let mut ctx = GenerationContext::new(&realm, &heap);

    // Each object gets a distinct shape by padding with extra
    // properties before x.
    let distinct_object = |i: usize| {
        let obj = realm.new_plain_object();
        for j in 0..i {
            obj.define_data_property(
                &heap,
                PropertyKey::Atom(realm.intern(&format!("pad{j}"))),
                Value::Int32(0),
                PropertyAttributes::default_data(),
            );
        }
        define_x(&realm, &heap, &obj, i as i32);
        obj
    };

    // The receivers stay live across the loop, as they would at a real
    // polymorphic site; their shapes keep the attached stubs valid.
    let objects: Vec<ObjectRef> = (0..7).map(distinct_object).collect();

    for obj in &objects[..6] {
        let mut generator = GetPropIrGenerator::new(Value::Object(Arc::clone(obj)), x_key(&realm));
        let run = site.run_cached(&mut ctx, &mut generator);
        assert_eq!(run.decision, AttachDecision::Attach);
    }
    assert_eq!(site.stub_count(), 6);
    assert_eq!(site.mode(), ICMode::Specialized);

    // The seventh shape trips the transition: the specialized list is
    // discarded for a single hash-lookup stub.
    let mut generator =
        GetPropIrGenerator::new(Value::Object(Arc::clone(&objects[6])), x_key(&realm));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
    assert_eq!(site.mode(), ICMode::Megamorphic);
    assert_eq!(site.stub_count(), 1);
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(6)))));
    assert_eq!(site.stubs()[0].info().name(), "GetProp.Megamorphic");

    // The hash stub now serves every shape.
    let obj = distinct_object(9);
    let mut generator = GetPropIrGenerator::new(Value::Object(obj), x_key(&realm));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(run.hit);
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(9)))));
}

#[test]
fn test_deferred_add_slot_then_fast_add() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::SetProp);
    let mut ctx = GenerationContext::new(&realm, &heap);
    let key = PropertyKey::Atom(realm.intern("x"));

    // First store to a missing property defers to the fallback.
    let obj = realm.new_plain_object();
    let old_shape = obj.shape();
    let mut generator = SetPropIrGenerator::new(
        Value::Object(obj.clone()),
        CacheKey::Constant(key.clone()),
        Value::Int32(1),
        false,
    );
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Deferred);
    assert!(run.outcome.is_none());
    assert_eq!(site.stub_count(), 0);

    // The fallback performs the define, then re-enters to attach the
    // add-slot stub keyed on the shape before the define.
    obj.define_data_property(
        &heap,
        key.clone(),
        Value::Int32(1),
        PropertyAttributes::default_data(),
    );
    let mut generator =
        SetPropIrGenerator::for_add_slot(obj.clone(), key.clone(), Value::Int32(1), old_shape);
    assert_eq!(site.attach_with(&mut ctx, &mut generator), AttachDecision::Attach);
    assert_eq!(site.stub_count(), 1);
    assert_eq!(site.stubs()[0].info().name(), "SetProp.AddSlot");

    // A fresh object with the pre-define shape now takes the fast path:
    // the stub itself grows the object.
    let fresh = realm.new_plain_object();
    let mut generator = SetPropIrGenerator::new(
        Value::Object(fresh.clone()),
        CacheKey::Constant(key.clone()),
        Value::Int32(5),
        false,
    );
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(run.hit);
    let info = fresh.shape().property(&key).expect("property should exist");
    assert!(matches!(fresh.read_slot(info.slot), Value::Int32(5)));
}

#[test]
fn test_compare_coercion_attaches_per_type_pair() {
    use ferret_cacheir::CompareOp;

    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::Compare);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let mut generator = CompareIrGenerator::new(CompareOp::Lt, Value::Int32(1), Value::Int32(2));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Boolean(true)))));
    assert_eq!(site.stubs()[0].info().name(), "Compare.Int32");

    // A double on the left fails the int32 guard and attaches the
    // double variant alongside.
    let mut generator =
        CompareIrGenerator::new(CompareOp::Lt, Value::Double(0.5), Value::Int32(2));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(!run.hit);
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Boolean(true)))));
    assert_eq!(site.stub_count(), 2);
    assert_eq!(site.stubs()[1].info().name(), "Compare.Double");
}

#[test]
fn test_string_number_compare_regenerates_for_boolean_inputs() {
    use ferret_cacheir::CompareOp;

    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::Compare);
    let mut ctx = GenerationContext::new(&realm, &heap);

    // Loose string-against-number equality coerces the string side.
    let mut generator = CompareIrGenerator::new(
        CompareOp::Eq,
        Value::String(realm.intern("5")),
        Value::Int32(5),
    );
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
    assert_eq!(site.stubs()[0].info().name(), "Compare.StringNumber");
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Boolean(true)))));

    // A boolean input fails the string guard; the miss regenerates and
    // attaches the int32 variant alongside.
    let mut generator =
        CompareIrGenerator::new(CompareOp::Eq, Value::Boolean(true), Value::Int32(1));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(!run.hit);
    assert_eq!(run.decision, AttachDecision::Attach);
    assert_eq!(site.stub_count(), 2);
    assert_eq!(site.stubs()[1].info().name(), "Compare.Int32");
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Boolean(true)))));
}

#[test]
fn test_proxy_get_goes_through_trap() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetProp);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let target = realm.new_plain_object();
    define_x(&realm, &heap, &target, 23);
    let proxy = realm.new_proxy(target, Box::new(ForwardingHandler));

    let mut generator = GetPropIrGenerator::new(Value::Object(proxy.clone()), x_key(&realm));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
    assert_eq!(site.stubs()[0].info().name(), "GetProp.Proxy");
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(23)))));

    let mut generator = GetPropIrGenerator::new(Value::Object(proxy), x_key(&realm));
    assert!(site.run_cached(&mut ctx, &mut generator).hit);
}

#[test]
fn test_native_getter_runs_with_receiver_this() {
    fn getter(args: &NativeCallArgs<'_>) -> Value {
        match &args.this {
            Value::Object(_) => Value::Int32(42),
            _ => Value::Undefined,
        }
    }

    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetProp);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let obj = realm.new_plain_object();
    let getter_fn = realm.new_native_function(Some(realm.intern("get x")), 0, getter);
    obj.define_accessor_property(
        &heap,
        PropertyKey::Atom(realm.intern("x")),
        Some(getter_fn),
        None,
        PropertyAttributes::default_data(),
    );

    let mut generator = GetPropIrGenerator::new(Value::Object(obj), x_key(&realm));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(site.stubs()[0].info().name(), "GetProp.NativeGetter");
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(42)))));
}

#[test]
fn test_fun_call_remaps_arguments() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::Call);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let script = Script::new(Some(realm.intern("f")));
    script.set_compiled_entry();
    let f = realm.new_scripted_function(Arc::clone(&script), 1);

    let mut generator = CallIrGenerator::new(
        Value::Object(Arc::clone(realm.fun_call())),
        Value::Object(f),
        &[Value::Int32(77), Value::Int32(5)],
        false,
    );
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(site.stubs()[0].info().name(), "Call.ScriptedFunCall");
    match run.outcome {
        Some(EvalOutcome::EnterScript { script: entered, this, args }) => {
            assert!(Arc::ptr_eq(&entered, &script));
            assert!(matches!(this, Value::Int32(77)));
            assert!(matches!(args[..], [Value::Int32(5)]));
        }
        other => panic!("expected EnterScript, got {other:?}"),
    }
}

#[test]
fn test_bound_call_prepends_bound_arguments() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::Call);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let script = Script::new(Some(realm.intern("target")));
    script.set_compiled_entry();
    let target = realm.new_scripted_function(Arc::clone(&script), 2);
    let bound = realm.new_bound_function(target, Value::Int32(9), vec![Value::Int32(1)]);

    let mut generator = CallIrGenerator::new(
        Value::Object(bound),
        Value::Undefined,
        &[Value::Int32(2)],
        false,
    );
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(site.stubs()[0].info().name(), "Call.BoundScripted");
    match run.outcome {
        Some(EvalOutcome::EnterScript { this, args, .. }) => {
            assert!(matches!(this, Value::Int32(9)));
            assert!(matches!(args[..], [Value::Int32(1), Value::Int32(2)]));
        }
        other => panic!("expected EnterScript, got {other:?}"),
    }
}

#[test]
fn test_iterator_stub_dies_with_the_fuse() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetIterator);
    let array = realm.new_array();
    array.set_element(&heap, 0, Value::Int32(1));
    let sitealloc = AllocSite::new(None, 0);

    let mut ctx = GenerationContext::new(&realm, &heap).with_alloc_site(Arc::clone(&sitealloc));
    let mut generator = GetIteratorIrGenerator::new(Value::Object(array.clone()));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
    match run.outcome {
        Some(EvalOutcome::Returned(Value::Object(iter))) => {
            assert_eq!(iter.class_kind(), ClassKind::ArrayIterator);
        }
        other => panic!("expected an iterator object, got {other:?}"),
    }
    assert_eq!(sitealloc.allocation_count(), 1);

    // Popping the protocol fuse invalidates the attached stub and the
    // generator refuses to attach another.
    realm.fuses().fuse(FuseIndex::ArrayIteratorIntact).pop();
    let mut generator = GetIteratorIrGenerator::new(Value::Object(array));
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(!run.hit);
    assert_eq!(run.decision, AttachDecision::NoAction);
    assert!(run.outcome.is_none());
}

#[test]
fn test_cross_realm_chain_disables_teleporting() {
    use ferret_cacheir::CacheOp;

    let heap = Heap::new();
    let home = Realm::new(&heap);
    let foreign = Realm::new(&heap);
    let site = InlineCacheSite::new(CacheKind::GetProp);

    // Receiver and holder live in the foreign realm; the cache runs in
    // the home realm, so the two-guard teleport pattern is off the
    // table.
    let obj = foreign.new_plain_object();
    define_x(&foreign, &heap, foreign.object_prototype(), 3);

    let mut ctx = GenerationContext::new(&home, &heap);
    let key = CacheKey::Constant(PropertyKey::Atom(foreign.intern("x")));
    let mut generator = GetPropIrGenerator::new(Value::Object(obj), key);
    let run = site.run_cached(&mut ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
    let info = Arc::clone(site.stubs()[0].info());
    assert_eq!(info.name(), "GetProp.ProtoSlot");
    assert!(info.ops().contains(&CacheOp::LoadProto));
    assert!(matches!(run.outcome, Some(EvalOutcome::Returned(Value::Int32(3)))));
}
