//! Structural properties of the streams the generators emit.

use std::sync::Arc;

use ferret_cacheir::{CacheOp, verify};
use ferret_ic::{
    AttachDecision, CacheKey, CacheKind, CompareIrGenerator, GenerationContext,
    GetPropIrGenerator, HasPropIrGenerator, InlineCacheSite, SetPropIrGenerator,
};
use ferret_object::shape::PropertyAttributes;
use ferret_object::{Heap, ObjectRef, PropertyKey, Realm, Value};

fn define(realm: &Realm, heap: &Heap, obj: &ObjectRef, name: &str, value: i32) {
    obj.define_data_property(
        heap,
        PropertyKey::Atom(realm.intern(name)),
        Value::Int32(value),
        PropertyAttributes::default_data(),
    );
}

fn attach_get_prop(
    site: &InlineCacheSite,
    ctx: &mut GenerationContext<'_>,
    receiver: Value,
    key: CacheKey,
) {
    let mut generator = GetPropIrGenerator::new(receiver, key);
    let run = site.run_cached(ctx, &mut generator);
    assert_eq!(run.decision, AttachDecision::Attach);
}

#[test]
fn test_attached_stubs_decode_and_verify() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let mut ctx = GenerationContext::new(&realm, &heap);

    let obj = realm.new_plain_object();
    define(&realm, &heap, &obj, "x", 1);
    let key = CacheKey::Constant(PropertyKey::Atom(realm.intern("x")));

    let get_site = InlineCacheSite::new(CacheKind::GetProp);
    attach_get_prop(&get_site, &mut ctx, Value::Object(obj.clone()), key.clone());

    let set_site = InlineCacheSite::new(CacheKind::SetProp);
    let mut generator = SetPropIrGenerator::new(
        Value::Object(obj.clone()),
        key.clone(),
        Value::Int32(2),
        false,
    );
    assert_eq!(set_site.run_cached(&mut ctx, &mut generator).decision, AttachDecision::Attach);

    let has_site = InlineCacheSite::new(CacheKind::HasProp);
    let mut generator = HasPropIrGenerator::new(Value::Object(obj), key, true);
    assert_eq!(has_site.run_cached(&mut ctx, &mut generator).decision, AttachDecision::Attach);

    for site in [&get_site, &set_site, &has_site] {
        for stub in site.stubs() {
            let info = stub.info();
            assert_eq!(
                verify(info.code(), stub.data().fields(), info.input_count()),
                Ok(()),
                "stub {} should verify",
                info.name()
            );
        }
    }
}

#[test]
fn test_streams_end_with_exactly_one_terminal() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let mut ctx = GenerationContext::new(&realm, &heap);
    let site = InlineCacheSite::new(CacheKind::Compare);

    let mut generator = CompareIrGenerator::new(
        ferret_cacheir::CompareOp::StrictEq,
        Value::Int32(1),
        Value::Int32(1),
    );
    site.run_cached(&mut ctx, &mut generator);

    let stub = &site.stubs()[0];
    let ops = stub.info().ops();
    assert_eq!(ops.last(), Some(&CacheOp::ReturnFromIC));
    assert_eq!(ops.iter().filter(|op| op.is_terminal()).count(), 1);
}

#[test]
fn test_same_pattern_across_sites_shares_info() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let mut ctx = GenerationContext::new(&realm, &heap);
    let key = CacheKey::Constant(PropertyKey::Atom(realm.intern("x")));

    // Distinct objects, identical layout: two sites, one interned info.
    let a = realm.new_plain_object();
    define(&realm, &heap, &a, "x", 1);
    let b = realm.new_plain_object();
    define(&realm, &heap, &b, "x", 2);

    let site_a = InlineCacheSite::new(CacheKind::GetProp);
    let site_b = InlineCacheSite::new(CacheKind::GetProp);
    attach_get_prop(&site_a, &mut ctx, Value::Object(a), key.clone());
    attach_get_prop(&site_b, &mut ctx, Value::Object(b), key);

    let info_a = Arc::clone(site_a.stubs()[0].info());
    let info_b = Arc::clone(site_b.stubs()[0].info());
    assert!(Arc::ptr_eq(&info_a, &info_b));
    assert_eq!(info_a.name(), "GetProp.OwnSlot");
}

#[test]
fn test_teleporting_collapses_chain_guards() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let mut ctx = GenerationContext::new(&realm, &heap);
    let key = CacheKey::Constant(PropertyKey::Atom(realm.intern("shared")));

    define(&realm, &heap, realm.object_prototype(), "shared", 5);
    let obj = realm.new_plain_object();

    // Same-realm, never-invalidated chain: receiver shape plus holder
    // shape, no per-link walk.
    let site = InlineCacheSite::new(CacheKind::GetProp);
    attach_get_prop(&site, &mut ctx, Value::Object(obj.clone()), key.clone());
    let ops = site.stubs()[0].info().ops().to_vec();
    assert!(!ops.contains(&CacheOp::LoadProto));
    assert_eq!(ops.iter().filter(|op| **op == CacheOp::GuardShape).count(), 2);

    // Invalidate teleporting on the holder; a fresh site must guard
    // every link explicitly.
    let proto = realm.object_prototype();
    proto.replace_shape(proto.shape().reshaped_invalidated());
    let site = InlineCacheSite::new(CacheKind::GetProp);
    attach_get_prop(&site, &mut ctx, Value::Object(obj), key);
    assert!(site.stubs()[0].info().ops().contains(&CacheOp::LoadProto));
}

#[test]
fn test_reshaped_receiver_fails_old_stub_and_reattaches() {
    let heap = Heap::new();
    let realm = Realm::new(&heap);
    let mut ctx = GenerationContext::new(&realm, &heap);
    let key = CacheKey::Constant(PropertyKey::Atom(realm.intern("x")));

    let obj = realm.new_plain_object();
    define(&realm, &heap, &obj, "x", 1);

    let site = InlineCacheSite::new(CacheKind::GetProp);
    attach_get_prop(&site, &mut ctx, Value::Object(obj.clone()), key.clone());

    // A later define moves the object to a new shape; the first stub's
    // shape guard fails and a second stub covers the new layout.
    define(&realm, &heap, &obj, "y", 2);
    let mut generator = GetPropIrGenerator::new(Value::Object(obj), key);
    let run = site.run_cached(&mut ctx, &mut generator);
    assert!(!run.hit);
    assert_eq!(run.decision, AttachDecision::Attach);
    assert_eq!(site.stub_count(), 2);
}
