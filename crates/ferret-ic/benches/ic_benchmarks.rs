//! Inline cache performance benchmarks.
//!
//! Measures hit-path evaluation across cache states, plus the one-time
//! cost of generating and publishing a stub.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use ferret_ic::{CacheKey, CacheKind, GenerationContext, GetPropIrGenerator, InlineCacheSite};
use ferret_object::shape::PropertyAttributes;
use ferret_object::{Heap, ObjectRef, PropertyKey, Realm, Value};

struct Bench {
    heap: Heap,
    realm: std::sync::Arc<Realm>,
}

impl Bench {
    fn new() -> Self {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        Self { heap, realm }
    }

    /// Object whose shape differs by `pad` leading properties, with a
    /// trailing `x`.
    fn object(&self, pad: usize, value: i32) -> ObjectRef {
        let obj = self.realm.new_plain_object();
        for j in 0..pad {
            obj.define_data_property(
                &self.heap,
                PropertyKey::Atom(self.realm.intern(&format!("pad{j}"))),
                Value::Int32(0),
                PropertyAttributes::default_data(),
            );
        }
        obj.define_data_property(
            &self.heap,
            PropertyKey::Atom(self.realm.intern("x")),
            Value::Int32(value),
            PropertyAttributes::default_data(),
        );
        obj
    }

    fn key(&self) -> CacheKey {
        CacheKey::Constant(PropertyKey::Atom(self.realm.intern("x")))
    }
}

/// Warm a GetProp site with one object per distinct shape.
fn warm_site(bench: &Bench, objects: &[ObjectRef]) -> InlineCacheSite {
    let site = InlineCacheSite::new(CacheKind::GetProp);
    let mut ctx = GenerationContext::new(&bench.realm, &bench.heap);
    for obj in objects {
        let mut generator = GetPropIrGenerator::new(Value::Object(obj.clone()), bench.key());
        site.run_cached(&mut ctx, &mut generator);
    }
    site
}

/// Hit path with a single attached stub.
fn bench_monomorphic_hit(c: &mut Criterion) {
    let bench = Bench::new();
    let obj = bench.object(0, 42);
    let site = warm_site(&bench, std::slice::from_ref(&obj));
    assert_eq!(site.stub_count(), 1);

    c.bench_function("ic_monomorphic_hit", |b| {
        b.iter(|| {
            let mut ctx = GenerationContext::new(&bench.realm, &bench.heap);
            let mut generator =
                GetPropIrGenerator::new(Value::Object(black_box(obj.clone())), bench.key());
            black_box(site.run_cached(&mut ctx, &mut generator))
        });
    });
}

/// Hit path scanning a four-stub polymorphic site, worst case last.
fn bench_polymorphic_scan(c: &mut Criterion) {
    let bench = Bench::new();
    let objects: Vec<ObjectRef> = (0..4).map(|i| bench.object(i, i as i32)).collect();
    let site = warm_site(&bench, &objects);
    assert_eq!(site.stub_count(), 4);
    let last = objects.last().cloned().unwrap();

    c.bench_function("ic_polymorphic_scan_4", |b| {
        b.iter(|| {
            let mut ctx = GenerationContext::new(&bench.realm, &bench.heap);
            let mut generator =
                GetPropIrGenerator::new(Value::Object(black_box(last.clone())), bench.key());
            black_box(site.run_cached(&mut ctx, &mut generator))
        });
    });
}

/// Hit path through the megamorphic hash-lookup stub.
fn bench_megamorphic_hit(c: &mut Criterion) {
    let bench = Bench::new();
    let objects: Vec<ObjectRef> = (0..8).map(|i| bench.object(i, i as i32)).collect();
    let site = warm_site(&bench, &objects);
    assert_eq!(site.stub_count(), 1);
    let probe = bench.object(12, 12);

    c.bench_function("ic_megamorphic_hit", |b| {
        b.iter(|| {
            let mut ctx = GenerationContext::new(&bench.realm, &bench.heap);
            let mut generator =
                GetPropIrGenerator::new(Value::Object(black_box(probe.clone())), bench.key());
            black_box(site.run_cached(&mut ctx, &mut generator))
        });
    });
}

/// Cold-miss cost: probe, emit, verify, intern, publish.
fn bench_attach_cost(c: &mut Criterion) {
    let bench = Bench::new();
    let obj = bench.object(0, 7);

    c.bench_function("ic_attach_own_slot", |b| {
        b.iter(|| {
            let site = InlineCacheSite::new(CacheKind::GetProp);
            let mut ctx = GenerationContext::new(&bench.realm, &bench.heap);
            let mut generator =
                GetPropIrGenerator::new(Value::Object(black_box(obj.clone())), bench.key());
            black_box(site.run_cached(&mut ctx, &mut generator))
        });
    });
}

criterion_group!(
    benches,
    bench_monomorphic_hit,
    bench_polymorphic_scan,
    bench_megamorphic_hit,
    bench_attach_cost
);
criterion_main!(benches);
