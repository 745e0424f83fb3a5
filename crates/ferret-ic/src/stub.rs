//! Attached stubs and the shared stub-info pool.
//!
//! A finished stream splits in two at publish time. The shape-agnostic
//! part (byte code, field type layout, input count) becomes a
//! [`CacheIrStubInfo`] interned in a process-wide pool, so every site
//! caching the same access pattern shares one description. The
//! per-stub constants stay in a private [`StubData`]; its strongly-held
//! fields get a pre-write barrier when the stub becomes reachable.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use ferret_cacheir::health::{CacheHealth, classify, stream_cost};
use ferret_cacheir::ops::CacheOp;
use ferret_cacheir::stub_field::{FieldType, StubField};
use ferret_cacheir::writer::CacheIrStream;
use ferret_object::Heap;

// ==================== Cache kind ====================

/// Which bytecode operation a cache site serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// `obj.prop` and `obj[key]` reads.
    GetProp,
    /// `obj.prop = v` and `obj[key] = v` writes.
    SetProp,
    /// `key in obj` and `hasOwnProperty`.
    HasProp,
    /// Free-name reads off the environment chain.
    GetName,
    /// Call sites.
    Call,
    /// Relational and equality operators.
    Compare,
    /// Unary numeric operators.
    UnaryArith,
    /// Binary numeric and concatenation operators.
    BinaryArith,
    /// `typeof`.
    TypeOf,
    /// `instanceof`.
    InstanceOf,
    /// Iterator acquisition in `for..of` heads.
    GetIterator,
    /// Object-literal allocation.
    NewObject,
    /// Array-literal allocation.
    NewArray,
}

impl CacheKind {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            CacheKind::GetProp => "GetProp",
            CacheKind::SetProp => "SetProp",
            CacheKind::HasProp => "HasProp",
            CacheKind::GetName => "GetName",
            CacheKind::Call => "Call",
            CacheKind::Compare => "Compare",
            CacheKind::UnaryArith => "UnaryArith",
            CacheKind::BinaryArith => "BinaryArith",
            CacheKind::TypeOf => "TypeOf",
            CacheKind::InstanceOf => "InstanceOf",
            CacheKind::GetIterator => "GetIterator",
            CacheKind::NewObject => "NewObject",
            CacheKind::NewArray => "NewArray",
        }
    }
}

// ==================== Stub info ====================

/// The shareable half of a stub: everything except the constants.
#[derive(Debug)]
pub struct CacheIrStubInfo {
    kind: CacheKind,
    name: &'static str,
    code: Vec<u8>,
    field_types: Vec<FieldType>,
    input_count: u16,
    ops: Vec<CacheOp>,
    cost: u32,
}

impl CacheIrStubInfo {
    /// Cache kind this stub serves.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Stub name assembled by the generator, `"GetProp.OwnFixedSlot"`
    /// style.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The encoded instructions.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Field type tags in offset order.
    pub fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    /// Number of cache inputs.
    pub fn input_count(&self) -> u16 {
        self.input_count
    }

    /// Decoded op sequence.
    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    /// Total op cost.
    pub fn health_cost(&self) -> u32 {
        self.cost
    }

    /// Health rating.
    pub fn health(&self) -> CacheHealth {
        classify(self.cost)
    }
}

#[derive(Hash, PartialEq, Eq)]
struct StubInfoKey {
    kind: CacheKind,
    name: &'static str,
    code: Vec<u8>,
    field_types: Vec<FieldType>,
    input_count: u16,
}

static STUB_INFO_POOL: LazyLock<DashMap<StubInfoKey, Arc<CacheIrStubInfo>>> =
    LazyLock::new(DashMap::new);

/// Number of distinct stub infos interned process-wide.
pub fn stub_info_pool_len() -> usize {
    STUB_INFO_POOL.len()
}

fn intern_stub_info(kind: CacheKind, name: &'static str, stream: &CacheIrStream) -> Arc<CacheIrStubInfo> {
    let key = StubInfoKey {
        kind,
        name,
        code: stream.code().to_vec(),
        field_types: stream.field_types(),
        input_count: stream.input_count(),
    };
    if let Some(existing) = STUB_INFO_POOL.get(&key) {
        return Arc::clone(&existing);
    }
    let info = Arc::new(CacheIrStubInfo {
        kind,
        name,
        code: stream.code().to_vec(),
        field_types: stream.field_types(),
        input_count: stream.input_count(),
        ops: stream.ops().to_vec(),
        cost: stream_cost(stream.ops()),
    });
    STUB_INFO_POOL
        .entry(key)
        .or_insert(info)
        .value()
        .clone()
}

// ==================== Stub data ====================

/// The per-stub constants, in field-offset order.
#[derive(Debug)]
pub struct StubData {
    fields: Vec<StubField>,
}

impl StubData {
    /// Fields in offset order.
    pub fn fields(&self) -> &[StubField] {
        &self.fields
    }

    /// True when any weakly-held field has been swept. Such stubs can
    /// never pass their guards again and get pruned by the site.
    pub fn any_cleared(&self) -> bool {
        self.fields.iter().any(StubField::is_cleared)
    }
}

/// A published stub: shared info plus private data.
#[derive(Debug)]
pub struct AttachedStub {
    info: Arc<CacheIrStubInfo>,
    data: StubData,
}

impl AttachedStub {
    /// The shared description.
    pub fn info(&self) -> &Arc<CacheIrStubInfo> {
        &self.info
    }

    /// The private constants.
    pub fn data(&self) -> &StubData {
        &self.data
    }
}

/// Split a finished stream into an attached stub, interning its info
/// and firing a pre-write barrier for each strongly-held field.
pub fn build_stub(
    kind: CacheKind,
    name: &'static str,
    stream: CacheIrStream,
    heap: &Heap,
) -> AttachedStub {
    let info = intern_stub_info(kind, name, &stream);
    let (_code, fields, _input_count, _ops) = stream.into_parts();
    for field in &fields {
        if field.needs_barrier() {
            heap.note_pre_write_barrier();
        }
    }
    AttachedStub { info, data: StubData { fields } }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_cacheir::writer::CacheIrWriter;
    use ferret_object::{ClassKind, RealmId, Shape};

    fn guarded_load(shape: &Arc<Shape>, slot: u64) -> CacheIrStream {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_shape(obj, shape);
        writer.load_fixed_slot_result(obj, slot);
        writer.return_from_ic();
        writer.finish().expect("stream should finish")
    }

    #[test]
    fn test_same_pattern_shares_info() {
        let heap = Heap::new();
        let shape_a = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let shape_b = Shape::base(RealmId::new(0), ClassKind::Plain, None);

        let stub_a = build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape_a, 0), &heap);
        let stub_b = build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape_b, 0), &heap);

        // Identical code and layout, distinct constants.
        assert!(Arc::ptr_eq(stub_a.info(), stub_b.info()));
        assert_eq!(stub_a.info().input_count(), 1);
        assert_eq!(stub_a.data().fields().len(), 2);
    }

    #[test]
    fn test_distinct_slots_do_not_share() {
        let heap = Heap::new();
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);

        // The slot index is a field, so it changes the data, not the
        // code; but dedup keys on code bytes, which embed only offsets.
        // Two streams over different slots still share code when their
        // field layouts match.
        let stub_a = build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape, 0), &heap);
        let stub_b = build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape, 5), &heap);
        assert!(Arc::ptr_eq(stub_a.info(), stub_b.info()));
        assert!(!stub_a.data().fields()[1].needs_barrier());
        assert_ne!(
            stub_a.data().fields()[1].raw_word_value(),
            stub_b.data().fields()[1].raw_word_value()
        );
    }

    #[test]
    fn test_publish_barriers_strong_fields_only() {
        let heap = Heap::new();
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);

        let before = heap.pre_write_barrier_count();
        // Weak shape and raw word: no barriers.
        build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape, 0), &heap);
        assert_eq!(heap.pre_write_barrier_count(), before);

        // A strong shape field barriers once.
        let mut writer = CacheIrWriter::new();
        let mut flags = ferret_cacheir::CallFlags::standard();
        flags.constructing = true;
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.meta_scripted_this_shape(&shape);
        writer.call_scripted_function(obj, flags, 0);
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");
        build_stub(CacheKind::Call, "Call.ScriptedConstructor", stream, &heap);
        assert_eq!(heap.pre_write_barrier_count(), before + 1);
    }

    #[test]
    fn test_cleared_weak_detection() {
        let heap = Heap::new();
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let stub = build_stub(CacheKind::GetProp, "GetProp.OwnFixedSlot", guarded_load(&shape, 0), &heap);
        assert!(!stub.data().any_cleared());
        drop(shape);
        assert!(stub.data().any_cleared());
    }
}
