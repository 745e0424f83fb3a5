//! Stub fields: the out-of-line constant table attached to each stub.
//!
//! The byte stream stays position-independent by keeping every pointer
//! and 64-bit constant out of line in a per-stub field array. An
//! instruction references a field by its word offset, a single byte on
//! the wire. The writer deduplicates fields and hands out offsets in
//! first-reference order, so readers can validate references by counting
//! first occurrences, with no side table.
//!
//! Fields come in strong and weak flavors. Strong fields keep their
//! referent alive and get a pre-write barrier when the stub is published.
//! Weak fields do not: a guard that finds its weak field cleared simply
//! fails, and sweeping such stubs is the cache site's job.

use std::sync::{Arc, Weak};

use ferret_object::{AllocSite, Atom, JsObject, JsSymbol, ObjectRef, PropertyKey, Script, Shape};
use rustc_hash::FxHashMap;

use crate::error::{CacheIrError, CacheIrResult};

/// Most stub fields a single stub may carry. Streams needing more are
/// considered too polymorphic to be worth attaching.
pub const MAX_STUB_FIELDS: usize = 32;

// ==================== Offsets and types ====================

/// Word offset of a field within a stub's data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FieldOffset(u8);

impl FieldOffset {
    /// Wrap a raw word offset.
    #[inline]
    pub const fn new(word: u8) -> Self {
        Self(word)
    }

    /// The raw word offset, as encoded on the wire.
    #[inline]
    pub const fn word(self) -> u8 {
        self.0
    }

    /// The offset as an index into the field array.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Discriminant of a [`StubField`], recorded per offset so shared stub
/// code knows how to interpret each data word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    /// Untyped 64-bit word (slot offsets, counts, packed flag words).
    RawWord = 0,
    /// Signed 64-bit constant.
    RawInt64,
    /// Floating-point constant.
    Double,
    /// Strongly-held shape.
    Shape,
    /// Weakly-held shape.
    WeakShape,
    /// Strongly-held object.
    Object,
    /// Weakly-held object.
    WeakObject,
    /// Interned string.
    Atom,
    /// Symbol.
    Symbol,
    /// Weakly-held script.
    WeakScript,
    /// Property key.
    Id,
    /// Allocation-site record.
    AllocSite,
}

impl FieldType {
    /// Whether publishing a field of this type must notify the collector.
    /// Only strong references into collector-managed data qualify.
    pub const fn needs_barrier(self) -> bool {
        matches!(
            self,
            FieldType::Shape
                | FieldType::Object
                | FieldType::Atom
                | FieldType::Symbol
                | FieldType::Id
        )
    }

    /// Short name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::RawWord => "raw word",
            FieldType::RawInt64 => "raw int64",
            FieldType::Double => "double",
            FieldType::Shape => "shape",
            FieldType::WeakShape => "weak shape",
            FieldType::Object => "object",
            FieldType::WeakObject => "weak object",
            FieldType::Atom => "atom",
            FieldType::Symbol => "symbol",
            FieldType::WeakScript => "weak script",
            FieldType::Id => "id",
            FieldType::AllocSite => "alloc site",
        }
    }
}

// ==================== StubField ====================

/// One out-of-line constant.
#[derive(Clone, Debug)]
pub enum StubField {
    /// Untyped word.
    RawWord(u64),
    /// Signed 64-bit constant.
    RawInt64(i64),
    /// Floating-point constant.
    Double(f64),
    /// Strong shape reference.
    Shape(Arc<Shape>),
    /// Weak shape reference.
    WeakShape(Weak<Shape>),
    /// Strong object reference.
    Object(ObjectRef),
    /// Weak object reference.
    WeakObject(Weak<JsObject>),
    /// Interned string.
    Atom(Atom),
    /// Symbol.
    Symbol(JsSymbol),
    /// Weak script reference.
    WeakScript(Weak<Script>),
    /// Property key.
    Id(PropertyKey),
    /// Allocation-site record.
    AllocSite(Arc<AllocSite>),
}

impl StubField {
    /// This field's type tag.
    pub fn field_type(&self) -> FieldType {
        match self {
            StubField::RawWord(_) => FieldType::RawWord,
            StubField::RawInt64(_) => FieldType::RawInt64,
            StubField::Double(_) => FieldType::Double,
            StubField::Shape(_) => FieldType::Shape,
            StubField::WeakShape(_) => FieldType::WeakShape,
            StubField::Object(_) => FieldType::Object,
            StubField::WeakObject(_) => FieldType::WeakObject,
            StubField::Atom(_) => FieldType::Atom,
            StubField::Symbol(_) => FieldType::Symbol,
            StubField::WeakScript(_) => FieldType::WeakScript,
            StubField::Id(_) => FieldType::Id,
            StubField::AllocSite(_) => FieldType::AllocSite,
        }
    }

    /// Whether publishing this field must notify the collector.
    pub fn needs_barrier(&self) -> bool {
        self.field_type().needs_barrier()
    }

    /// Identity bits used for dedup keys. Pointer fields use the referent
    /// address; immediates use their value bits.
    pub fn identity_bits(&self) -> u64 {
        match self {
            StubField::RawWord(w) => *w,
            StubField::RawInt64(i) => *i as u64,
            StubField::Double(d) => d.to_bits(),
            StubField::Shape(s) => Arc::as_ptr(s) as usize as u64,
            StubField::WeakShape(w) => Weak::as_ptr(w) as usize as u64,
            StubField::Object(o) => Arc::as_ptr(o) as usize as u64,
            StubField::WeakObject(w) => Weak::as_ptr(w) as usize as u64,
            StubField::Atom(a) => a.identity() as u64,
            StubField::Symbol(s) => s.id(),
            StubField::WeakScript(w) => Weak::as_ptr(w) as usize as u64,
            StubField::Id(k) => k.identity_bits(),
            StubField::AllocSite(s) => Arc::as_ptr(s) as usize as u64,
        }
    }

    /// True when this is a weak field whose referent has been swept.
    pub fn is_cleared(&self) -> bool {
        match self {
            StubField::WeakShape(w) => w.upgrade().is_none(),
            StubField::WeakObject(w) => w.upgrade().is_none(),
            StubField::WeakScript(w) => w.upgrade().is_none(),
            _ => false,
        }
    }

    /// Clone the field for a new stub, refusing to copy cleared weak
    /// references.
    pub fn checked_clone(&self) -> CacheIrResult<StubField> {
        if self.is_cleared() {
            return Err(CacheIrError::ClearedWeakReference {
                what: self.field_type().name(),
            });
        }
        Ok(self.clone())
    }

    // ---------------------------------------------------------------------------
    // Typed accessors. Weak variants upgrade; a cleared weak reads as
    // absent, which guard evaluation treats as failure.
    // ---------------------------------------------------------------------------

    /// The shape payload of a `Shape` or `WeakShape` field.
    pub fn shape_value(&self) -> Option<Arc<Shape>> {
        match self {
            StubField::Shape(s) => Some(Arc::clone(s)),
            StubField::WeakShape(w) => w.upgrade(),
            _ => None,
        }
    }

    /// The object payload of an `Object` or `WeakObject` field.
    pub fn object_value(&self) -> Option<ObjectRef> {
        match self {
            StubField::Object(o) => Some(Arc::clone(o)),
            StubField::WeakObject(w) => w.upgrade(),
            _ => None,
        }
    }

    /// The script payload of a `WeakScript` field.
    pub fn script_value(&self) -> Option<Arc<Script>> {
        match self {
            StubField::WeakScript(w) => w.upgrade(),
            _ => None,
        }
    }

    /// The atom payload.
    pub fn atom_value(&self) -> Option<&Atom> {
        match self {
            StubField::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// The symbol payload.
    pub fn symbol_value(&self) -> Option<&JsSymbol> {
        match self {
            StubField::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The property-key payload.
    pub fn key_value(&self) -> Option<&PropertyKey> {
        match self {
            StubField::Id(k) => Some(k),
            _ => None,
        }
    }

    /// The untyped word payload.
    pub fn raw_word_value(&self) -> Option<u64> {
        match self {
            StubField::RawWord(w) => Some(*w),
            _ => None,
        }
    }

    /// The allocation-site payload.
    pub fn alloc_site_value(&self) -> Option<&Arc<AllocSite>> {
        match self {
            StubField::AllocSite(s) => Some(s),
            _ => None,
        }
    }
}

// ==================== FieldStore ====================

/// Write-side field table with content dedup.
///
/// Interning the same constant twice yields the same offset, keyed on
/// the field type plus identity bits, so `0.0` and `-0.0` doubles and a
/// strong versus weak reference to one object all stay distinct.
#[derive(Default)]
pub struct FieldStore {
    fields: Vec<StubField>,
    dedup: FxHashMap<(FieldType, u64), FieldOffset>,
}

impl FieldStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a field, returning its word offset.
    pub fn intern(&mut self, field: StubField) -> FieldOffset {
        let key = (field.field_type(), field.identity_bits());
        if let Some(existing) = self.dedup.get(&key) {
            return *existing;
        }
        debug_assert!(self.fields.len() < u8::MAX as usize);
        let offset = FieldOffset::new(self.fields.len() as u8);
        self.fields.push(field);
        self.dedup.insert(key, offset);
        offset
    }

    /// Number of distinct fields interned.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields have been interned.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at `offset`, if in range.
    pub fn get(&self, offset: FieldOffset) -> Option<&StubField> {
        self.fields.get(offset.index())
    }

    /// All fields in offset order.
    pub fn as_slice(&self) -> &[StubField] {
        &self.fields
    }

    /// Type tags in offset order.
    pub fn field_types(&self) -> Vec<FieldType> {
        self.fields.iter().map(StubField::field_type).collect()
    }

    /// Consume the store, keeping the fields.
    pub fn into_fields(self) -> Vec<StubField> {
        self.fields
    }
}

// ==================== FieldCursor ====================

/// Read-side cursor enforcing first-reference order.
///
/// Offsets are interned in the order the stream first mentions them, so
/// a valid stream only ever references offsets up to one past the
/// highest seen so far. The cursor tracks that watermark; `reset` starts
/// a fresh pass over the same fields.
pub struct FieldCursor<'a> {
    fields: &'a [StubField],
    seen: usize,
}

impl<'a> FieldCursor<'a> {
    /// Cursor over a stub's fields.
    pub fn new(fields: &'a [StubField]) -> Self {
        Self { fields, seen: 0 }
    }

    /// Read the field at `offset`, advancing the watermark on a first
    /// reference.
    pub fn read(&mut self, offset: FieldOffset) -> CacheIrResult<&'a StubField> {
        let index = offset.index();
        if index >= self.fields.len() {
            return Err(CacheIrError::FieldOffsetOutOfRange {
                offset: offset.word(),
                len: self.fields.len(),
            });
        }
        if index > self.seen {
            return Err(CacheIrError::NonMonotonicFieldRead {
                offset: offset.word(),
                seen: self.seen as u8,
            });
        }
        if index == self.seen {
            self.seen += 1;
        }
        Ok(&self.fields[index])
    }

    /// Number of distinct fields referenced so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Start a fresh pass.
    pub fn reset(&mut self) {
        self.seen = 0;
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_object::{ClassKind, RealmId};

    fn test_shape() -> Arc<Shape> {
        Shape::base(RealmId::new(0), ClassKind::Plain, None)
    }

    #[test]
    fn test_dedup_by_identity() {
        let shape_a = test_shape();
        let shape_b = test_shape();
        let mut store = FieldStore::new();

        let off_a1 = store.intern(StubField::Shape(Arc::clone(&shape_a)));
        let off_b = store.intern(StubField::Shape(Arc::clone(&shape_b)));
        let off_a2 = store.intern(StubField::Shape(Arc::clone(&shape_a)));

        assert_eq!(off_a1, off_a2);
        assert_ne!(off_a1, off_b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dedup_distinguishes_strength() {
        let shape = test_shape();
        let mut store = FieldStore::new();

        let strong = store.intern(StubField::Shape(Arc::clone(&shape)));
        let weak = store.intern(StubField::WeakShape(Arc::downgrade(&shape)));
        assert_ne!(strong, weak);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dedup_raw_values() {
        let mut store = FieldStore::new();
        let a = store.intern(StubField::RawWord(7));
        let b = store.intern(StubField::RawWord(7));
        let c = store.intern(StubField::RawWord(8));
        assert_eq!(a, b);
        assert_ne!(a, c);

        // Negative zero and positive zero are distinct constants.
        let pz = store.intern(StubField::Double(0.0));
        let nz = store.intern(StubField::Double(-0.0));
        assert_ne!(pz, nz);
    }

    #[test]
    fn test_barrier_classification() {
        let shape = test_shape();
        assert!(StubField::Shape(Arc::clone(&shape)).needs_barrier());
        assert!(!StubField::WeakShape(Arc::downgrade(&shape)).needs_barrier());
        assert!(!StubField::RawWord(0).needs_barrier());
        assert!(!StubField::Double(1.5).needs_barrier());
        assert!(StubField::Id(PropertyKey::Index(3)).needs_barrier());
    }

    #[test]
    fn test_cleared_weak_detection() {
        let shape = test_shape();
        let weak = StubField::WeakShape(Arc::downgrade(&shape));
        assert!(!weak.is_cleared());
        assert!(weak.checked_clone().is_ok());

        drop(shape);
        assert!(weak.is_cleared());
        assert!(matches!(
            weak.checked_clone(),
            Err(CacheIrError::ClearedWeakReference { .. })
        ));
        assert!(weak.shape_value().is_none());
    }

    #[test]
    fn test_cursor_enforces_first_reference_order() {
        let fields = vec![
            StubField::RawWord(0),
            StubField::RawWord(1),
            StubField::RawWord(2),
        ];
        let mut cursor = FieldCursor::new(&fields);

        assert!(cursor.read(FieldOffset::new(0)).is_ok());
        // Re-reading an already-seen offset is fine.
        assert!(cursor.read(FieldOffset::new(0)).is_ok());
        // Skipping ahead is not.
        assert!(matches!(
            cursor.read(FieldOffset::new(2)),
            Err(CacheIrError::NonMonotonicFieldRead { offset: 2, seen: 1 })
        ));
        assert!(cursor.read(FieldOffset::new(1)).is_ok());
        assert!(cursor.read(FieldOffset::new(2)).is_ok());
        assert_eq!(cursor.seen(), 3);

        assert!(matches!(
            cursor.read(FieldOffset::new(9)),
            Err(CacheIrError::FieldOffsetOutOfRange { offset: 9, len: 3 })
        ));

        cursor.reset();
        assert_eq!(cursor.seen(), 0);
        assert!(cursor.read(FieldOffset::new(0)).is_ok());
    }
}
