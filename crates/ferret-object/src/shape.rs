//! Shapes: immutable layout descriptors shared between objects.
//!
//! A shape records an object's class, prototype, realm and property table.
//! Objects that gain properties in the same order share shapes through a
//! transition tree, which is what makes one-shape guards meaningful: two
//! objects with the same [`ShapeId`] have identical layouts and prototypes.
//! Every derived shape keeps a strong link to the shape it came from, so a
//! live shape pins its whole lineage; the transition table only holds weak
//! child links.
//!
//! Shapes are immutable once created except for two concerns with interior
//! mutability: the transition table (a cache of weak child links) and the
//! teleport-invalidation flag, which is monotonic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::atom::PropertyKey;
use crate::object::ObjectRef;
use crate::realm::RealmId;

/// Slots stored directly in the object before overflowing to the dynamic
/// slot array.
pub const FIXED_SLOT_CAPACITY: u16 = 8;

/// Dynamic slot arrays grow in chunks of this many slots.
pub const DYNAMIC_SLOT_CHUNK: u16 = 4;

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

// ==================== Identifiers and flags ====================

/// Runtime-unique shape identity. Guards compare these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ShapeId(u64);

impl ShapeId {
    fn next() -> Self {
        Self(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id bits.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

/// Coarse object classification, guarded with a one-byte immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClassKind {
    /// Ordinary object.
    Plain = 0,
    /// Dense array.
    Array = 1,
    /// Array iterator.
    ArrayIterator = 2,
    /// Callable function.
    Function = 3,
    /// Bound function exotic object.
    BoundFunction = 4,
    /// Proxy exotic object.
    Proxy = 5,
    /// Scope object on an environment chain.
    Environment = 6,
}

impl ClassKind {
    /// Decode from the guard immediate.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Plain),
            1 => Some(Self::Array),
            2 => Some(Self::ArrayIterator),
            3 => Some(Self::Function),
            4 => Some(Self::BoundFunction),
            5 => Some(Self::Proxy),
            6 => Some(Self::Environment),
            _ => None,
        }
    }
}

/// Property attribute triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Value may be replaced through ordinary assignment.
    pub writable: bool,
    /// Visible to enumeration.
    pub enumerable: bool,
    /// May be deleted or redefined.
    pub configurable: bool,
}

impl PropertyAttributes {
    /// `writable`, `enumerable` and `configurable` all set.
    pub const fn default_data() -> Self {
        Self { writable: true, enumerable: true, configurable: true }
    }

    /// Read-only, non-configurable data property.
    pub const fn read_only() -> Self {
        Self { writable: false, enumerable: false, configurable: false }
    }

    fn bits(self) -> u8 {
        (self.writable as u8) | (self.enumerable as u8) << 1 | (self.configurable as u8) << 2
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::default_data()
    }
}

/// Whether a property stores a value or an accessor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Plain data slot.
    Data,
    /// Two slots: getter at the base slot, setter right after it.
    Accessor,
}

/// Where a property's payload lives on the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotLocation {
    /// Inline slot.
    Fixed(u16),
    /// Slot in the overflow array.
    Dynamic(u16),
}

impl SlotLocation {
    fn from_linear(index: u32) -> Self {
        if index < u32::from(FIXED_SLOT_CAPACITY) {
            SlotLocation::Fixed(index as u16)
        } else {
            SlotLocation::Dynamic((index - u32::from(FIXED_SLOT_CAPACITY)) as u16)
        }
    }

    /// Linear slot index across the fixed and dynamic regions.
    pub fn linear(self) -> u32 {
        match self {
            SlotLocation::Fixed(i) => u32::from(i),
            SlotLocation::Dynamic(i) => u32::from(FIXED_SLOT_CAPACITY) + u32::from(i),
        }
    }

    /// The slot right after this one, used for accessor setter storage.
    pub fn successor(self) -> Self {
        Self::from_linear(self.linear() + 1)
    }
}

/// One property table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Data or accessor.
    pub kind: PropertyKind,
    /// Base slot.
    pub slot: SlotLocation,
    /// Attributes.
    pub attrs: PropertyAttributes,
}

impl PropertyInfo {
    /// True for writable data properties.
    pub fn is_writable_data(&self) -> bool {
        self.kind == PropertyKind::Data && self.attrs.writable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    key: PropertyKey,
    kind: PropertyKind,
    attr_bits: u8,
}

// ==================== Shape ====================

/// Immutable object layout descriptor. See the module docs.
pub struct Shape {
    id: ShapeId,
    realm: RealmId,
    class_kind: ClassKind,
    parent: Option<Arc<Shape>>,
    proto: Option<ObjectRef>,
    props: IndexMap<PropertyKey, PropertyInfo, FxBuildHasher>,
    slot_span: u32,
    last_added: Option<PropertyKey>,
    extensible: bool,
    used_as_prototype: bool,
    invalidated_teleporting: AtomicBool,
    transitions: RwLock<FxHashMap<TransitionKey, std::sync::Weak<Shape>>>,
}

impl Shape {
    /// Create a fresh base shape with an empty property table.
    pub fn base(realm: RealmId, class_kind: ClassKind, proto: Option<ObjectRef>) -> Arc<Self> {
        Arc::new(Self {
            id: ShapeId::next(),
            realm,
            class_kind,
            parent: None,
            proto,
            props: IndexMap::with_hasher(FxBuildHasher),
            slot_span: 0,
            last_added: None,
            extensible: true,
            used_as_prototype: false,
            invalidated_teleporting: AtomicBool::new(false),
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    /// The shape's identity.
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Realm the shape belongs to.
    #[inline]
    pub fn realm(&self) -> RealmId {
        self.realm
    }

    /// Coarse class.
    #[inline]
    pub fn class_kind(&self) -> ClassKind {
        self.class_kind
    }

    /// Shape this one was derived from. Holding the parent strongly keeps
    /// a live shape's whole lineage alive, so stubs guarding a superseded
    /// shape stay evaluable until the last descendant dies.
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// Prototype pinned by this shape.
    pub fn proto(&self) -> Option<&ObjectRef> {
        self.proto.as_ref()
    }

    /// Look up a property in this shape's table.
    pub fn property(&self, key: &PropertyKey) -> Option<PropertyInfo> {
        self.props.get(key).copied()
    }

    /// Number of named properties.
    pub fn property_count(&self) -> usize {
        self.props.len()
    }

    /// Property keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.props.keys()
    }

    /// Total slots this layout uses.
    #[inline]
    pub fn slot_span(&self) -> u32 {
        self.slot_span
    }

    /// Number of dynamic slots this layout uses.
    pub fn dynamic_slot_span(&self) -> u32 {
        self.slot_span.saturating_sub(u32::from(FIXED_SLOT_CAPACITY))
    }

    /// The most recently added property, if this shape came from an add
    /// transition. Add-property stubs check this against the key they cached.
    pub fn last_added(&self) -> Option<&PropertyKey> {
        self.last_added.as_ref()
    }

    /// Whether new properties may be added to objects of this shape.
    #[inline]
    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// Whether some object with this shape serves as a prototype.
    #[inline]
    pub fn is_used_as_prototype(&self) -> bool {
        self.used_as_prototype
    }

    /// Whether holder-only guard chains through this shape have been
    /// invalidated by a shadowing add or prototype mutation. Monotonic.
    #[inline]
    pub fn is_teleporting_invalidated(&self) -> bool {
        self.invalidated_teleporting.load(Ordering::Acquire)
    }

    /// Raise the teleport-invalidation flag.
    pub fn invalidate_teleporting(&self) {
        self.invalidated_teleporting.store(true, Ordering::Release);
    }

    // ---------------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------------

    /// Shape after adding `key` with the given kind and attributes.
    ///
    /// Cached: repeating the same add from the same parent yields the same
    /// child shape, so objects built the same way converge on one layout.
    pub fn transition_add(
        self: &Arc<Self>,
        key: PropertyKey,
        kind: PropertyKind,
        attrs: PropertyAttributes,
    ) -> Arc<Shape> {
        let tkey = TransitionKey { key: key.clone(), kind, attr_bits: attrs.bits() };

        if let Some(weak) = self.transitions.read().get(&tkey)
            && let Some(existing) = weak.upgrade()
        {
            return existing;
        }

        let mut transitions = self.transitions.write();
        // Double-check: another thread may have created the child while we
        // waited for the write lock.
        if let Some(weak) = transitions.get(&tkey)
            && let Some(existing) = weak.upgrade()
        {
            return existing;
        }

        let child = self.child_with_added(key, kind, attrs);
        transitions.insert(tkey, Arc::downgrade(&child));
        child
    }

    fn child_with_added(
        self: &Arc<Self>,
        key: PropertyKey,
        kind: PropertyKind,
        attrs: PropertyAttributes,
    ) -> Arc<Shape> {
        let mut span = self.slot_span;
        let slots_needed: u32 = match kind {
            PropertyKind::Data => 1,
            PropertyKind::Accessor => 2,
        };
        // An accessor pair must not straddle the fixed/dynamic boundary.
        if slots_needed == 2
            && span < u32::from(FIXED_SLOT_CAPACITY)
            && span + 1 >= u32::from(FIXED_SLOT_CAPACITY)
        {
            span = u32::from(FIXED_SLOT_CAPACITY);
        }
        let slot = SlotLocation::from_linear(span);
        let mut props = self.props.clone();
        props.insert(key.clone(), PropertyInfo { kind, slot, attrs });

        Arc::new(Shape {
            id: ShapeId::next(),
            realm: self.realm,
            class_kind: self.class_kind,
            parent: Some(Arc::clone(self)),
            proto: self.proto.clone(),
            props,
            slot_span: span + slots_needed,
            last_added: Some(key),
            extensible: self.extensible,
            used_as_prototype: self.used_as_prototype,
            invalidated_teleporting: AtomicBool::new(self.is_teleporting_invalidated()),
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    fn clone_with<F>(self: &Arc<Self>, adjust: F) -> Arc<Shape>
    where
        F: FnOnce(&mut ShapeParts),
    {
        let mut parts = ShapeParts {
            proto: self.proto.clone(),
            props: self.props.clone(),
            slot_span: self.slot_span,
            last_added: self.last_added.clone(),
            extensible: self.extensible,
            used_as_prototype: self.used_as_prototype,
            invalidated_teleporting: self.is_teleporting_invalidated(),
        };
        adjust(&mut parts);
        Arc::new(Shape {
            id: ShapeId::next(),
            realm: self.realm,
            class_kind: self.class_kind,
            parent: Some(Arc::clone(self)),
            proto: parts.proto,
            props: parts.props,
            slot_span: parts.slot_span,
            last_added: parts.last_added,
            extensible: parts.extensible,
            used_as_prototype: parts.used_as_prototype,
            invalidated_teleporting: AtomicBool::new(parts.invalidated_teleporting),
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    /// Uncached shape with `key` removed. Slot numbering of the surviving
    /// properties is preserved; the freed slot is not reused.
    pub fn without_property(self: &Arc<Self>, key: &PropertyKey) -> Arc<Shape> {
        self.clone_with(|parts| {
            parts.props.shift_remove(key);
            parts.last_added = None;
        })
    }

    /// Uncached shape with the same table but a different prototype.
    pub fn with_proto(self: &Arc<Self>, proto: Option<ObjectRef>) -> Arc<Shape> {
        self.clone_with(|parts| parts.proto = proto)
    }

    /// Uncached non-extensible copy.
    pub fn without_extensibility(self: &Arc<Self>) -> Arc<Shape> {
        self.clone_with(|parts| parts.extensible = false)
    }

    /// Uncached copy carrying the used-as-prototype mark.
    pub fn as_prototype(self: &Arc<Self>) -> Arc<Shape> {
        self.clone_with(|parts| parts.used_as_prototype = true)
    }

    /// Fresh identity for the same layout. Existing shape guards against
    /// the old identity stop matching.
    pub fn reshaped(self: &Arc<Self>) -> Arc<Shape> {
        self.clone_with(|_| {})
    }

    /// Fresh identity for the same layout, with teleporting invalidated.
    pub fn reshaped_invalidated(self: &Arc<Self>) -> Arc<Shape> {
        self.clone_with(|parts| parts.invalidated_teleporting = true)
    }

    /// Uncached shape with `key`'s entry replaced in place. Used when a
    /// property changes attributes or flips between data and accessor
    /// without moving slots.
    pub fn with_replaced_property(self: &Arc<Self>, key: &PropertyKey, info: PropertyInfo) -> Arc<Shape> {
        self.clone_with(|parts| {
            parts.props.insert(key.clone(), info);
            parts.last_added = None;
        })
    }
}

struct ShapeParts {
    proto: Option<ObjectRef>,
    props: IndexMap<PropertyKey, PropertyInfo, FxBuildHasher>,
    slot_span: u32,
    last_added: Option<PropertyKey>,
    extensible: bool,
    used_as_prototype: bool,
    invalidated_teleporting: bool,
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id.bits())
            .field("class", &self.class_kind)
            .field("props", &self.props.len())
            .field("slot_span", &self.slot_span)
            .finish()
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::realm::RealmId;

    fn key(table: &AtomTable, name: &str) -> PropertyKey {
        PropertyKey::Atom(table.intern(name))
    }

    #[test]
    fn test_transition_sharing() {
        let table = AtomTable::new();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let attrs = PropertyAttributes::default_data();

        let a1 = base.transition_add(key(&table, "x"), PropertyKind::Data, attrs);
        let a2 = base.transition_add(key(&table, "x"), PropertyKind::Data, attrs);
        assert_eq!(a1.id(), a2.id());

        let b = base.transition_add(key(&table, "y"), PropertyKind::Data, attrs);
        assert_ne!(a1.id(), b.id());

        // Same key, different attributes: a distinct child.
        let c = base.transition_add(key(&table, "x"), PropertyKind::Data, PropertyAttributes::read_only());
        assert_ne!(a1.id(), c.id());
    }

    #[test]
    fn test_slot_allocation_crosses_fixed_boundary() {
        let table = AtomTable::new();
        let mut shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let attrs = PropertyAttributes::default_data();

        for i in 0..FIXED_SLOT_CAPACITY + 2 {
            shape = shape.transition_add(key(&table, &format!("p{i}")), PropertyKind::Data, attrs);
        }
        let first = shape.property(&key(&table, "p0")).unwrap();
        assert_eq!(first.slot, SlotLocation::Fixed(0));
        let overflow = shape.property(&key(&table, &format!("p{FIXED_SLOT_CAPACITY}"))).unwrap();
        assert_eq!(overflow.slot, SlotLocation::Dynamic(0));
    }

    #[test]
    fn test_accessor_takes_two_slots() {
        let table = AtomTable::new();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let shape = base.transition_add(
            key(&table, "prop"),
            PropertyKind::Accessor,
            PropertyAttributes::default_data(),
        );
        assert_eq!(shape.slot_span(), 2);
        let info = shape.property(&key(&table, "prop")).unwrap();
        assert_eq!(info.slot.successor().linear(), info.slot.linear() + 1);
    }

    #[test]
    fn test_accessor_never_straddles_boundary() {
        let table = AtomTable::new();
        let attrs = PropertyAttributes::default_data();
        let mut shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        for i in 0..FIXED_SLOT_CAPACITY - 1 {
            shape = shape.transition_add(key(&table, &format!("p{i}")), PropertyKind::Data, attrs);
        }
        let shape = shape.transition_add(key(&table, "acc"), PropertyKind::Accessor, attrs);
        let info = shape.property(&key(&table, "acc")).unwrap();
        assert_eq!(info.slot, SlotLocation::Dynamic(0));
    }

    #[test]
    fn test_last_added_tracking() {
        let table = AtomTable::new();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let attrs = PropertyAttributes::default_data();
        assert!(base.last_added().is_none());

        let shape = base.transition_add(key(&table, "x"), PropertyKind::Data, attrs);
        assert_eq!(shape.last_added(), Some(&key(&table, "x")));

        let shrunk = shape.without_property(&key(&table, "x"));
        assert!(shrunk.last_added().is_none());
        assert_ne!(shrunk.id(), shape.id());
    }

    #[test]
    fn test_reshape_preserves_layout_changes_identity() {
        let table = AtomTable::new();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let shape = base.transition_add(
            key(&table, "x"),
            PropertyKind::Data,
            PropertyAttributes::default_data(),
        );
        let reshaped = shape.reshaped_invalidated();
        assert_ne!(shape.id(), reshaped.id());
        assert!(!shape.is_teleporting_invalidated());
        assert!(reshaped.is_teleporting_invalidated());
        assert_eq!(
            shape.property(&key(&table, "x")),
            reshaped.property(&key(&table, "x"))
        );
    }

    #[test]
    fn test_child_keeps_parent_lineage_alive() {
        let table = AtomTable::new();
        let attrs = PropertyAttributes::default_data();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let mid = base.transition_add(key(&table, "a"), PropertyKind::Data, attrs);
        let leaf = mid.transition_add(key(&table, "b"), PropertyKind::Data, attrs);

        // Dropping the intermediate handle must not kill the shape: a
        // stub guarding `mid` stays evaluable while `leaf` lives.
        let mid_weak = Arc::downgrade(&mid);
        drop(mid);
        drop(base);
        assert!(mid_weak.upgrade().is_some());
        assert!(leaf.parent().is_some_and(|p| p.property(&key(&table, "a")).is_some()));

        drop(leaf);
        assert!(mid_weak.upgrade().is_none());
    }

    #[test]
    fn test_reshape_links_back_to_source() {
        let table = AtomTable::new();
        let base = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let shape = base.transition_add(
            key(&table, "x"),
            PropertyKind::Data,
            PropertyAttributes::default_data(),
        );
        let old_weak = Arc::downgrade(&shape);
        let reshaped = shape.reshaped_invalidated();
        drop(shape);
        // The superseded identity survives through the reshape's parent
        // link, so old-shape guards can still load and miss it.
        assert!(old_weak.upgrade().is_some());
        assert_eq!(reshaped.parent().map(|p| p.id()), old_weak.upgrade().map(|p| p.id()));
    }

    #[test]
    fn test_delete_preserves_surviving_slots() {
        let table = AtomTable::new();
        let attrs = PropertyAttributes::default_data();
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None)
            .transition_add(key(&table, "a"), PropertyKind::Data, attrs)
            .transition_add(key(&table, "b"), PropertyKind::Data, attrs);
        let b_slot = shape.property(&key(&table, "b")).unwrap().slot;

        let shrunk = shape.without_property(&key(&table, "a"));
        assert!(shrunk.property(&key(&table, "a")).is_none());
        assert_eq!(shrunk.property(&key(&table, "b")).unwrap().slot, b_slot);
        assert_eq!(shrunk.slot_span(), shape.slot_span());
    }
}
