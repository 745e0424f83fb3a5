//! Native objects: slots, dense elements and layout mutation.
//!
//! `JsObject` pairs an immutable [`Shape`] with mutable storage. All layout
//! changes go through the methods here so the heap can reshape prototype
//! chains when a mutation would invalidate holder-only guard paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::atom::{Atom, PropertyKey};
use crate::heap::Heap;
use crate::shape::{
    ClassKind, FIXED_SLOT_CAPACITY, PropertyAttributes, PropertyInfo, PropertyKind, Shape,
    SlotLocation,
};
use crate::value::Value;

/// Shared, thread-safe object handle. Identity is `Arc` identity.
pub type ObjectRef = Arc<JsObject>;

// ==================== Script ====================

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

/// A compiled-code identity for scripted functions.
///
/// The cache engine never executes scripts; it only needs a stable identity
/// to guard on (closures cloned from the same source share a script) and a
/// flag saying whether a callable entry point exists yet.
#[derive(Debug)]
pub struct Script {
    id: u64,
    name: Option<Atom>,
    compiled_entry: AtomicBool,
}

impl Script {
    /// Create a script identity without a compiled entry.
    pub fn new(name: Option<Atom>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            compiled_entry: AtomicBool::new(false),
        })
    }

    /// Runtime-unique id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Diagnostic name.
    pub fn name(&self) -> Option<&Atom> {
        self.name.as_ref()
    }

    /// Whether a callable entry point has been produced for this script.
    #[inline]
    pub fn has_compiled_entry(&self) -> bool {
        self.compiled_entry.load(Ordering::Acquire)
    }

    /// Mark the script as having a callable entry point.
    pub fn set_compiled_entry(&self) {
        self.compiled_entry.store(true, Ordering::Release);
    }
}

// ==================== Function payloads ====================

/// Arguments handed to a native function.
pub struct NativeCallArgs<'a> {
    /// The `this` value.
    pub this: Value,
    /// Positional arguments.
    pub args: &'a [Value],
}

/// A built-in function implemented in Rust.
pub type NativeFn = fn(&NativeCallArgs<'_>) -> Value;

/// Payload of `ClassKind::Function` objects.
#[derive(Clone)]
pub struct FunctionData {
    /// Diagnostic name.
    pub name: Option<Atom>,
    /// Declared argument count.
    pub nargs: u16,
    /// Scripted body identity, when this is a scripted function.
    pub script: Option<Arc<Script>>,
    /// Native entry point, when this is a built-in.
    pub native: Option<NativeFn>,
    /// Class constructors must not be called without `new`.
    pub is_class_constructor: bool,
}

impl FunctionData {
    /// True when a scripted body is present.
    pub fn is_scripted(&self) -> bool {
        self.script.is_some()
    }

    /// Packed word carried alongside function-identity guards so downstream
    /// compilers can recover the arity and flags without another load.
    pub fn nargs_and_flags_word(&self) -> u64 {
        u64::from(self.nargs)
            | (self.is_class_constructor as u64) << 16
            | (self.script.is_some() as u64) << 17
    }
}

/// Payload of bound-function exotic objects.
#[derive(Clone)]
pub struct BoundFunctionData {
    /// The wrapped callable.
    pub target: ObjectRef,
    /// `this` fixed at bind time.
    pub bound_this: Value,
    /// Arguments fixed at bind time, prepended to call arguments.
    pub bound_args: Vec<Value>,
}

// ==================== Proxy payload ====================

/// Proxy trap table. Handlers run arbitrary logic, which is why pure
/// lookup refuses to walk through proxies.
pub trait ProxyHandler: Send + Sync {
    /// `[[Get]]` trap.
    fn get(&self, target: &ObjectRef, key: &PropertyKey) -> Value;
    /// `[[Set]]` trap. Returns false when the store was refused.
    fn set(&self, heap: &Heap, target: &ObjectRef, key: &PropertyKey, value: Value) -> bool;
    /// `[[Has]]` trap.
    fn has(&self, target: &ObjectRef, key: &PropertyKey) -> bool;
}

/// Handler that forwards structurally to the target's data properties.
pub struct ForwardingHandler;

impl ProxyHandler for ForwardingHandler {
    fn get(&self, target: &ObjectRef, key: &PropertyKey) -> Value {
        let mut current = Arc::clone(target);
        loop {
            if let PropertyKey::Index(index) = key
                && let Some(value) = current.element(*index)
            {
                return value;
            }
            let shape = current.shape();
            if let Some(info) = shape.property(key) {
                if info.kind == PropertyKind::Data {
                    return current.read_slot(info.slot);
                }
                return Value::Undefined;
            }
            match shape.proto() {
                Some(proto) => current = Arc::clone(proto),
                None => return Value::Undefined,
            }
        }
    }

    fn set(&self, heap: &Heap, target: &ObjectRef, key: &PropertyKey, value: Value) -> bool {
        target.define_data_property(heap, key.clone(), value, PropertyAttributes::default_data())
    }

    fn has(&self, target: &ObjectRef, key: &PropertyKey) -> bool {
        let mut current = Arc::clone(target);
        loop {
            if let PropertyKey::Index(index) = key
                && current.element(*index).is_some()
            {
                return true;
            }
            let shape = current.shape();
            if shape.property(key).is_some() {
                return true;
            }
            match shape.proto() {
                Some(proto) => current = Arc::clone(proto),
                None => return false,
            }
        }
    }
}

/// Payload of proxy objects.
pub struct ProxyData {
    /// Proxy target.
    pub target: ObjectRef,
    /// Trap table.
    pub handler: Box<dyn ProxyHandler>,
}

// ==================== Object kind ====================

/// Per-kind payload. The variant always matches the shape's [`ClassKind`].
pub enum ObjectKind {
    /// Ordinary object.
    Plain,
    /// Dense array.
    Array,
    /// Array iterator over a target array.
    ArrayIterator {
        /// The iterated array.
        target: ObjectRef,
        /// Next element index.
        next_index: AtomicU32,
    },
    /// Callable function.
    Function(FunctionData),
    /// Bound function.
    BoundFunction(BoundFunctionData),
    /// Proxy.
    Proxy(ProxyData),
    /// Environment-chain scope object.
    Environment {
        /// Next scope outward, `None` at the chain end.
        enclosing: Option<ObjectRef>,
    },
}

impl ObjectKind {
    fn class_kind(&self) -> ClassKind {
        match self {
            ObjectKind::Plain => ClassKind::Plain,
            ObjectKind::Array => ClassKind::Array,
            ObjectKind::ArrayIterator { .. } => ClassKind::ArrayIterator,
            ObjectKind::Function(_) => ClassKind::Function,
            ObjectKind::BoundFunction(_) => ClassKind::BoundFunction,
            ObjectKind::Proxy(_) => ClassKind::Proxy,
            ObjectKind::Environment { .. } => ClassKind::Environment,
        }
    }
}

// ==================== Storage ====================

#[derive(Default)]
struct SlotStorage {
    fixed: SmallVec<[Value; FIXED_SLOT_CAPACITY as usize]>,
    dynamic: Vec<Value>,
}

impl SlotStorage {
    fn read(&self, slot: SlotLocation) -> Value {
        match slot {
            SlotLocation::Fixed(i) => {
                self.fixed.get(i as usize).cloned().unwrap_or(Value::Undefined)
            }
            SlotLocation::Dynamic(i) => {
                self.dynamic.get(i as usize).cloned().unwrap_or(Value::Undefined)
            }
        }
    }

    fn write(&mut self, slot: SlotLocation, value: Value) {
        match slot {
            SlotLocation::Fixed(i) => {
                let index = i as usize;
                if self.fixed.len() <= index {
                    self.fixed.resize(index + 1, Value::Undefined);
                }
                self.fixed[index] = value;
            }
            SlotLocation::Dynamic(i) => {
                let index = i as usize;
                if self.dynamic.len() <= index {
                    self.dynamic.resize(index + 1, Value::Undefined);
                }
                self.dynamic[index] = value;
            }
        }
    }
}

#[derive(Default)]
struct ElementStorage {
    items: Vec<Option<Value>>,
    packed: bool,
}

impl ElementStorage {
    fn new() -> Self {
        Self { items: Vec::new(), packed: true }
    }
}

// ==================== JsObject ====================

/// A native object. See the module docs.
pub struct JsObject {
    shape: RwLock<Arc<Shape>>,
    slots: RwLock<SlotStorage>,
    elements: RwLock<ElementStorage>,
    kind: ObjectKind,
}

impl JsObject {
    /// Construct an object with the given shape and kind payload.
    pub fn with_shape(shape: Arc<Shape>, kind: ObjectKind) -> ObjectRef {
        debug_assert_eq!(shape.class_kind(), kind.class_kind());
        Arc::new(Self {
            shape: RwLock::new(shape),
            slots: RwLock::new(SlotStorage::default()),
            elements: RwLock::new(ElementStorage::new()),
            kind,
        })
    }

    /// The current shape.
    pub fn shape(&self) -> Arc<Shape> {
        Arc::clone(&self.shape.read())
    }

    /// Class kind, as pinned by the shape.
    pub fn class_kind(&self) -> ClassKind {
        self.shape.read().class_kind()
    }

    /// The prototype, as pinned by the shape.
    pub fn proto(&self) -> Option<ObjectRef> {
        self.shape.read().proto().cloned()
    }

    /// True for proxy objects.
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// True for non-proxy objects backed by ordinary slot storage.
    pub fn is_native(&self) -> bool {
        !self.is_proxy()
    }

    /// Function payload accessor.
    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Bound-function payload accessor.
    pub fn as_bound_function(&self) -> Option<&BoundFunctionData> {
        match &self.kind {
            ObjectKind::BoundFunction(data) => Some(data),
            _ => None,
        }
    }

    /// Proxy payload accessor.
    pub fn as_proxy(&self) -> Option<&ProxyData> {
        match &self.kind {
            ObjectKind::Proxy(data) => Some(data),
            _ => None,
        }
    }

    /// Enclosing scope for environment objects.
    pub fn enclosing_environment(&self) -> Option<ObjectRef> {
        match &self.kind {
            ObjectKind::Environment { enclosing } => enclosing.clone(),
            _ => None,
        }
    }

    /// Iterated array for array-iterator objects.
    pub fn iterator_target(&self) -> Option<&ObjectRef> {
        match &self.kind {
            ObjectKind::ArrayIterator { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Advance an array iterator, returning the next element.
    pub fn iterator_step(&self) -> Option<Value> {
        match &self.kind {
            ObjectKind::ArrayIterator { target, next_index } => {
                let index = next_index.fetch_add(1, Ordering::Relaxed);
                target.element(index)
            }
            _ => None,
        }
    }

    // ---------------------------------------------------------------------------
    // Slots
    // ---------------------------------------------------------------------------

    /// Read a slot. Unwritten slots read as `undefined`.
    pub fn read_slot(&self, slot: SlotLocation) -> Value {
        self.slots.read().read(slot)
    }

    /// Write a slot, growing storage as needed.
    pub fn write_slot(&self, slot: SlotLocation, value: Value) {
        self.slots.write().write(slot, value);
    }

    /// Getter and setter of an accessor property.
    pub fn accessor_pair(&self, info: PropertyInfo) -> (Option<ObjectRef>, Option<ObjectRef>) {
        debug_assert_eq!(info.kind, PropertyKind::Accessor);
        let getter = self.read_slot(info.slot).as_object().cloned();
        let setter = self.read_slot(info.slot.successor()).as_object().cloned();
        (getter, setter)
    }

    // ---------------------------------------------------------------------------
    // Dense elements
    // ---------------------------------------------------------------------------

    /// Read a dense element. `None` means hole or out of bounds.
    pub fn element(&self, index: u32) -> Option<Value> {
        self.elements.read().items.get(index as usize).cloned().flatten()
    }

    /// Number of initialized element positions (the dense length).
    pub fn elements_len(&self) -> u32 {
        self.elements.read().items.len() as u32
    }

    /// True when the element storage has no holes.
    pub fn is_packed(&self) -> bool {
        self.elements.read().packed
    }

    /// True when the object has any dense elements at all.
    pub fn has_dense_elements(&self) -> bool {
        !self.elements.read().items.is_empty()
    }

    /// Store a dense element. Appending past the end creates holes and
    /// clears the packed flag; appending exactly at the end keeps it.
    pub fn set_element(&self, heap: &Heap, index: u32, value: Value) {
        let grew = {
            let mut elements = self.elements.write();
            let index = index as usize;
            let old_len = elements.items.len();
            if index < old_len {
                elements.items[index] = Some(value);
                false
            } else {
                if index > old_len {
                    elements.packed = false;
                }
                elements.items.resize(index + 1, None);
                elements.items[index] = Some(value);
                true
            }
        };
        if grew && self.shape().is_used_as_prototype() {
            heap.note_prototype_element_add(self);
        }
    }

    /// Delete a dense element, leaving a hole.
    pub fn delete_element(&self, index: u32) {
        let mut elements = self.elements.write();
        let index = index as usize;
        if index < elements.items.len() {
            elements.items[index] = None;
            elements.packed = false;
        }
    }

    // ---------------------------------------------------------------------------
    // Layout mutation
    // ---------------------------------------------------------------------------

    /// Define or overwrite a data property. Returns false when the object
    /// refuses the definition (non-extensible and the key is new).
    pub fn define_data_property(
        &self,
        heap: &Heap,
        key: PropertyKey,
        value: Value,
        attrs: PropertyAttributes,
    ) -> bool {
        if let PropertyKey::Index(index) = key {
            self.set_element(heap, index, value);
            return true;
        }

        let shape = self.shape();
        if let Some(info) = shape.property(&key) {
            match info.kind {
                PropertyKind::Data => {
                    if info.attrs != attrs {
                        let replaced = PropertyInfo { kind: PropertyKind::Data, slot: info.slot, attrs };
                        self.replace_shape(shape.with_replaced_property(&key, replaced));
                    }
                    self.write_slot(info.slot, value);
                }
                PropertyKind::Accessor => {
                    // Accessor turning back into data reuses the base slot.
                    let replaced = PropertyInfo { kind: PropertyKind::Data, slot: info.slot, attrs };
                    self.replace_shape(shape.with_replaced_property(&key, replaced));
                    self.write_slot(info.slot, value);
                }
            }
            return true;
        }

        if !shape.is_extensible() {
            return false;
        }
        if shape.is_used_as_prototype() {
            heap.note_prototype_shadowing_add(self, &key);
        }
        let new_shape = shape.transition_add(key, PropertyKind::Data, attrs);
        let info = new_shape.last_added().and_then(|k| new_shape.property(k));
        self.replace_shape(new_shape);
        if let Some(info) = info {
            self.write_slot(info.slot, value);
        }
        true
    }

    /// Define or overwrite an accessor property.
    pub fn define_accessor_property(
        &self,
        heap: &Heap,
        key: PropertyKey,
        getter: Option<ObjectRef>,
        setter: Option<ObjectRef>,
        attrs: PropertyAttributes,
    ) -> bool {
        let getter_value = getter.map(Value::Object).unwrap_or(Value::Undefined);
        let setter_value = setter.map(Value::Object).unwrap_or(Value::Undefined);

        let shape = self.shape();
        if let Some(info) = shape.property(&key) {
            if info.kind != PropertyKind::Accessor {
                // A data property turning into an accessor needs two fresh
                // slots; route through delete plus re-add to keep slot
                // accounting simple.
                if !self.delete_property(heap, &key) {
                    return false;
                }
                let getter = getter_value.as_object().cloned();
                let setter = setter_value.as_object().cloned();
                return self.define_accessor_property(heap, key, getter, setter, attrs);
            }
            if info.attrs != attrs {
                let replaced = PropertyInfo { kind: PropertyKind::Accessor, slot: info.slot, attrs };
                self.replace_shape(shape.with_replaced_property(&key, replaced));
            }
            self.write_slot(info.slot, getter_value);
            self.write_slot(info.slot.successor(), setter_value);
            return true;
        }

        if !shape.is_extensible() {
            return false;
        }
        if shape.is_used_as_prototype() {
            heap.note_prototype_shadowing_add(self, &key);
        }
        let new_shape = shape.transition_add(key, PropertyKind::Accessor, attrs);
        let info = new_shape.last_added().and_then(|k| new_shape.property(k));
        self.replace_shape(new_shape);
        if let Some(info) = info {
            self.write_slot(info.slot, getter_value);
            self.write_slot(info.slot.successor(), setter_value);
        }
        true
    }

    /// Delete an own property. Returns false for missing or
    /// non-configurable properties.
    pub fn delete_property(&self, _heap: &Heap, key: &PropertyKey) -> bool {
        if let PropertyKey::Index(index) = key {
            self.delete_element(*index);
            return true;
        }
        let shape = self.shape();
        let Some(info) = shape.property(key) else {
            return false;
        };
        if !info.attrs.configurable {
            return false;
        }
        self.replace_shape(shape.without_property(key));
        true
    }

    /// Replace the prototype. Reshapes this object and invalidates holder
    /// guard paths that ran through its old chain.
    pub fn set_prototype(&self, heap: &Heap, proto: Option<ObjectRef>) {
        if let Some(proto_obj) = &proto {
            heap.mark_used_as_prototype(proto_obj);
        }
        let old_shape = self.shape();
        if old_shape.is_used_as_prototype() {
            heap.note_proto_mutation(&old_shape);
        }
        self.replace_shape(old_shape.with_proto(proto));
    }

    /// Forbid future property additions.
    pub fn prevent_extensions(&self) {
        let shape = self.shape();
        if shape.is_extensible() {
            self.replace_shape(shape.without_extensibility());
        }
    }

    /// Install a new shape. Public for heap-driven reshapes; everything
    /// else should use the mutation methods above.
    pub fn replace_shape(&self, shape: Arc<Shape>) {
        *self.shape.write() = shape;
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject")
            .field("class", &self.class_kind())
            .field("shape", &self.shape.read().id())
            .finish()
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomTable;
    use crate::realm::Realm;

    fn setup() -> (Heap, Arc<Realm>, AtomTable) {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        (heap, realm, AtomTable::new())
    }

    #[test]
    fn test_same_insertion_order_shares_shape() {
        let (heap, realm, atoms) = setup();
        let a = realm.new_plain_object();
        let b = realm.new_plain_object();
        let attrs = PropertyAttributes::default_data();

        let x = PropertyKey::Atom(atoms.intern("x"));
        let y = PropertyKey::Atom(atoms.intern("y"));
        a.define_data_property(&heap, x.clone(), Value::Int32(1), attrs);
        a.define_data_property(&heap, y.clone(), Value::Int32(2), attrs);
        b.define_data_property(&heap, x.clone(), Value::Int32(3), attrs);
        b.define_data_property(&heap, y.clone(), Value::Int32(4), attrs);

        assert_eq!(a.shape().id(), b.shape().id());

        // Different order diverges.
        let c = realm.new_plain_object();
        c.define_data_property(&heap, y, Value::Int32(5), attrs);
        c.define_data_property(&heap, x, Value::Int32(6), attrs);
        assert_ne!(a.shape().id(), c.shape().id());
    }

    #[test]
    fn test_slot_read_write_round_trip() {
        let (heap, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let attrs = PropertyAttributes::default_data();

        for i in 0..12 {
            let key = PropertyKey::Atom(atoms.intern(&format!("p{i}")));
            obj.define_data_property(&heap, key, Value::Int32(i), attrs);
        }
        for i in 0..12 {
            let key = PropertyKey::Atom(atoms.intern(&format!("p{i}")));
            let info = obj.shape().property(&key).unwrap();
            assert!(obj.read_slot(info.slot).same_value(&Value::Int32(i)));
        }
    }

    #[test]
    fn test_dense_elements_and_packing() {
        let (heap, realm, _) = setup();
        let arr = realm.new_array();
        assert!(arr.is_packed());

        arr.set_element(&heap, 0, Value::Int32(10));
        arr.set_element(&heap, 1, Value::Int32(11));
        assert!(arr.is_packed());
        assert_eq!(arr.elements_len(), 2);

        arr.set_element(&heap, 5, Value::Int32(15));
        assert!(!arr.is_packed());
        assert!(arr.element(3).is_none());
        assert!(arr.element(5).unwrap().same_value(&Value::Int32(15)));
    }

    #[test]
    fn test_define_overwrites_without_reshape() {
        let (heap, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let key = PropertyKey::Atom(atoms.intern("x"));
        let attrs = PropertyAttributes::default_data();

        obj.define_data_property(&heap, key.clone(), Value::Int32(1), attrs);
        let shape_before = obj.shape().id();
        obj.define_data_property(&heap, key.clone(), Value::Int32(2), attrs);
        assert_eq!(obj.shape().id(), shape_before);
        let info = obj.shape().property(&key).unwrap();
        assert!(obj.read_slot(info.slot).same_value(&Value::Int32(2)));
    }

    #[test]
    fn test_delete_reshapes() {
        let (heap, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let key = PropertyKey::Atom(atoms.intern("x"));
        obj.define_data_property(&heap, key.clone(), Value::Int32(1), PropertyAttributes::default_data());
        let before = obj.shape().id();
        assert!(obj.delete_property(&heap, &key));
        assert_ne!(obj.shape().id(), before);
        assert!(obj.shape().property(&key).is_none());
    }

    #[test]
    fn test_non_extensible_refuses_new_properties() {
        let (heap, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let x = PropertyKey::Atom(atoms.intern("x"));
        let y = PropertyKey::Atom(atoms.intern("y"));
        let attrs = PropertyAttributes::default_data();

        obj.define_data_property(&heap, x.clone(), Value::Int32(1), attrs);
        obj.prevent_extensions();
        assert!(!obj.define_data_property(&heap, y, Value::Int32(2), attrs));
        // Existing properties remain writable.
        assert!(obj.define_data_property(&heap, x, Value::Int32(3), attrs));
    }

    #[test]
    fn test_accessor_storage() {
        let (heap, realm, atoms) = setup();
        let obj = realm.new_plain_object();
        let getter = realm.new_native_function(None, 0, |_| Value::Int32(99));
        let key = PropertyKey::Atom(atoms.intern("prop"));

        obj.define_accessor_property(
            &heap,
            key.clone(),
            Some(Arc::clone(&getter)),
            None,
            PropertyAttributes::default_data(),
        );
        let info = obj.shape().property(&key).unwrap();
        assert_eq!(info.kind, PropertyKind::Accessor);
        let (g, s) = obj.accessor_pair(info);
        assert!(Arc::ptr_eq(&g.unwrap(), &getter));
        assert!(s.is_none());
    }

    #[test]
    fn test_iterator_step() {
        let (heap, realm, _) = setup();
        let arr = realm.new_array();
        arr.set_element(&heap, 0, Value::Int32(7));
        arr.set_element(&heap, 1, Value::Int32(8));
        let iter = realm.new_array_iterator(Arc::clone(&arr));
        assert!(iter.iterator_step().unwrap().same_value(&Value::Int32(7)));
        assert!(iter.iterator_step().unwrap().same_value(&Value::Int32(8)));
        assert!(iter.iterator_step().is_none());
    }
}
