//! Realms: intrinsic objects, interning and invariant fuses.
//!
//! A realm is the unit of "same world" for cache purposes. Shapes carry
//! their realm id, and cross-realm receivers disable the holder-teleporting
//! shortcut. Fuses are pop-once invariant flags: guards can depend on an
//! intact fuse, and popping it is a one-way, observable event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::atom::{Atom, AtomTable};
use crate::heap::Heap;
use crate::object::{
    BoundFunctionData, FunctionData, JsObject, NativeFn, ObjectKind, ObjectRef, ProxyData,
    ProxyHandler, Script,
};
use crate::shape::{ClassKind, Shape};
use crate::value::{Value, ValueTag};

static NEXT_REALM_ID: AtomicU32 = AtomicU32::new(0);

// ==================== RealmId ====================

/// Identity of a realm, carried by every shape created in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RealmId(u32);

impl RealmId {
    /// Wrap a raw id (tests build shapes directly).
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw id.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

// ==================== Fuses ====================

/// A pop-once invariant flag. Starts intact; popping is permanent.
#[derive(Debug)]
pub struct Fuse {
    intact: AtomicBool,
}

impl Fuse {
    fn new() -> Self {
        Self { intact: AtomicBool::new(true) }
    }

    /// Whether the invariant still holds.
    #[inline]
    pub fn is_intact(&self) -> bool {
        self.intact.load(Ordering::Acquire)
    }

    /// Pop the fuse. Irreversible.
    pub fn pop(&self) {
        self.intact.store(false, Ordering::Release);
    }
}

/// Indexes the per-realm fuse set; used as a one-byte guard immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FuseIndex {
    /// Array iteration protocol (iterator prototype and its `next`) is
    /// unmodified.
    ArrayIteratorIntact = 0,
    /// The `Array` intrinsic and its prototype have not been replaced.
    ArrayConstructorIntact = 1,
}

impl FuseIndex {
    /// Decode from the guard immediate.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::ArrayIteratorIntact),
            1 => Some(Self::ArrayConstructorIntact),
            _ => None,
        }
    }
}

/// The realm's fuse set.
#[derive(Debug)]
pub struct RealmFuses {
    array_iterator_intact: Fuse,
    array_constructor_intact: Fuse,
}

impl RealmFuses {
    fn new() -> Self {
        Self {
            array_iterator_intact: Fuse::new(),
            array_constructor_intact: Fuse::new(),
        }
    }

    /// Fuse lookup by index.
    pub fn fuse(&self, index: FuseIndex) -> &Fuse {
        match index {
            FuseIndex::ArrayIteratorIntact => &self.array_iterator_intact,
            FuseIndex::ArrayConstructorIntact => &self.array_constructor_intact,
        }
    }
}

// ==================== Realm ====================

/// A realm: intrinsics, interning and fuses. See the module docs.
pub struct Realm {
    id: RealmId,
    atoms: Arc<AtomTable>,
    fuses: RealmFuses,
    object_prototype: ObjectRef,
    function_prototype: ObjectRef,
    array_prototype: ObjectRef,
    array_iterator_prototype: ObjectRef,
    string_prototype: ObjectRef,
    fun_call: ObjectRef,
    fun_apply: ObjectRef,
    base_shapes: Mutex<FxHashMap<(u8, usize), Arc<Shape>>>,
}

fn intrinsic_stub(_args: &crate::object::NativeCallArgs<'_>) -> Value {
    // Identity of these functions is what matters to the cache engine; the
    // call semantics are routed around them.
    Value::Undefined
}

impl Realm {
    /// Create a realm with its own atom table.
    pub fn new(heap: &Heap) -> Arc<Self> {
        Self::with_atoms(heap, Arc::new(AtomTable::new()))
    }

    /// Create a realm sharing an existing atom table. Cross-realm object
    /// graphs must share a table so property keys keep their identity.
    pub fn with_atoms(heap: &Heap, atoms: Arc<AtomTable>) -> Arc<Self> {
        let id = RealmId::new(NEXT_REALM_ID.fetch_add(1, Ordering::Relaxed));

        let object_prototype =
            JsObject::with_shape(Shape::base(id, ClassKind::Plain, None), ObjectKind::Plain);
        heap.mark_used_as_prototype(&object_prototype);

        let make_proto = |proto: &ObjectRef| {
            let obj = JsObject::with_shape(
                Shape::base(id, ClassKind::Plain, Some(Arc::clone(proto))),
                ObjectKind::Plain,
            );
            heap.mark_used_as_prototype(&obj);
            obj
        };
        let function_prototype = make_proto(&object_prototype);
        let array_prototype = make_proto(&object_prototype);
        let array_iterator_prototype = make_proto(&object_prototype);
        let string_prototype = make_proto(&object_prototype);

        let make_intrinsic_fn = |name: &str, nargs: u16| {
            let data = FunctionData {
                name: Some(atoms.intern(name)),
                nargs,
                script: None,
                native: Some(intrinsic_stub as NativeFn),
                is_class_constructor: false,
            };
            JsObject::with_shape(
                Shape::base(id, ClassKind::Function, Some(Arc::clone(&function_prototype))),
                ObjectKind::Function(data),
            )
        };
        let fun_call = make_intrinsic_fn("call", 1);
        let fun_apply = make_intrinsic_fn("apply", 2);

        Arc::new(Self {
            id,
            atoms,
            fuses: RealmFuses::new(),
            object_prototype,
            function_prototype,
            array_prototype,
            array_iterator_prototype,
            string_prototype,
            fun_call,
            fun_apply,
            base_shapes: Mutex::new(FxHashMap::default()),
        })
    }

    /// The realm's id.
    #[inline]
    pub fn id(&self) -> RealmId {
        self.id
    }

    /// The realm's atom table.
    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    /// Intern a string in this realm's table.
    pub fn intern(&self, text: &str) -> Atom {
        self.atoms.intern(text)
    }

    /// The realm's fuses.
    pub fn fuses(&self) -> &RealmFuses {
        &self.fuses
    }

    /// `Object.prototype`.
    pub fn object_prototype(&self) -> &ObjectRef {
        &self.object_prototype
    }

    /// `Function.prototype`.
    pub fn function_prototype(&self) -> &ObjectRef {
        &self.function_prototype
    }

    /// `Array.prototype`.
    pub fn array_prototype(&self) -> &ObjectRef {
        &self.array_prototype
    }

    /// The prototype shared by array iterators.
    pub fn array_iterator_prototype(&self) -> &ObjectRef {
        &self.array_iterator_prototype
    }

    /// `String.prototype`, the holder for primitive string receivers.
    pub fn string_prototype(&self) -> &ObjectRef {
        &self.string_prototype
    }

    /// The `Function.prototype.call` intrinsic.
    pub fn fun_call(&self) -> &ObjectRef {
        &self.fun_call
    }

    /// The `Function.prototype.apply` intrinsic.
    pub fn fun_apply(&self) -> &ObjectRef {
        &self.fun_apply
    }

    /// The `typeof` result atom for a value.
    pub fn typeof_atom(&self, value: &Value) -> Atom {
        let name = match value.tag() {
            ValueTag::Undefined => "undefined",
            ValueTag::Null => "object",
            ValueTag::Boolean => "boolean",
            ValueTag::Int32 | ValueTag::Double => "number",
            ValueTag::String => "string",
            ValueTag::Symbol => "symbol",
            ValueTag::BigInt => "bigint",
            ValueTag::Object => match value.as_object() {
                Some(obj) if obj.as_function().is_some() || obj.as_bound_function().is_some() => {
                    "function"
                }
                _ => "object",
            },
        };
        self.intern(name)
    }

    // ---------------------------------------------------------------------------
    // Shape and object construction
    // ---------------------------------------------------------------------------

    /// Canonical empty shape for a class and prototype. Two objects created
    /// through the same base shape converge on shared transition children.
    pub fn base_shape(&self, class_kind: ClassKind, proto: Option<&ObjectRef>) -> Arc<Shape> {
        let proto_key = proto.map(|p| Arc::as_ptr(p) as usize).unwrap_or(0);
        let mut cache = self.base_shapes.lock();
        if let Some(shape) = cache.get(&(class_kind as u8, proto_key)) {
            return Arc::clone(shape);
        }
        let shape = Shape::base(self.id, class_kind, proto.cloned());
        cache.insert((class_kind as u8, proto_key), Arc::clone(&shape));
        shape
    }

    /// New ordinary object with `Object.prototype`.
    pub fn new_plain_object(&self) -> ObjectRef {
        self.new_plain_object_with_proto(Some(Arc::clone(&self.object_prototype)))
    }

    /// New ordinary object with an explicit prototype.
    pub fn new_plain_object_with_proto(&self, proto: Option<ObjectRef>) -> ObjectRef {
        JsObject::with_shape(self.base_shape(ClassKind::Plain, proto.as_ref()), ObjectKind::Plain)
    }

    /// New dense array.
    pub fn new_array(&self) -> ObjectRef {
        JsObject::with_shape(
            self.base_shape(ClassKind::Array, Some(&self.array_prototype)),
            ObjectKind::Array,
        )
    }

    /// New built-in function.
    pub fn new_native_function(
        &self,
        name: Option<Atom>,
        nargs: u16,
        native: NativeFn,
    ) -> ObjectRef {
        let data = FunctionData {
            name,
            nargs,
            script: None,
            native: Some(native),
            is_class_constructor: false,
        };
        JsObject::with_shape(
            self.base_shape(ClassKind::Function, Some(&self.function_prototype)),
            ObjectKind::Function(data),
        )
    }

    /// New scripted function for a script identity.
    pub fn new_scripted_function(&self, script: Arc<Script>, nargs: u16) -> ObjectRef {
        let data = FunctionData {
            name: script.name().cloned(),
            nargs,
            script: Some(script),
            native: None,
            is_class_constructor: false,
        };
        JsObject::with_shape(
            self.base_shape(ClassKind::Function, Some(&self.function_prototype)),
            ObjectKind::Function(data),
        )
    }

    /// New class constructor (callable only through construction).
    pub fn new_class_constructor(&self, script: Arc<Script>, nargs: u16) -> ObjectRef {
        let data = FunctionData {
            name: script.name().cloned(),
            nargs,
            script: Some(script),
            native: None,
            is_class_constructor: true,
        };
        JsObject::with_shape(
            self.base_shape(ClassKind::Function, Some(&self.function_prototype)),
            ObjectKind::Function(data),
        )
    }

    /// New bound function wrapping `target`.
    pub fn new_bound_function(
        &self,
        target: ObjectRef,
        bound_this: Value,
        bound_args: Vec<Value>,
    ) -> ObjectRef {
        JsObject::with_shape(
            self.base_shape(ClassKind::BoundFunction, Some(&self.function_prototype)),
            ObjectKind::BoundFunction(BoundFunctionData { target, bound_this, bound_args }),
        )
    }

    /// New proxy around `target`.
    pub fn new_proxy(&self, target: ObjectRef, handler: Box<dyn ProxyHandler>) -> ObjectRef {
        JsObject::with_shape(
            self.base_shape(ClassKind::Proxy, Some(&self.object_prototype)),
            ObjectKind::Proxy(ProxyData { target, handler }),
        )
    }

    /// New environment-chain scope object.
    pub fn new_environment(&self, enclosing: Option<ObjectRef>) -> ObjectRef {
        JsObject::with_shape(
            self.base_shape(ClassKind::Environment, None),
            ObjectKind::Environment { enclosing },
        )
    }

    /// New iterator over a dense array.
    pub fn new_array_iterator(&self, target: ObjectRef) -> ObjectRef {
        JsObject::with_shape(
            self.base_shape(ClassKind::ArrayIterator, Some(&self.array_iterator_prototype)),
            ObjectKind::ArrayIterator { target, next_index: AtomicU32::new(0) },
        )
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realms_have_distinct_ids() {
        let heap = Heap::new();
        let a = Realm::new(&heap);
        let b = Realm::new(&heap);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_base_shape_cached_per_proto() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let a = realm.new_plain_object();
        let b = realm.new_plain_object();
        assert_eq!(a.shape().id(), b.shape().id());

        let custom_proto = realm.new_plain_object();
        let c = realm.new_plain_object_with_proto(Some(Arc::clone(&custom_proto)));
        assert_ne!(a.shape().id(), c.shape().id());
    }

    #[test]
    fn test_fuse_pops_once() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let fuse = realm.fuses().fuse(FuseIndex::ArrayIteratorIntact);
        assert!(fuse.is_intact());
        fuse.pop();
        assert!(!fuse.is_intact());
        fuse.pop();
        assert!(!fuse.is_intact());
    }

    #[test]
    fn test_typeof_atoms() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        assert_eq!(realm.typeof_atom(&Value::Int32(1)).as_str(), "number");
        assert_eq!(realm.typeof_atom(&Value::Null).as_str(), "object");
        let f = realm.new_native_function(None, 0, |_| Value::Undefined);
        assert_eq!(realm.typeof_atom(&Value::Object(f)).as_str(), "function");
        let o = realm.new_plain_object();
        assert_eq!(realm.typeof_atom(&Value::Object(o)).as_str(), "object");
    }

    #[test]
    fn test_intrinsics_are_prototype_flagged() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        assert!(realm.object_prototype().shape().is_used_as_prototype());
        assert!(realm.array_prototype().shape().is_used_as_prototype());
    }
}
