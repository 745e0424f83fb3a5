//! The cache IR writer.
//!
//! Generators build a stub candidate by calling one typed method per
//! instruction. The writer assigns operand ids monotonically, interns
//! stub fields with dedup, and checks every instruction against the op
//! table's schema in debug builds.
//!
//! Guards that merely narrow a value return the same numeric id at the
//! narrower type. Instructions that produce a new value allocate a fresh
//! id. Inputs are declared first and take ids `0..n`.
//!
//! A stream that outgrows the operand, field or code caps is poisoned:
//! `finish` returns `None` and the attach simply does not happen.

use std::sync::Arc;

use ferret_object::{
    AllocSite, Atom, ClassKind, FuseIndex, JsSymbol, ObjectRef, PropertyKey, Script, Shape,
    ValueTag,
};
use smallvec::SmallVec;

use crate::flags::{CallFlags, CompareOp};
use crate::operand::{
    BigIntOperandId, BooleanOperandId, Int32OperandId, IntPtrOperandId, NumberOperandId,
    ObjOperandId, OperandId, StringOperandId, SymbolOperandId, ValOperandId,
};
use crate::ops::CacheOp;
use crate::stub_field::{FieldStore, FieldType, MAX_STUB_FIELDS, StubField};

/// Most operand ids one stream may define.
pub const MAX_OPERAND_IDS: usize = 64;

/// Most instruction bytes one stream may occupy.
pub const MAX_CODE_BYTES: usize = 1024;

// ==================== Finished streams ====================

/// A complete, well-formed IR stream with its constants.
///
/// Produced by [`CacheIrWriter::finish`]; the byte code plus the field
/// array are everything a stub needs to run, clone or be verified.
pub struct CacheIrStream {
    code: Vec<u8>,
    fields: Vec<StubField>,
    input_count: u16,
    ops: Vec<CacheOp>,
}

impl CacheIrStream {
    /// The encoded instructions.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Stub fields in offset order.
    pub fn fields(&self) -> &[StubField] {
        &self.fields
    }

    /// Field type tags in offset order.
    pub fn field_types(&self) -> Vec<FieldType> {
        self.fields.iter().map(StubField::field_type).collect()
    }

    /// Number of declared inputs.
    pub fn input_count(&self) -> u16 {
        self.input_count
    }

    /// Decoded op sequence, in stream order.
    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    /// True when every instruction is eligible for transpilation.
    pub fn is_transpilable(&self) -> bool {
        self.ops.iter().all(|op| op.is_transpilable())
    }

    /// Break the stream into its parts.
    pub fn into_parts(self) -> (Vec<u8>, Vec<StubField>, u16, Vec<CacheOp>) {
        (self.code, self.fields, self.input_count, self.ops)
    }

    pub(crate) fn from_raw_parts(
        code: Vec<u8>,
        fields: Vec<StubField>,
        input_count: u16,
        ops: Vec<CacheOp>,
    ) -> Self {
        Self { code, fields, input_count, ops }
    }
}

impl std::fmt::Debug for CacheIrStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.ops.iter().map(|op| op.name()).collect();
        f.debug_struct("CacheIrStream")
            .field("ops", &names)
            .field("fields", &self.fields.len())
            .field("inputs", &self.input_count)
            .finish()
    }
}

// ==================== Writer ====================

/// Builder for one stub candidate's IR stream.
pub struct CacheIrWriter {
    code: Vec<u8>,
    fields: FieldStore,
    ops: SmallVec<[CacheOp; 16]>,
    next_operand_id: u16,
    input_count: u16,
    wrote_terminal: bool,
    poisoned: bool,
}

impl Default for CacheIrWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheIrWriter {
    /// Fresh, empty writer.
    pub fn new() -> Self {
        Self {
            code: Vec::with_capacity(64),
            fields: FieldStore::new(),
            ops: SmallVec::new(),
            next_operand_id: 0,
            input_count: 0,
            wrote_terminal: false,
            poisoned: false,
        }
    }

    // ---------------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------------

    fn next_id(&mut self) -> u16 {
        let id = self.next_operand_id;
        self.next_operand_id += 1;
        if usize::from(self.next_operand_id) > MAX_OPERAND_IDS {
            self.poisoned = true;
        }
        id
    }

    fn define<T: OperandId>(&mut self) -> T {
        T::from_raw(self.next_id())
    }

    fn op_start(&mut self, op: CacheOp) -> usize {
        debug_assert!(!self.wrote_terminal, "instruction after ReturnFromIC");
        self.ops.push(op);
        self.code.push(op as u8);
        self.code.len()
    }

    fn op_end(&mut self, op: CacheOp, start: usize) {
        debug_assert_eq!(
            self.code.len() - start,
            op.encoded_args_len(),
            "argument bytes for {}",
            op.name()
        );
        if self.code.len() > MAX_CODE_BYTES {
            self.poisoned = true;
        }
    }

    fn write_operand<T: OperandId>(&mut self, id: T) {
        self.code.extend_from_slice(&id.raw().to_le_bytes());
    }

    fn write_byte(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn write_bool(&mut self, value: bool) {
        self.code.push(u8::from(value));
    }

    fn write_int32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn write_uint32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn write_field(&mut self, field: StubField) {
        let offset = self.fields.intern(field);
        if self.fields.len() > MAX_STUB_FIELDS {
            self.poisoned = true;
        }
        self.code.push(offset.word());
    }

    // ---------------------------------------------------------------------------
    // Inputs and bookkeeping
    // ---------------------------------------------------------------------------

    /// Declare the next cache input. Inputs must be declared before any
    /// instruction defines an operand.
    pub fn input_value(&mut self) -> ValOperandId {
        debug_assert_eq!(self.input_count, self.next_operand_id);
        self.input_count += 1;
        ValOperandId::new(self.next_id())
    }

    /// Number of declared inputs.
    pub fn input_count(&self) -> u16 {
        self.input_count
    }

    /// Number of operand ids defined so far.
    pub fn num_operand_ids(&self) -> u16 {
        self.next_operand_id
    }

    /// Number of distinct stub fields interned so far.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Encoded size so far.
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// True once a cap has been exceeded. A poisoned writer keeps
    /// accepting instructions so generators need no checks; the stream is
    /// discarded at `finish`.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Finalize the stream. Returns `None` for poisoned or unterminated
    /// streams.
    pub fn finish(self) -> Option<CacheIrStream> {
        if self.poisoned || !self.wrote_terminal {
            return None;
        }
        Some(CacheIrStream {
            code: self.code,
            fields: self.fields.into_fields(),
            input_count: self.input_count,
            ops: self.ops.into_vec(),
        })
    }

    // ---------------------------------------------------------------------------
    // Value-narrowing guards
    // ---------------------------------------------------------------------------

    /// Guard the value is an object; the id is hereafter an object.
    pub fn guard_to_object(&mut self, input: ValOperandId) -> ObjOperandId {
        let start = self.op_start(CacheOp::GuardToObject);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToObject, start);
        ObjOperandId::new(input.id())
    }

    /// Guard the value is a string.
    pub fn guard_to_string(&mut self, input: ValOperandId) -> StringOperandId {
        let start = self.op_start(CacheOp::GuardToString);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToString, start);
        StringOperandId::new(input.id())
    }

    /// Guard the value is a symbol.
    pub fn guard_to_symbol(&mut self, input: ValOperandId) -> SymbolOperandId {
        let start = self.op_start(CacheOp::GuardToSymbol);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToSymbol, start);
        SymbolOperandId::new(input.id())
    }

    /// Guard the value is a big integer.
    pub fn guard_to_big_int(&mut self, input: ValOperandId) -> BigIntOperandId {
        let start = self.op_start(CacheOp::GuardToBigInt);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToBigInt, start);
        BigIntOperandId::new(input.id())
    }

    /// Guard the value is a boolean.
    pub fn guard_to_boolean(&mut self, input: ValOperandId) -> BooleanOperandId {
        let start = self.op_start(CacheOp::GuardToBoolean);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToBoolean, start);
        BooleanOperandId::new(input.id())
    }

    /// Guard the value is an int32.
    pub fn guard_to_int32(&mut self, input: ValOperandId) -> Int32OperandId {
        let start = self.op_start(CacheOp::GuardToInt32);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToInt32, start);
        Int32OperandId::new(input.id())
    }

    /// Guard the value is numeric.
    pub fn guard_to_number(&mut self, input: ValOperandId) -> NumberOperandId {
        let start = self.op_start(CacheOp::GuardToNumber);
        self.write_operand(input);
        self.op_end(CacheOp::GuardToNumber, start);
        NumberOperandId::new(input.id())
    }

    /// Guard the value is `null`.
    pub fn guard_is_null(&mut self, input: ValOperandId) {
        let start = self.op_start(CacheOp::GuardIsNull);
        self.write_operand(input);
        self.op_end(CacheOp::GuardIsNull, start);
    }

    /// Guard the value is `undefined`.
    pub fn guard_is_undefined(&mut self, input: ValOperandId) {
        let start = self.op_start(CacheOp::GuardIsUndefined);
        self.write_operand(input);
        self.op_end(CacheOp::GuardIsUndefined, start);
    }

    /// Guard the value is `null` or `undefined`.
    pub fn guard_is_null_or_undefined(&mut self, input: ValOperandId) {
        let start = self.op_start(CacheOp::GuardIsNullOrUndefined);
        self.write_operand(input);
        self.op_end(CacheOp::GuardIsNullOrUndefined, start);
    }

    /// Guard the value carries `tag`. Doubles cannot be guarded this way;
    /// use `guard_to_number`.
    pub fn guard_non_double_type(&mut self, input: ValOperandId, tag: ValueTag) {
        debug_assert!(tag != ValueTag::Double);
        let start = self.op_start(CacheOp::GuardNonDoubleType);
        self.write_operand(input);
        self.write_byte(tag as u8);
        self.op_end(CacheOp::GuardNonDoubleType, start);
    }

    // ---------------------------------------------------------------------------
    // Coercion guards
    // ---------------------------------------------------------------------------

    /// Guard the value is usable as an element index.
    pub fn guard_to_int32_index(&mut self, input: ValOperandId) -> Int32OperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::GuardToInt32Index);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::GuardToInt32Index, start);
        result
    }

    /// Guard the value is a boolean, producing 0 or 1.
    pub fn guard_boolean_to_int32(&mut self, input: ValOperandId) -> Int32OperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::GuardBooleanToInt32);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::GuardBooleanToInt32, start);
        result
    }

    /// Convert a string to a number operand.
    pub fn guard_string_to_number(&mut self, input: StringOperandId) -> NumberOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::GuardStringToNumber);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::GuardStringToNumber, start);
        result
    }

    /// Guard a string spells a canonical int32.
    pub fn guard_string_to_int32(&mut self, input: StringOperandId) -> Int32OperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::GuardStringToInt32);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::GuardStringToInt32, start);
        result
    }

    /// Widen an int32 to a pointer-sized index.
    pub fn int32_to_int_ptr(&mut self, input: Int32OperandId) -> IntPtrOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::Int32ToIntPtr);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::Int32ToIntPtr, start);
        result
    }

    // ---------------------------------------------------------------------------
    // Object guards
    // ---------------------------------------------------------------------------

    /// Guard the object's shape. Held weakly: a swept shape fails the
    /// guard and marks the stub for pruning.
    pub fn guard_shape(&mut self, obj: ObjOperandId, shape: &Arc<Shape>) {
        let start = self.op_start(CacheOp::GuardShape);
        self.write_operand(obj);
        self.write_field(StubField::WeakShape(Arc::downgrade(shape)));
        self.op_end(CacheOp::GuardShape, start);
    }

    /// Guard the object's prototype identity.
    pub fn guard_proto(&mut self, obj: ObjOperandId, proto: &ObjectRef) {
        let start = self.op_start(CacheOp::GuardProto);
        self.write_operand(obj);
        self.write_field(StubField::WeakObject(Arc::downgrade(proto)));
        self.op_end(CacheOp::GuardProto, start);
    }

    /// Guard the object has no prototype.
    pub fn guard_null_proto(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardNullProto);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardNullProto, start);
    }

    /// Guard the object's class.
    pub fn guard_class(&mut self, obj: ObjOperandId, class_kind: ClassKind) {
        let start = self.op_start(CacheOp::GuardClass);
        self.write_operand(obj);
        self.write_byte(class_kind as u8);
        self.op_end(CacheOp::GuardClass, start);
    }

    /// Guard the object uses ordinary native storage.
    pub fn guard_is_native_object(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardIsNativeObject);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardIsNativeObject, start);
    }

    /// Guard the object is a proxy.
    pub fn guard_is_proxy(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardIsProxy);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardIsProxy, start);
    }

    /// Guard the object is not a proxy.
    pub fn guard_is_not_proxy(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardIsNotProxy);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardIsNotProxy, start);
    }

    /// Guard the object is extensible.
    pub fn guard_is_extensible(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardIsExtensible);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardIsExtensible, start);
    }

    /// Guard object identity.
    pub fn guard_specific_object(&mut self, obj: ObjOperandId, expected: &ObjectRef) {
        let start = self.op_start(CacheOp::GuardSpecificObject);
        self.write_operand(obj);
        self.write_field(StubField::WeakObject(Arc::downgrade(expected)));
        self.op_end(CacheOp::GuardSpecificObject, start);
    }

    /// Guard function identity, carrying its packed arity word.
    pub fn guard_specific_function(
        &mut self,
        fun: ObjOperandId,
        expected: &ObjectRef,
        nargs_and_flags: u64,
    ) {
        let start = self.op_start(CacheOp::GuardSpecificFunction);
        self.write_operand(fun);
        self.write_field(StubField::WeakObject(Arc::downgrade(expected)));
        self.write_field(StubField::RawWord(nargs_and_flags));
        self.op_end(CacheOp::GuardSpecificFunction, start);
    }

    /// Guard the function's script identity.
    pub fn guard_function_script(
        &mut self,
        fun: ObjOperandId,
        script: &Arc<Script>,
        nargs_and_flags: u64,
    ) {
        let start = self.op_start(CacheOp::GuardFunctionScript);
        self.write_operand(fun);
        self.write_field(StubField::WeakScript(Arc::downgrade(script)));
        self.write_field(StubField::RawWord(nargs_and_flags));
        self.op_end(CacheOp::GuardFunctionScript, start);
    }

    /// Guard string identity against an atom.
    pub fn guard_specific_atom(&mut self, str_id: StringOperandId, expected: &Atom) {
        let start = self.op_start(CacheOp::GuardSpecificAtom);
        self.write_operand(str_id);
        self.write_field(StubField::Atom(expected.clone()));
        self.op_end(CacheOp::GuardSpecificAtom, start);
    }

    /// Guard symbol identity.
    pub fn guard_specific_symbol(&mut self, sym: SymbolOperandId, expected: &JsSymbol) {
        let start = self.op_start(CacheOp::GuardSpecificSymbol);
        self.write_operand(sym);
        self.write_field(StubField::Symbol(expected.clone()));
        self.op_end(CacheOp::GuardSpecificSymbol, start);
    }

    /// Guard an int32 operand equals an immediate.
    pub fn guard_specific_int32(&mut self, num: Int32OperandId, expected: i32) {
        let start = self.op_start(CacheOp::GuardSpecificInt32);
        self.write_operand(num);
        self.write_int32(expected);
        self.op_end(CacheOp::GuardSpecificInt32, start);
    }

    /// Guard the function has a compiled entry.
    pub fn guard_function_has_jit_entry(&mut self, fun: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardFunctionHasJitEntry);
        self.write_operand(fun);
        self.op_end(CacheOp::GuardFunctionHasJitEntry, start);
    }

    /// Guard the function has no compiled entry.
    pub fn guard_function_has_no_jit_entry(&mut self, fun: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardFunctionHasNoJitEntry);
        self.write_operand(fun);
        self.op_end(CacheOp::GuardFunctionHasNoJitEntry, start);
    }

    /// Guard the function is not a class constructor.
    pub fn guard_not_class_constructor(&mut self, fun: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardNotClassConstructor);
        self.write_operand(fun);
        self.op_end(CacheOp::GuardNotClassConstructor, start);
    }

    /// Guard the array has no holes.
    pub fn guard_array_is_packed(&mut self, array: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardArrayIsPacked);
        self.write_operand(array);
        self.op_end(CacheOp::GuardArrayIsPacked, start);
    }

    /// Guard the object has no dense elements.
    pub fn guard_no_dense_elements(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::GuardNoDenseElements);
        self.write_operand(obj);
        self.op_end(CacheOp::GuardNoDenseElements, start);
    }

    /// Guard `index` misses the dense span or hits a hole.
    pub fn guard_index_is_not_dense_element(&mut self, obj: ObjOperandId, index: Int32OperandId) {
        let start = self.op_start(CacheOp::GuardIndexIsNotDenseElement);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::GuardIndexIsNotDenseElement, start);
    }

    /// Guard `index` is within the dense span or appends right at its end.
    pub fn guard_index_is_valid_update_or_add(&mut self, obj: ObjOperandId, index: Int32OperandId) {
        let start = self.op_start(CacheOp::GuardIndexIsValidUpdateOrAdd);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::GuardIndexIsValidUpdateOrAdd, start);
    }

    /// Guard a realm fuse is intact.
    pub fn guard_fuse_intact(&mut self, fuse: FuseIndex) {
        let start = self.op_start(CacheOp::GuardFuseIntact);
        self.write_byte(fuse as u8);
        self.op_end(CacheOp::GuardFuseIntact, start);
    }

    /// Guard a fixed slot still holds a specific object.
    pub fn guard_fixed_slot_is_specific_object(
        &mut self,
        obj: ObjOperandId,
        slot_index: u64,
        expected: &ObjectRef,
    ) {
        let start = self.op_start(CacheOp::GuardFixedSlotIsSpecificObject);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_field(StubField::WeakObject(Arc::downgrade(expected)));
        self.op_end(CacheOp::GuardFixedSlotIsSpecificObject, start);
    }

    /// Guard a dynamic slot still holds a specific object.
    pub fn guard_dynamic_slot_is_specific_object(
        &mut self,
        obj: ObjOperandId,
        slot_index: u64,
        expected: &ObjectRef,
    ) {
        let start = self.op_start(CacheOp::GuardDynamicSlotIsSpecificObject);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_field(StubField::WeakObject(Arc::downgrade(expected)));
        self.op_end(CacheOp::GuardDynamicSlotIsSpecificObject, start);
    }

    // ---------------------------------------------------------------------------
    // Object loads
    // ---------------------------------------------------------------------------

    /// Materialize a constant object. The stub keeps it alive.
    pub fn load_object(&mut self, obj: &ObjectRef) -> ObjOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::LoadObject);
        self.write_operand(result);
        self.write_field(StubField::Object(Arc::clone(obj)));
        self.op_end(CacheOp::LoadObject, start);
        result
    }

    /// Load the object's prototype.
    pub fn load_proto(&mut self, obj: ObjOperandId) -> ObjOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::LoadProto);
        self.write_operand(obj);
        self.write_operand(result);
        self.op_end(CacheOp::LoadProto, start);
        result
    }

    /// Load an environment's enclosing scope.
    pub fn load_enclosing_environment(&mut self, obj: ObjOperandId) -> ObjOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::LoadEnclosingEnvironment);
        self.write_operand(obj);
        self.write_operand(result);
        self.op_end(CacheOp::LoadEnclosingEnvironment, start);
        result
    }

    // ---------------------------------------------------------------------------
    // Slot and element accesses
    // ---------------------------------------------------------------------------

    /// Return a fixed slot.
    pub fn load_fixed_slot_result(&mut self, obj: ObjOperandId, slot_index: u64) {
        let start = self.op_start(CacheOp::LoadFixedSlotResult);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.op_end(CacheOp::LoadFixedSlotResult, start);
    }

    /// Return a dynamic slot.
    pub fn load_dynamic_slot_result(&mut self, obj: ObjOperandId, slot_index: u64) {
        let start = self.op_start(CacheOp::LoadDynamicSlotResult);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.op_end(CacheOp::LoadDynamicSlotResult, start);
    }

    /// Return a dense element, failing on holes.
    pub fn load_dense_element_result(&mut self, obj: ObjOperandId, index: Int32OperandId) {
        let start = self.op_start(CacheOp::LoadDenseElementResult);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::LoadDenseElementResult, start);
    }

    /// Return a dense element, or `undefined` past the end or in a hole.
    pub fn load_dense_element_hole_result(&mut self, obj: ObjOperandId, index: Int32OperandId) {
        let start = self.op_start(CacheOp::LoadDenseElementHoleResult);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::LoadDenseElementHoleResult, start);
    }

    /// Return whether a dense element exists, failing outside the span.
    pub fn load_dense_element_exists_result(&mut self, obj: ObjOperandId, index: Int32OperandId) {
        let start = self.op_start(CacheOp::LoadDenseElementExistsResult);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::LoadDenseElementExistsResult, start);
    }

    /// Return whether a dense element exists, treating holes as absent.
    pub fn load_dense_element_hole_exists_result(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
    ) {
        let start = self.op_start(CacheOp::LoadDenseElementHoleExistsResult);
        self.write_operand(obj);
        self.write_operand(index);
        self.op_end(CacheOp::LoadDenseElementHoleExistsResult, start);
    }

    /// Return the array length as int32.
    pub fn load_int32_array_length_result(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::LoadInt32ArrayLengthResult);
        self.write_operand(obj);
        self.op_end(CacheOp::LoadInt32ArrayLengthResult, start);
    }

    /// Return the string length as int32.
    pub fn load_string_length_result(&mut self, str_id: StringOperandId) {
        let start = self.op_start(CacheOp::LoadStringLengthResult);
        self.write_operand(str_id);
        self.op_end(CacheOp::LoadStringLengthResult, start);
    }

    /// Store to a fixed slot.
    pub fn store_fixed_slot(&mut self, obj: ObjOperandId, slot_index: u64, rhs: ValOperandId) {
        let start = self.op_start(CacheOp::StoreFixedSlot);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_operand(rhs);
        self.op_end(CacheOp::StoreFixedSlot, start);
    }

    /// Store to a dynamic slot.
    pub fn store_dynamic_slot(&mut self, obj: ObjOperandId, slot_index: u64, rhs: ValOperandId) {
        let start = self.op_start(CacheOp::StoreDynamicSlot);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_operand(rhs);
        self.op_end(CacheOp::StoreDynamicSlot, start);
    }

    /// Add a property landing in a fixed slot.
    pub fn add_and_store_fixed_slot(
        &mut self,
        obj: ObjOperandId,
        slot_index: u64,
        rhs: ValOperandId,
        new_shape: &Arc<Shape>,
    ) {
        let start = self.op_start(CacheOp::AddAndStoreFixedSlot);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_operand(rhs);
        self.write_field(StubField::Shape(Arc::clone(new_shape)));
        self.op_end(CacheOp::AddAndStoreFixedSlot, start);
    }

    /// Add a property landing in an already-allocated dynamic slot.
    pub fn add_and_store_dynamic_slot(
        &mut self,
        obj: ObjOperandId,
        slot_index: u64,
        rhs: ValOperandId,
        new_shape: &Arc<Shape>,
    ) {
        let start = self.op_start(CacheOp::AddAndStoreDynamicSlot);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_operand(rhs);
        self.write_field(StubField::Shape(Arc::clone(new_shape)));
        self.op_end(CacheOp::AddAndStoreDynamicSlot, start);
    }

    /// Add a property after growing the dynamic-slot region.
    pub fn allocate_and_store_dynamic_slot(
        &mut self,
        obj: ObjOperandId,
        slot_index: u64,
        rhs: ValOperandId,
        new_shape: &Arc<Shape>,
        num_new_slots: u64,
    ) {
        let start = self.op_start(CacheOp::AllocateAndStoreDynamicSlot);
        self.write_operand(obj);
        self.write_field(StubField::RawWord(slot_index));
        self.write_operand(rhs);
        self.write_field(StubField::Shape(Arc::clone(new_shape)));
        self.write_field(StubField::RawWord(num_new_slots));
        self.op_end(CacheOp::AllocateAndStoreDynamicSlot, start);
    }

    /// Store to an existing dense element.
    pub fn store_dense_element(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
        rhs: ValOperandId,
    ) {
        let start = self.op_start(CacheOp::StoreDenseElement);
        self.write_operand(obj);
        self.write_operand(index);
        self.write_operand(rhs);
        self.op_end(CacheOp::StoreDenseElement, start);
    }

    /// Store to a dense element, optionally appending at the end.
    pub fn store_dense_element_hole(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
        rhs: ValOperandId,
        handle_add: bool,
    ) {
        let start = self.op_start(CacheOp::StoreDenseElementHole);
        self.write_operand(obj);
        self.write_operand(index);
        self.write_operand(rhs);
        self.write_bool(handle_add);
        self.op_end(CacheOp::StoreDenseElementHole, start);
    }

    // ---------------------------------------------------------------------------
    // Megamorphic paths
    // ---------------------------------------------------------------------------

    /// Generic by-name load.
    pub fn megamorphic_load_slot_result(&mut self, obj: ObjOperandId, name: &PropertyKey) {
        let start = self.op_start(CacheOp::MegamorphicLoadSlotResult);
        self.write_operand(obj);
        self.write_field(StubField::Id(name.clone()));
        self.op_end(CacheOp::MegamorphicLoadSlotResult, start);
    }

    /// Generic by-value load.
    pub fn megamorphic_load_slot_by_value_result(&mut self, obj: ObjOperandId, id: ValOperandId) {
        let start = self.op_start(CacheOp::MegamorphicLoadSlotByValueResult);
        self.write_operand(obj);
        self.write_operand(id);
        self.op_end(CacheOp::MegamorphicLoadSlotByValueResult, start);
    }

    /// Generic by-name store.
    pub fn megamorphic_store_slot(
        &mut self,
        obj: ObjOperandId,
        name: &PropertyKey,
        rhs: ValOperandId,
        strict: bool,
    ) {
        let start = self.op_start(CacheOp::MegamorphicStoreSlot);
        self.write_operand(obj);
        self.write_field(StubField::Id(name.clone()));
        self.write_operand(rhs);
        self.write_bool(strict);
        self.op_end(CacheOp::MegamorphicStoreSlot, start);
    }

    /// Generic by-value store.
    pub fn megamorphic_set_element(
        &mut self,
        obj: ObjOperandId,
        id: ValOperandId,
        rhs: ValOperandId,
        strict: bool,
    ) {
        let start = self.op_start(CacheOp::MegamorphicSetElement);
        self.write_operand(obj);
        self.write_operand(id);
        self.write_operand(rhs);
        self.write_bool(strict);
        self.op_end(CacheOp::MegamorphicSetElement, start);
    }

    /// Generic `in` / `hasOwnProperty`.
    pub fn megamorphic_has_prop_result(
        &mut self,
        obj: ObjOperandId,
        id: ValOperandId,
        has_own: bool,
    ) {
        let start = self.op_start(CacheOp::MegamorphicHasPropResult);
        self.write_operand(obj);
        self.write_operand(id);
        self.write_bool(has_own);
        self.op_end(CacheOp::MegamorphicHasPropResult, start);
    }

    // ---------------------------------------------------------------------------
    // Proxy forwarding
    // ---------------------------------------------------------------------------

    /// Invoke the get trap with a constant key.
    pub fn proxy_get_result(&mut self, obj: ObjOperandId, id: &PropertyKey) {
        let start = self.op_start(CacheOp::ProxyGetResult);
        self.write_operand(obj);
        self.write_field(StubField::Id(id.clone()));
        self.op_end(CacheOp::ProxyGetResult, start);
    }

    /// Invoke the get trap with a key operand.
    pub fn proxy_get_by_value_result(&mut self, obj: ObjOperandId, id: ValOperandId) {
        let start = self.op_start(CacheOp::ProxyGetByValueResult);
        self.write_operand(obj);
        self.write_operand(id);
        self.op_end(CacheOp::ProxyGetByValueResult, start);
    }

    /// Invoke the set trap with a constant key.
    pub fn proxy_set(&mut self, obj: ObjOperandId, id: &PropertyKey, rhs: ValOperandId, strict: bool) {
        let start = self.op_start(CacheOp::ProxySet);
        self.write_operand(obj);
        self.write_field(StubField::Id(id.clone()));
        self.write_operand(rhs);
        self.write_bool(strict);
        self.op_end(CacheOp::ProxySet, start);
    }

    /// Invoke the set trap with a key operand.
    pub fn proxy_set_by_value(
        &mut self,
        obj: ObjOperandId,
        id: ValOperandId,
        rhs: ValOperandId,
        strict: bool,
    ) {
        let start = self.op_start(CacheOp::ProxySetByValue);
        self.write_operand(obj);
        self.write_operand(id);
        self.write_operand(rhs);
        self.write_bool(strict);
        self.op_end(CacheOp::ProxySetByValue, start);
    }

    /// Invoke the has trap.
    pub fn proxy_has_prop_result(&mut self, obj: ObjOperandId, id: ValOperandId, has_own: bool) {
        let start = self.op_start(CacheOp::ProxyHasPropResult);
        self.write_operand(obj);
        self.write_operand(id);
        self.write_bool(has_own);
        self.op_end(CacheOp::ProxyHasPropResult, start);
    }

    // ---------------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------------

    /// Call a native function.
    pub fn call_native_function(&mut self, callee: ObjOperandId, flags: CallFlags, argc: u8) {
        let start = self.op_start(CacheOp::CallNativeFunction);
        self.write_operand(callee);
        self.write_byte(flags.to_byte());
        self.write_byte(argc);
        self.op_end(CacheOp::CallNativeFunction, start);
    }

    /// Enter a scripted function.
    pub fn call_scripted_function(&mut self, callee: ObjOperandId, flags: CallFlags, argc: u8) {
        let start = self.op_start(CacheOp::CallScriptedFunction);
        self.write_operand(callee);
        self.write_byte(flags.to_byte());
        self.write_byte(argc);
        self.op_end(CacheOp::CallScriptedFunction, start);
    }

    /// Call through a bound function into its scripted target.
    pub fn call_bound_scripted_function(
        &mut self,
        callee: ObjOperandId,
        flags: CallFlags,
        argc: u8,
        num_bound_args: u8,
    ) {
        let start = self.op_start(CacheOp::CallBoundScriptedFunction);
        self.write_operand(callee);
        self.write_byte(flags.to_byte());
        self.write_byte(argc);
        self.write_byte(num_bound_args);
        self.op_end(CacheOp::CallBoundScriptedFunction, start);
    }

    /// Call a native getter.
    pub fn call_native_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: &ObjectRef,
        same_realm: bool,
    ) {
        let start = self.op_start(CacheOp::CallNativeGetterResult);
        self.write_operand(receiver);
        self.write_field(StubField::Object(Arc::clone(getter)));
        self.write_bool(same_realm);
        self.op_end(CacheOp::CallNativeGetterResult, start);
    }

    /// Enter a scripted getter.
    pub fn call_scripted_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: &ObjectRef,
        same_realm: bool,
    ) {
        let start = self.op_start(CacheOp::CallScriptedGetterResult);
        self.write_operand(receiver);
        self.write_field(StubField::Object(Arc::clone(getter)));
        self.write_bool(same_realm);
        self.op_end(CacheOp::CallScriptedGetterResult, start);
    }

    /// Call a native setter.
    pub fn call_native_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: &ObjectRef,
        rhs: ValOperandId,
        same_realm: bool,
    ) {
        let start = self.op_start(CacheOp::CallNativeSetter);
        self.write_operand(receiver);
        self.write_field(StubField::Object(Arc::clone(setter)));
        self.write_operand(rhs);
        self.write_bool(same_realm);
        self.op_end(CacheOp::CallNativeSetter, start);
    }

    /// Enter a scripted setter.
    pub fn call_scripted_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: &ObjectRef,
        rhs: ValOperandId,
        same_realm: bool,
    ) {
        let start = self.op_start(CacheOp::CallScriptedSetter);
        self.write_operand(receiver);
        self.write_field(StubField::Object(Arc::clone(setter)));
        self.write_operand(rhs);
        self.write_bool(same_realm);
        self.op_end(CacheOp::CallScriptedSetter, start);
    }

    /// Record the `this` shape for a constructing call.
    pub fn meta_scripted_this_shape(&mut self, this_shape: &Arc<Shape>) {
        let start = self.op_start(CacheOp::MetaScriptedThisShape);
        self.write_field(StubField::Shape(Arc::clone(this_shape)));
        self.op_end(CacheOp::MetaScriptedThisShape, start);
    }

    // ---------------------------------------------------------------------------
    // Results
    // ---------------------------------------------------------------------------

    /// Return `undefined`.
    pub fn load_undefined_result(&mut self) {
        let start = self.op_start(CacheOp::LoadUndefinedResult);
        self.op_end(CacheOp::LoadUndefinedResult, start);
    }

    /// Return a boolean constant.
    pub fn load_boolean_result(&mut self, value: bool) {
        let start = self.op_start(CacheOp::LoadBooleanResult);
        self.write_bool(value);
        self.op_end(CacheOp::LoadBooleanResult, start);
    }

    /// Return an int32 operand.
    pub fn load_int32_result(&mut self, val: Int32OperandId) {
        let start = self.op_start(CacheOp::LoadInt32Result);
        self.write_operand(val);
        self.op_end(CacheOp::LoadInt32Result, start);
    }

    /// Return a number operand.
    pub fn load_double_result(&mut self, val: NumberOperandId) {
        let start = self.op_start(CacheOp::LoadDoubleResult);
        self.write_operand(val);
        self.op_end(CacheOp::LoadDoubleResult, start);
    }

    /// Return a string operand.
    pub fn load_string_result(&mut self, str_id: StringOperandId) {
        let start = self.op_start(CacheOp::LoadStringResult);
        self.write_operand(str_id);
        self.op_end(CacheOp::LoadStringResult, start);
    }

    /// Return a symbol operand.
    pub fn load_symbol_result(&mut self, sym: SymbolOperandId) {
        let start = self.op_start(CacheOp::LoadSymbolResult);
        self.write_operand(sym);
        self.op_end(CacheOp::LoadSymbolResult, start);
    }

    /// Return a big-integer operand.
    pub fn load_big_int_result(&mut self, val: BigIntOperandId) {
        let start = self.op_start(CacheOp::LoadBigIntResult);
        self.write_operand(val);
        self.op_end(CacheOp::LoadBigIntResult, start);
    }

    /// Return an object operand.
    pub fn load_object_result(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::LoadObjectResult);
        self.write_operand(obj);
        self.op_end(CacheOp::LoadObjectResult, start);
    }

    /// Return a value operand unchanged.
    pub fn load_value_result(&mut self, val: ValOperandId) {
        let start = self.op_start(CacheOp::LoadValueResult);
        self.write_operand(val);
        self.op_end(CacheOp::LoadValueResult, start);
    }

    /// Return a constant string.
    pub fn load_constant_string_result(&mut self, value: &Atom) {
        let start = self.op_start(CacheOp::LoadConstantStringResult);
        self.write_field(StubField::Atom(value.clone()));
        self.op_end(CacheOp::LoadConstantStringResult, start);
    }

    // ---------------------------------------------------------------------------
    // Comparisons
    // ---------------------------------------------------------------------------

    /// Compare two int32 operands.
    pub fn compare_int32_result(&mut self, op: CompareOp, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::CompareInt32Result);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareInt32Result, start);
    }

    /// Compare two number operands.
    pub fn compare_double_result(
        &mut self,
        op: CompareOp,
        lhs: NumberOperandId,
        rhs: NumberOperandId,
    ) {
        let start = self.op_start(CacheOp::CompareDoubleResult);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareDoubleResult, start);
    }

    /// Compare two string operands.
    pub fn compare_string_result(
        &mut self,
        op: CompareOp,
        lhs: StringOperandId,
        rhs: StringOperandId,
    ) {
        let start = self.op_start(CacheOp::CompareStringResult);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareStringResult, start);
    }

    /// Compare two objects by identity.
    pub fn compare_object_result(&mut self, op: CompareOp, lhs: ObjOperandId, rhs: ObjOperandId) {
        debug_assert!(op.is_equality());
        let start = self.op_start(CacheOp::CompareObjectResult);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareObjectResult, start);
    }

    /// Compare two symbols by identity.
    pub fn compare_symbol_result(
        &mut self,
        op: CompareOp,
        lhs: SymbolOperandId,
        rhs: SymbolOperandId,
    ) {
        debug_assert!(op.is_equality());
        let start = self.op_start(CacheOp::CompareSymbolResult);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareSymbolResult, start);
    }

    /// Compare two big integers.
    pub fn compare_big_int_result(
        &mut self,
        op: CompareOp,
        lhs: BigIntOperandId,
        rhs: BigIntOperandId,
    ) {
        let start = self.op_start(CacheOp::CompareBigIntResult);
        self.write_byte(op as u8);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CompareBigIntResult, start);
    }

    /// Compare a value against `null`/`undefined`.
    pub fn compare_null_undefined_result(
        &mut self,
        op: CompareOp,
        is_undefined: bool,
        input: ValOperandId,
    ) {
        debug_assert!(op.is_equality());
        let start = self.op_start(CacheOp::CompareNullUndefinedResult);
        self.write_byte(op as u8);
        self.write_bool(is_undefined);
        self.write_operand(input);
        self.op_end(CacheOp::CompareNullUndefinedResult, start);
    }

    // ---------------------------------------------------------------------------
    // Arithmetic
    // ---------------------------------------------------------------------------

    /// Int32 addition.
    pub fn int32_add_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32AddResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32AddResult, start);
    }

    /// Int32 subtraction.
    pub fn int32_sub_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32SubResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32SubResult, start);
    }

    /// Int32 multiplication.
    pub fn int32_mul_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32MulResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32MulResult, start);
    }

    /// Int32 division.
    pub fn int32_div_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32DivResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32DivResult, start);
    }

    /// Int32 remainder.
    pub fn int32_mod_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32ModResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32ModResult, start);
    }

    /// Bitwise and.
    pub fn int32_bit_and_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32BitAndResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32BitAndResult, start);
    }

    /// Bitwise or.
    pub fn int32_bit_or_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32BitOrResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32BitOrResult, start);
    }

    /// Bitwise xor.
    pub fn int32_bit_xor_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32BitXorResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32BitXorResult, start);
    }

    /// Left shift.
    pub fn int32_left_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32LeftShiftResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32LeftShiftResult, start);
    }

    /// Arithmetic right shift.
    pub fn int32_right_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32RightShiftResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::Int32RightShiftResult, start);
    }

    /// Int32 negation.
    pub fn int32_negation_result(&mut self, input: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32NegationResult);
        self.write_operand(input);
        self.op_end(CacheOp::Int32NegationResult, start);
    }

    /// Int32 increment.
    pub fn int32_inc_result(&mut self, input: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32IncResult);
        self.write_operand(input);
        self.op_end(CacheOp::Int32IncResult, start);
    }

    /// Int32 decrement.
    pub fn int32_dec_result(&mut self, input: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32DecResult);
        self.write_operand(input);
        self.op_end(CacheOp::Int32DecResult, start);
    }

    /// Bitwise not.
    pub fn int32_not_result(&mut self, input: Int32OperandId) {
        let start = self.op_start(CacheOp::Int32NotResult);
        self.write_operand(input);
        self.op_end(CacheOp::Int32NotResult, start);
    }

    /// Double addition.
    pub fn double_add_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleAddResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::DoubleAddResult, start);
    }

    /// Double subtraction.
    pub fn double_sub_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleSubResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::DoubleSubResult, start);
    }

    /// Double multiplication.
    pub fn double_mul_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleMulResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::DoubleMulResult, start);
    }

    /// Double division.
    pub fn double_div_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleDivResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::DoubleDivResult, start);
    }

    /// Double remainder.
    pub fn double_mod_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleModResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::DoubleModResult, start);
    }

    /// Double negation.
    pub fn double_negation_result(&mut self, input: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleNegationResult);
        self.write_operand(input);
        self.op_end(CacheOp::DoubleNegationResult, start);
    }

    /// Double increment.
    pub fn double_inc_result(&mut self, input: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleIncResult);
        self.write_operand(input);
        self.op_end(CacheOp::DoubleIncResult, start);
    }

    /// Double decrement.
    pub fn double_dec_result(&mut self, input: NumberOperandId) {
        let start = self.op_start(CacheOp::DoubleDecResult);
        self.write_operand(input);
        self.op_end(CacheOp::DoubleDecResult, start);
    }

    /// Big-integer addition.
    pub fn big_int_add_result(&mut self, lhs: BigIntOperandId, rhs: BigIntOperandId) {
        let start = self.op_start(CacheOp::BigIntAddResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::BigIntAddResult, start);
    }

    /// String concatenation.
    pub fn call_string_concat_result(&mut self, lhs: StringOperandId, rhs: StringOperandId) {
        let start = self.op_start(CacheOp::CallStringConcatResult);
        self.write_operand(lhs);
        self.write_operand(rhs);
        self.op_end(CacheOp::CallStringConcatResult, start);
    }

    /// Render an int32 as a string operand.
    pub fn call_int32_to_string(&mut self, input: Int32OperandId) -> StringOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::CallInt32ToString);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::CallInt32ToString, start);
        result
    }

    /// Render a number as a string operand.
    pub fn call_number_to_string(&mut self, input: NumberOperandId) -> StringOperandId {
        let result = self.define();
        let start = self.op_start(CacheOp::CallNumberToString);
        self.write_operand(input);
        self.write_operand(result);
        self.op_end(CacheOp::CallNumberToString, start);
        result
    }

    // ---------------------------------------------------------------------------
    // Type queries
    // ---------------------------------------------------------------------------

    /// `typeof` for an object operand.
    pub fn load_type_of_object_result(&mut self, obj: ObjOperandId) {
        let start = self.op_start(CacheOp::LoadTypeOfObjectResult);
        self.write_operand(obj);
        self.op_end(CacheOp::LoadTypeOfObjectResult, start);
    }

    /// `instanceof` against a known prototype.
    pub fn load_instance_of_object_result(&mut self, lhs: ValOperandId, proto: ObjOperandId) {
        let start = self.op_start(CacheOp::LoadInstanceOfObjectResult);
        self.write_operand(lhs);
        self.write_operand(proto);
        self.op_end(CacheOp::LoadInstanceOfObjectResult, start);
    }

    // ---------------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------------

    /// Allocate a plain object from a template shape.
    pub fn new_plain_object_result(&mut self, shape: &Arc<Shape>, site: &Arc<AllocSite>) {
        let start = self.op_start(CacheOp::NewPlainObjectResult);
        self.write_field(StubField::Shape(Arc::clone(shape)));
        self.write_field(StubField::AllocSite(Arc::clone(site)));
        self.op_end(CacheOp::NewPlainObjectResult, start);
    }

    /// Allocate a dense array.
    pub fn new_array_object_result(
        &mut self,
        length: u32,
        shape: &Arc<Shape>,
        site: &Arc<AllocSite>,
    ) {
        let start = self.op_start(CacheOp::NewArrayObjectResult);
        self.write_uint32(length);
        self.write_field(StubField::Shape(Arc::clone(shape)));
        self.write_field(StubField::AllocSite(Arc::clone(site)));
        self.op_end(CacheOp::NewArrayObjectResult, start);
    }

    /// Allocate an array iterator.
    pub fn new_array_iterator_result(
        &mut self,
        obj: ObjOperandId,
        template_shape: &Arc<Shape>,
        site: &Arc<AllocSite>,
    ) {
        let start = self.op_start(CacheOp::NewArrayIteratorResult);
        self.write_operand(obj);
        self.write_field(StubField::Shape(Arc::clone(template_shape)));
        self.write_field(StubField::AllocSite(Arc::clone(site)));
        self.op_end(CacheOp::NewArrayIteratorResult, start);
    }

    // ---------------------------------------------------------------------------
    // Terminator
    // ---------------------------------------------------------------------------

    /// End the stream.
    pub fn return_from_ic(&mut self) {
        let start = self.op_start(CacheOp::ReturnFromIC);
        self.op_end(CacheOp::ReturnFromIC, start);
        self.wrote_terminal = true;
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_object::RealmId;

    fn test_shape() -> Arc<Shape> {
        Shape::base(RealmId::new(0), ClassKind::Plain, None)
    }

    #[test]
    fn test_inputs_then_fresh_ids() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        assert_eq!(receiver.id(), 0);

        let obj = writer.guard_to_object(receiver);
        assert_eq!(obj.id(), 0, "narrowing keeps the id");

        let proto = writer.load_proto(obj);
        assert_eq!(proto.id(), 1, "definitions allocate fresh ids");
        assert_eq!(writer.num_operand_ids(), 2);
        assert_eq!(writer.input_count(), 1);
    }

    #[test]
    fn test_simple_get_prop_stream() {
        let shape = test_shape();
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_shape(obj, &shape);
        writer.load_fixed_slot_result(obj, 3);
        writer.return_from_ic();

        let stream = writer.finish().expect("stream should finish");
        assert_eq!(
            stream.ops(),
            &[
                CacheOp::GuardToObject,
                CacheOp::GuardShape,
                CacheOp::LoadFixedSlotResult,
                CacheOp::ReturnFromIC,
            ]
        );
        assert_eq!(stream.fields().len(), 2);
        assert_eq!(stream.field_types(), vec![FieldType::WeakShape, FieldType::RawWord]);
        assert_eq!(stream.input_count(), 1);

        let expected_len: usize = stream.ops().iter().map(|op| 1 + op.encoded_args_len()).sum();
        assert_eq!(stream.code().len(), expected_len);
        assert!(stream.is_transpilable());
    }

    #[test]
    fn test_field_dedup_across_instructions() {
        let shape = test_shape();
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_shape(obj, &shape);
        writer.guard_shape(obj, &shape);
        writer.return_from_ic();

        assert_eq!(writer.num_fields(), 1);
    }

    #[test]
    fn test_unterminated_stream_does_not_finish() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        writer.guard_to_object(receiver);
        assert!(writer.finish().is_none());
    }

    #[test]
    fn test_poison_on_operand_overflow() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        for _ in 0..MAX_OPERAND_IDS {
            writer.load_proto(obj);
        }
        assert!(writer.is_poisoned());
        writer.return_from_ic();
        assert!(writer.finish().is_none());
    }

    #[test]
    fn test_poison_on_field_overflow() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        for slot in 0..=MAX_STUB_FIELDS as u64 {
            writer.load_fixed_slot_result(obj, slot);
        }
        assert!(writer.is_poisoned());
        writer.return_from_ic();
        assert!(writer.finish().is_none());
    }

    #[test]
    fn test_poison_on_code_overflow() {
        let mut writer = CacheIrWriter::new();
        for _ in 0..=MAX_CODE_BYTES {
            writer.load_undefined_result();
        }
        assert!(writer.is_poisoned());
        writer.return_from_ic();
        assert!(writer.finish().is_none());
    }

    #[test]
    fn test_allocation_ops_are_not_transpilable() {
        let shape = test_shape();
        let site = AllocSite::new(None, 0);
        let mut writer = CacheIrWriter::new();
        writer.new_plain_object_result(&shape, &site);
        writer.return_from_ic();

        let stream = writer.finish().expect("stream should finish");
        assert!(!stream.is_transpilable());
    }
}
