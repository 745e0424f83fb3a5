//! Reference stub evaluator.
//!
//! Runs one attached stub against concrete inputs, giving every cache
//! op a precise meaning. Guards either pass or end evaluation with
//! [`StubRun::GuardFailed`]; action ops compute the result or transfer
//! control out with [`EvalOutcome::EnterScript`]. Decoding errors are
//! impossible for writer-produced streams and surface as
//! [`CacheIrError`] rather than panics.
//!
//! Operand registers are typed by construction: a narrowing guard
//! verifies the tag and keeps the register, so downstream reads can
//! treat a type-confused register as stream corruption.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use ferret_cacheir::error::{CacheIrError, CacheIrResult};
use ferret_cacheir::flags::{CallFlags, CompareOp};
use ferret_cacheir::ops::CacheOp;
use ferret_cacheir::reader::CacheIrReader;
use ferret_cacheir::stub_field::{FieldCursor, StubField};
use ferret_object::object::{JsObject, NativeCallArgs, ObjectKind};
use ferret_object::shape::{ClassKind, PropertyAttributes, PropertyKind, Shape, SlotLocation};
use ferret_object::value::{Value, ValueTag};
use ferret_object::{Atom, FuseIndex, Heap, ObjectRef, PropertyKey, Realm, Script};
use num_bigint::BigInt;

use crate::stub::{CacheIrStubInfo, StubData};

// ==================== Outcomes ====================

/// What a successfully-completed stub produced.
#[derive(Debug, Clone)]
pub enum EvalOutcome {
    /// The cached operation's value.
    Returned(Value),
    /// Control transfers into a scripted callee; the engine boundary
    /// pushes the frame.
    EnterScript {
        /// The callee's script.
        script: Arc<Script>,
        /// The `this` value for the new frame.
        this: Value,
        /// Arguments, already remapped for the call shape.
        args: Vec<Value>,
    },
}

/// Result of running one stub.
#[derive(Debug, Clone)]
pub enum StubRun {
    /// A guard did not hold; the site tries the next stub.
    GuardFailed,
    /// The stub ran to completion.
    Finished(EvalOutcome),
}

enum Step {
    Next,
    Fail,
    Done(EvalOutcome),
}

// ==================== Entry point ====================

/// Evaluate `info`+`data` against `inputs`.
pub fn evaluate_stub(
    info: &CacheIrStubInfo,
    data: &StubData,
    realm: &Realm,
    heap: &Heap,
    inputs: &[Value],
) -> CacheIrResult<StubRun> {
    debug_assert_eq!(inputs.len(), usize::from(info.input_count()));
    let mut machine = Machine {
        regs: inputs.to_vec(),
        result: None,
        realm,
        heap,
        inputs,
    };
    let mut reader = CacheIrReader::new(info.code());
    let mut cursor = FieldCursor::new(data.fields());
    loop {
        if reader.done() {
            return Err(CacheIrError::MissingTerminal);
        }
        let op = reader.read_op()?;
        match machine.step(op, &mut reader, &mut cursor)? {
            Step::Next => {}
            Step::Fail => return Ok(StubRun::GuardFailed),
            Step::Done(outcome) => return Ok(StubRun::Finished(outcome)),
        }
    }
}

// ==================== Helpers ====================

pub(crate) fn tag_name(value: &Value) -> &'static str {
    match value.tag() {
        ValueTag::Undefined => "undefined",
        ValueTag::Null => "null",
        ValueTag::Boolean => "boolean",
        ValueTag::Int32 => "int32",
        ValueTag::Double => "double",
        ValueTag::String => "string",
        ValueTag::Symbol => "symbol",
        ValueTag::BigInt => "bigint",
        ValueTag::Object => "object",
    }
}

fn bad_field(op: CacheOp, pos: usize) -> CacheIrError {
    CacheIrError::InvalidImmediate { op: op.name(), offset: pos }
}

/// Property key for a by-value access. Keys outside the supported
/// tags make the stub fail over to the fallback.
fn value_to_key(value: &Value) -> Option<PropertyKey> {
    match value {
        Value::Int32(i) if *i >= 0 => Some(PropertyKey::Index(*i as u32)),
        Value::String(atom) => Some(PropertyKey::from_atom(atom.clone())),
        Value::Symbol(sym) => Some(PropertyKey::Symbol(sym.clone())),
        _ => None,
    }
}

fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}

/// Generic chain-walking `[[Get]]` for megamorphic stubs. `None` makes
/// the stub fail over to the fallback (scripted accessors and other
/// cases a data-slot walk cannot finish).
fn generic_get(receiver: &ObjectRef, key: &PropertyKey) -> Option<Value> {
    let mut current = Arc::clone(receiver);
    loop {
        if let Some(proxy) = current.as_proxy() {
            return Some(proxy.handler.get(&proxy.target, key));
        }
        if let PropertyKey::Index(index) = key
            && let Some(value) = current.element(*index)
        {
            return Some(value);
        }
        if let Some(info) = current.shape().property(key) {
            return match info.kind {
                PropertyKind::Data => Some(current.read_slot(info.slot)),
                PropertyKind::Accessor => {
                    let (getter, _) = current.accessor_pair(info);
                    let getter = getter?;
                    let native = getter.as_function()?.native?;
                    Some(native(&NativeCallArgs {
                        this: Value::Object(Arc::clone(receiver)),
                        args: &[],
                    }))
                }
            };
        }
        match current.proto() {
            Some(next) => current = next,
            None => return Some(Value::Undefined),
        }
    }
}

fn generic_has(receiver: &ObjectRef, key: &PropertyKey, has_own: bool) -> bool {
    let mut current = Arc::clone(receiver);
    loop {
        if let Some(proxy) = current.as_proxy() {
            return proxy.handler.has(&proxy.target, key);
        }
        if let PropertyKey::Index(index) = key
            && current.element(*index).is_some()
        {
            return true;
        }
        if current.shape().property(key).is_some() {
            return true;
        }
        if has_own {
            return false;
        }
        match current.proto() {
            Some(next) => current = next,
            None => return false,
        }
    }
}

/// How a generic store resolved.
enum GenericStore {
    /// The value landed in a slot, an element, or a native setter.
    Stored,
    /// The store is rejected: non-writable data or a setter-less
    /// accessor. Non-strict callers swallow this; strict callers fail
    /// over so the fallback can throw.
    Rejected,
    /// The chain holds something a slot store cannot finish correctly
    /// (a scripted setter, a proxy link); the stub must fail over.
    NeedsFallback,
}

/// Generic chain-walking `[[Set]]` for megamorphic stubs, mirroring
/// [`generic_get`]'s failover discipline: an inherited accessor must run
/// or force the fallback, never be shadowed by a blind own define.
fn generic_set(heap: &Heap, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> GenericStore {
    if let Some(proxy) = receiver.as_proxy() {
        return if proxy.handler.set(heap, &proxy.target, key, value) {
            GenericStore::Stored
        } else {
            GenericStore::Rejected
        };
    }

    let mut current = Arc::clone(receiver);
    let mut depth = 0u32;
    loop {
        if current.is_proxy() {
            return GenericStore::NeedsFallback;
        }
        if let PropertyKey::Index(index) = key
            && depth == 0
            && current.element(*index).is_some()
        {
            receiver.set_element(heap, *index, value);
            return GenericStore::Stored;
        }
        if let Some(info) = current.shape().property(key) {
            return match info.kind {
                PropertyKind::Data if info.attrs.writable => {
                    if depth == 0 {
                        receiver.write_slot(info.slot, value);
                        GenericStore::Stored
                    } else if receiver.define_data_property(
                        heap,
                        key.clone(),
                        value,
                        PropertyAttributes::default_data(),
                    ) {
                        GenericStore::Stored
                    } else {
                        GenericStore::Rejected
                    }
                }
                PropertyKind::Data => GenericStore::Rejected,
                PropertyKind::Accessor => {
                    let (_, setter) = current.accessor_pair(info);
                    let Some(setter) = setter else {
                        return GenericStore::Rejected;
                    };
                    let Some(native) = setter.as_function().and_then(|f| f.native) else {
                        return GenericStore::NeedsFallback;
                    };
                    native(&NativeCallArgs {
                        this: Value::Object(Arc::clone(receiver)),
                        args: &[value],
                    });
                    GenericStore::Stored
                }
            };
        }
        match current.proto() {
            Some(next) => {
                current = next;
                depth += 1;
            }
            None => {
                return if receiver.define_data_property(
                    heap,
                    key.clone(),
                    value,
                    PropertyAttributes::default_data(),
                ) {
                    GenericStore::Stored
                } else {
                    GenericStore::Rejected
                };
            }
        }
    }
}

/// Map a call site's input layout to the callee's `this` and argument
/// list. Inputs are `[callee, this, arg0..]`; the flags say how the
/// original stack re-maps.
fn call_layout(flags: CallFlags, argc: u8, inputs: &[Value]) -> Option<(Value, Vec<Value>)> {
    let argc = usize::from(argc);
    let arg = |i: usize| inputs.get(2 + i).cloned();
    match flags.format {
        ferret_cacheir::flags::ArgFormat::Standard => {
            let mut args = Vec::with_capacity(argc);
            for i in 0..argc {
                args.push(arg(i)?);
            }
            Some((inputs.get(1).cloned().unwrap_or(Value::Undefined), args))
        }
        ferret_cacheir::flags::ArgFormat::FunCall => {
            // callee(thisArg, rest..): drop the first stack argument.
            let this = arg(0).unwrap_or(Value::Undefined);
            let mut args = Vec::with_capacity(argc);
            for i in 0..argc {
                args.push(arg(1 + i)?);
            }
            Some((this, args))
        }
        ferret_cacheir::flags::ArgFormat::FunApplyArray => {
            let this = arg(0).unwrap_or(Value::Undefined);
            let array = arg(1)?;
            Some((this, expand_packed(array.as_object()?)?))
        }
        ferret_cacheir::flags::ArgFormat::Spread => {
            // Leading arguments pass through; the last one spreads.
            let mut args = Vec::new();
            for i in 0..argc.checked_sub(1)? {
                args.push(arg(i)?);
            }
            args.extend(expand_packed(arg(argc - 1)?.as_object()?)?);
            Some((inputs.get(1).cloned().unwrap_or(Value::Undefined), args))
        }
    }
}

fn expand_packed(array: &ObjectRef) -> Option<Vec<Value>> {
    if !array.is_packed() {
        return None;
    }
    let len = array.elements_len();
    let mut out = Vec::with_capacity(len as usize);
    for index in 0..len {
        out.push(array.element(index)?);
    }
    Some(out)
}

// ==================== Machine ====================

struct Machine<'rt> {
    regs: Vec<Value>,
    result: Option<Value>,
    realm: &'rt Realm,
    heap: &'rt Heap,
    inputs: &'rt [Value],
}

impl Machine<'_> {
    fn set(&mut self, id: u16, value: Value) {
        let index = usize::from(id);
        if self.regs.len() <= index {
            self.regs.resize(index + 1, Value::Undefined);
        }
        self.regs[index] = value;
    }

    fn val(&self, id: u16) -> Value {
        self.regs.get(usize::from(id)).cloned().unwrap_or(Value::Undefined)
    }

    fn mismatch(&self, op: CacheOp, id: u16, expected: &'static str) -> CacheIrError {
        CacheIrError::OperandTypeMismatch {
            op: op.name(),
            id,
            expected,
            found: tag_name(&self.val(id)),
        }
    }

    fn obj(&self, op: CacheOp, id: u16) -> CacheIrResult<ObjectRef> {
        match self.val(id) {
            Value::Object(obj) => Ok(obj),
            _ => Err(self.mismatch(op, id, "object")),
        }
    }

    fn int32(&self, op: CacheOp, id: u16) -> CacheIrResult<i32> {
        self.val(id).as_int32().ok_or_else(|| self.mismatch(op, id, "int32"))
    }

    fn number(&self, op: CacheOp, id: u16) -> CacheIrResult<f64> {
        self.val(id).as_number().ok_or_else(|| self.mismatch(op, id, "number"))
    }

    fn string(&self, op: CacheOp, id: u16) -> CacheIrResult<Atom> {
        match self.val(id) {
            Value::String(atom) => Ok(atom),
            _ => Err(self.mismatch(op, id, "string")),
        }
    }

    fn bigint(&self, op: CacheOp, id: u16) -> CacheIrResult<Arc<BigInt>> {
        match self.val(id) {
            Value::BigInt(value) => Ok(value),
            _ => Err(self.mismatch(op, id, "bigint")),
        }
    }

    // -----------------------------------------------------------------------
    // Field accessors. A cleared weak field reads as `None`, which guard
    // evaluation turns into failure; a type-confused field is corruption.
    // -----------------------------------------------------------------------

    fn shape_field(op: CacheOp, pos: usize, field: &StubField) -> CacheIrResult<Option<Arc<Shape>>> {
        match field {
            StubField::Shape(_) | StubField::WeakShape(_) => Ok(field.shape_value()),
            _ => Err(bad_field(op, pos)),
        }
    }

    fn object_field(op: CacheOp, pos: usize, field: &StubField) -> CacheIrResult<Option<ObjectRef>> {
        match field {
            StubField::Object(_) | StubField::WeakObject(_) => Ok(field.object_value()),
            _ => Err(bad_field(op, pos)),
        }
    }

    fn word_field(op: CacheOp, pos: usize, field: &StubField) -> CacheIrResult<u64> {
        field.raw_word_value().ok_or(bad_field(op, pos))
    }

    fn key_field<'f>(op: CacheOp, pos: usize, field: &'f StubField) -> CacheIrResult<&'f PropertyKey> {
        field.key_value().ok_or(bad_field(op, pos))
    }

    fn atom_field<'f>(op: CacheOp, pos: usize, field: &'f StubField) -> CacheIrResult<&'f Atom> {
        field.atom_value().ok_or(bad_field(op, pos))
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        op: CacheOp,
        reader: &mut CacheIrReader<'_>,
        cursor: &mut FieldCursor<'_>,
    ) -> CacheIrResult<Step> {
        let pass = |ok: bool| if ok { Step::Next } else { Step::Fail };
        Ok(match op {
            // ---------------- narrowing guards ----------------
            CacheOp::GuardToObject => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Object(_)))
            }
            CacheOp::GuardToString => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::String(_)))
            }
            CacheOp::GuardToSymbol => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Symbol(_)))
            }
            CacheOp::GuardToBigInt => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::BigInt(_)))
            }
            CacheOp::GuardToBoolean => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Boolean(_)))
            }
            CacheOp::GuardToInt32 => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Int32(_)))
            }
            CacheOp::GuardToNumber => {
                let id = reader.read_raw_id()?;
                pass(self.val(id).is_number())
            }
            CacheOp::GuardIsNull => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Null))
            }
            CacheOp::GuardIsUndefined => {
                let id = reader.read_raw_id()?;
                pass(matches!(self.val(id), Value::Undefined))
            }
            CacheOp::GuardIsNullOrUndefined => {
                let id = reader.read_raw_id()?;
                pass(self.val(id).is_null_or_undefined())
            }
            CacheOp::GuardNonDoubleType => {
                let id = reader.read_raw_id()?;
                let byte = reader.read_byte()?;
                let tag = ValueTag::from_byte(byte).ok_or(bad_field(op, reader.pos()))?;
                pass(self.val(id).tag() == tag)
            }

            // ---------------- coercion guards ----------------
            CacheOp::GuardToInt32Index => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                let index = match self.val(input) {
                    Value::Int32(i) => Some(i),
                    Value::Double(d)
                        if d.fract() == 0.0
                            && d >= f64::from(i32::MIN)
                            && d <= f64::from(i32::MAX)
                            && !(d == 0.0 && d.is_sign_negative()) =>
                    {
                        Some(d as i32)
                    }
                    _ => None,
                };
                match index {
                    Some(i) => {
                        self.set(result, Value::Int32(i));
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::GuardBooleanToInt32 => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                match self.val(input) {
                    Value::Boolean(b) => {
                        self.set(result, Value::Int32(i32::from(b)));
                        Step::Next
                    }
                    _ => Step::Fail,
                }
            }
            CacheOp::GuardStringToNumber => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                match self.val(input) {
                    Value::String(atom) => {
                        let parsed = ferret_object::value::string_to_number(atom.as_str());
                        self.set(result, Value::number(parsed));
                        Step::Next
                    }
                    _ => Step::Fail,
                }
            }
            CacheOp::GuardStringToInt32 => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                match self.val(input) {
                    Value::String(atom) => {
                        match ferret_object::value::string_to_int32(atom.as_str()) {
                            Some(i) => {
                                self.set(result, Value::Int32(i));
                                Step::Next
                            }
                            None => Step::Fail,
                        }
                    }
                    _ => Step::Fail,
                }
            }
            CacheOp::Int32ToIntPtr => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                let value = self.int32(op, input)?;
                self.set(result, Value::Int32(value));
                Step::Next
            }

            // ---------------- object guards ----------------
            CacheOp::GuardShape => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let obj = self.obj(op, id)?;
                match Self::shape_field(op, reader.pos(), field)? {
                    Some(shape) => pass(obj.shape().id() == shape.id()),
                    None => Step::Fail,
                }
            }
            CacheOp::GuardProto => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let obj = self.obj(op, id)?;
                match Self::object_field(op, reader.pos(), field)? {
                    Some(expected) => {
                        pass(obj.proto().is_some_and(|proto| Arc::ptr_eq(&proto, &expected)))
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::GuardNullProto => {
                let id = reader.read_raw_id()?;
                pass(self.obj(op, id)?.proto().is_none())
            }
            CacheOp::GuardClass => {
                let id = reader.read_raw_id()?;
                let byte = reader.read_byte()?;
                let class = ClassKind::from_byte(byte).ok_or(bad_field(op, reader.pos()))?;
                pass(self.obj(op, id)?.class_kind() == class)
            }
            CacheOp::GuardIsNativeObject => {
                let id = reader.read_raw_id()?;
                pass(self.obj(op, id)?.is_native())
            }
            CacheOp::GuardIsProxy => {
                let id = reader.read_raw_id()?;
                pass(self.obj(op, id)?.is_proxy())
            }
            CacheOp::GuardIsNotProxy => {
                let id = reader.read_raw_id()?;
                pass(!self.obj(op, id)?.is_proxy())
            }
            CacheOp::GuardIsExtensible => {
                let id = reader.read_raw_id()?;
                pass(self.obj(op, id)?.shape().is_extensible())
            }
            CacheOp::GuardSpecificObject => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let obj = self.obj(op, id)?;
                match Self::object_field(op, reader.pos(), field)? {
                    Some(expected) => pass(Arc::ptr_eq(&obj, &expected)),
                    None => Step::Fail,
                }
            }
            CacheOp::GuardSpecificFunction => {
                let id = reader.read_raw_id()?;
                let expected = cursor.read(reader.read_field_offset()?)?;
                let expected = Self::object_field(op, reader.pos(), expected)?;
                let word = cursor.read(reader.read_field_offset()?)?;
                Self::word_field(op, reader.pos(), word)?;
                let obj = self.obj(op, id)?;
                match expected {
                    Some(expected) => pass(Arc::ptr_eq(&obj, &expected)),
                    None => Step::Fail,
                }
            }
            CacheOp::GuardFunctionScript => {
                let id = reader.read_raw_id()?;
                let script = cursor.read(reader.read_field_offset()?)?;
                let script = script.script_value();
                let word = cursor.read(reader.read_field_offset()?)?;
                Self::word_field(op, reader.pos(), word)?;
                let obj = self.obj(op, id)?;
                match (script, obj.as_function().and_then(|f| f.script.as_ref())) {
                    (Some(expected), Some(actual)) => pass(expected.id() == actual.id()),
                    _ => Step::Fail,
                }
            }
            CacheOp::GuardSpecificAtom => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let expected = Self::atom_field(op, reader.pos(), field)?;
                pass(self.string(op, id)? == *expected)
            }
            CacheOp::GuardSpecificSymbol => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let expected = field.symbol_value().ok_or(bad_field(op, reader.pos()))?;
                match self.val(id) {
                    Value::Symbol(sym) => pass(sym.id() == expected.id()),
                    _ => return Err(self.mismatch(op, id, "symbol")),
                }
            }
            CacheOp::GuardSpecificInt32 => {
                let id = reader.read_raw_id()?;
                let expected = reader.read_int32()?;
                pass(self.int32(op, id)? == expected)
            }
            CacheOp::GuardFunctionHasJitEntry => {
                let id = reader.read_raw_id()?;
                let obj = self.obj(op, id)?;
                pass(
                    obj.as_function()
                        .and_then(|f| f.script.as_ref())
                        .is_some_and(|script| script.has_compiled_entry()),
                )
            }
            CacheOp::GuardFunctionHasNoJitEntry => {
                let id = reader.read_raw_id()?;
                let obj = self.obj(op, id)?;
                pass(
                    !obj.as_function()
                        .and_then(|f| f.script.as_ref())
                        .is_some_and(|script| script.has_compiled_entry()),
                )
            }
            CacheOp::GuardNotClassConstructor => {
                let id = reader.read_raw_id()?;
                let obj = self.obj(op, id)?;
                match obj.as_function() {
                    Some(fun) => pass(!fun.is_class_constructor),
                    None => Step::Fail,
                }
            }
            CacheOp::GuardArrayIsPacked => {
                let id = reader.read_raw_id()?;
                pass(self.obj(op, id)?.is_packed())
            }
            CacheOp::GuardNoDenseElements => {
                let id = reader.read_raw_id()?;
                pass(!self.obj(op, id)?.has_dense_elements())
            }
            CacheOp::GuardIndexIsNotDenseElement => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                pass(index >= 0 && obj.element(index as u32).is_none())
            }
            CacheOp::GuardIndexIsValidUpdateOrAdd => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                pass(index >= 0 && index as u32 <= obj.elements_len())
            }
            CacheOp::GuardFuseIntact => {
                let byte = reader.read_byte()?;
                let fuse = FuseIndex::from_byte(byte).ok_or(bad_field(op, reader.pos()))?;
                pass(self.realm.fuses().fuse(fuse).is_intact())
            }
            CacheOp::GuardFixedSlotIsSpecificObject
            | CacheOp::GuardDynamicSlotIsSpecificObject => {
                let id = reader.read_raw_id()?;
                let slot = cursor.read(reader.read_field_offset()?)?;
                let slot = Self::word_field(op, reader.pos(), slot)?;
                let expected = cursor.read(reader.read_field_offset()?)?;
                let expected = Self::object_field(op, reader.pos(), expected)?;
                let obj = self.obj(op, id)?;
                let location = if op == CacheOp::GuardFixedSlotIsSpecificObject {
                    SlotLocation::Fixed(slot as u16)
                } else {
                    SlotLocation::Dynamic(slot as u16)
                };
                match (obj.read_slot(location), expected) {
                    (Value::Object(actual), Some(expected)) => pass(Arc::ptr_eq(&actual, &expected)),
                    _ => Step::Fail,
                }
            }

            // ---------------- object loads ----------------
            CacheOp::LoadObject => {
                let result = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                match Self::object_field(op, reader.pos(), field)? {
                    Some(obj) => {
                        self.set(result, Value::Object(obj));
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::LoadProto => {
                let id = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                match self.obj(op, id)?.proto() {
                    Some(proto) => {
                        self.set(result, Value::Object(proto));
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::LoadEnclosingEnvironment => {
                let id = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                match self.obj(op, id)?.enclosing_environment() {
                    Some(env) => {
                        self.set(result, Value::Object(env));
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }

            // ---------------- slots and elements ----------------
            CacheOp::LoadFixedSlotResult | CacheOp::LoadDynamicSlotResult => {
                let id = reader.read_raw_id()?;
                let slot = cursor.read(reader.read_field_offset()?)?;
                let slot = Self::word_field(op, reader.pos(), slot)?;
                let location = if op == CacheOp::LoadFixedSlotResult {
                    SlotLocation::Fixed(slot as u16)
                } else {
                    SlotLocation::Dynamic(slot as u16)
                };
                self.result = Some(self.obj(op, id)?.read_slot(location));
                Step::Next
            }
            CacheOp::LoadDenseElementResult => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 {
                    return Ok(Step::Fail);
                }
                match obj.element(index as u32) {
                    Some(value) => {
                        self.result = Some(value);
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::LoadDenseElementHoleResult => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 {
                    return Ok(Step::Fail);
                }
                self.result = Some(obj.element(index as u32).unwrap_or(Value::Undefined));
                Step::Next
            }
            CacheOp::LoadDenseElementExistsResult => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 || index as u32 >= obj.elements_len() {
                    return Ok(Step::Fail);
                }
                self.result = Some(Value::Boolean(obj.element(index as u32).is_some()));
                Step::Next
            }
            CacheOp::LoadDenseElementHoleExistsResult => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 {
                    return Ok(Step::Fail);
                }
                self.result = Some(Value::Boolean(obj.element(index as u32).is_some()));
                Step::Next
            }
            CacheOp::LoadInt32ArrayLengthResult => {
                let id = reader.read_raw_id()?;
                let len = self.obj(op, id)?.elements_len();
                if len > i32::MAX as u32 {
                    return Ok(Step::Fail);
                }
                self.result = Some(Value::Int32(len as i32));
                Step::Next
            }
            CacheOp::LoadStringLengthResult => {
                let id = reader.read_raw_id()?;
                let atom = self.string(op, id)?;
                self.result = Some(Value::Int32(atom.len() as i32));
                Step::Next
            }
            CacheOp::StoreFixedSlot | CacheOp::StoreDynamicSlot => {
                let id = reader.read_raw_id()?;
                let slot = cursor.read(reader.read_field_offset()?)?;
                let slot = Self::word_field(op, reader.pos(), slot)?;
                let rhs = reader.read_raw_id()?;
                let location = if op == CacheOp::StoreFixedSlot {
                    SlotLocation::Fixed(slot as u16)
                } else {
                    SlotLocation::Dynamic(slot as u16)
                };
                self.obj(op, id)?.write_slot(location, self.val(rhs));
                Step::Next
            }
            CacheOp::AddAndStoreFixedSlot
            | CacheOp::AddAndStoreDynamicSlot
            | CacheOp::AllocateAndStoreDynamicSlot => {
                let id = reader.read_raw_id()?;
                let slot = cursor.read(reader.read_field_offset()?)?;
                let slot = Self::word_field(op, reader.pos(), slot)?;
                let rhs = reader.read_raw_id()?;
                let shape = cursor.read(reader.read_field_offset()?)?;
                let shape = Self::shape_field(op, reader.pos(), shape)?;
                if op == CacheOp::AllocateAndStoreDynamicSlot {
                    let extra = cursor.read(reader.read_field_offset()?)?;
                    Self::word_field(op, reader.pos(), extra)?;
                }
                let Some(new_shape) = shape else {
                    return Ok(Step::Fail);
                };
                let location = if op == CacheOp::AddAndStoreFixedSlot {
                    SlotLocation::Fixed(slot as u16)
                } else {
                    SlotLocation::Dynamic(slot as u16)
                };
                let obj = self.obj(op, id)?;
                obj.replace_shape(new_shape);
                obj.write_slot(location, self.val(rhs));
                Step::Next
            }
            CacheOp::StoreDenseElement => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let rhs = reader.read_raw_id()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 || obj.element(index as u32).is_none() {
                    return Ok(Step::Fail);
                }
                obj.set_element(self.heap, index as u32, self.val(rhs));
                Step::Next
            }
            CacheOp::StoreDenseElementHole => {
                let obj_id = reader.read_raw_id()?;
                let index_id = reader.read_raw_id()?;
                let rhs = reader.read_raw_id()?;
                let handle_add = reader.read_bool()?;
                let obj = self.obj(op, obj_id)?;
                let index = self.int32(op, index_id)?;
                if index < 0 {
                    return Ok(Step::Fail);
                }
                let index = index as u32;
                let len = obj.elements_len();
                if index > len || (index == len && !handle_add) {
                    return Ok(Step::Fail);
                }
                obj.set_element(self.heap, index, self.val(rhs));
                Step::Next
            }

            // ---------------- megamorphic paths ----------------
            CacheOp::MegamorphicLoadSlotResult => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let key = Self::key_field(op, reader.pos(), field)?;
                match generic_get(&self.obj(op, id)?, key) {
                    Some(value) => {
                        self.result = Some(value);
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::MegamorphicLoadSlotByValueResult => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                match generic_get(&self.obj(op, obj_id)?, &key) {
                    Some(value) => {
                        self.result = Some(value);
                        Step::Next
                    }
                    None => Step::Fail,
                }
            }
            CacheOp::MegamorphicStoreSlot => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let key = Self::key_field(op, reader.pos(), field)?.clone();
                let rhs = reader.read_raw_id()?;
                let strict = reader.read_bool()?;
                pass(match generic_set(self.heap, &self.obj(op, id)?, &key, self.val(rhs)) {
                    GenericStore::Stored => true,
                    GenericStore::Rejected => !strict,
                    GenericStore::NeedsFallback => false,
                })
            }
            CacheOp::MegamorphicSetElement => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let rhs = reader.read_raw_id()?;
                let strict = reader.read_bool()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                pass(match generic_set(self.heap, &self.obj(op, obj_id)?, &key, self.val(rhs)) {
                    GenericStore::Stored => true,
                    GenericStore::Rejected => !strict,
                    GenericStore::NeedsFallback => false,
                })
            }
            CacheOp::MegamorphicHasPropResult => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let has_own = reader.read_bool()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                self.result = Some(Value::Boolean(generic_has(&self.obj(op, obj_id)?, &key, has_own)));
                Step::Next
            }

            // ---------------- proxy forwarding ----------------
            CacheOp::ProxyGetResult => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let key = Self::key_field(op, reader.pos(), field)?;
                let obj = self.obj(op, id)?;
                let Some(proxy) = obj.as_proxy() else {
                    return Ok(Step::Fail);
                };
                self.result = Some(proxy.handler.get(&proxy.target, key));
                Step::Next
            }
            CacheOp::ProxyGetByValueResult => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                let obj = self.obj(op, obj_id)?;
                let Some(proxy) = obj.as_proxy() else {
                    return Ok(Step::Fail);
                };
                self.result = Some(proxy.handler.get(&proxy.target, &key));
                Step::Next
            }
            CacheOp::ProxySet => {
                let id = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let key = Self::key_field(op, reader.pos(), field)?.clone();
                let rhs = reader.read_raw_id()?;
                let strict = reader.read_bool()?;
                let obj = self.obj(op, id)?;
                let Some(proxy) = obj.as_proxy() else {
                    return Ok(Step::Fail);
                };
                let ok = proxy.handler.set(self.heap, &proxy.target, &key, self.val(rhs));
                pass(ok || !strict)
            }
            CacheOp::ProxySetByValue => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let rhs = reader.read_raw_id()?;
                let strict = reader.read_bool()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                let obj = self.obj(op, obj_id)?;
                let Some(proxy) = obj.as_proxy() else {
                    return Ok(Step::Fail);
                };
                let ok = proxy.handler.set(self.heap, &proxy.target, &key, self.val(rhs));
                pass(ok || !strict)
            }
            CacheOp::ProxyHasPropResult => {
                let obj_id = reader.read_raw_id()?;
                let key_id = reader.read_raw_id()?;
                let _has_own = reader.read_bool()?;
                let Some(key) = value_to_key(&self.val(key_id)) else {
                    return Ok(Step::Fail);
                };
                let obj = self.obj(op, obj_id)?;
                let Some(proxy) = obj.as_proxy() else {
                    return Ok(Step::Fail);
                };
                self.result = Some(Value::Boolean(proxy.handler.has(&proxy.target, &key)));
                Step::Next
            }

            // ---------------- calls ----------------
            CacheOp::CallNativeFunction => {
                let id = reader.read_raw_id()?;
                let flags = reader.read_byte()?;
                let argc = reader.read_byte()?;
                let flags = CallFlags::from_byte(flags).ok_or(bad_field(op, reader.pos()))?;
                let callee = self.obj(op, id)?;
                let Some(native) = callee.as_function().and_then(|f| f.native) else {
                    return Ok(Step::Fail);
                };
                let Some((this, args)) = call_layout(flags, argc, self.inputs) else {
                    return Ok(Step::Fail);
                };
                self.result = Some(native(&NativeCallArgs { this, args: &args }));
                Step::Next
            }
            CacheOp::CallScriptedFunction => {
                let id = reader.read_raw_id()?;
                let flags = reader.read_byte()?;
                let argc = reader.read_byte()?;
                let flags = CallFlags::from_byte(flags).ok_or(bad_field(op, reader.pos()))?;
                let callee = self.obj(op, id)?;
                let Some(script) = callee.as_function().and_then(|f| f.script.clone()) else {
                    return Ok(Step::Fail);
                };
                let Some((this, args)) = call_layout(flags, argc, self.inputs) else {
                    return Ok(Step::Fail);
                };
                // Constructing calls create `this` inside the callee.
                let this = if flags.constructing { Value::Undefined } else { this };
                Step::Done(EvalOutcome::EnterScript { script, this, args })
            }
            CacheOp::CallBoundScriptedFunction => {
                let id = reader.read_raw_id()?;
                let flags = reader.read_byte()?;
                let argc = reader.read_byte()?;
                let num_bound = reader.read_byte()?;
                let flags = CallFlags::from_byte(flags).ok_or(bad_field(op, reader.pos()))?;
                let callee = self.obj(op, id)?;
                let Some(bound) = callee.as_bound_function() else {
                    return Ok(Step::Fail);
                };
                if bound.bound_args.len() != usize::from(num_bound) {
                    return Ok(Step::Fail);
                }
                let Some(script) = bound.target.as_function().and_then(|f| f.script.clone()) else {
                    return Ok(Step::Fail);
                };
                let Some((_, call_args)) = call_layout(flags, argc, self.inputs) else {
                    return Ok(Step::Fail);
                };
                let mut args = bound.bound_args.clone();
                args.extend(call_args);
                Step::Done(EvalOutcome::EnterScript {
                    script,
                    this: bound.bound_this.clone(),
                    args,
                })
            }
            CacheOp::CallNativeGetterResult => {
                let receiver = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let getter = Self::object_field(op, reader.pos(), field)?;
                let _same_realm = reader.read_bool()?;
                let Some(native) = getter.as_ref().and_then(|g| g.as_function()).and_then(|f| f.native)
                else {
                    return Ok(Step::Fail);
                };
                self.result = Some(native(&NativeCallArgs { this: self.val(receiver), args: &[] }));
                Step::Next
            }
            CacheOp::CallScriptedGetterResult => {
                let receiver = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let getter = Self::object_field(op, reader.pos(), field)?;
                let _same_realm = reader.read_bool()?;
                let Some(script) =
                    getter.as_ref().and_then(|g| g.as_function()).and_then(|f| f.script.clone())
                else {
                    return Ok(Step::Fail);
                };
                Step::Done(EvalOutcome::EnterScript {
                    script,
                    this: self.val(receiver),
                    args: Vec::new(),
                })
            }
            CacheOp::CallNativeSetter => {
                let receiver = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let setter = Self::object_field(op, reader.pos(), field)?;
                let rhs = reader.read_raw_id()?;
                let _same_realm = reader.read_bool()?;
                let this = Value::Object(self.obj(op, receiver)?);
                let Some(native) = setter.as_ref().and_then(|s| s.as_function()).and_then(|f| f.native)
                else {
                    return Ok(Step::Fail);
                };
                native(&NativeCallArgs { this, args: &[self.val(rhs)] });
                Step::Next
            }
            CacheOp::CallScriptedSetter => {
                let receiver = reader.read_raw_id()?;
                let field = cursor.read(reader.read_field_offset()?)?;
                let setter = Self::object_field(op, reader.pos(), field)?;
                let rhs = reader.read_raw_id()?;
                let _same_realm = reader.read_bool()?;
                let this = Value::Object(self.obj(op, receiver)?);
                let Some(script) =
                    setter.as_ref().and_then(|s| s.as_function()).and_then(|f| f.script.clone())
                else {
                    return Ok(Step::Fail);
                };
                Step::Done(EvalOutcome::EnterScript { script, this, args: vec![self.val(rhs)] })
            }
            CacheOp::MetaScriptedThisShape => {
                let field = cursor.read(reader.read_field_offset()?)?;
                Self::shape_field(op, reader.pos(), field)?;
                Step::Next
            }

            // ---------------- results ----------------
            CacheOp::LoadUndefinedResult => {
                self.result = Some(Value::Undefined);
                Step::Next
            }
            CacheOp::LoadBooleanResult => {
                let value = reader.read_bool()?;
                self.result = Some(Value::Boolean(value));
                Step::Next
            }
            CacheOp::LoadInt32Result => {
                let id = reader.read_raw_id()?;
                self.result = Some(Value::Int32(self.int32(op, id)?));
                Step::Next
            }
            CacheOp::LoadDoubleResult => {
                let id = reader.read_raw_id()?;
                self.result = Some(Value::number(self.number(op, id)?));
                Step::Next
            }
            CacheOp::LoadStringResult => {
                let id = reader.read_raw_id()?;
                self.result = Some(Value::String(self.string(op, id)?));
                Step::Next
            }
            CacheOp::LoadSymbolResult => {
                let id = reader.read_raw_id()?;
                match self.val(id) {
                    sym @ Value::Symbol(_) => {
                        self.result = Some(sym);
                        Step::Next
                    }
                    _ => return Err(self.mismatch(op, id, "symbol")),
                }
            }
            CacheOp::LoadBigIntResult => {
                let id = reader.read_raw_id()?;
                self.result = Some(Value::BigInt(self.bigint(op, id)?));
                Step::Next
            }
            CacheOp::LoadObjectResult => {
                let id = reader.read_raw_id()?;
                self.result = Some(Value::Object(self.obj(op, id)?));
                Step::Next
            }
            CacheOp::LoadValueResult => {
                let id = reader.read_raw_id()?;
                self.result = Some(self.val(id));
                Step::Next
            }
            CacheOp::LoadConstantStringResult => {
                let field = cursor.read(reader.read_field_offset()?)?;
                let atom = Self::atom_field(op, reader.pos(), field)?;
                self.result = Some(Value::String(atom.clone()));
                Step::Next
            }

            // ---------------- comparisons ----------------
            CacheOp::CompareInt32Result => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs = self.int32(op, reader.read_raw_id()?)?;
                let rhs = self.int32(op, reader.read_raw_id()?)?;
                self.result = Some(Value::Boolean(cmp.apply_to_f64(f64::from(lhs), f64::from(rhs))));
                Step::Next
            }
            CacheOp::CompareDoubleResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs = self.number(op, reader.read_raw_id()?)?;
                let rhs = self.number(op, reader.read_raw_id()?)?;
                self.result = Some(Value::Boolean(cmp.apply_to_f64(lhs, rhs)));
                Step::Next
            }
            CacheOp::CompareStringResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs = self.string(op, reader.read_raw_id()?)?;
                let rhs = self.string(op, reader.read_raw_id()?)?;
                self.result = Some(Value::Boolean(cmp.apply_to_ordering(lhs.as_str().cmp(rhs.as_str()))));
                Step::Next
            }
            CacheOp::CompareObjectResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs = self.obj(op, reader.read_raw_id()?)?;
                let rhs = self.obj(op, reader.read_raw_id()?)?;
                self.result = Some(Value::Boolean(Arc::ptr_eq(&lhs, &rhs) != cmp.is_negated()));
                Step::Next
            }
            CacheOp::CompareSymbolResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs_id = reader.read_raw_id()?;
                let rhs_id = reader.read_raw_id()?;
                let (Value::Symbol(lhs), Value::Symbol(rhs)) = (self.val(lhs_id), self.val(rhs_id))
                else {
                    return Err(self.mismatch(op, lhs_id, "symbol"));
                };
                self.result = Some(Value::Boolean((lhs.id() == rhs.id()) != cmp.is_negated()));
                Step::Next
            }
            CacheOp::CompareBigIntResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let lhs = self.bigint(op, reader.read_raw_id()?)?;
                let rhs = self.bigint(op, reader.read_raw_id()?)?;
                self.result = Some(Value::Boolean(cmp.apply_to_ordering(lhs.cmp(&rhs))));
                Step::Next
            }
            CacheOp::CompareNullUndefinedResult => {
                let cmp = CompareOp::from_byte(reader.read_byte()?).ok_or(bad_field(op, reader.pos()))?;
                let is_undefined = reader.read_bool()?;
                let input = self.val(reader.read_raw_id()?);
                let matches = if cmp.is_strict() {
                    input.tag() == if is_undefined { ValueTag::Undefined } else { ValueTag::Null }
                } else {
                    input.is_null_or_undefined()
                };
                self.result = Some(Value::Boolean(matches != cmp.is_negated()));
                Step::Next
            }

            // ---------------- int32 arithmetic ----------------
            CacheOp::Int32AddResult => self.int32_binop(op, reader, i32::checked_add)?,
            CacheOp::Int32SubResult => self.int32_binop(op, reader, i32::checked_sub)?,
            CacheOp::Int32MulResult => self.int32_binop(op, reader, |lhs, rhs| {
                let product = lhs.checked_mul(rhs)?;
                // A zero product with a negative operand is -0, which
                // int32 cannot represent.
                if product == 0 && (lhs < 0 || rhs < 0) {
                    return None;
                }
                Some(product)
            })?,
            CacheOp::Int32DivResult => self.int32_binop(op, reader, |lhs, rhs| {
                if rhs == 0 || lhs % rhs != 0 || (lhs == 0 && rhs < 0) {
                    return None;
                }
                lhs.checked_div(rhs)
            })?,
            CacheOp::Int32ModResult => self.int32_binop(op, reader, |lhs, rhs| {
                if rhs == 0 {
                    return None;
                }
                let rem = lhs.checked_rem(rhs)?;
                // -0 result.
                if rem == 0 && lhs < 0 {
                    return None;
                }
                Some(rem)
            })?,
            CacheOp::Int32BitAndResult => self.int32_binop(op, reader, |lhs, rhs| Some(lhs & rhs))?,
            CacheOp::Int32BitOrResult => self.int32_binop(op, reader, |lhs, rhs| Some(lhs | rhs))?,
            CacheOp::Int32BitXorResult => self.int32_binop(op, reader, |lhs, rhs| Some(lhs ^ rhs))?,
            CacheOp::Int32LeftShiftResult => {
                self.int32_binop(op, reader, |lhs, rhs| Some(lhs.wrapping_shl(rhs as u32 & 31)))?
            }
            CacheOp::Int32RightShiftResult => {
                self.int32_binop(op, reader, |lhs, rhs| Some(lhs.wrapping_shr(rhs as u32 & 31)))?
            }
            CacheOp::Int32NegationResult => self.int32_unop(op, reader, |value| {
                // Negating zero gives -0 and negating i32::MIN overflows.
                if value == 0 { None } else { value.checked_neg() }
            })?,
            CacheOp::Int32IncResult => self.int32_unop(op, reader, |value| value.checked_add(1))?,
            CacheOp::Int32DecResult => self.int32_unop(op, reader, |value| value.checked_sub(1))?,
            CacheOp::Int32NotResult => self.int32_unop(op, reader, |value| Some(!value))?,

            // ---------------- double arithmetic ----------------
            CacheOp::DoubleAddResult => self.double_binop(op, reader, |lhs, rhs| lhs + rhs)?,
            CacheOp::DoubleSubResult => self.double_binop(op, reader, |lhs, rhs| lhs - rhs)?,
            CacheOp::DoubleMulResult => self.double_binop(op, reader, |lhs, rhs| lhs * rhs)?,
            CacheOp::DoubleDivResult => self.double_binop(op, reader, |lhs, rhs| lhs / rhs)?,
            CacheOp::DoubleModResult => self.double_binop(op, reader, |lhs, rhs| lhs % rhs)?,
            CacheOp::DoubleNegationResult => self.double_unop(op, reader, |value| -value)?,
            CacheOp::DoubleIncResult => self.double_unop(op, reader, |value| value + 1.0)?,
            CacheOp::DoubleDecResult => self.double_unop(op, reader, |value| value - 1.0)?,
            CacheOp::BigIntAddResult => {
                let lhs = self.bigint(op, reader.read_raw_id()?)?;
                let rhs = self.bigint(op, reader.read_raw_id()?)?;
                self.result = Some(Value::BigInt(Arc::new(&*lhs + &*rhs)));
                Step::Next
            }
            CacheOp::CallStringConcatResult => {
                let lhs = self.string(op, reader.read_raw_id()?)?;
                let rhs = self.string(op, reader.read_raw_id()?)?;
                let concat = format!("{}{}", lhs.as_str(), rhs.as_str());
                self.result = Some(Value::String(self.realm.intern(&concat)));
                Step::Next
            }
            CacheOp::CallInt32ToString => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                let rendered = self.int32(op, input)?.to_string();
                let atom = self.realm.intern(&rendered);
                self.set(result, Value::String(atom));
                Step::Next
            }
            CacheOp::CallNumberToString => {
                let input = reader.read_raw_id()?;
                let result = reader.read_raw_id()?;
                let rendered = number_to_string(self.number(op, input)?);
                let atom = self.realm.intern(&rendered);
                self.set(result, Value::String(atom));
                Step::Next
            }

            // ---------------- type queries ----------------
            CacheOp::LoadTypeOfObjectResult => {
                let id = reader.read_raw_id()?;
                let obj = self.obj(op, id)?;
                self.result = Some(Value::String(self.realm.typeof_atom(&Value::Object(obj))));
                Step::Next
            }
            CacheOp::LoadInstanceOfObjectResult => {
                let lhs = reader.read_raw_id()?;
                let proto = self.obj(op, reader.read_raw_id()?)?;
                let mut found = false;
                if let Value::Object(obj) = self.val(lhs) {
                    let mut current = obj.proto();
                    while let Some(link) = current {
                        if Arc::ptr_eq(&link, &proto) {
                            found = true;
                            break;
                        }
                        current = link.proto();
                    }
                }
                self.result = Some(Value::Boolean(found));
                Step::Next
            }

            // ---------------- allocation ----------------
            CacheOp::NewPlainObjectResult => {
                let shape = cursor.read(reader.read_field_offset()?)?;
                let shape = Self::shape_field(op, reader.pos(), shape)?;
                let site = cursor.read(reader.read_field_offset()?)?;
                let site = site.alloc_site_value().ok_or(bad_field(op, reader.pos()))?;
                let Some(shape) = shape else {
                    return Ok(Step::Fail);
                };
                site.note_allocation();
                self.result = Some(Value::Object(JsObject::with_shape(shape, ObjectKind::Plain)));
                Step::Next
            }
            CacheOp::NewArrayObjectResult => {
                let _length = reader.read_uint32()?;
                let shape = cursor.read(reader.read_field_offset()?)?;
                let shape = Self::shape_field(op, reader.pos(), shape)?;
                let site = cursor.read(reader.read_field_offset()?)?;
                let site = site.alloc_site_value().ok_or(bad_field(op, reader.pos()))?;
                let Some(shape) = shape else {
                    return Ok(Step::Fail);
                };
                site.note_allocation();
                self.result = Some(Value::Object(JsObject::with_shape(shape, ObjectKind::Array)));
                Step::Next
            }
            CacheOp::NewArrayIteratorResult => {
                let id = reader.read_raw_id()?;
                let shape = cursor.read(reader.read_field_offset()?)?;
                let shape = Self::shape_field(op, reader.pos(), shape)?;
                let site = cursor.read(reader.read_field_offset()?)?;
                let site = site.alloc_site_value().ok_or(bad_field(op, reader.pos()))?;
                let target = self.obj(op, id)?;
                let Some(shape) = shape else {
                    return Ok(Step::Fail);
                };
                site.note_allocation();
                let iterator = JsObject::with_shape(
                    shape,
                    ObjectKind::ArrayIterator { target, next_index: AtomicU32::new(0) },
                );
                self.result = Some(Value::Object(iterator));
                Step::Next
            }

            // ---------------- terminator ----------------
            CacheOp::ReturnFromIC => {
                Step::Done(EvalOutcome::Returned(self.result.take().unwrap_or(Value::Undefined)))
            }
        })
    }

    fn int32_binop(
        &mut self,
        op: CacheOp,
        reader: &mut CacheIrReader<'_>,
        apply: impl FnOnce(i32, i32) -> Option<i32>,
    ) -> CacheIrResult<Step> {
        let lhs = self.int32(op, reader.read_raw_id()?)?;
        let rhs = self.int32(op, reader.read_raw_id()?)?;
        Ok(match apply(lhs, rhs) {
            Some(value) => {
                self.result = Some(Value::Int32(value));
                Step::Next
            }
            None => Step::Fail,
        })
    }

    fn int32_unop(
        &mut self,
        op: CacheOp,
        reader: &mut CacheIrReader<'_>,
        apply: impl FnOnce(i32) -> Option<i32>,
    ) -> CacheIrResult<Step> {
        let value = self.int32(op, reader.read_raw_id()?)?;
        Ok(match apply(value) {
            Some(value) => {
                self.result = Some(Value::Int32(value));
                Step::Next
            }
            None => Step::Fail,
        })
    }

    fn double_binop(
        &mut self,
        op: CacheOp,
        reader: &mut CacheIrReader<'_>,
        apply: impl FnOnce(f64, f64) -> f64,
    ) -> CacheIrResult<Step> {
        let lhs = self.number(op, reader.read_raw_id()?)?;
        let rhs = self.number(op, reader.read_raw_id()?)?;
        self.result = Some(Value::number(apply(lhs, rhs)));
        Ok(Step::Next)
    }

    fn double_unop(
        &mut self,
        op: CacheOp,
        reader: &mut CacheIrReader<'_>,
        apply: impl FnOnce(f64) -> f64,
    ) -> CacheIrResult<Step> {
        let value = self.number(op, reader.read_raw_id()?)?;
        self.result = Some(Value::number(apply(value)));
        Ok(Step::Next)
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{CacheKind, build_stub};
    use ferret_cacheir::writer::CacheIrWriter;
    use ferret_object::shape::PropertyAttributes;

    fn run(
        kind: CacheKind,
        writer: CacheIrWriter,
        realm: &Realm,
        heap: &Heap,
        inputs: &[Value],
    ) -> StubRun {
        let stream = writer.finish().expect("stream should finish");
        let stub = build_stub(kind, "test", stream, heap);
        evaluate_stub(stub.info(), stub.data(), realm, heap, inputs).expect("evaluation")
    }

    fn returned(run: StubRun) -> Value {
        match run {
            StubRun::Finished(EvalOutcome::Returned(value)) => value,
            other => panic!("expected a returned value, got {other:?}"),
        }
    }

    #[test]
    fn test_megamorphic_store_runs_inherited_native_setter() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static SETTER_CALLS: AtomicUsize = AtomicUsize::new(0);
        fn record(_args: &NativeCallArgs<'_>) -> Value {
            SETTER_CALLS.fetch_add(1, Ordering::Relaxed);
            Value::Undefined
        }

        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let key = PropertyKey::Atom(realm.intern("x"));

        let proto = realm.new_plain_object();
        let setter = realm.new_native_function(Some(realm.intern("set x")), 1, record);
        proto.define_accessor_property(
            &heap,
            key.clone(),
            None,
            Some(setter),
            PropertyAttributes::default_data(),
        );
        let receiver = realm.new_plain_object();
        receiver.set_prototype(&heap, Some(Arc::clone(&proto)));

        let mut writer = CacheIrWriter::new();
        let obj_input = writer.input_value();
        let rhs = writer.input_value();
        let obj = writer.guard_to_object(obj_input);
        writer.megamorphic_store_slot(obj, &key, rhs, false);
        writer.return_from_ic();

        let outcome = run(
            CacheKind::SetProp,
            writer,
            &realm,
            &heap,
            &[Value::Object(Arc::clone(&receiver)), Value::Int32(5)],
        );
        assert!(matches!(outcome, StubRun::Finished(_)));
        assert_eq!(SETTER_CALLS.load(Ordering::Relaxed), 1);
        // The inherited accessor must not be shadowed by an own define.
        assert!(receiver.shape().property(&key).is_none());
    }

    #[test]
    fn test_megamorphic_store_fails_over_on_scripted_setter() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let key = PropertyKey::Atom(realm.intern("y"));

        let proto = realm.new_plain_object();
        let setter = realm.new_scripted_function(Script::new(Some(realm.intern("s"))), 1);
        proto.define_accessor_property(
            &heap,
            key.clone(),
            None,
            Some(setter),
            PropertyAttributes::default_data(),
        );
        let receiver = realm.new_plain_object();
        receiver.set_prototype(&heap, Some(Arc::clone(&proto)));

        let mut writer = CacheIrWriter::new();
        let obj_input = writer.input_value();
        let rhs = writer.input_value();
        let obj = writer.guard_to_object(obj_input);
        // Non-strict: a scripted setter still forces the fallback, it is
        // not a swallowable rejection.
        writer.megamorphic_store_slot(obj, &key, rhs, false);
        writer.return_from_ic();

        let outcome = run(
            CacheKind::SetProp,
            writer,
            &realm,
            &heap,
            &[Value::Object(Arc::clone(&receiver)), Value::Int32(5)],
        );
        assert!(matches!(outcome, StubRun::GuardFailed));
        assert!(receiver.shape().property(&key).is_none());
    }

    #[test]
    fn test_guarded_slot_load() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let obj = realm.new_plain_object();
        let key = PropertyKey::Atom(realm.intern("x"));
        obj.define_data_property(&heap, key.clone(), Value::Int32(7), PropertyAttributes::default_data());
        let info = obj.shape().property(&key).expect("property");
        let SlotLocation::Fixed(slot) = info.slot else { panic!("expected fixed slot") };

        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let guarded = writer.guard_to_object(receiver);
        writer.guard_shape(guarded, &obj.shape());
        writer.load_fixed_slot_result(guarded, u64::from(slot));
        writer.return_from_ic();

        let stream = writer.finish().expect("stream should finish");
        let stub = build_stub(CacheKind::GetProp, "test", stream, &heap);

        let hit = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &[Value::Object(Arc::clone(&obj))])
            .expect("evaluation");
        assert!(returned(hit).same_value(&Value::Int32(7)));

        // Different shape: guard fails, no result.
        let other = realm.new_plain_object();
        let miss = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &[Value::Object(other)])
            .expect("evaluation");
        assert!(matches!(miss, StubRun::GuardFailed));

        // Non-object input fails the narrowing guard.
        let miss = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &[Value::Int32(3)])
            .expect("evaluation");
        assert!(matches!(miss, StubRun::GuardFailed));
    }

    #[test]
    fn test_int32_overflow_fails_over() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);

        let build = |heap: &Heap| {
            let mut writer = CacheIrWriter::new();
            let lhs = writer.input_value();
            let rhs = writer.input_value();
            let lhs = writer.guard_to_int32(lhs);
            let rhs = writer.guard_to_int32(rhs);
            writer.int32_add_result(lhs, rhs);
            writer.return_from_ic();
            let stream = writer.finish().expect("stream should finish");
            build_stub(CacheKind::BinaryArith, "test", stream, heap)
        };
        let stub = build(&heap);

        let ok = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &[Value::Int32(2), Value::Int32(3)])
            .expect("evaluation");
        assert!(returned(ok).same_value(&Value::Int32(5)));

        let overflow = evaluate_stub(
            stub.info(),
            stub.data(),
            &realm,
            &heap,
            &[Value::Int32(i32::MAX), Value::Int32(1)],
        )
        .expect("evaluation");
        assert!(matches!(overflow, StubRun::GuardFailed));
    }

    #[test]
    fn test_negative_zero_cases_fail_over() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);

        let mut writer = CacheIrWriter::new();
        let lhs = writer.input_value();
        let rhs = writer.input_value();
        let lhs = writer.guard_to_int32(lhs);
        let rhs = writer.guard_to_int32(rhs);
        writer.int32_mul_result(lhs, rhs);
        writer.return_from_ic();
        let stub = build_stub(
            CacheKind::BinaryArith,
            "test",
            writer.finish().expect("stream should finish"),
            &heap,
        );

        let neg_zero = evaluate_stub(
            stub.info(),
            stub.data(),
            &realm,
            &heap,
            &[Value::Int32(-3), Value::Int32(0)],
        )
        .expect("evaluation");
        assert!(matches!(neg_zero, StubRun::GuardFailed));
    }

    #[test]
    fn test_scripted_call_transfers_control() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let script = Script::new(Some(realm.intern("f")));
        script.set_compiled_entry();
        let callee = realm.new_scripted_function(Arc::clone(&script), 1);

        let mut writer = CacheIrWriter::new();
        let callee_input = writer.input_value();
        let _this = writer.input_value();
        let _arg = writer.input_value();
        let callee_obj = writer.guard_to_object(callee_input);
        let nargs = callee.as_function().expect("function").nargs_and_flags_word();
        writer.guard_specific_function(callee_obj, &callee, nargs);
        writer.call_scripted_function(callee_obj, CallFlags::standard(), 1);
        writer.return_from_ic();
        let stub = build_stub(
            CacheKind::Call,
            "test",
            writer.finish().expect("stream should finish"),
            &heap,
        );

        let inputs = [Value::Object(Arc::clone(&callee)), Value::Undefined, Value::Int32(9)];
        let run = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &inputs).expect("evaluation");
        match run {
            StubRun::Finished(EvalOutcome::EnterScript { script: entered, args, .. }) => {
                assert_eq!(entered.id(), script.id());
                assert_eq!(args.len(), 1);
                assert!(args[0].same_value(&Value::Int32(9)));
            }
            other => panic!("expected script entry, got {other:?}"),
        }
    }

    #[test]
    fn test_swept_weak_shape_fails_guard() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let obj = realm.new_plain_object();

        let stub = {
            let doomed = obj.shape().reshaped();
            let mut writer = CacheIrWriter::new();
            let receiver = writer.input_value();
            let guarded = writer.guard_to_object(receiver);
            writer.guard_shape(guarded, &doomed);
            writer.load_undefined_result();
            writer.return_from_ic();
            build_stub(
                CacheKind::GetProp,
                "test",
                writer.finish().expect("stream should finish"),
                &heap,
            )
            // `doomed` drops here; the weak field clears.
        };

        assert!(stub.data().any_cleared());
        let run = evaluate_stub(stub.info(), stub.data(), &realm, &heap, &[Value::Object(obj)])
            .expect("evaluation");
        assert!(matches!(run, StubRun::GuardFailed));
    }
}
