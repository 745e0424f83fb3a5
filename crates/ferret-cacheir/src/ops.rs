//! The cache IR instruction set.
//!
//! One macro invocation defines every op together with its argument
//! schema, transpile eligibility and health cost. The writer, reader,
//! cloner, verifier and evaluator all derive their per-op knowledge from
//! this table, so adding an op in one place keeps every consumer in step.
//!
//! Encoding: one opcode byte, then the arguments in schema order. Operand
//! ids are two little-endian bytes, byte immediates one byte, 32-bit
//! immediates four little-endian bytes, stub-field references one byte
//! holding the field's word offset.

use crate::operand::OperandKind;

// ==================== Argument schema ====================

/// Wire type of one instruction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// Value operand id.
    ValId,
    /// Object operand id.
    ObjId,
    /// Int32 operand id.
    Int32Id,
    /// Number operand id.
    NumberId,
    /// String operand id.
    StringId,
    /// Symbol operand id.
    SymbolId,
    /// Boolean operand id.
    BooleanId,
    /// BigInt operand id.
    BigIntId,
    /// IntPtr operand id.
    IntPtrId,
    /// One-byte immediate (bools, counts, enum selectors).
    Byte,
    /// Four-byte signed immediate.
    Int32Imm,
    /// Four-byte unsigned immediate.
    UInt32Imm,
    /// Stub-field reference (word offset).
    FieldRef,
}

impl ArgType {
    /// Encoded size in bytes.
    pub const fn encoded_len(self) -> usize {
        match self {
            ArgType::ValId
            | ArgType::ObjId
            | ArgType::Int32Id
            | ArgType::NumberId
            | ArgType::StringId
            | ArgType::SymbolId
            | ArgType::BooleanId
            | ArgType::BigIntId
            | ArgType::IntPtrId => 2,
            ArgType::Byte | ArgType::FieldRef => 1,
            ArgType::Int32Imm | ArgType::UInt32Imm => 4,
        }
    }

    /// The operand kind this argument references, for id arguments.
    pub const fn operand_kind(self) -> Option<OperandKind> {
        match self {
            ArgType::ValId => Some(OperandKind::Val),
            ArgType::ObjId => Some(OperandKind::Obj),
            ArgType::Int32Id => Some(OperandKind::Int32),
            ArgType::NumberId => Some(OperandKind::Number),
            ArgType::StringId => Some(OperandKind::String),
            ArgType::SymbolId => Some(OperandKind::Symbol),
            ArgType::BooleanId => Some(OperandKind::Boolean),
            ArgType::BigIntId => Some(OperandKind::BigInt),
            ArgType::IntPtrId => Some(OperandKind::IntPtr),
            _ => None,
        }
    }

    /// True for operand-id arguments.
    pub const fn is_operand_id(self) -> bool {
        self.operand_kind().is_some()
    }
}

/// Name and wire type of one schema argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgInfo {
    /// Argument name as spelled in the schema.
    pub name: &'static str,
    /// Wire type.
    pub ty: ArgType,
}

impl ArgInfo {
    /// True for arguments that define a fresh operand id; the schema
    /// names these `result`. Every other id argument is a use.
    pub fn defines_operand(&self) -> bool {
        self.ty.is_operand_id() && self.name == "result"
    }
}

// ==================== Op table ====================

macro_rules! define_cache_ops {
    (
        $(
            $(#[doc = $doc:expr])*
            $name:ident {
                args: [$($an:ident : $at:ident),* $(,)?],
                transpile: $transpile:literal,
                cost: $cost:literal
            }
        ),+ $(,)?
    ) => {
        /// Every operation in the cache IR instruction set, in encoding
        /// order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum CacheOp {
            $(
                $(#[doc = $doc])*
                $name,
            )+
        }

        impl CacheOp {
            /// All ops in discriminant order; `ALL[op as usize] == op`.
            pub const ALL: &'static [CacheOp] = &[$(CacheOp::$name),+];

            /// Number of defined ops.
            pub const COUNT: usize = Self::ALL.len();

            /// Decode an opcode byte.
            #[inline]
            pub fn from_byte(byte: u8) -> Option<Self> {
                Self::ALL.get(byte as usize).copied()
            }

            /// The op's schema name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)+
                }
            }

            /// Argument schema in encoding order.
            pub const fn args(self) -> &'static [ArgInfo] {
                match self {
                    $(Self::$name => &[
                        $(ArgInfo { name: stringify!($an), ty: ArgType::$at },)*
                    ],)+
                }
            }

            /// Whether the optimizing tier may transpile this op.
            pub const fn is_transpilable(self) -> bool {
                match self {
                    $(Self::$name => $transpile,)+
                }
            }

            /// Relative cost used by cache-health scoring.
            pub const fn health_cost(self) -> u32 {
                match self {
                    $(Self::$name => $cost,)+
                }
            }
        }
    };
}

impl CacheOp {
    /// Encoded byte length of the op's arguments (opcode byte excluded).
    pub fn encoded_args_len(self) -> usize {
        self.args().iter().map(|arg| arg.ty.encoded_len()).sum()
    }

    /// True for the stream terminator.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == CacheOp::ReturnFromIC
    }
}

define_cache_ops! {
    // ---------------------------------------------------------------------------
    // Value-narrowing guards. These retype their input in place: the writer
    // hands back the same numeric id at a narrower type.
    // ---------------------------------------------------------------------------
    /// Guard the value is an object.
    GuardToObject { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is a string.
    GuardToString { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is a symbol.
    GuardToSymbol { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is a big integer.
    GuardToBigInt { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is a boolean.
    GuardToBoolean { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is an int32.
    GuardToInt32 { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is an int32 or double.
    GuardToNumber { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is `null`.
    GuardIsNull { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is `undefined`.
    GuardIsUndefined { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value is `null` or `undefined`.
    GuardIsNullOrUndefined { args: [input: ValId], transpile: true, cost: 1 },
    /// Guard the value's tag equals a non-double tag immediate.
    GuardNonDoubleType { args: [input: ValId, expected_tag: Byte], transpile: true, cost: 1 },

    // ---------------------------------------------------------------------------
    // Coercion guards. These define a fresh output operand.
    // ---------------------------------------------------------------------------
    /// Guard the value is an int32, or a double holding an exact int32,
    /// usable as an element index.
    GuardToInt32Index { args: [input: ValId, result: Int32Id], transpile: true, cost: 1 },
    /// Guard the value is a boolean and produce it as 0 or 1.
    GuardBooleanToInt32 { args: [input: ValId, result: Int32Id], transpile: true, cost: 1 },
    /// Convert a string to a number (always succeeds; garbage becomes NaN).
    GuardStringToNumber { args: [input: StringId, result: NumberId], transpile: true, cost: 2 },
    /// Guard a string spells a canonical int32 and produce it.
    GuardStringToInt32 { args: [input: StringId, result: Int32Id], transpile: true, cost: 2 },
    /// Widen an int32 to a pointer-sized index.
    Int32ToIntPtr { args: [input: Int32Id, result: IntPtrId], transpile: true, cost: 1 },

    // ---------------------------------------------------------------------------
    // Object guards.
    // ---------------------------------------------------------------------------
    /// Guard the object's shape identity. The field is weak.
    GuardShape { args: [obj: ObjId, shape: FieldRef], transpile: true, cost: 1 },
    /// Guard the object's prototype identity. The field is weak.
    GuardProto { args: [obj: ObjId, proto: FieldRef], transpile: true, cost: 1 },
    /// Guard the object has a null prototype.
    GuardNullProto { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard the object's class kind.
    GuardClass { args: [obj: ObjId, class_kind: Byte], transpile: true, cost: 1 },
    /// Guard the object is backed by ordinary native storage.
    GuardIsNativeObject { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard the object is a proxy.
    GuardIsProxy { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard the object is not a proxy.
    GuardIsNotProxy { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard the object is extensible.
    GuardIsExtensible { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard object identity against a weak field.
    GuardSpecificObject { args: [obj: ObjId, expected: FieldRef], transpile: true, cost: 1 },
    /// Guard function identity. Carries the callee's packed arity word for
    /// downstream compilers.
    GuardSpecificFunction {
        args: [fun: ObjId, expected: FieldRef, nargs_and_flags: FieldRef],
        transpile: true,
        cost: 1
    },
    /// Guard a function's script identity, matching every clone of one
    /// source function.
    GuardFunctionScript {
        args: [fun: ObjId, expected: FieldRef, nargs_and_flags: FieldRef],
        transpile: true,
        cost: 1
    },
    /// Guard string identity against an interned atom field.
    GuardSpecificAtom { args: [str: StringId, expected: FieldRef], transpile: true, cost: 1 },
    /// Guard symbol identity.
    GuardSpecificSymbol { args: [sym: SymbolId, expected: FieldRef], transpile: true, cost: 1 },
    /// Guard an int32 operand equals an immediate.
    GuardSpecificInt32 { args: [num: Int32Id, expected: Int32Imm], transpile: true, cost: 1 },
    /// Guard the function has a compiled entry point.
    GuardFunctionHasJitEntry { args: [fun: ObjId], transpile: true, cost: 1 },
    /// Guard the function has no compiled entry point.
    GuardFunctionHasNoJitEntry { args: [fun: ObjId], transpile: true, cost: 1 },
    /// Guard the function is not a class constructor.
    GuardNotClassConstructor { args: [fun: ObjId], transpile: true, cost: 1 },
    /// Guard the array's dense elements have no holes.
    GuardArrayIsPacked { args: [array: ObjId], transpile: true, cost: 2 },
    /// Guard the object has no dense elements at all.
    GuardNoDenseElements { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Guard `index` does not hit an existing dense element.
    GuardIndexIsNotDenseElement {
        args: [obj: ObjId, index: Int32Id],
        transpile: true,
        cost: 2
    },
    /// Guard `index` updates an existing element or appends right at the
    /// dense length.
    GuardIndexIsValidUpdateOrAdd {
        args: [obj: ObjId, index: Int32Id],
        transpile: true,
        cost: 2
    },
    /// Guard a realm fuse is still intact.
    GuardFuseIntact { args: [fuse_index: Byte], transpile: true, cost: 1 },
    /// Guard a fixed slot holds a specific object (accessor identity).
    GuardFixedSlotIsSpecificObject {
        args: [obj: ObjId, offset: FieldRef, expected: FieldRef],
        transpile: true,
        cost: 2
    },
    /// Guard a dynamic slot holds a specific object.
    GuardDynamicSlotIsSpecificObject {
        args: [obj: ObjId, offset: FieldRef, expected: FieldRef],
        transpile: true,
        cost: 2
    },

    // ---------------------------------------------------------------------------
    // Object loads.
    // ---------------------------------------------------------------------------
    /// Materialize a constant object from an owning field.
    LoadObject { args: [result: ObjId, obj: FieldRef], transpile: true, cost: 1 },
    /// Load the object's prototype; fails on a null prototype.
    LoadProto { args: [obj: ObjId, result: ObjId], transpile: true, cost: 1 },
    /// Load an environment's enclosing scope.
    LoadEnclosingEnvironment { args: [obj: ObjId, result: ObjId], transpile: true, cost: 1 },

    // ---------------------------------------------------------------------------
    // Slot and element accesses.
    // ---------------------------------------------------------------------------
    /// Return a fixed slot. The slot index rides in a raw-word field so
    /// stubs differing only in offset share code.
    LoadFixedSlotResult { args: [obj: ObjId, offset: FieldRef], transpile: true, cost: 1 },
    /// Return a dynamic slot.
    LoadDynamicSlotResult { args: [obj: ObjId, offset: FieldRef], transpile: true, cost: 1 },
    /// Return a dense element; fails on holes and out-of-bounds.
    LoadDenseElementResult { args: [obj: ObjId, index: Int32Id], transpile: true, cost: 2 },
    /// Return a dense element, or `undefined` for holes and out-of-bounds.
    /// Sound only under chain guards proving no prototype supplies elements.
    LoadDenseElementHoleResult { args: [obj: ObjId, index: Int32Id], transpile: true, cost: 2 },
    /// Return whether a dense element exists; fails outside the dense span.
    LoadDenseElementExistsResult { args: [obj: ObjId, index: Int32Id], transpile: true, cost: 1 },
    /// Return whether a dense element exists, treating holes as absent.
    LoadDenseElementHoleExistsResult {
        args: [obj: ObjId, index: Int32Id],
        transpile: true,
        cost: 1
    },
    /// Return an array's dense length as int32.
    LoadInt32ArrayLengthResult { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Return a string's length as int32.
    LoadStringLengthResult { args: [str: StringId], transpile: true, cost: 1 },
    /// Store to a fixed slot.
    StoreFixedSlot { args: [obj: ObjId, offset: FieldRef, rhs: ValId], transpile: true, cost: 1 },
    /// Store to a dynamic slot.
    StoreDynamicSlot { args: [obj: ObjId, offset: FieldRef, rhs: ValId], transpile: true, cost: 1 },
    /// Add a property by moving to a new shape, storing into a fixed slot.
    AddAndStoreFixedSlot {
        args: [obj: ObjId, offset: FieldRef, rhs: ValId, new_shape: FieldRef],
        transpile: true,
        cost: 3
    },
    /// Add a property by moving to a new shape, storing into an existing
    /// dynamic-slot region.
    AddAndStoreDynamicSlot {
        args: [obj: ObjId, offset: FieldRef, rhs: ValId, new_shape: FieldRef],
        transpile: true,
        cost: 3
    },
    /// Add a property whose slot needs the dynamic region grown first.
    AllocateAndStoreDynamicSlot {
        args: [obj: ObjId, offset: FieldRef, rhs: ValId, new_shape: FieldRef, num_new_slots: FieldRef],
        transpile: true,
        cost: 4
    },
    /// Store to an existing dense element.
    StoreDenseElement { args: [obj: ObjId, index: Int32Id, rhs: ValId], transpile: true, cost: 2 },
    /// Store to a dense element, appending when `handle_add` is set.
    StoreDenseElementHole {
        args: [obj: ObjId, index: Int32Id, rhs: ValId, handle_add: Byte],
        transpile: true,
        cost: 3
    },

    // ---------------------------------------------------------------------------
    // Megamorphic fallbacks: hash-table paths guarded only on coarse facts.
    // ---------------------------------------------------------------------------
    /// Generic by-name load through the receiver and its chain.
    MegamorphicLoadSlotResult { args: [obj: ObjId, name: FieldRef], transpile: true, cost: 4 },
    /// Generic by-value load.
    MegamorphicLoadSlotByValueResult { args: [obj: ObjId, id: ValId], transpile: true, cost: 4 },
    /// Generic by-name store.
    MegamorphicStoreSlot {
        args: [obj: ObjId, name: FieldRef, rhs: ValId, strict: Byte],
        transpile: true,
        cost: 5
    },
    /// Generic by-value store.
    MegamorphicSetElement {
        args: [obj: ObjId, id: ValId, rhs: ValId, strict: Byte],
        transpile: false,
        cost: 5
    },
    /// Generic `in` / `hasOwnProperty` test.
    MegamorphicHasPropResult {
        args: [obj: ObjId, id: ValId, has_own: Byte],
        transpile: true,
        cost: 4
    },

    // ---------------------------------------------------------------------------
    // Proxy forwarding.
    // ---------------------------------------------------------------------------
    /// Invoke the get trap with a key field.
    ProxyGetResult { args: [obj: ObjId, id: FieldRef], transpile: true, cost: 5 },
    /// Invoke the get trap with a key operand.
    ProxyGetByValueResult { args: [obj: ObjId, id: ValId], transpile: true, cost: 5 },
    /// Invoke the set trap with a key field.
    ProxySet { args: [obj: ObjId, id: FieldRef, rhs: ValId, strict: Byte], transpile: true, cost: 5 },
    /// Invoke the set trap with a key operand.
    ProxySetByValue {
        args: [obj: ObjId, id: ValId, rhs: ValId, strict: Byte],
        transpile: true,
        cost: 5
    },
    /// Invoke the has trap.
    ProxyHasPropResult {
        args: [obj: ObjId, id: ValId, has_own: Byte],
        transpile: true,
        cost: 4
    },

    // ---------------------------------------------------------------------------
    // Calls. Arguments are the cache inputs; `flags` describes how they map
    // onto the callee's view.
    // ---------------------------------------------------------------------------
    /// Call a native function and use its return value as the result.
    CallNativeFunction { args: [callee: ObjId, flags: Byte, argc: Byte], transpile: true, cost: 4 },
    /// Enter a scripted function.
    CallScriptedFunction { args: [callee: ObjId, flags: Byte, argc: Byte], transpile: true, cost: 3 },
    /// Call through a bound function into its scripted target, prepending
    /// the bound arguments.
    CallBoundScriptedFunction {
        args: [callee: ObjId, flags: Byte, argc: Byte, num_bound_args: Byte],
        transpile: true,
        cost: 4
    },
    /// Call a native getter on the receiver value.
    CallNativeGetterResult {
        args: [receiver: ValId, getter: FieldRef, same_realm: Byte],
        transpile: true,
        cost: 4
    },
    /// Enter a scripted getter.
    CallScriptedGetterResult {
        args: [receiver: ValId, getter: FieldRef, same_realm: Byte],
        transpile: true,
        cost: 3
    },
    /// Call a native setter.
    CallNativeSetter {
        args: [receiver: ObjId, setter: FieldRef, rhs: ValId, same_realm: Byte],
        transpile: true,
        cost: 4
    },
    /// Enter a scripted setter.
    CallScriptedSetter {
        args: [receiver: ObjId, setter: FieldRef, rhs: ValId, same_realm: Byte],
        transpile: true,
        cost: 3
    },
    /// Metadata for constructing calls: the shape to pre-create `this`
    /// with. Not executed.
    MetaScriptedThisShape { args: [this_shape: FieldRef], transpile: true, cost: 1 },

    // ---------------------------------------------------------------------------
    // Results.
    // ---------------------------------------------------------------------------
    /// Return `undefined`.
    LoadUndefinedResult { args: [], transpile: true, cost: 1 },
    /// Return a boolean immediate.
    LoadBooleanResult { args: [value: Byte], transpile: true, cost: 1 },
    /// Return an int32 operand.
    LoadInt32Result { args: [val: Int32Id], transpile: true, cost: 1 },
    /// Return a number operand.
    LoadDoubleResult { args: [val: NumberId], transpile: true, cost: 1 },
    /// Return a string operand.
    LoadStringResult { args: [str: StringId], transpile: true, cost: 1 },
    /// Return a symbol operand.
    LoadSymbolResult { args: [sym: SymbolId], transpile: true, cost: 1 },
    /// Return a big-integer operand.
    LoadBigIntResult { args: [val: BigIntId], transpile: true, cost: 1 },
    /// Return an object operand.
    LoadObjectResult { args: [obj: ObjId], transpile: true, cost: 1 },
    /// Return a value operand unchanged.
    LoadValueResult { args: [val: ValId], transpile: true, cost: 1 },
    /// Return a constant string from an atom field.
    LoadConstantStringResult { args: [str: FieldRef], transpile: true, cost: 1 },

    // ---------------------------------------------------------------------------
    // Comparisons.
    // ---------------------------------------------------------------------------
    /// Compare two int32 operands.
    CompareInt32Result { args: [op: Byte, lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Compare two number operands.
    CompareDoubleResult { args: [op: Byte, lhs: NumberId, rhs: NumberId], transpile: true, cost: 1 },
    /// Compare two strings (ordering is lexicographic by code unit).
    CompareStringResult { args: [op: Byte, lhs: StringId, rhs: StringId], transpile: true, cost: 2 },
    /// Compare two objects by identity; equality operators only.
    CompareObjectResult { args: [op: Byte, lhs: ObjId, rhs: ObjId], transpile: true, cost: 1 },
    /// Compare two symbols by identity; equality operators only.
    CompareSymbolResult { args: [op: Byte, lhs: SymbolId, rhs: SymbolId], transpile: true, cost: 1 },
    /// Compare two big integers.
    CompareBigIntResult { args: [op: Byte, lhs: BigIntId, rhs: BigIntId], transpile: true, cost: 3 },
    /// Compare a value against `null`/`undefined` under loose or strict
    /// equality.
    CompareNullUndefinedResult {
        args: [op: Byte, is_undefined: Byte, input: ValId],
        transpile: true,
        cost: 1
    },

    // ---------------------------------------------------------------------------
    // Arithmetic. Int32 ops fail the stub on overflow or sign anomalies
    // rather than silently widening.
    // ---------------------------------------------------------------------------
    /// Int32 addition.
    Int32AddResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Int32 subtraction.
    Int32SubResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Int32 multiplication; fails on overflow and on a negative-zero
    /// result.
    Int32MulResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 2 },
    /// Int32 division; fails when the quotient is inexact or the result
    /// would be negative zero.
    Int32DivResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 2 },
    /// Int32 remainder; fails on zero divisor and negative-zero results.
    Int32ModResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 2 },
    /// Bitwise and.
    Int32BitAndResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Bitwise or.
    Int32BitOrResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Bitwise xor.
    Int32BitXorResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Left shift (count masked to five bits).
    Int32LeftShiftResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Arithmetic right shift.
    Int32RightShiftResult { args: [lhs: Int32Id, rhs: Int32Id], transpile: true, cost: 1 },
    /// Int32 negation; fails on zero and int32 minimum.
    Int32NegationResult { args: [input: Int32Id], transpile: true, cost: 1 },
    /// Int32 increment.
    Int32IncResult { args: [input: Int32Id], transpile: true, cost: 1 },
    /// Int32 decrement.
    Int32DecResult { args: [input: Int32Id], transpile: true, cost: 1 },
    /// Bitwise not.
    Int32NotResult { args: [input: Int32Id], transpile: true, cost: 1 },
    /// Double addition.
    DoubleAddResult { args: [lhs: NumberId, rhs: NumberId], transpile: true, cost: 2 },
    /// Double subtraction.
    DoubleSubResult { args: [lhs: NumberId, rhs: NumberId], transpile: true, cost: 2 },
    /// Double multiplication.
    DoubleMulResult { args: [lhs: NumberId, rhs: NumberId], transpile: true, cost: 2 },
    /// Double division.
    DoubleDivResult { args: [lhs: NumberId, rhs: NumberId], transpile: true, cost: 2 },
    /// Double remainder (JS `%` semantics).
    DoubleModResult { args: [lhs: NumberId, rhs: NumberId], transpile: true, cost: 3 },
    /// Double negation.
    DoubleNegationResult { args: [input: NumberId], transpile: true, cost: 1 },
    /// Double increment.
    DoubleIncResult { args: [input: NumberId], transpile: true, cost: 1 },
    /// Double decrement.
    DoubleDecResult { args: [input: NumberId], transpile: true, cost: 1 },
    /// Big-integer addition.
    BigIntAddResult { args: [lhs: BigIntId, rhs: BigIntId], transpile: true, cost: 4 },
    /// String concatenation.
    CallStringConcatResult { args: [lhs: StringId, rhs: StringId], transpile: true, cost: 4 },
    /// Render an int32 as a string operand.
    CallInt32ToString { args: [input: Int32Id, result: StringId], transpile: true, cost: 3 },
    /// Render a number as a string operand.
    CallNumberToString { args: [input: NumberId, result: StringId], transpile: true, cost: 3 },

    // ---------------------------------------------------------------------------
    // Type queries.
    // ---------------------------------------------------------------------------
    /// `typeof` for objects: "function" for callables, else "object".
    LoadTypeOfObjectResult { args: [obj: ObjId], transpile: true, cost: 2 },
    /// `instanceof`: walk the lhs prototype chain looking for `proto`.
    LoadInstanceOfObjectResult { args: [lhs: ValId, proto: ObjId], transpile: true, cost: 3 },

    // ---------------------------------------------------------------------------
    // Allocation. These re-enter the runtime allocator, so the optimizing
    // tier leaves them to the baseline stubs.
    // ---------------------------------------------------------------------------
    /// Allocate a plain object from a template shape.
    NewPlainObjectResult { args: [shape: FieldRef, site: FieldRef], transpile: false, cost: 3 },
    /// Allocate a dense array of the given length.
    NewArrayObjectResult {
        args: [length: UInt32Imm, shape: FieldRef, site: FieldRef],
        transpile: false,
        cost: 3
    },
    /// Allocate an iterator over a packed array.
    NewArrayIteratorResult {
        args: [obj: ObjId, template_shape: FieldRef, site: FieldRef],
        transpile: false,
        cost: 3
    },

    // ---------------------------------------------------------------------------
    // Terminator.
    // ---------------------------------------------------------------------------
    /// Return the accumulated result from the cache. Every stream ends
    /// with exactly one of these.
    ReturnFromIC { args: [], transpile: true, cost: 1 },
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_match_table_order() {
        for (index, op) in CacheOp::ALL.iter().enumerate() {
            assert_eq!(*op as usize, index);
            assert_eq!(CacheOp::from_byte(index as u8), Some(*op));
        }
        assert_eq!(CacheOp::from_byte(CacheOp::COUNT as u8), None);
        assert_eq!(CacheOp::from_byte(u8::MAX), None);
    }

    #[test]
    fn test_arg_schemas() {
        assert_eq!(CacheOp::ReturnFromIC.args().len(), 0);
        assert_eq!(CacheOp::ReturnFromIC.encoded_args_len(), 0);

        let guard_shape = CacheOp::GuardShape.args();
        assert_eq!(guard_shape.len(), 2);
        assert_eq!(guard_shape[0].ty, ArgType::ObjId);
        assert_eq!(guard_shape[1].ty, ArgType::FieldRef);
        assert_eq!(CacheOp::GuardShape.encoded_args_len(), 3);

        // Operand-id args map to operand kinds; immediates do not.
        assert_eq!(ArgType::ObjId.operand_kind(), Some(OperandKind::Obj));
        assert_eq!(ArgType::Byte.operand_kind(), None);
        assert_eq!(ArgType::FieldRef.operand_kind(), None);
    }

    #[test]
    fn test_encoded_lengths() {
        assert_eq!(CacheOp::GuardSpecificInt32.encoded_args_len(), 2 + 4);
        assert_eq!(CacheOp::NewArrayObjectResult.encoded_args_len(), 4 + 1 + 1);
        assert_eq!(
            CacheOp::AllocateAndStoreDynamicSlot.encoded_args_len(),
            2 + 1 + 2 + 1 + 1
        );
    }

    #[test]
    fn test_metadata_columns() {
        assert!(CacheOp::GuardShape.is_transpilable());
        assert!(!CacheOp::NewPlainObjectResult.is_transpilable());
        assert!(!CacheOp::MegamorphicSetElement.is_transpilable());
        assert!(CacheOp::ProxyGetResult.health_cost() > CacheOp::GuardShape.health_cost());
        assert_eq!(CacheOp::GuardShape.name(), "GuardShape");
    }

    #[test]
    fn test_terminal_flag() {
        assert!(CacheOp::ReturnFromIC.is_terminal());
        assert!(!CacheOp::LoadUndefinedResult.is_terminal());
    }
}
