//! Comparison generator for relational and (in)equality sites.

use ferret_cacheir::flags::CompareOp;
use ferret_cacheir::operand::ValOperandId;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::value::ValueTag;
use ferret_object::Value;

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one comparison miss.
pub struct CompareIrGenerator {
    op: CompareOp,
    inputs: [Value; 2],
    result: Option<(&'static str, CacheIrStream)>,
}

impl CompareIrGenerator {
    /// Comparison `lhs <op> rhs`.
    pub fn new(op: CompareOp, lhs: Value, rhs: Value) -> Self {
        Self { op, inputs: [lhs, rhs], result: None }
    }

    fn writer(&self) -> (CacheIrWriter, ValOperandId, ValOperandId) {
        let mut writer = CacheIrWriter::new();
        let lhs = writer.input_value();
        let rhs = writer.input_value();
        (writer, lhs, rhs)
    }

    fn tags(&self) -> (ValueTag, ValueTag) {
        (self.inputs[0].tag(), self.inputs[1].tag())
    }

    // -----------------------------------------------------------------------
    // Probes
    // -----------------------------------------------------------------------

    fn try_attach_int32(&mut self) -> AttachDecision {
        let (lt, rt) = self.tags();
        let int_like = |tag| matches!(tag, ValueTag::Int32 | ValueTag::Boolean);
        if !int_like(lt) || !int_like(rt) {
            return AttachDecision::NoAction;
        }
        // Strict comparison distinguishes booleans from numbers.
        if self.op.is_strict() && lt != rt {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let to_int32 = |writer: &mut CacheIrWriter, id, tag| match tag {
            ValueTag::Boolean => writer.guard_boolean_to_int32(id),
            _ => writer.guard_to_int32(id),
        };
        let lhs_id = to_int32(&mut writer, lhs, lt);
        let rhs_id = to_int32(&mut writer, rhs, rt);
        writer.compare_int32_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.Int32", writer);
        AttachDecision::Attach
    }

    fn try_attach_double(&mut self) -> AttachDecision {
        if !self.inputs[0].is_number() || !self.inputs[1].is_number() {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_number(lhs);
        let rhs_id = writer.guard_to_number(rhs);
        writer.compare_double_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.Double", writer);
        AttachDecision::Attach
    }

    fn try_attach_string(&mut self) -> AttachDecision {
        if self.tags() != (ValueTag::String, ValueTag::String) {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_string(lhs);
        let rhs_id = writer.guard_to_string(rhs);
        writer.compare_string_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.String", writer);
        AttachDecision::Attach
    }

    fn try_attach_bigint(&mut self) -> AttachDecision {
        if self.tags() != (ValueTag::BigInt, ValueTag::BigInt) {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_big_int(lhs);
        let rhs_id = writer.guard_to_big_int(rhs);
        writer.compare_big_int_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.BigInt", writer);
        AttachDecision::Attach
    }

    fn try_attach_object(&mut self) -> AttachDecision {
        if self.tags() != (ValueTag::Object, ValueTag::Object) || !self.op.is_equality() {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_object(lhs);
        let rhs_id = writer.guard_to_object(rhs);
        writer.compare_object_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.Object", writer);
        AttachDecision::Attach
    }

    fn try_attach_symbol(&mut self) -> AttachDecision {
        if self.tags() != (ValueTag::Symbol, ValueTag::Symbol) || !self.op.is_equality() {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_symbol(lhs);
        let rhs_id = writer.guard_to_symbol(rhs);
        writer.compare_symbol_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.Symbol", writer);
        AttachDecision::Attach
    }

    /// One side is null or undefined and the op is an equality. The
    /// stub guards that side's tag and evaluates against the other.
    fn try_attach_null_undefined(&mut self) -> AttachDecision {
        if !self.op.is_equality() {
            return AttachDecision::NoAction;
        }
        let lhs_nullish = self.inputs[0].is_null_or_undefined();
        let rhs_nullish = self.inputs[1].is_null_or_undefined();
        if lhs_nullish == rhs_nullish {
            // Both-nullish sites are cheap enough for the fallback.
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let (nullish_id, other_id, nullish_tag) = if lhs_nullish {
            (lhs, rhs, self.inputs[0].tag())
        } else {
            (rhs, lhs, self.inputs[1].tag())
        };
        let is_undefined = nullish_tag == ValueTag::Undefined;
        if self.op.is_strict() {
            if is_undefined {
                writer.guard_is_undefined(nullish_id);
            } else {
                writer.guard_is_null(nullish_id);
            }
        } else {
            writer.guard_is_null_or_undefined(nullish_id);
        }
        writer.compare_null_undefined_result(self.op, is_undefined, other_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.NullUndefined", writer);
        AttachDecision::Attach
    }

    /// Loose comparison of a string against a number coerces the string.
    fn try_attach_string_number(&mut self) -> AttachDecision {
        if self.op.is_strict() {
            return AttachDecision::NoAction;
        }
        let (lt, _) = self.tags();
        let string_side = match (lt == ValueTag::String, self.inputs[1].tag() == ValueTag::String) {
            (true, false) if self.inputs[1].is_number() => 0,
            (false, true) if self.inputs[0].is_number() => 1,
            _ => return AttachDecision::NoAction,
        };
        let (mut writer, lhs, rhs) = self.writer();
        let coerce = |writer: &mut CacheIrWriter, id, is_string: bool| {
            if is_string {
                let str_id = writer.guard_to_string(id);
                writer.guard_string_to_number(str_id)
            } else {
                writer.guard_to_number(id)
            }
        };
        let lhs_id = coerce(&mut writer, lhs, string_side == 0);
        let rhs_id = coerce(&mut writer, rhs, string_side == 1);
        writer.compare_double_result(self.op, lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("Compare.StringNumber", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for CompareIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::Compare
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, _ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        try_attach!(self.try_attach_int32());
        try_attach!(self.try_attach_double());
        try_attach!(self.try_attach_string());
        try_attach!(self.try_attach_bigint());
        try_attach!(self.try_attach_object());
        try_attach!(self.try_attach_symbol());
        try_attach!(self.try_attach_null_undefined());
        try_attach!(self.try_attach_string_number());
        AttachDecision::NoAction
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
