//! Binary arithmetic generator, including string concatenation for `+`.

use ferret_cacheir::flags::BinaryArithOp;
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

/// Probes for one binary arithmetic miss.
pub struct BinaryArithIrGenerator {
    op: BinaryArithOp,
    inputs: [Value; 2],
    result: Option<(&'static str, CacheIrStream)>,
}

impl BinaryArithIrGenerator {
    /// Operation `lhs <op> rhs`.
    pub fn new(op: BinaryArithOp, lhs: Value, rhs: Value) -> Self {
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

    /// Int32 fast path, booleans included. Overflow and the other
    /// result-domain hazards fail over at evaluation time.
    fn try_attach_int32(&mut self) -> AttachDecision {
        let (lt, rt) = self.tags();
        let int_like = |tag| matches!(tag, ValueTag::Int32 | ValueTag::Boolean);
        if !int_like(lt) || !int_like(rt) {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let to_int32 = |writer: &mut CacheIrWriter, id, tag| match tag {
            ValueTag::Boolean => writer.guard_boolean_to_int32(id),
            _ => writer.guard_to_int32(id),
        };
        let lhs_id = to_int32(&mut writer, lhs, lt);
        let rhs_id = to_int32(&mut writer, rhs, rt);
        match self.op {
            BinaryArithOp::Add => writer.int32_add_result(lhs_id, rhs_id),
            BinaryArithOp::Sub => writer.int32_sub_result(lhs_id, rhs_id),
            BinaryArithOp::Mul => writer.int32_mul_result(lhs_id, rhs_id),
            BinaryArithOp::Div => writer.int32_div_result(lhs_id, rhs_id),
            BinaryArithOp::Mod => writer.int32_mod_result(lhs_id, rhs_id),
            BinaryArithOp::BitAnd => writer.int32_bit_and_result(lhs_id, rhs_id),
            BinaryArithOp::BitOr => writer.int32_bit_or_result(lhs_id, rhs_id),
            BinaryArithOp::BitXor => writer.int32_bit_xor_result(lhs_id, rhs_id),
            BinaryArithOp::Lsh => writer.int32_left_shift_result(lhs_id, rhs_id),
            BinaryArithOp::Rsh => writer.int32_right_shift_result(lhs_id, rhs_id),
        }
        writer.return_from_ic();
        self.result = shared::finish("BinaryArith.Int32", writer);
        AttachDecision::Attach
    }

    fn try_attach_double(&mut self) -> AttachDecision {
        if !self.inputs[0].is_number() || !self.inputs[1].is_number() || self.op.is_bitwise() {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_number(lhs);
        let rhs_id = writer.guard_to_number(rhs);
        match self.op {
            BinaryArithOp::Add => writer.double_add_result(lhs_id, rhs_id),
            BinaryArithOp::Sub => writer.double_sub_result(lhs_id, rhs_id),
            BinaryArithOp::Mul => writer.double_mul_result(lhs_id, rhs_id),
            BinaryArithOp::Div => writer.double_div_result(lhs_id, rhs_id),
            BinaryArithOp::Mod => writer.double_mod_result(lhs_id, rhs_id),
            _ => return AttachDecision::NoAction,
        }
        writer.return_from_ic();
        self.result = shared::finish("BinaryArith.Double", writer);
        AttachDecision::Attach
    }

    fn try_attach_string_concat(&mut self) -> AttachDecision {
        if self.op != BinaryArithOp::Add || self.tags() != (ValueTag::String, ValueTag::String) {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_string(lhs);
        let rhs_id = writer.guard_to_string(rhs);
        writer.call_string_concat_result(lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("BinaryArith.StringConcat", writer);
        AttachDecision::Attach
    }

    /// `string + number` concatenates the stringified number.
    fn try_attach_string_number_concat(&mut self) -> AttachDecision {
        if self.op != BinaryArithOp::Add {
            return AttachDecision::NoAction;
        }
        let (lt, rt) = self.tags();
        let number_side = match (lt == ValueTag::String, rt == ValueTag::String) {
            (true, false) if self.inputs[1].is_number() => 1,
            (false, true) if self.inputs[0].is_number() => 0,
            _ => return AttachDecision::NoAction,
        };
        let (mut writer, lhs, rhs) = self.writer();
        let coerce = |writer: &mut CacheIrWriter, id, tag: ValueTag| {
            if tag == ValueTag::Int32 {
                let int_id = writer.guard_to_int32(id);
                writer.call_int32_to_string(int_id)
            } else {
                let num_id = writer.guard_to_number(id);
                writer.call_number_to_string(num_id)
            }
        };
        let (lhs_id, rhs_id) = if number_side == 0 {
            let l = coerce(&mut writer, lhs, lt);
            (l, writer.guard_to_string(rhs))
        } else {
            let l = writer.guard_to_string(lhs);
            (l, coerce(&mut writer, rhs, rt))
        };
        writer.call_string_concat_result(lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("BinaryArith.StringConcatNumber", writer);
        AttachDecision::Attach
    }

    fn try_attach_bigint(&mut self) -> AttachDecision {
        if self.op != BinaryArithOp::Add || self.tags() != (ValueTag::BigInt, ValueTag::BigInt) {
            return AttachDecision::NoAction;
        }
        let (mut writer, lhs, rhs) = self.writer();
        let lhs_id = writer.guard_to_big_int(lhs);
        let rhs_id = writer.guard_to_big_int(rhs);
        writer.big_int_add_result(lhs_id, rhs_id);
        writer.return_from_ic();
        self.result = shared::finish("BinaryArith.BigInt", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for BinaryArithIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::BinaryArith
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
        try_attach!(self.try_attach_string_concat());
        try_attach!(self.try_attach_string_number_concat());
        try_attach!(self.try_attach_bigint());
        AttachDecision::NoAction
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
