//! Unary arithmetic generator.

use ferret_cacheir::flags::UnaryArithOp;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::value::ValueTag;
use ferret_object::Value;

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one unary arithmetic miss.
pub struct UnaryArithIrGenerator {
    op: UnaryArithOp,
    inputs: [Value; 1],
    result: Option<(&'static str, CacheIrStream)>,
}

impl UnaryArithIrGenerator {
    /// Operation `op` over `input`.
    pub fn new(op: UnaryArithOp, input: Value) -> Self {
        Self { op, inputs: [input], result: None }
    }

    /// Int32 fast path. The evaluated stub fails over on overflow and
    /// negative zero, so the guard only checks the tag.
    fn try_attach_int32(&mut self) -> AttachDecision {
        if self.inputs[0].tag() != ValueTag::Int32 {
            return AttachDecision::NoAction;
        }
        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let int_id = writer.guard_to_int32(input);
        match self.op {
            UnaryArithOp::Pos => writer.load_int32_result(int_id),
            UnaryArithOp::Neg => writer.int32_negation_result(int_id),
            UnaryArithOp::Inc => writer.int32_inc_result(int_id),
            UnaryArithOp::Dec => writer.int32_dec_result(int_id),
            UnaryArithOp::BitNot => writer.int32_not_result(int_id),
        }
        writer.return_from_ic();
        self.result = shared::finish("UnaryArith.Int32", writer);
        AttachDecision::Attach
    }

    fn try_attach_double(&mut self) -> AttachDecision {
        if !self.inputs[0].is_number() || self.op == UnaryArithOp::BitNot {
            return AttachDecision::NoAction;
        }
        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let num_id = writer.guard_to_number(input);
        match self.op {
            UnaryArithOp::Pos => writer.load_double_result(num_id),
            UnaryArithOp::Neg => writer.double_negation_result(num_id),
            UnaryArithOp::Inc => writer.double_inc_result(num_id),
            UnaryArithOp::Dec => writer.double_dec_result(num_id),
            UnaryArithOp::BitNot => return AttachDecision::NoAction,
        }
        writer.return_from_ic();
        self.result = shared::finish("UnaryArith.Double", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for UnaryArithIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::UnaryArith
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
        AttachDecision::NoAction
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
