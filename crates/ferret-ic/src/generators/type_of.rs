//! `typeof` generator.

use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::value::ValueTag;
use ferret_object::Value;

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one `typeof` miss.
pub struct TypeOfIrGenerator {
    inputs: [Value; 1],
    result: Option<(&'static str, CacheIrStream)>,
}

impl TypeOfIrGenerator {
    /// `typeof input`.
    pub fn new(input: Value) -> Self {
        Self { inputs: [input], result: None }
    }

    /// Objects need a runtime check for callables, so the answer is
    /// computed per evaluation rather than baked in.
    fn try_attach_object(&mut self) -> AttachDecision {
        if self.inputs[0].tag() != ValueTag::Object {
            return AttachDecision::NoAction;
        }
        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let obj_id = writer.guard_to_object(input);
        writer.load_type_of_object_result(obj_id);
        writer.return_from_ic();
        self.result = shared::finish("TypeOf.Object", writer);
        AttachDecision::Attach
    }

    /// Int32 and double both answer "number"; one stub covers both.
    fn try_attach_number(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        if !self.inputs[0].is_number() {
            return AttachDecision::NoAction;
        }
        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        writer.guard_to_number(input);
        writer.load_constant_string_result(&ctx.realm().typeof_atom(&self.inputs[0]));
        writer.return_from_ic();
        self.result = shared::finish("TypeOf.Number", writer);
        AttachDecision::Attach
    }

    /// Every remaining primitive has a fixed answer once its tag is
    /// pinned.
    fn try_attach_primitive(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        let tag = self.inputs[0].tag();
        if matches!(tag, ValueTag::Object | ValueTag::Double) {
            return AttachDecision::NoAction;
        }
        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        writer.guard_non_double_type(input, tag);
        writer.load_constant_string_result(&ctx.realm().typeof_atom(&self.inputs[0]));
        writer.return_from_ic();
        self.result = shared::finish("TypeOf.Primitive", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for TypeOfIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::TypeOf
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        try_attach!(self.try_attach_object());
        try_attach!(self.try_attach_number(ctx));
        try_attach!(self.try_attach_primitive(ctx));
        AttachDecision::NoAction
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
