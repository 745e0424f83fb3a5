//! `instanceof` generator.

use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::shape::{PropertyKind, SlotLocation};
use ferret_object::{PropertyKey, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;

/// Probes for one `instanceof` miss.
pub struct InstanceOfIrGenerator {
    inputs: [Value; 2],
    result: Option<(&'static str, CacheIrStream)>,
}

impl InstanceOfIrGenerator {
    /// `lhs instanceof rhs`.
    pub fn new(lhs: Value, rhs: Value) -> Self {
        Self { inputs: [lhs, rhs], result: None }
    }

    /// Plain function on the right with a data `prototype` slot holding
    /// an object. The slot guard makes prototype reassignment fail over
    /// instead of returning stale answers.
    fn try_attach_function(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        let Value::Object(rhs) = &self.inputs[1] else {
            return AttachDecision::NoAction;
        };
        let Some(fun) = rhs.as_function() else {
            return AttachDecision::NoAction;
        };
        let key = PropertyKey::Atom(ctx.realm().intern("prototype"));
        let Some(info) = rhs.shape().property(&key) else {
            return AttachDecision::NoAction;
        };
        if info.kind != PropertyKind::Data {
            return AttachDecision::NoAction;
        }
        let Some(proto) = rhs.read_slot(info.slot).as_object().cloned() else {
            return AttachDecision::NoAction;
        };

        let mut writer = CacheIrWriter::new();
        let lhs_id = writer.input_value();
        let rhs_val = writer.input_value();
        let rhs_id = writer.guard_to_object(rhs_val);
        writer.guard_specific_function(rhs_id, rhs, fun.nargs_and_flags_word());
        match info.slot {
            SlotLocation::Fixed(index) => {
                writer.guard_fixed_slot_is_specific_object(rhs_id, u64::from(index), &proto);
            }
            SlotLocation::Dynamic(index) => {
                writer.guard_dynamic_slot_is_specific_object(rhs_id, u64::from(index), &proto);
            }
        }
        let proto_id = writer.load_object(&proto);
        writer.load_instance_of_object_result(lhs_id, proto_id);
        writer.return_from_ic();
        self.result = shared::finish("InstanceOf.Function", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for InstanceOfIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::InstanceOf
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        self.try_attach_function(ctx)
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
