//! Iterator acquisition generator.
//!
//! The packed-array fast path skips the `Symbol.iterator` lookup and
//! `next` method machinery entirely. Its correctness rests on the
//! array-iterator fuse: any realm-wide mutation of the iterator
//! protocol pops the fuse and every attached stub fails its guard.

use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::realm::FuseIndex;
use ferret_object::shape::ClassKind;
use ferret_object::Value;

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;

/// Probes for one iterator-acquisition miss.
pub struct GetIteratorIrGenerator {
    inputs: [Value; 1],
    result: Option<(&'static str, CacheIrStream)>,
}

impl GetIteratorIrGenerator {
    /// Iteration over `iterable`.
    pub fn new(iterable: Value) -> Self {
        Self { inputs: [iterable], result: None }
    }

    fn try_attach_packed_array(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        let Value::Object(array) = &self.inputs[0] else {
            return AttachDecision::NoAction;
        };
        if array.class_kind() != ClassKind::Array || !array.is_packed() {
            return AttachDecision::NoAction;
        }
        if !ctx.realm().fuses().fuse(FuseIndex::ArrayIteratorIntact).is_intact() {
            return AttachDecision::NoAction;
        }
        // Allocation needs a site to credit; without one we stay on the
        // fallback path.
        let Some(site) = ctx.alloc_site().cloned() else {
            return AttachDecision::NoAction;
        };
        let template = ctx
            .realm()
            .base_shape(ClassKind::ArrayIterator, Some(ctx.realm().array_iterator_prototype()));

        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let obj_id = writer.guard_to_object(input);
        writer.guard_class(obj_id, ClassKind::Array);
        writer.guard_shape(obj_id, &array.shape());
        writer.guard_array_is_packed(obj_id);
        writer.guard_fuse_intact(FuseIndex::ArrayIteratorIntact);
        writer.new_array_iterator_result(obj_id, &template, &site);
        writer.return_from_ic();
        self.result = shared::finish("GetIterator.PackedArray", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for GetIteratorIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::GetIterator
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        self.try_attach_packed_array(ctx)
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
