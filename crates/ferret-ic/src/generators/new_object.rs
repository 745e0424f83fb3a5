//! Allocation-site generators for object and array literals.
//!
//! These sites take no inputs; the stub bakes in the template shape and
//! the allocation site so the evaluator can bump-allocate and credit
//! the site's profile counters.

use std::sync::Arc;

use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::{Shape, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;

/// Probes for one object-literal allocation miss.
pub struct NewObjectIrGenerator {
    template: Arc<Shape>,
    result: Option<(&'static str, CacheIrStream)>,
}

impl NewObjectIrGenerator {
    /// Allocation of a plain object with `template` as its shape.
    pub fn new(template: Arc<Shape>) -> Self {
        Self { template, result: None }
    }

    fn try_attach_template(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        let Some(site) = ctx.alloc_site().cloned() else {
            return AttachDecision::NoAction;
        };
        let mut writer = CacheIrWriter::new();
        writer.new_plain_object_result(&self.template, &site);
        writer.return_from_ic();
        self.result = shared::finish("NewObject.Template", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for NewObjectIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::NewObject
    }

    fn inputs(&self) -> &[Value] {
        &[]
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        self.try_attach_template(ctx)
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}

/// Probes for one array-literal allocation miss.
pub struct NewArrayIrGenerator {
    length: u32,
    template: Arc<Shape>,
    result: Option<(&'static str, CacheIrStream)>,
}

impl NewArrayIrGenerator {
    /// Allocation of an array of `length` with `template` as its shape.
    pub fn new(length: u32, template: Arc<Shape>) -> Self {
        Self { length, template, result: None }
    }

    fn try_attach_template(&mut self, ctx: &GenerationContext<'_>) -> AttachDecision {
        let Some(site) = ctx.alloc_site().cloned() else {
            return AttachDecision::NoAction;
        };
        let mut writer = CacheIrWriter::new();
        writer.new_array_object_result(self.length, &self.template, &site);
        writer.return_from_ic();
        self.result = shared::finish("NewArray.Template", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for NewArrayIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::NewArray
    }

    fn inputs(&self) -> &[Value] {
        &[]
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            return AttachDecision::NoAction;
        }
        self.try_attach_template(ctx)
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
