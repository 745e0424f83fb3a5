//! Call-site generator.
//!
//! Inputs are `[callee, this, arg0..]`. The emitted call op carries
//! [`CallFlags`] describing how that layout maps onto the callee's view,
//! so `Function.prototype.call`/`apply` forwarding and bound functions
//! attach without reshuffling inputs.

use std::sync::Arc;

use smallvec::SmallVec;

use ferret_cacheir::flags::{ArgFormat, CallFlags};
use ferret_cacheir::operand::ValOperandId;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::shape::{ClassKind, PropertyKind};
use ferret_object::{ObjectRef, PropertyKey, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Most arguments a call site will specialize for.
const MAX_SPECIALIZED_ARGS: usize = 16;

/// Probes for one call-site miss.
pub struct CallIrGenerator {
    constructing: bool,
    inputs: SmallVec<[Value; 4]>,
    result: Option<(&'static str, CacheIrStream)>,
}

impl CallIrGenerator {
    /// Call of `callee` with `this` and `args`.
    pub fn new(callee: Value, this: Value, args: &[Value], constructing: bool) -> Self {
        let mut inputs = SmallVec::with_capacity(2 + args.len());
        inputs.push(callee);
        inputs.push(this);
        inputs.extend(args.iter().cloned());
        Self { constructing, inputs, result: None }
    }

    fn argc(&self) -> u8 {
        (self.inputs.len() - 2) as u8
    }

    /// Fresh writer with every input declared, in order.
    fn writer(&self) -> (CacheIrWriter, SmallVec<[ValOperandId; 4]>) {
        let mut writer = CacheIrWriter::new();
        let ids = (0..self.inputs.len()).map(|_| writer.input_value()).collect();
        (writer, ids)
    }

    fn standard_flags(&self, ctx: &GenerationContext<'_>, callee: &ObjectRef) -> CallFlags {
        CallFlags {
            format: ArgFormat::Standard,
            constructing: self.constructing,
            same_realm: ctx.same_realm(&callee.shape()),
        }
    }

    // -----------------------------------------------------------------------
    // Probes
    // -----------------------------------------------------------------------

    /// `f.call(thisArg, ..)`: guard the callee is the `call` intrinsic,
    /// then enter the real target with the arguments shifted by one.
    fn try_attach_fun_call(
        &mut self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> AttachDecision {
        if !Arc::ptr_eq(callee, ctx.realm().fun_call()) || self.constructing {
            return AttachDecision::NoAction;
        }
        let Value::Object(target) = &self.inputs[1] else {
            return AttachDecision::NoAction;
        };
        let Some(target_fun) = target.as_function() else {
            return AttachDecision::NoAction;
        };
        let Some(script) = &target_fun.script else {
            return AttachDecision::NoAction;
        };
        if !script.has_compiled_entry() {
            return AttachDecision::TemporarilyUnoptimizable;
        }

        let (mut writer, ids) = self.writer();
        let callee_id = writer.guard_to_object(ids[0]);
        writer.guard_specific_function(
            callee_id,
            callee,
            callee.as_function().map_or(0, |f| f.nargs_and_flags_word()),
        );
        let target_id = writer.guard_to_object(ids[1]);
        writer.guard_specific_function(target_id, target, target_fun.nargs_and_flags_word());
        writer.guard_function_has_jit_entry(target_id);
        writer.guard_not_class_constructor(target_id);
        let flags = CallFlags {
            format: ArgFormat::FunCall,
            constructing: false,
            same_realm: ctx.same_realm(&target.shape()),
        };
        writer.call_scripted_function(target_id, flags, self.argc().saturating_sub(1));
        writer.return_from_ic();
        self.result = shared::finish("Call.ScriptedFunCall", writer);
        AttachDecision::Attach
    }

    /// `f.apply(thisArg, argsArray)` over a packed array.
    fn try_attach_fun_apply(
        &mut self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> AttachDecision {
        if !Arc::ptr_eq(callee, ctx.realm().fun_apply()) || self.constructing || self.argc() != 2 {
            return AttachDecision::NoAction;
        }
        let Value::Object(target) = &self.inputs[1] else {
            return AttachDecision::NoAction;
        };
        let Some(target_fun) = target.as_function() else {
            return AttachDecision::NoAction;
        };
        let Some(script) = &target_fun.script else {
            return AttachDecision::NoAction;
        };
        if !script.has_compiled_entry() {
            return AttachDecision::TemporarilyUnoptimizable;
        }
        let Value::Object(array) = &self.inputs[3] else {
            return AttachDecision::NoAction;
        };
        if array.class_kind() != ClassKind::Array || !array.is_packed() {
            return AttachDecision::NoAction;
        }

        let (mut writer, ids) = self.writer();
        let callee_id = writer.guard_to_object(ids[0]);
        writer.guard_specific_function(
            callee_id,
            callee,
            callee.as_function().map_or(0, |f| f.nargs_and_flags_word()),
        );
        let target_id = writer.guard_to_object(ids[1]);
        writer.guard_specific_function(target_id, target, target_fun.nargs_and_flags_word());
        writer.guard_function_has_jit_entry(target_id);
        writer.guard_not_class_constructor(target_id);
        let array_id = writer.guard_to_object(ids[3]);
        writer.guard_class(array_id, ClassKind::Array);
        writer.guard_array_is_packed(array_id);
        let flags = CallFlags {
            format: ArgFormat::FunApplyArray,
            constructing: false,
            same_realm: ctx.same_realm(&target.shape()),
        };
        writer.call_scripted_function(target_id, flags, self.argc());
        writer.return_from_ic();
        self.result = shared::finish("Call.ScriptedFunApply", writer);
        AttachDecision::Attach
    }

    fn try_attach_bound(
        &mut self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> AttachDecision {
        let Some(bound) = callee.as_bound_function() else {
            return AttachDecision::NoAction;
        };
        if self.constructing {
            return AttachDecision::NoAction;
        }
        let Some(target_fun) = bound.target.as_function() else {
            return AttachDecision::NoAction;
        };
        let Some(script) = &target_fun.script else {
            return AttachDecision::NoAction;
        };
        if !script.has_compiled_entry() {
            return AttachDecision::TemporarilyUnoptimizable;
        }
        let num_bound = bound.bound_args.len();
        if num_bound > u8::MAX as usize {
            return AttachDecision::NoAction;
        }

        let (mut writer, ids) = self.writer();
        let callee_id = writer.guard_to_object(ids[0]);
        writer.guard_specific_object(callee_id, callee);
        writer.call_bound_scripted_function(
            callee_id,
            self.standard_flags(ctx, callee),
            self.argc(),
            num_bound as u8,
        );
        writer.return_from_ic();
        self.result = shared::finish("Call.BoundScripted", writer);
        AttachDecision::Attach
    }

    fn try_attach_scripted(
        &mut self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> AttachDecision {
        let Some(fun) = callee.as_function() else {
            return AttachDecision::NoAction;
        };
        let Some(script) = fun.script.clone() else {
            return AttachDecision::NoAction;
        };
        if !script.has_compiled_entry() {
            return AttachDecision::TemporarilyUnoptimizable;
        }
        if fun.is_class_constructor && !self.constructing {
            // Calling a class constructor without `new` throws in the
            // fallback.
            return AttachDecision::NoAction;
        }

        let (mut writer, ids) = self.writer();
        let callee_id = writer.guard_to_object(ids[0]);
        if fun.name.is_some() {
            writer.guard_specific_function(callee_id, callee, fun.nargs_and_flags_word());
        } else {
            // Anonymous functions are cloned per evaluation; keying on
            // the script lets every clone share the stub.
            writer.guard_function_script(callee_id, &script, fun.nargs_and_flags_word());
        }
        writer.guard_function_has_jit_entry(callee_id);
        let name = if self.constructing {
            writer.meta_scripted_this_shape(&self.template_this_shape(ctx, callee));
            "Call.ScriptedConstructor"
        } else {
            writer.guard_not_class_constructor(callee_id);
            "Call.ScriptedFunction"
        };
        writer.call_scripted_function(callee_id, self.standard_flags(ctx, callee), self.argc());
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    fn try_attach_native(
        &mut self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> AttachDecision {
        let Some(fun) = callee.as_function() else {
            return AttachDecision::NoAction;
        };
        if fun.native.is_none() || self.constructing {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let callee_id = writer.guard_to_object(ids[0]);
        writer.guard_specific_function(callee_id, callee, fun.nargs_and_flags_word());
        writer.call_native_function(callee_id, self.standard_flags(ctx, callee), self.argc());
        writer.return_from_ic();
        self.result = shared::finish("Call.NativeFunction", writer);
        AttachDecision::Attach
    }

    /// Shape for the `this` object a constructing call will create,
    /// derived from the callee's `prototype` property.
    fn template_this_shape(
        &self,
        ctx: &GenerationContext<'_>,
        callee: &ObjectRef,
    ) -> Arc<ferret_object::Shape> {
        let key = PropertyKey::Atom(ctx.realm().intern("prototype"));
        let proto = callee
            .shape()
            .property(&key)
            .filter(|info| info.kind == PropertyKind::Data)
            .and_then(|info| callee.read_slot(info.slot).as_object().cloned())
            .unwrap_or_else(|| ctx.realm().object_prototype().clone());
        ctx.realm().base_shape(ClassKind::Plain, Some(&proto))
    }
}

impl IrGenerator for CallIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::Call
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        if mode != ICMode::Specialized {
            // Call sites hold per-callee stubs or nothing at all.
            return AttachDecision::NoAction;
        }
        if usize::from(self.argc()) > MAX_SPECIALIZED_ARGS {
            return AttachDecision::NoAction;
        }
        let Value::Object(callee) = self.inputs[0].clone() else {
            return AttachDecision::NoAction;
        };
        try_attach!(self.try_attach_fun_call(ctx, &callee));
        try_attach!(self.try_attach_fun_apply(ctx, &callee));
        try_attach!(self.try_attach_bound(ctx, &callee));
        try_attach!(self.try_attach_scripted(ctx, &callee));
        try_attach!(self.try_attach_native(ctx, &callee));
        AttachDecision::NoAction
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
