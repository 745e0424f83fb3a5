//! Property-write generator, serving `obj.prop = v`, `obj[key] = v` and
//! the two-phase add-slot flow.
//!
//! A write that adds a new property cannot attach on the first miss:
//! the transition target shape does not exist until the fallback runs
//! the define. The first probe pass answers
//! [`AttachDecision::Deferred`]; the engine completes the write, then
//! re-enters through [`SetPropIrGenerator::for_add_slot`], which can
//! read the old and new shapes off the finished transition.

use std::sync::Arc;

use smallvec::SmallVec;

use ferret_cacheir::operand::ValOperandId;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::shape::{
    DYNAMIC_SLOT_CHUNK, PropertyInfo, PropertyKind, Shape, SlotLocation,
};
use ferret_object::{ObjectRef, PropertyKey, PropertyLocation, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{CacheKey, IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one property-write miss.
pub struct SetPropIrGenerator {
    key: CacheKey,
    strict: bool,
    inputs: SmallVec<[Value; 3]>,
    /// Receiver shape before the fallback ran, in add-slot mode.
    old_shape: Option<Arc<Shape>>,
    result: Option<(&'static str, CacheIrStream)>,
}

struct Ids {
    receiver: ValOperandId,
    key: Option<ValOperandId>,
    rhs: ValOperandId,
}

impl SetPropIrGenerator {
    /// First-pass probing for a write of `rhs` to `key` on `receiver`.
    pub fn new(receiver: Value, key: CacheKey, rhs: Value, strict: bool) -> Self {
        let mut inputs = SmallVec::new();
        inputs.push(receiver);
        if let CacheKey::Value(value) = &key {
            inputs.push(value.clone());
        }
        inputs.push(rhs);
        Self { key, strict, inputs, old_shape: None, result: None }
    }

    /// Second-pass entry after a deferred define completed. `old_shape`
    /// is the receiver's shape before the transition.
    pub fn for_add_slot(
        receiver: ObjectRef,
        key: PropertyKey,
        rhs: Value,
        old_shape: Arc<Shape>,
    ) -> Self {
        let mut generator =
            Self::new(Value::Object(receiver), CacheKey::Constant(key), rhs, false);
        generator.old_shape = Some(old_shape);
        generator
    }

    fn receiver_object(&self) -> Option<&ObjectRef> {
        self.inputs[0].as_object()
    }

    fn writer(&self) -> (CacheIrWriter, Ids) {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let key = self.key.is_by_value().then(|| writer.input_value());
        let rhs = writer.input_value();
        (writer, Ids { receiver, key, rhs })
    }

    // -----------------------------------------------------------------------
    // Probes
    // -----------------------------------------------------------------------

    fn try_attach_proxy(&mut self, receiver: &ObjectRef) -> AttachDecision {
        if !receiver.is_proxy() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_is_proxy(obj_id);
        let name = match (&self.key, ids.key) {
            (CacheKey::Constant(key), _) => {
                writer.proxy_set(obj_id, key, ids.rhs, self.strict);
                "SetProp.Proxy"
            }
            (CacheKey::Value(_), Some(key_id)) => {
                writer.proxy_set_by_value(obj_id, key_id, ids.rhs, self.strict);
                "SetProp.ProxyByValue"
            }
            (CacheKey::Value(_), None) => return AttachDecision::NoAction,
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    fn try_attach_dense_element(&mut self, receiver: &ObjectRef) -> AttachDecision {
        let CacheKey::Value(key) = &self.key else {
            return AttachDecision::NoAction;
        };
        let Some(PropertyKey::Index(index)) = shared::value_to_lookup_key(key) else {
            return AttachDecision::NoAction;
        };
        if !receiver.is_native() {
            return AttachDecision::NoAction;
        }
        let update = receiver.element(index).is_some();
        let append = !update
            && index == receiver.elements_len()
            && receiver.shape().is_extensible();
        if !update && !append {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let Some(key_id) = ids.key else {
            return AttachDecision::NoAction;
        };
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_shape(obj_id, &receiver.shape());
        let index_id = writer.guard_to_int32_index(key_id);
        let name = if update {
            writer.store_dense_element(obj_id, index_id, ids.rhs);
            "SetProp.DenseElement"
        } else {
            writer.guard_is_extensible(obj_id);
            writer.guard_index_is_valid_update_or_add(obj_id, index_id);
            writer.store_dense_element_hole(obj_id, index_id, ids.rhs, true);
            "SetProp.DenseElementAdd"
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    fn try_attach_native_property(
        &mut self,
        ctx: &mut GenerationContext<'_>,
        receiver: &ObjectRef,
    ) -> AttachDecision {
        let Some(key) = self.key.lookup_key() else {
            return AttachDecision::NoAction;
        };
        if key.is_index() {
            return AttachDecision::NoAction;
        }
        let Some(location) = ctx.pure_lookup(receiver, &key) else {
            return AttachDecision::NoAction;
        };
        match location {
            PropertyLocation::Own { info } => match info.kind {
                PropertyKind::Data => {
                    if !info.attrs.writable {
                        return AttachDecision::NoAction;
                    }
                    let (mut writer, ids) = self.writer();
                    let obj_id = writer.guard_to_object(ids.receiver);
                    writer.guard_shape(obj_id, &receiver.shape());
                    shared::emit_slot_store(&mut writer, obj_id, info.slot, ids.rhs);
                    writer.return_from_ic();
                    self.result = shared::finish("SetProp.OwnSlot", writer);
                    AttachDecision::Attach
                }
                PropertyKind::Accessor => self.attach_setter(ctx, receiver, receiver, info),
            },
            PropertyLocation::OnProto { holder, info, .. } => match info.kind {
                PropertyKind::Accessor => self.attach_setter(ctx, receiver, &holder, info),
                // Assigning over an inherited data property adds an own
                // property; that is the deferred add-slot flow.
                PropertyKind::Data => {
                    if info.attrs.writable {
                        AttachDecision::Deferred
                    } else {
                        AttachDecision::NoAction
                    }
                }
            },
            PropertyLocation::Missing => {
                if receiver.shape().is_extensible() {
                    AttachDecision::Deferred
                } else {
                    AttachDecision::NoAction
                }
            }
            PropertyLocation::OwnElement { .. }
            | PropertyLocation::OnProtoElement { .. }
            | PropertyLocation::NotPure => AttachDecision::NoAction,
        }
    }

    fn attach_setter(
        &mut self,
        ctx: &GenerationContext<'_>,
        receiver: &ObjectRef,
        holder: &ObjectRef,
        info: PropertyInfo,
    ) -> AttachDecision {
        let (_, setter) = holder.accessor_pair(info);
        let Some(setter) = setter else {
            // Getter-only property; strict mode throws in the fallback.
            return AttachDecision::NoAction;
        };
        let Some(fun) = setter.as_function() else {
            return AttachDecision::NoAction;
        };
        let same_realm = ctx.same_realm(&setter.shape());
        let scripted = match (&fun.script, fun.native) {
            (Some(script), _) => {
                if !script.has_compiled_entry() {
                    return AttachDecision::TemporarilyUnoptimizable;
                }
                true
            }
            (None, Some(_)) => false,
            (None, None) => return AttachDecision::NoAction,
        };
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        shared::emit_holder_guards(&mut writer, obj_id, receiver, holder, ctx);
        let name = if scripted {
            writer.call_scripted_setter(obj_id, &setter, ids.rhs, same_realm);
            "SetProp.ScriptedSetter"
        } else {
            writer.call_native_setter(obj_id, &setter, ids.rhs, same_realm);
            "SetProp.NativeSetter"
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    /// Add-slot attach, after the fallback completed the transition.
    /// Guarded on the old shape, so other objects still carrying it
    /// take the same fast path.
    fn try_attach_add_slot(&mut self) -> AttachDecision {
        let Some(old_shape) = self.old_shape.clone() else {
            return AttachDecision::NoAction;
        };
        let Some(receiver) = self.receiver_object().cloned() else {
            return AttachDecision::NoAction;
        };
        let Some(key) = self.key.lookup_key() else {
            return AttachDecision::NoAction;
        };
        // Adding to an object other code inherits from would need
        // shadowing invalidation; leave those to the fallback.
        if old_shape.is_used_as_prototype() {
            return AttachDecision::NoAction;
        }
        let new_shape = receiver.shape();
        if new_shape.last_added() != Some(&key) {
            return AttachDecision::NoAction;
        }
        let Some(info) = new_shape.property(&key) else {
            return AttachDecision::NoAction;
        };
        if info.kind != PropertyKind::Data {
            return AttachDecision::NoAction;
        }

        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_shape(obj_id, &old_shape);
        // The old shape pins the proto link; guard the rest of the
        // chain so no setter or shadowing entry appeared on it.
        let mut current = receiver.proto();
        let mut current_id = obj_id;
        while let Some(link) = current {
            current_id = writer.load_proto(current_id);
            writer.guard_shape(current_id, &link.shape());
            current = link.proto();
        }
        let name = match info.slot {
            SlotLocation::Fixed(index) => {
                writer.add_and_store_fixed_slot(obj_id, u64::from(index), ids.rhs, &new_shape);
                "SetProp.AddSlot"
            }
            SlotLocation::Dynamic(index) => {
                let old_span = old_shape.dynamic_slot_span();
                let capacity = old_span.div_ceil(u32::from(DYNAMIC_SLOT_CHUNK))
                    * u32::from(DYNAMIC_SLOT_CHUNK);
                if u32::from(index) < capacity {
                    writer.add_and_store_dynamic_slot(
                        obj_id,
                        u64::from(index),
                        ids.rhs,
                        &new_shape,
                    );
                    "SetProp.AddSlot"
                } else {
                    writer.allocate_and_store_dynamic_slot(
                        obj_id,
                        u64::from(index),
                        ids.rhs,
                        &new_shape,
                        u64::from(DYNAMIC_SLOT_CHUNK),
                    );
                    "SetProp.AllocSlot"
                }
            }
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    fn try_attach_megamorphic(&mut self) -> AttachDecision {
        let Some(receiver) = self.receiver_object() else {
            return AttachDecision::NoAction;
        };
        if receiver.is_proxy() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_is_native_object(obj_id);
        let name = match (&self.key, ids.key) {
            (CacheKey::Constant(key), _) => {
                writer.megamorphic_store_slot(obj_id, key, ids.rhs, self.strict);
                "SetProp.Megamorphic"
            }
            (CacheKey::Value(_), Some(key_id)) => {
                writer.megamorphic_set_element(obj_id, key_id, ids.rhs, self.strict);
                "SetProp.MegamorphicSetElement"
            }
            (CacheKey::Value(_), None) => return AttachDecision::NoAction,
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for SetPropIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::SetProp
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        match mode {
            ICMode::Generic => AttachDecision::NoAction,
            ICMode::Megamorphic => self.try_attach_megamorphic(),
            ICMode::Specialized => {
                if self.old_shape.is_some() {
                    return self.try_attach_add_slot();
                }
                let Some(receiver) = self.receiver_object().cloned() else {
                    return AttachDecision::NoAction;
                };
                try_attach!(self.try_attach_proxy(&receiver));
                try_attach!(self.try_attach_dense_element(&receiver));
                try_attach!(self.try_attach_native_property(ctx, &receiver));
                AttachDecision::NoAction
            }
        }
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
