//! Property-read generator, serving `obj.prop` and `obj[key]`.

use std::sync::Arc;

use smallvec::SmallVec;

use ferret_cacheir::operand::ValOperandId;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::shape::{ClassKind, PropertyInfo, PropertyKind};
use ferret_object::{ObjectRef, PropertyKey, PropertyLocation, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{CacheKey, IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one property-read miss.
pub struct GetPropIrGenerator {
    key: CacheKey,
    inputs: SmallVec<[Value; 2]>,
    result: Option<(&'static str, CacheIrStream)>,
}

/// Declared inputs of one stream under construction.
struct Ids {
    receiver: ValOperandId,
    key: Option<ValOperandId>,
}

impl GetPropIrGenerator {
    /// By-name or by-value read of `key` off `receiver`.
    pub fn new(receiver: Value, key: CacheKey) -> Self {
        let mut inputs = SmallVec::new();
        inputs.push(receiver);
        if let CacheKey::Value(value) = &key {
            inputs.push(value.clone());
        }
        Self { key, inputs, result: None }
    }

    fn receiver(&self) -> &Value {
        &self.inputs[0]
    }

    /// Fresh writer with this site's inputs declared.
    fn writer(&self) -> (CacheIrWriter, Ids) {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let key = self.key.is_by_value().then(|| writer.input_value());
        (writer, Ids { receiver, key })
    }

    fn key_is_atom(&self, text: &str) -> bool {
        matches!(self.key.constant(), Some(PropertyKey::Atom(atom)) if atom.as_str() == text)
    }

    /// For computed keys, pin the key operand to the value seen now.
    fn emit_key_guard(&self, writer: &mut CacheIrWriter, ids: &Ids, key: &PropertyKey) {
        let Some(key_id) = ids.key else { return };
        match key {
            PropertyKey::Atom(atom) => {
                let str_id = writer.guard_to_string(key_id);
                writer.guard_specific_atom(str_id, atom);
            }
            PropertyKey::Symbol(sym) => {
                let sym_id = writer.guard_to_symbol(key_id);
                writer.guard_specific_symbol(sym_id, sym);
            }
            PropertyKey::Index(index) => {
                let int_id = writer.guard_to_int32(key_id);
                writer.guard_specific_int32(int_id, *index as i32);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Probes
    // -----------------------------------------------------------------------

    fn try_attach_string_length(&mut self) -> AttachDecision {
        if !matches!(self.receiver(), Value::String(_)) || !self.key_is_atom("length") {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let str_id = writer.guard_to_string(ids.receiver);
        writer.load_string_length_result(str_id);
        writer.return_from_ic();
        self.result = shared::finish("GetProp.StringLength", writer);
        AttachDecision::Attach
    }

    fn try_attach_array_length(&mut self, receiver: &ObjectRef) -> AttachDecision {
        if receiver.class_kind() != ClassKind::Array || !self.key_is_atom("length") {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_class(obj_id, ClassKind::Array);
        writer.load_int32_array_length_result(obj_id);
        writer.return_from_ic();
        self.result = shared::finish("GetProp.ArrayLength", writer);
        AttachDecision::Attach
    }

    fn try_attach_proxy(&mut self, receiver: &ObjectRef) -> AttachDecision {
        if !receiver.is_proxy() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_is_proxy(obj_id);
        let name = match (&self.key, ids.key) {
            (CacheKey::Constant(key), _) => {
                writer.proxy_get_result(obj_id, key);
                "GetProp.Proxy"
            }
            (CacheKey::Value(_), Some(key_id)) => {
                writer.proxy_get_by_value_result(obj_id, key_id);
                "GetProp.ProxyByValue"
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
        if !receiver.is_native() || receiver.element(index).is_none() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let Some(key_id) = ids.key else {
            return AttachDecision::NoAction;
        };
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_shape(obj_id, &receiver.shape());
        let index_id = writer.guard_to_int32_index(key_id);
        writer.load_dense_element_result(obj_id, index_id);
        writer.return_from_ic();
        self.result = shared::finish("GetProp.DenseElement", writer);
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
        let Some(location) = ctx.pure_lookup(receiver, &key) else {
            return AttachDecision::NoAction;
        };
        match location {
            PropertyLocation::Own { info } => {
                self.attach_holder_property(ctx, receiver, receiver, info, &key)
            }
            PropertyLocation::OnProto { holder, info, .. } => {
                self.attach_holder_property(ctx, receiver, &holder, info, &key)
            }
            PropertyLocation::Missing => {
                let (mut writer, ids) = self.writer();
                let obj_id = writer.guard_to_object(ids.receiver);
                self.emit_key_guard(&mut writer, &ids, &key);
                shared::emit_absence_guards(&mut writer, obj_id, receiver);
                writer.load_undefined_result();
                writer.return_from_ic();
                self.result = shared::finish("GetProp.Missing", writer);
                AttachDecision::Attach
            }
            PropertyLocation::OwnElement { .. }
            | PropertyLocation::OnProtoElement { .. }
            | PropertyLocation::NotPure => AttachDecision::NoAction,
        }
    }

    fn attach_holder_property(
        &mut self,
        ctx: &GenerationContext<'_>,
        receiver: &ObjectRef,
        holder: &ObjectRef,
        info: PropertyInfo,
        key: &PropertyKey,
    ) -> AttachDecision {
        match info.kind {
            PropertyKind::Data => {
                let (mut writer, ids) = self.writer();
                let obj_id = writer.guard_to_object(ids.receiver);
                self.emit_key_guard(&mut writer, &ids, key);
                let holder_id =
                    shared::emit_holder_guards(&mut writer, obj_id, receiver, holder, ctx);
                shared::emit_slot_load(&mut writer, holder_id, info.slot);
                writer.return_from_ic();
                let name = if Arc::ptr_eq(receiver, holder) {
                    "GetProp.OwnSlot"
                } else {
                    "GetProp.ProtoSlot"
                };
                self.result = shared::finish(name, writer);
                AttachDecision::Attach
            }
            PropertyKind::Accessor => {
                let (getter, _) = holder.accessor_pair(info);
                let Some(getter) = getter else {
                    // Setter-only property; the read still falls back.
                    return AttachDecision::NoAction;
                };
                let Some(fun) = getter.as_function() else {
                    return AttachDecision::NoAction;
                };
                let same_realm = ctx.same_realm(&getter.shape());
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
                self.emit_key_guard(&mut writer, &ids, key);
                shared::emit_holder_guards(&mut writer, obj_id, receiver, holder, ctx);
                let name = if scripted {
                    writer.call_scripted_getter_result(ids.receiver, &getter, same_realm);
                    "GetProp.ScriptedGetter"
                } else {
                    writer.call_native_getter_result(ids.receiver, &getter, same_realm);
                    "GetProp.NativeGetter"
                };
                writer.return_from_ic();
                self.result = shared::finish(name, writer);
                AttachDecision::Attach
            }
        }
    }

    fn try_attach_megamorphic(&mut self) -> AttachDecision {
        let Value::Object(receiver) = self.receiver() else {
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
                writer.megamorphic_load_slot_result(obj_id, key);
                "GetProp.Megamorphic"
            }
            (CacheKey::Value(_), Some(key_id)) => {
                writer.megamorphic_load_slot_by_value_result(obj_id, key_id);
                "GetProp.MegamorphicByValue"
            }
            (CacheKey::Value(_), None) => return AttachDecision::NoAction,
        };
        writer.return_from_ic();
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for GetPropIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::GetProp
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        match mode {
            ICMode::Generic => AttachDecision::NoAction,
            ICMode::Megamorphic => self.try_attach_megamorphic(),
            ICMode::Specialized => {
                try_attach!(self.try_attach_string_length());
                let Value::Object(receiver) = self.receiver().clone() else {
                    return AttachDecision::NoAction;
                };
                try_attach!(self.try_attach_proxy(&receiver));
                try_attach!(self.try_attach_array_length(&receiver));
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
