//! Presence-test generator, serving `key in obj` and `hasOwnProperty`.

use smallvec::SmallVec;

use ferret_cacheir::operand::ValOperandId;
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::{ObjectRef, PropertyKey, PropertyLocation, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{CacheKey, IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;
use crate::try_attach;

/// Probes for one presence-test miss.
pub struct HasPropIrGenerator {
    key: CacheKey,
    /// True for `hasOwnProperty`, false for `in`.
    has_own: bool,
    inputs: SmallVec<[Value; 2]>,
    result: Option<(&'static str, CacheIrStream)>,
}

struct Ids {
    receiver: ValOperandId,
    key: Option<ValOperandId>,
}

impl HasPropIrGenerator {
    /// Presence test of `key` against `receiver`.
    pub fn new(receiver: Value, key: CacheKey, has_own: bool) -> Self {
        let mut inputs = SmallVec::new();
        inputs.push(receiver);
        if let CacheKey::Value(value) = &key {
            inputs.push(value.clone());
        }
        Self { key, has_own, inputs, result: None }
    }

    fn writer(&self) -> (CacheIrWriter, Ids) {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let key = self.key.is_by_value().then(|| writer.input_value());
        (writer, Ids { receiver, key })
    }

    /// Pin a computed key to the value seen now.
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

    fn try_attach_proxy(&mut self, receiver: &ObjectRef) -> AttachDecision {
        if !receiver.is_proxy() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        // The trap takes its key by value; constant-key sites fall back.
        let Some(key_id) = ids.key else {
            return AttachDecision::NoAction;
        };
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_is_proxy(obj_id);
        writer.proxy_has_prop_result(obj_id, key_id, self.has_own);
        writer.return_from_ic();
        self.result = shared::finish("HasProp.Proxy", writer);
        AttachDecision::Attach
    }

    fn try_attach_dense_element(&mut self, receiver: &ObjectRef) -> AttachDecision {
        let CacheKey::Value(key) = &self.key else {
            return AttachDecision::NoAction;
        };
        let Some(PropertyKey::Index(index)) = shared::value_to_lookup_key(key) else {
            return AttachDecision::NoAction;
        };
        if !receiver.is_native() || index >= receiver.elements_len() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        let Some(key_id) = ids.key else {
            return AttachDecision::NoAction;
        };
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_shape(obj_id, &receiver.shape());
        let index_id = writer.guard_to_int32_index(key_id);
        writer.load_dense_element_exists_result(obj_id, index_id);
        writer.return_from_ic();
        self.result = shared::finish("HasProp.DenseElement", writer);
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
            PropertyLocation::Own { .. } => self.attach_boolean(receiver, &key, None, true),
            PropertyLocation::OnProto { holder, .. } => {
                if self.has_own {
                    // Own shape alone proves the own lookup misses.
                    self.attach_boolean(receiver, &key, None, false)
                } else {
                    self.attach_found_on_proto(ctx, receiver, &holder, &key)
                }
            }
            PropertyLocation::Missing => {
                if self.has_own {
                    self.attach_boolean(receiver, &key, None, false)
                } else {
                    self.attach_boolean(receiver, &key, Some(receiver), false)
                }
            }
            PropertyLocation::OwnElement { .. }
            | PropertyLocation::OnProtoElement { .. }
            | PropertyLocation::NotPure => AttachDecision::NoAction,
        }
    }

    /// Attach a constant-answer stub. With `absence_root` set, the whole
    /// prototype chain below it gets shape guards; otherwise only the
    /// receiver's shape is pinned.
    fn attach_boolean(
        &mut self,
        receiver: &ObjectRef,
        key: &PropertyKey,
        absence_root: Option<&ObjectRef>,
        answer: bool,
    ) -> AttachDecision {
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        self.emit_key_guard(&mut writer, &ids, key);
        match absence_root {
            Some(root) => shared::emit_absence_guards(&mut writer, obj_id, root),
            None => writer.guard_shape(obj_id, &receiver.shape()),
        }
        writer.load_boolean_result(answer);
        writer.return_from_ic();
        let name = if answer { "HasProp.Present" } else { "HasProp.Absent" };
        self.result = shared::finish(name, writer);
        AttachDecision::Attach
    }

    fn attach_found_on_proto(
        &mut self,
        ctx: &GenerationContext<'_>,
        receiver: &ObjectRef,
        holder: &ObjectRef,
        key: &PropertyKey,
    ) -> AttachDecision {
        let (mut writer, ids) = self.writer();
        let obj_id = writer.guard_to_object(ids.receiver);
        self.emit_key_guard(&mut writer, &ids, key);
        shared::emit_holder_guards(&mut writer, obj_id, receiver, holder, ctx);
        writer.load_boolean_result(true);
        writer.return_from_ic();
        self.result = shared::finish("HasProp.PresentOnProto", writer);
        AttachDecision::Attach
    }

    fn try_attach_megamorphic(&mut self) -> AttachDecision {
        let Value::Object(receiver) = &self.inputs[0] else {
            return AttachDecision::NoAction;
        };
        if receiver.is_proxy() {
            return AttachDecision::NoAction;
        }
        let (mut writer, ids) = self.writer();
        // The hash-lookup op takes its key by value; constant-key sites
        // stay specialized or go generic.
        let Some(key_id) = ids.key else {
            return AttachDecision::NoAction;
        };
        let obj_id = writer.guard_to_object(ids.receiver);
        writer.guard_is_native_object(obj_id);
        writer.megamorphic_has_prop_result(obj_id, key_id, self.has_own);
        writer.return_from_ic();
        self.result = shared::finish("HasProp.Megamorphic", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for HasPropIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::HasProp
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        match mode {
            ICMode::Generic => AttachDecision::NoAction,
            ICMode::Megamorphic => self.try_attach_megamorphic(),
            ICMode::Specialized => {
                let Value::Object(receiver) = self.inputs[0].clone() else {
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
