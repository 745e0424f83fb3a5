//! Guard-emission helpers shared by the generators.

use std::sync::Arc;

use ferret_cacheir::operand::{ObjOperandId, ValOperandId};
use ferret_cacheir::writer::{CacheIrStream, CacheIrWriter};
use ferret_object::shape::SlotLocation;
use ferret_object::{ObjectRef, PropertyKey, Value};

use crate::context::GenerationContext;

/// Property key for a computed access, when the key's tag supports
/// caching at all.
pub(crate) fn value_to_lookup_key(value: &Value) -> Option<PropertyKey> {
    match value {
        Value::Int32(i) if *i >= 0 => Some(PropertyKey::Index(*i as u32)),
        Value::String(atom) => Some(PropertyKey::from_atom(atom.clone())),
        Value::Symbol(sym) => Some(PropertyKey::Symbol(sym.clone())),
        _ => None,
    }
}

/// Wrap up a stream under its stub name. A poisoned writer reads as
/// "nothing to attach".
pub(crate) fn finish(
    name: &'static str,
    writer: CacheIrWriter,
) -> Option<(&'static str, CacheIrStream)> {
    writer.finish().map(|stream| (name, stream))
}

/// Whether the two-guard teleporting pattern is sound for this
/// receiver/holder pair: every object from the receiver up to and
/// including the holder must still participate in teleportation and
/// live in the context's realm.
pub(crate) fn teleport_ok(
    receiver: &ObjectRef,
    holder: &ObjectRef,
    ctx: &GenerationContext<'_>,
) -> bool {
    let mut current = Arc::clone(receiver);
    loop {
        let shape = current.shape();
        if shape.is_teleporting_invalidated() || !ctx.same_realm(&shape) {
            return false;
        }
        if Arc::ptr_eq(&current, holder) {
            return true;
        }
        match current.proto() {
            Some(next) => current = next,
            None => return false,
        }
    }
}

/// Emit the guards proving the receiver still reaches `holder` with the
/// lookup unshadowed, and return the holder's operand.
///
/// The cheap form guards two shapes: the receiver's (which pins its
/// proto link) and the holder's, leaning on shape teleportation to
/// reshape receivers whenever an intermediate link mutates. When any
/// chain object has opted out of teleporting, or the chain crosses a
/// realm, every link gets an explicit proto load and shape guard.
pub(crate) fn emit_holder_guards(
    writer: &mut CacheIrWriter,
    obj_id: ObjOperandId,
    receiver: &ObjectRef,
    holder: &ObjectRef,
    ctx: &GenerationContext<'_>,
) -> ObjOperandId {
    if Arc::ptr_eq(receiver, holder) {
        writer.guard_shape(obj_id, &receiver.shape());
        return obj_id;
    }
    if teleport_ok(receiver, holder, ctx) {
        writer.guard_shape(obj_id, &receiver.shape());
        let holder_id = writer.load_object(holder);
        writer.guard_shape(holder_id, &holder.shape());
        return holder_id;
    }
    writer.guard_shape(obj_id, &receiver.shape());
    let mut current = Arc::clone(receiver);
    let mut current_id = obj_id;
    while !Arc::ptr_eq(&current, holder) {
        // teleport_ok already walked this chain; the link exists.
        let Some(next) = current.proto() else {
            break;
        };
        current_id = writer.load_proto(current_id);
        writer.guard_shape(current_id, &next.shape());
        current = next;
    }
    current_id
}

/// Emit shape guards over the receiver's whole prototype chain, pinning
/// the absence of a property. Each shape fixes both the object's own
/// property set and its proto link, so guarding every link covers the
/// full lookup path.
pub(crate) fn emit_absence_guards(
    writer: &mut CacheIrWriter,
    obj_id: ObjOperandId,
    receiver: &ObjectRef,
) {
    writer.guard_shape(obj_id, &receiver.shape());
    let mut current = Arc::clone(receiver);
    let mut current_id = obj_id;
    while let Some(next) = current.proto() {
        current_id = writer.load_proto(current_id);
        writer.guard_shape(current_id, &next.shape());
        current = next;
    }
}

/// Emit the slot-load result op matching a property's location.
pub(crate) fn emit_slot_load(writer: &mut CacheIrWriter, holder_id: ObjOperandId, slot: SlotLocation) {
    match slot {
        SlotLocation::Fixed(index) => writer.load_fixed_slot_result(holder_id, u64::from(index)),
        SlotLocation::Dynamic(index) => writer.load_dynamic_slot_result(holder_id, u64::from(index)),
    }
}

/// Emit the slot store op matching a property's location.
pub(crate) fn emit_slot_store(
    writer: &mut CacheIrWriter,
    obj_id: ObjOperandId,
    slot: SlotLocation,
    rhs: ValOperandId,
) {
    match slot {
        SlotLocation::Fixed(index) => writer.store_fixed_slot(obj_id, u64::from(index), rhs),
        SlotLocation::Dynamic(index) => writer.store_dynamic_slot(obj_id, u64::from(index), rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_cacheir::ops::CacheOp;
    use ferret_object::{Heap, Realm};

    #[test]
    fn test_teleporting_chain_uses_two_guards() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let obj = realm.new_plain_object();
        let holder = realm.object_prototype().clone();
        let ctx = GenerationContext::new(&realm, &heap);
        assert!(teleport_ok(&obj, &holder, &ctx));

        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let obj_id = writer.guard_to_object(input);
        emit_holder_guards(&mut writer, obj_id, &obj, &holder, &ctx);
        writer.load_undefined_result();
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");
        let shape_guards =
            stream.ops().iter().filter(|op| **op == CacheOp::GuardShape).count();
        assert_eq!(shape_guards, 2);
        assert!(!stream.ops().contains(&CacheOp::LoadProto));
    }

    #[test]
    fn test_invalidated_chain_guards_every_link() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let obj = realm.new_plain_object();
        let holder = realm.object_prototype().clone();
        holder.replace_shape(holder.shape().reshaped_invalidated());
        let ctx = GenerationContext::new(&realm, &heap);
        assert!(!teleport_ok(&obj, &holder, &ctx));

        let mut writer = CacheIrWriter::new();
        let input = writer.input_value();
        let obj_id = writer.guard_to_object(input);
        emit_holder_guards(&mut writer, obj_id, &obj, &holder, &ctx);
        writer.load_undefined_result();
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");
        assert!(stream.ops().contains(&CacheOp::LoadProto));
    }

    #[test]
    fn test_cross_realm_chain_guards_every_link() {
        let heap = Heap::new();
        let realm = Realm::new(&heap);
        let other = Realm::new(&heap);
        let foreign = other.new_plain_object();
        let holder = other.object_prototype().clone();
        let ctx = GenerationContext::new(&realm, &heap);
        assert!(!teleport_ok(&foreign, &holder, &ctx));
    }
}
