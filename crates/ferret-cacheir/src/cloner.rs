//! Stream cloning.
//!
//! A stub attached at one site can seed another site with the same
//! access pattern. The instruction bytes copy verbatim; stub fields are
//! re-read and re-interned so the new stub owns its own references.
//! Cloning fails if any weakly-held field has been swept, since the
//! resulting stub could never pass its own guards.
//!
//! Because fields re-intern in first-reference order, the cloned code is
//! byte-identical to the source and the offsets line up without any
//! remapping.

use crate::error::{CacheIrError, CacheIrResult};
use crate::reader::{CacheIrReader, DecodedArg};
use crate::stub_field::{FieldCursor, FieldStore, StubField};
use crate::writer::CacheIrStream;

/// Clone raw stream parts into a fresh, independently-owned stream.
pub fn clone_stream(
    code: &[u8],
    fields: &[StubField],
    input_count: u16,
) -> CacheIrResult<CacheIrStream> {
    let mut reader = CacheIrReader::new(code);
    let mut cursor = FieldCursor::new(fields);
    let mut out_code = Vec::with_capacity(code.len());
    let mut out_fields = FieldStore::new();
    let mut ops = Vec::new();

    loop {
        if reader.done() {
            return Err(CacheIrError::MissingTerminal);
        }
        let op = reader.read_op()?;
        ops.push(op);
        out_code.push(op as u8);
        for arg in op.args() {
            match reader.read_arg(arg.ty)? {
                DecodedArg::Id(id) => out_code.extend_from_slice(&id.to_le_bytes()),
                DecodedArg::Byte(byte) => out_code.push(byte),
                DecodedArg::Int32(value) => out_code.extend_from_slice(&value.to_le_bytes()),
                DecodedArg::UInt32(value) => out_code.extend_from_slice(&value.to_le_bytes()),
                DecodedArg::Field(offset) => {
                    let field = cursor.read(offset)?.checked_clone()?;
                    let new_offset = out_fields.intern(field);
                    debug_assert_eq!(new_offset, offset);
                    out_code.push(new_offset.word());
                }
            }
        }
        if op.is_terminal() {
            break;
        }
    }

    if !reader.done() {
        return Err(CacheIrError::TrailingBytes { count: reader.remaining() });
    }

    Ok(CacheIrStream::from_raw_parts(
        out_code,
        out_fields.into_fields(),
        input_count,
        ops,
    ))
}

/// Clone a finished stream.
pub fn clone_ir(stream: &CacheIrStream) -> CacheIrResult<CacheIrStream> {
    clone_stream(stream.code(), stream.fields(), stream.input_count())
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify_stream;
    use crate::writer::CacheIrWriter;
    use ferret_object::{ClassKind, RealmId, Shape};
    use std::sync::Arc;

    fn sample_stream() -> (CacheIrStream, Arc<Shape>) {
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_shape(obj, &shape);
        let proto = writer.load_proto(obj);
        writer.guard_shape(proto, &shape);
        writer.load_dynamic_slot_result(proto, 2);
        writer.return_from_ic();
        (writer.finish().expect("stream should finish"), shape)
    }

    #[test]
    fn test_clone_is_byte_identical() {
        let (stream, _shape) = sample_stream();
        let cloned = clone_ir(&stream).expect("clone should succeed");

        assert_eq!(cloned.code(), stream.code());
        assert_eq!(cloned.ops(), stream.ops());
        assert_eq!(cloned.field_types(), stream.field_types());
        assert_eq!(cloned.input_count(), stream.input_count());
        assert_eq!(verify_stream(&cloned), Ok(()));
    }

    #[test]
    fn test_clone_preserves_dedup() {
        let (stream, _shape) = sample_stream();
        // guard_shape referenced twice, one weak-shape field plus one raw
        // word for the slot.
        assert_eq!(stream.fields().len(), 2);
        let cloned = clone_ir(&stream).expect("clone should succeed");
        assert_eq!(cloned.fields().len(), 2);
    }

    #[test]
    fn test_clone_fails_on_cleared_weak_field() {
        let (stream, shape) = sample_stream();
        drop(shape);
        // The stream itself still decodes; only the field copy fails.
        let err = clone_ir(&stream).expect_err("clone should fail");
        assert_eq!(err, CacheIrError::ClearedWeakReference { what: "weak shape" });
    }
}
