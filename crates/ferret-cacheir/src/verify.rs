//! Stream verification.
//!
//! Streams are forward-only and single-assignment: operand ids are
//! handed out monotonically, an instruction may only reference ids that
//! already exist, and defining instructions take exactly the next id.
//! That reduces use-before-def checking to a watermark scan: walking the
//! arguments in encoding order, a defining argument must carry exactly
//! the watermark id and bumps it, while every other id argument must sit
//! strictly below the watermark.
//!
//! Field references get the same treatment through [`FieldCursor`],
//! since the writer interns fields in first-reference order.
//!
//! The writer cannot produce a stream that fails these checks; they run
//! as debug assertions at attach time and guard decoding of any stream
//! that crossed a trust boundary.

use crate::error::{CacheIrError, CacheIrResult};
use crate::reader::{CacheIrReader, DecodedArg};
use crate::stub_field::{FieldCursor, StubField};
use crate::writer::CacheIrStream;

/// Check a finished stream.
pub fn verify_stream(stream: &CacheIrStream) -> CacheIrResult<()> {
    verify(stream.code(), stream.fields(), stream.input_count())
}

/// Check raw stream parts.
///
/// Validates opcode bytes, argument framing, the operand watermark rule,
/// field-reference order and range, and the single trailing terminator.
pub fn verify(code: &[u8], fields: &[StubField], input_count: u16) -> CacheIrResult<()> {
    let mut reader = CacheIrReader::new(code);
    let mut cursor = FieldCursor::new(fields);
    let mut watermark = input_count;

    loop {
        if reader.done() {
            return Err(CacheIrError::MissingTerminal);
        }
        let op = reader.read_op()?;
        for arg in op.args() {
            match reader.read_arg(arg.ty)? {
                DecodedArg::Id(id) => {
                    if arg.defines_operand() {
                        if id != watermark {
                            return Err(CacheIrError::ForwardOperandReference {
                                op: op.name(),
                                id,
                                defined: watermark,
                            });
                        }
                        watermark += 1;
                    } else if id >= watermark {
                        return Err(CacheIrError::ForwardOperandReference {
                            op: op.name(),
                            id,
                            defined: watermark,
                        });
                    }
                }
                DecodedArg::Field(offset) => {
                    cursor.read(offset)?;
                }
                DecodedArg::Byte(_) | DecodedArg::Int32(_) | DecodedArg::UInt32(_) => {}
            }
        }
        if op.is_terminal() {
            break;
        }
    }

    if !reader.done() {
        return Err(CacheIrError::TrailingBytes { count: reader.remaining() });
    }
    Ok(())
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::CacheOp;
    use crate::writer::CacheIrWriter;
    use ferret_object::{ClassKind, RealmId, Shape};

    fn terminated(mut body: Vec<u8>) -> Vec<u8> {
        body.push(CacheOp::ReturnFromIC as u8);
        body
    }

    #[test]
    fn test_writer_output_verifies() {
        let shape = Shape::base(RealmId::new(0), ClassKind::Plain, None);
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_shape(obj, &shape);
        let proto = writer.load_proto(obj);
        writer.guard_shape(proto, &shape);
        writer.load_fixed_slot_result(proto, 0);
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");

        assert_eq!(verify_stream(&stream), Ok(()));
    }

    #[test]
    fn test_forward_reference_rejected() {
        // GuardToObject on id 5 with only one input defined.
        let code = terminated(vec![CacheOp::GuardToObject as u8, 5, 0]);
        assert_eq!(
            verify(&code, &[], 1),
            Err(CacheIrError::ForwardOperandReference {
                op: "GuardToObject",
                id: 5,
                defined: 1,
            })
        );
    }

    #[test]
    fn test_definition_must_take_next_id() {
        // LoadProto defining id 3 when the next id is 1.
        let code = terminated(vec![CacheOp::LoadProto as u8, 0, 0, 3, 0]);
        assert!(matches!(
            verify(&code, &[], 1),
            Err(CacheIrError::ForwardOperandReference { id: 3, .. })
        ));

        // Taking exactly the next id is fine.
        let code = terminated(vec![CacheOp::LoadProto as u8, 0, 0, 1, 0]);
        assert_eq!(verify(&code, &[], 1), Ok(()));
    }

    #[test]
    fn test_use_at_watermark_rejected() {
        // GuardToObject reading id 1 with only input 0 defined: the id
        // sits at the watermark but nothing has defined it.
        let code = terminated(vec![CacheOp::GuardToObject as u8, 1, 0]);
        assert_eq!(
            verify(&code, &[], 1),
            Err(CacheIrError::ForwardOperandReference {
                op: "GuardToObject",
                id: 1,
                defined: 1,
            })
        );
    }

    #[test]
    fn test_missing_terminal() {
        let code = vec![CacheOp::GuardToObject as u8, 0, 0];
        assert_eq!(verify(&code, &[], 1), Err(CacheIrError::MissingTerminal));
        assert_eq!(verify(&[], &[], 0), Err(CacheIrError::MissingTerminal));
    }

    #[test]
    fn test_trailing_bytes_after_terminal() {
        let code = vec![CacheOp::ReturnFromIC as u8, CacheOp::ReturnFromIC as u8];
        assert_eq!(verify(&code, &[], 0), Err(CacheIrError::TrailingBytes { count: 1 }));
    }

    #[test]
    fn test_field_reference_order() {
        let fields = vec![StubField::RawWord(1), StubField::RawWord(2)];

        // First reference must be offset 0, not 1.
        let code = terminated(vec![CacheOp::LoadFixedSlotResult as u8, 0, 0, 1]);
        assert_eq!(
            verify(&code, &fields, 1),
            Err(CacheIrError::NonMonotonicFieldRead { offset: 1, seen: 0 })
        );

        // In order is fine.
        let code = terminated(vec![
            CacheOp::LoadFixedSlotResult as u8,
            0,
            0,
            0,
            CacheOp::LoadFixedSlotResult as u8,
            0,
            0,
            1,
        ]);
        assert_eq!(verify(&code, &fields, 1), Ok(()));
    }

    #[test]
    fn test_field_reference_range() {
        let code = terminated(vec![CacheOp::LoadFixedSlotResult as u8, 0, 0, 0]);
        assert_eq!(
            verify(&code, &[], 1),
            Err(CacheIrError::FieldOffsetOutOfRange { offset: 0, len: 0 })
        );
    }

    #[test]
    fn test_unknown_opcode_and_truncation() {
        assert_eq!(
            verify(&[0xfe], &[], 0),
            Err(CacheIrError::UnknownOpcode { byte: 0xfe, offset: 0 })
        );
        assert_eq!(
            verify(&[CacheOp::GuardToObject as u8, 0], &[], 1),
            Err(CacheIrError::TruncatedStream { offset: 1 })
        );
    }
}
