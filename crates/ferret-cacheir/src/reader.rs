//! The cache IR reader.
//!
//! A thin, total decoder over an encoded stream. Consumers either read
//! arguments with the typed methods (the evaluator knows each op's
//! schema statically) or drive themselves off the op table with
//! [`CacheIrReader::read_arg`], which is how the verifier and cloner
//! stay schema-generic.

use crate::error::{CacheIrError, CacheIrResult};
use crate::operand::OperandId;
use crate::ops::{ArgType, CacheOp};
use crate::stub_field::FieldOffset;

/// One decoded instruction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedArg {
    /// An operand id, untyped.
    Id(u16),
    /// A one-byte immediate.
    Byte(u8),
    /// A signed 32-bit immediate.
    Int32(i32),
    /// An unsigned 32-bit immediate.
    UInt32(u32),
    /// A stub-field reference.
    Field(FieldOffset),
}

/// Cursor over an encoded IR stream.
pub struct CacheIrReader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> CacheIrReader<'a> {
    /// Reader positioned at the start of `code`.
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pos: 0 }
    }

    /// Current byte position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.code.len() - self.pos
    }

    /// True once the whole stream has been consumed.
    #[inline]
    pub fn done(&self) -> bool {
        self.pos == self.code.len()
    }

    fn take(&mut self, n: usize) -> CacheIrResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.code.len())
            .ok_or(CacheIrError::TruncatedStream { offset: self.pos })?;
        let bytes = &self.code[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Decode the next opcode.
    pub fn read_op(&mut self) -> CacheIrResult<CacheOp> {
        let offset = self.pos;
        let byte = self.read_byte()?;
        CacheOp::from_byte(byte).ok_or(CacheIrError::UnknownOpcode { byte, offset })
    }

    /// Read a raw operand id.
    pub fn read_raw_id(&mut self) -> CacheIrResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a typed operand id.
    pub fn read_id<T: OperandId>(&mut self) -> CacheIrResult<T> {
        Ok(T::from_raw(self.read_raw_id()?))
    }

    /// Read a one-byte immediate.
    pub fn read_byte(&mut self) -> CacheIrResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a boolean immediate.
    pub fn read_bool(&mut self) -> CacheIrResult<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Read a signed 32-bit immediate.
    pub fn read_int32(&mut self) -> CacheIrResult<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an unsigned 32-bit immediate.
    pub fn read_uint32(&mut self) -> CacheIrResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a stub-field reference.
    pub fn read_field_offset(&mut self) -> CacheIrResult<FieldOffset> {
        Ok(FieldOffset::new(self.read_byte()?))
    }

    /// Read one argument of the given schema type.
    pub fn read_arg(&mut self, ty: ArgType) -> CacheIrResult<DecodedArg> {
        Ok(match ty {
            ArgType::ValId
            | ArgType::ObjId
            | ArgType::Int32Id
            | ArgType::NumberId
            | ArgType::StringId
            | ArgType::SymbolId
            | ArgType::BooleanId
            | ArgType::BigIntId
            | ArgType::IntPtrId => DecodedArg::Id(self.read_raw_id()?),
            ArgType::Byte => DecodedArg::Byte(self.read_byte()?),
            ArgType::Int32Imm => DecodedArg::Int32(self.read_int32()?),
            ArgType::UInt32Imm => DecodedArg::UInt32(self.read_uint32()?),
            ArgType::FieldRef => DecodedArg::Field(self.read_field_offset()?),
        })
    }

    /// Skip one instruction's arguments.
    pub fn skip_args(&mut self, op: CacheOp) -> CacheIrResult<()> {
        self.take(op.encoded_args_len())?;
        Ok(())
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Int32OperandId, ObjOperandId};
    use crate::writer::CacheIrWriter;

    #[test]
    fn test_round_trip_simple_stream() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.guard_specific_int32(Int32OperandId::new(obj.id()), -7);
        writer.load_undefined_result();
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");

        let mut reader = CacheIrReader::new(stream.code());
        assert_eq!(reader.read_op(), Ok(CacheOp::GuardToObject));
        assert_eq!(reader.read_id::<ObjOperandId>(), Ok(ObjOperandId::new(0)));
        assert_eq!(reader.read_op(), Ok(CacheOp::GuardSpecificInt32));
        assert_eq!(reader.read_raw_id(), Ok(0));
        assert_eq!(reader.read_int32(), Ok(-7));
        assert_eq!(reader.read_op(), Ok(CacheOp::LoadUndefinedResult));
        assert_eq!(reader.read_op(), Ok(CacheOp::ReturnFromIC));
        assert!(reader.done());
    }

    #[test]
    fn test_schema_driven_reads() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.load_int32_array_length_result(obj);
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");

        let mut reader = CacheIrReader::new(stream.code());
        while !reader.done() {
            let op = reader.read_op().unwrap();
            for arg in op.args() {
                assert!(reader.read_arg(arg.ty).is_ok());
            }
        }
    }

    #[test]
    fn test_truncated_stream() {
        let code = [CacheOp::GuardToObject as u8, 0x01];
        let mut reader = CacheIrReader::new(&code);
        assert_eq!(reader.read_op(), Ok(CacheOp::GuardToObject));
        assert_eq!(
            reader.read_raw_id(),
            Err(CacheIrError::TruncatedStream { offset: 1 })
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let code = [0xff];
        let mut reader = CacheIrReader::new(&code);
        assert_eq!(
            reader.read_op(),
            Err(CacheIrError::UnknownOpcode { byte: 0xff, offset: 0 })
        );
    }

    #[test]
    fn test_skip_args() {
        let mut writer = CacheIrWriter::new();
        let receiver = writer.input_value();
        let obj = writer.guard_to_object(receiver);
        writer.load_int32_array_length_result(obj);
        writer.return_from_ic();
        let stream = writer.finish().expect("stream should finish");

        let mut reader = CacheIrReader::new(stream.code());
        let mut ops = Vec::new();
        while !reader.done() {
            let op = reader.read_op().unwrap();
            ops.push(op);
            assert!(reader.skip_args(op).is_ok());
        }
        assert_eq!(ops, stream.ops());
    }
}
