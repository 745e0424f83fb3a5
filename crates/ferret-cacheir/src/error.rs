//! Error types for encoding, decoding and verifying cache IR.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type CacheIrResult<T> = Result<T, CacheIrError>;

/// Everything that can go wrong while reading or checking an IR stream.
///
/// Streams are produced by the writer in this crate, so in a healthy
/// engine none of these fire. They exist to make stub decoding total:
/// corrupted or truncated bytes surface as errors instead of panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheIrError {
    /// The stream ended in the middle of an instruction.
    #[error("stream truncated inside an instruction at byte {offset}")]
    TruncatedStream {
        /// Byte position where decoding stopped.
        offset: usize,
    },

    /// An opcode byte did not name a defined operation.
    #[error("unknown opcode {byte:#04x} at byte {offset}")]
    UnknownOpcode {
        /// The undecodable byte.
        byte: u8,
        /// Byte position of the opcode.
        offset: usize,
    },

    /// An instruction used an operand id that no earlier instruction
    /// defined.
    #[error("{op} references operand {id} but only {defined} operands are defined")]
    ForwardOperandReference {
        /// Name of the offending op.
        op: &'static str,
        /// The referenced operand id.
        id: u16,
        /// Number of operands defined at that point.
        defined: u16,
    },

    /// An operand id named a register holding a different kind of value.
    #[error("operand {id} holds {found}, {op} expected {expected}")]
    OperandTypeMismatch {
        /// Name of the offending op.
        op: &'static str,
        /// The referenced operand id.
        id: u16,
        /// Kind the schema expected.
        expected: &'static str,
        /// Kind actually present.
        found: &'static str,
    },

    /// A stub-field reference skipped ahead of the interning order.
    #[error("field offset {offset} read before offset {seen}")]
    NonMonotonicFieldRead {
        /// The referenced word offset.
        offset: u8,
        /// Highest offset that was legal at that point.
        seen: u8,
    },

    /// A stub-field reference pointed past the end of the field array.
    #[error("field offset {offset} out of range for {len} fields")]
    FieldOffsetOutOfRange {
        /// The referenced word offset.
        offset: u8,
        /// Number of fields in the stub.
        len: usize,
    },

    /// A weakly-held field was swept while the stub still referenced it.
    #[error("weak {what} field was cleared")]
    ClearedWeakReference {
        /// Which kind of field was dead.
        what: &'static str,
    },

    /// An immediate byte did not decode to its flag or selector type.
    #[error("{op} carries an undecodable immediate at byte {offset}")]
    InvalidImmediate {
        /// Name of the offending op.
        op: &'static str,
        /// Byte position just past the immediate.
        offset: usize,
    },

    /// The stream ran out without a `ReturnFromIC`.
    #[error("stream has no terminating instruction")]
    MissingTerminal,

    /// Bytes followed the terminating instruction.
    #[error("{count} trailing bytes after the terminating instruction")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_positions() {
        let err = CacheIrError::UnknownOpcode { byte: 0xfe, offset: 12 };
        assert!(err.to_string().contains("0xfe"));
        assert!(err.to_string().contains("12"));

        let err = CacheIrError::ForwardOperandReference {
            op: "GuardShape",
            id: 9,
            defined: 2,
        };
        assert!(err.to_string().contains("GuardShape"));
    }
}
