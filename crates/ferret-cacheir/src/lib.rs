//! # Ferret Cache IR
//!
//! This crate defines the inline-cache IR for the Ferret JavaScript engine:
//! the compact guard-and-act programs that fast paths compile property
//! accesses, calls and operators down to.
//!
//! ## Design Principles
//!
//! - **Typed operands**: Ids are typed at the API level; guards narrow a
//!   value by handing the same id back at a narrower type
//! - **Single schema**: One op table drives the writer, reader, verifier,
//!   cloner and evaluator
//! - **Out-of-line constants**: Pointers live in deduplicated stub fields,
//!   keeping the byte stream position-independent and shareable
//! - **Total decoding**: Malformed streams surface as errors, never panics

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cloner;
pub mod error;
pub mod flags;
pub mod health;
pub mod operand;
pub mod ops;
pub mod reader;
pub mod stub_field;
pub mod verify;
pub mod writer;

pub use cloner::{clone_ir, clone_stream};
pub use error::{CacheIrError, CacheIrResult};
pub use flags::{ArgFormat, BinaryArithOp, CallFlags, CompareOp, UnaryArithOp};
pub use health::{CacheHealth, classify, rate_stream, stream_cost};
pub use operand::{
    BigIntOperandId, BooleanOperandId, Int32OperandId, IntPtrOperandId, NumberOperandId,
    ObjOperandId, OperandId, OperandKind, StringOperandId, SymbolOperandId, TypedOperandId,
    ValOperandId,
};
pub use ops::{ArgInfo, ArgType, CacheOp};
pub use reader::{CacheIrReader, DecodedArg};
pub use stub_field::{
    FieldCursor, FieldOffset, FieldStore, FieldType, MAX_STUB_FIELDS, StubField,
};
pub use verify::{verify, verify_stream};
pub use writer::{CacheIrStream, CacheIrWriter, MAX_CODE_BYTES, MAX_OPERAND_IDS};
