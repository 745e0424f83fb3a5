//! # Ferret Inline Caches
//!
//! Stub generation and attachment for the Ferret JavaScript engine.
//! Each hot bytecode location owns an [`InlineCacheSite`]; on a miss the
//! site consults the matching generator, which inspects the concrete
//! inputs and emits a guard-and-act stream for just that case.
//!
//! ## Design Principles
//!
//! - **Probe, then emit**: Generators check every precondition before
//!   writing a single op, so a declined probe leaves nothing behind
//! - **One stub per miss**: A site grows by at most one stub per
//!   fallback entry, and its mode only ever escalates
//! - **Split publication**: Shape-agnostic stub info is interned
//!   process-wide; per-stub constants stay private and barriered
//! - **Fail over, never fail**: A stub whose guards or value-domain
//!   checks miss hands control back to the fallback path

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod context;
pub mod decision;
pub mod diagnostics;
pub mod generators;
pub mod machine;
pub mod site;
pub mod state;
pub mod stub;

pub use context::GenerationContext;
pub use decision::AttachDecision;
pub use diagnostics::{AttachEvent, DiagnosticsSink, RecordingSink, TracingSink};
pub use generators::{
    BinaryArithIrGenerator, CacheKey, CallIrGenerator, CompareIrGenerator, GetIteratorIrGenerator,
    GetNameIrGenerator, GetPropIrGenerator, HasPropIrGenerator, InstanceOfIrGenerator,
    IrGenerator, NewArrayIrGenerator, NewObjectIrGenerator, SetPropIrGenerator, TypeOfIrGenerator,
    UnaryArithIrGenerator,
};
pub use machine::{EvalOutcome, StubRun, evaluate_stub};
pub use site::{CacheRun, InlineCacheSite};
pub use state::{ICMode, ICState, MAX_ATTACH_FAILURES, MAX_OPTIMIZED_STUBS};
pub use stub::{AttachedStub, CacheIrStubInfo, CacheKind, StubData, build_stub, stub_info_pool_len};
