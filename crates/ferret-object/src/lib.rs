//! # Ferret Object Model
//!
//! Objects, shapes, realms and pure property lookup for the Ferret
//! inline-cache engine.
//!
//! ## Design Principles
//!
//! - **Shape-based**: Every object points at an immutable shape describing
//!   its layout; adding a property moves the object along a transition tree
//! - **Identity-interned**: Strings and symbols are interned so guards can
//!   compare by pointer
//! - **Pure lookups**: Cache generation probes the object graph without
//!   running script or mutating anything
//! - **Thread-safe**: Objects use interior mutability and are `Send + Sync`

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod alloc_site;
pub mod atom;
pub mod heap;
pub mod lookup;
pub mod object;
pub mod realm;
pub mod shape;
pub mod value;

pub use alloc_site::AllocSite;
pub use atom::{Atom, AtomTable, JsSymbol, PropertyKey};
pub use heap::Heap;
pub use lookup::{LookupBudget, LookupLimit, PropertyLocation, pure_lookup_property};
pub use object::{
    BoundFunctionData, ForwardingHandler, FunctionData, JsObject, NativeCallArgs, NativeFn,
    ObjectKind, ObjectRef, ProxyData, ProxyHandler, Script,
};
pub use realm::{Fuse, FuseIndex, Realm, RealmFuses, RealmId};
pub use shape::{
    ClassKind, PropertyAttributes, PropertyInfo, PropertyKind, Shape, ShapeId, SlotLocation,
};
pub use value::{Value, ValueTag};
