//! IR generators.
//!
//! One generator per cache kind. Each runs an ordered list of probes
//! against the concrete inputs; the first probe that recognizes the
//! situation emits a guard-plus-action stream and the rest never run.
//! Probes only read the runtime through [`GenerationContext`]; nothing
//! here runs script or mutates an object.
//!
//! Every probe checks all of its preconditions before touching the
//! writer, so a probe that answers `NoAction` leaves no partial stream
//! behind.

use ferret_cacheir::writer::CacheIrStream;
use ferret_object::{PropertyKey, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::state::ICMode;
use crate::stub::CacheKind;

mod shared;

mod binary_arith;
mod call;
mod compare;
mod get_iterator;
mod get_name;
mod get_prop;
mod has_prop;
mod instance_of;
mod new_object;
mod set_prop;
mod type_of;
mod unary_arith;

pub use binary_arith::BinaryArithIrGenerator;
pub use call::CallIrGenerator;
pub use compare::CompareIrGenerator;
pub use get_iterator::GetIteratorIrGenerator;
pub use get_name::GetNameIrGenerator;
pub use get_prop::GetPropIrGenerator;
pub use has_prop::HasPropIrGenerator;
pub use instance_of::InstanceOfIrGenerator;
pub use new_object::{NewArrayIrGenerator, NewObjectIrGenerator};
pub use set_prop::SetPropIrGenerator;
pub use type_of::TypeOfIrGenerator;
pub use unary_arith::UnaryArithIrGenerator;

// ==================== Cache keys ====================

/// How a property-access site names the property.
#[derive(Debug, Clone)]
pub enum CacheKey {
    /// Key fixed at the bytecode level (`obj.prop`).
    Constant(PropertyKey),
    /// Key computed at run time (`obj[key]`).
    Value(Value),
}

impl CacheKey {
    /// The constant key, when the access is by name.
    pub fn constant(&self) -> Option<&PropertyKey> {
        match self {
            CacheKey::Constant(key) => Some(key),
            CacheKey::Value(_) => None,
        }
    }

    /// A property key usable for attach-time lookups. By-value keys
    /// outside the int32/string/symbol tags give `None`.
    pub fn lookup_key(&self) -> Option<PropertyKey> {
        match self {
            CacheKey::Constant(key) => Some(key.clone()),
            CacheKey::Value(value) => shared::value_to_lookup_key(value),
        }
    }

    /// True for the computed-key form.
    pub fn is_by_value(&self) -> bool {
        matches!(self, CacheKey::Value(_))
    }
}

// ==================== Generator trait ====================

/// One attach attempt's worth of probing for a cache kind.
pub trait IrGenerator {
    /// The kind of site this generator serves.
    fn kind(&self) -> CacheKind;

    /// The cache inputs, in declaration order.
    fn inputs(&self) -> &[Value];

    /// Probe for an attachable pattern under the site's current mode.
    fn try_attach_stub(&mut self, ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision;

    /// The emitted stream, present after an `Attach` decision.
    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)>;
}
