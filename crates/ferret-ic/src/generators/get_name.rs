//! Free-name read generator, walking the environment chain.

use ferret_cacheir::writer::CacheIrStream;
use ferret_object::shape::PropertyKind;
use ferret_object::{Atom, PropertyKey, Value};

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::generators::{IrGenerator, shared};
use crate::state::ICMode;
use crate::stub::CacheKind;

/// Environments walked before giving up on a name.
const MAX_ENV_CHAIN_LENGTH: usize = 8;

/// Probes for one free-name read miss. The single input is the
/// innermost environment object.
pub struct GetNameIrGenerator {
    name: Atom,
    inputs: [Value; 1],
    result: Option<(&'static str, CacheIrStream)>,
}

impl GetNameIrGenerator {
    /// Read of `name` starting from `env`.
    pub fn new(env: Value, name: Atom) -> Self {
        Self { name, inputs: [env], result: None }
    }

    /// Guard each hop of the environment chain by shape, then load the
    /// binding's slot off the environment that defines it.
    fn try_attach_environment_slot(&mut self) -> AttachDecision {
        let Value::Object(env) = &self.inputs[0] else {
            return AttachDecision::NoAction;
        };
        let key = PropertyKey::Atom(self.name.clone());

        // Locate the binder first; nothing is emitted on failure.
        let mut hops = 0usize;
        let mut current = env.clone();
        let info = loop {
            if let Some(info) = current.shape().property(&key) {
                break info;
            }
            hops += 1;
            if hops > MAX_ENV_CHAIN_LENGTH {
                return AttachDecision::NoAction;
            }
            match current.enclosing_environment() {
                Some(next) => current = next,
                None => return AttachDecision::NoAction,
            }
        };
        if info.kind != PropertyKind::Data {
            return AttachDecision::NoAction;
        }

        let mut writer = ferret_cacheir::writer::CacheIrWriter::new();
        let input = writer.input_value();
        let mut env_id = writer.guard_to_object(input);
        let mut current = env.clone();
        for _ in 0..hops {
            writer.guard_shape(env_id, &current.shape());
            env_id = writer.load_enclosing_environment(env_id);
            // The walk above proved this hop exists.
            let Some(next) = current.enclosing_environment() else {
                return AttachDecision::NoAction;
            };
            current = next;
        }
        writer.guard_shape(env_id, &current.shape());
        shared::emit_slot_load(&mut writer, env_id, info.slot);
        writer.return_from_ic();
        self.result = shared::finish("GetName.EnvironmentSlot", writer);
        AttachDecision::Attach
    }
}

impl IrGenerator for GetNameIrGenerator {
    fn kind(&self) -> CacheKind {
        CacheKind::GetName
    }

    fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    fn try_attach_stub(&mut self, _ctx: &mut GenerationContext<'_>, mode: ICMode) -> AttachDecision {
        match mode {
            ICMode::Specialized => self.try_attach_environment_slot(),
            // Name lookups never megamorph; the fallback interpreter
            // path handles unstable scopes.
            ICMode::Megamorphic | ICMode::Generic => AttachDecision::NoAction,
        }
    }

    fn take_result(&mut self) -> Option<(&'static str, CacheIrStream)> {
        self.result.take()
    }
}
