//! Inline cache sites.
//!
//! A site owns the attached stubs for one bytecode location plus the
//! [`ICState`] driving its specialization. [`InlineCacheSite::run_cached`]
//! is the whole protocol in one call: scan the attached stubs in order,
//! fall back on a miss, consult the generator, and publish at most one
//! new stub.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use ferret_cacheir::verify::verify_stream;
use ferret_object::Heap;

use crate::context::GenerationContext;
use crate::decision::AttachDecision;
use crate::diagnostics::{AttachEvent, DiagnosticsSink, TracingSink, event_health, mode_name};
use crate::generators::IrGenerator;
use crate::machine::{self, EvalOutcome, StubRun};
use crate::state::{ICMode, ICState};
use crate::stub::{AttachedStub, CacheIrStubInfo, CacheKind, build_stub};

static DEFAULT_SINK: TracingSink = TracingSink;

/// What one pass through a site produced.
#[derive(Debug)]
pub struct CacheRun {
    /// The evaluated result, present when any stub ran to completion.
    /// `None` means the caller must take its fallback path.
    pub outcome: Option<EvalOutcome>,
    /// True when an already-attached stub served the request.
    pub hit: bool,
    /// The generator's decision on the miss path; `NoAction` on hits.
    pub decision: AttachDecision,
}

/// One bytecode location's cache: attached stubs plus specialization
/// state.
pub struct InlineCacheSite {
    kind: CacheKind,
    stubs: RwLock<Vec<Arc<AttachedStub>>>,
    state: Mutex<ICState>,
}

impl InlineCacheSite {
    /// Empty site for `kind`.
    pub fn new(kind: CacheKind) -> Self {
        Self {
            kind,
            stubs: RwLock::new(Vec::new()),
            state: Mutex::new(ICState::new()),
        }
    }

    /// Cache kind this site serves.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Number of attached stubs.
    pub fn stub_count(&self) -> usize {
        self.stubs.read().len()
    }

    /// Snapshot of the attached stubs, in attach order.
    pub fn stubs(&self) -> Vec<Arc<AttachedStub>> {
        self.stubs.read().clone()
    }

    /// Current specialization mode.
    pub fn mode(&self) -> ICMode {
        self.state.lock().mode()
    }

    /// Run the site against the generator's inputs.
    ///
    /// Attached stubs are tried in order; the first whose guards all
    /// pass settles the request. On a miss the generator probes once,
    /// and an `Attach` decision publishes exactly one stub, which is
    /// then evaluated to produce the outcome. Every miss emits one
    /// attach event.
    pub fn run_cached<G: IrGenerator>(
        &self,
        ctx: &mut GenerationContext<'_>,
        generator: &mut G,
    ) -> CacheRun {
        debug_assert_eq!(generator.kind(), self.kind);
        let inputs = generator.inputs().to_vec();

        let mut saw_cleared = false;
        for stub in self.stubs.read().iter() {
            if stub.data().any_cleared() {
                saw_cleared = true;
                continue;
            }
            match machine::evaluate_stub(
                stub.info(),
                stub.data(),
                ctx.realm(),
                ctx.heap(),
                &inputs,
            ) {
                Ok(StubRun::Finished(outcome)) => {
                    return CacheRun {
                        outcome: Some(outcome),
                        hit: true,
                        decision: AttachDecision::NoAction,
                    };
                }
                Ok(StubRun::GuardFailed) => {}
                Err(err) => {
                    // A malformed stub can only come from a generator
                    // bug; skip it rather than poison the site.
                    tracing::error!(
                        target: "ferret::ic",
                        kind = self.kind.name(),
                        stub = stub.info().name(),
                        error = %err,
                        "stub evaluation failed"
                    );
                }
            }
        }
        // Miss path. The state lock spans decision and publish so two
        // racing misses cannot both count or attach.
        let mut state = self.state.lock();
        if saw_cleared {
            let mut stubs = self.stubs.write();
            let before = stubs.len();
            stubs.retain(|stub| !stub.data().any_cleared());
            let pruned = before - stubs.len();
            drop(stubs);
            // Pruned stubs give their attach capacity back.
            state.note_pruned(pruned);
        }
        if state.maybe_transition() {
            self.stubs.write().clear();
        }
        let mode = state.mode();
        if !state.can_attach_stub() {
            let decision = AttachDecision::NoAction;
            self.emit_event(ctx, &inputs, mode, decision, None);
            return CacheRun { outcome: None, hit: false, decision };
        }

        let mut decision = generator.try_attach_stub(ctx, mode);
        let mut attached: Option<Arc<AttachedStub>> = None;
        if decision.is_attach() {
            match generator.take_result() {
                Some((name, stream)) => {
                    debug_assert_eq!(verify_stream(&stream), Ok(()));
                    let stub = Arc::new(build_stub(self.kind, name, stream, ctx.heap()));
                    self.stubs.write().push(Arc::clone(&stub));
                    state.note_attached();
                    attached = Some(stub);
                }
                None => decision = AttachDecision::NoAction,
            }
        }
        if decision == AttachDecision::NoAction {
            state.note_not_attached();
        }
        drop(state);

        // Evaluate the fresh stub so the triggering operation completes
        // through the cache.
        let outcome = attached.as_ref().and_then(|stub| {
            match machine::evaluate_stub(
                stub.info(),
                stub.data(),
                ctx.realm(),
                ctx.heap(),
                &inputs,
            ) {
                Ok(StubRun::Finished(outcome)) => Some(outcome),
                Ok(StubRun::GuardFailed) | Err(_) => None,
            }
        });

        self.emit_event(ctx, &inputs, mode, decision, attached.as_ref().map(|s| s.info()).map(Arc::as_ref));
        CacheRun { outcome, hit: false, decision }
    }

    /// Attach without evaluating, for re-entry after a deferred
    /// decision. The engine calls this once its fallback completed the
    /// mutation the stub will guard against.
    pub fn attach_with<G: IrGenerator>(
        &self,
        ctx: &mut GenerationContext<'_>,
        generator: &mut G,
    ) -> AttachDecision {
        debug_assert_eq!(generator.kind(), self.kind);
        let inputs = generator.inputs().to_vec();

        let mut state = self.state.lock();
        if state.maybe_transition() {
            self.stubs.write().clear();
        }
        let mode = state.mode();
        if !state.can_attach_stub() {
            self.emit_event(ctx, &inputs, mode, AttachDecision::NoAction, None);
            return AttachDecision::NoAction;
        }

        let mut decision = generator.try_attach_stub(ctx, mode);
        let mut info = None;
        if decision.is_attach() {
            match generator.take_result() {
                Some((name, stream)) => {
                    debug_assert_eq!(verify_stream(&stream), Ok(()));
                    let stub = Arc::new(build_stub(self.kind, name, stream, ctx.heap()));
                    info = Some(Arc::clone(stub.info()));
                    self.stubs.write().push(stub);
                    state.note_attached();
                }
                None => decision = AttachDecision::NoAction,
            }
        }
        if decision == AttachDecision::NoAction {
            state.note_not_attached();
        }
        drop(state);

        self.emit_event(ctx, &inputs, mode, decision, info.as_deref());
        decision
    }

    /// Seed this site with clones of another site's stubs, up to
    /// capacity. Cloning re-reads every field, so swept stubs are
    /// skipped and strong fields are re-barriered at publish.
    pub fn adopt_stubs_from(&self, source: &InlineCacheSite, heap: &Heap) {
        debug_assert_eq!(self.kind, source.kind);
        let mut state = self.state.lock();
        for stub in source.stubs.read().iter() {
            if !state.can_attach_stub() {
                break;
            }
            let info = stub.info();
            let Ok(stream) =
                ferret_cacheir::clone_stream(info.code(), stub.data().fields(), info.input_count())
            else {
                continue;
            };
            let cloned = build_stub(self.kind, info.name(), stream, heap);
            self.stubs.write().push(Arc::new(cloned));
            state.note_attached();
        }
    }

    fn emit_event(
        &self,
        ctx: &GenerationContext<'_>,
        inputs: &[ferret_object::Value],
        mode: ICMode,
        decision: AttachDecision,
        info: Option<&CacheIrStubInfo>,
    ) {
        let event = AttachEvent {
            kind: self.kind.name(),
            mode: mode_name(mode),
            input_tags: inputs.iter().map(machine::tag_name).collect(),
            decision: decision.name(),
            stub_name: info.map(CacheIrStubInfo::name),
            health: event_health(info.map(CacheIrStubInfo::health)),
            num_stubs: self.stub_count(),
        };
        match ctx.sink() {
            Some(sink) => sink.attach_attempt(&event),
            None => DEFAULT_SINK.attach_attempt(&event),
        }
    }
}

impl std::fmt::Debug for InlineCacheSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineCacheSite")
            .field("kind", &self.kind)
            .field("stubs", &self.stub_count())
            .field("mode", &self.mode())
            .finish()
    }
}

// ==================== Tests ====================
