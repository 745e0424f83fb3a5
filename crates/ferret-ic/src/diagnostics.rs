//! Attach-attempt diagnostics.
//!
//! Every miss produces one [`AttachEvent`] describing what the site
//! tried and what came of it. Events go to a [`DiagnosticsSink`]; the
//! default sink logs them under the `ferret::ic` tracing target, and
//! tests use [`RecordingSink`] to assert on the sequence.

use parking_lot::Mutex;
use serde::Serialize;

use ferret_cacheir::CacheHealth;

use crate::state::ICMode;

/// One attach attempt, in a serializable form suitable for offline
/// cache-behavior analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AttachEvent {
    /// Cache kind name, `"GetProp"` and friends.
    pub kind: &'static str,
    /// Site mode at the time of the attempt.
    pub mode: &'static str,
    /// Coarse tags of the cache inputs, in input order.
    pub input_tags: Vec<&'static str>,
    /// What the generator decided.
    pub decision: &'static str,
    /// Name of the attached stub, when one was emitted.
    pub stub_name: Option<&'static str>,
    /// Health rating of the attached stream.
    pub health: Option<&'static str>,
    /// Stubs held by the site after the attempt.
    pub num_stubs: usize,
}

impl AttachEvent {
    /// Render as a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn health_name(health: CacheHealth) -> &'static str {
    match health {
        CacheHealth::Healthy => "healthy",
        CacheHealth::Marginal => "marginal",
        CacheHealth::Unhealthy => "unhealthy",
    }
}

/// Where attach events go.
pub trait DiagnosticsSink: Send + Sync {
    /// Observe one attach attempt.
    fn attach_attempt(&self, event: &AttachEvent);
}

/// Default sink: structured logging under the `ferret::ic` target.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn attach_attempt(&self, event: &AttachEvent) {
        tracing::debug!(
            target: "ferret::ic",
            kind = event.kind,
            mode = event.mode,
            decision = event.decision,
            stub = event.stub_name,
            health = event.health,
            num_stubs = event.num_stubs,
            "attach attempt"
        );
    }
}

/// Sink that keeps every event, for tests and ad-hoc inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AttachEvent>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events observed so far.
    pub fn events(&self) -> Vec<AttachEvent> {
        self.events.lock().clone()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn attach_attempt(&self, event: &AttachEvent) {
        self.events.lock().push(event.clone());
    }
}

pub(crate) fn event_health(health: Option<CacheHealth>) -> Option<&'static str> {
    health.map(health_name)
}

pub(crate) fn mode_name(mode: ICMode) -> &'static str {
    mode.name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_to_json() {
        let event = AttachEvent {
            kind: "GetProp",
            mode: "specialized",
            input_tags: vec!["object"],
            decision: "attach",
            stub_name: Some("GetProp.OwnFixedSlot"),
            health: Some("healthy"),
            num_stubs: 1,
        };
        let json = event.to_json();
        assert!(json.contains("\"GetProp\""));
        assert!(json.contains("GetProp.OwnFixedSlot"));
        assert!(json.contains("healthy"));
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        for decision in ["no-action", "attach"] {
            sink.attach_attempt(&AttachEvent {
                kind: "Compare",
                mode: "specialized",
                input_tags: vec!["int32", "int32"],
                decision,
                stub_name: None,
                health: None,
                num_stubs: 0,
            });
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].decision, "no-action");
        assert_eq!(events[1].decision, "attach");
    }
}
