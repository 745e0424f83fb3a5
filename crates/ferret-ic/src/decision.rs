//! Attach decisions.
//!
//! Every `try_attach_*` probe reports one of four outcomes. Probes run
//! in order; the first non-[`AttachDecision::NoAction`] outcome wins and
//! later probes never execute. The [`try_attach!`] macro encodes that
//! chaining.

/// Outcome of one attach probe, or of a whole generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachDecision {
    /// A stub was emitted and should be published.
    Attach,
    /// This probe does not apply; try the next one.
    NoAction,
    /// Optimization is expected to become possible later (a script that
    /// has not been compiled yet). Nothing is attached and no failure is
    /// recorded, so the site retries on subsequent misses.
    TemporarilyUnoptimizable,
    /// The fallback must complete first; the caller re-enters through a
    /// narrower attach entry point afterwards.
    Deferred,
}

impl AttachDecision {
    /// True for [`AttachDecision::Attach`].
    pub fn is_attach(self) -> bool {
        matches!(self, AttachDecision::Attach)
    }

    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            AttachDecision::Attach => "attach",
            AttachDecision::NoAction => "no-action",
            AttachDecision::TemporarilyUnoptimizable => "temporarily-unoptimizable",
            AttachDecision::Deferred => "deferred",
        }
    }
}

/// Run one probe and return early unless it declined.
#[macro_export]
macro_rules! try_attach {
    ($probe:expr) => {
        match $probe {
            $crate::decision::AttachDecision::NoAction => {}
            decision => return decision,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(outcomes: &[AttachDecision]) -> AttachDecision {
        fn run(outcome: AttachDecision) -> AttachDecision {
            outcome
        }
        for &outcome in outcomes {
            try_attach!(run(outcome));
        }
        AttachDecision::NoAction
    }

    #[test]
    fn test_first_non_decline_wins() {
        assert_eq!(
            chain(&[AttachDecision::NoAction, AttachDecision::Attach]),
            AttachDecision::Attach
        );
        assert_eq!(
            chain(&[AttachDecision::Deferred, AttachDecision::Attach]),
            AttachDecision::Deferred
        );
        assert_eq!(chain(&[]), AttachDecision::NoAction);
    }

    #[test]
    fn test_names() {
        assert_eq!(AttachDecision::Attach.name(), "attach");
        assert!(AttachDecision::Attach.is_attach());
        assert!(!AttachDecision::Deferred.is_attach());
    }
}
