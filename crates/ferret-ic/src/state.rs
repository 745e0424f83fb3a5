//! Per-site cache state.
//!
//! A site starts specialized, attaching one stub per distinct access
//! pattern. Too many stubs or too many failed attach attempts escalate
//! it to megamorphic, where a single hash-lookup stub replaces the
//! specialized list. A megamorphic site that keeps failing goes generic
//! and stops attaching altogether. Transitions only ever move forward.

/// Most specialized stubs a site holds before going megamorphic.
pub const MAX_OPTIMIZED_STUBS: usize = 6;

/// Failed attach attempts tolerated before escalating.
pub const MAX_ATTACH_FAILURES: u8 = 6;

/// Optimization level of one cache site. Ordered; transitions are
/// monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ICMode {
    /// Per-pattern stubs guarded on exact shapes and identities.
    Specialized,
    /// One hash-lookup stub covering all native receivers.
    Megamorphic,
    /// No further attach attempts; every miss runs the fallback.
    Generic,
}

impl ICMode {
    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ICMode::Specialized => "specialized",
            ICMode::Megamorphic => "megamorphic",
            ICMode::Generic => "generic",
        }
    }
}

/// Attach bookkeeping for one cache site.
#[derive(Debug, Clone)]
pub struct ICState {
    mode: ICMode,
    num_optimized_stubs: usize,
    num_failures: u8,
    attached_any: bool,
}

impl Default for ICState {
    fn default() -> Self {
        Self::new()
    }
}

impl ICState {
    /// Fresh specialized state.
    pub fn new() -> Self {
        Self {
            mode: ICMode::Specialized,
            num_optimized_stubs: 0,
            num_failures: 0,
            attached_any: false,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> ICMode {
        self.mode
    }

    /// Stubs attached in the current mode.
    pub fn num_optimized_stubs(&self) -> usize {
        self.num_optimized_stubs
    }

    /// True until the first stub is attached at this site.
    pub fn is_first_stub(&self) -> bool {
        !self.attached_any
    }

    /// Whether another stub may be attached right now.
    pub fn can_attach_stub(&self) -> bool {
        match self.mode {
            ICMode::Specialized => self.num_optimized_stubs < MAX_OPTIMIZED_STUBS,
            // The single hash-lookup stub.
            ICMode::Megamorphic => self.num_optimized_stubs == 0,
            ICMode::Generic => false,
        }
    }

    /// Record a published stub.
    pub fn note_attached(&mut self) {
        debug_assert!(self.can_attach_stub());
        self.num_optimized_stubs += 1;
        self.attached_any = true;
    }

    /// Record a miss that produced no stub.
    pub fn note_not_attached(&mut self) {
        self.num_failures = self.num_failures.saturating_add(1);
    }

    /// Record that `count` dead stubs were pruned from the site's list,
    /// freeing their attach capacity.
    pub fn note_pruned(&mut self, count: usize) {
        self.num_optimized_stubs = self.num_optimized_stubs.saturating_sub(count);
    }

    /// Escalate if the current mode has worn out. Returns true when the
    /// mode changed, in which case the caller discards the stub list.
    pub fn maybe_transition(&mut self) -> bool {
        let next = match self.mode {
            ICMode::Specialized
                if self.num_optimized_stubs >= MAX_OPTIMIZED_STUBS
                    || self.num_failures >= MAX_ATTACH_FAILURES =>
            {
                ICMode::Megamorphic
            }
            ICMode::Megamorphic if self.num_failures >= MAX_ATTACH_FAILURES => ICMode::Generic,
            _ => return false,
        };
        debug_assert!(next > self.mode);
        self.mode = next;
        self.num_optimized_stubs = 0;
        self.num_failures = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialized_fills_then_escalates() {
        let mut state = ICState::new();
        assert_eq!(state.mode(), ICMode::Specialized);
        assert!(state.is_first_stub());

        for _ in 0..MAX_OPTIMIZED_STUBS {
            assert!(state.can_attach_stub());
            assert!(!state.maybe_transition());
            state.note_attached();
        }
        assert!(!state.can_attach_stub());
        assert!(!state.is_first_stub());

        assert!(state.maybe_transition());
        assert_eq!(state.mode(), ICMode::Megamorphic);
        assert_eq!(state.num_optimized_stubs(), 0);
        assert!(state.can_attach_stub());
    }

    #[test]
    fn test_failures_escalate() {
        let mut state = ICState::new();
        for _ in 0..MAX_ATTACH_FAILURES {
            state.note_not_attached();
        }
        assert!(state.maybe_transition());
        assert_eq!(state.mode(), ICMode::Megamorphic);

        for _ in 0..MAX_ATTACH_FAILURES {
            state.note_not_attached();
        }
        assert!(state.maybe_transition());
        assert_eq!(state.mode(), ICMode::Generic);
        assert!(!state.can_attach_stub());
        // Generic is terminal.
        assert!(!state.maybe_transition());
    }

    #[test]
    fn test_pruning_frees_attach_capacity() {
        let mut state = ICState::new();
        for _ in 0..MAX_OPTIMIZED_STUBS {
            state.note_attached();
        }
        assert!(!state.can_attach_stub());

        state.note_pruned(2);
        assert_eq!(state.num_optimized_stubs(), MAX_OPTIMIZED_STUBS - 2);
        assert!(state.can_attach_stub());
        // A full site that pruned does not escalate on the next miss.
        assert!(!state.maybe_transition());
    }

    #[test]
    fn test_megamorphic_holds_one_stub() {
        let mut state = ICState::new();
        state.num_failures = MAX_ATTACH_FAILURES;
        assert!(state.maybe_transition());
        assert!(state.can_attach_stub());
        state.note_attached();
        assert!(!state.can_attach_stub());
    }

    #[test]
    fn test_modes_are_ordered() {
        assert!(ICMode::Specialized < ICMode::Megamorphic);
        assert!(ICMode::Megamorphic < ICMode::Generic);
    }
}
