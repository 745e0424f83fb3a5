//! Allocation sites.
//!
//! Object and array construction stubs carry a reference to the bytecode
//! site that performed the allocation, so downstream heuristics (nursery
//! pretenuring and friends) can count what each site produces.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::object::Script;

static NEXT_SITE_ID: AtomicU64 = AtomicU64::new(1);

/// One allocation site.
#[derive(Debug)]
pub struct AllocSite {
    id: u64,
    script: Option<Arc<Script>>,
    pc_offset: u32,
    allocations: AtomicU64,
}

impl AllocSite {
    /// Create a site for a script location.
    pub fn new(script: Option<Arc<Script>>, pc_offset: u32) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SITE_ID.fetch_add(1, Ordering::Relaxed),
            script,
            pc_offset,
            allocations: AtomicU64::new(0),
        })
    }

    /// Runtime-unique id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The owning script, if known.
    pub fn script(&self) -> Option<&Arc<Script>> {
        self.script.as_ref()
    }

    /// Bytecode offset of the allocating instruction.
    #[inline]
    pub fn pc_offset(&self) -> u32 {
        self.pc_offset
    }

    /// Record one allocation flowing through this site.
    pub fn note_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Allocations recorded so far.
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_counting() {
        let site = AllocSite::new(None, 12);
        assert_eq!(site.allocation_count(), 0);
        site.note_allocation();
        site.note_allocation();
        assert_eq!(site.allocation_count(), 2);
        assert_eq!(site.pc_offset(), 12);
    }
}
