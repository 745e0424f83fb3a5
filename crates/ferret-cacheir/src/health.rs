//! Stream health scoring.
//!
//! Each op carries a relative cost in the op table. Summing a stream's
//! costs gives a rough stub weight used to spot caches that attach
//! expensive stubs (proxy traps, megamorphic hash lookups, re-entrant
//! calls) where cheap guard-and-load stubs were expected.

use crate::ops::CacheOp;
use crate::writer::CacheIrStream;

/// Highest total cost still considered healthy.
pub const HEALTHY_MAX_COST: u32 = 16;

/// Highest total cost still considered marginal.
pub const MARGINAL_MAX_COST: u32 = 40;

/// Coarse rating of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheHealth {
    /// Cheap guards and direct loads.
    Healthy,
    /// Noticeably heavy, still worth attaching.
    Marginal,
    /// Dominated by fallback-grade ops.
    Unhealthy,
}

/// Total cost of an op sequence.
pub fn stream_cost(ops: &[CacheOp]) -> u32 {
    ops.iter().map(|op| op.health_cost()).sum()
}

/// Rate a total cost.
pub fn classify(cost: u32) -> CacheHealth {
    if cost <= HEALTHY_MAX_COST {
        CacheHealth::Healthy
    } else if cost <= MARGINAL_MAX_COST {
        CacheHealth::Marginal
    } else {
        CacheHealth::Unhealthy
    }
}

/// Rate a finished stream.
pub fn rate_stream(stream: &CacheIrStream) -> CacheHealth {
    classify(stream_cost(stream.ops()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_and_load_is_healthy() {
        let ops = [
            CacheOp::GuardToObject,
            CacheOp::GuardShape,
            CacheOp::LoadFixedSlotResult,
            CacheOp::ReturnFromIC,
        ];
        assert_eq!(classify(stream_cost(&ops)), CacheHealth::Healthy);
    }

    #[test]
    fn test_proxy_stacking_degrades() {
        let ops = [
            CacheOp::GuardToObject,
            CacheOp::GuardIsProxy,
            CacheOp::ProxyGetResult,
            CacheOp::ReturnFromIC,
        ];
        assert_eq!(classify(stream_cost(&ops)), CacheHealth::Healthy);

        let heavy = [
            CacheOp::GuardToObject,
            CacheOp::MegamorphicLoadSlotByValueResult,
            CacheOp::ProxyGetByValueResult,
            CacheOp::ProxySetByValue,
            CacheOp::MegamorphicSetElement,
            CacheOp::MegamorphicStoreSlot,
            CacheOp::ProxyGetResult,
            CacheOp::ProxySet,
            CacheOp::MegamorphicHasPropResult,
            CacheOp::MegamorphicLoadSlotResult,
            CacheOp::ReturnFromIC,
        ];
        assert!(stream_cost(&heavy) > MARGINAL_MAX_COST);
        assert_eq!(classify(stream_cost(&heavy)), CacheHealth::Unhealthy);
    }

    #[test]
    fn test_ordering() {
        assert!(CacheHealth::Healthy < CacheHealth::Marginal);
        assert!(CacheHealth::Marginal < CacheHealth::Unhealthy);
    }
}
