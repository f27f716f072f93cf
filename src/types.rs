// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs and the block clock. each is a newtype so the compiler catches type mixups.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

/// Identifies one underlying fungible asset (the thing deposited and borrowed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u32);

/// Identifies a risk-engine instance. Seizure across two engines is forbidden,
/// so every market records the engine it was listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub u32);

// 1.1: the ledger clock. interest and rewards accrue per elapsed block, never
// per wall-clock second, so the whole engine is deterministic under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    pub fn zero() -> Self {
        Self(0)
    }

    /// Blocks elapsed since `earlier`. Saturates rather than panicking if the
    /// clock ever ran backwards.
    pub fn delta(&self, earlier: BlockNumber) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_delta() {
        let a = BlockNumber(100);
        let b = BlockNumber(140);
        assert_eq!(b.delta(a), 40);
        assert_eq!(a.delta(b), 0); // saturating, never underflows
        assert_eq!(a.delta(a), 0);
    }

    #[test]
    fn ids_are_distinct_types() {
        let m = MarketId(1);
        assert_eq!(m, MarketId(1));
        assert_ne!(m, MarketId(2));
    }
}
