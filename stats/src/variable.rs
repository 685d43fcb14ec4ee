use super::cache::Histogram;
use serde::{Deserialize, Serialize};

pub type VariableId = u32;

/// Usage of lines belonging to one variable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableUsage {
    /// Hits on the variable's lines during their residency.
    pub accesses: u64,
    pub evictions: Histogram,
}

impl VariableUsage {
    #[inline]
    pub fn record_eviction(&mut self, accesses: u64, words_used: u32) {
        self.accesses += accesses;
        self.evictions.record(words_used);
    }
}

impl std::ops::AddAssign for VariableUsage {
    fn add_assign(&mut self, other: Self) {
        self.accesses += other.accesses;
        self.evictions += other.evictions;
    }
}

/// A variable whose line got evicted to make room for a line of another variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub evicted: VariableId,
    pub installed: VariableId,
}
