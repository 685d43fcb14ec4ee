use serde::{Deserialize, Serialize};

/// Number of bins of an eviction histogram.
///
/// Bin `k` counts evicted lines that had `k + 1` distinct words touched
/// while resident. Lines with more words than bins land in the last bin.
pub const NUM_BINS: usize = 16;

/// Root cause of a cache miss.
#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum MissKind {
    /// First ever touch of the block.
    COMPULSORY = 0,
    /// Would have hit with the same capacity but full associativity.
    CONFLICT,
    /// Misses even with full associativity.
    CAPACITY,
}

/// Simulated cache level.
#[derive(
    Debug,
    strum::EnumIter,
    Clone,
    Copy,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub enum Level {
    I1 = 0,
    D1,
    LL,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissCounters {
    pub compulsory: u64,
    pub conflict: u64,
    pub capacity: u64,
}

impl MissCounters {
    #[inline]
    pub fn inc(&mut self, kind: MissKind) {
        *self.get_mut(kind) += 1;
    }

    #[must_use]
    pub fn get(&self, kind: MissKind) -> u64 {
        match kind {
            MissKind::COMPULSORY => self.compulsory,
            MissKind::CONFLICT => self.conflict,
            MissKind::CAPACITY => self.capacity,
        }
    }

    fn get_mut(&mut self, kind: MissKind) -> &mut u64 {
        match kind {
            MissKind::COMPULSORY => &mut self.compulsory,
            MissKind::CONFLICT => &mut self.conflict,
            MissKind::CAPACITY => &mut self.capacity,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.compulsory + self.conflict + self.capacity
    }
}

impl std::ops::AddAssign for MissCounters {
    fn add_assign(&mut self, other: Self) {
        self.compulsory += other.compulsory;
        self.conflict += other.conflict;
        self.capacity += other.capacity;
    }
}

/// Hit/miss counters for one kind of access.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheCounters {
    /// total number of accesses of this kind
    pub accesses: u64,
    /// misses in the first level cache
    pub l1_misses: u64,
    /// misses in the last level cache
    pub ll_misses: u64,
    pub l1_causes: MissCounters,
    pub ll_causes: MissCounters,
}

impl CacheCounters {
    #[inline]
    pub fn record_l1_miss(&mut self, kind: MissKind) {
        self.l1_misses += 1;
        self.l1_causes.inc(kind);
    }

    #[inline]
    pub fn record_ll_miss(&mut self, kind: MissKind) {
        self.ll_misses += 1;
        self.ll_causes.inc(kind);
    }

    /// Miss causes add up to the miss counts of both levels.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.l1_causes.total() == self.l1_misses && self.ll_causes.total() == self.ll_misses
    }
}

impl std::ops::AddAssign for CacheCounters {
    fn add_assign(&mut self, other: Self) {
        self.accesses += other.accesses;
        self.l1_misses += other.l1_misses;
        self.ll_misses += other.ll_misses;
        self.l1_causes += other.l1_causes;
        self.ll_causes += other.ll_causes;
    }
}

/// Evictions bucketed by the number of words used.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Histogram(pub [u64; NUM_BINS]);

impl Histogram {
    /// Bin for a line with `words_used` words touched.
    ///
    /// A line without any touched word has no bin.
    #[must_use]
    pub fn bin(words_used: u32) -> Option<usize> {
        let words_used = words_used as usize;
        words_used
            .checked_sub(1)
            .map(|bin| bin.min(NUM_BINS - 1))
    }

    /// Records one eviction.
    ///
    /// # Returns
    /// Whether the eviction was counted.
    #[inline]
    pub fn record(&mut self, words_used: u32) -> bool {
        match Self::bin(words_used) {
            Some(bin) => {
                self.0[bin] += 1;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn bins(&self) -> &[u64; NUM_BINS] {
        &self.0
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl std::ops::AddAssign for Histogram {
    fn add_assign(&mut self, other: Self) {
        for (bin, count) in self.0.iter_mut().zip(other.0) {
            *bin += count;
        }
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut out = f.debug_map();
        for (bin, count) in self.0.iter().enumerate().filter(|(_, &count)| count > 0) {
            out.entry(&(bin + 1), count);
        }
        out.finish()
    }
}

/// One value per cache level.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerLevel<T> {
    pub i1: T,
    pub d1: T,
    pub ll: T,
}

impl<T> PerLevel<T> {
    pub fn iter(&self) -> impl Iterator<Item = (Level, &T)> {
        [
            (Level::I1, &self.i1),
            (Level::D1, &self.d1),
            (Level::LL, &self.ll),
        ]
        .into_iter()
    }
}

impl<T> std::ops::Index<Level> for PerLevel<T> {
    type Output = T;

    fn index(&self, level: Level) -> &Self::Output {
        match level {
            Level::I1 => &self.i1,
            Level::D1 => &self.d1,
            Level::LL => &self.ll,
        }
    }
}

impl<T> std::ops::IndexMut<Level> for PerLevel<T> {
    fn index_mut(&mut self, level: Level) -> &mut Self::Output {
        match level {
            Level::I1 => &mut self.i1,
            Level::D1 => &mut self.d1,
            Level::LL => &mut self.ll,
        }
    }
}
