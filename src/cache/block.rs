use crate::config::MAX_WORDS_PER_LINE;
use bitvec::{array::BitArray, BitArr};
use stats::LocationId;

/// Words of a line touched during its residency.
pub type WordMask = BitArr!(for MAX_WORDS_PER_LINE, in u64);

/// Inclusive range of words within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordRange {
    pub first: u32,
    pub last: u32,
}

impl WordRange {
    #[must_use]
    pub fn new(first: u32, last: u32) -> Self {
        debug_assert!(first <= last);
        debug_assert!((last as usize) < MAX_WORDS_PER_LINE);
        Self { first, last }
    }
}

/// Sets all words of `range` in `mask`.
#[inline]
pub fn set_range(mask: &mut WordMask, range: WordRange) {
    mask[range.first as usize..=range.last as usize].fill(true);
}

/// Number of distinct words set in `mask`.
#[inline]
#[must_use]
pub fn count(mask: &WordMask) -> u32 {
    mask.count_ones() as u32
}

/// One slot of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Line {
    /// Block number of the resident line.
    pub tag: u64,
    pub valid: bool,
    pub words: WordMask,
    /// Hits since the line was installed.
    pub accesses: u64,
    /// Location that installed the line.
    pub owner: Option<LocationId>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            tag: 0,
            valid: false,
            words: BitArray::ZERO,
            accesses: 0,
            owner: None,
        }
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("tag", &self.tag)
            .field("valid", &self.valid)
            .field("words", &self.words_used())
            .field("accesses", &self.accesses)
            .finish()
    }
}

impl Line {
    #[inline]
    pub fn allocate(&mut self, tag: u64, words: WordRange, owner: Option<LocationId>) {
        self.tag = tag;
        self.valid = true;
        self.words = BitArray::ZERO;
        set_range(&mut self.words, words);
        self.accesses = 0;
        self.owner = owner;
    }

    #[inline]
    pub fn touch(&mut self, words: WordRange) {
        set_range(&mut self.words, words);
        self.accesses += 1;
    }

    #[inline]
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    #[inline]
    #[must_use]
    pub fn words_used(&self) -> u32 {
        count(&self.words)
    }
}
