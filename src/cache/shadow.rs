//! Auxiliary caches used to classify misses of the simulated caches.
//!
//! Shadow caches only track which blocks are resident. They never report
//! hit or miss counts of their own.

use crate::{address, config};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;

/// Cache of unbounded capacity.
///
/// A miss means the block was never touched before.
#[derive(Debug, Clone)]
pub struct Infinite {
    line_size_bits: u32,
    blocks: HashSet<u64>,
}

impl Infinite {
    #[must_use]
    pub fn new(line_size: u64) -> Self {
        Self {
            line_size_bits: config::logb2(line_size),
            blocks: HashSet::new(),
        }
    }

    /// Records a touch of every block in the byte range `first..=last`.
    ///
    /// # Returns
    /// Whether any of the blocks was touched for the first time.
    pub fn access(&mut self, first: address, last: address) -> bool {
        let mut miss = false;
        for block in (first >> self.line_size_bits)..=(last >> self.line_size_bits) {
            miss |= self.blocks.insert(block);
        }
        miss
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Single set LRU cache with the capacity of the cache it shadows.
///
/// Only residency matters, so blocks map to `()`.
#[derive(Debug)]
pub struct FullyAssociative {
    line_size_bits: u32,
    blocks: LruCache<u64, ()>,
}

impl FullyAssociative {
    pub fn new(config: &config::CacheConfig, word_size: u64) -> Result<Self, config::Error> {
        let geometry = config::Geometry::new(&config.fully_associative(), word_size)?;
        let capacity = NonZeroUsize::new(geometry.total_lines())
            .ok_or(config::Error::NoSets { config: *config })?;
        Ok(Self {
            line_size_bits: geometry.line_size_bits,
            blocks: LruCache::new(capacity),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks.cap().get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn access_block(&mut self, block: u64) -> bool {
        if self.blocks.get(&block).is_some() {
            true
        } else {
            self.blocks.put(block, ());
            false
        }
    }

    /// Simulates a reference to the byte range `first..=last`.
    ///
    /// # Returns
    /// Whether any of the touched lines missed.
    pub fn access(&mut self, first: address, last: address) -> bool {
        let mut miss = false;
        for block in (first >> self.line_size_bits)..=(last >> self.line_size_bits) {
            miss |= !self.access_block(block);
        }
        miss
    }
}
