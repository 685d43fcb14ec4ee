pub mod block;
pub mod shadow;

pub use block::Line;

use crate::{address, config, tag_array};
use block::WordRange;
use smallvec::SmallVec;
use stats::{Level, LocationId};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{level} access of {size} bytes at {addr:#x} spans more than two lines")]
    Straddle {
        addr: address,
        size: u32,
        level: Level,
    },

    #[error("access at {addr:#x} has size zero")]
    InvalidSize { addr: address },

    #[error("access of {size} bytes at {addr:#x} wraps around the address space")]
    Overflow { addr: address, size: u32 },
}

/// A valid line replaced by a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eviction {
    /// The line as it was before being replaced.
    pub line: Line,
    pub evicted_addr: address,
    pub installed_addr: address,
}

/// Result of one reference, which may touch two lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefOutcome {
    pub miss: bool,
    pub evictions: SmallVec<[Eviction; 2]>,
}

/// Lines and word ranges touched by one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Single(u64, WordRange),
    Straddle((u64, WordRange), (u64, WordRange)),
}

/// One simulated set-associative cache.
#[derive(Debug, Clone)]
pub struct Cache {
    level: Level,
    config: config::CacheConfig,
    tag_array: tag_array::TagArray,
}

impl Cache {
    pub fn new(
        level: Level,
        config: config::CacheConfig,
        word_size: u64,
    ) -> Result<Self, config::Error> {
        let geometry = config::Geometry::new(&config, word_size)?;
        log::info!(
            "{level}: {config} ({} sets, {} words per line)",
            geometry.num_sets,
            geometry.words_per_line
        );
        Ok(Self {
            level,
            config,
            tag_array: tag_array::TagArray::new(geometry),
        })
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn config(&self) -> &config::CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn geometry(&self) -> &config::Geometry {
        self.tag_array.geometry()
    }

    #[must_use]
    pub fn tag_array(&self) -> &tag_array::TagArray {
        &self.tag_array
    }

    fn span(&self, addr: address, size: u32) -> Result<Span, AccessError> {
        if size == 0 {
            return Err(AccessError::InvalidSize { addr });
        }
        if addr.checked_add(u64::from(size) - 1).is_none() {
            return Err(AccessError::Overflow { addr, size });
        }
        let geometry = self.geometry();
        let words_per_line = u64::from(geometry.words_per_line);
        let block = geometry.block(addr);
        let offset = addr & geometry.line_mask;
        let word_begin = offset >> geometry.word_size_bits;
        let word_end = (offset + u64::from(size) - 1) >> geometry.word_size_bits;

        if word_end < words_per_line {
            Ok(Span::Single(
                block,
                WordRange::new(word_begin as u32, word_end as u32),
            ))
        } else if word_end < 2 * words_per_line {
            let first = WordRange::new(word_begin as u32, geometry.words_per_line - 1);
            let second = WordRange::new(0, (word_end - words_per_line) as u32);
            Ok(Span::Straddle((block, first), (block + 1, second)))
        } else {
            Err(AccessError::Straddle {
                addr,
                size,
                level: self.level,
            })
        }
    }

    /// Checks that an access can be simulated without touching any state.
    ///
    /// A valid access has a nonzero size, ends at or below [`u64::MAX`]
    /// and spans at most two lines.
    pub fn check(&self, addr: address, size: u32) -> Result<(), AccessError> {
        self.span(addr, size).map(|_| ())
    }

    fn access_line(
        &mut self,
        block: u64,
        words: WordRange,
        owner: Option<LocationId>,
        evictions: &mut SmallVec<[Eviction; 2]>,
    ) -> bool {
        let geometry = *self.geometry();
        let set = geometry.set_index(block);
        let access = self.tag_array.access(set, block, words, owner);
        if let Some(line) = access.evicted {
            evictions.push(Eviction {
                line,
                evicted_addr: geometry.block_addr(line.tag),
                installed_addr: geometry.block_addr(block),
            });
        }
        !access.hit
    }

    /// Simulates one reference of `size` bytes at `addr`.
    ///
    /// A reference spanning two lines updates both and counts as a single
    /// miss if either line missed.
    pub fn access(
        &mut self,
        addr: address,
        size: u32,
        owner: Option<LocationId>,
    ) -> Result<RefOutcome, AccessError> {
        let mut evictions = SmallVec::new();
        let miss = match self.span(addr, size)? {
            Span::Single(block, words) => self.access_line(block, words, owner, &mut evictions),
            Span::Straddle((first, first_words), (second, second_words)) => {
                log::trace!("{}: access at {addr:#x} straddles two lines", self.level);
                let first_miss = self.access_line(first, first_words, owner, &mut evictions);
                let second_miss = self.access_line(second, second_words, owner, &mut evictions);
                first_miss || second_miss
            }
        };
        Ok(RefOutcome { miss, evictions })
    }

    /// Invalidates every resident line.
    ///
    /// Returns the base address and final state of each line.
    pub fn drain(&mut self) -> Vec<(address, Line)> {
        let geometry = *self.geometry();
        self.tag_array
            .drain()
            .into_iter()
            .map(|line| (geometry.block_addr(line.tag), line))
            .collect()
    }
}

impl std::fmt::Display for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}: {}, {}, {}",
            self.level,
            human_bytes::human_bytes(self.config.size as f64),
            human_bytes::human_bytes(self.config.line_size as f64),
            if self.config.associativity == 1 {
                "direct-mapped".to_string()
            } else {
                format!("{}-way associative", self.config.associativity)
            }
        )
    }
}
