use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default size of a word tracked by the spatial usage bitvector.
pub const DEFAULT_WORD_SIZE: u64 = 4;

/// Maximum number of words per line tracked by a line's word mask.
pub const MAX_WORDS_PER_LINE: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{what} of {value} is not a power of two")]
    NotPowerOfTwo { what: &'static str, value: u64 },

    #[error("{config} has no sets")]
    NoSets { config: CacheConfig },

    #[error("word size of {word_size} B exceeds line size of {line_size} B")]
    WordSize { word_size: u64, line_size: u64 },

    #[error("{words} words per line exceed the maximum of {max}", max = MAX_WORDS_PER_LINE)]
    TooManyWords { words: u64 },

    #[error("line sizes must match, got I1 {i1} B, D1 {d1} B and LL {ll} B")]
    LineSizeMismatch { i1: u64, d1: u64, ll: u64 },

    #[error("invalid cache description {0:?}: expected <size>,<associativity>,<line size>")]
    Parse(String),

    #[error(transparent)]
    Open(#[from] utils::fs::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Base 2 logarithm of n.
///
/// Only exact for powers of two.
#[must_use]
pub fn logb2(n: u64) -> u32 {
    n.max(1).ilog2()
}

fn check_power_of_two(what: &'static str, value: u64) -> Result<u64, Error> {
    if value.is_power_of_two() {
        Ok(value)
    } else {
        Err(Error::NotPowerOfTwo { what, value })
    }
}

/// Static shape of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Capacity in bytes.
    pub size: u64,
    pub associativity: u64,
    /// Line size in bytes.
    pub line_size: u64,
}

impl CacheConfig {
    #[must_use]
    pub fn new(size: u64, associativity: u64, line_size: u64) -> Self {
        Self {
            size,
            associativity,
            line_size,
        }
    }

    /// Total number of lines.
    #[must_use]
    pub fn total_lines(&self) -> u64 {
        self.size / self.line_size.max(1)
    }

    /// A single set cache of the same capacity and line size.
    #[must_use]
    pub fn fully_associative(&self) -> Self {
        Self {
            associativity: self.total_lines(),
            ..*self
        }
    }
}

impl std::fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.associativity == 1 {
            write!(f, "{} B, {} B, direct-mapped", self.size, self.line_size)
        } else {
            write!(
                f,
                "{} B, {} B, {}-way associative",
                self.size, self.line_size, self.associativity
            )
        }
    }
}

impl std::str::FromStr for CacheConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<u64> = s
            .split(',')
            .map(|value| value.trim().parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| Error::Parse(s.to_string()))?;
        match values[..] {
            [size, associativity, line_size] => Ok(Self::new(size, associativity, line_size)),
            _ => Err(Error::Parse(s.to_string())),
        }
    }
}

/// Lookup constants derived from a [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub num_sets: u64,
    pub associativity: usize,
    pub line_size: u64,
    pub line_size_bits: u32,
    pub line_mask: u64,
    pub set_index_mask: u64,
    pub tag_shift: u32,
    pub word_size_bits: u32,
    pub words_per_line: u32,
}

impl Geometry {
    pub fn new(config: &CacheConfig, word_size: u64) -> Result<Self, Error> {
        let size = check_power_of_two("cache size", config.size)?;
        let associativity = check_power_of_two("associativity", config.associativity)?;
        let line_size = check_power_of_two("line size", config.line_size)?;
        let word_size = check_power_of_two("word size", word_size)?;

        let num_sets = associativity
            .checked_mul(line_size)
            .map_or(0, |set_bytes| size / set_bytes);
        if num_sets == 0 {
            return Err(Error::NoSets { config: *config });
        }
        if word_size > line_size {
            return Err(Error::WordSize {
                word_size,
                line_size,
            });
        }
        let words_per_line = line_size / word_size;
        if words_per_line > MAX_WORDS_PER_LINE as u64 {
            return Err(Error::TooManyWords {
                words: words_per_line,
            });
        }

        let line_size_bits = logb2(line_size);
        Ok(Self {
            num_sets,
            associativity: associativity as usize,
            line_size,
            line_size_bits,
            line_mask: line_size - 1,
            set_index_mask: num_sets - 1,
            tag_shift: line_size_bits + logb2(num_sets),
            word_size_bits: logb2(word_size),
            words_per_line: words_per_line as u32,
        })
    }

    #[inline]
    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.num_sets as usize * self.associativity
    }

    #[inline]
    #[must_use]
    pub fn block(&self, addr: crate::address) -> u64 {
        addr >> self.line_size_bits
    }

    #[inline]
    #[must_use]
    pub fn set_index(&self, block: u64) -> usize {
        (block & self.set_index_mask) as usize
    }

    #[inline]
    #[must_use]
    pub fn block_addr(&self, block: u64) -> crate::address {
        block << self.line_size_bits
    }
}

/// Simulated cache hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First level instruction cache
    pub i1: CacheConfig,
    /// First level data cache
    pub d1: CacheConfig,
    /// Unified last level cache
    pub ll: CacheConfig,
    /// Granularity of spatial usage tracking in bytes.
    pub word_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            i1: CacheConfig::new(32 * 1024, 8, 64),
            d1: CacheConfig::new(32 * 1024, 8, 64),
            ll: CacheConfig::new(8 * 1024 * 1024, 16, 64),
            word_size: DEFAULT_WORD_SIZE,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let reader = utils::fs::open_readable(path)?;
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Checks that every cache has a valid geometry.
    ///
    /// All levels must share one line size, as first touches are tracked
    /// at a single block granularity.
    pub fn validate(&self) -> Result<(), Error> {
        for cache in [&self.i1, &self.d1, &self.ll] {
            Geometry::new(cache, self.word_size)?;
        }
        let (i1, d1, ll) = (self.i1.line_size, self.d1.line_size, self.ll.line_size);
        if i1 != d1 || d1 != ll {
            return Err(Error::LineSizeMismatch { i1, d1, ll });
        }
        Ok(())
    }
}
