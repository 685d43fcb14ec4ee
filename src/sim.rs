use crate::address;
use crate::cache::{self, shadow, Cache, Eviction};
use crate::config::{self, Config};
use crate::variable::{self, LoadStatus, Variables};
use smallvec::SmallVec;
use stats::{
    AccessKind, Level, LocationId, MissKind, PairKey, PerLevel, PerLocation, SourceLocation,
};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Access(#[from] cache::AccessError),

    #[error("simulation already finished")]
    Finished,
}

/// Result of a reference at one cache level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelOutcome {
    Hit,
    Miss(MissKind),
}

impl LevelOutcome {
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss(_))
    }
}

/// Result of one simulated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outcome {
    /// First level instruction or data cache.
    pub l1: LevelOutcome,
    /// Last level cache, only consulted on a first level miss.
    pub ll: Option<LevelOutcome>,
}

/// Cause of a miss given the results of both shadow caches.
#[inline]
#[must_use]
pub fn classify(compulsory: bool, fully_associative_miss: bool) -> MissKind {
    if compulsory {
        MissKind::COMPULSORY
    } else if fully_associative_miss {
        MissKind::CAPACITY
    } else {
        MissKind::CONFLICT
    }
}

/// Instruction, data and last level caches with miss classification.
#[derive(Debug)]
pub struct Simulator {
    config: Config,
    caches: PerLevel<Cache>,
    /// Every block ever touched, shared by all levels of one line size.
    infinite: shadow::Infinite,
    /// Fully associative shadow of each cache.
    fully_associative: PerLevel<shadow::FullyAssociative>,
    variables: Variables,
    stats: PerLocation,
    unknown: Option<LocationId>,
    num_accesses: u64,
    finished: bool,
}

impl Simulator {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let word_size = config.word_size;
        let caches = PerLevel {
            i1: Cache::new(Level::I1, config.i1, word_size)?,
            d1: Cache::new(Level::D1, config.d1, word_size)?,
            ll: Cache::new(Level::LL, config.ll, word_size)?,
        };
        let fully_associative = PerLevel {
            i1: shadow::FullyAssociative::new(&config.i1, word_size)?,
            d1: shadow::FullyAssociative::new(&config.d1, word_size)?,
            ll: shadow::FullyAssociative::new(&config.ll, word_size)?,
        };
        Ok(Self {
            infinite: shadow::Infinite::new(config.d1.line_size),
            config,
            caches,
            fully_associative,
            variables: Variables::new(),
            stats: PerLocation::new(),
            unknown: None,
            num_accesses: 0,
            finished: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn cache(&self, level: Level) -> &Cache {
        &self.caches[level]
    }

    #[must_use]
    pub fn stats(&self) -> &PerLocation {
        &self.stats
    }

    /// Statistics gathered so far.
    ///
    /// Lines still resident are only accounted for after [`Simulator::finish`].
    #[must_use]
    pub fn into_stats(self) -> PerLocation {
        self.stats
    }

    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    #[must_use]
    pub fn num_accesses(&self) -> u64 {
        self.num_accesses
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Attempts to load the variable listing at `path`.
    ///
    /// Does nothing once variables have been loaded.
    pub fn try_load_variables(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<LoadStatus, variable::Error> {
        self.variables.try_load(path)
    }

    fn location_id(&mut self, location: Option<&SourceLocation>) -> LocationId {
        match location {
            Some(location) => self.stats.get_or_create(location),
            None => match self.unknown {
                Some(id) => id,
                None => {
                    let id = self.stats.get_or_create(&SourceLocation::unknown());
                    self.unknown = Some(id);
                    id
                }
            },
        }
    }

    /// Simulates one access of `size` bytes at `addr`.
    ///
    /// Instruction fetches go through I1, data accesses through D1, and
    /// first level misses continue to LL. A malformed access is rejected
    /// before any state changes.
    pub fn access(
        &mut self,
        addr: address,
        size: u32,
        kind: AccessKind,
        location: Option<&SourceLocation>,
    ) -> Result<Outcome, Error> {
        if self.finished {
            return Err(Error::Finished);
        }
        for (_, cache) in self.caches.iter() {
            cache.check(addr, size)?;
        }

        let loc = self.location_id(location);
        self.stats.get_mut(loc).counters_mut(kind).accesses += 1;
        self.num_accesses += 1;

        let l1_level = if kind.is_instruction() {
            Level::I1
        } else {
            Level::D1
        };

        // checked above
        let last = addr + u64::from(size) - 1;
        let compulsory = self.infinite.access(addr, last);
        let l1_shadow_miss = self.fully_associative[l1_level].access(addr, last);
        let ll_shadow_miss = self.fully_associative.ll.access(addr, last);

        let l1 = self.caches[l1_level].access(addr, size, Some(loc))?;
        if !l1.miss {
            log::trace!("{kind} {addr:#x}: {l1_level} hit");
            return Ok(Outcome {
                l1: LevelOutcome::Hit,
                ll: None,
            });
        }
        let l1_cause = classify(compulsory, l1_shadow_miss);
        self.stats.get_mut(loc).counters_mut(kind).record_l1_miss(l1_cause);
        self.account_evictions(l1_level, loc, &l1.evictions, l1_cause);

        let ll = self.caches.ll.access(addr, size, Some(loc))?;
        let ll_outcome = if ll.miss {
            let ll_cause = classify(compulsory, ll_shadow_miss);
            self.stats.get_mut(loc).counters_mut(kind).record_ll_miss(ll_cause);
            self.account_evictions(Level::LL, loc, &ll.evictions, ll_cause);
            LevelOutcome::Miss(ll_cause)
        } else {
            LevelOutcome::Hit
        };
        log::trace!("{kind} {addr:#x}: {l1_level} miss ({l1_cause:?}), LL {ll_outcome:?}");

        Ok(Outcome {
            l1: LevelOutcome::Miss(l1_cause),
            ll: Some(ll_outcome),
        })
    }

    /// Accounts for lines evicted by a miss of location `current`.
    fn account_evictions(
        &mut self,
        level: Level,
        current: LocationId,
        evictions: &[Eviction],
        cause: MissKind,
    ) {
        let mut pairs: SmallVec<[PairKey; 2]> = SmallVec::new();
        for eviction in evictions {
            let words_used = eviction.line.words_used();
            if let Some(owner) = eviction.line.owner {
                self.stats.get_mut(owner).evictions[level].record(words_used);
            }

            let Some(evicted) = self.variables.resolve(eviction.evicted_addr).map(|var| var.id)
            else {
                continue;
            };
            self.stats
                .get_mut(current)
                .variable_usage_mut(level, evicted)
                .record_eviction(eviction.line.accesses, words_used);

            if level != Level::D1 {
                continue;
            }
            let installed = self
                .variables
                .resolve(eviction.installed_addr)
                .map(|var| var.id);
            if let Some(installed) = installed.filter(|installed| *installed != evicted) {
                let pair = PairKey { evicted, installed };
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }

        let stats = self.stats.get_mut(current);
        for pair in pairs {
            log::trace!("{level}: variable {} evicted by {}", pair.evicted, pair.installed);
            stats.interference_mut(pair).inc(cause);
        }
    }

    /// Flushes the statistics of all resident lines.
    ///
    /// Must be called once after the last access. Later calls and accesses
    /// are rejected with [`Error::Finished`].
    pub fn finish(&mut self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::Finished);
        }
        for level in [Level::I1, Level::D1, Level::LL] {
            let drained = self.caches[level].drain();
            let mut flushed = 0;
            for (addr, line) in drained {
                let words_used = line.words_used();
                let Some(owner) = line.owner.filter(|_| words_used > 0) else {
                    continue;
                };
                let var = self.variables.resolve(addr).map(|var| var.id);
                let stats = self.stats.get_mut(owner);
                stats.evictions[level].record(words_used);
                if let Some(var) = var {
                    stats
                        .variable_usage_mut(level, var)
                        .record_eviction(line.accesses, words_used);
                }
                flushed += 1;
            }
            log::debug!("{level}: flushed {flushed} resident lines");
        }
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Error, LevelOutcome, Outcome, Simulator};
    use crate::cache::AccessError;
    use crate::config::{self, CacheConfig, Config};
    use crate::testing;
    use color_eyre::eyre;
    use stats::{AccessKind, Level, MissCounters, MissKind, PairKey, SourceLocation};
    use strum::IntoEnumIterator;
    use utils::diff;

    const MISS_COMPULSORY: LevelOutcome = LevelOutcome::Miss(MissKind::COMPULSORY);

    fn read(sim: &mut Simulator, addr: u64, size: u32) -> Result<Outcome, Error> {
        sim.access(addr, size, AccessKind::DATA_READ, None)
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify(true, true), MissKind::COMPULSORY);
        assert_eq!(classify(true, false), MissKind::COMPULSORY);
        assert_eq!(classify(false, true), MissKind::CAPACITY);
        assert_eq!(classify(false, false), MissKind::CONFLICT);
    }

    #[test]
    fn two_way_four_lines() -> eyre::Result<()> {
        testing::init_logging();
        let mut sim = Simulator::new(testing::small_config())?;
        let outcomes = [0x00, 0x10, 0x20, 0x00]
            .into_iter()
            .map(|addr| read(&mut sim, addr, 4))
            .collect::<Result<Vec<_>, _>>()?;

        let miss = Outcome {
            l1: MISS_COMPULSORY,
            ll: Some(MISS_COMPULSORY),
        };
        let hit = Outcome {
            l1: LevelOutcome::Hit,
            ll: None,
        };
        diff::assert_eq!(have: outcomes, want: vec![miss, miss, miss, hit]);

        let dr = sim.stats().reduce().dr;
        assert_eq!(dr.accesses, 4);
        assert_eq!(dr.l1_misses, 3);
        assert_eq!(dr.l1_causes.compulsory, 3);
        assert_eq!(dr.ll_causes.compulsory, 3);
        assert!(dr.is_consistent());
        Ok(())
    }

    #[test]
    fn repeated_access_hits() -> eyre::Result<()> {
        let mut sim = Simulator::new(testing::small_config())?;
        read(&mut sim, 0x100, 8)?;
        let before = sim.stats().reduce().dr;
        for _ in 0..10 {
            assert_eq!(read(&mut sim, 0x100, 8)?.l1, LevelOutcome::Hit);
        }
        let after = sim.stats().reduce().dr;
        assert_eq!(after.accesses, before.accesses + 10);
        assert_eq!(after.l1_causes, before.l1_causes);
        assert_eq!(after.ll_causes, before.ll_causes);
        Ok(())
    }

    #[test]
    fn direct_mapped_conflict() -> eyre::Result<()> {
        let config = Config {
            // 4 sets of one 16 byte line
            d1: CacheConfig::new(64, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        read(&mut sim, 0x00, 4)?;
        read(&mut sim, 0x40, 4)?;
        let outcome = read(&mut sim, 0x00, 4)?;
        diff::assert_eq!(
            have: outcome,
            want: Outcome {
                l1: LevelOutcome::Miss(MissKind::CONFLICT),
                ll: Some(LevelOutcome::Hit),
            }
        );
        let outcome = read(&mut sim, 0x40, 4)?;
        assert_eq!(outcome.l1, LevelOutcome::Miss(MissKind::CONFLICT));
        Ok(())
    }

    #[test]
    fn capacity_miss() -> eyre::Result<()> {
        let config = Config {
            d1: CacheConfig::new(64, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        for addr in [0x00, 0x10, 0x20, 0x30, 0x40] {
            read(&mut sim, addr, 4)?;
        }
        // block 0 left both the real and the fully associative cache
        let outcome = read(&mut sim, 0x00, 4)?;
        assert_eq!(outcome.l1, LevelOutcome::Miss(MissKind::CAPACITY));
        Ok(())
    }

    #[test]
    fn instruction_fetches_use_i1() -> eyre::Result<()> {
        let mut sim = Simulator::new(testing::small_config())?;
        let main = SourceLocation::new("main.c", "main", 3);
        sim.access(0x400, 4, AccessKind::INST_FETCH, Some(&main))?;
        sim.access(0x400, 4, AccessKind::INST_FETCH, Some(&main))?;
        // fetched before, so not compulsory, but new to the data shadow
        let outcome = sim.access(0x404, 4, AccessKind::DATA_READ, Some(&main))?;
        assert_eq!(outcome.l1, LevelOutcome::Miss(MissKind::CAPACITY));
        assert_eq!(outcome.ll, Some(LevelOutcome::Hit));

        let stats = sim.stats().find(&main).expect("location");
        assert_eq!(stats.ir.accesses, 2);
        assert_eq!(stats.ir.l1_misses, 1);
        assert_eq!(stats.dr.accesses, 1);
        assert_eq!(sim.cache(Level::I1).tag_array().num_access(), 2);
        assert_eq!(sim.cache(Level::LL).tag_array().num_access(), 2);
        Ok(())
    }

    #[test]
    fn eviction_histogram_counts_words_used() -> eyre::Result<()> {
        let config = Config {
            d1: CacheConfig::new(64, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        let producer = SourceLocation::new("a.c", "produce", 10);
        let consumer = SourceLocation::new("a.c", "consume", 20);
        sim.access(0x00, 8, AccessKind::DATA_WRITE, Some(&producer))?;
        sim.access(0x0c, 4, AccessKind::DATA_READ, Some(&consumer))?;
        // evicts the line installed by the producer with 3 words touched
        sim.access(0x40, 4, AccessKind::DATA_READ, Some(&consumer))?;

        let producer_stats = sim.stats().find(&producer).expect("producer");
        assert_eq!(producer_stats.evictions.d1.bins()[2], 1);
        assert_eq!(producer_stats.evictions.d1.total(), 1);
        assert_eq!(producer_stats.evictions.ll.total(), 0);
        let consumer_stats = sim.stats().find(&consumer).expect("consumer");
        assert_eq!(consumer_stats.evictions.d1.total(), 0);
        Ok(())
    }

    #[test]
    fn attributes_evictions_to_variables() -> eyre::Result<()> {
        let config = Config {
            d1: CacheConfig::new(64, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        sim.variables_mut().load("a 0 3f\nb 40 7f\n".as_bytes())?;

        let reader = SourceLocation::new("v.c", "read_a", 1);
        let writer = SourceLocation::new("v.c", "write_b", 2);
        sim.access(0x00, 4, AccessKind::DATA_READ, Some(&reader))?;
        sim.access(0x04, 4, AccessKind::DATA_READ, Some(&reader))?;
        sim.access(0x40, 4, AccessKind::DATA_WRITE, Some(&writer))?;

        let stats = sim.stats().find(&writer).expect("writer");
        let usage = stats.variable_usage.d1.get(&0).expect("usage of a");
        assert_eq!(usage.accesses, 1);
        assert_eq!(usage.evictions.bins()[1], 1);
        diff::assert_eq!(
            have: stats.interference.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            want: vec![(
                PairKey { evicted: 0, installed: 1 },
                MissCounters { compulsory: 1, ..MissCounters::default() },
            )]
        );
        assert!(stats.variable_usage.ll.is_empty());
        Ok(())
    }

    #[test]
    fn straddling_miss_counts_interference_once() -> eyre::Result<()> {
        let config = Config {
            d1: CacheConfig::new(64, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        sim.variables_mut().load("a 0 3f\nb 40 7f\n".as_bytes())?;

        let reader = SourceLocation::new("v.c", "read_a", 1);
        let writer = SourceLocation::new("v.c", "write_b", 2);
        sim.access(0x08, 4, AccessKind::DATA_READ, Some(&reader))?;
        sim.access(0x10, 4, AccessKind::DATA_READ, Some(&reader))?;
        // spans blocks 4 and 5, evicting both lines of a
        let outcome = sim.access(0x4c, 8, AccessKind::DATA_WRITE, Some(&writer))?;
        assert_eq!(outcome.l1, MISS_COMPULSORY);

        let stats = sim.stats().find(&writer).expect("writer");
        let usage = stats.variable_usage.d1.get(&0).expect("usage of a");
        assert_eq!(usage.evictions.total(), 2);
        assert_eq!(usage.evictions.bins()[0], 2);
        assert_eq!(stats.dw.l1_misses, 1);
        diff::assert_eq!(
            have: stats.interference.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            want: vec![(
                PairKey { evicted: 0, installed: 1 },
                MissCounters { compulsory: 1, ..MissCounters::default() },
            )]
        );
        let reader_stats = sim.stats().find(&reader).expect("reader");
        assert_eq!(reader_stats.evictions.d1.total(), 2);
        assert!(reader_stats.variable_usage.d1.is_empty());
        Ok(())
    }

    #[test]
    fn attributes_ll_evictions_to_current_location() -> eyre::Result<()> {
        let config = Config {
            d1: CacheConfig::new(64, 1, 16),
            // 8 sets of one line
            ll: CacheConfig::new(128, 1, 16),
            ..testing::small_config()
        };
        let mut sim = Simulator::new(config)?;
        sim.variables_mut().load("a 0 7f\nb 80 ff\n".as_bytes())?;

        let reader = SourceLocation::new("v.c", "read_a", 1);
        let writer = SourceLocation::new("v.c", "write_b", 2);
        sim.access(0x00, 8, AccessKind::DATA_READ, Some(&reader))?;
        let outcome = sim.access(0x80, 4, AccessKind::DATA_WRITE, Some(&writer))?;
        assert_eq!(outcome.ll, Some(MISS_COMPULSORY));

        let stats = sim.stats().find(&writer).expect("writer");
        let usage = stats.variable_usage.ll.get(&0).expect("LL usage of a");
        assert_eq!(usage.evictions.bins()[1], 1);
        assert_eq!(usage.evictions.total(), 1);
        // no LL interference pairs
        assert_eq!(stats.interference.len(), 1);
        let reader_stats = sim.stats().find(&reader).expect("reader");
        assert_eq!(reader_stats.evictions.ll.bins()[1], 1);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_line_sizes() {
        // LL blocks smaller than D1 blocks would be first touched on L1 hits
        let config = Config {
            d1: CacheConfig::new(128, 1, 64),
            ll: CacheConfig::new(64 * 1024, 4, 32),
            ..Config::default()
        };
        let err = Simulator::new(config).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(config::Error::LineSizeMismatch { d1: 64, ll: 32, .. })
        ));
    }

    #[test]
    fn rejects_access_past_end_of_address_space() -> eyre::Result<()> {
        let mut sim = Simulator::new(Config::default())?;
        let err = read(&mut sim, u64::MAX - 3, 8).unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::Overflow { size: 8, .. })
        ));
        assert_eq!(sim.num_accesses(), 0);

        let outcome = read(&mut sim, u64::MAX - 3, 4)?;
        assert_eq!(outcome.l1, MISS_COMPULSORY);
        assert_eq!(outcome.ll, Some(MISS_COMPULSORY));
        assert_eq!(read(&mut sim, u64::MAX, 1)?.l1, LevelOutcome::Hit);
        Ok(())
    }

    #[test]
    fn variables_do_not_change_counters() -> eyre::Result<()> {
        let trace = testing::pseudo_random_trace(2_000, 42);
        let mut plain = Simulator::new(testing::small_config())?;
        let mut attributed = Simulator::new(testing::small_config())?;
        attributed
            .variables_mut()
            .load("x 0 1ff\ny 200 3ff\n".as_bytes())?;

        for sim in [&mut plain, &mut attributed] {
            for (addr, size, kind, location) in &trace {
                sim.access(*addr, *size, *kind, Some(location))?;
            }
            sim.finish()?;
        }
        let (plain, attributed) = (plain.stats().reduce(), attributed.stats().reduce());
        diff::assert_eq!(have: attributed, want: plain);
        Ok(())
    }

    #[test]
    fn causes_sum_to_misses() -> eyre::Result<()> {
        let trace = testing::pseudo_random_trace(5_000, 7);
        let mut sim = Simulator::new(testing::small_config())?;
        for (addr, size, kind, location) in &trace {
            sim.access(*addr, *size, *kind, Some(location))?;
        }
        for stats in sim.stats().iter() {
            for kind in AccessKind::iter() {
                assert!(
                    stats.counters(kind).is_consistent(),
                    "{} {kind}: {:?}",
                    stats.location,
                    stats.counters(kind)
                );
            }
        }
        let summary = sim.stats().reduce();
        for kind in AccessKind::iter() {
            let fed = trace.iter().filter(|(_, _, k, _)| *k == kind).count() as u64;
            assert_eq!(summary.counters(kind).accesses, fed);
        }
        assert_eq!(sim.num_accesses(), trace.len() as u64);
        Ok(())
    }

    #[test]
    fn malformed_access_leaves_state_untouched() -> eyre::Result<()> {
        let mut sim = Simulator::new(testing::small_config())?;
        let err = read(&mut sim, 0x0c, 64).unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::Straddle { size: 64, .. })
        ));
        let err = read(&mut sim, 0x0c, 0).unwrap_err();
        assert!(matches!(err, Error::Access(AccessError::InvalidSize { .. })));
        assert!(sim.stats().is_empty());
        assert_eq!(sim.num_accesses(), 0);
        // still a first touch afterwards
        assert_eq!(read(&mut sim, 0x0c, 4)?.l1, MISS_COMPULSORY);
        Ok(())
    }

    #[test]
    fn unknown_location() -> eyre::Result<()> {
        let mut sim = Simulator::new(testing::small_config())?;
        read(&mut sim, 0x0, 4)?;
        read(&mut sim, 0x4, 4)?;
        assert_eq!(sim.stats().len(), 1);
        let stats = sim.stats().find(&SourceLocation::unknown()).expect("???");
        assert_eq!(stats.dr.accesses, 2);
        Ok(())
    }

    #[test]
    fn finish_flushes_once() -> eyre::Result<()> {
        let mut sim = Simulator::new(testing::small_config())?;
        sim.variables_mut().load("buf 0 ff\n".as_bytes())?;
        let main = SourceLocation::new("main.c", "main", 1);
        sim.access(0x00, 8, AccessKind::DATA_READ, Some(&main))?;
        sim.access(0x00, 4, AccessKind::DATA_READ, Some(&main))?;
        sim.finish()?;

        let flushed = sim.stats().find(&main).expect("main").clone();
        assert_eq!(flushed.evictions.d1.bins()[1], 1);
        assert_eq!(flushed.evictions.ll.bins()[1], 1);
        assert_eq!(flushed.evictions.i1.total(), 0);
        let usage = flushed.variable_usage.d1.get(&0).expect("usage of buf");
        assert_eq!(usage.accesses, 1);

        assert!(sim.is_finished());
        assert!(matches!(sim.finish(), Err(Error::Finished)));
        assert!(matches!(read(&mut sim, 0x0, 4), Err(Error::Finished)));
        diff::assert_eq!(have: sim.stats().find(&main), want: Some(&flushed));
        Ok(())
    }
}
