use super::cache::{CacheCounters, Histogram, MissCounters, PerLevel};
use super::mem::AccessKind;
use super::variable::{PairKey, VariableId, VariableUsage};
use super::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source code location that issued an access.
///
/// Ordered by file, then function, then line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub func: String,
    pub line: u32,
}

impl SourceLocation {
    pub const UNKNOWN: &'static str = "???";

    #[must_use]
    pub fn new(file: impl Into<String>, func: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            func: func.into(),
            line,
        }
    }

    /// Location used for accesses without debug information.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN, Self::UNKNOWN, 0)
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.func, self.line)
    }
}

/// Index of a location in a [`PerLocation`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub usize);

/// Statistics aggregated for one source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub location: SourceLocation,
    /// Instruction fetch counts
    pub ir: CacheCounters,
    /// Data read counts
    pub dr: CacheCounters,
    /// Data write counts
    pub dw: CacheCounters,
    /// Evictions of lines installed by this location, by words used.
    pub evictions: PerLevel<Histogram>,
    /// Usage of evicted variable lines, attributed to the evicting location.
    pub variable_usage: PerLevel<BTreeMap<VariableId, VariableUsage>>,
    /// First level data cache interference between variables.
    #[serde(with = "crate::as_seq")]
    pub interference: BTreeMap<PairKey, MissCounters>,
}

impl LineStats {
    #[must_use]
    pub fn new(location: SourceLocation) -> Self {
        Self {
            location,
            ir: CacheCounters::default(),
            dr: CacheCounters::default(),
            dw: CacheCounters::default(),
            evictions: PerLevel::default(),
            variable_usage: PerLevel::default(),
            interference: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn counters(&self, kind: AccessKind) -> &CacheCounters {
        match kind {
            AccessKind::INST_FETCH => &self.ir,
            AccessKind::DATA_READ => &self.dr,
            AccessKind::DATA_WRITE => &self.dw,
        }
    }

    pub fn counters_mut(&mut self, kind: AccessKind) -> &mut CacheCounters {
        match kind {
            AccessKind::INST_FETCH => &mut self.ir,
            AccessKind::DATA_READ => &mut self.dr,
            AccessKind::DATA_WRITE => &mut self.dw,
        }
    }

    pub fn variable_usage_mut(&mut self, level: Level, var: VariableId) -> &mut VariableUsage {
        self.variable_usage[level].entry(var).or_default()
    }

    pub fn interference_mut(&mut self, pair: PairKey) -> &mut MissCounters {
        self.interference.entry(pair).or_default()
    }
}

/// Totals over all locations.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub ir: CacheCounters,
    pub dr: CacheCounters,
    pub dw: CacheCounters,
    pub evictions: PerLevel<Histogram>,
}

impl Summary {
    #[must_use]
    pub fn counters(&self, kind: AccessKind) -> &CacheCounters {
        match kind {
            AccessKind::INST_FETCH => &self.ir,
            AccessKind::DATA_READ => &self.dr,
            AccessKind::DATA_WRITE => &self.dw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRow {
    pub file: String,
    pub func: String,
    pub line: u32,
    pub access_kind: AccessKind,
    pub accesses: u64,
    pub l1_misses: u64,
    pub l1_compulsory: u64,
    pub l1_conflict: u64,
    pub l1_capacity: u64,
    pub ll_misses: u64,
    pub ll_compulsory: u64,
    pub ll_conflict: u64,
    pub ll_capacity: u64,
}

/// Statistics of all source locations.
///
/// Entries live in an arena so cache lines can refer to their owner by
/// [`LocationId`]; the ordered index provides file/function/line order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PerLocation {
    index: BTreeMap<SourceLocation, LocationId>,
    entries: Vec<LineStats>,
}

impl PerLocation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, location: &SourceLocation) -> LocationId {
        if let Some(id) = self.index.get(location) {
            return *id;
        }
        let id = LocationId(self.entries.len());
        self.entries.push(LineStats::new(location.clone()));
        self.index.insert(location.clone(), id);
        id
    }

    #[must_use]
    pub fn get(&self, id: LocationId) -> &LineStats {
        &self.entries[id.0]
    }

    pub fn get_mut(&mut self, id: LocationId) -> &mut LineStats {
        &mut self.entries[id.0]
    }

    #[must_use]
    pub fn find(&self, location: &SourceLocation) -> Option<&LineStats> {
        self.index.get(location).map(|id| &self.entries[id.0])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates in file, function, line order.
    pub fn iter(&self) -> impl Iterator<Item = &LineStats> + '_ {
        self.index.values().map(|id| &self.entries[id.0])
    }

    #[must_use]
    pub fn reduce(&self) -> Summary {
        let mut out = Summary::default();
        for stats in &self.entries {
            out.ir += stats.ir;
            out.dr += stats.dr;
            out.dw += stats.dw;
            out.evictions.i1 += stats.evictions.i1;
            out.evictions.d1 += stats.evictions.d1;
            out.evictions.ll += stats.evictions.ll;
        }
        out
    }

    #[must_use]
    pub fn flatten(&self) -> Vec<CsvRow> {
        use strum::IntoEnumIterator;
        self.iter()
            .flat_map(|stats| {
                AccessKind::iter().filter_map(move |kind| {
                    let counters = stats.counters(kind);
                    if counters.accesses == 0 {
                        return None;
                    }
                    Some(CsvRow {
                        file: stats.location.file.clone(),
                        func: stats.location.func.clone(),
                        line: stats.location.line,
                        access_kind: kind,
                        accesses: counters.accesses,
                        l1_misses: counters.l1_misses,
                        l1_compulsory: counters.l1_causes.compulsory,
                        l1_conflict: counters.l1_causes.conflict,
                        l1_capacity: counters.l1_causes.capacity,
                        ll_misses: counters.ll_misses,
                        ll_compulsory: counters.ll_causes.compulsory,
                        ll_conflict: counters.ll_causes.conflict,
                        ll_capacity: counters.ll_causes.capacity,
                    })
                })
            })
            .collect()
    }
}

impl Serialize for PerLocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PerLocation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries: Vec<LineStats> = Vec::deserialize(deserializer)?;
        let mut out = Self::default();
        for stats in entries {
            let id = out.get_or_create(&stats.location);
            *out.get_mut(id) = stats;
        }
        Ok(out)
    }
}
