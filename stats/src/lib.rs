#![allow(non_camel_case_types, clippy::upper_case_acronyms)]

pub mod cache;
pub mod location;
pub mod mem;
pub mod variable;

pub use cache::{CacheCounters, Histogram, Level, MissCounters, MissKind, PerLevel, NUM_BINS};
pub use location::{LineStats, LocationId, PerLocation, SourceLocation, Summary};
pub use mem::AccessKind;
pub use variable::{PairKey, VariableId, VariableUsage};

/// (De)serializes a map with non-string keys as a sequence of pairs.
pub(crate) mod as_seq {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
