pub mod listing;

pub use listing::{Entry, Listing, Poller, DEFAULT_POLL_INTERVAL};

use crate::address;
use stats::VariableId;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] utils::fs::Error),

    #[error("failed to read variable listing {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Named address range of the traced program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    /// First byte of the variable.
    pub begin: address,
    /// Last byte of the variable.
    pub end: address,
}

impl Variable {
    #[must_use]
    pub fn num_bytes(&self) -> u64 {
        self.end - self.begin + 1
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:#x}, {:#x}] ({})",
            self.name,
            self.begin,
            self.end,
            human_bytes::human_bytes(self.num_bytes() as f64)
        )
    }
}

/// Outcome of an attempt to load the variable listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// Number of variables added to the table.
    Loaded(usize),
    /// The listing had no complete entry yet.
    Pending,
    /// A previous attempt already loaded the table.
    AlreadyLoaded,
}

/// Non-overlapping address ranges of named variables.
///
/// The table is filled by the first load that yields at least one entry
/// and never changes afterwards.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    ranges: rangemap::RangeInclusiveMap<address, VariableId>,
    variables: Vec<Variable>,
    loaded: bool,
}

impl Variables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable covering `addr`, if any.
    #[inline]
    #[must_use]
    pub fn resolve(&self, addr: address) -> Option<&Variable> {
        self.ranges
            .get(&addr)
            .map(|id| &self.variables[*id as usize])
    }

    #[must_use]
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id as usize)
    }

    /// Variables in load order.
    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn insert(&mut self, entry: Entry) -> bool {
        if entry.begin > entry.end {
            log::warn!(
                "skipping variable {} with reversed range {:#x}..={:#x}",
                entry.name,
                entry.begin,
                entry.end
            );
            return false;
        }
        let range = entry.begin..=entry.end;
        if self.ranges.overlaps(&range) {
            log::warn!(
                "skipping variable {} overlapping {:?}",
                entry.name,
                self.ranges.overlapping(&range).next().map(|(_, id)| id)
            );
            return false;
        }
        let id = self.variables.len() as VariableId;
        self.ranges.insert(range, id);
        self.variables.push(Variable {
            id,
            name: entry.name,
            begin: entry.begin,
            end: entry.end,
        });
        true
    }

    /// Loads the listing from `reader` unless the table is already loaded.
    ///
    /// On a read error the table is left unchanged.
    pub fn load<R: std::io::Read>(&mut self, reader: R) -> std::io::Result<LoadStatus> {
        if self.loaded {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let entries = Listing::new(reader).read_all()?;
        if entries.is_empty() {
            return Ok(LoadStatus::Pending);
        }
        let added = entries
            .into_iter()
            .map(|entry| self.insert(entry))
            .filter(|added| *added)
            .count();
        self.loaded = true;
        log::info!("loaded {added} variables");
        Ok(LoadStatus::Loaded(added))
    }

    /// Attempts to load the listing at `path`.
    ///
    /// A missing or unreadable file is returned as an error and can be
    /// retried later.
    pub fn try_load(&mut self, path: impl AsRef<Path>) -> Result<LoadStatus, Error> {
        if self.loaded {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let path = path.as_ref();
        let reader = utils::fs::open_readable(path)?;
        self.load(reader).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LoadStatus, Variables};
    use color_eyre::eyre;

    #[test]
    fn resolves_inclusive_ranges() -> eyre::Result<()> {
        let mut variables = Variables::new();
        let status = variables.load("buf 1000 10ff\n".as_bytes())?;
        assert_eq!(status, LoadStatus::Loaded(1));

        let buf = variables.resolve(0x1050).map(|var| var.name.as_str());
        assert_eq!(buf, Some("buf"));
        assert_eq!(variables.resolve(0x10ff).map(|var| var.id), Some(0));
        assert_eq!(variables.resolve(0x1100), None);
        assert_eq!(variables.resolve(0x2000), None);
        assert_eq!(
            variables.get(0).map(ToString::to_string).as_deref(),
            Some("buf [0x1000, 0x10ff] (256 B)")
        );
        Ok(())
    }

    #[test]
    fn skips_overlapping_and_reversed_ranges() -> eyre::Result<()> {
        let mut variables = Variables::new();
        let listing = "a 0x100 0x1ff\nb 0x180 0x280\nc 300 200\nd 200 2ff\n";
        assert_eq!(variables.load(listing.as_bytes())?, LoadStatus::Loaded(2));
        let names: Vec<_> = variables.iter().map(|var| (var.id, var.name.as_str())).collect();
        assert_eq!(names, vec![(0, "a"), (1, "d")]);
        assert_eq!(variables.resolve(0x250).map(|var| var.id), Some(1));
        Ok(())
    }

    #[test]
    fn loads_once() -> eyre::Result<()> {
        let mut variables = Variables::new();
        assert_eq!(variables.load("".as_bytes())?, LoadStatus::Pending);
        assert_eq!(variables.load("partial 10".as_bytes())?, LoadStatus::Pending);
        assert!(!variables.is_loaded());

        assert_eq!(variables.load("x 10 1f\n".as_bytes())?, LoadStatus::Loaded(1));
        assert_eq!(
            variables.load("y 20 2f\n".as_bytes())?,
            LoadStatus::AlreadyLoaded
        );
        assert_eq!(variables.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_listing_is_an_error() {
        let mut variables = Variables::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(variables.try_load(dir.path().join("missing.txt")).is_err());
        assert!(variables.is_empty());
        assert!(!variables.is_loaded());
    }
}
