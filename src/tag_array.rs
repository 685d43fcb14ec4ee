use crate::cache::block::{Line, WordRange};
use crate::config::Geometry;
use stats::LocationId;

/// Result of probing one line of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetAccess {
    pub hit: bool,
    /// Way holding the line after the access.
    pub way: usize,
    /// Valid line that was replaced on a miss.
    pub evicted: Option<Line>,
}

/// Tag array with LRU replacement.
///
/// Lines are stored set after set. The replacement order of set `s` is
/// `lru[s * assoc..(s + 1) * assoc]`, a permutation of the set's ways with
/// the most recently used way first.
#[derive(Debug, Clone)]
pub struct TagArray {
    geometry: Geometry,
    lines: Vec<Line>,
    lru: Vec<usize>,
    num_access: u64,
    num_miss: u64,
}

impl TagArray {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        let assoc = geometry.associativity;
        let num_lines = geometry.total_lines();
        let lines = vec![Line::default(); num_lines];
        // way 0 is the first victim of an empty set
        let lru = (0..geometry.num_sets as usize)
            .flat_map(|_| (0..assoc).rev())
            .collect();
        Self {
            geometry,
            lines,
            lru,
            num_access: 0,
            num_miss: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn num_access(&self) -> u64 {
        self.num_access
    }

    #[must_use]
    pub fn num_miss(&self) -> u64 {
        self.num_miss
    }

    fn order(&self, set: usize) -> &[usize] {
        let assoc = self.geometry.associativity;
        &self.lru[set * assoc..(set + 1) * assoc]
    }

    fn order_mut(&mut self, set: usize) -> &mut [usize] {
        let assoc = self.geometry.associativity;
        &mut self.lru[set * assoc..(set + 1) * assoc]
    }

    /// Position in the set's replacement order of the line with `tag`.
    #[must_use]
    pub fn probe(&self, set: usize, tag: u64) -> Option<usize> {
        let base = set * self.geometry.associativity;
        self.order(set).iter().position(|&way| {
            let line = &self.lines[base + way];
            line.valid && line.tag == tag
        })
    }

    /// Looks up `tag` in `set`, installing it as most recently used on a miss.
    pub fn access(
        &mut self,
        set: usize,
        tag: u64,
        words: WordRange,
        owner: Option<LocationId>,
    ) -> SetAccess {
        debug_assert!(set < self.geometry.num_sets as usize);
        let assoc = self.geometry.associativity;
        let base = set * assoc;
        self.num_access += 1;

        if let Some(pos) = self.probe(set, tag) {
            let order = self.order_mut(set);
            order[..=pos].rotate_right(1);
            let way = order[0];
            self.lines[base + way].touch(words);
            log::trace!("tag_array::access(set={set}, tag={tag}) => hit way {way}");
            return SetAccess {
                hit: true,
                way,
                evicted: None,
            };
        }

        self.num_miss += 1;
        let order = self.order_mut(set);
        order.rotate_right(1);
        let way = order[0];
        let line = &mut self.lines[base + way];
        let evicted = line.valid.then_some(*line);
        line.allocate(tag, words, owner);

        log::trace!(
            "tag_array::access(set={set}, tag={tag}) => miss way {way}, evicted {:?}",
            evicted.map(|line| line.tag)
        );
        SetAccess {
            hit: false,
            way,
            evicted,
        }
    }

    /// Removes every valid line, returning them in set and way order.
    pub fn drain(&mut self) -> Vec<Line> {
        let drained: Vec<Line> = self
            .lines
            .iter_mut()
            .filter(|line| line.valid)
            .map(|line| {
                let resident = *line;
                line.invalidate();
                resident
            })
            .collect();
        log::debug!("drained {} resident lines", drained.len());
        drained
    }

    /// Resident lines, in set and way order.
    pub fn iter(&self) -> impl Iterator<Item = &Line> + '_ {
        self.lines.iter().filter(|line| line.valid)
    }

    /// Replacement order of a set, most recently used way first.
    #[must_use]
    pub fn replacement_order(&self, set: usize) -> &[usize] {
        self.order(set)
    }
}
