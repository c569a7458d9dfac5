//! First-seen mate storage and distant-pair emission bookkeeping.

use log::warn;
use rust_htslib::bam::record::Record;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;

/// Outstanding pairs the buffer reserves room for up front. Mates in a
/// coordinate-sorted stream usually resolve within a fragment length, so
/// occupancy beyond this signals slow-resolving input, not a hard limit.
pub const DEFAULT_EXPECTED_PAIRS: usize = 1_000_000;

/// A read waiting for its mate, with its interval score and marker status
/// fixed at ingestion time.
#[derive(Debug)]
pub struct MateEntry {
    read: Record,
    in_interval: bool,
    distant_mate: bool,
}

impl MateEntry {
    pub fn new(read: Record, in_interval: bool, distant_mate: bool) -> Self {
        Self {
            read,
            in_interval,
            distant_mate,
        }
    }

    pub fn read(&self) -> &Record {
        &self.read
    }

    /// Whether the read overlapped a target interval when it was scored.
    pub fn is_in_interval(&self) -> bool {
        self.in_interval
    }

    /// Whether the read arrived as a distant-mate stand-in.
    pub fn is_distant_mate(&self) -> bool {
        self.distant_mate
    }

    /// True when this read lies before its mate's recorded start and the two
    /// share a contig (or the read is unplaced). Such a read may still meet
    /// its mate later in the stream; a read that fails this test has already
    /// passed its mate's position, so no matching partner can be ahead.
    pub fn is_upstream_read(&self) -> bool {
        self.read.pos() < self.read.mpos()
            && (self.read.is_unmapped() || self.read.tid() == self.read.mtid())
    }
}

/// Name-keyed store of reads whose mate has not arrived yet.
///
/// Pure keyed storage: which reads are worth holding and what happens on a
/// match is decided by the reconciler.
#[derive(Debug)]
pub struct PairBuffer {
    entries: FxHashMap<Vec<u8>, MateEntry>,
    expected_pairs: usize,
    pressure_warned: bool,
}

impl PairBuffer {
    pub fn new() -> Self {
        Self::with_expected_pairs(DEFAULT_EXPECTED_PAIRS)
    }

    pub fn with_expected_pairs(expected_pairs: usize) -> Self {
        let mut entries = FxHashMap::default();
        entries.reserve(expected_pairs);
        Self {
            entries,
            expected_pairs,
            pressure_warned: false,
        }
    }

    /// Store a first-seen read under its name.
    ///
    /// A name may be resident at most once. A duplicate insert means mate
    /// tracking is broken and every later answer would be suspect, so it
    /// panics rather than corrupt the run.
    pub fn insert(&mut self, entry: MateEntry) {
        let name = entry.read().qname().to_vec();
        match self.entries.entry(name) {
            Entry::Occupied(occupied) => panic!(
                "pair buffer already holds an entry named '{}'",
                String::from_utf8_lossy(occupied.key())
            ),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        if !self.pressure_warned && self.entries.len() > self.expected_pairs {
            warn!(
                "Pair buffer exceeded {} resident reads; mates are resolving slowly and memory use will grow",
                self.expected_pairs
            );
            self.pressure_warned = true;
        }
    }

    /// Remove and return the entry stored under `name`, if any.
    pub fn take(&mut self, name: &[u8]) -> Option<MateEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and yield every resident entry, leaving the buffer empty.
    pub fn drain(&mut self) -> impl Iterator<Item = MateEntry> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }
}

impl Default for PairBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Names of distant pairs already emitted once.
///
/// A distant pair's two stand-in/original collisions both look emittable; the
/// ledger records the first emission so the mirror image is recognized and
/// skipped.
#[derive(Debug, Default)]
pub struct DistantPairLedger {
    names: FxHashSet<Vec<u8>>,
}

impl DistantPairLedger {
    /// Record one collision of a distant pair. Returns `true` when this
    /// collision should emit (first sighting) and `false` when it mirrors an
    /// earlier emission; the second sighting also clears the name so the
    /// ledger only holds pairs still awaiting their mirror.
    pub fn note_collision(&mut self, name: &[u8]) -> bool {
        if self.names.remove(name) {
            false
        } else {
            self.names.insert(name.to_vec());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::{Cigar, CigarString};

    fn entry(name: &[u8], pos: i64, mpos: i64, in_interval: bool) -> MateEntry {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(50)]);
        record.set(name, Some(&cigar), &vec![b'A'; 50], &vec![30u8; 50]);
        record.set_tid(0);
        record.set_pos(pos);
        record.set_mtid(0);
        record.set_mpos(mpos);
        record.set_paired();
        record.unset_unmapped();
        MateEntry::new(record, in_interval, false)
    }

    #[test]
    fn upstream_requires_position_and_contig() {
        assert!(entry(b"r", 100, 500, true).is_upstream_read());
        assert!(!entry(b"r", 500, 100, true).is_upstream_read());

        let mut cross_contig = entry(b"r", 100, 500, true);
        cross_contig.read.set_mtid(1);
        assert!(!cross_contig.is_upstream_read());

        let mut unplaced = entry(b"r", 100, 500, true);
        unplaced.read.set_unmapped();
        unplaced.read.set_mtid(1);
        assert!(unplaced.is_upstream_read());
    }

    #[test]
    fn take_returns_and_removes() {
        let mut buffer = PairBuffer::with_expected_pairs(16);
        buffer.insert(entry(b"frag1", 100, 500, true));
        assert_eq!(buffer.len(), 1);

        let held = buffer.take(b"frag1").expect("entry present");
        assert_eq!(held.read().qname(), b"frag1");
        assert!(buffer.is_empty());
        assert!(buffer.take(b"frag1").is_none());
    }

    #[test]
    #[should_panic(expected = "already holds an entry")]
    fn duplicate_names_panic() {
        let mut buffer = PairBuffer::with_expected_pairs(16);
        buffer.insert(entry(b"frag1", 100, 500, true));
        buffer.insert(entry(b"frag1", 120, 500, true));
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut buffer = PairBuffer::with_expected_pairs(16);
        buffer.insert(entry(b"frag1", 100, 500, true));
        buffer.insert(entry(b"frag2", 200, 600, false));
        let drained: Vec<MateEntry> = buffer.drain().collect();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn ledger_toggles_per_collision() {
        let mut ledger = DistantPairLedger::default();
        assert!(ledger.note_collision(b"frag1"));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.note_collision(b"frag1"));
        assert!(ledger.is_empty());
        // A third sighting starts a fresh cycle.
        assert!(ledger.note_collision(b"frag1"));
    }
}
