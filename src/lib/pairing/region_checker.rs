//! Monotonic membership tests for coordinate-sorted reads against sorted,
//! disjoint target intervals.

use crate::intervals::TargetInterval;
use rust_htslib::bam::ext::BamRecordExtensions;
use rust_htslib::bam::record::Record;

/// A forward-only cursor over sorted, disjoint intervals.
///
/// Reads must arrive in non-decreasing (TID, start) order, matching the order
/// of a coordinate-sorted alignment file whose contigs follow the sequence
/// dictionary. Under that contract each query advances the cursor past
/// intervals the stream has left behind and never revisits them, so a whole
/// traversal costs one sweep over the interval list regardless of read count.
/// Feeding reads out of order is not detected and yields stale answers.
#[derive(Debug)]
pub struct RegionChecker {
    intervals: Vec<TargetInterval>,
    current: usize,
}

impl RegionChecker {
    /// Create a cursor positioned at the first interval.
    ///
    /// `intervals` must be sorted by (TID, start) and pairwise disjoint, as
    /// produced by [`crate::intervals::load_targets`].
    pub fn new(intervals: Vec<TargetInterval>) -> Self {
        Self {
            intervals,
            current: 0,
        }
    }

    /// True when the read's alignment span overlaps one of the intervals.
    ///
    /// Unmapped reads are never in an interval. Once every interval has been
    /// passed, all further queries answer false until [`RegionChecker::reset`].
    pub fn is_in_interval(&mut self, read: &Record) -> bool {
        if read.is_unmapped() {
            return false;
        }
        let mut interval = match self.intervals.get(self.current) {
            Some(interval) => interval,
            None => return false,
        };
        let tid = read.tid();
        while interval.tid < tid {
            self.current += 1;
            interval = match self.intervals.get(self.current) {
                Some(interval) => interval,
                None => return false,
            };
        }
        if interval.tid > tid {
            return false;
        }
        let start = read.pos();
        while interval.end <= start {
            self.current += 1;
            interval = match self.intervals.get(self.current) {
                Some(interval) => interval,
                None => return false,
            };
            if interval.tid != tid {
                return false;
            }
        }
        interval.start < read.reference_end()
    }

    /// Rewind to the first interval for a fresh pass over a new stream.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_htslib::bam::record::{Cigar, CigarString, Record};

    fn iv(tid: i32, start: i64, end: i64) -> TargetInterval {
        TargetInterval { tid, start, end }
    }

    fn mapped_read(tid: i32, pos: i64, len: u32) -> Record {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(len)]);
        record.set(
            b"read",
            Some(&cigar),
            &vec![b'A'; len as usize],
            &vec![30u8; len as usize],
        );
        record.set_tid(tid);
        record.set_pos(pos);
        record.unset_unmapped();
        record
    }

    fn unmapped_read() -> Record {
        let mut record = Record::new();
        record.set(b"read", None, &vec![b'A'; 10], &vec![30u8; 10]);
        record.set_unmapped();
        record.set_tid(-1);
        record.set_pos(-1);
        record
    }

    #[test]
    fn overlap_is_half_open() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 200)]);
        // Ends exactly at the interval start.
        assert!(!checker.is_in_interval(&mapped_read(0, 50, 50)));
        // One base of overlap on each side.
        assert!(checker.is_in_interval(&mapped_read(0, 51, 50)));
        assert!(checker.is_in_interval(&mapped_read(0, 199, 50)));
        // Starts exactly at the interval end.
        assert!(!checker.is_in_interval(&mapped_read(0, 200, 50)));
    }

    #[test]
    fn unmapped_reads_are_never_in_interval() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 200)]);
        assert!(!checker.is_in_interval(&unmapped_read()));
    }

    #[test]
    fn cursor_advances_within_a_contig() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 200), iv(0, 500, 600)]);
        assert!(checker.is_in_interval(&mapped_read(0, 150, 10)));
        // Past the first interval, before the second.
        assert!(!checker.is_in_interval(&mapped_read(0, 300, 10)));
        assert!(checker.is_in_interval(&mapped_read(0, 550, 10)));
    }

    #[test]
    fn cursor_advances_across_contigs() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 200), iv(2, 100, 200)]);
        assert!(checker.is_in_interval(&mapped_read(0, 150, 10)));
        // A contig with no intervals at all.
        assert!(!checker.is_in_interval(&mapped_read(1, 150, 10)));
        assert!(checker.is_in_interval(&mapped_read(2, 150, 10)));
    }

    #[test]
    fn contig_behind_the_cursor_answers_false_without_advancing() {
        let mut checker = RegionChecker::new(vec![iv(3, 100, 200)]);
        assert!(!checker.is_in_interval(&mapped_read(1, 150, 10)));
        assert!(!checker.is_in_interval(&mapped_read(2, 150, 10)));
        // The lone interval must still be live.
        assert!(checker.is_in_interval(&mapped_read(3, 150, 10)));
    }

    #[test]
    fn exhausted_cursor_stays_false_until_reset() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 200)]);
        assert!(!checker.is_in_interval(&mapped_read(0, 500, 10)));
        assert!(!checker.is_in_interval(&mapped_read(0, 150, 10)));
        checker.reset();
        assert!(checker.is_in_interval(&mapped_read(0, 150, 10)));
    }

    #[test]
    fn spanning_read_overlaps_every_interval_under_it() {
        let mut checker = RegionChecker::new(vec![iv(0, 100, 110), iv(0, 130, 140)]);
        let read = mapped_read(0, 90, 100);
        assert!(checker.is_in_interval(&read));
        // The long read consumed nothing: a later short read still matches the
        // second interval.
        assert!(checker.is_in_interval(&mapped_read(0, 135, 10)));
    }

    /// Sorted disjoint intervals over a handful of contigs.
    fn arb_intervals() -> impl Strategy<Value = Vec<TargetInterval>> {
        proptest::collection::vec((0i32..3, 1i64..50, 1i64..100), 0..12).prop_map(|raw| {
            let mut intervals = Vec::new();
            let mut cursors = [0i64; 3];
            let mut sorted = raw;
            sorted.sort_by_key(|(tid, _, _)| *tid);
            for (tid, gap, len) in sorted {
                let start = cursors[tid as usize] + gap;
                let end = start + len;
                cursors[tid as usize] = end;
                intervals.push(TargetInterval { tid, start, end });
            }
            intervals.sort_by_key(|iv| (iv.tid, iv.start));
            intervals
        })
    }

    /// Coordinate-sorted (tid, pos, len) reads.
    fn arb_reads() -> impl Strategy<Value = Vec<(i32, i64, u32)>> {
        proptest::collection::vec((0i32..3, 0i64..40, 1u32..60), 1..40).prop_map(|raw| {
            let mut reads = Vec::new();
            let mut pos = [0i64; 3];
            let mut sorted = raw;
            sorted.sort_by_key(|(tid, _, _)| *tid);
            for (tid, step, len) in sorted {
                pos[tid as usize] += step;
                reads.push((tid, pos[tid as usize], len));
            }
            reads
        })
    }

    proptest! {
        #[test]
        fn matches_brute_force_on_sorted_streams(
            intervals in arb_intervals(),
            reads in arb_reads(),
        ) {
            let mut checker = RegionChecker::new(intervals.clone());
            for (tid, pos, len) in reads {
                let read = mapped_read(tid, pos, len);
                let expected = intervals.iter().any(|iv| {
                    iv.tid == tid && iv.start < pos + i64::from(len) && pos < iv.end
                });
                prop_assert_eq!(checker.is_in_interval(&read), expected);
            }
        }
    }
}
