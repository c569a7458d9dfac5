//! Target interval loading and normalization.
//!
//! The `pairs` subcommand restricts reconciliation to regions of interest
//! supplied as a BED file. Loading produces two parallel views of those
//! regions: the *scoring* intervals exactly as given (merged where they touch),
//! and the *traversal* intervals padded outward so that mates lying just past a
//! region boundary are still pulled from the input. Both views are sorted by
//! (TID, start) and pairwise disjoint, which is what the downstream cursor
//! relies on.

use anyhow::{anyhow, Context, Result};
use bio::io::bed;
use lazy_static::lazy_static;
use rust_htslib::bam::HeaderView;
use rust_lapper::{Interval, Lapper};
use std::path::Path;

/// Basepairs of padding applied around each target region for traversal.
pub const DEFAULT_PAIR_PADDING: u32 = 1000;

lazy_static! {
    /// [`DEFAULT_PAIR_PADDING`] as a string for CLI defaults.
    pub static ref DEFAULT_PAIR_PADDING_STR: String = format!("{}", DEFAULT_PAIR_PADDING);
}

/// A half-open target region on a numbered contig.
///
/// `tid` is the contig's index in the sequence dictionary, so tuples of
/// (tid, start) order the same way a coordinate-sorted read stream does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInterval {
    pub tid: i32,
    pub start: i64,
    pub end: i64,
}

/// The two interval lists derived from one BED load.
#[derive(Debug, Clone)]
pub struct TargetSet {
    /// Regions exactly as requested; reads are scored against these.
    pub scoring: Vec<TargetInterval>,
    /// Regions padded by the pair padding; traversal fetches these.
    pub traversal: Vec<TargetInterval>,
}

/// Read a BED file and produce sorted, disjoint scoring and traversal
/// intervals against the given sequence dictionary.
///
/// Contig names must exist in the dictionary and every row must span at least
/// one base. Padded intervals are clamped to contig bounds, and intervals that
/// touch after merging or padding are coalesced so both lists stay disjoint.
pub fn load_targets<P: AsRef<Path>>(
    header: &HeaderView,
    bed_file: P,
    pair_padding: u32,
) -> Result<TargetSet> {
    let mut per_tid: Vec<Vec<Interval<u64, ()>>> = vec![Vec::new(); header.target_count() as usize];
    let mut bed_reader = bed::Reader::from_file(bed_file.as_ref())
        .with_context(|| format!("Failed to open {}", bed_file.as_ref().display()))?;
    for (line, record) in bed_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse BED line {}", line + 1))?;
        let tid = header.tid(record.chrom().as_bytes()).ok_or_else(|| {
            anyhow!(
                "BED contig '{}' is not in the sequence dictionary",
                record.chrom()
            )
        })?;
        if record.end() <= record.start() {
            return Err(anyhow!(
                "BED line {}: region [{}, {}) is empty",
                line + 1,
                record.start(),
                record.end()
            ));
        }
        per_tid[tid as usize].push(Interval {
            start: record.start(),
            stop: record.end(),
            val: (),
        });
    }

    let mut scoring = Vec::new();
    let mut traversal = Vec::new();
    for (tid, intervals) in per_tid.into_iter().enumerate() {
        if intervals.is_empty() {
            continue;
        }
        let target_len = header
            .target_len(tid as u32)
            .ok_or_else(|| anyhow!("No length recorded for TID {}", tid))?;
        let padded = intervals
            .iter()
            .map(|iv| Interval {
                start: iv.start.saturating_sub(u64::from(pair_padding)),
                stop: std::cmp::min(iv.stop + u64::from(pair_padding), target_len),
                val: (),
            })
            .collect();
        append_merged(&mut scoring, tid as i32, intervals);
        append_merged(&mut traversal, tid as i32, padded);
    }
    Ok(TargetSet { scoring, traversal })
}

/// Merge overlapping and touching intervals on one contig and append them in
/// start order.
fn append_merged(out: &mut Vec<TargetInterval>, tid: i32, intervals: Vec<Interval<u64, ()>>) {
    let mut lapper = Lapper::new(intervals);
    lapper.merge_overlaps();
    out.extend(lapper.iter().map(|iv| TargetInterval {
        tid,
        start: iv.start as i64,
        end: iv.stop as i64,
    }));
}
