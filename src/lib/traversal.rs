//! Ordered delivery of reads from one or more coordinate-sorted inputs.
//!
//! [`Traversal`] owns a set of indexed BAM/CRAM readers over the same
//! sequence dictionary and yields their records as a single position-sorted
//! stream, which is the contract the pairing state machine depends on. With
//! target intervals it fetches one padded window at a time; a read spanning
//! two adjacent windows is fetched by both, so records overlapping the
//! previous window are skipped to keep delivery exactly-once. Without
//! intervals it streams the entire files.
//!
//! Merging uses a small binary heap holding one in-flight record per source.
//! Ties on (TID, position) break by source order and then arrival order, so
//! a given set of inputs always replays in the same sequence.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use rust_htslib::bam::{self, Read};
use rust_htslib::bam::ext::BamRecordExtensions;
use rust_htslib::bam::record::Record;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use crate::intervals::TargetInterval;

/// One opened input and a running delivery count for tie-breaking.
struct Source {
    reader: bam::IndexedReader,
    serial: u64,
}

/// Helper for ordering records in a BinaryHeap (MinHeap).
///
/// Unplaced records (negative TID) sort after every placed one, matching
/// their position at the tail of a coordinate-sorted file.
struct QueuedRead {
    record: Record,
    source: usize,
    serial: u64,
}

impl QueuedRead {
    fn key(&self) -> (bool, i32, i64, usize, u64) {
        (
            self.record.tid() < 0,
            self.record.tid(),
            self.record.pos(),
            self.source,
            self.serial,
        )
    }
}

impl PartialEq for QueuedRead {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for QueuedRead {}
impl PartialOrd for QueuedRead {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedRead {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for MinHeap
        other.key().cmp(&self.key())
    }
}

/// A merged, position-ordered traversal over indexed alignment inputs.
pub struct Traversal {
    sources: Vec<Source>,
    header: bam::HeaderView,
    intervals: Option<Vec<TargetInterval>>,
}

impl Traversal {
    /// Open every input, wire up threading and an optional CRAM reference,
    /// and verify all inputs share the first input's sequence dictionary.
    ///
    /// `intervals` must be sorted by (TID, start) and pairwise disjoint, as
    /// produced by [`crate::intervals::load_targets`]; `None` traverses the
    /// whole of every input.
    pub fn open(
        paths: &[PathBuf],
        reference: Option<&Path>,
        threads: usize,
        intervals: Option<Vec<TargetInterval>>,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(anyhow!("No alignment inputs given"));
        }
        let mut sources = Vec::with_capacity(paths.len());
        let mut header: Option<bam::HeaderView> = None;
        for path in paths {
            let mut reader = bam::IndexedReader::from_path(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            if threads > 1 {
                reader.set_threads(threads)?;
            }
            if let Some(fasta) = reference {
                reader.set_reference(fasta)?;
            }
            let view = reader.header().to_owned();
            warn_unless_coordinate_sorted(&view, path);
            match &header {
                None => header = Some(view),
                Some(first) => ensure_matching_dictionaries(first, &view, path)?,
            }
            sources.push(Source { reader, serial: 0 });
        }
        let header = header.expect("at least one input was opened");
        Ok(Self {
            sources,
            header,
            intervals,
        })
    }

    /// The sequence dictionary shared by every input.
    pub fn header(&self) -> &bam::HeaderView {
        &self.header
    }

    /// Deliver every in-scope read, in ascending coordinate order, to `f`.
    pub fn for_each<F>(mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        match self.intervals.take() {
            None => self.walk_all(&mut f),
            Some(intervals) => self.walk_intervals(&intervals, &mut f),
        }
    }

    fn walk_all<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        for source in self.sources.iter_mut() {
            source.reader.fetch(bam::FetchDefinition::All)?;
        }
        self.merge_current_fetch(None, f)
    }

    fn walk_intervals<F>(&mut self, intervals: &[TargetInterval], f: &mut F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let mut previous: Option<TargetInterval> = None;
        for interval in intervals {
            debug!(
                "Fetching TID {} [{}, {})",
                interval.tid, interval.start, interval.end
            );
            for source in self.sources.iter_mut() {
                source
                    .reader
                    .fetch(bam::FetchDefinition::Region(
                        interval.tid,
                        interval.start,
                        interval.end,
                    ))
                    .with_context(|| {
                        format!(
                            "Failed to fetch TID {} [{}, {})",
                            interval.tid, interval.start, interval.end
                        )
                    })?;
            }
            let same_tid_previous = previous.filter(|prev| prev.tid == interval.tid);
            self.merge_current_fetch(same_tid_previous, f)?;
            previous = Some(*interval);
        }
        Ok(())
    }

    /// Merge the per-source streams of the current fetch, skipping records
    /// already delivered by the previous window.
    fn merge_current_fetch<F>(&mut self, previous: Option<TargetInterval>, f: &mut F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let mut heap = BinaryHeap::with_capacity(self.sources.len());
        for index in 0..self.sources.len() {
            if let Some(queued) = pull(&mut self.sources[index], index)? {
                heap.push(queued);
            }
        }
        while let Some(queued) = heap.pop() {
            if let Some(next) = pull(&mut self.sources[queued.source], queued.source)? {
                heap.push(next);
            }
            if let Some(prev) = previous {
                if overlaps_interval(&queued.record, prev) {
                    continue;
                }
            }
            f(queued.record)?;
        }
        Ok(())
    }
}

fn pull(source: &mut Source, index: usize) -> Result<Option<QueuedRead>> {
    match source.reader.records().next() {
        Some(Ok(record)) => {
            source.serial += 1;
            Ok(Some(QueuedRead {
                record,
                source: index,
                serial: source.serial,
            }))
        }
        Some(Err(err)) => Err(err).context("Failed to read alignment record"),
        None => Ok(None),
    }
}

/// Alignment-span overlap against a half-open interval, using the same
/// endpoint rule as htslib's region iterator so the skip test agrees with
/// what the previous fetch actually returned.
fn overlaps_interval(record: &Record, interval: TargetInterval) -> bool {
    record.tid() == interval.tid
        && record.pos() < interval.end
        && record.reference_end() > interval.start
}

fn ensure_matching_dictionaries(
    first: &bam::HeaderView,
    other: &bam::HeaderView,
    path: &Path,
) -> Result<()> {
    if first.target_count() != other.target_count() {
        return Err(anyhow!(
            "{} has {} contigs where the first input has {}",
            path.display(),
            other.target_count(),
            first.target_count()
        ));
    }
    for tid in 0..first.target_count() {
        if first.tid2name(tid) != other.tid2name(tid)
            || first.target_len(tid) != other.target_len(tid)
        {
            return Err(anyhow!(
                "Sequence dictionary of {} diverges from the first input at contig '{}'",
                path.display(),
                String::from_utf8_lossy(other.tid2name(tid))
            ));
        }
    }
    Ok(())
}

fn warn_unless_coordinate_sorted(view: &bam::HeaderView, path: &Path) {
    let header = bam::Header::from_template(view);
    let coordinate_sorted = header.to_hashmap().get("HD").map_or(false, |records| {
        records
            .iter()
            .any(|record| record.get("SO").map(String::as_str) == Some("coordinate"))
    });
    if !coordinate_sorted {
        warn!(
            "{} does not declare SO:coordinate; reconciliation assumes position-sorted input",
            path.display()
        );
    }
}
