//! Read filtering primitives used across remate.
//!
//! This module exposes the [`ReadFilter`] trait along with the filters the
//! subcommands assemble: mapping quality, duplicate and secondary/supplementary
//! rejection, structural well-formedness, and distant-mate detection. Filters
//! compose through [`CompositeReadFilter`], which passes a read only when every
//! member does.

use lazy_static::lazy_static;
use rust_htslib::bam::record::{Cigar, Record};

/// Same-contig distance in basepairs beyond which a mate counts as distant.
pub const DEFAULT_MATE_DISTANCE: i64 = 1000;

lazy_static! {
    /// [`DEFAULT_MATE_DISTANCE`] as a string for CLI defaults.
    pub static ref DEFAULT_MATE_DISTANCE_STR: String = format!("{}", DEFAULT_MATE_DISTANCE);
}

/// A trait for filtering reads based on various criteria.
///
/// Implementors define how reads should be filtered. Implementations should return
/// `true` if the read passes the filter and `false` otherwise.
pub trait ReadFilter {
    /// Filter a read based on various criteria.
    fn filter_read(&self, read: &Record) -> bool;
}

/// A straightforward read filter based on mapping quality.
pub struct MappingQualityReadFilter {
    /// Minimum mapping quality for a read to pass filtering.
    ///
    /// The read's mapping quality must be greater than or equal to this value to pass.
    min_mapq: u8,
}

impl MappingQualityReadFilter {
    /// Create a new [`MappingQualityReadFilter`] with the specified threshold.
    pub fn new(min_mapq: u8) -> Self {
        Self { min_mapq }
    }
}

impl ReadFilter for MappingQualityReadFilter {
    #[inline(always)]
    fn filter_read(&self, read: &Record) -> bool {
        read.mapq() >= self.min_mapq
    }
}

/// Rejects reads flagged as PCR or optical duplicates.
pub struct NotDuplicateReadFilter;

impl ReadFilter for NotDuplicateReadFilter {
    #[inline(always)]
    fn filter_read(&self, read: &Record) -> bool {
        !read.is_duplicate()
    }
}

/// Rejects secondary and supplementary alignment lines, keeping one
/// representative line per sequenced read.
pub struct PrimaryLineReadFilter;

impl ReadFilter for PrimaryLineReadFilter {
    #[inline(always)]
    fn filter_read(&self, read: &Record) -> bool {
        !read.is_secondary() && !read.is_supplementary()
    }
}

/// Rejects structurally broken records: missing name, missing sequence, or a
/// mapped alignment whose CIGAR disagrees with the stored sequence.
pub struct WellformedReadFilter;

impl ReadFilter for WellformedReadFilter {
    fn filter_read(&self, read: &Record) -> bool {
        if read.qname().is_empty() || read.seq_len() == 0 {
            return false;
        }
        if read.is_unmapped() {
            return true;
        }
        if read.tid() < 0 || read.pos() < 0 {
            return false;
        }
        let cigar = read.cigar();
        !cigar.is_empty() && cigar_read_len(&cigar) == read.seq_len()
    }
}

/// Query bases consumed by a CIGAR: M, I, S, =, and X operations.
fn cigar_read_len(cigar: &[Cigar]) -> usize {
    cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(n)
            | Cigar::Ins(n)
            | Cigar::SoftClip(n)
            | Cigar::Equal(n)
            | Cigar::Diff(n) => *n as usize,
            _ => 0,
        })
        .sum()
}

/// Keeps paired reads whose mate maps far away: on another contig, or more
/// than `max_gap` basepairs along the same contig. Reads with an unmapped
/// member are never distant.
pub struct MateDistantReadFilter {
    max_gap: i64,
}

impl MateDistantReadFilter {
    /// Create a new [`MateDistantReadFilter`] with the specified gap threshold.
    pub fn new(max_gap: i64) -> Self {
        Self { max_gap }
    }
}

impl ReadFilter for MateDistantReadFilter {
    #[inline]
    fn filter_read(&self, read: &Record) -> bool {
        read.is_paired()
            && !read.is_unmapped()
            && !read.is_mate_unmapped()
            && (read.tid() != read.mtid() || (read.pos() - read.mpos()).abs() > self.max_gap)
    }
}

/// Conjunction of filters: a read passes only when every member passes.
pub struct CompositeReadFilter {
    filters: Vec<Box<dyn ReadFilter>>,
}

impl CompositeReadFilter {
    /// Create a new [`CompositeReadFilter`] from the given members.
    pub fn new(filters: Vec<Box<dyn ReadFilter>>) -> Self {
        Self { filters }
    }
}

impl ReadFilter for CompositeReadFilter {
    fn filter_read(&self, read: &Record) -> bool {
        self.filters.iter().all(|filter| filter.filter_read(read))
    }
}
