//! Mate reconciliation over a coordinate-sorted read stream.
//!
//! [`PairReconciler`] consumes reads one at a time in coordinate order and
//! reunites mates: the first member of a pair waits in a [`PairBuffer`] keyed
//! by name, and the second member's arrival closes the episode, either
//! emitting the pair to the [`PairConsumer`] or dropping it when neither side
//! touched a target interval. Reads that cannot pair (unpaired, secondary, or
//! supplementary lines) bypass the buffer entirely. A contig change or the end
//! of the stream flushes the buffer: in-interval leftovers become singletons,
//! the rest are discarded.
//!
//! Distant-mate stand-ins from the `distant-mates` subcommand are recovered to
//! their original alignment before buffering, so a pair built from a stand-in
//! carries real alignments on both sides. Because each distant pair produces
//! two such collisions (one per side's stand-in), a [`DistantPairLedger`]
//! suppresses the second emission.

use anyhow::Result;
use rust_htslib::bam::record::Record;
use serde::Serialize;

use crate::pairing::buffer::{DistantPairLedger, MateEntry, PairBuffer, DEFAULT_EXPECTED_PAIRS};
use crate::pairing::distant::{self, DistantMateCodec};
use crate::pairing::region_checker::RegionChecker;

/// Receives reconciliation results.
///
/// Pair members arrive as (earlier-seen, newly-arrived); that order carries no
/// read1/read2 meaning. Pairs are emitted the moment they close, so the
/// output sequence is not coordinate-sorted.
pub trait PairConsumer {
    /// One reconciled pair whose members both survive in-scope.
    fn record_pair(&mut self, read: &Record, mate: &Record) -> Result<()>;

    /// A read delivered alone: an unpaired-class read, or an in-interval read
    /// whose mate never arrived before a flush.
    fn record_unpaired(&mut self, read: &Record) -> Result<()>;
}

/// Counters accumulated over one reconciliation run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PairingMetrics {
    /// Reads fed to the reconciler.
    pub reads_seen: u64,
    /// Unpaired, secondary, or supplementary reads passed through alone.
    pub unpaired_class: u64,
    /// Pairs delivered to the consumer, distant pairs included.
    pub pairs_emitted: u64,
    /// Pairs delivered with at least one side recovered from a stand-in.
    pub distant_pairs_emitted: u64,
    /// Mirror-image distant collisions skipped by the ledger.
    pub duplicate_emissions_suppressed: u64,
    /// Pairs that closed with neither side in a target interval.
    pub pairs_dropped_uninteresting: u64,
    /// In-interval reads flushed alone because their mate never arrived.
    pub flushed_singletons: u64,
    /// First-seen reads dropped immediately: out of interval, not a stand-in,
    /// and already past their mate's position.
    pub discarded_uninteresting: u64,
    /// Out-of-interval reads dropped by a contig or end-of-stream flush.
    pub discarded_on_flush: u64,
    /// Highest buffer occupancy observed.
    pub buffer_peak: u64,
}

/// The reconciliation state machine.
///
/// Drive it with [`PairReconciler::apply`] for every filtered read in
/// coordinate order, then call [`PairReconciler::finish`] exactly once.
pub struct PairReconciler<C: PairConsumer> {
    consumer: C,
    region_checker: Option<RegionChecker>,
    codec: DistantMateCodec,
    buffer: PairBuffer,
    distant_ledger: DistantPairLedger,
    cur_tid: Option<i32>,
    metrics: PairingMetrics,
}

impl<C: PairConsumer> PairReconciler<C> {
    /// Create a reconciler. Without a region checker every read scores as
    /// in-interval and reconciliation covers the whole stream.
    pub fn new(codec: DistantMateCodec, region_checker: Option<RegionChecker>, consumer: C) -> Self {
        Self::with_expected_pairs(codec, region_checker, consumer, DEFAULT_EXPECTED_PAIRS)
    }

    pub fn with_expected_pairs(
        codec: DistantMateCodec,
        region_checker: Option<RegionChecker>,
        consumer: C,
        expected_pairs: usize,
    ) -> Self {
        Self {
            consumer,
            region_checker,
            codec,
            buffer: PairBuffer::with_expected_pairs(expected_pairs),
            distant_ledger: DistantPairLedger::default(),
            cur_tid: None,
            metrics: PairingMetrics::default(),
        }
    }

    /// Feed the next read of the coordinate-sorted stream.
    pub fn apply(&mut self, read: Record) -> Result<()> {
        self.metrics.reads_seen += 1;

        // Entering a new contig strands everything still buffered: a read's
        // same-contig mate cannot appear on a later contig, and cross-contig
        // pairs travel as stand-ins instead. Flush before classifying.
        if !read.is_unmapped() && self.cur_tid != Some(read.tid()) {
            self.flush_buffer()?;
            self.cur_tid = Some(read.tid());
        }

        if !read.is_paired() || read.is_secondary() || read.is_supplementary() {
            self.metrics.unpaired_class += 1;
            return self.consumer.record_unpaired(&read);
        }

        let in_interval = match self.region_checker.as_mut() {
            Some(checker) => checker.is_in_interval(&read),
            None => true,
        };
        let is_stand_in = distant::is_distant_mate(&read);
        let read = if is_stand_in {
            self.codec.undo_alterations(&read)?
        } else {
            read
        };
        let entry = MateEntry::new(read, in_interval, is_stand_in);

        match self.buffer.take(entry.read().qname()) {
            None => {
                // Hold a first-seen read only while its mate can still show up
                // with a reason to emit: the read scored in-interval, it is a
                // stand-in (its partner collision is pending), or its mate lies
                // ahead on this contig. Everything else can never pair again.
                if entry.is_in_interval() || entry.is_distant_mate() || entry.is_upstream_read() {
                    self.buffer.insert(entry);
                    self.metrics.buffer_peak =
                        self.metrics.buffer_peak.max(self.buffer.len() as u64);
                } else {
                    self.metrics.discarded_uninteresting += 1;
                }
            }
            Some(held) => {
                // Either side in-interval makes the pair interesting.
                if !entry.is_in_interval() && !held.is_in_interval() {
                    self.metrics.pairs_dropped_uninteresting += 1;
                } else if !entry.is_distant_mate() && !held.is_distant_mate() {
                    self.metrics.pairs_emitted += 1;
                    self.consumer.record_pair(held.read(), entry.read())?;
                } else if self.distant_ledger.note_collision(entry.read().qname()) {
                    self.metrics.pairs_emitted += 1;
                    self.metrics.distant_pairs_emitted += 1;
                    self.consumer.record_pair(held.read(), entry.read())?;
                } else {
                    self.metrics.duplicate_emissions_suppressed += 1;
                }
            }
        }
        Ok(())
    }

    /// Signal end of stream: flush in-interval holdouts as singletons.
    pub fn finish(&mut self) -> Result<()> {
        self.flush_buffer()
    }

    pub fn metrics(&self) -> &PairingMetrics {
        &self.metrics
    }

    /// Tear down into the consumer and the final metrics.
    pub fn into_parts(self) -> (C, PairingMetrics) {
        (self.consumer, self.metrics)
    }

    fn flush_buffer(&mut self) -> Result<()> {
        for entry in self.buffer.drain() {
            if entry.is_in_interval() {
                self.metrics.flushed_singletons += 1;
                self.consumer.record_unpaired(entry.read())?;
            } else {
                self.metrics.discarded_on_flush += 1;
            }
        }
        Ok(())
    }
}
