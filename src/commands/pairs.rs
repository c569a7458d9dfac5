//! # Pair reconciliation
//!
//! Performs a single merged pass over one or more coordinate-sorted BAM/CRAM
//! files and writes read pairs adjacently: each reconciled pair lands as two
//! consecutive records. Reconciliation can be restricted to BED regions, in
//! which case traversal automatically pads the regions so that mates sitting
//! just outside still get pulled in, and distant-mate stand-ins produced by
//! `remate distant-mates` (given as an extra input) connect pairs whose
//! members map far apart.
//!
//! Pairs are written the moment they close, so the primary output is not
//! coordinate-sorted; re-sort it before indexing. Reads that cannot pair and
//! in-region reads whose mate never arrives go to the optional singletons
//! output instead.

use anyhow::{Context, Result};
use log::*;
use remate_lib::core::prelude::*;
use remate_lib::intervals::{self, TargetSet};
use remate_lib::pairing::{
    DistantMateCodec, PairConsumer, PairReconciler, PairingMetrics, RegionChecker,
};
use remate_lib::read_filter::{
    CompositeReadFilter, MappingQualityReadFilter, NotDuplicateReadFilter, ReadFilter,
    WellformedReadFilter,
};
use remate_lib::traversal::Traversal;
use rust_htslib::bam::{self, record::Record, Read};
use std::path::PathBuf;
use structopt::StructOpt;

/// Arguments for the `pairs` command.
#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "pairs",
    about = "Reconcile mates from coordinate-sorted inputs and write them adjacently"
)]
pub struct PairsArgs {
    /// Indexed BAM/CRAM inputs sharing one sequence dictionary. Pass the
    /// original alignments plus the `distant-mates` output to recover
    /// far-apart pairs.
    #[structopt(parse(from_os_str), required = true)]
    pub reads: Vec<PathBuf>,

    /// Output BAM receiving reconciled pairs as adjacent records
    /// (reconciliation order, not coordinate order).
    #[structopt(short, long, parse(from_os_str))]
    pub output: PathBuf,

    /// BED file restricting reconciliation to regions of interest. Without it
    /// the whole input is reconciled.
    #[structopt(long, parse(from_os_str))]
    pub bed: Option<PathBuf>,

    /// Basepairs of padding added around each BED region during traversal so
    /// nearby mates are seen.
    #[structopt(long, short = "p", default_value = intervals::DEFAULT_PAIR_PADDING_STR.as_str())]
    pub pair_padding: u32,

    /// Optional BAM receiving unpaired-class reads and in-region reads whose
    /// mate never arrived. Such reads are counted but dropped when unset.
    #[structopt(long, parse(from_os_str))]
    pub singletons: Option<PathBuf>,

    /// Optional TSV path ("-" for stdout) receiving one row of run metrics.
    #[structopt(long, parse(from_os_str))]
    pub metrics: Option<PathBuf>,

    /// Minimum mapping quality for a read to enter reconciliation; 0 disables
    /// the check.
    #[structopt(long, default_value = "0", short = "q")]
    pub min_mapq: u8,

    /// Number of threads for BAM/CRAM (de)compression.
    #[structopt(short, long, default_value = "4")]
    pub threads: usize,

    /// Path to reference FASTA file (required for CRAM files).
    #[structopt(long, parse(from_os_str), short = "r")]
    pub reference: Option<PathBuf>,
}

/// Routes reconciled pairs and leftovers to the output BAMs.
struct PairWriter {
    pairs: bam::Writer,
    singletons: Option<bam::Writer>,
}

impl PairConsumer for PairWriter {
    fn record_pair(&mut self, read: &Record, mate: &Record) -> Result<()> {
        self.pairs.write(read)?;
        self.pairs.write(mate)?;
        Ok(())
    }

    fn record_unpaired(&mut self, read: &Record) -> Result<()> {
        if let Some(writer) = self.singletons.as_mut() {
            writer.write(read)?;
        }
        Ok(())
    }
}

pub fn run_pairs(args: PairsArgs) -> Result<()> {
    info!("Running remate-pairs on: {:?}", args.reads);
    let cpus = determine_allowed_cpus(args.threads)?;

    // Peek at the first input's dictionary; traversal re-validates it against
    // every input.
    let header = bam::IndexedReader::from_path(&args.reads[0])
        .with_context(|| format!("Failed to open {}", args.reads[0].display()))?
        .header()
        .to_owned();

    let targets: Option<TargetSet> = match &args.bed {
        Some(bed) => {
            let targets = intervals::load_targets(&header, bed, args.pair_padding)
                .with_context(|| format!("Failed to load targets from {}", bed.display()))?;
            info!(
                "Loaded {} target regions ({} traversal windows after padding)",
                targets.scoring.len(),
                targets.traversal.len()
            );
            Some(targets)
        }
        None => None,
    };

    let traversal = Traversal::open(
        &args.reads,
        args.reference.as_deref(),
        cpus,
        targets.as_ref().map(|targets| targets.traversal.clone()),
    )?;
    let codec = DistantMateCodec::new(&header);
    let region_checker = targets.map(|targets| RegionChecker::new(targets.scoring));

    let out_header = header_without_sort_claim(&header);
    make_parent_dirs(&args.output)?;
    let mut pairs_out = bam::Writer::from_path(&args.output, &out_header, bam::Format::Bam)?;
    if cpus > 1 {
        pairs_out.set_threads(cpus)?;
    }
    let singletons_out = match &args.singletons {
        Some(path) => {
            make_parent_dirs(path)?;
            Some(bam::Writer::from_path(path, &out_header, bam::Format::Bam)?)
        }
        None => None,
    };

    let filter = build_filter(args.min_mapq);
    let mut filtered_out: u64 = 0;
    let mut walker = PairReconciler::new(
        codec,
        region_checker,
        PairWriter {
            pairs: pairs_out,
            singletons: singletons_out,
        },
    );
    traversal.for_each(|record| {
        if filter.filter_read(&record) {
            walker.apply(record)
        } else {
            filtered_out += 1;
            Ok(())
        }
    })?;
    walker.finish()?;

    let (writer, metrics) = walker.into_parts();
    drop(writer); // flush the BAM outputs before reporting

    info!(
        "Reconciled {} pairs ({} distant) from {} reads; {} singletons, {} reads filtered out",
        metrics.pairs_emitted,
        metrics.distant_pairs_emitted,
        metrics.reads_seen,
        metrics.flushed_singletons + metrics.unpaired_class,
        filtered_out
    );
    debug!(
        "Buffer peak {}, {} duplicate emissions suppressed, {} pairs closed outside regions, {} discarded unmatched",
        metrics.buffer_peak,
        metrics.duplicate_emissions_suppressed,
        metrics.pairs_dropped_uninteresting,
        metrics.discarded_uninteresting + metrics.discarded_on_flush
    );

    if let Some(path) = &args.metrics {
        write_metrics(path, &metrics)?;
    }
    Ok(())
}

/// Clone the template header with any `@HD SO:` value rewritten to `unknown`.
/// Both output BAMs leave here in reconciliation order, so a coordinate-sorted
/// claim inherited from the input no longer holds.
fn header_without_sort_claim(template: &bam::HeaderView) -> bam::Header {
    let text = String::from_utf8_lossy(template.as_bytes());
    let mut rewritten = text
        .lines()
        .map(|line| {
            if line.starts_with("@HD") {
                line.split('\t')
                    .map(|field| {
                        if field.starts_with("SO:") {
                            "SO:unknown"
                        } else {
                            field
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\t")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    rewritten.push('\n');
    bam::Header::from_template(&bam::HeaderView::from_bytes(rewritten.as_bytes()))
}

fn build_filter(min_mapq: u8) -> CompositeReadFilter {
    let mut filters: Vec<Box<dyn ReadFilter>> = vec![
        Box::new(WellformedReadFilter),
        Box::new(NotDuplicateReadFilter),
    ];
    if min_mapq > 0 {
        filters.push(Box::new(MappingQualityReadFilter::new(min_mapq)));
    }
    CompositeReadFilter::new(filters)
}

fn write_metrics(path: &PathBuf, metrics: &PairingMetrics) -> Result<()> {
    make_parent_dirs(path)?;
    let mut writer = get_writer(&Some(path), is_bgzipped(path), true, 1, 6)?;
    writer.serialize(metrics)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::{Cigar, CigarString};
    use tempfile::tempdir;

    #[test]
    fn parses_minimal_arguments() {
        let args = PairsArgs::from_iter_safe(&[
            "pairs",
            "input.bam",
            "distant.bam",
            "--output",
            "pairs.bam",
        ])
        .unwrap();

        assert_eq!(
            args.reads,
            vec![PathBuf::from("input.bam"), PathBuf::from("distant.bam")]
        );
        assert_eq!(args.output, PathBuf::from("pairs.bam"));
        assert_eq!(args.pair_padding, 1000);
        assert_eq!(args.min_mapq, 0);
        assert!(args.bed.is_none());
        assert!(args.singletons.is_none());
    }

    #[test]
    fn requires_at_least_one_input() {
        assert!(PairsArgs::from_iter_safe(&["pairs", "--output", "pairs.bam"]).is_err());
    }

    fn header_text(header: &bam::Header) -> String {
        String::from_utf8_lossy(bam::HeaderView::from_header(header).as_bytes()).into_owned()
    }

    #[test]
    fn output_header_drops_the_coordinate_sort_claim() {
        let mut template = bam::header::Header::new();
        let mut hd_rec = bam::header::HeaderRecord::new(b"HD");
        hd_rec.push_tag(b"VN", &"1.6");
        hd_rec.push_tag(b"SO", &"coordinate");
        template.push_record(&hd_rec);
        let mut chr_rec = bam::header::HeaderRecord::new(b"SQ");
        chr_rec.push_tag(b"SN", &"chr1");
        chr_rec.push_tag(b"LN", &100_000.to_string());
        template.push_record(&chr_rec);

        let rewritten = header_without_sort_claim(&bam::HeaderView::from_header(&template));
        let text = header_text(&rewritten);
        assert!(text.contains("SO:unknown"));
        assert!(!text.contains("SO:coordinate"));
        assert!(text.contains("SN:chr1"));

        // A template with no @HD line passes through untouched.
        let plain = header_without_sort_claim(&bam::HeaderView::from_header(&test_header()));
        assert!(!header_text(&plain).contains("@HD"));
    }

    fn test_header() -> bam::header::Header {
        let mut header = bam::header::Header::new();
        let mut chr_rec = bam::header::HeaderRecord::new(b"SQ");
        chr_rec.push_tag(b"SN", &"chr1");
        chr_rec.push_tag(b"LN", &100_000.to_string());
        header.push_record(&chr_rec);
        header
    }

    fn paired(name: &[u8], pos: i64, mpos: i64) -> Record {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(50)]);
        record.set(name, Some(&cigar), &vec![b'A'; 50], &vec![30u8; 50]);
        record.set_tid(0);
        record.set_pos(pos);
        record.set_mtid(0);
        record.set_mpos(mpos);
        record.set_paired();
        record.set_mapq(60);
        record
    }

    #[test]
    fn writes_pairs_adjacently() {
        let tempdir = tempdir().unwrap();
        let input = tempdir.path().join("input.bam");
        let output = tempdir.path().join("pairs.bam");
        let metrics_path = tempdir.path().join("metrics.tsv");

        let mut writer = bam::Writer::from_path(&input, &test_header(), bam::Format::Bam).unwrap();
        // Two interleaved pairs, coordinate-sorted.
        for record in &[
            paired(b"frag1", 100, 300),
            paired(b"frag2", 150, 400),
            paired(b"frag1", 300, 100),
            paired(b"frag2", 400, 150),
        ] {
            writer.write(record).unwrap();
        }
        drop(writer);
        bam::index::build(&input, None, bam::index::Type::Bai, 1).unwrap();

        let args = PairsArgs {
            reads: vec![input],
            output: output.clone(),
            bed: None,
            pair_padding: 1000,
            singletons: None,
            metrics: Some(metrics_path.clone()),
            min_mapq: 0,
            threads: 1,
            reference: None,
        };
        run_pairs(args).unwrap();

        let mut reader = bam::Reader::from_path(&output).unwrap();
        let names: Vec<Vec<u8>> = reader
            .records()
            .map(|record| record.unwrap().qname().to_vec())
            .collect();
        assert_eq!(
            names,
            vec![
                b"frag1".to_vec(),
                b"frag1".to_vec(),
                b"frag2".to_vec(),
                b"frag2".to_vec()
            ]
        );

        let metrics = std::fs::read_to_string(&metrics_path).unwrap();
        assert!(metrics.starts_with("reads_seen"));
        assert!(metrics.lines().nth(1).is_some());
    }
}
