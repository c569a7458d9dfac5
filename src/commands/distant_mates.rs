//! # Distant-mate extraction
//!
//! Performs a single streaming pass over a coordinate-sorted BAM/CRAM and, for
//! every primary well-formed read whose mate maps to another contig or more
//! than the cutoff distance away, emits an altered copy placed at the mate's
//! coordinate. The original contig, position, and CIGAR ride along in an aux
//! tag so the copy can be recovered downstream. The output is coordinate-
//! sorted; index it and hand it to `remate pairs` alongside the original
//! alignments.

use anyhow::{Context, Result};
use log::*;
use rayon::prelude::*;
use remate_lib::core::prelude::*;
use remate_lib::pairing::DistantMateCodec;
use remate_lib::read_filter::{
    self, CompositeReadFilter, MateDistantReadFilter, NotDuplicateReadFilter,
    PrimaryLineReadFilter, ReadFilter, WellformedReadFilter,
};
use rust_htslib::bam::{self, record::Record, Read};
use std::path::PathBuf;
use structopt::StructOpt;

/// Arguments for the `distant-mates` command.
#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "distant-mates",
    about = "Emit repositioned stand-ins for reads whose mates map far away"
)]
pub struct DistantMatesArgs {
    /// Coordinate-sorted BAM/CRAM to scan.
    #[structopt(parse(from_os_str))]
    pub reads: PathBuf,

    /// Output BAM receiving the coordinate-sorted stand-ins.
    #[structopt(short, long, parse(from_os_str))]
    pub output: PathBuf,

    /// Same-contig distance in basepairs beyond which a mate counts as
    /// distant. Cross-contig mates always count.
    #[structopt(long, short = "d", default_value = read_filter::DEFAULT_MATE_DISTANCE_STR.as_str())]
    pub distance: i64,

    /// Number of threads for (de)compression and sorting.
    #[structopt(short, long, default_value = "4")]
    pub threads: usize,

    /// Path to reference FASTA file (required for CRAM files).
    #[structopt(long, parse(from_os_str), short = "r")]
    pub reference: Option<PathBuf>,
}

pub fn run_distant_mates(args: DistantMatesArgs) -> Result<()> {
    info!("Running remate-distant-mates on: {:?}", args.reads);
    let cpus = determine_allowed_cpus(args.threads)?;
    if let Err(err) = set_rayon_global_pools_size(cpus) {
        debug!("Rayon pool was already initialised: {}", err);
    }

    let mut reader = bam::Reader::from_path(&args.reads)
        .with_context(|| format!("Failed to open {}", args.reads.display()))?;
    if cpus > 1 {
        reader.set_threads(cpus)?;
    }
    if let Some(fasta) = &args.reference {
        reader.set_reference(fasta)?;
    }
    let header = reader.header().to_owned();
    let codec = DistantMateCodec::new(&header);
    let filter = CompositeReadFilter::new(vec![
        Box::new(PrimaryLineReadFilter),
        Box::new(NotDuplicateReadFilter),
        Box::new(WellformedReadFilter),
        Box::new(MateDistantReadFilter::new(args.distance)),
    ]);

    let mut stand_ins: Vec<Record> = Vec::new();
    let mut seen: u64 = 0;
    for result in reader.records() {
        let record =
            result.with_context(|| format!("Failed to read {}", args.reads.display()))?;
        seen += 1;
        if !filter.filter_read(&record) {
            continue;
        }
        stand_ins.push(codec.apply_alterations(&record)?);
    }
    info!(
        "Found {} distant-mate reads among {} records",
        stand_ins.len(),
        seen
    );

    // Stand-ins take their mate's coordinate, so the stream order is lost;
    // restore it before writing.
    stand_ins.par_sort_unstable_by_key(|record| (record.tid(), record.pos()));

    make_parent_dirs(&args.output)?;
    let mut writer = bam::Writer::from_path(
        &args.output,
        &bam::Header::from_template(&header),
        bam::Format::Bam,
    )?;
    if cpus > 1 {
        writer.set_threads(cpus)?;
    }
    for record in &stand_ins {
        writer.write(record)?;
    }
    info!("Wrote {} stand-ins to {:?}", stand_ins.len(), args.output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use remate_lib::pairing::is_distant_mate;
    use rust_htslib::bam::record::{Cigar, CigarString};
    use tempfile::tempdir;

    #[test]
    fn parses_minimal_arguments() {
        let args =
            DistantMatesArgs::from_iter_safe(&["distant-mates", "input.bam", "-o", "distant.bam"])
                .unwrap();

        assert_eq!(args.reads, PathBuf::from("input.bam"));
        assert_eq!(args.output, PathBuf::from("distant.bam"));
        assert_eq!(args.distance, 1000);
        assert_eq!(args.threads, 4);
    }

    fn test_header() -> bam::header::Header {
        let mut header = bam::header::Header::new();
        for name in &["chr1", "chr2"] {
            let mut chr_rec = bam::header::HeaderRecord::new(b"SQ");
            chr_rec.push_tag(b"SN", name);
            chr_rec.push_tag(b"LN", &100_000.to_string());
            header.push_record(&chr_rec);
        }
        header
    }

    fn paired(name: &[u8], tid: i32, pos: i64, mtid: i32, mpos: i64) -> Record {
        let mut record = Record::new();
        let cigar = CigarString(vec![Cigar::Match(50)]);
        record.set(name, Some(&cigar), &vec![b'A'; 50], &vec![30u8; 50]);
        record.set_tid(tid);
        record.set_pos(pos);
        record.set_mtid(mtid);
        record.set_mpos(mpos);
        record.set_paired();
        record.set_mapq(60);
        record.unset_unmapped();
        record
    }

    #[test]
    fn extracts_and_repositions_distant_reads() {
        let tempdir = tempdir().unwrap();
        let input = tempdir.path().join("input.bam");
        let output = tempdir.path().join("distant.bam");

        let mut writer = bam::Writer::from_path(&input, &test_header(), bam::Format::Bam).unwrap();
        // A nearby pair (ignored) and a cross-contig pair (both sides emitted).
        for record in &[
            paired(b"near", 0, 100, 0, 300),
            paired(b"far", 0, 200, 1, 5000),
            paired(b"near", 0, 300, 0, 100),
            paired(b"far", 1, 5000, 0, 200),
        ] {
            writer.write(record).unwrap();
        }
        drop(writer);

        let args = DistantMatesArgs {
            reads: input,
            output: output.clone(),
            distance: 1000,
            threads: 1,
            reference: None,
        };
        run_distant_mates(args).unwrap();

        let mut reader = bam::Reader::from_path(&output).unwrap();
        let stand_ins: Vec<Record> = reader.records().map(|record| record.unwrap()).collect();
        assert_eq!(stand_ins.len(), 2);
        assert!(stand_ins.iter().all(is_distant_mate));
        // Each stand-in sits at its mate's coordinate, in sorted order.
        assert_eq!((stand_ins[0].tid(), stand_ins[0].pos()), (0, 200));
        assert_eq!((stand_ins[1].tid(), stand_ins[1].pos()), (1, 5000));
        assert!(stand_ins.iter().all(|record| record.qname() == b"far"));
    }
}
