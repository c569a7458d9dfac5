//! remate - mate-pair reconciliation for coordinate-sorted alignments
//!
//! remate reunites read pairs out of coordinate-sorted BAM/CRAM files, where
//! mates sit apart in the stream and pairs spanning contigs or long gaps never
//! meet at all. It solves the second problem by rewriting each such read as a
//! stand-in placed at its mate's coordinate, merging those stand-ins back into
//! the traversal, and recovering the original alignments when the pair closes.
//!
//! # Tools
//!
//! remate provides two subcommands:
//!
//! - `distant-mates`: scan an input and emit repositioned stand-ins for every
//!   read whose mate maps far away
//! - `pairs`: merge the original alignments with the stand-ins and write
//!   reconciled pairs adjacently
//!
//! # Usage
//!
//! ```bash
//! # Extract stand-ins for far-away mates
//! remate distant-mates input.bam -o input.distant.bam
//! samtools index input.distant.bam
//!
//! # Reconcile pairs over regions of interest
//! remate pairs input.bam input.distant.bam --bed targets.bed -o pairs.bam
//!
//! # Whole-file reconciliation, keeping unmatched reads
//! remate pairs input.bam input.distant.bam -o pairs.bam --singletons single.bam
//! ```
//!
//! For more detailed usage information, see the documentation for each subcommand.

extern crate remate_lib;
pub mod commands;
use anyhow::Result;
use env_logger::Env;
use log::*;
use remate_lib::core::errors::is_broken_pipe;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case", author, about)]
/// Commands for reconciling mate pairs with remate
struct Args {
    #[structopt(subcommand)]
    subcommand: Subcommand,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
enum Subcommand {
    /// Emit repositioned stand-ins for reads whose mates map far away
    DistantMates(commands::DistantMatesArgs),
    /// Reconcile mates from coordinate-sorted inputs and write them adjacently
    Pairs(commands::PairsArgs),
}

impl Subcommand {
    fn run(self) -> Result<()> {
        match self {
            Subcommand::DistantMates(args) => commands::run_distant_mates(args)?,
            Subcommand::Pairs(args) => commands::run_pairs(args)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(err) = Args::from_args().subcommand.run() {
        if is_broken_pipe(&err) {
            std::process::exit(0);
        }
        error!("{}", err);
        std::process::exit(1);
    }
    Ok(())
}
