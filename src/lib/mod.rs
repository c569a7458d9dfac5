//! remate: mate-pair reconciliation for coordinate-sorted alignments.
//!
//! The library behind the `remate` CLI. It reunites read pairs out of
//! coordinate-sorted BAM/CRAM streams, optionally restricted to target
//! intervals, and recovers pairs whose mates map far apart by merging in the
//! repositioned stand-ins produced by the `distant-mates` subcommand.
//!
//! # Modules
//!
//! The main modules are:
//! - [`pairing`]: the reconciliation state machine and its parts (interval
//!   cursor, distant-mate codec, pair buffer)
//! - [`traversal`]: merged position-ordered delivery from one or more inputs
//! - [`intervals`]: BED loading, merging, and pair padding
//! - [`read_filter`]: filtering of reads based on various criteria
//! - [`core`]: shared plumbing (threads, TSV output, filesystem helpers)

pub mod core;
pub mod intervals;
pub mod pairing;
pub mod read_filter;
pub mod traversal;
