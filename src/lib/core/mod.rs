//! Shared plumbing used by every subcommand: thread-count validation,
//! broken-pipe detection, filesystem helpers, and TSV output.

pub mod concurrency;
pub mod errors;
pub mod fs;
pub mod io;

pub mod prelude {
    pub use super::concurrency::{determine_allowed_cpus, set_rayon_global_pools_size};
    pub use super::errors::is_broken_pipe;
    pub use super::fs::{is_bgzipped, make_parent_dirs};
    pub use super::io::get_writer;
}
