pub mod distant_mates;
pub mod pairs;

pub use distant_mates::{run_distant_mates, DistantMatesArgs};
pub use pairs::{run_pairs, PairsArgs};
