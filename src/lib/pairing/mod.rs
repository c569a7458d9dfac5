//! Mate-pair reconciliation: interval scoring, distant-mate stand-ins, the
//! name-keyed pair buffer, and the reconciliation state machine that ties
//! them together.

pub mod buffer;
pub mod distant;
pub mod region_checker;
pub mod walker;

pub use buffer::{DistantPairLedger, MateEntry, PairBuffer, DEFAULT_EXPECTED_PAIRS};
pub use distant::{is_distant_mate, DistantMateCodec, DISTANT_MATE_TAG};
pub use region_checker::RegionChecker;
pub use walker::{PairConsumer, PairReconciler, PairingMetrics};
