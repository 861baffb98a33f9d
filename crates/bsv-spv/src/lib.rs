//! SPV evidence for BSV: BRC-74 merkle paths, BEEF bundles (V1, V2 and
//! Atomic), plus the chain-tracker and broadcaster seams.

pub mod beef;
pub mod broadcaster;
pub mod chain_tracker;
pub mod error;
pub mod merkle_path;

pub use beef::{Beef, BeefTx, DataFormat, ATOMIC_BEEF, BEEF_V1, BEEF_V2};
pub use broadcaster::{BroadcastFailure, BroadcastSuccess, Broadcaster};
pub use chain_tracker::ChainTracker;
pub use error::SpvError;
pub use merkle_path::{merkle_tree_parent, MerklePath, PathElement};
