//! Header lookup seam used to check merkle roots.

use bsv_primitives::chainhash::Hash;

use crate::error::SpvError;

pub trait ChainTracker {
    /// Whether `root` is the merkle root of the block at `height`.
    fn is_valid_root_for_height(&self, root: &Hash, height: u32) -> Result<bool, SpvError>;

    fn current_height(&self) -> Result<u32, SpvError>;
}
