use bsv_primitives::chainhash::Hash;

/// Errors from evidence parsing, pruning and verification.
#[derive(Debug, thiserror::Error)]
pub enum SpvError {
    #[error("invalid BEEF: {0}")]
    InvalidBeef(String),

    #[error("invalid merkle path: {0}")]
    InvalidMerklePath(String),

    #[error("transaction {0} not found in BEEF")]
    TransactionNotFound(Hash),

    /// A retained raw transaction spends a parent the bundle does not carry.
    #[error("transaction {txid} references {parent}, which is not in the BEEF")]
    MissingAncestor { txid: Hash, parent: Hash },

    #[error("chain tracker error: {0}")]
    ChainTracker(String),

    #[error("transaction error: {0}")]
    Transaction(#[from] bsv_transaction::TransactionError),

    #[error("primitives error: {0}")]
    Primitives(#[from] bsv_primitives::PrimitivesError),

    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
}
