/// Errors from key derivation and script templates.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("primitives error: {0}")]
    Primitives(#[from] bsv_primitives::PrimitivesError),
    #[error("script error: {0}")]
    Script(#[from] bsv_script::ScriptError),
    #[error("transaction error: {0}")]
    Transaction(#[from] bsv_transaction::TransactionError),
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),
    #[error("invalid key ID: {0}")]
    InvalidKeyId(String),
    #[error("invalid counterparty: {0}")]
    InvalidCounterparty(String),
    /// A locking script does not have the shape the template expects.
    #[error("not a {template} script: {reason}")]
    UnrecognizedScript { template: &'static str, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
