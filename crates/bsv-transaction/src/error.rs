/// Errors from transaction parsing, sighash computation and signing.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Structurally invalid, such as an input index out of range.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Signing could not proceed, typically because source output data is missing.
    #[error("signing error: {0}")]
    SigningError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("outpoint error: {0}")]
    Outpoint(#[from] crate::outpoint::OutpointParseError),

    #[error("script error: {0}")]
    Script(#[from] bsv_script::ScriptError),

    #[error("primitives error: {0}")]
    Primitives(#[from] bsv_primitives::PrimitivesError),
}
