use bsv_primitives::chainhash::Hash;
use bsv_transaction::Outpoint;

/// Why a signable reference cannot be finalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("unknown reference {0}")]
    Unknown(String),
    #[error("reference {0} expired")]
    Expired(String),
    #[error("reference {0} was already finalized")]
    AlreadyFinalized(String),
    #[error("reference {0} was abandoned")]
    Abandoned(String),
}

/// Failures of the change store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("output {0} is not in the store")]
    NotFound(Outpoint),
    /// The output is reserved by another action or already spent.
    #[error("output {0} is not available")]
    Unavailable(Outpoint),
    #[error("output {0} is already stored")]
    Duplicate(Outpoint),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors from building, finalizing and broadcasting actions.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid action: {0}")]
    Validation(String),

    #[error("insufficient funds: {required} satoshis required, {available} available")]
    Funding { required: u64, available: u64 },

    #[error("missing ancestry: {0}")]
    Ancestry(String),

    #[error("unlocking script for input {input_index} is {actual} bytes, {declared} declared")]
    Sizing { input_index: u32, declared: usize, actual: usize },

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("broadcast of {txid} failed: {description}")]
    Broadcast { txid: Hash, retryable: bool, description: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("evidence error: {0}")]
    Spv(#[from] bsv_spv::SpvError),

    #[error("transaction error: {0}")]
    Transaction(#[from] bsv_transaction::TransactionError),

    #[error("wallet error: {0}")]
    Wallet(#[from] bsv_wallet::WalletError),

    #[error("script error: {0}")]
    Script(#[from] bsv_script::ScriptError),

    #[error("outpoint error: {0}")]
    Outpoint(#[from] bsv_transaction::OutpointParseError),
}

impl ActionError {
    /// Whether the same request may succeed later: more funds arrived, or
    /// the held transaction can be resubmitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::Funding { .. } => true,
            ActionError::Broadcast { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ActionError::Funding { required: 10, available: 1 }.is_retryable());
        let held = ActionError::Broadcast {
            txid: Hash::default(),
            retryable: true,
            description: "timeout".into(),
        };
        assert!(held.is_retryable());
        let rejected = ActionError::Broadcast {
            txid: Hash::default(),
            retryable: false,
            description: "bad-txns-inputs-missingorspent".into(),
        };
        assert!(!rejected.is_retryable());
        assert!(!ActionError::Validation("x".into()).is_retryable());
        assert!(!ActionError::from(ReferenceError::Unknown("r".into())).is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = ActionError::Sizing { input_index: 1, declared: 73, actual: 74 };
        assert_eq!(err.to_string(), "unlocking script for input 1 is 74 bytes, 73 declared");
        let err = ActionError::from(ReferenceError::AlreadyFinalized("abc".into()));
        assert_eq!(err.to_string(), "reference abc was already finalized");
    }
}
