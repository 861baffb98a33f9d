//! Broadcast seam between transaction producers and the network.

use std::fmt;
use std::future::Future;

use bsv_primitives::chainhash::Hash;
use bsv_transaction::Transaction;

/// The network accepted the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSuccess {
    pub txid: Hash,
    pub message: String,
}

/// The network did not accept the transaction.
///
/// `retryable` separates transport trouble and transient service errors,
/// where resubmitting the same bytes may succeed, from policy or consensus
/// rejections, where it never will.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    pub code: String,
    pub description: String,
    pub retryable: bool,
}

impl BroadcastFailure {
    pub fn retryable(code: impl Into<String>, description: impl Into<String>) -> Self {
        BroadcastFailure { code: code.into(), description: description.into(), retryable: true }
    }

    pub fn fatal(code: impl Into<String>, description: impl Into<String>) -> Self {
        BroadcastFailure { code: code.into(), description: description.into(), retryable: false }
    }
}

impl fmt::Display for BroadcastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

impl std::error::Error for BroadcastFailure {}

pub trait Broadcaster: Send + Sync {
    fn broadcast(
        &self,
        tx: &Transaction,
    ) -> impl Future<Output = Result<BroadcastSuccess, BroadcastFailure>> + Send;
}
