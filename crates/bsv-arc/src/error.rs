//! ARC failures and how they map onto broadcast outcomes.

use bsv_spv::BroadcastFailure;

use crate::types::ArcStatus;

/// Errors talking to ARC.
#[derive(Debug, thiserror::Error)]
pub enum ArcError {
    /// The request never produced an HTTP answer.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// ARC answered with a non-success HTTP status.
    #[error("HTTP {status}: {detail}")]
    Http {
        /// HTTP status code, or ARC's own code from the body.
        status: u16,
        /// Explanation from the body.
        detail: String,
    },

    /// ARC accepted the request but refuses the transaction.
    #[error("{status}: {detail}")]
    Rejected {
        /// Terminal lifecycle status.
        status: ArcStatus,
        /// Explanation from the body.
        detail: String,
    },

    /// The body was not an ARC response.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ArcError {
    /// Whether resubmitting the same transaction may succeed.
    ///
    /// Transport trouble, server errors, throttling and undecodable bodies
    /// are retryable. Client errors and terminal statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArcError::Transport(_) | ArcError::Decode(_) => true,
            ArcError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ArcError::Rejected { .. } => false,
        }
    }

    fn code(&self) -> String {
        match self {
            ArcError::Transport(e) if e.is_timeout() => "TIMEOUT".to_string(),
            ArcError::Transport(_) => "TRANSPORT".to_string(),
            ArcError::Http { status, .. } => status.to_string(),
            ArcError::Rejected { status, .. } => status.to_string(),
            ArcError::Decode(_) => "DECODE".to_string(),
        }
    }
}

impl From<ArcError> for BroadcastFailure {
    fn from(error: ArcError) -> Self {
        BroadcastFailure {
            code: error.code(),
            description: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let server = ArcError::Http { status: 503, detail: "overloaded".into() };
        assert!(server.is_retryable());
        let throttled = ArcError::Http { status: 429, detail: "slow down".into() };
        assert!(throttled.is_retryable());
        let malformed = ArcError::Http { status: 463, detail: "malformed".into() };
        assert!(!malformed.is_retryable());
        let double = ArcError::Rejected { status: ArcStatus::DoubleSpendAttempted, detail: "conflict".into() };
        assert!(!double.is_retryable());

        let failure = BroadcastFailure::from(double);
        assert_eq!(failure.code, "DOUBLE_SPEND_ATTEMPTED");
        assert!(!failure.retryable);
        assert_eq!(failure.description, "DOUBLE_SPEND_ATTEMPTED: conflict");
    }
}
