//! ARC configuration, lifecycle statuses and response bodies.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle status ARC reports for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArcStatus {
    /// Not accepted and never will be.
    Rejected,
    /// Received, waiting for processing.
    Queued,
    /// Received by ARC.
    Received,
    /// Persisted by ARC.
    Stored,
    /// Announced to peers.
    AnnouncedToNetwork,
    /// Requested by a peer.
    RequestedByNetwork,
    /// Sent to a peer.
    SentToNetwork,
    /// A peer accepted it into its mempool.
    AcceptedByNetwork,
    /// Seen in mempools.
    SeenOnNetwork,
    /// Included in a block.
    Mined,
    /// Buried deeply enough to be final.
    Confirmed,
    /// Conflicts with another transaction spending the same outputs.
    DoubleSpendAttempted,
    /// Parked in an orphan mempool, waiting for a parent.
    SeenInOrphanMempool,
    /// A status this client does not know.
    #[serde(other)]
    Unknown,
}

impl ArcStatus {
    /// Numeric code sent in the `X-WaitForStatus` header.
    pub fn as_code(&self) -> i32 {
        match self {
            Self::Rejected => 0,
            Self::Queued => 1,
            Self::Received => 2,
            Self::Stored => 3,
            Self::AnnouncedToNetwork => 4,
            Self::RequestedByNetwork => 5,
            Self::SentToNetwork => 6,
            Self::AcceptedByNetwork => 7,
            Self::SeenOnNetwork => 8,
            Self::Mined => 9,
            Self::Confirmed => 10,
            Self::DoubleSpendAttempted => 11,
            Self::SeenInOrphanMempool => 12,
            Self::Unknown => -1,
        }
    }

    /// Statuses that end the transaction's life without it being mined.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected | Self::DoubleSpendAttempted)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "REJECTED",
            Self::Queued => "QUEUED",
            Self::Received => "RECEIVED",
            Self::Stored => "STORED",
            Self::AnnouncedToNetwork => "ANNOUNCED_TO_NETWORK",
            Self::RequestedByNetwork => "REQUESTED_BY_NETWORK",
            Self::SentToNetwork => "SENT_TO_NETWORK",
            Self::AcceptedByNetwork => "ACCEPTED_BY_NETWORK",
            Self::SeenOnNetwork => "SEEN_ON_NETWORK",
            Self::Mined => "MINED",
            Self::Confirmed => "CONFIRMED",
            Self::DoubleSpendAttempted => "DOUBLE_SPEND_ATTEMPTED",
            Self::SeenInOrphanMempool => "SEEN_IN_ORPHAN_MEMPOOL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ArcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings of an [`ArcClient`](crate::ArcClient).
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcConfig {
    /// API root, e.g. `https://arc.taal.com/v1`.
    pub base_url: String,
    /// Sent as a Bearer token.
    pub api_key: Option<String>,
    /// Where ARC posts status callbacks.
    pub callback_url: Option<String>,
    /// Token ARC attaches to callbacks.
    pub callback_token: Option<String>,
    /// Status ARC waits for before answering a submit.
    pub wait_for_status: Option<ArcStatus>,
    /// Ask ARC to skip fee checks.
    pub skip_fee_validation: bool,
    /// Ask ARC to skip script checks.
    pub skip_script_validation: bool,
    /// Ask ARC to accept fees summed over unmined ancestors.
    pub cumulative_fee_validation: bool,
    /// Seconds ARC may spend waiting for `wait_for_status`.
    pub max_timeout: Option<u32>,
    /// Client-side limit on a whole request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ArcConfig {
    fn default() -> Self {
        Self {
            base_url: "https://arc.taal.com/v1".to_string(),
            api_key: None,
            callback_url: None,
            callback_token: None,
            wait_for_status: None,
            skip_fee_validation: false,
            skip_script_validation: false,
            cumulative_fee_validation: false,
            max_timeout: None,
            request_timeout_secs: 30,
        }
    }
}

impl ArcConfig {
    /// Parse a JSON config, defaulting absent fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// [`request_timeout_secs`](Self::request_timeout_secs) as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Body of ARC's answer to a submit or status query.
///
/// Error answers use the same shape with `detail` set and `status` holding
/// the HTTP-style error code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcResponse {
    /// Hex txid, absent on some error answers.
    #[serde(default)]
    pub txid: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub tx_status: Option<ArcStatus>,
    /// HTTP-style result code, such as 200 or 465.
    #[serde(default)]
    pub status: Option<u16>,
    /// Short summary.
    #[serde(default)]
    pub title: Option<String>,
    /// Hash of the block that mined the transaction.
    #[serde(default)]
    pub block_hash: Option<String>,
    /// Height of that block.
    #[serde(default)]
    pub block_height: Option<u32>,
    /// Node-provided detail, e.g. a script error.
    #[serde(default)]
    pub extra_info: Option<String>,
    /// Error explanation.
    #[serde(default)]
    pub detail: Option<String>,
    /// Hex BUMP once mined.
    #[serde(default)]
    pub merkle_path: Option<String>,
}

impl ArcResponse {
    /// The most specific explanation the body carries.
    pub fn reason(&self) -> String {
        [&self.extra_info, &self.detail, &self.title]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "no detail".to_string())
    }
}
