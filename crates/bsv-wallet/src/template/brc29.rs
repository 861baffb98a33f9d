//! BRC-29 payment derivation parameters.

use serde::{Deserialize, Serialize};

use crate::types::{Protocol, SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY};

/// Protocol name registered for BRC-29 payments.
pub const BRC29_PROTOCOL_NAME: &str = "3241645161d8";

pub fn brc29_protocol() -> Protocol {
    Protocol::new(SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY, BRC29_PROTOCOL_NAME)
}

/// The nonce pair both parties use to derive the per-output key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brc29Params {
    pub derivation_prefix: String,
    pub derivation_suffix: String,
}

impl Brc29Params {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Brc29Params { derivation_prefix: prefix.into(), derivation_suffix: suffix.into() }
    }

    pub fn key_id(&self) -> String {
        format!("{} {}", self.derivation_prefix, self.derivation_suffix)
    }
}
