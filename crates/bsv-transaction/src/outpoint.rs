//! Outpoint: the (txid, output index) pair that names a transaction output.

use std::fmt;
use std::str::FromStr;

use bsv_primitives::chainhash::Hash;
use bsv_primitives::util::{BsvReader, BsvWriter};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TransactionError;

/// Reasons an outpoint string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutpointParseError {
    #[error("outpoint '{0}' has no '.' separator")]
    MissingSeparator(String),

    #[error("outpoint txid '{0}' is not 64 hex characters")]
    InvalidTxid(String),

    #[error("outpoint index '{0}' is not a decimal u32")]
    InvalidIndex(String),
}

/// Identity of a transaction output. The text form is `<txid hex>.<vout>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint {
    pub txid: Hash,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        Outpoint { txid, vout }
    }

    /// Wire form: 32-byte txid in internal order followed by the LE index.
    pub fn write_to(&self, writer: &mut BsvWriter) {
        writer.write_bytes(self.txid.as_bytes());
        writer.write_u32_le(self.vout);
    }

    pub fn read_from(reader: &mut BsvReader) -> Result<Self, TransactionError> {
        let txid = Hash::new(reader.read_32()?);
        let vout = reader.read_u32_le()?;
        Ok(Outpoint { txid, vout })
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.txid, self.vout)
    }
}

impl FromStr for Outpoint {
    type Err = OutpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once('.')
            .ok_or_else(|| OutpointParseError::MissingSeparator(s.to_string()))?;
        let txid = Hash::from_hex(txid).map_err(|_| OutpointParseError::InvalidTxid(txid.to_string()))?;
        // u32::from_str accepts a leading '+'; the text form does not.
        if vout.is_empty() || !vout.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OutpointParseError::InvalidIndex(vout.to_string()));
        }
        let vout = vout
            .parse::<u32>()
            .map_err(|_| OutpointParseError::InvalidIndex(vout.to_string()))?;
        Ok(Outpoint { txid, vout })
    }
}

impl Serialize for Outpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Outpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
