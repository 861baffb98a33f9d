//! The 32-byte identifier of transactions, blocks and merkle nodes.
//!
//! Bytes are held in internal (wire) order. The text form is the byte-reversed
//! hex string every explorer and RPC shows for a txid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::{sha256, sha256d};
use crate::PrimitivesError;

/// Size of a Hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash stored in internal byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Wrap 32 bytes that are already in internal order.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Wrap a slice in internal order, rejecting any length other than 32.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| {
            PrimitivesError::InvalidHash(format!(
                "expected {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Hash(arr))
    }

    /// Parse the display form: exactly 64 hex characters, byte-reversed.
    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        if hex_str.len() != HASH_SIZE * 2 {
            return Err(PrimitivesError::InvalidHash(format!(
                "expected {} hex characters, got {}",
                HASH_SIZE * 2,
                hex_str.len()
            )));
        }
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        bytes.reverse();
        Ok(Hash(bytes))
    }

    /// Internal-order bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Display-order (reversed) bytes.
    pub fn to_display_bytes(&self) -> [u8; HASH_SIZE] {
        let mut out = self.0;
        out.reverse();
        out
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_display_bytes()))
    }
}

impl FromStr for Hash {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of `data` as a Hash.
pub fn hash_h(data: &[u8]) -> Hash {
    Hash(sha256(data))
}

/// Double SHA-256 of `data` as a Hash; a serialized transaction yields its txid.
pub fn double_hash_h(data: &[u8]) -> Hash {
    Hash(sha256d(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_DISPLAY: &str =
        "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

    /// The genesis block hash displays reversed relative to its wire bytes.
    #[test]
    fn test_display_is_byte_reversed() {
        let h = Hash::from_hex(GENESIS_DISPLAY).unwrap();
        assert_eq!(h.as_bytes()[0], 0x6f);
        assert_eq!(h.as_bytes()[31], 0x00);
        assert_eq!(h.to_string(), GENESIS_DISPLAY);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Hash::from_hex("").is_err());
        assert!(Hash::from_hex(&GENESIS_DISPLAY[1..]).is_err());
        assert!(Hash::from_hex(&format!("{}00", GENESIS_DISPLAY)).is_err());
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        let bad = format!("zz{}", &GENESIS_DISPLAY[2..]);
        assert!(matches!(
            Hash::from_hex(&bad),
            Err(PrimitivesError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_from_bytes_length_check() {
        assert!(Hash::from_bytes(&[0u8; 31]).is_err());
        assert_eq!(Hash::from_bytes(&[7u8; 32]).unwrap(), Hash::new([7u8; 32]));
    }

    #[test]
    fn test_serde_uses_display_hex() {
        let h: Hash = GENESIS_DISPLAY.parse().unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", GENESIS_DISPLAY));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_double_hash_h_matches_sha256d() {
        assert_eq!(double_hash_h(b"abc").as_bytes(), &sha256d(b"abc"));
    }
}
