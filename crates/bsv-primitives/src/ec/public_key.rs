//! secp256k1 public key.

use std::fmt;
use std::hash::{Hash as StdHash, Hasher};

use k256::ecdsa::VerifyingKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ProjectivePoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ec::private_key::{reduce_scalar, PrivateKey};
use crate::ec::signature::Signature;
use crate::hash::{hash160, sha256_hmac};
use crate::PrimitivesError;

/// Length of a compressed SEC1 public key.
pub const COMPRESSED_LEN: usize = 33;

/// A secp256k1 public key. Compares, hashes and serializes by its
/// compressed SEC1 encoding.
#[derive(Clone, Debug)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse a compressed (33-byte) or uncompressed (65-byte) SEC1 key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if bytes.is_empty() {
            return Err(PrimitivesError::InvalidPublicKey("empty key".to_string()));
        }
        let inner = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| PrimitivesError::InvalidPublicKey(e.to_string()))?;
        Ok(PublicKey { inner })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }

    pub fn to_compressed(&self) -> [u8; COMPRESSED_LEN] {
        let mut out = [0u8; COMPRESSED_LEN];
        out.copy_from_slice(self.inner.to_encoded_point(true).as_bytes());
        out
    }

    /// Compressed key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }

    /// Hash160 of the compressed encoding.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.to_compressed())
    }

    pub fn verify(&self, hash: &[u8], sig: &Signature) -> bool {
        sig.verify(hash, self)
    }

    /// BRC-42 child public key: `self + G * HMAC(shared secret, invoice)`.
    ///
    /// `private_key` belongs to the other party; the owner of `self` derives
    /// the matching private key with [`PrivateKey::derive_child`].
    pub fn derive_child(
        &self,
        private_key: &PrivateKey,
        invoice_number: &str,
    ) -> Result<PublicKey, PrimitivesError> {
        let shared = private_key.derive_shared_secret(self)?;
        let tweak = sha256_hmac(&shared.to_compressed(), invoice_number.as_bytes());
        let child = self.to_projective_point() + ProjectivePoint::GENERATOR * reduce_scalar(&tweak);
        PublicKey::from_bytes(child.to_affine().to_encoded_point(true).as_bytes())
    }

    pub(crate) fn from_k256_verifying_key(vk: &VerifyingKey) -> Self {
        PublicKey { inner: *vk }
    }

    pub(crate) fn to_projective_point(&self) -> ProjectivePoint {
        ProjectivePoint::from(*self.inner.as_affine())
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_compressed() == other.to_compressed()
    }
}

impl Eq for PublicKey {}

impl StdHash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_compressed().hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_HEX: &str =
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_parse_compressed_and_uncompressed() {
        let compressed = PublicKey::from_hex(GENERATOR_HEX).unwrap();
        let uncompressed = PublicKey::from_hex(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        assert_eq!(compressed, uncompressed);
        assert_eq!(uncompressed.to_hex(), GENERATOR_HEX);
    }

    #[test]
    fn test_rejects_off_curve_and_empty() {
        assert!(PublicKey::from_bytes(&[]).is_err());
        // 0x05 is not a SEC1 tag.
        let mut bad = hex::decode(GENERATOR_HEX).unwrap();
        bad[0] = 0x05;
        assert!(PublicKey::from_bytes(&bad).is_err());
        assert!(PublicKey::from_bytes(&bad[..32]).is_err());
    }

    /// Hash160 of the generator's compressed encoding.
    #[test]
    fn test_hash160_of_generator() {
        let g = PublicKey::from_hex(GENERATOR_HEX).unwrap();
        assert_eq!(
            hex::encode(g.hash160()),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_serde_hex() {
        let g = PublicKey::from_hex(GENERATOR_HEX).unwrap();
        let json = serde_json::to_string(&g).unwrap();
        assert_eq!(json, format!("\"{}\"", GENERATOR_HEX));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
    }
}
