//! secp256k1 private key.
//!
//! Wraps a k256 signing key and adds WIF encoding, ECDH shared secrets and
//! BRC-42 child derivation.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{Scalar, U256};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::ec::public_key::PublicKey;
use crate::ec::signature::Signature;
use crate::hash::{sha256_hmac, sha256d};
use crate::PrimitivesError;

const PRIVATE_KEY_LEN: usize = 32;
const MAINNET_WIF_PREFIX: u8 = 0x80;
const COMPRESSED_FLAG: u8 = 0x01;

/// A secp256k1 private key.
#[derive(Clone, Debug)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a random key from the OS RNG.
    pub fn new() -> Self {
        PrivateKey { inner: SigningKey::random(&mut OsRng) }
    }

    /// Parse a 32-byte big-endian scalar. Zero and values >= n are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(PrimitivesError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        let inner = SigningKey::from_slice(bytes)
            .map_err(|e| PrimitivesError::InvalidPrivateKey(e.to_string()))?;
        Ok(PrivateKey { inner })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }

    /// Decode a Base58Check WIF string (compressed or uncompressed form).
    pub fn from_wif(wif: &str) -> Result<Self, PrimitivesError> {
        let decoded = bs58::decode(wif)
            .into_vec()
            .map_err(|e| PrimitivesError::InvalidWif(e.to_string()))?;

        // prefix + key [+ compression flag] + 4-byte checksum
        let payload_len = match decoded.len() {
            38 if decoded[33] == COMPRESSED_FLAG => 34,
            38 => {
                return Err(PrimitivesError::InvalidWif(
                    "invalid compression flag".to_string(),
                ))
            }
            37 => 33,
            n => return Err(PrimitivesError::InvalidWif(format!("invalid length {}", n))),
        };
        let (payload, checksum) = decoded.split_at(payload_len);
        if sha256d(payload)[..4] != checksum[..] {
            return Err(PrimitivesError::ChecksumMismatch);
        }
        Self::from_bytes(&payload[1..1 + PRIVATE_KEY_LEN])
    }

    /// Mainnet, compressed-key WIF.
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(38);
        payload.push(MAINNET_WIF_PREFIX);
        payload.extend_from_slice(&self.to_bytes());
        payload.push(COMPRESSED_FLAG);
        let checksum = sha256d(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload).into_string()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn pub_key(&self) -> PublicKey {
        PublicKey::from_k256_verifying_key(self.inner.verifying_key())
    }

    /// RFC 6979 deterministic, low-S signature over a prehashed message.
    pub fn sign(&self, hash: &[u8]) -> Result<Signature, PrimitivesError> {
        Signature::sign(hash, self)
    }

    /// ECDH: multiply the counterparty's point by this key's scalar.
    pub fn derive_shared_secret(&self, pub_key: &PublicKey) -> Result<PublicKey, PrimitivesError> {
        let shared = pub_key.to_projective_point() * self.to_scalar();
        PublicKey::from_bytes(shared.to_affine().to_encoded_point(true).as_bytes())
    }

    /// BRC-42 child private key.
    ///
    /// The child scalar is `self + HMAC-SHA256(key = shared secret, msg = invoice)`
    /// reduced mod n, where the shared secret is the compressed ECDH point with
    /// `pub_key`. The matching public key is [`PublicKey::derive_child`] called
    /// by the counterparty.
    pub fn derive_child(
        &self,
        pub_key: &PublicKey,
        invoice_number: &str,
    ) -> Result<PrivateKey, PrimitivesError> {
        let shared = self.derive_shared_secret(pub_key)?;
        let tweak = sha256_hmac(&shared.to_compressed(), invoice_number.as_bytes());
        let child = self.to_scalar() + reduce_scalar(&tweak);
        PrivateKey::from_bytes(&child.to_bytes())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }

    pub(crate) fn to_scalar(&self) -> Scalar {
        *self.inner.as_nonzero_scalar().as_ref()
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        let mut bytes = self.inner.to_bytes();
        bytes.zeroize();
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}

/// Interpret 32 big-endian bytes as a scalar, reducing mod n.
pub(crate) fn reduce_scalar(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(bytes))
}
