//! ECDSA signatures: strict DER parsing, low-S DER encoding, RFC 6979 signing.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa;

use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::PrimitivesError;

/// secp256k1 group order n, big-endian.
const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// n / 2, the largest S accepted as "low".
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Upper bound on a DER-encoded secp256k1 signature.
pub const MAX_DER_LEN: usize = 72;

/// An ECDSA signature as big-endian R and S.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Signature { r, s }
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Parse `0x30 len 0x02 rlen r 0x02 slen s`.
    ///
    /// Trailing bytes after the declared length are rejected, as are zero or
    /// out-of-range R and S.
    pub fn from_der(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        let malformed = |why: &str| PrimitivesError::InvalidSignature(format!("malformed DER: {}", why));

        if bytes.len() < 8 || bytes[0] != 0x30 {
            return Err(malformed("missing sequence header"));
        }
        if bytes[1] as usize + 2 != bytes.len() {
            return Err(malformed("sequence length mismatch"));
        }

        let (r, rest) = read_der_int(&bytes[2..]).ok_or_else(|| malformed("bad R"))?;
        let (s, rest) = read_der_int(rest).ok_or_else(|| malformed("bad S"))?;
        if !rest.is_empty() {
            return Err(malformed("trailing bytes"));
        }

        for (name, v) in [("R", &r), ("S", &s)] {
            if v.iter().all(|&b| b == 0) {
                return Err(PrimitivesError::InvalidSignature(format!("{} is zero", name)));
            }
            if *v >= CURVE_ORDER {
                return Err(PrimitivesError::InvalidSignature(format!("{} >= curve order", name)));
            }
        }
        Ok(Signature { r, s })
    }

    /// DER encoding with S normalized to the low half of the order.
    pub fn to_der(&self) -> Vec<u8> {
        let s = if self.s > HALF_ORDER { order_minus(&self.s) } else { self.s };
        let rb = der_int_bytes(&self.r);
        let sb = der_int_bytes(&s);

        let mut out = Vec::with_capacity(6 + rb.len() + sb.len());
        out.push(0x30);
        out.push((4 + rb.len() + sb.len()) as u8);
        for int in [&rb, &sb] {
            out.push(0x02);
            out.push(int.len() as u8);
            out.extend_from_slice(int);
        }
        out
    }

    /// Sign a prehashed message. Hashes shorter than 32 bytes are left-padded.
    pub fn sign(hash: &[u8], priv_key: &PrivateKey) -> Result<Self, PrimitivesError> {
        let digest = pad_hash(hash);
        let (sig, _) = priv_key
            .signing_key()
            .sign_prehash_recoverable(&digest)
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))?;

        let (r_bytes, s_bytes) = sig.split_bytes();
        let r: [u8; 32] = r_bytes.into();
        let mut s: [u8; 32] = s_bytes.into();
        if s > HALF_ORDER {
            s = order_minus(&s);
        }
        Ok(Signature { r, s })
    }

    pub fn verify(&self, hash: &[u8], pub_key: &PublicKey) -> bool {
        let Ok(sig) = ecdsa::Signature::from_scalars(self.r, self.s) else {
            return false;
        };
        pub_key
            .verifying_key()
            .verify_prehash(&pad_hash(hash), &sig)
            .is_ok()
    }
}

fn pad_hash(hash: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    if hash.len() >= 32 {
        out.copy_from_slice(&hash[..32]);
    } else {
        out[32 - hash.len()..].copy_from_slice(hash);
    }
    out
}

/// Read one DER INTEGER, returning it left-padded to 32 bytes plus the rest.
fn read_der_int(data: &[u8]) -> Option<([u8; 32], &[u8])> {
    if data.len() < 2 || data[0] != 0x02 {
        return None;
    }
    let len = data[1] as usize;
    if len == 0 || data.len() < 2 + len {
        return None;
    }
    let mut value = &data[2..2 + len];
    while value.len() > 1 && value[0] == 0 {
        value = &value[1..];
    }
    if value.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - value.len()..].copy_from_slice(value);
    Some((out, &data[2 + len..]))
}

/// Minimal big-endian DER integer body, with a 0x00 pad when the high bit is set.
fn der_int_bytes(v: &[u8; 32]) -> Vec<u8> {
    let start = v.iter().position(|&b| b != 0).unwrap_or(31);
    let trimmed = &v[start..];
    let mut out = Vec::with_capacity(trimmed.len() + 1);
    if trimmed[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

/// n - v over big-endian 256-bit integers.
fn order_minus(v: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut d = CURVE_ORDER[i] as i16 - v[i] as i16 - borrow;
        borrow = 0;
        if d < 0 {
            d += 256;
            borrow = 1;
        }
        out[i] = d as u8;
    }
    out
}
