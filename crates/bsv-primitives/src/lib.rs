//! Cryptographic primitives and wire helpers for the BSV wallet engine.
//!
//! - Hash functions (SHA-256, SHA-256d, RIPEMD-160, Hash160, HMAC-SHA256)
//! - [`chainhash::Hash`], the 32-byte identifier of transactions and blocks
//! - Variable-length integers and cursor-style binary reader/writer
//! - secp256k1 keys, ECDSA signatures and BRC-42 child key derivation

pub mod hash;
pub mod chainhash;
pub mod util;
pub mod ec;

mod error;
pub use error::PrimitivesError;
