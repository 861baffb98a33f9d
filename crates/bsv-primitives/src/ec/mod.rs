//! secp256k1 keys and ECDSA signatures, including BRC-42 child derivation.

pub mod private_key;
pub mod public_key;
pub mod signature;

pub use private_key::PrivateKey;
pub use public_key::PublicKey;
pub use signature::Signature;
