//! BRC-42/43 key derivation.
//!
//! Invoice numbers are `"{security level}-{protocol name}-{key id}"`; the
//! child key is the root key tweaked by an HMAC of the ECDH shared secret
//! with the counterparty over that invoice.

use std::sync::LazyLock;

use regex::Regex;

use bsv_primitives::ec::{PrivateKey, PublicKey};

use crate::error::WalletError;
use crate::types::{anyone_key, Counterparty, Protocol};

static RE_ONLY_LETTERS_NUMBERS_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9 ]+$").expect("pattern is a valid regex"));

/// Source of the key material script templates sign and lock with.
///
/// Implementations must not cache derived keys beyond a single call.
pub trait KeyMaterialProvider: Send + Sync {
    fn identity_key(&self) -> PublicKey;

    fn identity_private_key(&self) -> PrivateKey;

    fn derive_private_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<PrivateKey, WalletError>;

    /// With `for_self` the key is the one matching our own derived private
    /// key; otherwise it is the counterparty's child key.
    fn derive_public_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
        for_self: bool,
    ) -> Result<PublicKey, WalletError>;
}

/// Derives child keys from one root private key.
#[derive(Clone, Debug)]
pub struct KeyDeriver {
    root_key: PrivateKey,
}

impl KeyDeriver {
    pub fn new(root_key: PrivateKey) -> Self {
        KeyDeriver { root_key }
    }

    /// Deriver rooted at the publicly known "anyone" key.
    pub fn anyone() -> Result<Self, WalletError> {
        Ok(KeyDeriver { root_key: anyone_key()?.0 })
    }

    pub fn identity_key_hex(&self) -> String {
        self.root_key.pub_key().to_hex()
    }

    fn normalize_counterparty(&self, counterparty: &Counterparty) -> Result<PublicKey, WalletError> {
        match counterparty {
            Counterparty::Self_ => Ok(self.root_key.pub_key()),
            Counterparty::Anyone => Ok(anyone_key()?.1),
            Counterparty::Other(key) => Ok(key.clone()),
        }
    }
}

impl KeyMaterialProvider for KeyDeriver {
    fn identity_key(&self) -> PublicKey {
        self.root_key.pub_key()
    }

    fn identity_private_key(&self) -> PrivateKey {
        self.root_key.clone()
    }

    fn derive_private_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
    ) -> Result<PrivateKey, WalletError> {
        let counterparty_key = self.normalize_counterparty(counterparty)?;
        let invoice_number = invoice_number(protocol, key_id)?;
        Ok(self.root_key.derive_child(&counterparty_key, &invoice_number)?)
    }

    fn derive_public_key(
        &self,
        protocol: &Protocol,
        key_id: &str,
        counterparty: &Counterparty,
        for_self: bool,
    ) -> Result<PublicKey, WalletError> {
        let counterparty_key = self.normalize_counterparty(counterparty)?;
        let invoice_number = invoice_number(protocol, key_id)?;

        if for_self {
            Ok(self.root_key.derive_child(&counterparty_key, &invoice_number)?.pub_key())
        } else {
            Ok(counterparty_key.derive_child(&self.root_key, &invoice_number)?)
        }
    }
}

/// Validate `protocol` and `key_id` and join them into a BRC-43 invoice
/// number.
pub fn invoice_number(protocol: &Protocol, key_id: &str) -> Result<String, WalletError> {
    if !(0..=2).contains(&protocol.security_level) {
        return Err(WalletError::InvalidProtocol(
            "protocol security level must be 0, 1, or 2".into(),
        ));
    }

    if key_id.is_empty() {
        return Err(WalletError::InvalidKeyId("key IDs must be 1 character or more".into()));
    }
    if key_id.len() > 800 {
        return Err(WalletError::InvalidKeyId("key IDs must be 800 characters or less".into()));
    }

    let name = protocol.protocol.trim().to_lowercase();
    if name.len() < 5 {
        return Err(WalletError::InvalidProtocol(
            "protocol names must be 5 characters or more".into(),
        ));
    }
    if name.len() > 400 {
        return Err(WalletError::InvalidProtocol(
            "protocol names must be 400 characters or less".into(),
        ));
    }
    if name.contains("  ") {
        return Err(WalletError::InvalidProtocol(
            "protocol names cannot contain multiple consecutive spaces".into(),
        ));
    }
    if !RE_ONLY_LETTERS_NUMBERS_SPACES.is_match(&name) {
        return Err(WalletError::InvalidProtocol(
            "protocol names can only contain letters, numbers and spaces".into(),
        ));
    }
    if name.ends_with(" protocol") {
        return Err(WalletError::InvalidProtocol(
            "no need to end your protocol name with \" protocol\"".into(),
        ));
    }

    Ok(format!("{}-{}-{}", protocol.security_level, name, key_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_key(n: u8) -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        PrivateKey::from_bytes(&bytes).unwrap()
    }

    fn protocol() -> Protocol {
        Protocol::new(0, "testprotocol")
    }

    #[test]
    fn test_invoice_number() {
        assert_eq!(invoice_number(&protocol(), "12345").unwrap(), "0-testprotocol-12345");
        // Names are trimmed and lowercased.
        let shouty = Protocol::new(2, "  Wallet Payment ");
        assert_eq!(invoice_number(&shouty, "a b").unwrap(), "2-wallet payment-a b");
    }

    #[test]
    fn test_invoice_number_rejects() {
        let cases = [
            (Protocol::new(2, "test"), "long".to_string() + &"x".repeat(800), "long key ID"),
            (Protocol::new(2, "testing"), String::new(), "empty key ID"),
            (Protocol::new(-3, "otherwise valid"), "1".into(), "invalid security level"),
            (Protocol::new(3, "otherwise valid"), "1".into(), "security level too high"),
            (Protocol::new(2, "double  space"), "1".into(), "double space"),
            (Protocol::new(0, ""), "1".into(), "empty protocol"),
            (Protocol::new(0, "long".to_string() + &"x".repeat(400)), "1".into(), "long protocol"),
            (Protocol::new(2, "redundant protocol protocol"), "1".into(), "redundant suffix"),
            (Protocol::new(2, "üñî√é®sål ©0på"), "1".into(), "invalid chars"),
        ];
        for (protocol, key_id, label) in cases {
            assert!(invoice_number(&protocol, &key_id).is_err(), "should error for: {}", label);
        }
    }

    /// What A derives privately, B derives publicly, and vice versa.
    #[test]
    fn test_counterparties_agree() {
        let alice = KeyDeriver::new(scalar_key(42));
        let bob = KeyDeriver::new(scalar_key(69));
        let to_bob = Counterparty::Other(bob.identity_key());
        let to_alice = Counterparty::Other(alice.identity_key());

        let alice_child = alice.derive_private_key(&protocol(), "12345", &to_bob).unwrap();
        let seen_by_bob = bob.derive_public_key(&protocol(), "12345", &to_alice, false).unwrap();
        assert_eq!(alice_child.pub_key(), seen_by_bob);

        let alice_own = alice.derive_public_key(&protocol(), "12345", &to_bob, true).unwrap();
        assert_eq!(alice_own, alice_child.pub_key());
    }

    #[test]
    fn test_self_counterparty_matches_own_identity() {
        let kd = KeyDeriver::new(scalar_key(42));
        let by_self = kd.derive_private_key(&protocol(), "7", &Counterparty::Self_).unwrap();
        let by_key = kd
            .derive_private_key(&protocol(), "7", &Counterparty::Other(kd.identity_key()))
            .unwrap();
        assert_eq!(by_self.to_bytes(), by_key.to_bytes());

        let public = kd.derive_public_key(&protocol(), "7", &Counterparty::Self_, false).unwrap();
        assert_eq!(public, by_self.pub_key());
    }

    #[test]
    fn test_key_id_changes_child() {
        let kd = KeyDeriver::new(scalar_key(42));
        let a = kd.derive_private_key(&protocol(), "1", &Counterparty::Anyone).unwrap();
        let b = kd.derive_private_key(&protocol(), "2", &Counterparty::Anyone).unwrap();
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_anyone_deriver() {
        let kd = KeyDeriver::anyone().unwrap();
        assert_eq!(
            kd.identity_key_hex(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        assert_eq!(kd.identity_private_key().to_bytes(), scalar_key(1).to_bytes());
    }
}
