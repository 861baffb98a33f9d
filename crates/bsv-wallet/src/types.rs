//! Protocol identifiers and counterparty designations used in derivation.

use bsv_primitives::ec::{PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

use crate::WalletError;

/// Security level for wallet operations.
pub type SecurityLevel = i32;

/// Silent security level, no user prompts required.
pub const SECURITY_LEVEL_SILENT: SecurityLevel = 0;
/// Prompt the user once per application.
pub const SECURITY_LEVEL_EVERY_APP: SecurityLevel = 1;
/// Prompt the user per application and per counterparty combination.
pub const SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY: SecurityLevel = 2;

/// Protocol identifier: security level plus name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub security_level: SecurityLevel,
    pub protocol: String,
}

impl Protocol {
    pub fn new(security_level: SecurityLevel, protocol: impl Into<String>) -> Self {
        Protocol { security_level, protocol: protocol.into() }
    }
}

/// The other party of a derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counterparty {
    /// The wallet owner.
    #[serde(rename = "self")]
    Self_,
    /// The publicly known key with scalar 1.
    Anyone,
    /// A specific party identified by its identity key.
    Other(PublicKey),
}

impl Counterparty {
    pub fn is_self(&self) -> bool {
        matches!(self, Counterparty::Self_)
    }
}

/// The "anyone" key pair: private scalar 1, public key G.
pub fn anyone_key() -> Result<(PrivateKey, PublicKey), WalletError> {
    let mut scalar = [0u8; 32];
    scalar[31] = 1;
    let private_key = PrivateKey::from_bytes(&scalar)?;
    let public_key = private_key.pub_key();
    Ok((private_key, public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyone_key_is_generator() {
        let (_, public_key) = anyone_key().unwrap();
        assert_eq!(
            public_key.to_hex(),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[test]
    fn test_counterparty_serde() {
        assert_eq!(serde_json::to_string(&Counterparty::Self_).unwrap(), "\"self\"");
        assert_eq!(serde_json::to_string(&Counterparty::Anyone).unwrap(), "\"anyone\"");

        let (_, g) = anyone_key().unwrap();
        let other = Counterparty::Other(g.clone());
        let json = serde_json::to_string(&other).unwrap();
        assert_eq!(json, format!("{{\"other\":\"{}\"}}", g.to_hex()));
        assert_eq!(serde_json::from_str::<Counterparty>(&json).unwrap(), other);
    }

    #[test]
    fn test_protocol_json_shape() {
        let protocol = Protocol::new(SECURITY_LEVEL_EVERY_APP_AND_COUNTERPARTY, "3241645161d8");
        let json = serde_json::to_value(&protocol).unwrap();
        assert_eq!(json["security_level"], 2);
        assert_eq!(json["protocol"], "3241645161d8");
    }
}
