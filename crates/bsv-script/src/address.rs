//! Base58Check P2PKH addresses for mainnet and testnet.

use std::fmt;
use std::str::FromStr;

use bsv_primitives::ec::PublicKey;
use bsv_primitives::hash::sha256d;
use serde::{Deserialize, Serialize};

use crate::{Script, ScriptError};

const MAINNET_P2PKH: u8 = 0x00;
const TESTNET_P2PKH: u8 = 0x6f;

/// Network an address (and an engine) targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    fn version_byte(self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_P2PKH,
            Network::Testnet => TESTNET_P2PKH,
        }
    }
}

/// A P2PKH address: a public key hash plus the network it is encoded for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub public_key_hash: [u8; 20],
    pub network: Network,
}

impl Address {
    pub fn from_public_key_hash(hash: &[u8; 20], network: Network) -> Self {
        Address { public_key_hash: *hash, network }
    }

    pub fn from_public_key(key: &PublicKey, network: Network) -> Self {
        Self::from_public_key_hash(&key.hash160(), network)
    }

    /// Locking script paying to this address.
    pub fn locking_script(&self) -> Script {
        Script::p2pkh(&self.public_key_hash)
    }

    fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(25);
        payload.push(self.network.version_byte());
        payload.extend_from_slice(&self.public_key_hash);
        let checksum = sha256d(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload).into_string()
    }
}

impl FromStr for Address {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| ScriptError::InvalidAddress(format!("{}: {}", s, e)))?;
        if decoded.len() != 25 {
            return Err(ScriptError::InvalidAddress(format!("{}: bad length", s)));
        }
        if sha256d(&decoded[..21])[..4] != decoded[21..] {
            return Err(ScriptError::EncodingChecksumFailed);
        }
        let network = match decoded[0] {
            MAINNET_P2PKH => Network::Mainnet,
            TESTNET_P2PKH => Network::Testnet,
            v => return Err(ScriptError::InvalidAddress(format!("{}: version {:#04x}", s, v))),
        };
        let mut public_key_hash = [0u8; 20];
        public_key_hash.copy_from_slice(&decoded[1..21]);
        Ok(Address { public_key_hash, network })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
