//! Locking and unlocking script templates.
//!
//! [`ScriptTemplate`] is the closed set of output kinds the engine can lock
//! and spend. Templates are pure: every nonce and key comes from the caller.

pub mod brc29;
pub mod pushdrop;

use bsv_primitives::ec::{PrivateKey, PublicKey, Signature};
use bsv_script::Script;
use bsv_transaction::sighash::{signature_hash, SIGHASH_ALL_FORKID};
use bsv_transaction::template::p2pkh::UNLOCK_ESTIMATE as P2PKH_UNLOCK_ESTIMATE;
use bsv_transaction::template::UnlockingScriptTemplate;
use bsv_transaction::{Transaction, TransactionError};
use serde::{Deserialize, Serialize};

pub use brc29::{brc29_protocol, Brc29Params, BRC29_PROTOCOL_NAME};
pub use pushdrop::{decode as decode_pushdrop, LockPosition, PushDropToken, ScriptTemplateParams};

use crate::key_deriver::KeyMaterialProvider;
use crate::types::{anyone_key, Counterparty};
use crate::WalletError;

/// An output kind the engine knows how to lock and spend.
///
/// Serializes with a `type` tag, so a BRC-29 template doubles as the custom
/// instructions stored beside the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScriptTemplate {
    #[serde(rename = "P2PKH")]
    P2pkh,
    #[serde(rename = "BRC29")]
    Brc29(Brc29Params),
    PushDrop(ScriptTemplateParams),
}

impl ScriptTemplate {
    /// Locking script paying `destination`.
    ///
    /// P2PKH pays the destination's key directly and BRC-29 pays its child
    /// key. PushDrop takes its counterparty from its parameters and ignores
    /// `destination`.
    pub fn lock<K: KeyMaterialProvider + ?Sized>(
        &self,
        keys: &K,
        destination: &Counterparty,
    ) -> Result<Script, WalletError> {
        match self {
            ScriptTemplate::P2pkh => {
                let key = match destination {
                    Counterparty::Self_ => keys.identity_key(),
                    Counterparty::Anyone => anyone_key()?.1,
                    Counterparty::Other(key) => key.clone(),
                };
                Ok(Script::p2pkh(&key.hash160()))
            }
            ScriptTemplate::Brc29(params) => {
                let key =
                    keys.derive_public_key(&brc29_protocol(), &params.key_id(), destination, false)?;
                Ok(Script::p2pkh(&key.hash160()))
            }
            ScriptTemplate::PushDrop(params) => pushdrop::lock(keys, params),
        }
    }

    /// Signer for an input spending an output this template locked.
    ///
    /// `counterparty` is whoever locked a BRC-29 output; `satoshis` is the
    /// value of the output being spent.
    pub fn unlock<K: KeyMaterialProvider + ?Sized>(
        &self,
        keys: &K,
        counterparty: &Counterparty,
        satoshis: u64,
    ) -> Result<UnlockGenerator, WalletError> {
        let (private_key, shape) = match self {
            ScriptTemplate::P2pkh => (keys.identity_private_key(), UnlockShape::PublicKeyHash),
            ScriptTemplate::Brc29(params) => (
                keys.derive_private_key(&brc29_protocol(), &params.key_id(), counterparty)?,
                UnlockShape::PublicKeyHash,
            ),
            ScriptTemplate::PushDrop(params) => (
                keys.derive_private_key(&params.protocol, &params.key_id, &params.counterparty)?,
                UnlockShape::SignatureOnly,
            ),
        };
        Ok(UnlockGenerator { private_key, shape, satoshis, sighash_flag: SIGHASH_ALL_FORKID })
    }

    pub fn estimated_unlock_length(&self) -> usize {
        match self {
            ScriptTemplate::P2pkh | ScriptTemplate::Brc29(_) => P2PKH_UNLOCK_ESTIMATE,
            ScriptTemplate::PushDrop(_) => pushdrop::UNLOCK_ESTIMATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockShape {
    /// `<sig> <pubkey>`
    PublicKeyHash,
    /// `<sig>`
    SignatureOnly,
}

/// Produces the unlocking script for one input once the transaction is laid
/// out.
#[derive(Debug, Clone)]
pub struct UnlockGenerator {
    private_key: PrivateKey,
    shape: UnlockShape,
    satoshis: u64,
    sighash_flag: u32,
}

impl UnlockGenerator {
    pub fn estimated_length(&self) -> usize {
        match self.shape {
            UnlockShape::PublicKeyHash => P2PKH_UNLOCK_ESTIMATE,
            UnlockShape::SignatureOnly => pushdrop::UNLOCK_ESTIMATE,
        }
    }

    pub fn compute_unlocking_script(
        &self,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Script, WalletError> {
        Ok(self.sign(tx, input_index)?)
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.pub_key()
    }

    /// Sighash of the input. The source output attached to the input wins;
    /// without one a P2PKH-shaped spend rebuilds its own locking script.
    fn sighash(&self, tx: &Transaction, input_index: usize) -> Result<[u8; 32], TransactionError> {
        let input = tx.inputs.get(input_index).ok_or_else(|| {
            TransactionError::SigningError(format!("input {} out of range", input_index))
        })?;
        let satoshis = input.source_satoshis().unwrap_or(self.satoshis);
        let script = match (input.source_locking_script(), self.shape) {
            (Some(script), _) => script.clone(),
            (None, UnlockShape::PublicKeyHash) => Script::p2pkh(&self.public_key().hash160()),
            (None, UnlockShape::SignatureOnly) => {
                return Err(TransactionError::SigningError(format!(
                    "input {} has no source locking script",
                    input_index
                )))
            }
        };
        signature_hash(tx, input_index, script.to_bytes(), self.sighash_flag, satoshis)
    }
}

impl UnlockingScriptTemplate for UnlockGenerator {
    fn sign(&self, tx: &Transaction, input_index: usize) -> Result<Script, TransactionError> {
        let hash = self.sighash(tx, input_index)?;
        let mut signature = self.private_key.sign(&hash)?.to_der();
        signature.push(self.sighash_flag as u8);

        let mut script = Script::new();
        script.append_push_data(&signature)?;
        if self.shape == UnlockShape::PublicKeyHash {
            script.append_push_data(&self.public_key().to_compressed())?;
        }
        Ok(script)
    }

    fn estimate_length(&self) -> usize {
        self.estimated_length()
    }
}

/// Check `unlocking` against a P2PKH-shaped or PushDrop `locking` script for
/// input `input_index` of `tx`, spending `satoshis`.
///
/// A well-formed spend by the wrong key is `Ok(false)`; a locking script of
/// neither shape is an error.
pub fn verify(
    locking: &Script,
    unlocking: &Script,
    tx: &Transaction,
    input_index: usize,
    satoshis: u64,
) -> Result<bool, WalletError> {
    let pushes: Option<Vec<Vec<u8>>> = unlocking.chunks()?.iter().map(|c| c.pushed_value()).collect();
    let Some(pushes) = pushes else {
        return Ok(false);
    };

    let (signature, public_key) = if locking.is_p2pkh() {
        let [signature, key] = pushes.as_slice() else {
            return Ok(false);
        };
        let Ok(key) = PublicKey::from_bytes(key) else {
            return Ok(false);
        };
        if key.hash160() != locking.public_key_hash()? {
            return Ok(false);
        }
        (signature, key)
    } else {
        let token = pushdrop::decode(locking)?;
        let [signature] = pushes.as_slice() else {
            return Ok(false);
        };
        (signature, token.locking_public_key)
    };

    let Some((&flag, der)) = signature.split_last() else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_der(der) else {
        return Ok(false);
    };
    let hash = signature_hash(tx, input_index, locking.to_bytes(), flag as u32, satoshis)?;
    Ok(public_key.verify(&hash, &signature))
}
