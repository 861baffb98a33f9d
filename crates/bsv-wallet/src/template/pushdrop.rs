//! PushDrop: data fields riding on a single-key `OP_CHECKSIG` output.

use bsv_primitives::ec::PublicKey;
use bsv_primitives::hash::sha256;
use bsv_script::opcodes::{OP_2DROP, OP_CHECKSIG, OP_DROP};
use bsv_script::{Script, ScriptChunk};
use serde::{Deserialize, Serialize};

use crate::key_deriver::KeyMaterialProvider;
use crate::types::{Counterparty, Protocol};
use crate::WalletError;

/// Upper bound on `<DER sig || sighash byte>` pushed alone.
pub const UNLOCK_ESTIMATE: usize = 73;

/// Where `<pubkey> OP_CHECKSIG` sits relative to the fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPosition {
    #[default]
    Before,
    After,
}

/// Parameters of a PushDrop output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTemplateParams {
    pub protocol: Protocol,
    pub key_id: String,
    pub counterparty: Counterparty,
    pub lock_position: LockPosition,
    pub include_signature: bool,
    /// Opaque to everything but the holder of the token.
    pub fields: Vec<Vec<u8>>,
}

/// What [`decode`] recovers from a locking script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDropToken {
    pub locking_public_key: PublicKey,
    pub lock_position: LockPosition,
    /// Includes the trailing signature field when one was embedded.
    pub fields: Vec<Vec<u8>>,
}

pub(crate) fn lock<K: KeyMaterialProvider + ?Sized>(
    keys: &K,
    params: &ScriptTemplateParams,
) -> Result<Script, WalletError> {
    let for_self = params.counterparty.is_self();
    let public_key =
        keys.derive_public_key(&params.protocol, &params.key_id, &params.counterparty, for_self)?;

    let mut fields = params.fields.clone();
    if params.include_signature {
        let signer = keys.derive_private_key(&params.protocol, &params.key_id, &params.counterparty)?;
        let signature = signer.sign(&sha256(&params.fields.concat()))?;
        fields.push(signature.to_der());
    }

    let mut script = Script::new();
    if params.lock_position == LockPosition::Before {
        script.append_push_data(&public_key.to_compressed())?;
        script.append_opcodes(&[OP_CHECKSIG])?;
    }
    for field in &fields {
        script.append_minimal_push(field)?;
    }
    script.append_opcodes(&drop_ops(fields.len()))?;
    if params.lock_position == LockPosition::After {
        script.append_push_data(&public_key.to_compressed())?;
        script.append_opcodes(&[OP_CHECKSIG])?;
    }
    Ok(script)
}

/// `OP_2DROP` per pair of fields, then `OP_DROP` for an odd one out.
fn drop_ops(n_fields: usize) -> Vec<u8> {
    let mut ops = vec![OP_2DROP; n_fields / 2];
    if n_fields % 2 == 1 {
        ops.push(OP_DROP);
    }
    ops
}

fn unrecognized(reason: impl Into<String>) -> WalletError {
    WalletError::UnrecognizedScript { template: "PushDrop", reason: reason.into() }
}

fn key_of(chunk: &ScriptChunk) -> Result<PublicKey, WalletError> {
    match &chunk.data {
        Some(data) => PublicKey::from_bytes(data).map_err(|e| unrecognized(e.to_string())),
        None => Err(unrecognized("expected a public key push")),
    }
}

/// Recover the locking key and the field sequence of a PushDrop script.
pub fn decode(script: &Script) -> Result<PushDropToken, WalletError> {
    let chunks = script.chunks()?;
    if chunks.len() < 2 {
        return Err(unrecognized("too short"));
    }

    let (lock_position, locking_public_key, body) = if chunks[1].op == OP_CHECKSIG {
        (LockPosition::Before, key_of(&chunks[0])?, &chunks[2..])
    } else if chunks[chunks.len() - 1].op == OP_CHECKSIG {
        let n = chunks.len();
        (LockPosition::After, key_of(&chunks[n - 2])?, &chunks[..n - 2])
    } else {
        return Err(unrecognized("no OP_CHECKSIG next to a key"));
    };

    let fields: Vec<Vec<u8>> = body.iter().map_while(ScriptChunk::pushed_value).collect();
    let drops: Vec<u8> = body[fields.len()..].iter().map(|c| c.op).collect();
    if drops != drop_ops(fields.len()) {
        return Err(unrecognized(format!(
            "{} fields followed by {} non-push opcodes",
            fields.len(),
            drops.len()
        )));
    }

    Ok(PushDropToken { locking_public_key, lock_position, fields })
}
