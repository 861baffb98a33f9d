//! Accepting incoming BRC-29 payments into the change basket.

use bsv_primitives::chainhash::Hash;
use bsv_primitives::ec::PublicKey;
use bsv_spv::{Beef, Broadcaster};
use bsv_transaction::Outpoint;
use bsv_wallet::template::Brc29Params;
use bsv_wallet::{Counterparty, KeyMaterialProvider, ScriptTemplate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::engine::WalletEngine;
use crate::error::ActionError;
use crate::store::{ChangeOutput, ChangeStore};

/// Derivation data the sender of a BRC-29 payment shares with us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRemittance {
    pub derivation_prefix: String,
    pub derivation_suffix: String,
    pub sender_identity_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalizeOutput {
    pub output_index: u32,
    pub payment_remittance: PaymentRemittance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalizeOutcome {
    pub txid: Hash,
    /// Outputs added to the change basket by this call.
    pub accepted: Vec<Outpoint>,
    /// Outputs the wallet already had.
    pub known: Vec<Outpoint>,
}

impl<K, S, B> WalletEngine<K, S, B>
where
    K: KeyMaterialProvider,
    S: ChangeStore,
    B: Broadcaster,
{
    /// Take ownership of payment outputs of the transaction an Atomic BEEF
    /// proves. Each output must lock to the key derived from its remittance.
    #[instrument(skip_all, fields(outputs = outputs.len(), description = %description))]
    pub async fn internalize_payment(
        &self,
        beef: Beef,
        outputs: Vec<InternalizeOutput>,
        description: &str,
    ) -> Result<InternalizeOutcome, ActionError> {
        let txid = beef
            .atomic_txid
            .ok_or_else(|| ActionError::Validation("payment BEEF must be atomic".into()))?;
        if outputs.is_empty() {
            return Err(ActionError::Validation("no outputs to internalize".into()));
        }
        if !beef.is_valid(false) {
            return Err(ActionError::Ancestry(format!("BEEF for {} does not prove it", txid)));
        }
        let tx = beef.find_atomic_transaction(&txid)?;

        let mut outcome = InternalizeOutcome { txid, accepted: Vec::new(), known: Vec::new() };
        let mut records = Vec::with_capacity(outputs.len());
        for output in outputs {
            let outpoint = Outpoint::new(txid, output.output_index);
            let tx_output = tx.outputs.get(output.output_index as usize).ok_or_else(|| {
                ActionError::Validation(format!("{} has no output {}", txid, output.output_index))
            })?;

            let remittance = output.payment_remittance;
            let template = ScriptTemplate::Brc29(Brc29Params::new(
                remittance.derivation_prefix,
                remittance.derivation_suffix,
            ));
            let counterparty = Counterparty::Other(remittance.sender_identity_key);
            let expected = template
                .unlock(&self.keys, &counterparty, tx_output.satoshis)?
                .public_key()
                .hash160();
            if tx_output.locking_script.public_key_hash()? != expected {
                return Err(ActionError::Validation(format!(
                    "output {} does not pay the key derived from its remittance",
                    outpoint
                )));
            }

            let duplicate = records.iter().any(|r: &ChangeOutput| r.outpoint == outpoint);
            if duplicate || self.store.find_output(&outpoint).await?.is_some() {
                outcome.known.push(outpoint);
                continue;
            }
            records.push(ChangeOutput::new(
                outpoint,
                tx_output.satoshis,
                tx_output.locking_script.clone(),
                self.config.change_basket.clone(),
                template,
                counterparty,
                beef.clone(),
            ));
            outcome.accepted.push(outpoint);
        }

        self.store.insert_outputs(records).await?;
        info!(%txid, accepted = outcome.accepted.len(), known = outcome.known.len(), "payment internalized");
        Ok(outcome)
    }
}
