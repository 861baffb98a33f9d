//! Turning an [`Action`] into a funded transaction.

use std::collections::{HashSet, VecDeque};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bsv_primitives::util::VarInt;
use bsv_script::Script;
use bsv_spv::{Beef, BeefTx, Broadcaster};
use bsv_transaction::{Outpoint, Transaction, TransactionInput, TransactionOutput};
use bsv_wallet::template::Brc29Params;
use bsv_wallet::{Counterparty, KeyMaterialProvider, ScriptTemplate};
use rand::seq::SliceRandom;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::action::{
    Action, ActionInput, AwaitingInputs, BuildOutcome, SignableTransaction, MAX_SATOSHIS,
};
use crate::config::InputSelection;
use crate::engine::{lock, AwaitingSignature, SignableState, WalletEngine};
use crate::error::ActionError;
use crate::store::{ChangeOutput, ChangeStore, OutputStatus};

/// An input the engine signs itself.
#[derive(Debug, Clone)]
pub(crate) struct InternalInput {
    pub index: usize,
    pub template: ScriptTemplate,
    pub counterparty: Counterparty,
    pub satoshis: u64,
}

/// A change output of the transaction being built.
#[derive(Debug, Clone)]
pub(crate) struct NewChange {
    pub vout: u32,
    pub template: ScriptTemplate,
}

/// Everything needed to finish a laid-out transaction.
#[derive(Debug, Clone)]
pub(crate) struct PendingTx {
    pub reference: String,
    pub transaction: Transaction,
    pub internal: Vec<InternalInput>,
    /// Store-owned inputs reserved under `reference`.
    pub reserved: Vec<Outpoint>,
    pub change: Vec<NewChange>,
    /// Ancestry of every input.
    pub evidence: Beef,
    pub no_send: bool,
    pub send_with: Vec<bsv_primitives::chainhash::Hash>,
    pub accept_delayed_broadcast: bool,
}

struct ExplicitInput {
    input: ActionInput,
    source: TransactionOutput,
    owned: Option<ChangeOutput>,
}

struct FundingPlan {
    selected: Vec<ChangeOutput>,
    change: Option<u64>,
}

/// Serialized size of a transaction with the given unlocking script and
/// locking script lengths.
pub fn estimate_size(unlock_lengths: &[usize], script_lengths: &[usize]) -> usize {
    let inputs: usize = unlock_lengths
        .iter()
        .map(|&len| 36 + VarInt::from(len).length() + len + 4)
        .sum();
    let outputs: usize = script_lengths
        .iter()
        .map(|&len| 8 + VarInt::from(len).length() + len)
        .sum();
    4 + VarInt::from(unlock_lengths.len()).length()
        + inputs
        + VarInt::from(script_lengths.len()).length()
        + outputs
        + 4
}

fn new_reference() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// A BRC-29 template to ourselves with fresh nonces.
fn new_change_template() -> ScriptTemplate {
    ScriptTemplate::Brc29(Brc29Params::new(
        BASE64.encode(rand::random::<[u8; 8]>()),
        BASE64.encode(rand::random::<[u8; 8]>()),
    ))
}

fn validate(action: &Action) -> Result<(), ActionError> {
    let mut total: u64 = 0;
    for (i, output) in action.outputs.iter().enumerate() {
        if output.satoshis > MAX_SATOSHIS {
            return Err(ActionError::Validation(format!(
                "output {} exceeds the maximum of {} satoshis",
                i, MAX_SATOSHIS
            )));
        }
        total = total
            .checked_add(output.satoshis)
            .filter(|t| *t <= MAX_SATOSHIS)
            .ok_or_else(|| ActionError::Validation("outputs exceed the satoshi supply".into()))?;
        if output.locking_script.is_empty() {
            return Err(ActionError::Validation(format!("output {} has an empty locking script", i)));
        }
    }

    let mut seen = HashSet::new();
    let outpoints = action
        .inputs
        .iter()
        .map(|i| &i.outpoint)
        .chain(action.options.no_send_change.iter());
    for outpoint in outpoints {
        if !seen.insert(*outpoint) {
            return Err(ActionError::Validation(format!("outpoint {} is spent twice", outpoint)));
        }
    }
    for (i, input) in action.inputs.iter().enumerate() {
        if input.unlocking_script.is_none() && input.unlocking_script_length.is_none() {
            return Err(ActionError::Validation(format!(
                "input {} needs an unlocking script or its length",
                i
            )));
        }
    }

    if action.options.no_send && !action.options.send_with.is_empty() {
        return Err(ActionError::Validation("send_with cannot be combined with no_send".into()));
    }
    if action.inputs.is_empty() && action.outputs.is_empty() && action.options.send_with.is_empty() {
        return Err(ActionError::Validation(
            "action has no inputs, outputs or transactions to send".into(),
        ));
    }
    Ok(())
}

/// Take the next pool output under `policy` for a shortfall of `missing`.
fn pick(pool: &mut Vec<ChangeOutput>, missing: u64, policy: InputSelection) -> Option<ChangeOutput> {
    if pool.is_empty() {
        return None;
    }
    let index = match policy {
        InputSelection::OldestFirst => 0,
        InputSelection::SmallestSufficient => pool
            .iter()
            .enumerate()
            .filter(|(_, o)| o.satoshis >= missing)
            .min_by_key(|(_, o)| o.satoshis)
            .or_else(|| pool.iter().enumerate().max_by_key(|(_, o)| o.satoshis))
            .map(|(i, _)| i)?,
    };
    Some(pool.remove(index))
}

impl<K, S, B> WalletEngine<K, S, B>
where
    K: KeyMaterialProvider,
    S: ChangeStore,
    B: Broadcaster,
{
    /// Build, fund and (unless inputs await external signatures) sign and
    /// send `action`.
    #[instrument(skip_all, fields(description = %action.description))]
    pub async fn build(&self, action: Action) -> Result<BuildOutcome, ActionError> {
        validate(&action)?;

        if action.inputs.is_empty() && action.outputs.is_empty() {
            let results = self.send_batch(&action.options.send_with).await;
            return Ok(BuildOutcome::Batch(results));
        }

        let mut evidence = Beef::new();
        if let Some(beef) = &action.input_beef {
            evidence.merge_beef(beef)?;
        }
        let explicit = self.resolve_explicit_inputs(&action).await?;

        let change_template = new_change_template();
        let change_script = change_template.lock(&self.keys, &Counterparty::Self_)?;

        let reference = new_reference();
        let (plan, reserved) = {
            let _selection = self.selection.lock().await;
            let plan = self.plan_funding(&action, &explicit, change_script.len()).await?;
            let reserved: Vec<Outpoint> = explicit
                .iter()
                .filter_map(|e| e.owned.as_ref().map(|o| o.outpoint))
                .chain(plan.selected.iter().map(|o| o.outpoint))
                .collect();
            lock(&self.live_reservations).insert(reference.clone());
            if let Err(e) = self.store.reserve(&reserved, &reference).await {
                lock(&self.live_reservations).remove(&reference);
                return Err(e.into());
            }
            (plan, reserved)
        };
        debug!(
            reference = %reference,
            selected = plan.selected.len(),
            change = ?plan.change,
            "funded action"
        );

        let (pending, awaiting) = self.assemble(
            &action,
            explicit,
            plan,
            (change_template, change_script),
            reference.clone(),
            reserved,
            evidence,
        );

        if awaiting.is_empty() {
            return Ok(BuildOutcome::Finalized(self.complete(pending).await?));
        }

        let unsigned_txid = pending.transaction.tx_id();
        let mut beef = pending.evidence.clone();
        beef.merge_transaction(pending.transaction.clone());
        let beef = match beef.to_atomic(&unsigned_txid) {
            Ok(beef) => beef,
            Err(e) => {
                self.release_reservation(&reference, &pending.reserved).await;
                return Err(e.into());
            }
        };

        let expires_at = Instant::now() + self.config.signable_ttl();
        lock(&self.signables).insert(
            reference.clone(),
            SignableState::AwaitingSignature(Box::new(AwaitingSignature {
                pending,
                awaiting: awaiting.clone(),
                expires_at,
            })),
        );
        info!(reference = %reference, awaiting = awaiting.len(), "action awaits signatures");
        Ok(BuildOutcome::Signable(SignableTransaction { reference, beef, awaiting }))
    }

    /// Source output of every explicit input, from the supplied evidence or
    /// else from the wallet's own records.
    async fn resolve_explicit_inputs(&self, action: &Action) -> Result<Vec<ExplicitInput>, ActionError> {
        let mut resolved = Vec::with_capacity(action.inputs.len());
        for input in &action.inputs {
            let outpoint = input.outpoint;
            let owned = self.store.find_output(&outpoint).await?;
            let from_beef = action
                .input_beef
                .as_ref()
                .and_then(|beef| beef.find_transaction(&outpoint.txid).ok())
                .and_then(BeefTx::transaction)
                .and_then(|tx| tx.outputs.get(outpoint.vout as usize))
                .cloned();
            let source = match (from_beef, &owned) {
                (Some(source), _) => source,
                (None, Some(change)) => change.source_output(),
                (None, None) => {
                    return Err(ActionError::Ancestry(format!(
                        "no evidence carries the output spent by {}",
                        outpoint
                    )))
                }
            };
            if source.satoshis > MAX_SATOSHIS {
                return Err(ActionError::Validation(format!(
                    "output spent by {} exceeds the maximum of {} satoshis",
                    outpoint, MAX_SATOSHIS
                )));
            }
            resolved.push(ExplicitInput { input: input.clone(), source, owned });
        }
        Ok(resolved)
    }

    /// Choose change to cover outputs and fee. Runs under the selection lock.
    async fn plan_funding(
        &self,
        action: &Action,
        explicit: &[ExplicitInput],
        change_script_len: usize,
    ) -> Result<FundingPlan, ActionError> {
        let mut forwarded = VecDeque::with_capacity(action.options.no_send_change.len());
        for outpoint in &action.options.no_send_change {
            let output = self.store.find_output(outpoint).await?.ok_or_else(|| {
                ActionError::Validation(format!("forwarded change {} is not in the wallet", outpoint))
            })?;
            if !output.is_available() {
                return Err(ActionError::Validation(format!(
                    "forwarded change {} is not available",
                    outpoint
                )));
            }
            forwarded.push_back(output);
        }

        let explicit_outpoints: HashSet<Outpoint> = explicit.iter().map(|e| e.input.outpoint).collect();
        let mut pool: Vec<ChangeOutput> = self
            .store
            .list_outputs(&self.config.change_basket)
            .await?
            .into_iter()
            .filter(|o| {
                o.status == OutputStatus::Spendable
                    && o.reserved_by.is_none()
                    && !explicit_outpoints.contains(&o.outpoint)
                    && !action.options.no_send_change.contains(&o.outpoint)
            })
            .collect();

        let outputs_total: u64 = action.outputs.iter().map(|o| o.satoshis).sum();
        let script_lengths: Vec<usize> = action.outputs.iter().map(|o| o.locking_script.len()).collect();
        let mut with_change = script_lengths.clone();
        with_change.push(change_script_len);

        let mut unlock_lengths: Vec<usize> = explicit.iter().map(|e| e.input.unlock_length()).collect();
        let mut total_in = explicit
            .iter()
            .try_fold(0u64, |total, e| total.checked_add(e.source.satoshis))
            .ok_or_else(|| ActionError::Validation("inputs exceed the satoshi supply".into()))?;
        let mut selected = Vec::new();

        loop {
            let fee = self.config.fee_for_size(estimate_size(&unlock_lengths, &script_lengths));
            let required = outputs_total + fee;
            if total_in >= required && !unlock_lengths.is_empty() {
                let fee_with_change =
                    self.config.fee_for_size(estimate_size(&unlock_lengths, &with_change));
                let change = total_in
                    .checked_sub(outputs_total + fee_with_change)
                    .filter(|c| *c >= self.config.change_dust_limit);
                return Ok(FundingPlan { selected, change });
            }

            let missing = required.saturating_sub(total_in).max(1);
            let next = forwarded
                .pop_front()
                .or_else(|| pick(&mut pool, missing, self.config.input_selection));
            match next {
                Some(output) => {
                    total_in = total_in.checked_add(output.satoshis).ok_or_else(|| {
                        ActionError::Validation("inputs exceed the satoshi supply".into())
                    })?;
                    unlock_lengths.push(output.template.estimated_unlock_length());
                    selected.push(output);
                }
                None => return Err(ActionError::Funding { required, available: total_in }),
            }
        }
    }

    /// Lay out inputs and outputs. Returns the pending transaction and the
    /// inputs left for the caller to sign.
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        action: &Action,
        explicit: Vec<ExplicitInput>,
        plan: FundingPlan,
        (change_template, change_script): (ScriptTemplate, Script),
        reference: String,
        reserved: Vec<Outpoint>,
        mut evidence: Beef,
    ) -> (PendingTx, AwaitingInputs) {
        let mut tx = Transaction::new();
        tx.version = action.version;
        tx.lock_time = action.lock_time;

        let mut awaiting = AwaitingInputs::new();
        for e in explicit {
            let index = tx.inputs.len();
            let mut input = TransactionInput::with_source(e.input.outpoint, e.source);
            input.sequence_number = e.input.sequence_number;
            if e.input.awaits_signature() {
                awaiting.insert(index as u32, e.input.unlock_length());
            }
            input.unlocking_script = e.input.unlocking_script;
            if let Some(owned) = e.owned {
                if let Err(err) = evidence.merge_beef(&owned.evidence) {
                    debug!(outpoint = %owned.outpoint, error = %err, "input evidence did not merge");
                }
            }
            tx.add_input(input);
        }

        let mut internal = Vec::with_capacity(plan.selected.len());
        for output in plan.selected {
            if let Err(e) = evidence.merge_beef(&output.evidence) {
                debug!(outpoint = %output.outpoint, error = %e, "change evidence did not merge");
            }
            internal.push(InternalInput {
                index: tx.inputs.len(),
                template: output.template,
                counterparty: output.counterparty,
                satoshis: output.satoshis,
            });
            tx.add_input(TransactionInput::with_source(
                output.outpoint,
                TransactionOutput::new(output.satoshis, output.locking_script),
            ));
        }

        let mut outputs: Vec<(TransactionOutput, Option<ScriptTemplate>)> = action
            .outputs
            .iter()
            .map(|o| (TransactionOutput::new(o.satoshis, o.locking_script.clone()), None))
            .collect();
        if let Some(satoshis) = plan.change {
            outputs.push((TransactionOutput::new(satoshis, change_script), Some(change_template)));
        }
        let randomize = action.options.randomize_outputs.unwrap_or(self.config.randomize_outputs);
        if randomize {
            outputs.shuffle(&mut rand::thread_rng());
        }

        let mut change = Vec::new();
        for (output, template) in outputs {
            if let Some(template) = template {
                change.push(NewChange { vout: tx.outputs.len() as u32, template });
            }
            tx.add_output(output);
        }

        let pending = PendingTx {
            reference,
            transaction: tx,
            internal,
            reserved,
            change,
            evidence,
            no_send: action.options.no_send,
            send_with: action.options.send_with.clone(),
            accept_delayed_broadcast: action
                .options
                .accept_delayed_broadcast
                .unwrap_or(self.config.accept_delayed_broadcast),
        };
        (pending, awaiting)
    }
}
