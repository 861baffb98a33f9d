//! Completing transactions: signing, evidence, spend bookkeeping and
//! broadcast, plus the signable reference state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bsv_primitives::chainhash::Hash;
use bsv_spv::{Beef, Broadcaster};
use bsv_transaction::Outpoint;
use bsv_wallet::{Counterparty, KeyMaterialProvider};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::action::{
    Finalized, FinalizeOptions, SendWithResult, SendWithStatus, Spends, TransactionStatus,
};
use crate::builder::PendingTx;
use crate::engine::{lock, AwaitingSignature, HeldTx, SignableState, WalletEngine};
use crate::error::{ActionError, ReferenceError};
use crate::store::{ChangeOutput, ChangeStore, OutputStatus};

type Rejection = (ActionError, Option<Box<AwaitingSignature>>);

impl<K, S, B> WalletEngine<K, S, B>
where
    K: KeyMaterialProvider,
    S: ChangeStore,
    B: Broadcaster,
{
    /// Supply the unlocking scripts a signable transaction waits for, then
    /// complete it. A reference completes at most once.
    #[instrument(skip(self, spends, options), fields(inputs = spends.len()))]
    pub async fn finalize(
        &self,
        reference: &str,
        spends: Spends,
        options: FinalizeOptions,
    ) -> Result<Finalized, ActionError> {
        let signable = match self.take_signable(reference, &spends) {
            Ok(signable) => signable,
            Err((error, abandoned)) => {
                if let Some(abandoned) = abandoned {
                    let pending = &abandoned.pending;
                    self.release_reservation(&pending.reference, &pending.reserved).await;
                }
                warn!(error = %error, "finalize rejected");
                return Err(error);
            }
        };

        let mut pending = signable.pending;
        for (index, script) in spends {
            if let Some(input) = pending.transaction.inputs.get_mut(index as usize) {
                input.unlocking_script = Some(script);
            }
        }
        if let Some(no_send) = options.no_send {
            pending.no_send = no_send;
        }
        if let Some(accept) = options.accept_delayed_broadcast {
            pending.accept_delayed_broadcast = accept;
        }

        let result = self.complete(pending).await;
        if let Err(e) = &result {
            // A held transaction may still go out; anything else is dead.
            if !matches!(e, ActionError::Broadcast { retryable: true, .. }) {
                lock(&self.signables).insert(reference.to_string(), SignableState::Abandoned);
            }
        }
        result
    }

    /// Move an awaiting entry out of the registry, leaving its next state
    /// behind. Rejections that abandon the entry hand it back for release.
    fn take_signable(&self, reference: &str, spends: &Spends) -> Result<Box<AwaitingSignature>, Rejection> {
        let mut signables = lock(&self.signables);
        let signable = match signables.remove(reference) {
            None => return Err((ReferenceError::Unknown(reference.into()).into(), None)),
            Some(SignableState::Finalized) => {
                signables.insert(reference.to_string(), SignableState::Finalized);
                return Err((ReferenceError::AlreadyFinalized(reference.into()).into(), None));
            }
            Some(SignableState::Abandoned) => {
                signables.insert(reference.to_string(), SignableState::Abandoned);
                return Err((ReferenceError::Abandoned(reference.into()).into(), None));
            }
            Some(SignableState::AwaitingSignature(signable)) => signable,
        };

        if Instant::now() >= signable.expires_at {
            signables.insert(reference.to_string(), SignableState::Abandoned);
            return Err((ReferenceError::Expired(reference.into()).into(), Some(signable)));
        }

        if !spends.keys().eq(signable.awaiting.keys()) {
            let expected: Vec<u32> = signable.awaiting.keys().copied().collect();
            let got: Vec<u32> = spends.keys().copied().collect();
            signables.insert(reference.to_string(), SignableState::AwaitingSignature(signable));
            return Err((
                ActionError::Validation(format!(
                    "spends cover inputs {:?}, expected {:?}",
                    got, expected
                )),
                None,
            ));
        }

        let oversized = spends
            .iter()
            .map(|(index, script)| (*index, signable.awaiting[index], script.len()))
            .find(|(_, declared, actual)| actual > declared);
        if let Some((input_index, declared, actual)) = oversized {
            signables.insert(reference.to_string(), SignableState::Abandoned);
            return Err((ActionError::Sizing { input_index, declared, actual }, Some(signable)));
        }

        signables.insert(reference.to_string(), SignableState::Finalized);
        Ok(signable)
    }

    /// Abandon a signable transaction and release what it reserved.
    /// Aborting an abandoned reference is a no-op.
    #[instrument(skip(self))]
    pub async fn abort(&self, reference: &str) -> Result<(), ActionError> {
        let signable = {
            let mut signables = lock(&self.signables);
            match signables.remove(reference) {
                None => return Err(ReferenceError::Unknown(reference.into()).into()),
                Some(SignableState::Finalized) => {
                    signables.insert(reference.to_string(), SignableState::Finalized);
                    return Err(ReferenceError::AlreadyFinalized(reference.into()).into());
                }
                Some(SignableState::Abandoned) => None,
                Some(SignableState::AwaitingSignature(signable)) => Some(signable),
            }
        };
        lock(&self.signables).insert(reference.to_string(), SignableState::Abandoned);
        if let Some(signable) = signable {
            let pending = &signable.pending;
            self.release_reservation(&pending.reference, &pending.reserved).await;
            info!("signable transaction aborted");
        }
        Ok(())
    }

    /// Abandon every signable past its time-to-live. Returns how many were
    /// swept.
    #[instrument(skip(self))]
    pub async fn expire_abandoned(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Box<AwaitingSignature>> = {
            let mut signables = lock(&self.signables);
            let references: Vec<String> = signables
                .iter()
                .filter(|(_, state)| {
                    matches!(state, SignableState::AwaitingSignature(s) if now >= s.expires_at)
                })
                .map(|(reference, _)| reference.clone())
                .collect();
            references
                .into_iter()
                .filter_map(|reference| {
                    match signables.insert(reference, SignableState::Abandoned) {
                        Some(SignableState::AwaitingSignature(signable)) => Some(signable),
                        _ => None,
                    }
                })
                .collect()
        };
        for signable in &expired {
            let pending = &signable.pending;
            self.release_reservation(&pending.reference, &pending.reserved).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired signable transactions");
        }
        expired.len()
    }

    /// Sign internal inputs, package evidence, record the spend and either
    /// hold or broadcast.
    pub(crate) async fn complete(&self, mut pending: PendingTx) -> Result<Finalized, ActionError> {
        let (txid, beef) = match self.sign_and_package(&mut pending) {
            Ok(signed) => signed,
            Err(e) => {
                self.release_reservation(&pending.reference, &pending.reserved).await;
                return Err(e);
            }
        };

        let prior = match self.spend_inputs(&pending.reserved, txid).await {
            Ok(prior) => prior,
            Err(e) => {
                self.release_reservation(&pending.reference, &pending.reserved).await;
                return Err(e);
            }
        };
        lock(&self.live_reservations).remove(&pending.reference);

        let change: Vec<ChangeOutput> = pending
            .change
            .iter()
            .filter_map(|slot| {
                let output = pending.transaction.outputs.get(slot.vout as usize)?;
                Some(
                    ChangeOutput::new(
                        Outpoint::new(txid, slot.vout),
                        output.satoshis,
                        output.locking_script.clone(),
                        self.config.change_basket.clone(),
                        slot.template.clone(),
                        Counterparty::Self_,
                        beef.clone(),
                    )
                    .with_status(OutputStatus::NoSend),
                )
            })
            .collect();
        let change_outpoints: Vec<Outpoint> = change.iter().map(|o| o.outpoint).collect();
        if let Err(e) = self.store.insert_outputs(change).await {
            self.restore_inputs(&prior).await;
            return Err(e.into());
        }

        let parents: Vec<Hash> = {
            let held = lock(&self.held);
            let mut parents: Vec<Hash> = pending
                .transaction
                .inputs
                .iter()
                .map(|i| i.outpoint.txid)
                .filter(|txid| held.contains_key(txid))
                .collect();
            parents.sort();
            parents.dedup();
            parents
        };
        lock(&self.held).insert(
            txid,
            HeldTx {
                transaction: pending.transaction.clone(),
                beef: beef.clone(),
                prior,
                change: change_outpoints.clone(),
                parents,
                in_flight: false,
            },
        );

        let mut finalized = Finalized {
            txid,
            transaction: pending.transaction,
            beef,
            status: TransactionStatus::NoSend,
            no_send_change: Vec::new(),
            send_with_results: Vec::new(),
        };
        if pending.no_send {
            info!(%txid, "transaction held for a later batch");
            finalized.no_send_change = change_outpoints;
            return Ok(finalized);
        }

        let mut batch = pending.send_with;
        batch.push(txid);
        let mut results = self.send_batch(&batch).await;
        let own = results
            .iter()
            .position(|r| r.txid == txid)
            .map(|i| results.remove(i))
            .unwrap_or_else(|| SendWithResult::failed(txid, true, "not submitted"));
        finalized.send_with_results = results;

        match own.status {
            SendWithStatus::Unproven => {
                finalized.status = TransactionStatus::Unproven;
                Ok(finalized)
            }
            SendWithStatus::Failed { retryable: true, .. } if pending.accept_delayed_broadcast => {
                finalized.status = TransactionStatus::Held;
                Ok(finalized)
            }
            SendWithStatus::Failed { retryable, description } => {
                Err(ActionError::Broadcast { txid, retryable, description })
            }
        }
    }

    fn sign_and_package(&self, pending: &mut PendingTx) -> Result<(Hash, Beef), ActionError> {
        for internal in &pending.internal {
            let generator = internal.template.unlock(&self.keys, &internal.counterparty, internal.satoshis)?;
            let script = generator.compute_unlocking_script(&pending.transaction, internal.index)?;
            if script.len() > generator.estimated_length() {
                return Err(ActionError::Sizing {
                    input_index: internal.index as u32,
                    declared: generator.estimated_length(),
                    actual: script.len(),
                });
            }
            let input = pending.transaction.inputs.get_mut(internal.index).ok_or_else(|| {
                ActionError::Validation(format!("input {} out of range", internal.index))
            })?;
            input.unlocking_script = Some(script);
        }

        let txid = pending.transaction.tx_id();
        let mut beef = pending.evidence.clone();
        beef.merge_transaction(pending.transaction.clone());
        Ok((txid, beef.to_atomic(&txid)?))
    }

    /// Mark reserved inputs spent by `txid`, returning their prior statuses.
    async fn spend_inputs(
        &self,
        reserved: &[Outpoint],
        txid: Hash,
    ) -> Result<Vec<(Outpoint, OutputStatus)>, ActionError> {
        let mut prior = Vec::with_capacity(reserved.len());
        for outpoint in reserved {
            let output = self
                .store
                .find_output(outpoint)
                .await?
                .ok_or(crate::error::StoreError::NotFound(*outpoint))?;
            prior.push((*outpoint, output.status));
        }
        self.store.mark_spent(reserved, txid).await?;
        Ok(prior)
    }

    async fn restore_inputs(&self, prior: &[(Outpoint, OutputStatus)]) {
        for (outpoint, status) in prior {
            if let Err(e) = self.store.set_status(&[*outpoint], *status).await {
                warn!(%outpoint, error = %e, "failed to restore input status");
            }
        }
    }

    /// Forget a held transaction that can never be mined: its inputs become
    /// spendable again and its change disappears.
    async fn drop_held(&self, txid: &Hash, held: &HeldTx) {
        lock(&self.held).remove(txid);
        self.restore_inputs(&held.prior).await;
        if let Err(e) = self.store.remove_outputs(&held.change).await {
            warn!(%txid, error = %e, "failed to remove change of a rejected transaction");
        }
    }

    /// Broadcast held transactions, parents before children.
    ///
    /// Change of a successful transaction becomes spendable unless a chain
    /// forwards it. Results follow the order of `txids`.
    #[instrument(skip_all, fields(count = txids.len()))]
    pub async fn send_batch(&self, txids: &[Hash]) -> Vec<SendWithResult> {
        let mut unique = Vec::with_capacity(txids.len());
        for txid in txids {
            if !unique.contains(txid) {
                unique.push(*txid);
            }
        }

        let mut outcomes: HashMap<Hash, SendWithResult> = HashMap::new();
        for txid in self.dependency_order(&unique) {
            let result = self.send_one(txid, &outcomes).await;
            outcomes.insert(txid, result);
        }
        unique
            .into_iter()
            .filter_map(|txid| outcomes.remove(&txid))
            .collect()
    }

    fn dependency_order(&self, txids: &[Hash]) -> Vec<Hash> {
        let parents: HashMap<Hash, Vec<Hash>> = {
            let held = lock(&self.held);
            txids
                .iter()
                .map(|txid| (*txid, held.get(txid).map(|h| h.parents.clone()).unwrap_or_default()))
                .collect()
        };

        fn visit(txid: Hash, parents: &HashMap<Hash, Vec<Hash>>, seen: &mut HashSet<Hash>, out: &mut Vec<Hash>) {
            if !seen.insert(txid) {
                return;
            }
            for parent in parents.get(&txid).into_iter().flatten() {
                if parents.contains_key(parent) {
                    visit(*parent, parents, seen, out);
                }
            }
            out.push(txid);
        }

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(txids.len());
        for txid in txids {
            visit(*txid, &parents, &mut seen, &mut order);
        }
        order
    }

    async fn send_one(&self, txid: Hash, outcomes: &HashMap<Hash, SendWithResult>) -> SendWithResult {
        let held = {
            let mut registry = lock(&self.held);
            let entry = match registry.get_mut(&txid) {
                None => return SendWithResult::failed(txid, false, "transaction is not held"),
                Some(entry) if entry.in_flight => {
                    return SendWithResult::failed(txid, true, "broadcast already in progress")
                }
                Some(entry) => entry,
            };
            entry.in_flight = true;
            entry.clone()
        };
        let _claim = InFlight { held: &self.held, txid };

        if let Some(parent) = held.parents.iter().find(|p| outcomes.get(*p).is_some_and(SendWithResult::is_fatal)) {
            let description = format!("parent {} was rejected", parent);
            self.drop_held(&txid, &held).await;
            warn!(%txid, %parent, "dropping child of a rejected transaction");
            return SendWithResult::failed(txid, false, description);
        }
        if let Some(parent) = held.parents.iter().find(|p| self.is_held(p)) {
            return SendWithResult::failed(txid, true, format!("parent {} has not been broadcast", parent));
        }

        match self.broadcaster.broadcast(&held.transaction).await {
            Ok(success) => {
                lock(&self.held).remove(&txid);
                let spendable: Vec<Outpoint> =
                    held.change.iter().filter(|o| !self.is_forwarded(o)).copied().collect();
                if let Err(e) = self.promote_unsent_change(&spendable).await {
                    warn!(%txid, error = %e, "failed to release change of a broadcast transaction");
                }
                info!(%txid, message = %success.message, "transaction broadcast");
                SendWithResult::unproven(txid)
            }
            Err(failure) if failure.retryable => {
                warn!(%txid, failure = %failure, "broadcast failed, transaction stays held");
                SendWithResult::failed(txid, true, failure.to_string())
            }
            Err(failure) => {
                warn!(%txid, failure = %failure, "broadcast rejected");
                self.drop_held(&txid, &held).await;
                SendWithResult::failed(txid, false, failure.to_string())
            }
        }
    }

    /// Atomic BEEF of a held transaction, for handing to a counterparty
    /// before the batch goes out.
    pub fn held_beef(&self, txid: &Hash) -> Option<Beef> {
        lock(&self.held).get(txid).map(|h| h.beef.clone())
    }
}

/// Clears the in-flight mark of a held entry that outlives its broadcast,
/// including when the sending future is dropped.
struct InFlight<'a> {
    held: &'a Mutex<HashMap<Hash, HeldTx>>,
    txid: Hash,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(entry) = lock(self.held).get_mut(&self.txid) {
            entry.in_flight = false;
        }
    }
}
