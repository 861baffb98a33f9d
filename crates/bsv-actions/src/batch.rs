//! Chains of no-send actions that forward unconfirmed change to each other.
//!
//! [`BatchChainer`] is an arena the caller owns. Every forwarded outpoint
//! belongs to at most one chain and is registered with the engine, so it
//! stays `NoSend` through any broadcast until the chain spends it or is
//! closed. Independent builds therefore never select it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use bsv_primitives::chainhash::Hash;
use bsv_spv::Broadcaster;
use bsv_transaction::Outpoint;
use bsv_wallet::KeyMaterialProvider;
use tracing::{debug, info, instrument};

use crate::action::{
    Action, BuildOutcome, Finalized, FinalizeOptions, SendWithResult, SignableTransaction, Spends,
};
use crate::engine::WalletEngine;
use crate::error::ActionError;
use crate::store::ChangeStore;

/// Identity of one chain in a [`BatchChainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain-{}", self.0)
    }
}

/// Ordered no-send change a chain hands to its next action.
pub type ChangeForward = Vec<Outpoint>;

#[derive(Debug, Clone)]
pub enum MintOutcome {
    Minted { finalized: Finalized, forward: ChangeForward },
    /// The action has inputs the caller signs; finish it with
    /// [`BatchChainer::finalize`].
    Signable(SignableTransaction),
}

struct PendingMint {
    chain: ChainId,
    forwarded: ChangeForward,
}

#[derive(Default)]
pub struct BatchChainer {
    next_id: u64,
    owners: HashMap<Outpoint, ChainId>,
    forwards: HashMap<ChainId, ChangeForward>,
    minted: HashMap<ChainId, Vec<Hash>>,
    pending: HashMap<String, PendingMint>,
}

impl BatchChainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_chain(&mut self) -> ChainId {
        let id = ChainId(self.next_id);
        self.next_id += 1;
        self.forwards.insert(id, Vec::new());
        self.minted.insert(id, Vec::new());
        id
    }

    /// The change `chain` currently forwards.
    pub fn forward(&self, chain: ChainId) -> &[Outpoint] {
        self.forwards.get(&chain).map(Vec::as_slice).unwrap_or_default()
    }

    /// Held transactions minted by `chain`, oldest first.
    pub fn minted(&self, chain: ChainId) -> &[Hash] {
        self.minted.get(&chain).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn owner(&self, outpoint: &Outpoint) -> Option<ChainId> {
        self.owners.get(outpoint).copied()
    }

    /// Every outpoint some chain forwards.
    pub fn owned(&self) -> HashSet<Outpoint> {
        self.owners.keys().copied().collect()
    }

    fn check_chain(&self, chain: ChainId) -> Result<(), ActionError> {
        if self.forwards.contains_key(&chain) {
            Ok(())
        } else {
            Err(ActionError::Validation(format!("{} is not open", chain)))
        }
    }

    /// Build `action` as a no-send step of `chain`, funding it first from
    /// `forwarded`.
    #[instrument(skip_all, fields(%chain))]
    pub async fn mint<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        chain: ChainId,
        mut action: Action,
        forwarded: ChangeForward,
    ) -> Result<MintOutcome, ActionError>
    where
        K: KeyMaterialProvider,
        S: ChangeStore,
        B: Broadcaster,
    {
        self.check_chain(chain)?;
        for outpoint in &forwarded {
            match self.owners.get(outpoint) {
                Some(owner) if *owner != chain => {
                    return Err(ActionError::Validation(format!(
                        "{} is forwarded by {}",
                        outpoint, owner
                    )))
                }
                _ => {}
            }
        }

        action.options.no_send = true;
        action.options.send_with.clear();
        action.options.no_send_change = forwarded.clone();

        match engine.build(action).await? {
            BuildOutcome::Finalized(finalized) => {
                let forward = self.advance(engine, chain, &forwarded, &finalized);
                Ok(MintOutcome::Minted { finalized, forward })
            }
            BuildOutcome::Signable(signable) => {
                self.claim(engine, chain, &forwarded);
                self.pending.insert(signable.reference.clone(), PendingMint { chain, forwarded });
                Ok(MintOutcome::Signable(signable))
            }
            BuildOutcome::Batch(_) => {
                Err(ActionError::Validation("a mint needs inputs or outputs".into()))
            }
        }
    }

    /// Finish a signable mint of `chain`. Returns the finalized step and the
    /// chain's new forward.
    #[instrument(skip_all, fields(%chain))]
    pub async fn finalize<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        chain: ChainId,
        reference: &str,
        spends: Spends,
    ) -> Result<(Finalized, ChangeForward), ActionError>
    where
        K: KeyMaterialProvider,
        S: ChangeStore,
        B: Broadcaster,
    {
        match self.pending.get(reference) {
            Some(pending) if pending.chain == chain => {}
            Some(pending) => {
                return Err(ActionError::Validation(format!(
                    "reference {} belongs to {}",
                    reference, pending.chain
                )))
            }
            None => {
                return Err(ActionError::Validation(format!(
                    "reference {} is not a pending mint",
                    reference
                )))
            }
        }

        let options = FinalizeOptions { no_send: Some(true), accept_delayed_broadcast: None };
        let result = engine.finalize(reference, spends, options).await;
        match result {
            Ok(finalized) => {
                let forwarded = self.pending.remove(reference).map(|p| p.forwarded).unwrap_or_default();
                let forward = self.advance(engine, chain, &forwarded, &finalized);
                Ok((finalized, forward))
            }
            // The signable still awaits its spends.
            Err(e @ ActionError::Validation(_)) => Err(e),
            Err(e) => {
                // Forwarded change the step did not spend stays with the chain.
                self.pending.remove(reference);
                Err(e)
            }
        }
    }

    /// Record a minted step: forwarded change it spent is no longer owned,
    /// its own change is.
    fn advance<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        chain: ChainId,
        forwarded: &[Outpoint],
        finalized: &Finalized,
    ) -> ChangeForward {
        let spent: HashSet<Outpoint> = finalized.transaction.inputs.iter().map(|i| i.outpoint).collect();
        let released: Vec<Outpoint> =
            spent.iter().filter(|o| self.owners.get(*o) == Some(&chain)).copied().collect();
        for outpoint in &released {
            self.owners.remove(outpoint);
        }
        engine.unclaim_forwarded(&released);

        let mut forward: ChangeForward =
            forwarded.iter().filter(|o| !spent.contains(o)).copied().collect();
        forward.extend(finalized.no_send_change.iter().copied());
        self.claim(engine, chain, &forward);
        if let Some(chain_forward) = self.forwards.get_mut(&chain) {
            chain_forward.retain(|o| !spent.contains(o));
        }
        self.minted.entry(chain).or_default().push(finalized.txid);

        debug!(txid = %finalized.txid, forward = forward.len(), "minted chain step");
        forward
    }

    fn claim<K, S, B>(&mut self, engine: &WalletEngine<K, S, B>, chain: ChainId, outpoints: &[Outpoint]) {
        engine.claim_forwarded(outpoints);
        let chain_forward = self.forwards.entry(chain).or_default();
        for outpoint in outpoints {
            self.owners.insert(*outpoint, chain);
            if !chain_forward.contains(outpoint) {
                chain_forward.push(*outpoint);
            }
        }
    }

    /// Broadcast held transactions in dependency order. Equivalent to
    /// [`WalletEngine::send_batch`] plus forgetting change of rejected
    /// transactions.
    #[instrument(skip_all, fields(count = txids.len()))]
    pub async fn submit_batch<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        txids: &[Hash],
    ) -> Vec<SendWithResult>
    where
        K: KeyMaterialProvider,
        S: ChangeStore,
        B: Broadcaster,
    {
        let results = engine.send_batch(txids).await;

        let rejected: HashSet<Hash> = results.iter().filter(|r| r.is_fatal()).map(|r| r.txid).collect();
        if !rejected.is_empty() {
            let gone: Vec<Outpoint> =
                self.owners.keys().filter(|o| rejected.contains(&o.txid)).copied().collect();
            engine.unclaim_forwarded(&gone);
            self.owners.retain(|outpoint, _| !rejected.contains(&outpoint.txid));
            for forward in self.forwards.values_mut() {
                forward.retain(|outpoint| !rejected.contains(&outpoint.txid));
            }
        }
        info!(
            sent = results.iter().filter(|r| r.is_unproven()).count(),
            rejected = rejected.len(),
            "batch submitted"
        );
        results
    }

    /// Submit everything `chain` minted that is still held.
    pub async fn submit_chain<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        chain: ChainId,
    ) -> Result<Vec<SendWithResult>, ActionError>
    where
        K: KeyMaterialProvider,
        S: ChangeStore,
        B: Broadcaster,
    {
        self.check_chain(chain)?;
        let txids: Vec<Hash> =
            self.minted(chain).iter().filter(|txid| engine.is_held(txid)).copied().collect();
        Ok(self.submit_batch(engine, &txids).await)
    }

    /// Drop `chain`. Its forwarded change whose producer has been broadcast
    /// becomes spendable; the rest stays `NoSend` until its producer goes out.
    #[instrument(skip_all, fields(%chain))]
    pub async fn close<K, S, B>(
        &mut self,
        engine: &WalletEngine<K, S, B>,
        chain: ChainId,
    ) -> Result<Vec<Outpoint>, ActionError>
    where
        K: KeyMaterialProvider,
        S: ChangeStore,
        B: Broadcaster,
    {
        self.check_chain(chain)?;
        let forward = self.forwards.remove(&chain).unwrap_or_default();
        self.minted.remove(&chain);
        let owned: Vec<Outpoint> =
            self.owners.iter().filter(|(_, owner)| **owner == chain).map(|(o, _)| *o).collect();
        engine.unclaim_forwarded(&owned);
        engine.unclaim_forwarded(&forward);
        self.owners.retain(|_, owner| *owner != chain);
        self.pending.retain(|_, p| p.chain != chain);

        let promoted = engine.promote_unsent_change(&forward).await?;
        info!(released = forward.len(), promoted = promoted.len(), "chain closed");
        Ok(promoted)
    }
}
