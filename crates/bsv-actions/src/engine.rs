//! [`WalletEngine`]: the explicit context every action call runs in.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bsv_primitives::chainhash::Hash;
use bsv_script::Address;
use bsv_spv::{Beef, Broadcaster};
use bsv_transaction::{Outpoint, Transaction};
use bsv_wallet::KeyMaterialProvider;
use tokio::time::Instant;

use crate::action::AwaitingInputs;
use crate::builder::PendingTx;
use crate::config::EngineConfig;
use crate::error::ActionError;
use crate::store::{ChangeOutput, ChangeStore, OutputStatus};

/// Lifecycle of a signable transaction, keyed by its reference token.
pub(crate) enum SignableState {
    AwaitingSignature(Box<AwaitingSignature>),
    Finalized,
    Abandoned,
}

pub(crate) struct AwaitingSignature {
    pub pending: PendingTx,
    pub awaiting: AwaitingInputs,
    pub expires_at: Instant,
}

/// A signed transaction that has not reached the network yet.
#[derive(Clone)]
pub(crate) struct HeldTx {
    pub transaction: Transaction,
    pub beef: Beef,
    /// Store-owned inputs with the status they had before this spend.
    pub prior: Vec<(Outpoint, OutputStatus)>,
    pub change: Vec<Outpoint>,
    /// Held transactions this one spends from.
    pub parents: Vec<Hash>,
    /// Claimed by a `send_batch` that is awaiting the broadcaster.
    pub in_flight: bool,
}

/// Spendable and unsent totals of the change basket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub spendable: u64,
    pub no_send: u64,
}

/// Builds, signs and broadcasts actions for one wallet.
///
/// Auto-selection is serialized by an async mutex. The signable and held
/// registries sit behind std mutexes that are never held across an await.
pub struct WalletEngine<K, S, B> {
    pub(crate) keys: K,
    pub(crate) store: S,
    pub(crate) broadcaster: B,
    pub(crate) config: EngineConfig,
    pub(crate) selection: tokio::sync::Mutex<()>,
    pub(crate) signables: Mutex<HashMap<String, SignableState>>,
    pub(crate) held: Mutex<HashMap<Hash, HeldTx>>,
    /// Reference tokens whose reservations are still in use.
    pub(crate) live_reservations: Mutex<HashSet<String>>,
    /// Change a [`BatchChainer`](crate::BatchChainer) forwards. It stays
    /// `NoSend` when its producer is broadcast.
    pub(crate) forwarded: Mutex<HashSet<Outpoint>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, S, B> WalletEngine<K, S, B> {
    /// Whether some chain forwards `outpoint`.
    pub fn is_forwarded(&self, outpoint: &Outpoint) -> bool {
        lock(&self.forwarded).contains(outpoint)
    }

    pub(crate) fn claim_forwarded(&self, outpoints: &[Outpoint]) {
        lock(&self.forwarded).extend(outpoints.iter().copied());
    }

    pub(crate) fn unclaim_forwarded(&self, outpoints: &[Outpoint]) {
        let mut forwarded = lock(&self.forwarded);
        for outpoint in outpoints {
            forwarded.remove(outpoint);
        }
    }
}

impl<K, S, B> WalletEngine<K, S, B>
where
    K: KeyMaterialProvider,
    S: ChangeStore,
    B: Broadcaster,
{
    pub fn new(keys: K, store: S, broadcaster: B, config: EngineConfig) -> Self {
        WalletEngine {
            keys,
            store,
            broadcaster,
            config,
            selection: tokio::sync::Mutex::new(()),
            signables: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            live_reservations: Mutex::new(HashSet::new()),
            forwarded: Mutex::new(HashSet::new()),
        }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// P2PKH address of the identity key on the configured network.
    pub fn identity_address(&self) -> Address {
        Address::from_public_key(&self.keys.identity_key(), self.config.network)
    }

    /// Unspent change of the change basket, oldest first.
    pub async fn list_change(&self) -> Result<Vec<ChangeOutput>, ActionError> {
        let outputs = self.store.list_outputs(&self.config.change_basket).await?;
        Ok(outputs.into_iter().filter(|o| o.status != OutputStatus::Spent).collect())
    }

    pub async fn balance(&self) -> Result<Balance, ActionError> {
        let mut balance = Balance::default();
        for output in self.list_change().await? {
            match output.status {
                OutputStatus::Spendable => balance.spendable += output.satoshis,
                OutputStatus::NoSend => balance.no_send += output.satoshis,
                OutputStatus::Spent => {}
            }
        }
        Ok(balance)
    }

    /// Txids of signed transactions waiting for a batch submit.
    pub fn held_txids(&self) -> Vec<Hash> {
        let mut txids: Vec<Hash> = lock(&self.held).keys().copied().collect();
        txids.sort();
        txids
    }

    pub fn is_held(&self, txid: &Hash) -> bool {
        lock(&self.held).contains_key(txid)
    }

    /// Release `outpoints` and retire the reservation token.
    pub(crate) async fn release_reservation(&self, token: &str, outpoints: &[Outpoint]) {
        lock(&self.live_reservations).remove(token);
        if let Err(e) = self.store.release(outpoints).await {
            tracing::warn!(token, error = %e, "failed to release reserved change");
        }
    }
}
