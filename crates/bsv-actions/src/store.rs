//! The wallet's change pool behind the [`ChangeStore`] seam.

use std::collections::HashMap;
use std::future::Future;

use bsv_primitives::chainhash::Hash;
use bsv_script::Script;
use bsv_spv::Beef;
use bsv_transaction::{Outpoint, TransactionOutput};
use bsv_wallet::{Counterparty, ScriptTemplate};
use tokio::sync::RwLock;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Available to auto-selection.
    Spendable,
    /// Produced by a transaction that has not been broadcast. Only spent
    /// when forwarded explicitly.
    NoSend,
    Spent,
}

/// An output the wallet can unlock on its own.
#[derive(Debug, Clone)]
pub struct ChangeOutput {
    pub outpoint: Outpoint,
    pub satoshis: u64,
    pub locking_script: Script,
    pub basket: String,
    pub template: ScriptTemplate,
    /// Whoever locked the output, for BRC-29 derivation.
    pub counterparty: Counterparty,
    pub status: OutputStatus,
    /// Reference token of the action holding this output.
    pub reserved_by: Option<String>,
    pub spent_by: Option<Hash>,
    /// Insertion order, assigned by the store.
    pub sequence: u64,
    /// BEEF proving the producing transaction.
    pub evidence: Beef,
}

impl ChangeOutput {
    pub fn new(
        outpoint: Outpoint,
        satoshis: u64,
        locking_script: Script,
        basket: impl Into<String>,
        template: ScriptTemplate,
        counterparty: Counterparty,
        evidence: Beef,
    ) -> Self {
        ChangeOutput {
            outpoint,
            satoshis,
            locking_script,
            basket: basket.into(),
            template,
            counterparty,
            status: OutputStatus::Spendable,
            reserved_by: None,
            spent_by: None,
            sequence: 0,
            evidence,
        }
    }

    pub fn with_status(mut self, status: OutputStatus) -> Self {
        self.status = status;
        self
    }

    /// The output as the spending transaction sees it.
    pub fn source_output(&self) -> TransactionOutput {
        TransactionOutput::new(self.satoshis, self.locking_script.clone())
    }

    pub fn is_available(&self) -> bool {
        self.status != OutputStatus::Spent && self.reserved_by.is_none()
    }
}

/// Storage for change outputs.
///
/// `reserve` is all-or-nothing. `release`, `set_status` and
/// `remove_outputs` skip outpoints they do not know.
pub trait ChangeStore: Send + Sync {
    /// Outputs of `basket` in insertion order, spent ones included.
    fn list_outputs(
        &self,
        basket: &str,
    ) -> impl Future<Output = Result<Vec<ChangeOutput>, StoreError>> + Send;

    fn find_output(
        &self,
        outpoint: &Outpoint,
    ) -> impl Future<Output = Result<Option<ChangeOutput>, StoreError>> + Send;

    fn insert_outputs(
        &self,
        outputs: Vec<ChangeOutput>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Claim unspent, unreserved outputs for the action `token`.
    fn reserve(
        &self,
        outpoints: &[Outpoint],
        token: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn release(&self, outpoints: &[Outpoint]) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn mark_spent(
        &self,
        outpoints: &[Outpoint],
        spent_by: Hash,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Any status but `Spent` clears `spent_by`.
    fn set_status(
        &self,
        outpoints: &[Outpoint],
        status: OutputStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn remove_outputs(
        &self,
        outpoints: &[Outpoint],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Default)]
struct Inner {
    outputs: HashMap<Outpoint, ChangeOutput>,
    next_sequence: u64,
}

/// In-process [`ChangeStore`].
#[derive(Default)]
pub struct MemoryChangeStore {
    inner: RwLock<Inner>,
}

impl MemoryChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.outputs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ChangeStore for MemoryChangeStore {
    async fn list_outputs(&self, basket: &str) -> Result<Vec<ChangeOutput>, StoreError> {
        let inner = self.inner.read().await;
        let mut outputs: Vec<ChangeOutput> =
            inner.outputs.values().filter(|o| o.basket == basket).cloned().collect();
        outputs.sort_by_key(|o| o.sequence);
        Ok(outputs)
    }

    async fn find_output(&self, outpoint: &Outpoint) -> Result<Option<ChangeOutput>, StoreError> {
        Ok(self.inner.read().await.outputs.get(outpoint).cloned())
    }

    async fn insert_outputs(&self, outputs: Vec<ChangeOutput>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(dup) = outputs.iter().find(|o| inner.outputs.contains_key(&o.outpoint)) {
            return Err(StoreError::Duplicate(dup.outpoint));
        }
        for mut output in outputs {
            output.sequence = inner.next_sequence;
            inner.next_sequence += 1;
            inner.outputs.insert(output.outpoint, output);
        }
        Ok(())
    }

    async fn reserve(&self, outpoints: &[Outpoint], token: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for outpoint in outpoints {
            match inner.outputs.get(outpoint) {
                None => return Err(StoreError::NotFound(*outpoint)),
                Some(o) if !o.is_available() => return Err(StoreError::Unavailable(*outpoint)),
                Some(_) => {}
            }
        }
        for outpoint in outpoints {
            if let Some(output) = inner.outputs.get_mut(outpoint) {
                output.reserved_by = Some(token.to_string());
            }
        }
        Ok(())
    }

    async fn release(&self, outpoints: &[Outpoint]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for outpoint in outpoints {
            if let Some(output) = inner.outputs.get_mut(outpoint) {
                output.reserved_by = None;
            }
        }
        Ok(())
    }

    async fn mark_spent(&self, outpoints: &[Outpoint], spent_by: Hash) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(missing) = outpoints.iter().find(|o| !inner.outputs.contains_key(o)) {
            return Err(StoreError::NotFound(*missing));
        }
        for outpoint in outpoints {
            if let Some(output) = inner.outputs.get_mut(outpoint) {
                output.status = OutputStatus::Spent;
                output.spent_by = Some(spent_by);
                output.reserved_by = None;
            }
        }
        Ok(())
    }

    async fn set_status(&self, outpoints: &[Outpoint], status: OutputStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for outpoint in outpoints {
            if let Some(output) = inner.outputs.get_mut(outpoint) {
                output.status = status;
                if status != OutputStatus::Spent {
                    output.spent_by = None;
                }
            }
        }
        Ok(())
    }

    async fn remove_outputs(&self, outpoints: &[Outpoint]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for outpoint in outpoints {
            inner.outputs.remove(outpoint);
        }
        Ok(())
    }
}
