//! Finding and repairing change the engine's bookkeeping lost track of.

use std::collections::HashSet;

use bsv_spv::Broadcaster;
use bsv_transaction::Outpoint;
use bsv_wallet::KeyMaterialProvider;
use tracing::{info, instrument};

use crate::engine::{lock, WalletEngine};
use crate::error::ActionError;
use crate::store::{ChangeOutput, ChangeStore, OutputStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Reserved by an action that no longer exists.
    DeadReservation,
    /// `NoSend` change whose producer left the held registry without its
    /// change being promoted. Rejected producers take their change with
    /// them, so this producer was broadcast.
    OrphanedNoSend,
}

#[derive(Debug, Clone)]
pub struct InvalidChange {
    pub output: ChangeOutput,
    pub reason: InvalidReason,
}

impl<K, S, B> WalletEngine<K, S, B>
where
    K: KeyMaterialProvider,
    S: ChangeStore,
    B: Broadcaster,
{
    /// Change in an inconsistent state. Change a chain forwards, and any
    /// outpoint in `protected`, is never reported as orphaned.
    #[instrument(skip_all)]
    pub async fn list_invalid_change(
        &self,
        protected: &HashSet<Outpoint>,
    ) -> Result<Vec<InvalidChange>, ActionError> {
        let outputs = self.store.list_outputs(&self.config.change_basket).await?;
        let live = lock(&self.live_reservations).clone();
        let held: HashSet<_> = lock(&self.held).keys().copied().collect();
        let forwarded = lock(&self.forwarded).clone();

        let invalid = outputs
            .into_iter()
            .filter_map(|output| {
                let reason = match (&output.reserved_by, output.status) {
                    (_, OutputStatus::Spent) => return None,
                    (Some(token), _) if !live.contains(token) => InvalidReason::DeadReservation,
                    (None, OutputStatus::NoSend)
                        if !held.contains(&output.outpoint.txid)
                            && !protected.contains(&output.outpoint)
                            && !forwarded.contains(&output.outpoint) =>
                    {
                        InvalidReason::OrphanedNoSend
                    }
                    _ => return None,
                };
                Some(InvalidChange { output, reason })
            })
            .collect();
        Ok(invalid)
    }

    /// Release dead reservations and make orphaned no-send change
    /// spendable. Returns what was repaired.
    #[instrument(skip_all)]
    pub async fn release_invalid_change(
        &self,
        protected: &HashSet<Outpoint>,
    ) -> Result<Vec<InvalidChange>, ActionError> {
        let invalid = self.list_invalid_change(protected).await?;
        let (dead, orphaned): (Vec<&InvalidChange>, Vec<&InvalidChange>) =
            invalid.iter().partition(|c| c.reason == InvalidReason::DeadReservation);

        let dead: Vec<Outpoint> = dead.iter().map(|c| c.output.outpoint).collect();
        let orphaned: Vec<Outpoint> = orphaned.iter().map(|c| c.output.outpoint).collect();
        self.store.release(&dead).await?;
        self.store.set_status(&orphaned, OutputStatus::Spendable).await?;

        if !invalid.is_empty() {
            info!(released = dead.len(), promoted = orphaned.len(), "repaired change");
        }
        Ok(invalid)
    }

    /// Make `NoSend` change spendable once its producer has left the held
    /// registry. Returns the outpoints promoted.
    pub async fn promote_unsent_change(&self, outpoints: &[Outpoint]) -> Result<Vec<Outpoint>, ActionError> {
        let mut promoted = Vec::new();
        for outpoint in outpoints {
            let Some(output) = self.store.find_output(outpoint).await? else {
                continue;
            };
            if output.status == OutputStatus::NoSend && !self.is_held(&outpoint.txid) {
                promoted.push(*outpoint);
            }
        }
        self.store.set_status(&promoted, OutputStatus::Spendable).await?;
        Ok(promoted)
    }
}
