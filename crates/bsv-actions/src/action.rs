//! Requests to the engine and what it hands back.

use std::collections::BTreeMap;

use bsv_primitives::chainhash::Hash;
use bsv_script::Script;
use bsv_spv::Beef;
use bsv_transaction::input::DEFAULT_SEQUENCE_NUMBER;
use bsv_transaction::{Outpoint, Transaction};

use crate::error::ActionError;

/// Upper bound on any satoshi amount: 21 million coins.
pub const MAX_SATOSHIS: u64 = 2_100_000_000_000_000;

/// A transaction the caller wants built.
///
/// Inputs listed here are explicit; funding for the rest comes from the
/// wallet's change. Their source outputs must be carried by `input_beef`
/// unless the wallet already tracks them.
///
/// `description` and `labels` are carried for the caller's action ledger;
/// the engine does not interpret them.
#[derive(Debug, Clone)]
pub struct Action {
    pub description: String,
    pub labels: Vec<String>,
    pub version: u32,
    pub lock_time: u32,
    pub outputs: Vec<ActionOutput>,
    pub inputs: Vec<ActionInput>,
    pub input_beef: Option<Beef>,
    pub options: ActionOptions,
}

impl Default for Action {
    fn default() -> Self {
        Action {
            description: String::new(),
            labels: Vec::new(),
            version: 1,
            lock_time: 0,
            outputs: Vec::new(),
            inputs: Vec::new(),
            input_beef: None,
            options: ActionOptions::default(),
        }
    }
}

impl Action {
    pub fn new(description: impl Into<String>) -> Self {
        Action { description: description.into(), ..Default::default() }
    }

    pub fn with_output(mut self, output: ActionOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_input(mut self, input: ActionInput) -> Self {
        self.inputs.push(input);
        self
    }
}

/// A requested output.
///
/// Only the script and amount shape the transaction. The remaining fields
/// are metadata for the caller's output ledger: in particular the engine
/// never tracks outputs by `basket`, only its own change.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub locking_script: Script,
    pub satoshis: u64,
    pub description: String,
    pub tags: Vec<String>,
    pub basket: Option<String>,
    pub custom_instructions: Option<String>,
}

impl ActionOutput {
    pub fn new(locking_script: Script, satoshis: u64) -> Self {
        ActionOutput { locking_script, satoshis, ..Default::default() }
    }
}

/// An explicit input. Exactly one of `unlocking_script_length` and
/// `unlocking_script` is normally set: a declared length means the caller
/// signs later through [`finalize`](crate::WalletEngine::finalize).
#[derive(Debug, Clone)]
pub struct ActionInput {
    pub outpoint: Outpoint,
    pub unlocking_script_length: Option<usize>,
    pub unlocking_script: Option<Script>,
    /// Ledger metadata, not used by the engine.
    pub description: String,
    pub sequence_number: u32,
}

impl ActionInput {
    /// Input the caller will sign after the transaction is laid out.
    pub fn deferred(outpoint: Outpoint, unlocking_script_length: usize) -> Self {
        ActionInput {
            outpoint,
            unlocking_script_length: Some(unlocking_script_length),
            unlocking_script: None,
            description: String::new(),
            sequence_number: DEFAULT_SEQUENCE_NUMBER,
        }
    }

    /// Input whose unlocking script is already known.
    pub fn signed(outpoint: Outpoint, unlocking_script: Script) -> Self {
        ActionInput {
            outpoint,
            unlocking_script_length: None,
            unlocking_script: Some(unlocking_script),
            description: String::new(),
            sequence_number: DEFAULT_SEQUENCE_NUMBER,
        }
    }

    /// Bytes this input's unlocking script occupies in size estimates.
    pub(crate) fn unlock_length(&self) -> usize {
        match (&self.unlocking_script, self.unlocking_script_length) {
            (Some(script), _) => script.len(),
            (None, Some(length)) => length,
            (None, None) => 0,
        }
    }

    pub(crate) fn awaits_signature(&self) -> bool {
        self.unlocking_script.is_none()
    }
}

/// Per-action overrides. `None` falls back to the engine config.
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    pub randomize_outputs: Option<bool>,
    pub accept_delayed_broadcast: Option<bool>,
    /// Sign and hold the transaction instead of broadcasting it.
    pub no_send: bool,
    /// Unconfirmed change from earlier no-send actions, spent first.
    pub no_send_change: Vec<Outpoint>,
    /// Held transactions to broadcast together with this one.
    pub send_with: Vec<Hash>,
}

/// Input indices awaiting an external unlocking script, with their declared
/// lengths.
pub type AwaitingInputs = BTreeMap<u32, usize>;

/// Unlocking scripts supplied to finalize, by input index.
pub type Spends = BTreeMap<u32, Script>;

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Finalized(Finalized),
    Signable(SignableTransaction),
    /// The action only named held transactions to send.
    Batch(Vec<SendWithResult>),
}

impl BuildOutcome {
    pub fn into_finalized(self) -> Option<Finalized> {
        match self {
            BuildOutcome::Finalized(finalized) => Some(finalized),
            _ => None,
        }
    }

    pub fn into_signable(self) -> Option<SignableTransaction> {
        match self {
            BuildOutcome::Signable(signable) => Some(signable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepted by the network, not yet mined.
    Unproven,
    /// Signed and held on request.
    NoSend,
    /// Broadcast failed in a way that may pass on resubmission.
    Held,
}

/// A signed transaction with its Atomic BEEF.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub txid: Hash,
    pub transaction: Transaction,
    pub beef: Beef,
    pub status: TransactionStatus,
    /// Change created by a no-send action, for the next action in the chain.
    pub no_send_change: Vec<Outpoint>,
    pub send_with_results: Vec<SendWithResult>,
}

/// An unsigned transaction waiting for external unlocking scripts.
#[derive(Debug, Clone)]
pub struct SignableTransaction {
    pub reference: String,
    /// Atomic BEEF of the unsigned transaction.
    pub beef: Beef,
    pub awaiting: AwaitingInputs,
}

impl SignableTransaction {
    /// The unsigned transaction with every input's source output attached,
    /// ready for sighash computation.
    pub fn transaction(&self) -> Result<Transaction, ActionError> {
        let txid = self
            .beef
            .atomic_txid
            .ok_or_else(|| ActionError::Validation("signable BEEF is not atomic".into()))?;
        Ok(self.beef.find_atomic_transaction(&txid)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendWithResult {
    pub txid: Hash,
    pub status: SendWithStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendWithStatus {
    Unproven,
    Failed { retryable: bool, description: String },
}

impl SendWithResult {
    pub(crate) fn unproven(txid: Hash) -> Self {
        SendWithResult { txid, status: SendWithStatus::Unproven }
    }

    pub(crate) fn failed(txid: Hash, retryable: bool, description: impl Into<String>) -> Self {
        SendWithResult {
            txid,
            status: SendWithStatus::Failed { retryable, description: description.into() },
        }
    }

    pub fn is_unproven(&self) -> bool {
        self.status == SendWithStatus::Unproven
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.status, SendWithStatus::Failed { retryable: false, .. })
    }
}

/// Overrides applied when completing a signable transaction.
#[derive(Debug, Clone, Default)]
pub struct FinalizeOptions {
    pub accept_delayed_broadcast: Option<bool>,
    pub no_send: Option<bool>,
}
