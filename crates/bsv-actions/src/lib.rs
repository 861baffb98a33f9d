//! Action construction, two-phase signing and deferred batch broadcast.
//!
//! A [`WalletEngine`] turns an [`Action`] (outputs to create, optional
//! explicit inputs) into a funded, signed transaction packaged with Atomic
//! BEEF evidence. Inputs the engine cannot sign come back as a
//! [`SignableTransaction`] to be completed with
//! [`WalletEngine::finalize`]. No-send actions are held and chained with a
//! [`BatchChainer`], then broadcast together.

mod error;
pub use error::{ActionError, ReferenceError, StoreError};

pub mod action;
pub mod batch;
mod builder;
pub mod config;
pub mod engine;
pub mod internalize;
pub mod janitor;
mod signer;
pub mod store;

pub use action::{
    Action, ActionInput, ActionOptions, ActionOutput, AwaitingInputs, BuildOutcome, Finalized,
    FinalizeOptions, SendWithResult, SendWithStatus, SignableTransaction, Spends,
    TransactionStatus,
};
pub use batch::{BatchChainer, ChainId, ChangeForward, MintOutcome};
pub use builder::estimate_size;
pub use config::{EngineConfig, InputSelection};
pub use engine::{Balance, WalletEngine};
pub use internalize::{InternalizeOutcome, InternalizeOutput, PaymentRemittance};
pub use janitor::{InvalidChange, InvalidReason};
pub use store::{ChangeOutput, ChangeStore, MemoryChangeStore, OutputStatus};
