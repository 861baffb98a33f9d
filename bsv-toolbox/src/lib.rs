#![deny(missing_docs)]

//! BSV wallet toolbox.
//!
//! One dependency for the whole action engine: keys and script templates,
//! BEEF evidence, the [`actions`] engine and the ARC broadcaster.
//!
//! ```no_run
//! use bsv_toolbox::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeyDeriver::new(PrivateKey::from_bytes(&[7; 32])?);
//! let arc = ArcClient::new(ArcConfig::default())?;
//! let engine = WalletEngine::new(keys, MemoryChangeStore::new(), arc, EngineConfig::default());
//!
//! let pay = Script::p2pkh(&[0x11; 20]);
//! let outcome = engine.build(Action::new("pay a friend").with_output(ActionOutput::new(pay, 1_000))).await?;
//! if let Some(done) = outcome.into_finalized() {
//!     println!("{} {:?}", done.txid, done.status);
//! }
//! # Ok(())
//! # }
//! ```

pub use bsv_actions as actions;
pub use bsv_arc as arc;
pub use bsv_primitives as primitives;
pub use bsv_script as script;
pub use bsv_spv as spv;
pub use bsv_transaction as transaction;
pub use bsv_wallet as wallet;

/// The types most callers need.
pub mod prelude {
    pub use bsv_actions::{
        Action, ActionError, ActionInput, ActionOutput, BatchChainer, BuildOutcome, ChangeStore,
        EngineConfig, FinalizeOptions, MemoryChangeStore, MintOutcome, SignableTransaction, Spends,
        TransactionStatus, WalletEngine,
    };
    pub use bsv_arc::{ArcClient, ArcConfig};
    pub use bsv_primitives::ec::PrivateKey;
    pub use bsv_script::Script;
    pub use bsv_spv::{Beef, Broadcaster};
    pub use bsv_transaction::Outpoint;
    pub use bsv_wallet::{Counterparty, KeyDeriver, KeyMaterialProvider, ScriptTemplate};
}
