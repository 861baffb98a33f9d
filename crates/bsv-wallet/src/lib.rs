//! Key material and script templates for the BSV wallet engine.
//!
//! [`KeyDeriver`] implements BRC-42/43 derivation behind the
//! [`KeyMaterialProvider`] seam; [`template::ScriptTemplate`] locks and
//! unlocks P2PKH, BRC-29 and PushDrop outputs.

mod error;
pub use error::WalletError;

pub mod types;
pub mod key_deriver;
pub mod template;

pub use key_deriver::{KeyDeriver, KeyMaterialProvider};
pub use template::{ScriptTemplate, UnlockGenerator};
pub use types::{Counterparty, Protocol};
