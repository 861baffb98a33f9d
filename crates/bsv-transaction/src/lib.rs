//! Transaction model, wire format and FORKID signing.

pub mod input;
pub mod outpoint;
pub mod output;
pub mod sighash;
pub mod template;
pub mod transaction;

mod error;
pub use error::TransactionError;
pub use input::TransactionInput;
pub use outpoint::{Outpoint, OutpointParseError};
pub use output::TransactionOutput;
pub use transaction::Transaction;
