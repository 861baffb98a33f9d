//! Script handling for the BSV wallet engine.
//!
//! Provides the [`Script`] byte newtype, opcode constants, chunk decoding with
//! minimal push encoding, and Base58Check P2PKH addresses.

pub mod script;
pub mod opcodes;
pub mod chunk;
pub mod address;

mod error;
pub use error::ScriptError;
pub use script::Script;
pub use address::{Address, Network};
pub use chunk::ScriptChunk;
