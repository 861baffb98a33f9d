//! Unlocking-script templates.

pub mod p2pkh;

use bsv_script::Script;

use crate::transaction::Transaction;
use crate::TransactionError;

/// Something that can produce the unlocking script for one input.
///
/// `estimate_length` must be an upper bound on the length of whatever `sign`
/// returns; fee sizing relies on it before any signature exists.
pub trait UnlockingScriptTemplate {
    fn sign(&self, tx: &Transaction, input_index: usize) -> Result<Script, TransactionError>;

    fn estimate_length(&self) -> usize;
}

/// `<DER signature || sighash byte>` as pushed in an unlocking script.
pub(crate) fn signature_with_flag(der: Vec<u8>, sighash_flag: u32) -> Vec<u8> {
    let mut buf = der;
    buf.push(sighash_flag as u8);
    buf
}
