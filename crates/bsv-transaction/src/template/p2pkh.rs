//! Pay-to-Public-Key-Hash template.

use bsv_primitives::ec::PrivateKey;
use bsv_script::{Address, Script};

use crate::sighash::SIGHASH_ALL_FORKID;
use crate::template::{signature_with_flag, UnlockingScriptTemplate};
use crate::transaction::Transaction;
use crate::TransactionError;

/// Upper bound on `<sig> <pubkey>`: 1 + 73 + 1 + 33, rounded to 108.
pub const UNLOCK_ESTIMATE: usize = 108;

pub fn lock(address: &Address) -> Script {
    address.locking_script()
}

/// Signer for P2PKH inputs. `sighash_flag` defaults to ALL|FORKID.
pub fn unlock(private_key: PrivateKey, sighash_flag: Option<u32>) -> P2PKH {
    P2PKH {
        private_key,
        sighash_flag: sighash_flag.unwrap_or(SIGHASH_ALL_FORKID),
    }
}

pub struct P2PKH {
    private_key: PrivateKey,
    sighash_flag: u32,
}

impl UnlockingScriptTemplate for P2PKH {
    fn sign(&self, tx: &Transaction, input_index: usize) -> Result<Script, TransactionError> {
        let sig_hash = tx.calc_input_signature_hash(input_index, self.sighash_flag)?;
        let signature = self.private_key.sign(&sig_hash)?;

        let mut script = Script::new();
        script.append_push_data(&signature_with_flag(signature.to_der(), self.sighash_flag))?;
        script.append_push_data(&self.private_key.pub_key().to_compressed())?;
        Ok(script)
    }

    fn estimate_length(&self) -> usize {
        UNLOCK_ESTIMATE
    }
}
