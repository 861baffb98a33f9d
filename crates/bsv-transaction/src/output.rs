//! Transaction output: a satoshi value and the script that locks it.

use bsv_primitives::util::{BsvReader, BsvWriter};
use bsv_script::Script;

use crate::TransactionError;

/// A transaction output.
///
/// Wire form: 8-byte LE satoshis, VarInt script length, script bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionOutput {
    pub satoshis: u64,
    pub locking_script: Script,
}

impl TransactionOutput {
    pub fn new(satoshis: u64, locking_script: Script) -> Self {
        TransactionOutput { satoshis, locking_script }
    }

    pub fn read_from(reader: &mut BsvReader) -> Result<Self, TransactionError> {
        let satoshis = reader.read_u64_le()?;
        let script = reader.read_var_bytes()?;
        Ok(TransactionOutput {
            satoshis,
            locking_script: Script::from_bytes(script),
        })
    }

    pub fn write_to(&self, writer: &mut BsvWriter) {
        writer.write_u64_le(self.satoshis);
        writer.write_var_bytes(self.locking_script.to_bytes());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BsvWriter::new();
        self.write_to(&mut writer);
        writer.into_bytes()
    }
}
