//! Transaction input: the outpoint it spends plus its unlocking script.

use bsv_primitives::util::{BsvReader, BsvWriter, VarInt};
use bsv_script::Script;

use crate::outpoint::Outpoint;
use crate::output::TransactionOutput;
use crate::TransactionError;

/// Sequence number of a final input.
pub const DEFAULT_SEQUENCE_NUMBER: u32 = 0xFFFF_FFFF;

/// A transaction input.
///
/// | Field            | Size          |
/// |------------------|---------------|
/// | outpoint         | 36 bytes      |
/// | script length    | VarInt        |
/// | unlocking_script | variable      |
/// | sequence_number  | 4 bytes (LE)  |
///
/// `source_output` is local metadata: the output being spent, needed to
/// compute the FORKID sighash. It is never serialized.
#[derive(Clone, Debug)]
pub struct TransactionInput {
    pub outpoint: Outpoint,
    pub sequence_number: u32,
    /// `None` until the input is signed; serializes as an empty script.
    pub unlocking_script: Option<Script>,
    pub source_output: Option<TransactionOutput>,
}

impl TransactionInput {
    pub fn new(outpoint: Outpoint) -> Self {
        TransactionInput {
            outpoint,
            sequence_number: DEFAULT_SEQUENCE_NUMBER,
            unlocking_script: None,
            source_output: None,
        }
    }

    /// An input spending `outpoint` whose source output is already known.
    pub fn with_source(outpoint: Outpoint, source: TransactionOutput) -> Self {
        TransactionInput {
            source_output: Some(source),
            ..Self::new(outpoint)
        }
    }

    pub fn read_from(reader: &mut BsvReader) -> Result<Self, TransactionError> {
        let outpoint = Outpoint::read_from(reader)?;
        let script = reader.read_var_bytes()?;
        let sequence_number = reader.read_u32_le()?;
        Ok(TransactionInput {
            outpoint,
            sequence_number,
            unlocking_script: (!script.is_empty()).then(|| Script::from_bytes(script)),
            source_output: None,
        })
    }

    pub fn write_to(&self, writer: &mut BsvWriter) {
        self.outpoint.write_to(writer);
        match &self.unlocking_script {
            Some(script) => writer.write_var_bytes(script.to_bytes()),
            None => writer.write_varint(VarInt(0)),
        }
        writer.write_u32_le(self.sequence_number);
    }

    pub fn source_satoshis(&self) -> Option<u64> {
        self.source_output.as_ref().map(|o| o.satoshis)
    }

    pub fn source_locking_script(&self) -> Option<&Script> {
        self.source_output.as_ref().map(|o| &o.locking_script)
    }
}
