//! Script chunk decoding and push-data encoding.

use crate::opcodes::*;
use crate::ScriptError;

/// One parsed element of a script: a bare opcode or a data push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptChunk {
    /// Opcode byte. For direct pushes this is the pushed length.
    pub op: u8,
    /// Payload of a push. `OP_RETURN` outside a conditional carries the rest
    /// of the script here.
    pub data: Option<Vec<u8>>,
}

impl ScriptChunk {
    /// ASM token: pushed data as hex, otherwise the opcode name.
    pub fn to_asm_string(&self) -> String {
        match &self.data {
            Some(data) if (OP_DATA_1..=OP_PUSHDATA4).contains(&self.op) => hex::encode(data),
            _ => opcode_to_string(self.op),
        }
    }

    /// The value this chunk leaves on the stack when it is a push, including
    /// the small-integer opcodes. `None` for every other opcode.
    pub fn pushed_value(&self) -> Option<Vec<u8>> {
        match self.op {
            OP_0 => Some(Vec::new()),
            OP_1NEGATE => Some(vec![0x81]),
            OP_1..=OP_16 => Some(vec![self.op - OP_1 + 1]),
            OP_DATA_1..=OP_PUSHDATA4 => self.data.clone(),
            _ => None,
        }
    }
}

fn take<'a>(bytes: &'a [u8], pos: usize, len: usize) -> Result<&'a [u8], ScriptError> {
    let end = pos.checked_add(len).ok_or(ScriptError::DataTooSmall)?;
    bytes.get(pos..end).ok_or(ScriptError::DataTooSmall)
}

/// Split raw script bytes into chunks.
///
/// Truncated pushes fail with [`ScriptError::DataTooSmall`].
pub fn decode_script(bytes: &[u8]) -> Result<Vec<ScriptChunk>, ScriptError> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut depth: i32 = 0;

    while pos < bytes.len() {
        let op = bytes[pos];
        pos += 1;

        let (header, len) = match op {
            OP_DATA_1..=OP_DATA_75 => (0, op as usize),
            OP_PUSHDATA1 => (1, take(bytes, pos, 1)?[0] as usize),
            OP_PUSHDATA2 => {
                let b = take(bytes, pos, 2)?;
                (2, u16::from_le_bytes([b[0], b[1]]) as usize)
            }
            OP_PUSHDATA4 => {
                let b = take(bytes, pos, 4)?;
                (4, u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            }
            OP_RETURN if depth == 0 => {
                chunks.push(ScriptChunk { op, data: Some(bytes[pos - 1..].to_vec()) });
                break;
            }
            _ => {
                match op {
                    OP_IF | OP_NOTIF | OP_VERIF | OP_VERNOTIF => depth += 1,
                    OP_ENDIF => depth -= 1,
                    _ => {}
                }
                chunks.push(ScriptChunk { op, data: None });
                continue;
            }
        };

        pos += header;
        let data = take(bytes, pos, len)?.to_vec();
        pos += len;
        chunks.push(ScriptChunk { op, data: Some(data) });
    }

    Ok(chunks)
}

/// Length prefix for a push of `data_len` bytes, choosing the shortest form.
pub fn push_data_prefix(data_len: usize) -> Result<Vec<u8>, ScriptError> {
    let prefix = match data_len {
        0..=0x4b => vec![data_len as u8],
        0x4c..=0xff => vec![OP_PUSHDATA1, data_len as u8],
        0x100..=0xffff => {
            let mut p = vec![OP_PUSHDATA2];
            p.extend_from_slice(&(data_len as u16).to_le_bytes());
            p
        }
        _ => {
            let len = u32::try_from(data_len).map_err(|_| ScriptError::DataTooBig)?;
            let mut p = vec![OP_PUSHDATA4];
            p.extend_from_slice(&len.to_le_bytes());
            p
        }
    };
    Ok(prefix)
}

/// Minimally encoded push of `data`.
///
/// Empty data is `OP_0`, a single byte 1..=16 is `OP_1`..`OP_16`, `0x81` is
/// `OP_1NEGATE`; anything else is a length-prefixed push.
pub fn encode_minimal_push(data: &[u8]) -> Result<Vec<u8>, ScriptError> {
    match data {
        [] => Ok(vec![OP_0]),
        [n @ 1..=16] => Ok(vec![OP_1 + n - 1]),
        [0x81] => Ok(vec![OP_1NEGATE]),
        _ => {
            let mut out = push_data_prefix(data.len())?;
            out.extend_from_slice(data);
            Ok(out)
        }
    }
}
