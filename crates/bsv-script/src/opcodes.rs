//! Opcode byte values and their ASM names.
//!
//! Only the opcodes the wallet templates and ASM tooling touch are named;
//! every other byte renders as `OP_UNKNOWN<n>`.

pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = 0x00;
pub const OP_DATA_1: u8 = 0x01;
pub const OP_DATA_20: u8 = 0x14;
pub const OP_DATA_33: u8 = 0x21;
pub const OP_DATA_75: u8 = 0x4b;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;

const NAMED: &[(u8, &str)] = &[
    (OP_0, "OP_0"),
    (OP_PUSHDATA1, "OP_PUSHDATA1"),
    (OP_PUSHDATA2, "OP_PUSHDATA2"),
    (OP_PUSHDATA4, "OP_PUSHDATA4"),
    (OP_1NEGATE, "OP_1NEGATE"),
    (OP_NOP, "OP_NOP"),
    (OP_IF, "OP_IF"),
    (OP_NOTIF, "OP_NOTIF"),
    (OP_VERIF, "OP_VERIF"),
    (OP_VERNOTIF, "OP_VERNOTIF"),
    (OP_ELSE, "OP_ELSE"),
    (OP_ENDIF, "OP_ENDIF"),
    (OP_VERIFY, "OP_VERIFY"),
    (OP_RETURN, "OP_RETURN"),
    (OP_2DROP, "OP_2DROP"),
    (OP_DROP, "OP_DROP"),
    (OP_DUP, "OP_DUP"),
    (OP_SWAP, "OP_SWAP"),
    (OP_EQUAL, "OP_EQUAL"),
    (OP_EQUALVERIFY, "OP_EQUALVERIFY"),
    (OP_SHA256, "OP_SHA256"),
    (OP_HASH160, "OP_HASH160"),
    (OP_CHECKSIG, "OP_CHECKSIG"),
    (OP_CHECKSIGVERIFY, "OP_CHECKSIGVERIFY"),
    (OP_CHECKMULTISIG, "OP_CHECKMULTISIG"),
];

/// ASM name of `op`. Small-integer opcodes render as `OP_1`..`OP_16`.
pub fn opcode_to_string(op: u8) -> String {
    if (OP_1..=OP_16).contains(&op) {
        return format!("OP_{}", op - OP_1 + 1);
    }
    NAMED
        .iter()
        .find(|(code, _)| *code == op)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("OP_UNKNOWN{}", op))
}

/// Inverse of [`opcode_to_string`] for named opcodes. `OP_FALSE` and
/// `OP_TRUE` are accepted as aliases.
pub fn string_to_opcode(name: &str) -> Option<u8> {
    match name {
        "OP_FALSE" => return Some(OP_FALSE),
        "OP_TRUE" => return Some(OP_TRUE),
        _ => {}
    }
    if let Some(n) = name.strip_prefix("OP_").and_then(|s| s.parse::<u8>().ok()) {
        if (1..=16).contains(&n) {
            return Some(OP_1 + n - 1);
        }
    }
    NAMED.iter().find(|(_, n)| *n == name).map(|(code, _)| *code)
}

/// Opcode that pushes the small integer `n` (0..=16) onto the stack.
pub fn small_int_opcode(n: u8) -> Option<u8> {
    match n {
        0 => Some(OP_0),
        1..=16 => Some(OP_1 + n - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_resolve_both_ways() {
        for op in [OP_0, OP_DUP, OP_HASH160, OP_CHECKSIG, OP_2DROP, OP_1NEGATE] {
            assert_eq!(string_to_opcode(&opcode_to_string(op)), Some(op));
        }
        assert_eq!(opcode_to_string(0x5a), "OP_10");
        assert_eq!(string_to_opcode("OP_16"), Some(OP_16));
        assert_eq!(string_to_opcode("OP_17"), None);
        assert_eq!(opcode_to_string(0xba), "OP_UNKNOWN186");
    }

    #[test]
    fn test_small_int_opcode() {
        assert_eq!(small_int_opcode(0), Some(OP_0));
        assert_eq!(small_int_opcode(1), Some(OP_1));
        assert_eq!(small_int_opcode(16), Some(OP_16));
        assert_eq!(small_int_opcode(17), None);
    }
}
