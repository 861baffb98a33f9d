/// Errors from script parsing, building and address handling.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("invalid script: {0}")]
    InvalidScript(String),

    /// An ASM token was neither an opcode name nor hex.
    #[error("invalid opcode data")]
    InvalidOpcodeData,

    #[error("use a push helper for push opcode {0}")]
    InvalidOpcodeType(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("script is empty")]
    EmptyScript,

    #[error("not a P2PKH")]
    NotP2PKH,

    /// A push ran past the end of the script.
    #[error("not enough data")]
    DataTooSmall,

    #[error("data too big")]
    DataTooBig,

    #[error("checksum failed")]
    EncodingChecksumFailed,

    #[error("primitives error: {0}")]
    Primitives(#[from] bsv_primitives::PrimitivesError),
}
