//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame did not start with the protocol magic.
    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Frame version is not supported by this build.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Header's reserved field is not zero.
    #[error("reserved header field set: {0:#010x}")]
    ReservedNotZero(u32),

    /// Opcode byte does not name a known message.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Body exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Declared or actual body size.
        size: usize,
        /// Maximum allowed body size.
        max: usize,
    },

    /// Not enough bytes for the header or the declared body.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Extra bytes after the declared body.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Body could not be serialized.
    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),

    /// Body could not be deserialized for its opcode.
    #[error("CBOR decoding failed: {0}")]
    CborDecode(String),

    /// Public key text was not 64 hex characters.
    #[error("invalid public key: {0}")]
    InvalidPubkey(String),

    /// Material id was empty or too long.
    #[error("invalid material id: {0}")]
    InvalidMaterialId(String),
}
