//! Custody program errors.

use custody_crypto::CryptoError;
use custody_proto::{ErrorCode, Pubkey};
use thiserror::Error;

use crate::storage::StorageError;

/// Reasons the custody program rejects an instruction or query.
///
/// Every variant maps onto a wire [`ErrorCode`]. A rejected instruction
/// leaves storage untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// Material id is empty or longer than allowed.
    #[error("invalid material id: {0}")]
    InvalidMaterialId(String),

    /// Provisioning program is not the system program.
    #[error("invalid system program: {0}")]
    InvalidSystemProgram(Pubkey),

    /// Supplied record address is not the one derived from the id.
    #[error("record address mismatch: expected {expected}, got {actual}")]
    AddressMismatch {
        /// Derived address
        expected: Pubkey,
        /// Supplied address
        actual: Pubkey,
    },

    /// Signature missing or invalid for the named signer.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),

    /// A record already exists at the address.
    #[error("record already exists: {0}")]
    RecordAlreadyExists(Pubkey),

    /// No record at the address.
    #[error("record not found: {0}")]
    RecordNotFound(Pubkey),

    /// Key is not in the signer registry.
    #[error("signer not found: {0}")]
    SignerNotFound(Pubkey),

    /// Signer is not the record's current holder.
    #[error("unauthorized: holder is {holder}, signer is {signer}")]
    Unauthorized {
        /// Current holder of the record
        holder: Pubkey,
        /// Key that signed the instruction
        signer: Pubkey,
    },

    /// The record (or signer entry) moved on since the signer observed it.
    #[error("stale sequence: record is at {current}, instruction expects {expected}")]
    StaleSequence {
        /// Stored sequence
        current: u64,
        /// Instruction's `expected_sequence`
        expected: u64,
    },

    /// Sequence counter cannot advance further.
    #[error("sequence overflow")]
    SequenceOverflow,

    /// Material is quarantined and cannot change hands.
    #[error("material is quarantined: {0}")]
    Quarantined(Pubkey),

    /// A text field exceeds its limit.
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length in bytes
        len: usize,
        /// Limit in bytes
        max: usize,
    },

    /// Storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ProgramError {
    /// Wire error code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidMaterialId(_) => ErrorCode::InvalidMaterialId,
            Self::InvalidSystemProgram(_) => ErrorCode::InvalidSystemProgram,
            Self::AddressMismatch { .. } => ErrorCode::AddressMismatch,
            Self::InvalidSignature(_) => ErrorCode::InvalidSignature,
            Self::RecordAlreadyExists(_) => ErrorCode::RecordAlreadyExists,
            Self::RecordNotFound(_) => ErrorCode::RecordNotFound,
            Self::SignerNotFound(_) => ErrorCode::SignerNotFound,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::StaleSequence { .. } => ErrorCode::StaleSequence,
            Self::SequenceOverflow => ErrorCode::SequenceOverflow,
            Self::Quarantined(_) => ErrorCode::Quarantined,
            Self::FieldTooLong { .. } => ErrorCode::FieldTooLong,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_storage_is_retryable() {
        let err = ProgramError::Storage(StorageError::Io("disk".into()));
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::StorageFailure);
    }

    #[test]
    fn corrupt_storage_is_not_retryable() {
        let err = ProgramError::Storage(StorageError::Corrupt("bad".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn authorization_errors_are_final() {
        let (holder, signer) = (Pubkey::new([1; 32]), Pubkey::new([2; 32]));
        let err = ProgramError::Unauthorized { holder, signer };
        assert!(!err.is_retryable());
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn error_display() {
        let err = ProgramError::StaleSequence { current: 3, expected: 2 };
        assert_eq!(err.to_string(), "stale sequence: record is at 3, instruction expects 2");
    }
}
