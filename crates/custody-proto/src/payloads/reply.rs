//! Server replies.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::Pubkey;

/// Lifecycle status of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MaterialStatus {
    /// Custody may change hands.
    #[default]
    InTransit = 0,
    /// Held back; transfers are refused.
    Quarantined = 1,
}

impl MaterialStatus {
    /// Whether transfers are refused.
    pub fn is_quarantined(self) -> bool {
        self == Self::Quarantined
    }
}

impl TryFrom<u8> for MaterialStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::InTransit),
            1 => Ok(Self::Quarantined),
            other => Err(other),
        }
    }
}

/// Current state of one material record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialView {
    /// Record address.
    pub record: Pubkey,
    /// Stored identifier (at most 20 bytes of the original).
    pub material_id: String,
    /// Present custodian.
    pub current_holder: Pubkey,
    /// Number of transfers so far.
    pub last_sequence: u64,
    /// Lifecycle status.
    pub status: MaterialStatus,
}

/// One entry of a record's custody history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Record sequence after this transfer (first transfer is 1).
    pub sequence: u64,
    /// Holder before the transfer.
    pub from: Pubkey,
    /// Holder after the transfer.
    pub to: Pubkey,
    /// Server wall-clock time, unix seconds.
    pub timestamp: u64,
    /// Notes supplied by the previous holder.
    pub notes: String,
}

/// Registered signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    /// Signer key.
    pub pubkey: Pubkey,
    /// Role label.
    pub role: String,
    /// Number of registrations accepted for this key.
    pub sequence: u64,
}

/// Request accepted with nothing further to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Request being acknowledged.
    pub request_id: u64,
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum ErrorCode {
    /// Frame body could not be decoded, or a reply opcode was sent.
    MalformedRequest = 1,
    /// Material id empty or too long.
    InvalidMaterialId = 2,
    /// Provisioning program is not the system program.
    InvalidSystemProgram = 3,
    /// Record address does not match the material id.
    AddressMismatch = 4,
    /// Signature missing, malformed, or not valid for the signer.
    InvalidSignature = 5,
    /// Record already exists.
    RecordAlreadyExists = 6,
    /// Record does not exist.
    RecordNotFound = 7,
    /// Signer is not the current holder.
    Unauthorized = 8,
    /// Record moved on since the signer observed it.
    StaleSequence = 9,
    /// Sequence counter exhausted.
    SequenceOverflow = 10,
    /// Material is quarantined.
    Quarantined = 11,
    /// A text field exceeds its limit.
    FieldTooLong = 12,
    /// Storage failed; the request may be retried.
    StorageFailure = 13,
    /// Server-side bug.
    Internal = 14,
    /// Key is not in the signer registry.
    SignerNotFound = 15,
}

/// Rejection reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Machine-readable reason.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}
