//! Client error types.

use custody_proto::{Opcode, ProtocolError, Pubkey};
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Material id is empty or too long.
    #[error("invalid material id: {reason}")]
    InvalidMaterialId {
        /// Why the id was rejected.
        reason: String,
    },

    /// A write needs the record's sequence, but the record was never fetched.
    #[error("record {record} not fetched yet")]
    UnknownRecord {
        /// The record address.
        record: Pubkey,
    },

    /// A reply arrived for a request that is not pending (already answered
    /// or timed out).
    #[error("no pending request {request_id}")]
    UnknownRequest {
        /// Request id echoed by the reply.
        request_id: u64,
    },

    /// The reply body does not answer the request it names.
    #[error("unexpected {opcode:?} reply to request {request_id}")]
    UnexpectedReply {
        /// Request being answered.
        request_id: u64,
        /// Opcode of the reply.
        opcode: Opcode,
    },

    /// Frame parsing or validation failed.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Description of the frame error.
        reason: String,
    },

    /// An outgoing request could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors mean the server spoke the protocol wrongly or the client
    /// built a request it cannot send. Everything else is a caller mistake
    /// or a late reply and can be recovered by fetching or retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidFrame { .. } | Self::UnexpectedReply { .. } | Self::Protocol(_) => true,

            Self::InvalidMaterialId { .. }
            | Self::UnknownRecord { .. }
            | Self::UnknownRequest { .. } => false,
        }
    }
}
