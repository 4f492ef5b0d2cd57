//! Driver error types.

use custody_proto::ProtocolError;
use thiserror::Error;

/// Errors from `ServerDriver::process_event`.
///
/// Rejected requests are not driver errors; they are answered with an error
/// reply frame. These variants mean the event itself could not be handled.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Frame or close event for a session that was never accepted.
    #[error("unknown session: {0}")]
    UnknownSession(u64),

    /// Accept event reused a live session id.
    #[error("session already registered: {0}")]
    SessionExists(u64),

    /// A reply frame could not be encoded.
    #[error("reply encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}

impl DriverError {
    /// Returns true if the connection that caused this error should be
    /// dropped.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownSession(_) | Self::SessionExists(_) => true,
            Self::Encode(_) => false,
        }
    }
}
