//! Cryptographic error types.

use thiserror::Error;

/// Errors from key handling and signature checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Keypair bytes are the wrong length or the halves disagree.
    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),

    /// Public key bytes are not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature is not 64 bytes.
    #[error("signature must be 64 bytes, got {0}")]
    SignatureLength(usize),

    /// Signature does not verify for the key and message.
    #[error("signature verification failed")]
    VerificationFailed,
}
