//! Ed25519 keypairs and signature verification.

use std::fmt;

use custody_proto::{Pubkey, SignedInstruction};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::CryptoError;

/// Size of an ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// An ed25519 signing identity.
///
/// The 64-byte serialized form is the secret seed followed by the public
/// key, the layout used by common wallet keypair files.
///
/// # Security
///
/// - **Debug Redaction**: `Debug` prints only the public key.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Serialized keypair size.
    pub const BYTES: usize = 64;

    /// Derive a keypair from a 32-byte secret seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(&seed) }
    }

    /// Load a keypair from its 64-byte serialized form.
    ///
    /// Rejects input whose public half does not match the secret half.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: &[u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeypair(format!("expected 64 bytes, got {}", bytes.len()))
        })?;
        let signing = SigningKey::from_keypair_bytes(array)
            .map_err(|_| CryptoError::InvalidKeypair("public key does not match secret".into()))?;
        Ok(Self { signing })
    }

    /// Serialize as secret seed followed by public key.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }

    /// Public key of this identity.
    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.signing.verifying_key().to_bytes())
    }

    /// Sign an arbitrary message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    /// Sign `instruction` in place over its canonical signing bytes.
    pub fn sign_instruction<I: SignedInstruction>(&self, instruction: &mut I) {
        let signature = self.sign(&instruction.signing_bytes());
        instruction.set_signature(signature.to_vec());
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey().to_string())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Verify `signature` over `message` for `pubkey`.
pub fn verify(pubkey: &Pubkey, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(CryptoError::SignatureLength(signature.len()));
    }
    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::SignatureLength(SIGNATURE_SIZE))?;
    let key =
        VerifyingKey::from_bytes(pubkey.as_bytes()).map_err(|_| CryptoError::InvalidPublicKey)?;

    key.verify_strict(message, &signature).map_err(|_| CryptoError::VerificationFailed)
}

/// Verify that an instruction is signed by the key it names as signer.
pub fn verify_instruction(instruction: &impl SignedInstruction) -> Result<(), CryptoError> {
    verify(instruction.signer(), &instruction.signing_bytes(), instruction.signature())
}
