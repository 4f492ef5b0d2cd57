//! Identities and material identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{MAX_ID_LEN, MAX_MATERIAL_ID_LEN, ProtocolError};

/// A 32-byte public key.
///
/// Custodians are ed25519 verifying keys. Record addresses and the program
/// id share the same representation. Text form is lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pubkey([u8; 32]);

/// Well-known id of the system program (all zero bytes).
///
/// Record creation must name it as the provisioning program.
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey([0u8; 32]);

impl Pubkey {
    /// Size of a key in bytes.
    pub const LEN: usize = 32;

    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a slice that must be exactly 32 bytes long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            ProtocolError::InvalidPubkey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps action dumps readable.
        write!(f, "Pubkey({}..)", &hex::encode(&self.0[..4]))
    }
}

impl FromStr for Pubkey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| ProtocolError::InvalidPubkey(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

/// Identifier of a tracked material, as supplied at creation.
///
/// Between 1 and [`MAX_MATERIAL_ID_LEN`] bytes of UTF-8. Only the first
/// [`MAX_ID_LEN`] bytes survive in the stored record; the full id still
/// feeds record address derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(String);

impl MaterialId {
    /// Validate and wrap an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProtocolError::InvalidMaterialId("empty".to_string()));
        }
        if id.len() > MAX_MATERIAL_ID_LEN {
            return Err(ProtocolError::InvalidMaterialId(format!(
                "{} bytes (max {MAX_MATERIAL_ID_LEN})",
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier bytes as stored in a record: truncated to [`MAX_ID_LEN`]
    /// and zero-padded.
    pub fn stored_bytes(&self) -> [u8; MAX_ID_LEN] {
        let mut out = [0u8; MAX_ID_LEN];
        let bytes = self.0.as_bytes();
        let len = bytes.len().min(MAX_ID_LEN);
        out[..len].copy_from_slice(&bytes[..len]);
        out
    }

    /// Recover display text from stored record bytes.
    ///
    /// Trailing zero padding is dropped; a multi-byte character cut by
    /// truncation renders as U+FFFD.
    pub fn from_stored(stored: &[u8; MAX_ID_LEN]) -> String {
        let end = stored.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&stored[..end]).into_owned()
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MaterialId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
