//! Deterministic addresses and account discriminators.
//!
//! A record's address is a SHA-256 digest over the program id and the full
//! material id, so any party that knows the id can locate the record
//! without a lookup table. Different deployments (program ids) never share
//! addresses.

use custody_proto::{MaterialId, Pubkey};
use sha2::{Digest, Sha256};

/// Account type name hashed into the stored record discriminator.
pub const RECORD_ACCOUNT_NAME: &str = "Material";

const RECORD_DOMAIN: &[u8] = b"chaincustody/record/v1";
const PROGRAM_DOMAIN: &[u8] = b"chaincustody/program/";
const DEFAULT_PROGRAM_SEED: &str = "chaincustody";

/// Address of the record for `material_id` under `program_id`.
pub fn derive_record_address(program_id: &Pubkey, material_id: &MaterialId) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(RECORD_DOMAIN);
    hasher.update(program_id.as_bytes());
    hasher.update(b"material");
    hasher.update(material_id.as_str().as_bytes());
    Pubkey::new(hasher.finalize().into())
}

/// Program id for a named deployment.
pub fn program_id_from_seed(seed: &str) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(PROGRAM_DOMAIN);
    hasher.update(seed.as_bytes());
    Pubkey::new(hasher.finalize().into())
}

/// Program id used when none is configured.
pub fn default_program_id() -> Pubkey {
    program_id_from_seed(DEFAULT_PROGRAM_SEED)
}

/// Resolve a configured program id.
///
/// A 64-character hex string is taken as the id itself; anything else is
/// treated as a deployment name and hashed with [`program_id_from_seed`].
pub fn parse_program_id(value: &str) -> Pubkey {
    value.parse().unwrap_or_else(|_| program_id_from_seed(value))
}

/// First eight bytes of `SHA-256("account:" || name)`.
///
/// Prefixed to every stored account so a record of one type can never be
/// decoded as another.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::new().chain_update(b"account:").chain_update(name.as_bytes()).finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}
