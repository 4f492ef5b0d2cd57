//! Chain Custody Cryptographic Primitives
//!
//! This crate provides the cryptographic building blocks for the custody
//! protocol: ed25519 keypairs, instruction signature verification, and
//! deterministic derivation of record addresses.
//!
//! # Design
//!
//! All functions in this crate are pure. Key generation takes seed bytes
//! from the caller, enabling:
//!
//! - Deterministic testing with seeded RNG
//! - Sans-IO architecture compatibility
//! - No coupling to application-level abstractions
//!
//! # Security Properties
//!
//! - Holder Authentication: a write is accepted only with a signature by the
//!   key the instruction names as signer
//! - Domain Separation: each instruction type signs under its own tag
//! - Strict Verification: signatures are checked with `verify_strict`,
//!   rejecting small-order keys and malleable encodings

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod address;
mod error;
pub mod keys;

pub use address::{
    RECORD_ACCOUNT_NAME, account_discriminator, default_program_id, derive_record_address,
    parse_program_id, program_id_from_seed,
};
pub use error::CryptoError;
pub use keys::{Keypair, SIGNATURE_SIZE, verify, verify_instruction};
