//! Chain custody wire protocol.
//!
//! Every message on the wire is a [`Frame`]: a fixed 24-byte big-endian
//! [`FrameHeader`] followed by a CBOR-encoded body. The header's opcode
//! selects the body type, see [`Payload`].
//!
//! ```text
//! +-------+-----+------+-------+------------+--------------+----------+
//! | magic | ver | op   | flags | request_id | payload_size | reserved |
//! | u32   | u8  | u8   | u16   | u64        | u32          | u32      |
//! +-------+-----+------+-------+------------+--------------+----------+
//! ```
//!
//! Write instructions carry an ed25519 signature over their canonical
//! signing bytes (see [`SignedInstruction`]). Signing and verification live
//! in `custody-crypto`; this crate only defines what gets signed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod opcode;
pub mod payloads;
mod pubkey;

pub use errors::ProtocolError;
pub use frame::{Frame, FrameFlags, FrameHeader};
pub use opcode::Opcode;
pub use payloads::{
    Ack, ErrorCode, ErrorReply, FetchMaterial, FetchSigner, InitializeMaterial, ListMaterials,
    ListSigners,
    ListTransfers, MaterialStatus, MaterialView, Payload, QuarantineMaterial, RegisterSigner,
    SignedInstruction, SignerEntry, TransferMaterial, TransferRecord,
};
pub use pubkey::{MaterialId, Pubkey, SYSTEM_PROGRAM_ID};

/// Number of material id bytes kept in a stored record.
pub const MAX_ID_LEN: usize = 20;

/// Longest material id accepted on the wire, in bytes.
pub const MAX_MATERIAL_ID_LEN: usize = 64;

/// Longest transfer note or quarantine reason, in bytes.
pub const MAX_NOTES_LEN: usize = 256;

/// Longest signer role, in bytes.
pub const MAX_ROLE_LEN: usize = 64;

/// Largest frame body, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;
