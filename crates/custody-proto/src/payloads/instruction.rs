//! Signed write instructions.
//!
//! Each instruction names the key that must sign it and carries the
//! signature. The signed message is built by [`SignedInstruction::signing_bytes`]
//! from fixed-width fields and length-prefixed strings under a per-instruction
//! domain tag, so the CBOR encoding never influences what is signed.

use serde::{Deserialize, Serialize};

use crate::Pubkey;

/// Common surface of instructions that must carry a valid signature.
pub trait SignedInstruction {
    /// Key whose signature authorizes the instruction.
    fn signer(&self) -> &Pubkey;

    /// Signature bytes as received (64 bytes when well-formed).
    fn signature(&self) -> &[u8];

    /// Attach a signature.
    fn set_signature(&mut self, signature: Vec<u8>);

    /// Canonical message covered by the signature.
    fn signing_bytes(&self) -> Vec<u8>;
}

/// Create a material record with the signer as initial holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeMaterial {
    /// Identifier supplied by the initializer.
    pub material_id: String,
    /// Address of the record to create (derived from the id).
    pub record: Pubkey,
    /// Initial holder and signer.
    pub initializer: Pubkey,
    /// Provisioning program; must be the system program id.
    pub system_program: Pubkey,
    /// Signature by `initializer`.
    pub signature: Vec<u8>,
}

/// Hand custody of a material to a new holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMaterial {
    /// Record being transferred.
    pub record: Pubkey,
    /// Present holder and signer.
    pub current_holder: Pubkey,
    /// Holder after the transfer.
    pub new_holder: Pubkey,
    /// The record's `last_sequence` the signer observed.
    pub expected_sequence: u64,
    /// Free-form handover notes kept in the custody history.
    pub notes: String,
    /// Signature by `current_holder`.
    pub signature: Vec<u8>,
}

/// Quarantine a material. Quarantined materials cannot be transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineMaterial {
    /// Record to quarantine.
    pub record: Pubkey,
    /// Present holder and signer.
    pub authority: Pubkey,
    /// The record's `last_sequence` the signer observed.
    pub expected_sequence: u64,
    /// Why the material is held back.
    pub reason: String,
    /// Signature by `authority`.
    pub signature: Vec<u8>,
}

/// Register a signer key with a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSigner {
    /// Key being registered; proves possession by signing.
    pub signer: Pubkey,
    /// Role label (e.g. "transporter").
    pub role: String,
    /// Registration count of `signer` this instruction was built against.
    pub expected_sequence: u64,
    /// Signature by `signer`.
    pub signature: Vec<u8>,
}

const INITIALIZE_DOMAIN: &[u8] = b"chaincustody/v1/initialize_material";
const TRANSFER_DOMAIN: &[u8] = b"chaincustody/v1/transfer_material";
const QUARANTINE_DOMAIN: &[u8] = b"chaincustody/v1/quarantine_material";
const REGISTER_DOMAIN: &[u8] = b"chaincustody/v1/register_signer";

/// Builder for canonical signing messages.
struct SigningMessage(Vec<u8>);

impl SigningMessage {
    fn new(domain: &[u8]) -> Self {
        let mut msg = Self(Vec::with_capacity(160));
        msg.bytes(domain);
        msg
    }

    fn key(mut self, key: &Pubkey) -> Self {
        self.0.extend_from_slice(key.as_bytes());
        self
    }

    fn u64(mut self, value: u64) -> Self {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn text(mut self, value: &str) -> Self {
        self.bytes(value.as_bytes());
        self
    }

    fn bytes(&mut self, value: &[u8]) {
        let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.0.extend_from_slice(&len.to_be_bytes());
        self.0.extend_from_slice(value);
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

impl SignedInstruction for InitializeMaterial {
    fn signer(&self) -> &Pubkey {
        &self.initializer
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn signing_bytes(&self) -> Vec<u8> {
        SigningMessage::new(INITIALIZE_DOMAIN)
            .key(&self.record)
            .key(&self.initializer)
            .key(&self.system_program)
            .text(&self.material_id)
            .finish()
    }
}

impl SignedInstruction for TransferMaterial {
    fn signer(&self) -> &Pubkey {
        &self.current_holder
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn signing_bytes(&self) -> Vec<u8> {
        SigningMessage::new(TRANSFER_DOMAIN)
            .key(&self.record)
            .key(&self.current_holder)
            .key(&self.new_holder)
            .u64(self.expected_sequence)
            .text(&self.notes)
            .finish()
    }
}

impl SignedInstruction for QuarantineMaterial {
    fn signer(&self) -> &Pubkey {
        &self.authority
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn signing_bytes(&self) -> Vec<u8> {
        SigningMessage::new(QUARANTINE_DOMAIN)
            .key(&self.record)
            .key(&self.authority)
            .u64(self.expected_sequence)
            .text(&self.reason)
            .finish()
    }
}

impl SignedInstruction for RegisterSigner {
    fn signer(&self) -> &Pubkey {
        &self.signer
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn signing_bytes(&self) -> Vec<u8> {
        SigningMessage::new(REGISTER_DOMAIN)
            .key(&self.signer)
            .u64(self.expected_sequence)
            .text(&self.role)
            .finish()
    }
}
