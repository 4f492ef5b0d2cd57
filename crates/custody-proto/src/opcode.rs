//! Message opcodes.

use crate::ProtocolError;

/// Identifies the body type carried by a frame.
///
/// Requests live below `0x80`, replies at `0x80` and above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Create a material record.
    InitializeMaterial = 0x01,
    /// Hand custody to a new holder.
    TransferMaterial = 0x02,
    /// Mark a material as quarantined.
    QuarantineMaterial = 0x03,
    /// Register a signer and its role.
    RegisterSigner = 0x04,

    /// Read one material record.
    FetchMaterial = 0x10,
    /// Read all material records.
    ListMaterials = 0x11,
    /// Read a record's custody history.
    ListTransfers = 0x12,
    /// Read the signer registry.
    ListSigners = 0x13,
    /// Read one signer registry entry.
    FetchSigner = 0x14,

    /// One material view.
    Material = 0x80,
    /// Several material views.
    Materials = 0x81,
    /// Custody history entries.
    Transfers = 0x82,
    /// Signer registry entries.
    Signers = 0x83,
    /// Request accepted, nothing to return.
    Ack = 0x84,
    /// One signer registry entry.
    Signer = 0x85,
    /// Request rejected.
    Error = 0xFF,
}

impl Opcode {
    /// Raw opcode byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this opcode is sent by the server in answer to a request.
    pub const fn is_reply(self) -> bool {
        (self as u8) >= 0x80
    }

    /// Whether this opcode mutates ledger state and must be signed.
    pub const fn is_instruction(self) -> bool {
        matches!(
            self,
            Self::InitializeMaterial
                | Self::TransferMaterial
                | Self::QuarantineMaterial
                | Self::RegisterSigner
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x01 => Self::InitializeMaterial,
            0x02 => Self::TransferMaterial,
            0x03 => Self::QuarantineMaterial,
            0x04 => Self::RegisterSigner,
            0x10 => Self::FetchMaterial,
            0x11 => Self::ListMaterials,
            0x12 => Self::ListTransfers,
            0x13 => Self::ListSigners,
            0x14 => Self::FetchSigner,
            0x80 => Self::Material,
            0x81 => Self::Materials,
            0x82 => Self::Transfers,
            0x83 => Self::Signers,
            0x84 => Self::Ack,
            0x85 => Self::Signer,
            0xFF => Self::Error,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        })
    }
}
