//! Frame bodies.
//!
//! [`Payload`] ties each body type to its [`Opcode`] and handles CBOR
//! encoding. Replies set [`FrameFlags::REPLY`]; error replies also set
//! [`FrameFlags::ERROR`].

mod instruction;
mod query;
mod reply;

use bytes::Bytes;
pub use instruction::{
    InitializeMaterial, QuarantineMaterial, RegisterSigner, SignedInstruction, TransferMaterial,
};
pub use query::{FetchMaterial, FetchSigner, ListMaterials, ListSigners, ListTransfers};
pub use reply::{
    Ack, ErrorCode, ErrorReply, MaterialStatus, MaterialView, SignerEntry, TransferRecord,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Frame, FrameFlags, FrameHeader, Opcode, ProtocolError};

/// Any frame body, tagged by opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// See [`InitializeMaterial`].
    InitializeMaterial(InitializeMaterial),
    /// See [`TransferMaterial`].
    TransferMaterial(TransferMaterial),
    /// See [`QuarantineMaterial`].
    QuarantineMaterial(QuarantineMaterial),
    /// See [`RegisterSigner`].
    RegisterSigner(RegisterSigner),
    /// See [`FetchMaterial`].
    FetchMaterial(FetchMaterial),
    /// See [`ListMaterials`].
    ListMaterials(ListMaterials),
    /// See [`ListTransfers`].
    ListTransfers(ListTransfers),
    /// See [`FetchSigner`].
    FetchSigner(FetchSigner),
    /// See [`ListSigners`].
    ListSigners(ListSigners),
    /// One material view.
    Material(MaterialView),
    /// Material views in address order.
    Materials(Vec<MaterialView>),
    /// Custody history in sequence order.
    Transfers(Vec<TransferRecord>),
    /// One signer registry entry.
    Signer(SignerEntry),
    /// Signer registry in key order.
    Signers(Vec<SignerEntry>),
    /// See [`Ack`].
    Ack(Ack),
    /// See [`ErrorReply`].
    Error(ErrorReply),
}

impl Payload {
    /// Opcode for this body.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::InitializeMaterial(_) => Opcode::InitializeMaterial,
            Self::TransferMaterial(_) => Opcode::TransferMaterial,
            Self::QuarantineMaterial(_) => Opcode::QuarantineMaterial,
            Self::RegisterSigner(_) => Opcode::RegisterSigner,
            Self::FetchMaterial(_) => Opcode::FetchMaterial,
            Self::ListMaterials(_) => Opcode::ListMaterials,
            Self::ListTransfers(_) => Opcode::ListTransfers,
            Self::FetchSigner(_) => Opcode::FetchSigner,
            Self::ListSigners(_) => Opcode::ListSigners,
            Self::Material(_) => Opcode::Material,
            Self::Materials(_) => Opcode::Materials,
            Self::Transfers(_) => Opcode::Transfers,
            Self::Signer(_) => Opcode::Signer,
            Self::Signers(_) => Opcode::Signers,
            Self::Ack(_) => Opcode::Ack,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Shorthand for an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorReply { code, message: message.into() })
    }

    /// Encode into a frame carrying `request_id`.
    pub fn into_frame(self, request_id: u64) -> Result<Frame, ProtocolError> {
        let opcode = self.opcode();
        let body = match &self {
            Self::InitializeMaterial(p) => to_cbor(p)?,
            Self::TransferMaterial(p) => to_cbor(p)?,
            Self::QuarantineMaterial(p) => to_cbor(p)?,
            Self::RegisterSigner(p) => to_cbor(p)?,
            Self::FetchMaterial(p) => to_cbor(p)?,
            Self::ListMaterials(p) => to_cbor(p)?,
            Self::ListTransfers(p) => to_cbor(p)?,
            Self::FetchSigner(p) => to_cbor(p)?,
            Self::ListSigners(p) => to_cbor(p)?,
            Self::Material(p) => to_cbor(p)?,
            Self::Materials(p) => to_cbor(p)?,
            Self::Transfers(p) => to_cbor(p)?,
            Self::Signer(p) => to_cbor(p)?,
            Self::Signers(p) => to_cbor(p)?,
            Self::Ack(p) => to_cbor(p)?,
            Self::Error(p) => to_cbor(p)?,
        };

        let mut flags = FrameFlags::empty();
        if opcode.is_reply() {
            flags |= FrameFlags::REPLY;
        }
        if opcode == Opcode::Error {
            flags |= FrameFlags::ERROR;
        }

        let mut header = FrameHeader::new(opcode);
        header.set_request_id(request_id);
        header.set_flags(flags);

        let frame = Frame::new(header, Bytes::from(body));
        if frame.payload.len() > crate::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: frame.payload.len(),
                max: crate::MAX_PAYLOAD_SIZE,
            });
        }
        Ok(frame)
    }

    /// Decode the body of `frame` according to its opcode.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let opcode = Opcode::try_from(frame.header.opcode())?;
        let body = frame.payload.as_ref();

        Ok(match opcode {
            Opcode::InitializeMaterial => Self::InitializeMaterial(from_cbor(body)?),
            Opcode::TransferMaterial => Self::TransferMaterial(from_cbor(body)?),
            Opcode::QuarantineMaterial => Self::QuarantineMaterial(from_cbor(body)?),
            Opcode::RegisterSigner => Self::RegisterSigner(from_cbor(body)?),
            Opcode::FetchMaterial => Self::FetchMaterial(from_cbor(body)?),
            Opcode::ListMaterials => Self::ListMaterials(from_cbor(body)?),
            Opcode::ListTransfers => Self::ListTransfers(from_cbor(body)?),
            Opcode::FetchSigner => Self::FetchSigner(from_cbor(body)?),
            Opcode::ListSigners => Self::ListSigners(from_cbor(body)?),
            Opcode::Material => Self::Material(from_cbor(body)?),
            Opcode::Materials => Self::Materials(from_cbor(body)?),
            Opcode::Transfers => Self::Transfers(from_cbor(body)?),
            Opcode::Signer => Self::Signer(from_cbor(body)?),
            Opcode::Signers => Self::Signers(from_cbor(body)?),
            Opcode::Ack => Self::Ack(from_cbor(body)?),
            Opcode::Error => Self::Error(from_cbor(body)?),
        })
    }
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
