//! Frame header and framing.

use std::fmt;

use bytes::Bytes;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32, U64},
};

use crate::{MAX_PAYLOAD_SIZE, Opcode, ProtocolError};

bitflags::bitflags! {
    /// Frame header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u16 {
        /// Frame answers a request.
        const REPLY = 0b0000_0001;
        /// Reply carries an error body.
        const ERROR = 0b0000_0010;
    }
}

/// Fixed-size frame header.
///
/// All multi-byte fields are big-endian. The layout is read directly from
/// the wire with `zerocopy`; validation happens in [`FrameHeader::from_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    magic: U32<BigEndian>,
    version: u8,
    opcode: u8,
    flags: U16<BigEndian>,
    request_id: U64<BigEndian>,
    payload_size: U32<BigEndian>,
    reserved: U32<BigEndian>,
}

impl FrameHeader {
    /// Header size on the wire.
    pub const SIZE: usize = 24;

    /// Protocol magic, ASCII "CUST".
    pub const MAGIC: u32 = 0x4355_5354;

    /// Protocol version written by this build.
    pub const VERSION: u8 = 1;

    /// Create a header for `opcode` with no flags, request id 0 and an
    /// empty body.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: U32::new(Self::MAGIC),
            version: Self::VERSION,
            opcode: opcode.to_u8(),
            flags: U16::new(0),
            request_id: U64::new(0),
            payload_size: U32::new(0),
            reserved: U32::new(0),
        }
    }

    /// Parse and validate a header from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let head = bytes.get(..Self::SIZE).ok_or(ProtocolError::FrameTooShort {
            expected: Self::SIZE,
            actual: bytes.len(),
        })?;
        let header = Self::read_from_bytes(head).map_err(|_| ProtocolError::FrameTooShort {
            expected: Self::SIZE,
            actual: head.len(),
        })?;

        if header.magic.get() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(header.magic.get()));
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        if header.reserved.get() != 0 {
            return Err(ProtocolError::ReservedNotZero(header.reserved.get()));
        }
        let size = header.payload_size();
        if size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size, max: MAX_PAYLOAD_SIZE });
        }

        Ok(header)
    }

    /// Raw opcode byte.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Opcode, if the byte names a known message.
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    /// Header flags. Unknown bits are dropped.
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_bits_truncate(self.flags.get())
    }

    /// Replace the header flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = U16::new(flags.bits());
    }

    /// Request id chosen by the client and echoed by the server.
    pub fn request_id(&self) -> u64 {
        self.request_id.get()
    }

    /// Set the request id.
    pub fn set_request_id(&mut self, request_id: u64) {
        self.request_id = U64::new(request_id);
    }

    /// Declared body size in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_size.get() as usize
    }

    fn set_payload_size(&mut self, size: usize) {
        self.payload_size = U32::new(u32::try_from(size).unwrap_or(u32::MAX));
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHeader")
            .field("opcode", &self.opcode_enum().ok_or(self.opcode))
            .field("flags", &self.flags())
            .field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

/// A complete protocol message: header plus encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Encoded body.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame; the header's payload size is set from `payload`.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        header.set_payload_size(payload.len());
        Self { header, payload }
    }

    /// Total encoded size.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<(), ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut header = self.header;
        header.set_payload_size(self.payload.len());

        dst.reserve(self.encoded_len());
        dst.extend_from_slice(header.as_bytes());
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_vec(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode exactly one frame from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = FrameHeader::from_bytes(bytes)?;
        let total = FrameHeader::SIZE + header.payload_size();

        if bytes.len() < total {
            return Err(ProtocolError::FrameTooShort { expected: total, actual: bytes.len() });
        }
        if bytes.len() > total {
            return Err(ProtocolError::TrailingBytes(bytes.len() - total));
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total]);
        Ok(Self { header, payload })
    }
}
