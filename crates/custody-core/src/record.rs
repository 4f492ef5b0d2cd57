//! Material record and its stored layout.
//!
//! Records are stored as a fixed 69-byte little-endian image:
//!
//! ```text
//! discriminator[8] | current_holder[32] | last_sequence u64 | id[20] | status u8
//! ```
//!
//! The discriminator is `SHA-256("account:Material")[..8]`; decoding refuses
//! any image that does not start with it.

use std::sync::LazyLock;

use custody_crypto::{RECORD_ACCOUNT_NAME, account_discriminator};
use custody_proto::{MAX_ID_LEN, MaterialId, MaterialStatus, MaterialView, Pubkey};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U64},
};

use crate::storage::StorageError;

/// Size of an encoded record.
pub const RECORD_SIZE: usize = 8 + 32 + 8 + MAX_ID_LEN + 1;

static DISCRIMINATOR: LazyLock<[u8; 8]> =
    LazyLock::new(|| account_discriminator(RECORD_ACCOUNT_NAME));

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RecordLayout {
    discriminator: [u8; 8],
    current_holder: [u8; 32],
    last_sequence: U64<LittleEndian>,
    id: [u8; MAX_ID_LEN],
    status: u8,
}

/// Custody state of one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRecord {
    /// Present custodian.
    pub current_holder: Pubkey,
    /// Number of transfers so far.
    pub last_sequence: u64,
    /// Stored identifier bytes (truncated, zero-padded).
    pub id: [u8; MAX_ID_LEN],
    /// Lifecycle status.
    pub status: MaterialStatus,
}

impl MaterialRecord {
    /// A freshly initialized record held by `holder`.
    pub fn new(material_id: &MaterialId, holder: Pubkey) -> Self {
        Self {
            current_holder: holder,
            last_sequence: 0,
            id: material_id.stored_bytes(),
            status: MaterialStatus::InTransit,
        }
    }

    /// Stored identifier as text.
    pub fn material_id(&self) -> String {
        MaterialId::from_stored(&self.id)
    }

    /// The record after one transfer to `new_holder`, or `None` if the
    /// sequence counter is exhausted.
    pub fn transferred_to(&self, new_holder: Pubkey) -> Option<Self> {
        let last_sequence = self.last_sequence.checked_add(1)?;
        Some(Self { current_holder: new_holder, last_sequence, ..*self })
    }

    /// The record with its status set to quarantined.
    pub fn quarantined(&self) -> Self {
        Self { status: MaterialStatus::Quarantined, ..*self }
    }

    /// Public view of this record at `address`.
    pub fn view(&self, address: Pubkey) -> MaterialView {
        MaterialView {
            record: address,
            material_id: self.material_id(),
            current_holder: self.current_holder,
            last_sequence: self.last_sequence,
            status: self.status,
        }
    }

    /// Encode the stored image.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let layout = RecordLayout {
            discriminator: *DISCRIMINATOR,
            current_holder: self.current_holder.to_bytes(),
            last_sequence: U64::new(self.last_sequence),
            id: self.id,
            status: self.status as u8,
        };

        let mut out = [0u8; RECORD_SIZE];
        out.copy_from_slice(layout.as_bytes());
        out
    }

    /// Decode a stored image.
    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let layout = RecordLayout::read_from_bytes(bytes).map_err(|_| {
            let len = bytes.len();
            StorageError::Corrupt(format!("record is {len} bytes, expected {RECORD_SIZE}"))
        })?;

        if layout.discriminator != *DISCRIMINATOR {
            return Err(StorageError::Corrupt("record discriminator mismatch".to_string()));
        }
        let status = MaterialStatus::try_from(layout.status)
            .map_err(|b| StorageError::Corrupt(format!("unknown material status {b}")))?;

        Ok(Self {
            current_holder: Pubkey::new(layout.current_holder),
            last_sequence: layout.last_sequence.get(),
            id: layout.id,
            status,
        })
    }
}
