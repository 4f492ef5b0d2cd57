//! Read-only requests.

use serde::{Deserialize, Serialize};

use crate::Pubkey;

/// Read one material record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMaterial {
    /// Record address.
    pub record: Pubkey,
}

/// Read material records in address order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMaterials {
    /// Maximum number of records to return.
    pub limit: u32,
}

/// Read a record's custody history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTransfers {
    /// Record address.
    pub record: Pubkey,
    /// First sequence to return (history starts at 1).
    pub from_sequence: u64,
    /// Maximum number of entries to return.
    pub limit: u32,
}

/// Read one signer registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSigner {
    /// Registered key.
    pub pubkey: Pubkey,
}

/// Read the signer registry in key order, one page at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSigners {
    /// Return only keys strictly greater than this one.
    pub after: Option<Pubkey>,
    /// Maximum number of entries to return.
    pub limit: u32,
}
