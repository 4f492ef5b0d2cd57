//! Client events and actions.
//!
//! Events flow into the client from the application (intents) and from the
//! transport (reply frames). Actions flow out for the caller to execute.

use std::time::Instant;

use custody_proto::{ErrorCode, Frame, MaterialView, Pubkey, SignerEntry, TransferRecord};

/// Events fed into the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Create a record for a new material, held by this client.
    InitializeMaterial {
        /// Material identifier, 1 to 64 bytes.
        material_id: String,
    },

    /// Hand custody of a record to `new_holder`.
    ///
    /// The record must have been fetched (or written) earlier so the client
    /// knows which sequence to sign.
    TransferMaterial {
        /// Record address.
        record: Pubkey,
        /// Next custodian.
        new_holder: Pubkey,
        /// Free-form note kept in the custody history.
        notes: String,
    },

    /// Quarantine a record held by this client.
    QuarantineMaterial {
        /// Record address.
        record: Pubkey,
        /// Why the material is quarantined.
        reason: String,
    },

    /// Read one record.
    FetchMaterial {
        /// Record address.
        record: Pubkey,
    },

    /// Read records in address order.
    ListMaterials {
        /// Maximum number of records.
        limit: u32,
    },

    /// Read a record's custody history.
    ListTransfers {
        /// Record address.
        record: Pubkey,
        /// First sequence to return.
        from_sequence: u64,
        /// Maximum number of entries.
        limit: u32,
    },

    /// Register this client's key under a role.
    ///
    /// `expected_sequence` is the key's current registration count, zero
    /// before the first registration; fetch the signer to learn it.
    RegisterSigner {
        /// Role name, at most 64 bytes.
        role: String,
        /// Registration count the signature is bound to.
        expected_sequence: u64,
    },

    /// Read one registry entry.
    FetchSigner {
        /// Signer key.
        pubkey: Pubkey,
    },

    /// Read the signer registry in key order.
    ListSigners {
        /// Return only keys strictly after this one.
        after: Option<Pubkey>,
        /// Maximum number of entries.
        limit: u32,
    },

    /// A frame arrived from the server.
    FrameReceived(Frame),

    /// Time passed; expire requests that waited too long.
    Tick {
        /// Current time.
        now: Instant,
    },
}

/// What a pending request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Record creation.
    Initialize {
        /// Record address.
        record: Pubkey,
    },
    /// Custody transfer.
    Transfer {
        /// Record address.
        record: Pubkey,
    },
    /// Quarantine.
    Quarantine {
        /// Record address.
        record: Pubkey,
    },
    /// Single record read.
    Fetch {
        /// Record address.
        record: Pubkey,
    },
    /// Record listing.
    ListMaterials,
    /// History read.
    ListTransfers {
        /// Record address.
        record: Pubkey,
    },
    /// Signer registration.
    RegisterSigner,
    /// Single signer read.
    FetchSigner,
    /// Signer registry read.
    ListSigners,
}

impl RequestKind {
    /// The record a single-record request targets.
    pub fn record(self) -> Option<Pubkey> {
        match self {
            Self::Initialize { record }
            | Self::Transfer { record }
            | Self::Quarantine { record }
            | Self::Fetch { record }
            | Self::ListTransfers { record } => Some(record),
            Self::ListMaterials
            | Self::RegisterSigner
            | Self::FetchSigner
            | Self::ListSigners => None,
        }
    }

    /// Whether the request writes a record.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Initialize { .. } | Self::Transfer { .. } | Self::Quarantine { .. })
    }
}

/// Actions produced by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send a frame to the server.
    Send(Frame),

    /// A record's current state, from a fetch or an accepted write.
    RecordFetched(MaterialView),

    /// Records returned by a listing.
    MaterialsListed(Vec<MaterialView>),

    /// Custody history of one record.
    TransfersListed {
        /// Record address.
        record: Pubkey,
        /// History entries in sequence order.
        transfers: Vec<TransferRecord>,
    },

    /// One registry entry.
    SignerFetched(SignerEntry),

    /// One page of the signer registry.
    SignersListed(Vec<SignerEntry>),

    /// The server accepted a request that returns no data.
    Acknowledged {
        /// Request that was accepted.
        request_id: u64,
    },

    /// The server rejected a request.
    RequestFailed {
        /// Request that was rejected.
        request_id: u64,
        /// What was asked.
        kind: RequestKind,
        /// Machine-readable reason.
        code: ErrorCode,
        /// Server's description.
        message: String,
    },

    /// No reply arrived within the configured timeout.
    RequestTimedOut {
        /// Request that expired.
        request_id: u64,
        /// What was asked.
        kind: RequestKind,
    },

    /// Log a message.
    Log {
        /// Message text.
        message: String,
    },
}
