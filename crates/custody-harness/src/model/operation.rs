//! Operations for model-based testing.
//!
//! Operations represent the custody actions a participant can take. They are
//! generated randomly by proptest and applied to both the model and the real
//! implementation.

use arbitrary::Arbitrary;

/// Participant identifier (0-indexed).
pub type ClientId = u8;

/// Material identifier (kept small so operations collide often).
pub type ModelMaterialId = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Participant creates a record and becomes its holder.
    Initialize {
        /// Participant signing the instruction.
        client_id: ClientId,
        /// Material to create.
        material: ModelMaterialId,
    },

    /// Participant hands custody on, signing the current sequence.
    Transfer {
        /// Participant signing the instruction.
        client_id: ClientId,
        /// Material to transfer.
        material: ModelMaterialId,
        /// Next holder.
        to: ClientId,
    },

    /// Participant hands custody on, signing a sequence that is one behind
    /// (a replayed or outdated instruction).
    StaleTransfer {
        /// Participant signing the instruction.
        client_id: ClientId,
        /// Material to transfer.
        material: ModelMaterialId,
        /// Next holder.
        to: ClientId,
    },

    /// Participant quarantines a material.
    Quarantine {
        /// Participant signing the instruction.
        client_id: ClientId,
        /// Material to quarantine.
        material: ModelMaterialId,
    },

    /// Read a record.
    Fetch {
        /// Material to read.
        material: ModelMaterialId,
    },

    /// Participant registers under a role.
    RegisterSigner {
        /// Participant registering.
        client_id: ClientId,
        /// Role index, rendered as `role-{n}`.
        role: u8,
    },
}

impl Operation {
    /// Map participant and material ids into the given ranges.
    pub fn clamp(self, num_clients: usize, num_materials: usize) -> Self {
        let c = |id: ClientId| clamp_to(id, num_clients);
        let m = |id: ModelMaterialId| clamp_to(id, num_materials);

        match self {
            Self::Initialize { client_id, material } => {
                Self::Initialize { client_id: c(client_id), material: m(material) }
            },
            Self::Transfer { client_id, material, to } => {
                Self::Transfer { client_id: c(client_id), material: m(material), to: c(to) }
            },
            Self::StaleTransfer { client_id, material, to } => {
                Self::StaleTransfer { client_id: c(client_id), material: m(material), to: c(to) }
            },
            Self::Quarantine { client_id, material } => {
                Self::Quarantine { client_id: c(client_id), material: m(material) }
            },
            Self::Fetch { material } => Self::Fetch { material: m(material) },
            Self::RegisterSigner { client_id, role } => {
                Self::RegisterSigner { client_id: c(client_id), role }
            },
        }
    }
}

fn clamp_to(id: u8, count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(0) => 0,
        Ok(count) => id % count,
        Err(_) => id,
    }
}

/// Material id string for a model material.
pub fn material_name(material: ModelMaterialId) -> String {
    format!("MAT-{material:03}")
}

/// Role string for a model role index.
pub fn role_name(role: u8) -> String {
    format!("role-{}", role % 4)
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Record already exists.
    RecordAlreadyExists,

    /// Record not found.
    RecordNotFound,

    /// Signer is not the current holder.
    Unauthorized,

    /// Signed sequence is not the record's current sequence.
    StaleSequence,

    /// Material is quarantined.
    Quarantined,

    /// Invalid client ID.
    InvalidClient,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
