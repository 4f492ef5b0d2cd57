//! Custody program
//!
//! Validates signed instructions against stored records and decides the
//! resulting state changes.
//!
//! ## Responsibilities
//!
//! - Authorization: only the current holder may transfer or quarantine
//! - Signature Checks: every instruction is verified against its named signer
//! - Sequencing: each transfer advances `last_sequence` by exactly one
//! - Action Generation: return actions for the caller to apply (no direct
//!   writes)
//!
//! ## Design
//!
//! The program only reads storage. A rejected instruction therefore never
//! leaves partial state behind, and the caller decides when (and under which
//! lock) actions are applied.

use custody_crypto::{derive_record_address, verify_instruction};
use custody_proto::{
    InitializeMaterial, ListSigners, ListTransfers, MAX_NOTES_LEN, MAX_ROLE_LEN, MaterialId,
    MaterialView, ProtocolError, Pubkey, QuarantineMaterial, RegisterSigner, SYSTEM_PROGRAM_ID,
    SignerEntry, TransferMaterial, TransferRecord,
};
use tracing::{debug, info};

use crate::{
    env::Environment,
    error::ProgramError,
    record::MaterialRecord,
    storage::{Storage, StorageError},
};

/// Default cap on list query results.
pub const DEFAULT_MAX_LIST_LIMIT: usize = 100;

/// Program configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramConfig {
    /// Deployment id mixed into every record address.
    pub program_id: Pubkey,
    /// Upper bound applied to list query limits.
    pub max_list_limit: usize,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: custody_crypto::default_program_id(),
            max_list_limit: DEFAULT_MAX_LIST_LIMIT,
        }
    }
}

/// State changes decided by the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramAction {
    /// Create or overwrite a record.
    PersistRecord {
        /// Record address
        address: Pubkey,
        /// New record contents
        record: MaterialRecord,
    },

    /// Store an advanced record together with its history entry.
    CommitTransfer {
        /// Record address
        address: Pubkey,
        /// Record after the transfer
        record: MaterialRecord,
        /// History entry for the transfer
        transfer: TransferRecord,
    },

    /// Register or re-register a signer.
    PersistSigner {
        /// Signer and role
        entry: SignerEntry,
    },
}

impl ProgramAction {
    /// Apply this action to `storage`.
    pub fn apply(&self, storage: &impl Storage) -> Result<(), StorageError> {
        match self {
            Self::PersistRecord { address, record } => storage.store_record(address, record),
            Self::CommitTransfer { address, record, transfer } => {
                storage.commit_transfer(address, record, transfer)
            },
            Self::PersistSigner { entry } => storage.store_signer(entry),
        }
    }

    /// View of the record this action writes, if it writes one.
    pub fn view(&self) -> Option<MaterialView> {
        match self {
            Self::PersistRecord { address, record }
            | Self::CommitTransfer { address, record, .. } => Some(record.view(*address)),
            Self::PersistSigner { .. } => None,
        }
    }
}

/// Apply `actions` in order, stopping at the first failure.
pub fn apply_actions(
    actions: &[ProgramAction],
    storage: &impl Storage,
) -> Result<(), StorageError> {
    actions.iter().try_for_each(|action| action.apply(storage))
}

/// The custody program.
#[derive(Debug, Clone, Default)]
pub struct CustodyProgram {
    config: ProgramConfig,
}

impl CustodyProgram {
    /// Create a program with the given configuration.
    pub fn new(config: ProgramConfig) -> Self {
        Self { config }
    }

    /// Program configuration.
    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    /// Address of the record for `material_id` under this program.
    pub fn record_address(&self, material_id: &MaterialId) -> Pubkey {
        derive_record_address(&self.config.program_id, material_id)
    }

    /// Create a record held by the initializer.
    ///
    /// # Errors
    ///
    /// - `InvalidMaterialId` if the id is empty or too long
    /// - `InvalidSystemProgram` if `system_program` is not the system program
    /// - `AddressMismatch` if `record` is not derived from the id
    /// - `InvalidSignature` if the initializer did not sign
    /// - `RecordAlreadyExists` if the record exists
    pub fn initialize_material(
        &self,
        ix: &InitializeMaterial,
        storage: &impl Storage,
    ) -> Result<Vec<ProgramAction>, ProgramError> {
        let material_id = MaterialId::new(ix.material_id.as_str()).map_err(|e| match e {
            ProtocolError::InvalidMaterialId(reason) => ProgramError::InvalidMaterialId(reason),
            other => ProgramError::InvalidMaterialId(other.to_string()),
        })?;

        if ix.system_program != SYSTEM_PROGRAM_ID {
            return Err(ProgramError::InvalidSystemProgram(ix.system_program));
        }

        let expected = self.record_address(&material_id);
        if ix.record != expected {
            return Err(ProgramError::AddressMismatch { expected, actual: ix.record });
        }

        verify_instruction(ix)?;

        if storage.load_record(&ix.record)?.is_some() {
            return Err(ProgramError::RecordAlreadyExists(ix.record));
        }

        let record = MaterialRecord::new(&material_id, ix.initializer);
        info!("Material {} initialized by {}", material_id, ix.initializer);

        Ok(vec![ProgramAction::PersistRecord { address: ix.record, record }])
    }

    /// Hand custody to a new holder.
    ///
    /// The history entry is stamped with `env.unix_time()`.
    ///
    /// # Errors
    ///
    /// - `FieldTooLong` if the notes exceed the limit
    /// - `RecordNotFound` if the record does not exist
    /// - `Unauthorized` if the signer is not the current holder
    /// - `InvalidSignature` if the signature does not verify
    /// - `StaleSequence` if the record moved on since the signer observed it
    /// - `Quarantined` if the material is quarantined
    /// - `SequenceOverflow` if the counter is exhausted
    pub fn transfer_material(
        &self,
        ix: &TransferMaterial,
        env: &impl Environment,
        storage: &impl Storage,
    ) -> Result<Vec<ProgramAction>, ProgramError> {
        check_len("notes", &ix.notes, MAX_NOTES_LEN)?;

        let current = self.load_for_holder(&ix.record, &ix.current_holder, storage)?;
        verify_instruction(ix)?;
        check_sequence(&current, ix.expected_sequence)?;

        if current.status.is_quarantined() {
            return Err(ProgramError::Quarantined(ix.record));
        }

        let record =
            current.transferred_to(ix.new_holder).ok_or(ProgramError::SequenceOverflow)?;
        let transfer = TransferRecord {
            sequence: record.last_sequence,
            from: current.current_holder,
            to: ix.new_holder,
            timestamp: env.unix_time(),
            notes: ix.notes.clone(),
        };

        info!(
            "Transfer: {} -> {} (material {}, sequence {})",
            transfer.from,
            transfer.to,
            record.material_id(),
            transfer.sequence
        );

        Ok(vec![ProgramAction::CommitTransfer { address: ix.record, record, transfer }])
    }

    /// Quarantine a material. The sequence counter is left unchanged.
    ///
    /// Quarantining an already quarantined material is accepted and changes
    /// nothing.
    pub fn quarantine_material(
        &self,
        ix: &QuarantineMaterial,
        storage: &impl Storage,
    ) -> Result<Vec<ProgramAction>, ProgramError> {
        check_len("reason", &ix.reason, MAX_NOTES_LEN)?;

        let current = self.load_for_holder(&ix.record, &ix.authority, storage)?;
        verify_instruction(ix)?;
        check_sequence(&current, ix.expected_sequence)?;

        info!("Material {} quarantined by {}: {}", current.material_id(), ix.authority, ix.reason);

        Ok(vec![ProgramAction::PersistRecord { address: ix.record, record: current.quarantined() }])
    }

    /// Register a signer key with a role.
    ///
    /// Each registration is signed over the key's registration count, so an
    /// old registration cannot be replayed to restore a replaced role.
    ///
    /// # Errors
    ///
    /// - `FieldTooLong` if the role exceeds the limit
    /// - `InvalidSignature` if the key did not sign
    /// - `StaleSequence` if the key was registered since the signer looked
    pub fn register_signer(
        &self,
        ix: &RegisterSigner,
        storage: &impl Storage,
    ) -> Result<Vec<ProgramAction>, ProgramError> {
        check_len("role", &ix.role, MAX_ROLE_LEN)?;
        verify_instruction(ix)?;

        let current = storage.load_signer(&ix.signer)?.map_or(0, |entry| entry.sequence);
        if current != ix.expected_sequence {
            return Err(ProgramError::StaleSequence { current, expected: ix.expected_sequence });
        }
        let sequence = current.checked_add(1).ok_or(ProgramError::SequenceOverflow)?;

        info!("Signer {} registered as {:?} (registration {})", ix.signer, ix.role, sequence);

        Ok(vec![ProgramAction::PersistSigner {
            entry: SignerEntry { pubkey: ix.signer, role: ix.role.clone(), sequence },
        }])
    }

    /// Registry entry of `pubkey`.
    pub fn fetch_signer(
        &self,
        pubkey: &Pubkey,
        storage: &impl Storage,
    ) -> Result<SignerEntry, ProgramError> {
        storage.load_signer(pubkey)?.ok_or(ProgramError::SignerNotFound(*pubkey))
    }

    /// Current state of the record at `address`.
    pub fn fetch(
        &self,
        address: &Pubkey,
        storage: &impl Storage,
    ) -> Result<MaterialView, ProgramError> {
        let record = storage.load_record(address)?.ok_or(ProgramError::RecordNotFound(*address))?;
        Ok(record.view(*address))
    }

    /// Up to `limit` records, ordered by address.
    pub fn list_materials(
        &self,
        limit: u32,
        storage: &impl Storage,
    ) -> Result<Vec<MaterialView>, ProgramError> {
        let records = storage.list_records(self.clamp_limit(limit))?;
        Ok(records.into_iter().map(|(address, record)| record.view(address)).collect())
    }

    /// Custody history of a record in ascending sequence order.
    pub fn list_transfers(
        &self,
        query: &ListTransfers,
        storage: &impl Storage,
    ) -> Result<Vec<TransferRecord>, ProgramError> {
        if storage.load_record(&query.record)?.is_none() {
            return Err(ProgramError::RecordNotFound(query.record));
        }

        let limit = self.clamp_limit(query.limit);
        let transfers = storage.load_transfers(&query.record, query.from_sequence, limit)?;
        debug!("Loaded {} transfers for {}", transfers.len(), query.record);
        Ok(transfers)
    }

    /// One page of registered signers, ordered by key.
    pub fn list_signers(
        &self,
        query: &ListSigners,
        storage: &impl Storage,
    ) -> Result<Vec<SignerEntry>, ProgramError> {
        Ok(storage.list_signers(query.after.as_ref(), self.clamp_limit(query.limit))?)
    }

    fn load_for_holder(
        &self,
        address: &Pubkey,
        signer: &Pubkey,
        storage: &impl Storage,
    ) -> Result<MaterialRecord, ProgramError> {
        let record = storage.load_record(address)?.ok_or(ProgramError::RecordNotFound(*address))?;
        if record.current_holder != *signer {
            return Err(ProgramError::Unauthorized {
                holder: record.current_holder,
                signer: *signer,
            });
        }
        Ok(record)
    }

    fn clamp_limit(&self, limit: u32) -> usize {
        usize::try_from(limit).unwrap_or(usize::MAX).min(self.config.max_list_limit)
    }
}

fn check_sequence(record: &MaterialRecord, expected: u64) -> Result<(), ProgramError> {
    if record.last_sequence != expected {
        return Err(ProgramError::StaleSequence { current: record.last_sequence, expected });
    }
    Ok(())
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ProgramError> {
    if value.len() > max {
        return Err(ProgramError::FieldTooLong { field, len: value.len(), max });
    }
    Ok(())
}
