//! Storage abstraction for custody records.
//!
//! The program never touches storage directly. It reads through `&impl
//! Storage` and returns actions that the driver applies. Implementations use
//! interior mutability so a single handle can be shared between the driver
//! and tests.
//!
//! # Invariants
//!
//! - No sequence regression: a stored record's `last_sequence` is the
//!   existing value or one past it, and new records start at 0
//! - Atomic transfers: `commit_transfer` writes the record and its history
//!   entry together or not at all
//! - Gap-free history: history entry `n` is only accepted after `n - 1`
//! - Counted registrations: a signer entry's `sequence` starts at 1 and
//!   advances by one per re-registration
//! - Sorted listings: `list_records` and `list_signers` return entries in
//!   ascending key order

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, Mutex, RwLock},
};

use custody_proto::{Pubkey, SignerEntry, TransferRecord};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::record::{MaterialRecord, RECORD_SIZE};

/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// History entry does not follow the latest stored one.
    #[error("history conflict: expected sequence {expected}, got {got}")]
    Conflict {
        /// Sequence the store would accept next
        expected: u64,
        /// Sequence that was offered
        got: u64,
    },

    /// Stored bytes could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Backend failure (possibly transient).
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Persistent state of the custody program.
pub trait Storage: Send + Sync {
    /// Load the record at `address`, if it exists.
    fn load_record(&self, address: &Pubkey) -> Result<Option<MaterialRecord>, StorageError>;

    /// Create or overwrite the record at `address`.
    ///
    /// # Errors
    ///
    /// `StorageError::Conflict` if the record's sequence would regress or
    /// skip, or a new record does not start at 0.
    fn store_record(&self, address: &Pubkey, record: &MaterialRecord) -> Result<(), StorageError>;

    /// Up to `limit` records in ascending address order.
    fn list_records(&self, limit: usize) -> Result<Vec<(Pubkey, MaterialRecord)>, StorageError>;

    /// Store `record` and append `transfer` to its history in one step.
    ///
    /// # Errors
    ///
    /// `StorageError::Conflict` if `transfer.sequence` is not one past the
    /// latest history entry. Nothing is written in that case.
    fn commit_transfer(
        &self,
        address: &Pubkey,
        record: &MaterialRecord,
        transfer: &TransferRecord,
    ) -> Result<(), StorageError>;

    /// Up to `limit` history entries with `sequence >= from_sequence`.
    fn load_transfers(
        &self,
        address: &Pubkey,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StorageError>;

    /// Sequence of the newest history entry, `None` if there is none.
    fn latest_transfer_sequence(&self, address: &Pubkey) -> Result<Option<u64>, StorageError>;

    /// Load the registry entry for `pubkey`, if it exists.
    fn load_signer(&self, pubkey: &Pubkey) -> Result<Option<SignerEntry>, StorageError>;

    /// Register `entry`, replacing any previous role for the same key.
    ///
    /// # Errors
    ///
    /// `StorageError::Conflict` if `entry.sequence` is not one past the
    /// stored entry's (1 for a new key).
    fn store_signer(&self, entry: &SignerEntry) -> Result<(), StorageError>;

    /// Up to `limit` signers with keys strictly after `after`, in ascending
    /// key order.
    fn list_signers(
        &self,
        after: Option<&Pubkey>,
        limit: usize,
    ) -> Result<Vec<SignerEntry>, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<Pubkey, [u8; RECORD_SIZE]>,
    transfers: BTreeMap<Pubkey, Vec<TransferRecord>>,
    signers: BTreeMap<Pubkey, SignerEntry>,
}

/// In-memory storage.
///
/// Records are kept in their encoded form so every load exercises the
/// stored layout. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or(0)
    }

    /// Number of history entries across all records.
    pub fn total_transfer_count(&self) -> usize {
        self.state.read().map(|s| s.transfers.values().map(Vec::len).sum()).unwrap_or(0)
    }

    /// Overwrite the raw stored image of a record.
    ///
    /// Used by tests to simulate on-disk corruption.
    pub fn store_raw(
        &self,
        address: &Pubkey,
        bytes: [u8; RECORD_SIZE],
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.records.insert(*address, bytes);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, StorageError> {
        self.state.read().map_err(|_| StorageError::Io("storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, StorageError> {
        self.state.write().map_err(|_| StorageError::Io("storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn load_record(&self, address: &Pubkey) -> Result<Option<MaterialRecord>, StorageError> {
        let state = self.read()?;
        state.records.get(address).map(|bytes| MaterialRecord::decode(bytes)).transpose()
    }

    fn store_record(&self, address: &Pubkey, record: &MaterialRecord) -> Result<(), StorageError> {
        let mut state = self.write()?;
        check_sequence(state.records.get(address), record)?;
        state.records.insert(*address, record.encode());
        Ok(())
    }

    fn list_records(&self, limit: usize) -> Result<Vec<(Pubkey, MaterialRecord)>, StorageError> {
        let state = self.read()?;
        state
            .records
            .iter()
            .take(limit)
            .map(|(address, bytes)| Ok((*address, MaterialRecord::decode(bytes)?)))
            .collect()
    }

    fn commit_transfer(
        &self,
        address: &Pubkey,
        record: &MaterialRecord,
        transfer: &TransferRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;

        if record.last_sequence != transfer.sequence {
            return Err(StorageError::Conflict {
                expected: record.last_sequence,
                got: transfer.sequence,
            });
        }
        check_sequence(state.records.get(address), record)?;

        let history = state.transfers.entry(*address).or_default();
        let expected = history.last().map_or(1, |t| t.sequence + 1);
        if transfer.sequence != expected {
            return Err(StorageError::Conflict { expected, got: transfer.sequence });
        }

        history.push(transfer.clone());
        state.records.insert(*address, record.encode());
        Ok(())
    }

    fn load_transfers(
        &self,
        address: &Pubkey,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StorageError> {
        let state = self.read()?;
        let Some(history) = state.transfers.get(address) else {
            return Ok(Vec::new());
        };

        Ok(history.iter().filter(|t| t.sequence >= from_sequence).take(limit).cloned().collect())
    }

    fn latest_transfer_sequence(&self, address: &Pubkey) -> Result<Option<u64>, StorageError> {
        let state = self.read()?;
        Ok(state.transfers.get(address).and_then(|h| h.last()).map(|t| t.sequence))
    }

    fn load_signer(&self, pubkey: &Pubkey) -> Result<Option<SignerEntry>, StorageError> {
        let state = self.read()?;
        Ok(state.signers.get(pubkey).cloned())
    }

    fn store_signer(&self, entry: &SignerEntry) -> Result<(), StorageError> {
        let mut state = self.write()?;

        let current = state.signers.get(&entry.pubkey).map_or(0, |e| e.sequence);
        if Some(entry.sequence) != current.checked_add(1) {
            return Err(StorageError::Conflict {
                expected: current.saturating_add(1),
                got: entry.sequence,
            });
        }

        state.signers.insert(entry.pubkey, entry.clone());
        Ok(())
    }

    fn list_signers(
        &self,
        after: Option<&Pubkey>,
        limit: usize,
    ) -> Result<Vec<SignerEntry>, StorageError> {
        let state = self.read()?;
        let start = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(state
            .signers
            .range((start, Bound::Unbounded))
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

fn check_sequence(
    existing: Option<&[u8; RECORD_SIZE]>,
    record: &MaterialRecord,
) -> Result<(), StorageError> {
    let got = record.last_sequence;
    match existing {
        None if got != 0 => Err(StorageError::Conflict { expected: 0, got }),
        None => Ok(()),
        Some(bytes) => {
            let current = MaterialRecord::decode(bytes)?.last_sequence;
            if got == current || Some(got) == current.checked_add(1) {
                Ok(())
            } else {
                Err(StorageError::Conflict { expected: current.saturating_add(1), got })
            }
        },
    }
}

/// Storage wrapper that fails operations at random.
///
/// Each call fails with `StorageError::Io` with probability `failure_rate`
/// before reaching the inner storage, so a failed write never partially
/// applies. The RNG is seeded for reproducible fault schedules.
#[derive(Debug)]
pub struct ChaoticStorage<S> {
    inner: S,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, failing a `failure_rate` fraction of calls.
    ///
    /// The rate is clamped to `0.0..=1.0`; NaN disables failures.
    pub fn new(inner: S, failure_rate: f64, seed: u64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        Self { inner, failure_rate, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// The wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn maybe_fail(&self, op: &str) -> Result<(), StorageError> {
        let mut rng =
            self.rng.lock().map_err(|_| StorageError::Io("chaos rng poisoned".to_string()))?;
        if rng.gen_bool(self.failure_rate) {
            return Err(StorageError::Io(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn load_record(&self, address: &Pubkey) -> Result<Option<MaterialRecord>, StorageError> {
        self.maybe_fail("load_record")?;
        self.inner.load_record(address)
    }

    fn store_record(&self, address: &Pubkey, record: &MaterialRecord) -> Result<(), StorageError> {
        self.maybe_fail("store_record")?;
        self.inner.store_record(address, record)
    }

    fn list_records(&self, limit: usize) -> Result<Vec<(Pubkey, MaterialRecord)>, StorageError> {
        self.maybe_fail("list_records")?;
        self.inner.list_records(limit)
    }

    fn commit_transfer(
        &self,
        address: &Pubkey,
        record: &MaterialRecord,
        transfer: &TransferRecord,
    ) -> Result<(), StorageError> {
        self.maybe_fail("commit_transfer")?;
        self.inner.commit_transfer(address, record, transfer)
    }

    fn load_transfers(
        &self,
        address: &Pubkey,
        from_sequence: u64,
        limit: usize,
    ) -> Result<Vec<TransferRecord>, StorageError> {
        self.maybe_fail("load_transfers")?;
        self.inner.load_transfers(address, from_sequence, limit)
    }

    fn latest_transfer_sequence(&self, address: &Pubkey) -> Result<Option<u64>, StorageError> {
        self.maybe_fail("latest_transfer_sequence")?;
        self.inner.latest_transfer_sequence(address)
    }

    fn load_signer(&self, pubkey: &Pubkey) -> Result<Option<SignerEntry>, StorageError> {
        self.maybe_fail("load_signer")?;
        self.inner.load_signer(pubkey)
    }

    fn store_signer(&self, entry: &SignerEntry) -> Result<(), StorageError> {
        self.maybe_fail("store_signer")?;
        self.inner.store_signer(entry)
    }

    fn list_signers(
        &self,
        after: Option<&Pubkey>,
        limit: usize,
    ) -> Result<Vec<SignerEntry>, StorageError> {
        self.maybe_fail("list_signers")?;
        self.inner.list_signers(after, limit)
    }
}
