//! Storage integration tests with Oracle checks
//!
//! These tests verify the storage abstraction's critical invariants:
//! - Contiguous custody history (no gaps)
//! - Atomic record + history commits
//! - Per-record isolation
//! - Shared state between clones

use custody_core::{ChaoticStorage, MaterialRecord, MemoryStorage, Storage, StorageError};
use custody_proto::{MaterialId, Pubkey, SignerEntry, TransferRecord};
use proptest::prelude::*;

fn address(byte: u8) -> Pubkey {
    Pubkey::new([byte; 32])
}

fn holder(index: u64) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&index.to_be_bytes());
    Pubkey::new(bytes)
}

// Helper: store a fresh record held by holder(0)
fn create_record(storage: &impl Storage, address: &Pubkey) -> MaterialRecord {
    let record = MaterialRecord::new(&MaterialId::new("MatA123").expect("valid id"), holder(0));
    storage.store_record(address, &record).expect("store_record failed");
    record
}

// Helper: commit the next transfer on a record
fn commit_next(storage: &impl Storage, address: &Pubkey) -> Result<MaterialRecord, StorageError> {
    let current = storage.load_record(address)?.expect("record exists");
    let next = current.last_sequence + 1;
    let record = current.transferred_to(holder(next)).expect("no overflow");
    let transfer = TransferRecord {
        sequence: next,
        from: current.current_holder,
        to: holder(next),
        timestamp: 1_700_000_000 + next,
        notes: format!("transfer-{next}"),
    };
    storage.commit_transfer(address, &record, &transfer)?;
    Ok(record)
}

// Oracle: Verify record and history agree
fn verify_storage_invariants(storage: &impl Storage, address: &Pubkey, expected_count: u64) {
    let latest =
        storage.latest_transfer_sequence(address).expect("latest_transfer_sequence failed");
    let record = storage.load_record(address).expect("load_record failed").expect("record exists");

    assert_eq!(record.last_sequence, expected_count, "last_sequence mismatch");

    if expected_count == 0 {
        assert_eq!(latest, None, "Expected no history");
        return;
    }
    assert_eq!(latest, Some(expected_count), "latest_transfer_sequence mismatch");

    let transfers = storage.load_transfers(address, 0, 10_000).expect("load_transfers failed");
    assert_eq!(transfers.len() as u64, expected_count, "History length mismatch");

    for (i, transfer) in transfers.iter().enumerate() {
        assert_eq!(transfer.sequence, i as u64 + 1, "Gap in history at position {}", i);
    }
    assert_eq!(
        transfers.last().map(|t| t.to),
        Some(record.current_holder),
        "History does not end at current holder"
    );
}

#[test]
fn test_commit_and_load_transfers() {
    let storage = MemoryStorage::new();
    let address = address(1);

    create_record(&storage, &address);
    for _ in 0..10 {
        commit_next(&storage, &address).expect("commit failed");
    }

    verify_storage_invariants(&storage, &address, 10);
}

#[test]
fn test_history_gap_rejected() {
    let storage = MemoryStorage::new();
    let address = address(1);
    let initial = create_record(&storage, &address);

    // Record says sequence 2, history says 2: skips 1
    let mut record = initial.transferred_to(holder(2)).expect("no overflow");
    record.last_sequence = 2;
    let transfer = TransferRecord {
        sequence: 2,
        from: holder(0),
        to: holder(2),
        timestamp: 0,
        notes: String::new(),
    };

    let result = storage.commit_transfer(&address, &record, &transfer);
    assert!(matches!(result, Err(StorageError::Conflict { expected: 1, got: 2 })));

    // Nothing written
    verify_storage_invariants(&storage, &address, 0);
}

#[test]
fn test_record_history_mismatch_rejected() {
    let storage = MemoryStorage::new();
    let address = address(1);
    let initial = create_record(&storage, &address);

    let record = initial.transferred_to(holder(1)).expect("no overflow");
    let transfer = TransferRecord {
        sequence: 3,
        from: holder(0),
        to: holder(1),
        timestamp: 0,
        notes: String::new(),
    };

    match storage.commit_transfer(&address, &record, &transfer) {
        Err(StorageError::Conflict { expected, got }) => {
            assert_eq!(expected, 1);
            assert_eq!(got, 3);
        },
        other => panic!("Expected Conflict error, got {other:?}"),
    }

    verify_storage_invariants(&storage, &address, 0);
}

#[test]
fn test_new_record_must_start_at_zero() {
    let storage = MemoryStorage::new();
    let mut record = MaterialRecord::new(&MaterialId::new("MatA123").expect("valid id"), holder(0));
    record.last_sequence = 4;

    let result = storage.store_record(&address(1), &record);
    assert!(matches!(result, Err(StorageError::Conflict { expected: 0, got: 4 })));
    assert_eq!(storage.record_count(), 0);
}

#[test]
fn test_concurrent_records() {
    let storage = MemoryStorage::new();

    for (byte, count) in [(1u8, 5u64), (2, 3), (3, 7)] {
        create_record(&storage, &address(byte));
        for _ in 0..count {
            commit_next(&storage, &address(byte)).expect("commit failed");
        }
    }

    verify_storage_invariants(&storage, &address(1), 5);
    verify_storage_invariants(&storage, &address(2), 3);
    verify_storage_invariants(&storage, &address(3), 7);

    assert_eq!(storage.record_count(), 3);
    assert_eq!(storage.total_transfer_count(), 15);
}

#[test]
fn test_load_transfers_pagination() {
    let storage = MemoryStorage::new();
    let address = address(1);
    create_record(&storage, &address);
    for _ in 0..20 {
        commit_next(&storage, &address).expect("commit failed");
    }

    let batch1 = storage.load_transfers(&address, 1, 10).expect("load failed");
    assert_eq!(batch1.len(), 10);
    assert_eq!(batch1[0].sequence, 1);
    assert_eq!(batch1[9].sequence, 10);

    let batch2 = storage.load_transfers(&address, 11, 10).expect("load failed");
    assert_eq!(batch2.len(), 10);
    assert_eq!(batch2[0].sequence, 11);
    assert_eq!(batch2[9].sequence, 20);

    assert!(storage.load_transfers(&address, 21, 10).expect("load failed").is_empty());
}

#[test]
fn test_list_records_sorted_and_limited() {
    let storage = MemoryStorage::new();
    for byte in [9u8, 3, 7, 1] {
        create_record(&storage, &address(byte));
    }

    let listed = storage.list_records(3).expect("list failed");
    let addresses: Vec<Pubkey> = listed.iter().map(|(a, _)| *a).collect();
    assert_eq!(addresses, vec![address(1), address(3), address(7)]);
}

fn signer(index: u64, role: &str, sequence: u64) -> SignerEntry {
    SignerEntry { pubkey: holder(index), role: role.into(), sequence }
}

#[test]
fn test_signers_replace_role() {
    let storage = MemoryStorage::new();
    storage.store_signer(&signer(2, "transporter", 1)).expect("store");
    storage.store_signer(&signer(1, "manufacturer", 1)).expect("store");
    storage.store_signer(&signer(2, "lab_receiver", 2)).expect("store");

    let signers = storage.list_signers(None, 10).expect("list failed");
    assert_eq!(signers, vec![signer(1, "manufacturer", 1), signer(2, "lab_receiver", 2)]);
    assert_eq!(storage.load_signer(&holder(2)).expect("load"), Some(signer(2, "lab_receiver", 2)));
}

#[test]
fn test_signer_sequence_must_advance_by_one() {
    let storage = MemoryStorage::new();

    let skipped = storage.store_signer(&signer(1, "courier", 2));
    assert_eq!(skipped, Err(StorageError::Conflict { expected: 1, got: 2 }));

    storage.store_signer(&signer(1, "courier", 1)).expect("store");
    let replayed = storage.store_signer(&signer(1, "auditor", 1));
    assert_eq!(replayed, Err(StorageError::Conflict { expected: 2, got: 1 }));
    assert_eq!(storage.load_signer(&holder(1)).expect("load"), Some(signer(1, "courier", 1)));
}

#[test]
fn test_list_signers_after_and_limit() {
    let storage = MemoryStorage::new();
    for index in 1..=5 {
        storage.store_signer(&signer(index, "courier", 1)).expect("store");
    }

    let page = storage.list_signers(Some(&holder(2)), 2).expect("list failed");
    let keys: Vec<Pubkey> = page.iter().map(|s| s.pubkey).collect();
    assert_eq!(keys, vec![holder(3), holder(4)]);

    assert!(storage.list_signers(Some(&holder(5)), 10).expect("list failed").is_empty());
}

#[test]
fn test_storage_clone_shares_state() {
    let storage1 = MemoryStorage::new();
    let address = address(1);
    create_record(&storage1, &address);
    commit_next(&storage1, &address).expect("commit failed");

    let storage2 = storage1.clone();
    commit_next(&storage2, &address).expect("commit failed");

    verify_storage_invariants(&storage1, &address, 2);
    verify_storage_invariants(&storage2, &address, 2);
}

#[test]
fn test_chaotic_storage_never_half_commits() {
    let storage = ChaoticStorage::new(MemoryStorage::new(), 0.3, 42);
    let address = address(1);

    let record = MaterialRecord::new(&MaterialId::new("MatA123").expect("valid id"), holder(0));
    while storage.store_record(&address, &record).is_err() {}

    let mut failures = 0;
    let mut committed = 0;
    for _ in 0..200 {
        match commit_next(&storage, &address) {
            Ok(_) => committed += 1,
            Err(err) => {
                assert!(err.is_transient(), "unexpected error: {err}");
                failures += 1;
            },
        }
    }

    assert!(failures > 0, "expected injected failures at rate 0.3");
    verify_storage_invariants(storage.inner(), &address, committed);
}

// Helper: commit a transfer claiming `sequence`, consistent or not
fn commit_at(storage: &impl Storage, address: &Pubkey, sequence: u64) -> Result<(), StorageError> {
    let current = storage.load_record(address)?.expect("record exists");
    let mut record = current.transferred_to(holder(sequence)).expect("no overflow");
    record.last_sequence = sequence;
    let transfer = TransferRecord {
        sequence,
        from: current.current_holder,
        to: holder(sequence),
        timestamp: 1_700_000_000,
        notes: String::new(),
    };
    storage.commit_transfer(address, &record, &transfer)
}

proptest! {
    /// Only the commit that extends the history by exactly one lands;
    /// replays and skips leave record and history untouched.
    #[test]
    fn prop_only_next_sequence_commits(offsets in prop::collection::vec(0..3u64, 0..40)) {
        let storage = MemoryStorage::new();
        let address = address(9);
        create_record(&storage, &address);

        let mut committed = 0;
        for offset in offsets {
            let result = commit_at(&storage, &address, committed + offset);
            if offset == 1 {
                prop_assert!(result.is_ok(), "next sequence rejected: {:?}", result);
                committed += 1;
            } else {
                let is_conflict = matches!(result, Err(StorageError::Conflict { .. }));
                prop_assert!(is_conflict, "offset {} accepted: {:?}", offset, result);
            }
        }

        verify_storage_invariants(&storage, &address, committed);
    }
}
