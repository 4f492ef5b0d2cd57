//! Custody program tests with Oracle checks
//!
//! These tests drive `CustodyProgram` directly against `MemoryStorage`:
//! - Creation and single transfer (the basic custody contract)
//! - Authorization and replay rejection
//! - Quarantine
//! - Custody history continuity
//!
//! # Oracle Pattern
//!
//! Multi-step tests end with an Oracle that checks the record against its
//! history: sequences are 1..=n, each `from` is the previous `to`, and the
//! final `to` is the current holder.

use std::time::{Duration, Instant};

use custody_core::{
    CustodyProgram, Environment, MemoryStorage, ProgramAction, ProgramError, Storage,
    apply_actions,
};
use custody_crypto::Keypair;
use custody_proto::{
    ErrorCode, InitializeMaterial, ListSigners, ListTransfers, MaterialId, MaterialStatus, Pubkey,
    QuarantineMaterial, RegisterSigner, SYSTEM_PROGRAM_ID, SignerEntry, TransferMaterial,
};

// Fixed wall clock so history timestamps are predictable
#[derive(Clone)]
struct TestEnv;

const TEST_UNIX_TIME: u64 = 1_700_000_000;

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        TEST_UNIX_TIME
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}

struct Fixture {
    program: CustodyProgram,
    storage: MemoryStorage,
    env: TestEnv,
}

impl Fixture {
    fn new() -> Self {
        Self { program: CustodyProgram::default(), storage: MemoryStorage::new(), env: TestEnv }
    }

    fn address(&self, id: &str) -> Pubkey {
        self.program.record_address(&MaterialId::new(id).expect("valid id"))
    }

    fn init_ix(&self, id: &str, signer: &Keypair) -> InitializeMaterial {
        let mut ix = InitializeMaterial {
            material_id: id.to_string(),
            record: self.address(id),
            initializer: signer.pubkey(),
            system_program: SYSTEM_PROGRAM_ID,
            signature: vec![],
        };
        signer.sign_instruction(&mut ix);
        ix
    }

    fn transfer_ix(
        &self,
        id: &str,
        holder: &Keypair,
        new_holder: Pubkey,
        expected_sequence: u64,
    ) -> TransferMaterial {
        let mut ix = TransferMaterial {
            record: self.address(id),
            current_holder: holder.pubkey(),
            new_holder,
            expected_sequence,
            notes: format!("handover {expected_sequence}"),
            signature: vec![],
        };
        holder.sign_instruction(&mut ix);
        ix
    }

    fn initialize(&self, id: &str, signer: &Keypair) -> Result<Vec<ProgramAction>, ProgramError> {
        let actions = self.program.initialize_material(&self.init_ix(id, signer), &self.storage)?;
        apply_actions(&actions, &self.storage)?;
        Ok(actions)
    }

    fn transfer(&self, ix: &TransferMaterial) -> Result<Vec<ProgramAction>, ProgramError> {
        let actions = self.program.transfer_material(ix, &self.env, &self.storage)?;
        apply_actions(&actions, &self.storage)?;
        Ok(actions)
    }
}

fn keypair(byte: u8) -> Keypair {
    Keypair::from_seed([byte; 32])
}

/// Oracle: custody history is contiguous and ends at the current holder
fn verify_custody_chain(fx: &Fixture, id: &str, initializer: Pubkey, expected_transfers: u64) {
    let address = fx.address(id);
    let view = fx.program.fetch(&address, &fx.storage).expect("fetch failed");
    assert_eq!(view.last_sequence, expected_transfers, "last_sequence mismatch");

    let query = ListTransfers { record: address, from_sequence: 0, limit: 10_000 };
    let history = fx.program.list_transfers(&query, &fx.storage).expect("list_transfers failed");
    assert_eq!(history.len() as u64, expected_transfers, "history length mismatch");

    let mut holder = initializer;
    for (i, entry) in history.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64 + 1, "gap in history at position {i}");
        assert_eq!(entry.from, holder, "broken chain at sequence {}", entry.sequence);
        holder = entry.to;
    }
    assert_eq!(view.current_holder, holder, "holder does not match history");
}

#[test]
fn fresh_record_held_by_initializer() {
    let fx = Fixture::new();
    let initializer = keypair(1);

    fx.initialize("MatA123", &initializer).expect("initialize failed");

    let view = fx.program.fetch(&fx.address("MatA123"), &fx.storage).expect("fetch failed");
    assert_eq!(view.current_holder, initializer.pubkey());
    assert_eq!(view.last_sequence, 0);
    assert_eq!(view.material_id, "MatA123");
    assert_eq!(view.status, MaterialStatus::InTransit);
}

#[test]
fn single_transfer_moves_custody() {
    let fx = Fixture::new();
    let initializer = keypair(1);
    let receiver = keypair(2);

    fx.initialize("MatA123", &initializer).expect("initialize failed");
    fx.transfer(&fx.transfer_ix("MatA123", &initializer, receiver.pubkey(), 0))
        .expect("transfer failed");

    let view = fx.program.fetch(&fx.address("MatA123"), &fx.storage).expect("fetch failed");
    assert_eq!(view.current_holder, receiver.pubkey());
    assert_eq!(view.last_sequence, 1);

    verify_custody_chain(&fx, "MatA123", initializer.pubkey(), 1);
}

#[test]
fn transfer_history_carries_timestamp_and_notes() {
    let fx = Fixture::new();
    let initializer = keypair(1);

    fx.initialize("MatA123", &initializer).expect("initialize failed");
    let actions = fx
        .transfer(&fx.transfer_ix("MatA123", &initializer, keypair(2).pubkey(), 0))
        .expect("transfer failed");

    let Some(ProgramAction::CommitTransfer { transfer, .. }) = actions.first() else {
        panic!("expected CommitTransfer, got {actions:?}");
    };
    assert_eq!(transfer.timestamp, TEST_UNIX_TIME);
    assert_eq!(transfer.notes, "handover 0");
}

#[test]
fn initialize_twice_rejected() {
    let fx = Fixture::new();
    let initializer = keypair(1);

    fx.initialize("MatA123", &initializer).expect("initialize failed");
    let result = fx.initialize("MatA123", &keypair(2));

    assert!(matches!(result, Err(ProgramError::RecordAlreadyExists(_))));
    let view = fx.program.fetch(&fx.address("MatA123"), &fx.storage).expect("fetch failed");
    assert_eq!(view.current_holder, initializer.pubkey());
}

#[test]
fn initialize_rejects_empty_id() {
    let fx = Fixture::new();
    let signer = keypair(1);
    let mut ix = fx.init_ix("x", &signer);
    ix.material_id = String::new();
    signer.sign_instruction(&mut ix);

    let result = fx.program.initialize_material(&ix, &fx.storage);
    assert!(matches!(result, Err(ProgramError::InvalidMaterialId(_))));
}

#[test]
fn initialize_rejects_foreign_address() {
    let fx = Fixture::new();
    let signer = keypair(1);
    let mut ix = fx.init_ix("MatA123", &signer);
    ix.record = fx.address("MatB456");
    signer.sign_instruction(&mut ix);

    let result = fx.program.initialize_material(&ix, &fx.storage);
    assert!(matches!(result, Err(ProgramError::AddressMismatch { .. })));
}

#[test]
fn initialize_rejects_unsigned() {
    let fx = Fixture::new();
    let mut ix = fx.init_ix("MatA123", &keypair(1));
    ix.signature = vec![];

    let result = fx.program.initialize_material(&ix, &fx.storage);
    assert!(matches!(result, Err(ProgramError::InvalidSignature(_))));
    assert_eq!(fx.storage.record_count(), 0);
}

#[test]
fn long_ids_share_stored_prefix_but_not_address() {
    let fx = Fixture::new();
    let signer = keypair(1);

    fx.initialize("ABCDEFGHIJKLMNOPQRST-lot-1", &signer).expect("first initialize failed");
    fx.initialize("ABCDEFGHIJKLMNOPQRST-lot-2", &signer).expect("second initialize failed");

    let view =
        fx.program.fetch(&fx.address("ABCDEFGHIJKLMNOPQRST-lot-1"), &fx.storage).expect("fetch");
    assert_eq!(view.material_id, "ABCDEFGHIJKLMNOPQRST");
    assert_eq!(fx.storage.record_count(), 2);
}

#[test]
fn transfer_by_non_holder_rejected() {
    let fx = Fixture::new();
    let initializer = keypair(1);
    let intruder = keypair(9);

    fx.initialize("MatA123", &initializer).expect("initialize failed");
    let result = fx.transfer(&fx.transfer_ix("MatA123", &intruder, intruder.pubkey(), 0));

    match result {
        Err(ProgramError::Unauthorized { holder, signer }) => {
            assert_eq!(holder, initializer.pubkey());
            assert_eq!(signer, intruder.pubkey());
        },
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    verify_custody_chain(&fx, "MatA123", initializer.pubkey(), 0);
}

#[test]
fn transfer_claiming_holder_without_signature_rejected() {
    let fx = Fixture::new();
    let initializer = keypair(1);
    let intruder = keypair(9);

    fx.initialize("MatA123", &initializer).expect("initialize failed");

    // Names the real holder but is signed by someone else.
    let mut ix = fx.transfer_ix("MatA123", &initializer, intruder.pubkey(), 0);
    intruder.sign_instruction(&mut ix);

    let result = fx.transfer(&ix);
    assert!(matches!(result, Err(ProgramError::InvalidSignature(_))));
    verify_custody_chain(&fx, "MatA123", initializer.pubkey(), 0);
}

#[test]
fn transfer_of_missing_record_rejected() {
    let fx = Fixture::new();
    let holder = keypair(1);

    let result = fx.transfer(&fx.transfer_ix("Nope", &holder, keypair(2).pubkey(), 0));
    assert!(matches!(result, Err(ProgramError::RecordNotFound(_))));
}

#[test]
fn replayed_transfer_rejected() {
    let fx = Fixture::new();
    let a = keypair(1);
    let b = keypair(2);

    fx.initialize("MatA123", &a).expect("initialize failed");
    let a_to_b = fx.transfer_ix("MatA123", &a, b.pubkey(), 0);
    fx.transfer(&a_to_b).expect("first transfer failed");
    fx.transfer(&fx.transfer_ix("MatA123", &b, a.pubkey(), 1)).expect("second transfer failed");

    // A is holder again, so the captured instruction names the right holder.
    let result = fx.transfer(&a_to_b);
    assert_eq!(result, Err(ProgramError::StaleSequence { current: 2, expected: 0 }));
    verify_custody_chain(&fx, "MatA123", a.pubkey(), 2);
}

#[test]
fn transfer_to_self_advances_sequence() {
    let fx = Fixture::new();
    let a = keypair(1);

    fx.initialize("MatA123", &a).expect("initialize failed");
    fx.transfer(&fx.transfer_ix("MatA123", &a, a.pubkey(), 0)).expect("transfer failed");

    verify_custody_chain(&fx, "MatA123", a.pubkey(), 1);
}

#[test]
fn long_chain_keeps_history_contiguous() {
    let fx = Fixture::new();
    let holders: Vec<Keypair> = (1..=6).map(keypair).collect();

    fx.initialize("MatA123", &holders[0]).expect("initialize failed");
    for seq in 0..20u64 {
        let from = &holders[(seq as usize) % holders.len()];
        let to = &holders[(seq as usize + 1) % holders.len()];
        fx.transfer(&fx.transfer_ix("MatA123", from, to.pubkey(), seq)).expect("transfer failed");
    }

    verify_custody_chain(&fx, "MatA123", holders[0].pubkey(), 20);
    assert_eq!(fx.storage.total_transfer_count(), 20);
}

#[test]
fn quarantine_blocks_transfers() {
    let fx = Fixture::new();
    let holder = keypair(1);

    fx.initialize("MatA123", &holder).expect("initialize failed");

    let mut ix = QuarantineMaterial {
        record: fx.address("MatA123"),
        authority: holder.pubkey(),
        expected_sequence: 0,
        reason: "seal broken".to_string(),
        signature: vec![],
    };
    holder.sign_instruction(&mut ix);
    let actions = fx.program.quarantine_material(&ix, &fx.storage).expect("quarantine failed");
    apply_actions(&actions, &fx.storage).expect("apply failed");

    let view = fx.program.fetch(&fx.address("MatA123"), &fx.storage).expect("fetch failed");
    assert_eq!(view.status, MaterialStatus::Quarantined);
    assert_eq!(view.last_sequence, 0);

    let result = fx.transfer(&fx.transfer_ix("MatA123", &holder, keypair(2).pubkey(), 0));
    assert!(matches!(result, Err(ProgramError::Quarantined(_))));
}

#[test]
fn quarantine_by_non_holder_rejected() {
    let fx = Fixture::new();
    let holder = keypair(1);
    let other = keypair(2);

    fx.initialize("MatA123", &holder).expect("initialize failed");

    let mut ix = QuarantineMaterial {
        record: fx.address("MatA123"),
        authority: other.pubkey(),
        expected_sequence: 0,
        reason: String::new(),
        signature: vec![],
    };
    other.sign_instruction(&mut ix);

    let result = fx.program.quarantine_material(&ix, &fx.storage);
    assert!(matches!(result, Err(ProgramError::Unauthorized { .. })));
}

fn register_ix(signer: &Keypair, role: &str, expected_sequence: u64) -> RegisterSigner {
    let mut ix = RegisterSigner {
        signer: signer.pubkey(),
        role: role.to_string(),
        expected_sequence,
        signature: vec![],
    };
    signer.sign_instruction(&mut ix);
    ix
}

fn all_signers(fx: &Fixture) -> Vec<SignerEntry> {
    let query = ListSigners { after: None, limit: u32::MAX };
    fx.program.list_signers(&query, &fx.storage).expect("list failed")
}

#[test]
fn signer_registry_replaces_role() {
    let fx = Fixture::new();
    let signer = keypair(4);

    for (seq, role) in ["transporter", "lab_receiver"].into_iter().enumerate() {
        let ix = register_ix(&signer, role, seq as u64);
        let actions = fx.program.register_signer(&ix, &fx.storage).expect("register failed");
        apply_actions(&actions, &fx.storage).expect("apply failed");
    }

    let signers = all_signers(&fx);
    assert_eq!(signers.len(), 1);
    assert_eq!(signers[0].role, "lab_receiver");
    assert_eq!(signers[0].sequence, 2);
    assert_eq!(fx.program.fetch_signer(&signer.pubkey(), &fx.storage), Ok(signers[0].clone()));
}

#[test]
fn replayed_registration_rejected() {
    let fx = Fixture::new();
    let signer = keypair(4);

    let first = register_ix(&signer, "transporter", 0);
    let actions = fx.program.register_signer(&first, &fx.storage).expect("register failed");
    apply_actions(&actions, &fx.storage).expect("apply failed");
    let second = register_ix(&signer, "lab_receiver", 1);
    let actions = fx.program.register_signer(&second, &fx.storage).expect("register failed");
    apply_actions(&actions, &fx.storage).expect("apply failed");

    // The captured first registration no longer matches the key's count.
    let result = fx.program.register_signer(&first, &fx.storage);
    assert_eq!(result, Err(ProgramError::StaleSequence { current: 2, expected: 0 }));
    assert_eq!(all_signers(&fx)[0].role, "lab_receiver");
}

#[test]
fn fetch_of_unregistered_signer_rejected() {
    let fx = Fixture::new();
    let key = keypair(9).pubkey();

    let result = fx.program.fetch_signer(&key, &fx.storage);
    assert_eq!(result, Err(ProgramError::SignerNotFound(key)));
    assert_eq!(result.map_err(|e| e.code()), Err(ErrorCode::SignerNotFound));
}

#[test]
fn list_signers_pages_after_cursor() {
    let fx = Fixture::new();
    for byte in 1..=5 {
        let ix = register_ix(&keypair(byte), "courier", 0);
        let actions = fx.program.register_signer(&ix, &fx.storage).expect("register failed");
        apply_actions(&actions, &fx.storage).expect("apply failed");
    }
    let everyone: Vec<Pubkey> = all_signers(&fx).iter().map(|s| s.pubkey).collect();

    let mut paged = Vec::new();
    let mut after = None;
    loop {
        let query = ListSigners { after, limit: 2 };
        let page = fx.program.list_signers(&query, &fx.storage).expect("list failed");
        let Some(last) = page.last() else { break };
        after = Some(last.pubkey);
        paged.extend(page.iter().map(|s| s.pubkey));
    }

    assert_eq!(paged, everyone);
    assert_eq!(everyone.len(), 5);
}

#[test]
fn list_materials_ordered_by_address() {
    let fx = Fixture::new();
    let signer = keypair(1);
    for id in ["MatA", "MatB", "MatC", "MatD"] {
        fx.initialize(id, &signer).expect("initialize failed");
    }

    let views = fx.program.list_materials(3, &fx.storage).expect("list failed");
    assert_eq!(views.len(), 3);
    assert!(views.windows(2).all(|w| w[0].record < w[1].record));
}

#[test]
fn list_transfers_of_missing_record_rejected() {
    let fx = Fixture::new();
    let query = ListTransfers { record: fx.address("Nope"), from_sequence: 0, limit: 10 };

    let result = fx.program.list_transfers(&query, &fx.storage);
    assert!(matches!(result, Err(ProgramError::RecordNotFound(_))));
}

#[test]
fn list_transfers_pages_from_sequence() {
    let fx = Fixture::new();
    let a = keypair(1);
    let b = keypair(2);

    fx.initialize("MatA123", &a).expect("initialize failed");
    for seq in 0..5u64 {
        let (from, to) = if seq % 2 == 0 { (&a, &b) } else { (&b, &a) };
        fx.transfer(&fx.transfer_ix("MatA123", from, to.pubkey(), seq)).expect("transfer failed");
    }

    let query = ListTransfers { record: fx.address("MatA123"), from_sequence: 3, limit: 2 };
    let page = fx.program.list_transfers(&query, &fx.storage).expect("list failed");
    let sequences: Vec<u64> = page.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, vec![3, 4]);
}

#[test]
fn corrupt_record_surfaces_as_storage_error() {
    let fx = Fixture::new();
    let address = fx.address("MatA123");
    fx.storage.store_raw(&address, [0xAB; custody_core::RECORD_SIZE]).expect("store_raw failed");

    let result = fx.program.fetch(&address, &fx.storage);
    match result {
        Err(err @ ProgramError::Storage(_)) => assert!(!err.is_retryable()),
        other => panic!("expected storage error, got {other:?}"),
    }
}

#[test]
fn storage_rejects_sequence_skip() {
    let fx = Fixture::new();
    let a = keypair(1);
    fx.initialize("MatA123", &a).expect("initialize failed");

    let address = fx.address("MatA123");
    let mut record = fx.storage.load_record(&address).expect("load failed").expect("record");
    record.last_sequence = 5;

    assert!(fx.storage.store_record(&address, &record).is_err());
}
