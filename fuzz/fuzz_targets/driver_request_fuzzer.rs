//! Fuzz target for the [`ServerDriver`] request pipeline
//!
//! Prevent custody corruption from hostile or malformed requests
//!
//! # Strategy
//!
//! - Signed requests: well-formed instructions from a small key pool over a
//!   small material pool, with arbitrary sequences and forged signers
//! - Raw frames: arbitrary opcodes and bodies
//! - Session churn: connects, disconnects, and frames on unknown sessions
//!
//! # Invariants
//!
//! - NEVER panic
//! - Every frame on a live session gets exactly one reply echoing its
//!   request id, flagged as a reply
//! - Frames on unknown sessions are driver errors, never replies
//! - Every record's `last_sequence` equals its history length, and each
//!   history entry starts where the previous one ended

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use custody_core::{Environment, MemoryStorage, Storage};
use custody_crypto::{Keypair, default_program_id, derive_record_address};
use custody_proto::{
    FetchMaterial, FetchSigner, Frame, FrameFlags, FrameHeader, InitializeMaterial, ListSigners,
    ListTransfers, MaterialId, Opcode, Payload, Pubkey, QuarantineMaterial, RegisterSigner,
    SYSTEM_PROGRAM_ID, TransferMaterial,
};
use custody_server::{DriverConfig, DriverError, ServerAction, ServerDriver, ServerEvent};
use libfuzzer_sys::fuzz_target;

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        1_700_000_000
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x42);
    }
}

const KEYS: u8 = 3;
const MATERIALS: u8 = 4;

#[derive(Debug, Arbitrary)]
enum FuzzRequest {
    Initialize { signer: u8, material: u8 },
    Transfer { signer: u8, claimed_holder: u8, material: u8, to: u8, sequence: u8 },
    Quarantine { signer: u8, material: u8, sequence: u8 },
    Register { signer: u8, role: String, sequence: u8 },
    FetchSigner { signer: u8 },
    Signers { after: Option<u8>, limit: u32 },
    Fetch { material: u8 },
    History { material: u8, from: u8, limit: u8 },
    Raw { opcode: u8, body: Vec<u8> },
}

#[derive(Debug, Arbitrary)]
enum FuzzEvent {
    Request { session: u8, request_id: u64, request: FuzzRequest },
    Connect { session: u8 },
    Disconnect { session: u8 },
}

fn key(index: u8) -> Keypair {
    Keypair::from_seed([index % KEYS + 1; 32])
}

fn material(index: u8) -> (String, Pubkey) {
    let id = format!("MAT-{:03}", index % MATERIALS);
    let address = MaterialId::new(id.as_str())
        .map(|m| derive_record_address(&default_program_id(), &m))
        .unwrap_or_default();
    (id, address)
}

fn build_frame(request: FuzzRequest, request_id: u64) -> Option<Frame> {
    let payload = match request {
        FuzzRequest::Initialize { signer, material: m } => {
            let signer = key(signer);
            let (material_id, record) = material(m);
            let mut ix = InitializeMaterial {
                material_id,
                record,
                initializer: signer.pubkey(),
                system_program: SYSTEM_PROGRAM_ID,
                signature: vec![],
            };
            signer.sign_instruction(&mut ix);
            Payload::InitializeMaterial(ix)
        },
        FuzzRequest::Transfer { signer, claimed_holder, material: m, to, sequence } => {
            let mut ix = TransferMaterial {
                record: material(m).1,
                current_holder: key(claimed_holder).pubkey(),
                new_holder: key(to).pubkey(),
                expected_sequence: u64::from(sequence % 8),
                notes: String::new(),
                signature: vec![],
            };
            key(signer).sign_instruction(&mut ix);
            Payload::TransferMaterial(ix)
        },
        FuzzRequest::Quarantine { signer, material: m, sequence } => {
            let signer = key(signer);
            let mut ix = QuarantineMaterial {
                record: material(m).1,
                authority: signer.pubkey(),
                expected_sequence: u64::from(sequence % 8),
                reason: "fuzz".to_string(),
                signature: vec![],
            };
            signer.sign_instruction(&mut ix);
            Payload::QuarantineMaterial(ix)
        },
        FuzzRequest::Register { signer, role, sequence } => {
            let signer = key(signer);
            let mut ix = RegisterSigner {
                signer: signer.pubkey(),
                role,
                expected_sequence: u64::from(sequence % 4),
                signature: vec![],
            };
            signer.sign_instruction(&mut ix);
            Payload::RegisterSigner(ix)
        },
        FuzzRequest::FetchSigner { signer } => {
            Payload::FetchSigner(FetchSigner { pubkey: key(signer).pubkey() })
        },
        FuzzRequest::Signers { after, limit } => Payload::ListSigners(ListSigners {
            after: after.map(|index| key(index).pubkey()),
            limit,
        }),
        FuzzRequest::Fetch { material: m } => {
            Payload::FetchMaterial(FetchMaterial { record: material(m).1 })
        },
        FuzzRequest::History { material: m, from, limit } => {
            Payload::ListTransfers(ListTransfers {
                record: material(m).1,
                from_sequence: u64::from(from),
                limit: u32::from(limit),
            })
        },
        FuzzRequest::Raw { opcode, body } => {
            let opcode = Opcode::try_from(opcode).unwrap_or(Opcode::InitializeMaterial);
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            return Some(Frame::new(header, body));
        },
    };

    payload.into_frame(request_id).ok()
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let mut driver = ServerDriver::new(FuzzEnv, MemoryStorage::new(), DriverConfig::default());
    let mut live = [false; 4];

    for event in events {
        match event {
            FuzzEvent::Connect { session } => {
                let index = usize::from(session % 4);
                let result = driver
                    .process_event(ServerEvent::ConnectionAccepted { session_id: index as u64 });
                match result {
                    Ok(_) => {
                        assert!(!live[index], "accepted a live session twice");
                        live[index] = true;
                    },
                    Err(DriverError::SessionExists(_)) => assert!(live[index]),
                    Err(e) => panic!("unexpected accept error: {e}"),
                }
            },

            FuzzEvent::Disconnect { session } => {
                let index = usize::from(session % 4);
                let result = driver.process_event(ServerEvent::ConnectionClosed {
                    session_id: index as u64,
                    reason: "fuzz".to_string(),
                });
                assert_eq!(result.is_ok(), live[index]);
                live[index] = false;
            },

            FuzzEvent::Request { session, request_id, request } => {
                let index = usize::from(session % 4);
                let Some(frame) = build_frame(request, request_id) else {
                    continue;
                };

                let result = driver
                    .process_event(ServerEvent::FrameReceived { session_id: index as u64, frame });

                if !live[index] {
                    assert!(matches!(result, Err(DriverError::UnknownSession(_))));
                    continue;
                }

                let actions = result.expect("live session frame must be handled");
                let replies: Vec<&Frame> = actions
                    .iter()
                    .filter_map(|a| match a {
                        ServerAction::SendToSession { frame, .. } => Some(frame),
                        _ => None,
                    })
                    .collect();

                assert_eq!(replies.len(), 1, "exactly one reply per request");
                assert_eq!(replies[0].header.request_id(), request_id);
                assert!(replies[0].header.flags().contains(FrameFlags::REPLY));
            },
        }
    }

    let storage = driver.storage();
    for (address, record) in storage.list_records(usize::MAX).expect("memory storage") {
        let history = storage.load_transfers(&address, 0, usize::MAX).expect("memory storage");
        assert_eq!(record.last_sequence, history.len() as u64);

        for (i, entry) in history.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64 + 1);
        }
        for pair in history.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        if let Some(last) = history.last() {
            assert_eq!(last.to, record.current_holder);
        }
    }

    for entry in storage.list_signers(None, usize::MAX).expect("memory storage") {
        assert!((1..=4).contains(&entry.sequence), "registrations only advance by one");
    }
});
