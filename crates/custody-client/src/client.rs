//! Client state machine.
//!
//! The `Client` signs instructions with its identity, sends each request in
//! its own frame, and matches replies to pending requests by request id.
//! It caches the last view of every record it has seen, which is where
//! transfers and quarantines take their `expected_sequence` from.

use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use custody_core::Environment;
use custody_crypto::{Keypair, default_program_id, derive_record_address};
use custody_proto::{
    ErrorCode, FetchMaterial, FetchSigner, Frame, FrameFlags, InitializeMaterial, ListMaterials,
    ListSigners, ListTransfers, MaterialId, MaterialView, Payload, ProtocolError, Pubkey,
    QuarantineMaterial, RegisterSigner, SYSTEM_PROGRAM_ID, TransferMaterial,
};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, RequestKind},
};

/// Client identity.
///
/// The keypair that signs every instruction this client sends.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Signing key.
    pub keypair: Keypair,
}

impl ClientIdentity {
    /// Wrap a keypair.
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Public key of this identity.
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

/// Client configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Program id the server runs under; record addresses derive from it.
    pub program_id: Pubkey,
    /// How long a request may wait for its reply.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { program_id: default_program_id(), request_timeout: Duration::from_secs(30) }
    }
}

/// A request waiting for its reply.
#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    kind: RequestKind,
    sent_at: Instant,
}

/// Client state machine.
///
/// Pure state machine - returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct Client<E: Environment> {
    /// Our signing identity.
    identity: ClientIdentity,

    /// Program id and timeouts.
    config: ClientConfig,

    /// Outstanding requests, keyed by request id.
    pending: BTreeMap<u64, PendingRequest>,

    /// Last known state of each record.
    views: HashMap<Pubkey, MaterialView>,

    /// Environment for time/randomness.
    env: E,
}

impl<E: Environment> Client<E> {
    /// Create a new client with the given identity.
    pub fn new(env: E, identity: ClientIdentity, config: ClientConfig) -> Self {
        Self { identity, config, pending: BTreeMap::new(), views: HashMap::new(), env }
    }

    /// Public key this client signs with.
    pub fn pubkey(&self) -> Pubkey {
        self.identity.pubkey()
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of requests waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// What the pending request `request_id` asked for.
    pub fn pending_kind(&self, request_id: u64) -> Option<RequestKind> {
        self.pending.get(&request_id).map(|p| p.kind)
    }

    /// Last known state of `record`.
    pub fn view(&self, record: &Pubkey) -> Option<&MaterialView> {
        self.views.get(record)
    }

    /// Record address for `material_id` under the configured program.
    pub fn record_address(&self, material_id: &str) -> Result<Pubkey, ClientError> {
        let id = parse_material_id(material_id)?;
        Ok(derive_record_address(&self.config.program_id, &id))
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the event cannot be processed. Server-side
    /// rejections are not errors; they surface as
    /// [`ClientAction::RequestFailed`].
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::InitializeMaterial { material_id } => {
                self.handle_initialize(&material_id)
            },
            ClientEvent::TransferMaterial { record, new_holder, notes } => {
                self.handle_transfer(record, new_holder, notes)
            },
            ClientEvent::QuarantineMaterial { record, reason } => {
                self.handle_quarantine(record, reason)
            },
            ClientEvent::FetchMaterial { record } => self.send(
                RequestKind::Fetch { record },
                Payload::FetchMaterial(FetchMaterial { record }),
            ),
            ClientEvent::ListMaterials { limit } => self.send(
                RequestKind::ListMaterials,
                Payload::ListMaterials(ListMaterials { limit }),
            ),
            ClientEvent::ListTransfers { record, from_sequence, limit } => self.send(
                RequestKind::ListTransfers { record },
                Payload::ListTransfers(ListTransfers { record, from_sequence, limit }),
            ),
            ClientEvent::RegisterSigner { role, expected_sequence } => {
                self.handle_register_signer(role, expected_sequence)
            },
            ClientEvent::FetchSigner { pubkey } => {
                self.send(RequestKind::FetchSigner, Payload::FetchSigner(FetchSigner { pubkey }))
            },
            ClientEvent::ListSigners { after, limit } => self.send(
                RequestKind::ListSigners,
                Payload::ListSigners(ListSigners { after, limit }),
            ),
            ClientEvent::FrameReceived(frame) => self.handle_frame(&frame),
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    fn handle_initialize(&mut self, material_id: &str) -> Result<Vec<ClientAction>, ClientError> {
        let id = parse_material_id(material_id)?;
        let record = derive_record_address(&self.config.program_id, &id);

        let mut ix = InitializeMaterial {
            material_id: id.as_str().to_string(),
            record,
            initializer: self.identity.pubkey(),
            system_program: SYSTEM_PROGRAM_ID,
            signature: vec![],
        };
        self.identity.keypair.sign_instruction(&mut ix);

        self.send(RequestKind::Initialize { record }, Payload::InitializeMaterial(ix))
    }

    fn handle_transfer(
        &mut self,
        record: Pubkey,
        new_holder: Pubkey,
        notes: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let expected_sequence = self.known_sequence(record)?;

        let mut ix = TransferMaterial {
            record,
            current_holder: self.identity.pubkey(),
            new_holder,
            expected_sequence,
            notes,
            signature: vec![],
        };
        self.identity.keypair.sign_instruction(&mut ix);

        self.send(RequestKind::Transfer { record }, Payload::TransferMaterial(ix))
    }

    fn handle_quarantine(
        &mut self,
        record: Pubkey,
        reason: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let expected_sequence = self.known_sequence(record)?;

        let mut ix = QuarantineMaterial {
            record,
            authority: self.identity.pubkey(),
            expected_sequence,
            reason,
            signature: vec![],
        };
        self.identity.keypair.sign_instruction(&mut ix);

        self.send(RequestKind::Quarantine { record }, Payload::QuarantineMaterial(ix))
    }

    fn handle_register_signer(
        &mut self,
        role: String,
        expected_sequence: u64,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut ix = RegisterSigner {
            signer: self.identity.pubkey(),
            role,
            expected_sequence,
            signature: vec![],
        };
        self.identity.keypair.sign_instruction(&mut ix);

        self.send(RequestKind::RegisterSigner, Payload::RegisterSigner(ix))
    }

    fn known_sequence(&self, record: Pubkey) -> Result<u64, ClientError> {
        self.views
            .get(&record)
            .map(|view| view.last_sequence)
            .ok_or(ClientError::UnknownRecord { record })
    }

    /// Encode `payload` under a fresh request id and remember it as pending.
    fn send(
        &mut self,
        kind: RequestKind,
        payload: Payload,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let request_id = self.next_request_id();
        let frame = payload.into_frame(request_id)?;

        self.pending.insert(request_id, PendingRequest { kind, sent_at: self.env.now() });
        tracing::debug!("Sending request {} ({:?})", request_id, kind);

        Ok(vec![ClientAction::Send(frame)])
    }

    fn next_request_id(&self) -> u64 {
        loop {
            let id = self.env.random_u64();
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        if !frame.header.flags().contains(FrameFlags::REPLY) {
            return Err(ClientError::InvalidFrame {
                reason: format!("opcode {:#04x} is not a reply", frame.header.opcode()),
            });
        }

        let request_id = frame.header.request_id();
        let payload = Payload::from_frame(frame)
            .map_err(|e: ProtocolError| ClientError::InvalidFrame { reason: e.to_string() })?;

        let pending =
            self.pending.remove(&request_id).ok_or(ClientError::UnknownRequest { request_id })?;
        let kind = pending.kind;

        match (kind, payload) {
            (_, Payload::Error(reply)) => {
                if kind.is_write() && reply.code == ErrorCode::StaleSequence {
                    if let Some(record) = kind.record() {
                        self.views.remove(&record);
                    }
                }
                Ok(vec![ClientAction::RequestFailed {
                    request_id,
                    kind,
                    code: reply.code,
                    message: reply.message,
                }])
            },

            (
                RequestKind::Initialize { record }
                | RequestKind::Transfer { record }
                | RequestKind::Quarantine { record }
                | RequestKind::Fetch { record },
                Payload::Material(view),
            ) if view.record == record => {
                self.views.insert(record, view.clone());
                Ok(vec![ClientAction::RecordFetched(view)])
            },

            (RequestKind::ListMaterials, Payload::Materials(views)) => {
                for view in &views {
                    self.views.insert(view.record, view.clone());
                }
                Ok(vec![ClientAction::MaterialsListed(views)])
            },

            (RequestKind::ListTransfers { record }, Payload::Transfers(transfers)) => {
                Ok(vec![ClientAction::TransfersListed { record, transfers }])
            },

            (RequestKind::FetchSigner, Payload::Signer(entry)) => {
                Ok(vec![ClientAction::SignerFetched(entry)])
            },

            (RequestKind::ListSigners, Payload::Signers(signers)) => {
                Ok(vec![ClientAction::SignersListed(signers)])
            },

            (RequestKind::RegisterSigner, Payload::Ack(ack)) if ack.request_id == request_id => {
                Ok(vec![ClientAction::Acknowledged { request_id }])
            },

            (_, other) => Err(ClientError::UnexpectedReply { request_id, opcode: other.opcode() }),
        }
    }

    /// Expire requests older than the configured timeout.
    fn handle_tick(&mut self, now: Instant) -> Vec<ClientAction> {
        let timeout = self.config.request_timeout;
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        let mut actions = Vec::with_capacity(expired.len());
        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                actions.push(ClientAction::Log {
                    message: format!("Request {request_id} timed out after {timeout:?}"),
                });
                actions.push(ClientAction::RequestTimedOut { request_id, kind: pending.kind });
            }
        }
        actions
    }
}

fn parse_material_id(material_id: &str) -> Result<MaterialId, ClientError> {
    MaterialId::new(material_id).map_err(|e| match e {
        ProtocolError::InvalidMaterialId(reason) => ClientError::InvalidMaterialId { reason },
        other => ClientError::InvalidMaterialId { reason: other.to_string() },
    })
}

impl<E: Environment> std::fmt::Debug for Client<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pubkey", &self.identity.pubkey())
            .field("pending", &self.pending.len())
            .field("records", &self.views.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use custody_proto::{Ack, MaterialStatus, Opcode, SignerEntry};

    use super::*;

    /// Request ids count up from 1; time is fixed.
    #[derive(Clone)]
    struct TestEnv {
        counter: Arc<AtomicU64>,
        start: Instant,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { counter: Arc::new(AtomicU64::new(0)), start: Instant::now() }
        }
    }

    impl Environment for TestEnv {
        fn now(&self) -> Instant {
            self.start
        }

        fn unix_time(&self) -> u64 {
            1_700_000_000
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let bytes = next.to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = bytes.get(i).copied().unwrap_or(0);
            }
        }
    }

    fn client() -> Client<TestEnv> {
        let identity = ClientIdentity::new(Keypair::from_seed([7; 32]));
        Client::new(TestEnv::new(), identity, ClientConfig::default())
    }

    fn sent_frame(actions: &[ClientAction]) -> Frame {
        match actions {
            [ClientAction::Send(frame)] => frame.clone(),
            other => panic!("expected one Send, got {other:?}"),
        }
    }

    fn view(record: Pubkey, holder: Pubkey, last_sequence: u64) -> MaterialView {
        MaterialView {
            record,
            material_id: "MatA123".to_string(),
            current_holder: holder,
            last_sequence,
            status: MaterialStatus::InTransit,
        }
    }

    fn initialize(material_id: &str) -> ClientEvent {
        ClientEvent::InitializeMaterial { material_id: material_id.to_string() }
    }

    fn list_signers() -> ClientEvent {
        ClientEvent::ListSigners { after: None, limit: 10 }
    }

    fn reply(payload: Payload, request_id: u64) -> ClientEvent {
        ClientEvent::FrameReceived(payload.into_frame(request_id).unwrap())
    }

    #[test]
    fn initialize_sends_signed_instruction() {
        let mut client = client();
        let actions = client.handle(initialize("MatA123")).unwrap();

        let frame = sent_frame(&actions);
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::InitializeMaterial));
        assert_eq!(client.pending_count(), 1);

        match Payload::from_frame(&frame).unwrap() {
            Payload::InitializeMaterial(ix) => {
                assert_eq!(ix.initializer, client.pubkey());
                assert_eq!(ix.record, client.record_address("MatA123").unwrap());
                assert_eq!(ix.system_program, SYSTEM_PROGRAM_ID);
                custody_crypto::verify_instruction(&ix).unwrap();
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn empty_material_id_rejected_locally() {
        let mut client = client();
        let result = client.handle(ClientEvent::InitializeMaterial { material_id: String::new() });

        assert!(matches!(result, Err(ClientError::InvalidMaterialId { .. })));
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn transfer_requires_fetched_record() {
        let mut client = client();
        let record = Pubkey::new([3; 32]);

        let result = client.handle(ClientEvent::TransferMaterial {
            record,
            new_holder: Pubkey::new([4; 32]),
            notes: String::new(),
        });

        assert!(matches!(result, Err(ClientError::UnknownRecord { .. })));
    }

    #[test]
    fn transfer_signs_cached_sequence() {
        let mut client = client();
        let record = Pubkey::new([3; 32]);

        let fetch = sent_frame(&client.handle(ClientEvent::FetchMaterial { record }).unwrap());
        let fetched = view(record, client.pubkey(), 4);
        let actions = client
            .handle(reply(Payload::Material(fetched.clone()), fetch.header.request_id()))
            .unwrap();
        assert_eq!(actions, vec![ClientAction::RecordFetched(fetched)]);

        let frame = sent_frame(
            &client
                .handle(ClientEvent::TransferMaterial {
                    record,
                    new_holder: Pubkey::new([4; 32]),
                    notes: "dock 4".into(),
                })
                .unwrap(),
        );

        match Payload::from_frame(&frame).unwrap() {
            Payload::TransferMaterial(ix) => {
                assert_eq!(ix.expected_sequence, 4);
                assert_eq!(ix.current_holder, client.pubkey());
                custody_crypto::verify_instruction(&ix).unwrap();
            },
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn accepted_write_updates_cache() {
        let mut client = client();
        let frame = sent_frame(&client.handle(initialize("MatA123")).unwrap());
        let record = client.record_address("MatA123").unwrap();

        client
            .handle(reply(
                Payload::Material(view(record, client.pubkey(), 0)),
                frame.header.request_id(),
            ))
            .unwrap();

        assert_eq!(client.view(&record).unwrap().last_sequence, 0);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn stale_sequence_drops_cached_view() {
        let mut client = client();
        let record = Pubkey::new([3; 32]);
        let fetch = sent_frame(&client.handle(ClientEvent::FetchMaterial { record }).unwrap());
        client
            .handle(reply(
                Payload::Material(view(record, client.pubkey(), 1)),
                fetch.header.request_id(),
            ))
            .unwrap();

        let transfer = sent_frame(
            &client
                .handle(ClientEvent::TransferMaterial {
                    record,
                    new_holder: Pubkey::new([4; 32]),
                    notes: String::new(),
                })
                .unwrap(),
        );
        let request_id = transfer.header.request_id();
        let actions = client
            .handle(reply(Payload::error(ErrorCode::StaleSequence, "stale"), request_id))
            .unwrap();

        assert!(matches!(
            actions.as_slice(),
            [ClientAction::RequestFailed { code: ErrorCode::StaleSequence, .. }]
        ));
        assert!(client.view(&record).is_none());
    }

    #[test]
    fn register_signer_acknowledged() {
        let mut client = client();
        let event = ClientEvent::RegisterSigner { role: "courier".into(), expected_sequence: 2 };
        let frame = sent_frame(&client.handle(event).unwrap());
        let request_id = frame.header.request_id();

        match Payload::from_frame(&frame).unwrap() {
            Payload::RegisterSigner(ix) => {
                assert_eq!(ix.expected_sequence, 2);
                assert!(custody_crypto::verify_instruction(&ix).is_ok());
            },
            other => panic!("expected RegisterSigner, got {other:?}"),
        }

        let actions = client.handle(reply(Payload::Ack(Ack { request_id }), request_id)).unwrap();
        assert_eq!(actions, vec![ClientAction::Acknowledged { request_id }]);
    }

    #[test]
    fn fetch_signer_returns_entry() {
        let mut client = client();
        let pubkey = client.pubkey();
        let frame = sent_frame(&client.handle(ClientEvent::FetchSigner { pubkey }).unwrap());
        let request_id = frame.header.request_id();

        let entry = SignerEntry { pubkey, role: "courier".to_string(), sequence: 1 };
        let actions = client.handle(reply(Payload::Signer(entry.clone()), request_id)).unwrap();
        assert_eq!(actions, vec![ClientAction::SignerFetched(entry)]);
    }

    #[test]
    fn mismatched_reply_is_fatal() {
        let mut client = client();
        let frame = sent_frame(&client.handle(list_signers()).unwrap());
        let request_id = frame.header.request_id();

        let err = client.handle(reply(Payload::Transfers(vec![]), request_id)).unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedReply { opcode: Opcode::Transfers, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn reply_for_unknown_request() {
        let mut client = client();
        let err = client.handle(reply(Payload::Signers(vec![]), 999)).unwrap_err();
        assert!(matches!(err, ClientError::UnknownRequest { request_id: 999 }));
    }

    #[test]
    fn request_frame_from_server_is_invalid() {
        let mut client = client();
        let request = Payload::ListSigners(ListSigners { after: None, limit: 10 });
        let err = client.handle(reply(request, 1)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidFrame { .. }));
    }

    #[test]
    fn tick_expires_old_requests() {
        let mut client = client();
        let frame = sent_frame(&client.handle(ClientEvent::ListMaterials { limit: 10 }).unwrap());
        let start = client.env.now();

        let early =
            client.handle(ClientEvent::Tick { now: start + Duration::from_secs(1) }).unwrap();
        assert!(early.is_empty());

        let late =
            client.handle(ClientEvent::Tick { now: start + Duration::from_secs(31) }).unwrap();
        assert!(late.contains(&ClientAction::RequestTimedOut {
            request_id: frame.header.request_id(),
            kind: RequestKind::ListMaterials,
        }));
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn request_ids_are_unique() {
        let mut client = client();
        let a = sent_frame(&client.handle(list_signers()).unwrap());
        let b = sent_frame(&client.handle(list_signers()).unwrap());

        assert_ne!(a.header.request_id(), b.header.request_id());
        assert_eq!(client.pending_count(), 2);
    }
}
