//! Server Driver
//!
//! Sans-IO orchestrator between the transport and the custody program.
//!
//! ## Responsibilities
//!
//! - Session Lifecycle: admit connections up to the configured limit
//! - Request Dispatch: decode request frames and route them to the program
//! - State Changes: apply program actions to storage
//! - Replies: answer every request frame with exactly one reply frame that
//!   echoes its request id
//!
//! ## Design
//!
//! The driver performs no I/O. The runtime feeds it `ServerEvent`s and
//! executes the returned `ServerAction`s. Rejected requests become error
//! replies; `DriverError` is reserved for events the driver cannot handle at
//! all (such as frames from a session it never accepted).

use custody_core::{
    CustodyProgram, Environment, ProgramAction, ProgramConfig, ProgramError, Storage,
    apply_actions,
};
use custody_proto::{Ack, ErrorCode, Frame, Payload};

use crate::{registry::ConnectionRegistry, server_error::DriverError};

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent sessions
    pub max_connections: usize,
    /// Custody program configuration
    pub program: ProgramConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, program: ProgramConfig::default() }
    }
}

/// Events fed to the driver by the runtime.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A transport connection was accepted.
    ConnectionAccepted {
        /// Session id chosen by the runtime
        session_id: u64,
    },

    /// A complete frame arrived on a session.
    FrameReceived {
        /// Session the frame arrived on
        session_id: u64,
        /// The decoded frame
        frame: Frame,
    },

    /// A connection went away.
    ConnectionClosed {
        /// Session that closed
        session_id: u64,
        /// Why it closed
        reason: String,
    },
}

/// Log severity for `ServerAction::Log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Actions returned by the driver for the runtime to execute.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to one session.
    SendToSession {
        /// Target session
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Close a session's connection.
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason given to the peer
        reason: String,
    },

    /// Emit a log line.
    Log {
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
}

/// Action-based server driver.
pub struct ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    env: E,
    storage: S,
    program: CustodyProgram,
    registry: ConnectionRegistry,
    config: ServerConfig,
}

impl<E, S> ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    /// Create a driver over `storage`.
    pub fn new(env: E, storage: S, config: ServerConfig) -> Self {
        Self {
            env,
            storage,
            program: CustodyProgram::new(config.program),
            registry: ConnectionRegistry::new(),
            config,
        }
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// - `DriverError::UnknownSession` for frames from a session that was
    ///   never accepted
    /// - `DriverError::SessionExists` when an accept reuses a live id
    /// - `DriverError::Encode` if no reply frame could be encoded
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame(session_id, &frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, &reason)
            },
        }
    }

    /// The driver's storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The custody program.
    pub fn program(&self) -> &CustodyProgram {
        &self.program
    }

    /// Driver configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "Rejecting session {session_id}: connection limit {} reached",
                        self.config.max_connections
                    ),
                },
                ServerAction::CloseConnection {
                    session_id,
                    reason: "connection limit reached".to_string(),
                },
            ]);
        }

        if !self.registry.register(session_id, self.env.now()) {
            return Err(DriverError::SessionExists(session_id));
        }

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("Session {session_id} connected"),
        }])
    }

    fn handle_connection_closed(
        &mut self,
        session_id: u64,
        reason: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let info =
            self.registry.unregister(session_id).ok_or(DriverError::UnknownSession(session_id))?;

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "Session {session_id} closed after {} requests: {reason}",
                info.requests
            ),
        }])
    }

    fn handle_frame(
        &mut self,
        session_id: u64,
        frame: &Frame,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if !self.registry.touch(session_id, self.env.now()) {
            return Err(DriverError::UnknownSession(session_id));
        }

        let request_id = frame.header.request_id();
        let mut actions = Vec::with_capacity(2);

        let reply = match Payload::from_frame(frame) {
            Err(e) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("Malformed request {request_id} from {session_id}: {e}"),
                });
                Payload::error(ErrorCode::MalformedRequest, e.to_string())
            },
            Ok(payload) if payload.opcode().is_reply() => {
                Payload::error(ErrorCode::MalformedRequest, "reply opcode sent as request")
            },
            Ok(payload) => match self.execute(payload, request_id) {
                Ok(reply) => reply,
                Err(e) => {
                    let level = if e.is_retryable() { LogLevel::Warn } else { LogLevel::Debug };
                    actions.push(ServerAction::Log {
                        level,
                        message: format!("Request {request_id} from {session_id} rejected: {e}"),
                    });
                    Payload::error(e.code(), e.to_string())
                },
            },
        };

        let frame = match reply.into_frame(request_id) {
            Ok(frame) => frame,
            Err(e) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Error,
                    message: format!("Reply to request {request_id} not encodable: {e}"),
                });
                Payload::error(ErrorCode::Internal, e.to_string()).into_frame(request_id)?
            },
        };

        actions.push(ServerAction::SendToSession { session_id, frame });
        Ok(actions)
    }

    fn execute(&self, payload: Payload, request_id: u64) -> Result<Payload, ProgramError> {
        match payload {
            Payload::InitializeMaterial(ix) => {
                let actions = self.program.initialize_material(&ix, &self.storage)?;
                self.commit(&actions, request_id)
            },
            Payload::TransferMaterial(ix) => {
                let actions = self.program.transfer_material(&ix, &self.env, &self.storage)?;
                self.commit(&actions, request_id)
            },
            Payload::QuarantineMaterial(ix) => {
                let actions = self.program.quarantine_material(&ix, &self.storage)?;
                self.commit(&actions, request_id)
            },
            Payload::RegisterSigner(ix) => {
                let actions = self.program.register_signer(&ix, &self.storage)?;
                self.commit(&actions, request_id)
            },
            Payload::FetchMaterial(q) => {
                Ok(Payload::Material(self.program.fetch(&q.record, &self.storage)?))
            },
            Payload::ListMaterials(q) => {
                Ok(Payload::Materials(self.program.list_materials(q.limit, &self.storage)?))
            },
            Payload::ListTransfers(q) => {
                Ok(Payload::Transfers(self.program.list_transfers(&q, &self.storage)?))
            },
            Payload::FetchSigner(q) => {
                Ok(Payload::Signer(self.program.fetch_signer(&q.pubkey, &self.storage)?))
            },
            Payload::ListSigners(q) => {
                Ok(Payload::Signers(self.program.list_signers(&q, &self.storage)?))
            },
            // Reply opcodes are filtered out before dispatch.
            reply => Ok(Payload::error(
                ErrorCode::MalformedRequest,
                format!("unexpected {:?} request", reply.opcode()),
            )),
        }
    }

    /// Apply actions and build the reply: the written record's view, or an
    /// ack when no record was written.
    fn commit(&self, actions: &[ProgramAction], request_id: u64) -> Result<Payload, ProgramError> {
        apply_actions(actions, &self.storage)?;

        Ok(actions
            .iter()
            .rev()
            .find_map(ProgramAction::view)
            .map_or(Payload::Ack(Ack { request_id }), Payload::Material))
    }
}

impl<E, S> std::fmt::Debug for ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("sessions", &self.registry.session_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
