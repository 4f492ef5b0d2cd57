//! Chain custody production server.
//!
//! This crate provides the production server implementation using:
//! - Quinn for QUIC transport
//! - Tokio for async runtime
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! custody-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ QuinnTransport     (QUIC via Quinn)
//!   ├─ ServerDriver       (Sans-IO orchestrator)
//!   ├─ CustodyProgram     (validation + state transitions)
//!   └─ Storage            (record persistence)
//! ```
//!
//! Every request is processed and its writes applied while holding the
//! driver lock, so concurrent transfers of one record are serialized.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod server_error;
mod system_env;
mod transport;

use std::sync::Arc;

use bytes::BytesMut;
use custody_core::{Environment, MemoryStorage};
use custody_proto::{Frame, FrameHeader};
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use registry::{ConnectionRegistry, SessionInfo};
pub use server_error::DriverError;
pub use system_env::SystemEnv;
use tokio::sync::Mutex;
pub use transport::{ALPN, QuinnConnection, QuinnTransport, TlsConfig};

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv, MemoryStorage>>>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// TLS certificate source
    pub tls: TlsConfig,
    /// Driver configuration (limits, program id)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            tls: TlsConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

/// Production custody server.
///
/// Wraps `ServerDriver` with Quinn QUIC transport and system environment.
pub struct Server {
    /// The Sans-IO server driver
    driver: ServerDriver<SystemEnv, MemoryStorage>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Binding to the address fails
    /// - TLS configuration is invalid
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let storage = MemoryStorage::new();
        let driver = ServerDriver::new(env.clone(), storage, config.driver);

        let transport = QuinnTransport::bind(&config.bind_address, &config.tls)?;

        Ok(Self { driver, transport, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// This method runs until the endpoint is closed.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            "Server starting on {} (program {})",
            self.transport.local_addr()?,
            self.driver.program().config().program_id
        );

        let driver: SharedDriver = Arc::new(Mutex::new(self.driver));
        let env = self.env;

        loop {
            match self.transport.accept().await {
                Ok(Some(conn)) => {
                    let driver = Arc::clone(&driver);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, env).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                },
                Ok(None) => {
                    tracing::info!("Endpoint closed, stopping");
                    return Ok(());
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: SharedDriver,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();

    tracing::debug!("New connection {} from {}", session_id, conn.remote_addr());

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id })?;
        if !execute_connection_actions(actions, &conn) {
            return Ok(());
        }
    }

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let driver = Arc::clone(&driver);
                let conn = conn.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, send, recv, driver, &conn).await {
                        tracing::debug!("Stream error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::debug!("Connection closed: {}", e);
                break;
            },
        }
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        execute_connection_actions(actions, &conn);
    }

    Ok(())
}

/// Handle a single bidirectional stream: read request frames until the peer
/// finishes its side, answering each on the same stream.
async fn handle_stream(
    session_id: u64,
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    driver: SharedDriver,
    conn: &QuinnConnection,
) -> Result<(), ServerError> {
    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + 1024);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(quinn::ReadExactError::FinishedEarly(0)) => break,
            Err(e) => {
                tracing::debug!("Read error: {}", e);
                break;
            },
        }

        let header = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Invalid frame header from {}: {}", session_id, e);
                break;
            },
        };

        let payload_size = header.payload_size();
        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("Payload read error: {}", e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Frame decode error: {}", e);
                break;
            },
        };

        let actions = {
            let mut driver = driver.lock().await;
            match driver.process_event(ServerEvent::FrameReceived { session_id, frame }) {
                Ok(actions) => actions,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Frame processing error: {}", e);
                    continue;
                },
            }
        };

        execute_actions(actions, &mut send, conn).await?;
    }

    let _ = send.finish();
    Ok(())
}

/// Execute actions that belong to a request stream.
async fn execute_actions(
    actions: Vec<ServerAction>,
    send: &mut quinn::SendStream,
    conn: &QuinnConnection,
) -> Result<(), ServerError> {
    for action in actions {
        match action {
            ServerAction::SendToSession { frame, .. } => {
                let buf = frame.to_vec()?;
                send.write_all(&buf).await.map_err(|e| ServerError::Transport(e.to_string()))?;
            },
            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                conn.close(&reason);
            },
            ServerAction::Log { level, message } => log(level, &message),
        }
    }

    Ok(())
}

/// Execute connection-level actions. Returns `false` if the connection was
/// closed.
fn execute_connection_actions(actions: Vec<ServerAction>, conn: &QuinnConnection) -> bool {
    let mut open = true;
    for action in actions {
        match action {
            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!("Closing connection {}: {}", session_id, reason);
                conn.close(&reason);
                open = false;
            },
            ServerAction::Log { level, message } => log(level, &message),
            ServerAction::SendToSession { session_id, .. } => {
                tracing::warn!("Dropping frame for {} outside a request stream", session_id);
            },
        }
    }
    open
}

fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}
