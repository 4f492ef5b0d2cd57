//! In-process server running the real `ServerDriver`.
//!
//! Tests either call [`SimServer::request`] directly or put the server on a
//! turmoil host with [`serve`], which answers frames arriving over
//! simulated TCP exactly the way the QUIC runtime does.

use std::{io, sync::Arc};

use custody_core::{MemoryStorage, Storage};
use custody_proto::Frame;
use custody_server::{DriverConfig, DriverError, LogLevel, ServerAction, ServerDriver, ServerEvent};
use tokio::sync::Mutex;

use crate::{
    SimEnv,
    sim_transport::{SimTransport, read_frame, write_frame},
};

/// Simulated server.
pub struct SimServer<S: Storage = MemoryStorage> {
    driver: ServerDriver<SimEnv, S>,
    next_session: u64,
}

/// Server shared between turmoil tasks.
pub type SharedSimServer<S = MemoryStorage> = Arc<Mutex<SimServer<S>>>;

/// Shared server over fresh in-memory storage.
pub fn create_shared_server(env: SimEnv) -> SharedSimServer {
    Arc::new(Mutex::new(SimServer::new(env)))
}

impl SimServer<MemoryStorage> {
    /// Server over fresh in-memory storage with default configuration.
    pub fn new(env: SimEnv) -> Self {
        Self::with_storage(env, MemoryStorage::new(), DriverConfig::default())
    }
}

impl<S: Storage> SimServer<S> {
    /// Server over `storage`.
    pub fn with_storage(env: SimEnv, storage: S, config: DriverConfig) -> Self {
        Self { driver: ServerDriver::new(env, storage, config), next_session: 1 }
    }

    /// Open a session. Returns `None` if the driver refused it.
    pub fn connect(&mut self) -> Result<Option<u64>, DriverError> {
        let session_id = self.next_session;
        self.next_session += 1;

        let actions = self.driver.process_event(ServerEvent::ConnectionAccepted { session_id })?;
        let refused = actions.iter().any(|a| matches!(a, ServerAction::CloseConnection { .. }));
        log_actions(&actions);

        Ok(if refused { None } else { Some(session_id) })
    }

    /// Close a session.
    pub fn disconnect(&mut self, session_id: u64) -> Result<(), DriverError> {
        let actions = self.driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "client disconnected".to_string(),
        })?;
        log_actions(&actions);
        Ok(())
    }

    /// Process one request frame and return the reply addressed to
    /// `session_id`.
    pub fn request(&mut self, session_id: u64, frame: Frame) -> Result<Option<Frame>, DriverError> {
        let actions = self.driver.process_event(ServerEvent::FrameReceived { session_id, frame })?;
        log_actions(&actions);

        Ok(actions.into_iter().find_map(|action| match action {
            ServerAction::SendToSession { session_id: target, frame } if target == session_id => {
                Some(frame)
            },
            _ => None,
        }))
    }

    /// The driver's storage.
    pub fn storage(&self) -> &S {
        self.driver.storage()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv, S> {
        &self.driver
    }
}

/// Accept connections on `transport` forever, answering each frame with the
/// driver's reply. Each connection gets its own session and task.
pub async fn serve<S: Storage + 'static>(
    server: SharedSimServer<S>,
    transport: SimTransport,
) -> io::Result<()> {
    loop {
        let (stream, peer) = transport.accept().await?;
        let server = Arc::clone(&server);

        tokio::spawn(async move {
            if let Err(e) = serve_connection(server, stream).await {
                tracing::debug!("Connection from {} ended: {}", peer, e);
            }
        });
    }
}

async fn serve_connection<S: Storage>(
    server: SharedSimServer<S>,
    mut stream: turmoil::net::TcpStream,
) -> io::Result<()> {
    let Some(session_id) = server.lock().await.connect().map_err(io::Error::other)? else {
        return Ok(());
    };

    let result = async {
        while let Some(frame) = read_frame(&mut stream).await? {
            let reply = server.lock().await.request(session_id, frame).map_err(io::Error::other)?;
            if let Some(reply) = reply {
                write_frame(&mut stream, &reply).await?;
            }
        }
        Ok(())
    }
    .await;

    server.lock().await.disconnect(session_id).map_err(io::Error::other)?;
    result
}

fn log_actions(actions: &[ServerAction]) {
    for action in actions {
        if let ServerAction::Log { level, message } = action {
            match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use custody_proto::{ListSigners, Payload};

    use super::*;

    #[test]
    fn request_returns_reply_for_session() {
        let mut server = SimServer::new(SimEnv::new());
        let session = server.connect().unwrap().unwrap();

        let query = ListSigners { after: None, limit: 10 };
        let frame = Payload::ListSigners(query).into_frame(5).unwrap();
        let reply = server.request(session, frame).unwrap().unwrap();

        assert_eq!(reply.header.request_id(), 5);
        assert_eq!(Payload::from_frame(&reply).unwrap(), Payload::Signers(vec![]));
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let mut server = SimServer::new(SimEnv::new());
        let a = server.connect().unwrap().unwrap();
        let b = server.connect().unwrap().unwrap();

        assert_ne!(a, b);
        assert_eq!(server.driver().session_count(), 2);

        server.disconnect(a).unwrap();
        assert_eq!(server.driver().session_count(), 1);
    }

    #[test]
    fn refused_connection_yields_none() {
        let config = DriverConfig { max_connections: 0, ..DriverConfig::default() };
        let mut server = SimServer::with_storage(SimEnv::new(), MemoryStorage::new(), config);

        assert_eq!(server.connect().unwrap(), None);
    }
}
