//! Drives a [`Client`] over a live connection.

use anyhow::{Result, anyhow, bail};
use custody_client::{Client, ClientAction, ClientEvent};
use custody_server::SystemEnv;

use crate::connection::Connection;

/// A client state machine paired with a connection.
pub struct Session {
    client: Client<SystemEnv>,
    connection: Connection,
}

impl Session {
    /// Pair `client` with an open connection.
    pub fn new(client: Client<SystemEnv>, connection: Connection) -> Self {
        Self { client, connection }
    }

    /// The client state machine.
    pub fn client(&self) -> &Client<SystemEnv> {
        &self.client
    }

    /// Like [`Session::exchange`], but server rejections become errors
    /// carrying the server's reason.
    pub async fn call(&mut self, event: ClientEvent) -> Result<ClientAction> {
        match self.exchange(event).await? {
            ClientAction::RequestFailed { code, message, .. } => {
                Err(anyhow!("server rejected request ({code:?}): {message}"))
            },
            other => Ok(other),
        }
    }

    /// Feed one intent to the client, carry its request to the server, and
    /// return the action the reply resolved into.
    pub async fn exchange(&mut self, event: ClientEvent) -> Result<ClientAction> {
        let frame = match self.client.handle(event)?.into_iter().find_map(send_frame) {
            Some(frame) => frame,
            None => bail!("client produced no request"),
        };

        let timeout = self.client.config().request_timeout;
        let reply = match tokio::time::timeout(timeout, self.connection.request(&frame)).await {
            Ok(reply) => reply?,
            Err(_) => bail!("no reply within {timeout:?}"),
        };

        let mut outcome = None;
        for action in self.client.handle(ClientEvent::FrameReceived(reply))? {
            match action {
                ClientAction::Log { message } => tracing::info!("{}", message),
                other => outcome = Some(other),
            }
        }

        outcome.ok_or_else(|| anyhow!("reply resolved into no result"))
    }

    /// Close the connection.
    pub async fn close(self) {
        self.connection.close().await;
    }
}

fn send_frame(action: ClientAction) -> Option<custody_proto::Frame> {
    match action {
        ClientAction::Send(frame) => Some(frame),
        _ => None,
    }
}
