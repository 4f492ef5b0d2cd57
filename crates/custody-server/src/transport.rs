//! QUIC transport via Quinn.
//!
//! Clients open one bidirectional stream per request batch. Each request is
//! a complete frame and is answered on the same stream.

use std::{
    fs::File,
    io::BufReader,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use quinn::{Endpoint, crypto::rustls::QuicServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ServerError;

/// ALPN protocol id spoken by custody clients and servers.
pub const ALPN: &[u8] = b"chaincustody/1";

/// Where the server's TLS identity comes from.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Certificate chain (PEM). Self-signed when absent.
    pub cert_path: Option<PathBuf>,
    /// Private key (PEM). Self-signed when absent.
    pub key_path: Option<PathBuf>,
    /// Write the certificate in use to this path (PEM), so clients can pin it.
    pub write_cert_path: Option<PathBuf>,
}

/// Server-side QUIC endpoint.
#[derive(Debug)]
pub struct QuinnTransport {
    endpoint: Endpoint,
}

/// An accepted QUIC connection.
#[derive(Debug, Clone)]
pub struct QuinnConnection {
    inner: quinn::Connection,
}

impl QuinnTransport {
    /// Bind a QUIC endpoint on `addr`. Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `addr` does not parse
    /// - only one of certificate and key is given, or either cannot be read
    /// - the UDP socket cannot be bound
    pub fn bind(addr: &str, tls: &TlsConfig) -> Result<Self, ServerError> {
        let addr: SocketAddr =
            addr.parse().map_err(|e| ServerError::Config(format!("bind address {addr}: {e}")))?;

        let identity = match (&tls.cert_path, &tls.key_path) {
            (Some(cert), Some(key)) => load_identity(cert, key)?,
            (None, None) => self_signed()?,
            _ => {
                return Err(ServerError::Config(
                    "certificate and key must be given together".to_string(),
                ));
            },
        };

        if let Some(path) = &tls.write_cert_path {
            write_cert_pem(path, &identity.cert_pem)?;
            tracing::info!("Wrote server certificate to {}", path.display());
        }

        let mut crypto = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(identity.certs, identity.key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;
        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let quic = QuicServerConfig::try_from(crypto).map_err(|e| ServerError::Tls(e.to_string()))?;
        let config = quinn::ServerConfig::with_crypto(Arc::new(quic));

        let endpoint = Endpoint::server(config, addr)?;
        Ok(Self { endpoint })
    }

    /// Wait for the next connection to complete its handshake.
    ///
    /// Returns `Ok(None)` once the endpoint is closed.
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, ServerError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };
        let inner = incoming.await.map_err(|e| ServerError::Transport(e.to_string()))?;
        Ok(Some(QuinnConnection { inner }))
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Stop accepting and close all connections.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server shutdown");
    }
}

impl QuinnConnection {
    /// Wait for the peer to open a bidirectional stream.
    pub async fn accept_bi(&self) -> Result<(quinn::SendStream, quinn::RecvStream), ServerError> {
        self.inner.accept_bi().await.map_err(|e| ServerError::Transport(e.to_string()))
    }

    /// Peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_address()
    }

    /// Close the connection with a reason.
    pub fn close(&self, reason: &str) {
        self.inner.close(0u32.into(), reason.as_bytes());
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("open {}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("open {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::Tls(format!("parse {}: {e}", path.display())))?
        .ok_or_else(|| ServerError::Tls(format!("no private key in {}", path.display())))
}

struct Identity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    cert_pem: String,
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity, ServerError> {
    let cert_pem = std::fs::read_to_string(cert)
        .map_err(|e| ServerError::Tls(format!("read {}: {e}", cert.display())))?;
    Ok(Identity { certs: load_certs(cert)?, key: load_key(key)?, cert_pem })
}

fn self_signed() -> Result<Identity, ServerError> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    Ok(Identity {
        certs: vec![certified.cert.der().clone()],
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der())),
        cert_pem: certified.cert.pem(),
    })
}

fn write_cert_pem(path: &Path, pem: &str) -> Result<(), ServerError> {
    std::fs::write(path, pem)
        .map_err(|e| ServerError::Config(format!("write {}: {e}", path.display())))
}
