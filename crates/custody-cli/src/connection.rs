//! QUIC connection to a custody server.
//!
//! Each request travels on its own bidirectional stream: the client writes
//! one frame and finishes its side, the server answers with one frame.

use std::{fs::File, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use custody_proto::{Frame, FrameHeader, MAX_PAYLOAD_SIZE};
use custody_server::ALPN;
use quinn::{Endpoint, crypto::rustls::QuicClientConfig};
use rustls::RootCertStore;

/// An established connection.
#[derive(Debug)]
pub struct Connection {
    endpoint: Endpoint,
    inner: quinn::Connection,
}

impl Connection {
    /// Connect to `server`, trusting only the certificates in `ca`.
    pub async fn connect(server: &str, server_name: &str, ca: &Path) -> Result<Self> {
        let addr: SocketAddr =
            server.parse().with_context(|| format!("invalid server address {server}"))?;

        let roots = load_roots(ca)?;
        let mut crypto = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(roots)
        .with_no_client_auth();
        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let quic = QuicClientConfig::try_from(crypto)?;
        let bind: SocketAddr = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }.parse()?;
        let mut endpoint = Endpoint::client(bind)?;
        endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic)));

        let inner = endpoint
            .connect(addr, server_name)?
            .await
            .with_context(|| format!("connecting to {addr}"))?;
        tracing::debug!("Connected to {}", addr);

        Ok(Self { endpoint, inner })
    }

    /// Send one request frame and wait for its reply.
    pub async fn request(&self, frame: &Frame) -> Result<Frame> {
        let (mut send, mut recv) = self.inner.open_bi().await.context("opening stream")?;
        send.write_all(&frame.to_vec()?).await.context("sending request")?;
        send.finish()?;

        let mut buf = vec![0u8; FrameHeader::SIZE];
        recv.read_exact(&mut buf).await.context("reading reply header")?;
        let header = FrameHeader::from_bytes(&buf)?;

        let payload_size = header.payload_size();
        if payload_size > MAX_PAYLOAD_SIZE {
            bail!("reply of {payload_size} bytes exceeds {MAX_PAYLOAD_SIZE}");
        }
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..]).await.context("reading reply body")?;

        Ok(Frame::decode(&buf)?)
    }

    /// Close the connection and wait for the peer to see it.
    pub async fn close(self) {
        self.inner.close(0u32.into(), b"done");
        self.endpoint.wait_idle().await;
    }
}

fn load_roots(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert.with_context(|| format!("parsing {}", path.display()))?;
        roots.add(cert).with_context(|| format!("trusting certificate in {}", path.display()))?;
    }

    if roots.is_empty() {
        bail!("no certificates in {}", path.display());
    }
    Ok(roots)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_ca_file_reported() {
        let err = load_roots(Path::new("/nonexistent/ca.pem")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn empty_ca_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "").unwrap();

        assert!(load_roots(&path).is_err());
    }
}
