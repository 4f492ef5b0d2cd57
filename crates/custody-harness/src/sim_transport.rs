//! Turmoil-backed transport.
//!
//! Frames travel over simulated TCP streams, back to back, with no extra
//! framing: the 24-byte header carries the body length.

use std::{io, net::SocketAddr};

use custody_proto::{Frame, FrameHeader, MAX_PAYLOAD_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use turmoil::net::{TcpListener, TcpStream};

/// Simulated network endpoint.
pub struct SimTransport {
    listener: Option<TcpListener>,
}

impl std::fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTransport").field("listening", &self.listener.is_some()).finish()
    }
}

impl SimTransport {
    /// Listen on `addr` inside the current turmoil host.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener: Some(listener) })
    }

    /// Endpoint that only dials out.
    pub fn client() -> Self {
        Self { listener: None }
    }

    /// Accept the next inbound stream.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match &self.listener {
            Some(listener) => listener.accept().await,
            None => {
                Err(io::Error::new(io::ErrorKind::Unsupported, "client transport cannot accept"))
            },
        }
    }

    /// Dial `host:port`, where `host` is a turmoil host name.
    pub async fn connect(&self, host: &str) -> io::Result<TcpStream> {
        TcpStream::connect(host).await
    }
}

/// Read one frame. Returns `Ok(None)` if the peer closed the stream before
/// a new header started.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Frame>> {
    let mut buf = vec![0u8; FrameHeader::SIZE];
    match reader.read_exact(&mut buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = FrameHeader::from_bytes(&buf).map_err(invalid_data)?;
    let payload_size = header.payload_size();
    if payload_size > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame body of {payload_size} bytes exceeds {MAX_PAYLOAD_SIZE}"),
        ));
    }

    buf.resize(FrameHeader::SIZE + payload_size, 0);
    reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;

    Frame::decode(&buf).map(Some).map_err(invalid_data)
}

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    let bytes = frame.to_vec().map_err(invalid_data)?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

fn invalid_data(e: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_role_only() {
        assert_eq!(format!("{:?}", SimTransport::client()), "SimTransport { listening: false }");
    }
}
