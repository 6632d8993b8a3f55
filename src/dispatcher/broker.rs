//! A minimal STOMP 1.2 client over TCP. The broker is an external
//! collaborator reached only over the wire, and no STOMP client crate is
//! part of this workspace's dependency stack, so the frame codec
//! (`frame.rs`) is hand-rolled and driven over a plain `tokio::net::TcpStream`,
//! the same shape as the hand-rolled RESP server in `src/protocol/server.rs`
//! reading into a `BytesMut` and decoding frames off the front of it in a
//! loop.
//!
//! The connection is split into a read half and a write half right away
//! (`TcpStream::into_split`) so the dispatcher's event loop can wait on
//! "next inbound frame" and "next outbound frame to write" in the same
//! `tokio::select!` without the two branches fighting over one `&mut`.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use super::frame::{FrameError, StompFrame};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("broker refused the connection: {0}")]
    ConnectRefused(String),
    #[error("broker closed the connection")]
    Closed,
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Connection details for one broker session.
#[derive(Debug, Clone)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub login: Option<(String, String)>,
}

pub struct BrokerReader {
    read: OwnedReadHalf,
    buf: BytesMut,
}

impl BrokerReader {
    /// Wait for the next frame. `Ok(None)` means the peer closed the
    /// connection cleanly.
    pub async fn recv(&mut self) -> BrokerResult<Option<StompFrame>> {
        loop {
            match StompFrame::decode(&mut self.buf) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) | Err(FrameError::Incomplete) => {
                    let mut tmp = [0u8; 4096];
                    let n = self.read.read(&mut tmp).await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    self.buf.extend_from_slice(&tmp[..n]);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub struct BrokerWriter {
    write: OwnedWriteHalf,
}

impl BrokerWriter {
    pub async fn send(&mut self, frame: StompFrame) -> BrokerResult<()> {
        self.write.write_all(&frame.encode()).await?;
        Ok(())
    }

    pub async fn subscribe(&mut self, destination: &str, id: &str, ack_mode: &str) -> BrokerResult<()> {
        self.send(
            StompFrame::new("SUBSCRIBE")
                .with_header("destination", destination)
                .with_header("id", id)
                .with_header("ack", ack_mode),
        )
        .await
    }

    pub async fn ack(&mut self, id: &str) -> BrokerResult<()> {
        self.send(StompFrame::new("ACK").with_header("id", id)).await
    }
}

/// Connect, perform the STOMP `CONNECT`/`CONNECTED` handshake, and hand back
/// the split reader/writer halves.
pub async fn connect(address: &BrokerAddress) -> BrokerResult<(BrokerWriter, BrokerReader)> {
    let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
    let (read_half, write_half) = stream.into_split();
    let mut writer = BrokerWriter { write: write_half };
    let mut reader = BrokerReader {
        read: read_half,
        buf: BytesMut::with_capacity(8 * 1024),
    };

    let mut connect_frame = StompFrame::new("CONNECT")
        .with_header("accept-version", "1.2")
        .with_header("host", address.vhost.clone());
    if let Some((login, passcode)) = &address.login {
        connect_frame = connect_frame.with_header("login", login.clone()).with_header("passcode", passcode.clone());
    }
    writer.send(connect_frame).await?;

    match reader.recv().await? {
        Some(frame) if frame.command == "CONNECTED" => {
            debug!(server = ?frame.header("server"), "connected to STOMP broker");
            Ok((writer, reader))
        }
        Some(frame) => Err(BrokerError::ConnectRefused(
            frame.header("message").unwrap_or(&frame.command).to_string(),
        )),
        None => Err(BrokerError::Closed),
    }
}
