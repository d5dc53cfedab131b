//! Raw TCP transport for ser2net ports.

use std::io;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;
use crate::error::{Error, Result};

/// Transport over a plain TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    closed: bool,
}

impl TcpTransport {
    /// Connect to `host:port`.
    ///
    /// A refused connection is reported as [`Error::ConnectionBusy`]:
    /// for ser2net that means another session already owns the port or
    /// the daemon is down.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        debug!("tcp connect {host}:{port}");
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                Error::ConnectionBusy(format!("{host}:{port}"))
            } else {
                Error::Io(e)
            }
        })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await
    }
}
