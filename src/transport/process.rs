//! Subprocess-backed transport.
//!
//! Runs the connection command under `sh -c` with piped stdio. This is
//! how local commands, telnet, serial terminal programs (`cu`) and
//! kermit are all attached; the only per-kind difference at this layer
//! is the escape sequence sent on close.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::Transport;
use crate::error::Result;

/// Escape sequences sent before terminating the child, per transport kind.
pub(crate) mod escapes {
    /// CTRL-C, for plain shell commands.
    pub fn shell() -> Vec<Vec<u8>> {
        vec![vec![0x03]]
    }

    /// `~.` on a fresh line, for `cu` and friends.
    pub fn serial() -> Vec<Vec<u8>> {
        vec![b"\r~.".to_vec()]
    }

    /// `~.` to drop back to the kermit prompt, then `quit`.
    pub fn kermit() -> Vec<Vec<u8>> {
        vec![b"\r~.".to_vec(), b"quit\r".to_vec()]
    }
}

/// Transport over a spawned subprocess.
pub struct ProcessTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    escape: Vec<Vec<u8>>,
    closed: bool,
}

impl ProcessTransport {
    /// Spawn `command` under `sh -c` with piped stdin/stdout.
    pub fn spawn(command: &str, escape: Vec<Vec<u8>>) -> Result<Self> {
        debug!("spawning: {command}");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout unavailable"))?;

        Ok(Self {
            child,
            stdin,
            stdout,
            escape,
            closed: false,
        })
    }

    /// Process id of the spawned child, if still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stdin.write_all(data).await?;
        self.stdin.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        for seq in std::mem::take(&mut self.escape) {
            if self.stdin.write_all(&seq).await.is_err() {
                break;
            }
            let _ = self.stdin.flush().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if let Err(e) = self.child.start_kill() {
            warn!("kill failed for transport child: {e}");
        }
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => warn!("transport child did not exit within 5s"),
        }
        Ok(())
    }
}
