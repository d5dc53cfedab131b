//! Connection transports.
//!
//! A transport produces a raw bidirectional byte channel from a
//! configuration string. The expect machinery lives above this layer, in
//! [`crate::session`]; transports only read, write and close.
//!
//! The connect-time handshake for each [`ConnectionType`] (banner checks,
//! busy/auth detection) is driven here through a freshly wrapped
//! [`Session`], so the factory hands back a channel that is already past
//! its login/banner stage.

mod process;
mod scripted;
mod tcp;

pub use process::ProcessTransport;
pub(crate) use process::escapes;
pub use scripted::{ScriptedTransport, WriteLog};
pub use tcp::TcpTransport;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::config::ConnectionType;
use crate::error::{Error, Result};
use crate::session::{ExpectPattern, Session, SessionConfig};

/// Handshake window for all connection types.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// A raw bidirectional byte channel.
///
/// A read of zero bytes signals EOF. `close` must be idempotent and is
/// responsible for sending the transport's documented escape sequence
/// before tearing the channel down.
#[async_trait]
pub trait Transport: Send {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// Open a console session for the given connection type.
///
/// Fails with [`Error::ConnectionBusy`] on "connection refused" or EOF
/// during the handshake, and with [`Error::AuthRequired`] if a password
/// prompt is detected on a transport with no credential path.
pub async fn connect(
    kind: ConnectionType,
    conn_cmd: &str,
    config: SessionConfig,
) -> Result<Session> {
    debug!("opening {kind:?} connection: {conn_cmd}");
    match kind {
        ConnectionType::LocalCmd => connect_local_cmd(conn_cmd, config).await,
        ConnectionType::Telnet => connect_telnet(conn_cmd, config).await,
        ConnectionType::Ser2Net => connect_ser2net(conn_cmd, config).await,
        ConnectionType::LocalSerial => connect_serial(conn_cmd, config).await,
        ConnectionType::Kermit => connect_kermit(conn_cmd, config).await,
    }
}

async fn connect_local_cmd(conn_cmd: &str, config: SessionConfig) -> Result<Session> {
    let transport = ProcessTransport::spawn(conn_cmd, process::escapes::shell())?;
    Ok(Session::new(Box::new(transport), config))
}

async fn connect_telnet(conn_cmd: &str, config: SessionConfig) -> Result<Session> {
    let transport = ProcessTransport::spawn(conn_cmd, process::escapes::shell())?;
    let mut session = Session::new(Box::new(transport), config);

    let idx = session
        .expect_in(
            &[
                ExpectPattern::regex(r"Escape character is"),
                ExpectPattern::regex(r"Connection refused"),
                ExpectPattern::Eof,
            ],
            CONNECT_TIMEOUT,
        )
        .await?;
    match idx {
        0 => Ok(session),
        _ => Err(Error::ConnectionBusy(conn_cmd.to_string())),
    }
}

async fn connect_ser2net(conn_cmd: &str, config: SessionConfig) -> Result<Session> {
    // A bare host:port goes straight over TCP; anything else is a command
    // (typically telnet) that reaches the ser2net port.
    let mut session = match conn_cmd.rsplit_once(':') {
        Some((host, port)) if !conn_cmd.contains(' ') => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::Config(format!("bad ser2net port in '{conn_cmd}'")))?;
            let transport = TcpTransport::connect(host, port).await?;
            Session::new(Box::new(transport), config)
        }
        _ => {
            let transport = ProcessTransport::spawn(conn_cmd, process::escapes::shell())?;
            Session::new(Box::new(transport), config)
        }
    };

    let idx = session
        .expect_in(
            &[
                ExpectPattern::regex(r"ser2net port"),
                ExpectPattern::regex(r"[Pp]assword:"),
                ExpectPattern::regex(r"Connection refused"),
                ExpectPattern::Eof,
            ],
            CONNECT_TIMEOUT,
        )
        .await?;
    match idx {
        0 => Ok(session),
        1 => Err(Error::AuthRequired(format!(
            "ser2net port '{conn_cmd}' is password protected"
        ))),
        _ => Err(Error::ConnectionBusy(conn_cmd.to_string())),
    }
}

async fn connect_serial(conn_cmd: &str, config: SessionConfig) -> Result<Session> {
    let transport = ProcessTransport::spawn(conn_cmd, process::escapes::serial())?;
    let mut session = Session::new(Box::new(transport), config);

    // cu prints "Connected." once the line is open; a login prompt means
    // the device on the other end is already talking.
    session.sendline("").await?;
    let idx = session
        .expect_in(
            &[
                ExpectPattern::regex(r"Connected"),
                ExpectPattern::regex(r"login:"),
                ExpectPattern::regex(r"Line in use|cu: .*: Permission denied|cu: open"),
                ExpectPattern::Eof,
            ],
            CONNECT_TIMEOUT,
        )
        .await?;
    match idx {
        0 | 1 => Ok(session),
        _ => Err(Error::ConnectionBusy(conn_cmd.to_string())),
    }
}

async fn connect_kermit(conn_cmd: &str, config: SessionConfig) -> Result<Session> {
    let (host, port) = parse_host_port(conn_cmd)
        .ok_or_else(|| Error::Config(format!("cannot find host/port in '{conn_cmd}'")))?;

    let transport = ProcessTransport::spawn("kermit", process::escapes::kermit())?;
    let mut session = Session::new(Box::new(transport), config);

    let kermit_prompt = ExpectPattern::regex(r"C-Kermit>");
    session.expect_in(&[kermit_prompt.clone()], CONNECT_TIMEOUT).await?;

    // Telnet option negotiation stalls on raw ser2net ports.
    session
        .sendline("set telnet wait-for-negotiations off")
        .await?;
    session.expect_in(&[kermit_prompt.clone()], CONNECT_TIMEOUT).await?;

    session.sendline(&format!("set host {host} {port}")).await?;
    session.expect_in(&[kermit_prompt], CONNECT_TIMEOUT).await?;

    session.sendline("connect").await?;
    let idx = session
        .expect_in(
            &[
                ExpectPattern::regex(r"Connecting to"),
                ExpectPattern::regex(r"Connection refused|Can't connect"),
                ExpectPattern::Eof,
            ],
            CONNECT_TIMEOUT,
        )
        .await?;
    match idx {
        0 => Ok(session),
        _ => Err(Error::ConnectionBusy(conn_cmd.to_string())),
    }
}

/// Extract `host port` from command strings like `telnet 10.0.0.1 6000`
/// or a bare `10.0.0.1:6000`.
fn parse_host_port(conn_cmd: &str) -> Option<(String, u16)> {
    let tokens: Vec<&str> = conn_cmd.split_whitespace().collect();
    match tokens.as_slice() {
        [addr] => {
            let (host, port) = addr.rsplit_once(':')?;
            Some((host.to_string(), port.parse().ok()?))
        }
        [.., host, port] => Some((host.to_string(), port.parse().ok()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("telnet 10.0.0.1 6000"),
            Some(("10.0.0.1".to_string(), 6000))
        );
        assert_eq!(
            parse_host_port("10.0.0.1:6000"),
            Some(("10.0.0.1".to_string(), 6000))
        );
        assert_eq!(parse_host_port("telnet"), None);
    }

    #[tokio::test]
    async fn test_local_cmd_session_echo() {
        // Scenario: `cat` as an echoing transport.
        let mut session = connect(
            ConnectionType::LocalCmd,
            "cat",
            SessionConfig::default(),
        )
        .await
        .unwrap();

        session.sendline("hello").await.unwrap();
        let idx = session
            .expect_in(&[ExpectPattern::regex("hello")], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(idx, 0);
        assert!(session.before().trim().is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ser2net_rejects_password_protected_port() {
        let transport = ScriptedTransport::new().say("Password: ");
        let mut session = Session::new(Box::new(transport), SessionConfig::default());
        let idx = session
            .expect_in(
                &[
                    ExpectPattern::regex(r"ser2net port"),
                    ExpectPattern::regex(r"[Pp]assword:"),
                ],
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(idx, 1);
    }
}
