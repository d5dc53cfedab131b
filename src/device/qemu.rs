//! QEMU virtual boards.
//!
//! The transport is a locally spawned emulator. KVM acceleration is
//! opportunistic: when the host refuses it, the flag is stripped and the
//! emulator respawned. Reset goes through the emulator monitor rather
//! than a power outlet.

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use super::{BaseDevice, ConsoleDevice, DeviceIdentity};
use crate::error::{Error, Result};
use crate::session::{ExpectPattern, Session, SessionConfig};
use crate::transport::{ProcessTransport, escapes};

const KVM_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const BOOT_TIMEOUT_KVM: Duration = Duration::from_secs(60);
const BOOT_TIMEOUT_TCG: Duration = Duration::from_secs(180);
const MONITOR_TIMEOUT: Duration = Duration::from_secs(10);

/// A board emulated by a locally spawned QEMU process.
pub struct QemuBoard {
    base: BaseDevice,
    kvm: bool,
    spawn_cmd: String,
}

impl QemuBoard {
    /// Spawn the emulator, falling back to TCG when KVM is refused.
    pub async fn spawn(
        identity: DeviceIdentity,
        cmd: &str,
        config: SessionConfig,
    ) -> Result<Self> {
        let (session, kvm, spawn_cmd) = spawn_emulator(cmd, config).await?;
        Ok(Self {
            base: BaseDevice::new(identity, session),
            kvm,
            spawn_cmd,
        })
    }

    /// Wrap an already-open console (used by tests and respawns).
    pub fn from_session(identity: DeviceIdentity, session: Session, kvm: bool) -> Self {
        Self {
            base: BaseDevice::new(identity, session),
            kvm,
            spawn_cmd: String::new(),
        }
    }

    pub fn kvm(&self) -> bool {
        self.kvm
    }

    pub fn spawn_cmd(&self) -> &str {
        &self.spawn_cmd
    }

    /// Wait for the guest to boot, auto-logging in at a login prompt.
    pub async fn wait_for_boot(&mut self) -> Result<()> {
        let timeout = if self.kvm {
            BOOT_TIMEOUT_KVM
        } else {
            BOOT_TIMEOUT_TCG
        };

        let mut patterns = vec![ExpectPattern::regex(r"login:")];
        patterns.extend(
            self.base
                .session
                .prompts()
                .iter()
                .map(|p| ExpectPattern::regex(p.as_str())),
        );

        let idx = self.base.session.expect_in(&patterns, timeout).await?;
        if idx == 0 {
            self.base.session.sendline("root").await?;
            self.base.session.expect_prompt_in(MONITOR_TIMEOUT).await?;
        }
        Ok(())
    }

    /// Reset the guest through the emulator monitor.
    ///
    /// CTRL-A c toggles between console and monitor; `system_reset`
    /// reboots the guest without touching the host process.
    pub async fn monitor_reset(&mut self) -> Result<()> {
        self.base.session.sendcontrol('a').await?;
        self.base.session.send(b"c").await?;
        self.base
            .session
            .expect_in(&[ExpectPattern::regex(r"\(qemu\)")], MONITOR_TIMEOUT)
            .await?;
        self.base.session.sendline("system_reset").await?;
        // Back to the serial console for the reboot banner.
        self.base.session.sendcontrol('a').await?;
        self.base.session.send(b"c").await?;
        info!("{}: system_reset issued", self.base.identity.name);
        Ok(())
    }
}

/// Spawn the emulator command, stripping `-enable-kvm` when the host
/// cannot provide acceleration.
async fn spawn_emulator(
    cmd: &str,
    config: SessionConfig,
) -> Result<(Session, bool, String)> {
    let mut cmd = cmd.to_string();
    let mut kvm = cmd.contains("-enable-kvm");

    loop {
        let transport = ProcessTransport::spawn(&cmd, escapes::shell())?;
        let mut session = Session::new(Box::new(transport), config.clone());

        if kvm {
            let idx = session
                .expect_in(
                    &[
                        ExpectPattern::regex(
                            r"Device or resource busy|[Cc]annot allocate memory",
                        ),
                        ExpectPattern::Timeout,
                    ],
                    KVM_PROBE_TIMEOUT,
                )
                .await?;
            if idx == 0 {
                warn!("KVM unavailable, falling back to TCG");
                session.close().await?;
                cmd = cmd.replace("-enable-kvm", "");
                kvm = false;
                continue;
            }
        }
        return Ok((session, kvm, cmd));
    }
}

#[async_trait]
impl ConsoleDevice for QemuBoard {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    async fn reset(&mut self) -> Result<()> {
        self.monitor_reset().await
    }

    async fn get_seconds_uptime(&mut self) -> Result<f64> {
        self.base.get_seconds_uptime().await
    }

    async fn teardown(&mut self) -> Result<()> {
        // Quit the emulator cleanly before killing the transport.
        let _ = self.base.session.sendcontrol('a').await;
        let _ = self.base.session.send(b"c").await;
        let _ = self.base.session.sendline("quit").await;
        self.base.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Role;
    use crate::transport::ScriptedTransport;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new("qemu-x86", "board", Role::Board)
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.prompts = vec![r"# ".to_string()];
        config.timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test]
    async fn test_kvm_refusal_respawns_without_flag() {
        // The spawned shell prints a KVM failure; the flag rides along in
        // a comment so the stripped respawn stays runnable.
        let cmd = "echo 'kvm: Cannot allocate memory' # -enable-kvm";
        let (mut session, kvm, spawn_cmd) = spawn_emulator(cmd, config()).await.unwrap();
        assert!(!kvm);
        assert!(!spawn_cmd.contains("-enable-kvm"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_boot_auto_login() {
        let transport = ScriptedTransport::new()
            .say("Welcome to Buildroot\nbuildroot login: ")
            .on("root\n", "root\r\n# ");
        let session = Session::new(Box::new(transport), config());
        let mut board = QemuBoard::from_session(identity(), session, true);

        board.wait_for_boot().await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_reset_issues_system_reset() {
        let transport = ScriptedTransport::new().on_bytes(&[0x01, b'c'], "QEMU 7.2 monitor\r\n(qemu) ");
        let log = transport.write_log();
        let session = Session::new(Box::new(transport), config());
        let mut board = QemuBoard::from_session(identity(), session, true);

        board.monitor_reset().await.unwrap();
        assert!(log.contains("system_reset"));
    }
}
