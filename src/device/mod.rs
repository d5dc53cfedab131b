//! Devices: sessions specialized with a command vocabulary.
//!
//! A device owns exactly one console [`Session`](crate::session::Session)
//! plus its ancillary handles (power controller, TFTP server reference)
//! and presents the farm-wide command vocabulary over it. Subtypes share
//! the [`ConsoleDevice`] contract; operations a subtype cannot honor
//! fail with [`Error::Unsupported`], never silently no-op.

pub mod base;
pub mod boot;
pub mod cmts;
pub mod linux;
pub mod openwrt;
pub mod qemu;
pub mod windows;

pub use base::BaseDevice;
pub use boot::BootStage;
pub use linux::LinuxDevice;
pub use openwrt::{OpenWrtRouter, RouterProfile};
pub use qemu::QemuBoard;
pub use windows::WindowsTelnetHost;

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::session::Session;

/// Where a device sits in the station wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Board,
    Wan,
    Lan,
    Cmts,
    Provisioner,
    Pdu,
    Syslog,
    WlanClient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Board => "board",
            Role::Wan => "wan",
            Role::Lan => "lan",
            Role::Cmts => "cmts",
            Role::Provisioner => "provisioner",
            Role::Pdu => "pdu",
            Role::Syslog => "syslog",
            Role::WlanClient => "wlan_client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(model, name, role)` identity of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model: String,
    pub name: String,
    pub role: Role,
}

impl DeviceIdentity {
    pub fn new(model: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
            role,
        }
    }
}

/// Reference to the TFTP host used as the image-flashing rendezvous.
/// The device does not own the TFTP host.
#[derive(Debug, Clone)]
pub struct TftpServer {
    pub address: String,
    pub port: u16,
    pub root: String,
}

impl TftpServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: 69,
            root: "/tftpboot".to_string(),
        }
    }
}

/// The shared device contract.
///
/// Default methods implement the Linux-flavored vocabulary by delegating
/// to [`BaseDevice`]; subtypes override where their shell differs
/// (Windows) or where they genuinely support more (routers).
#[async_trait]
pub trait ConsoleDevice: Send {
    fn base(&self) -> &BaseDevice;

    fn base_mut(&mut self) -> &mut BaseDevice;

    fn identity(&self) -> &DeviceIdentity {
        &self.base().identity
    }

    fn session(&self) -> &Session {
        &self.base().session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.base_mut().session
    }

    /// Run a command and return its output (between echo and prompt).
    async fn check_output(&mut self, cmd: &str) -> Result<String> {
        self.base_mut().session.check_output(cmd).await
    }

    async fn check_output_in(&mut self, cmd: &str, timeout: Duration) -> Result<String> {
        self.base_mut().session.check_output_in(cmd, timeout).await
    }

    async fn get_interface_ipaddr(&mut self, iface: &str) -> Result<Ipv4Addr> {
        self.base_mut().get_interface_ipaddr(iface).await
    }

    async fn get_interface_ip6addr(&mut self, iface: &str) -> Result<Ipv6Addr> {
        self.base_mut().get_interface_ip6addr(iface).await
    }

    async fn get_interface_macaddr(&mut self, iface: &str) -> Result<String> {
        self.base_mut().get_interface_macaddr(iface).await
    }

    /// Ping `dest`, returning whether every probe came back.
    async fn ping(
        &mut self,
        dest: &str,
        source: Option<&str>,
        count: usize,
        iface: Option<&str>,
    ) -> Result<bool> {
        self.base_mut().ping(dest, source, count, iface).await
    }

    async fn get_seconds_uptime(&mut self) -> Result<f64> {
        self.base_mut().get_seconds_uptime().await
    }

    /// Keep a long-running shell alive.
    async fn touch(&mut self) -> Result<()> {
        self.base_mut().session.touch().await
    }

    /// Power-cycle the device through its outlet.
    async fn reset(&mut self) -> Result<()> {
        self.base_mut().power_cycle().await
    }

    /// Install a package from a URI staged via the TFTP server.
    async fn install_package(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("install_package"))
    }

    /// Stage a URL or local file on the TFTP server; returns the served name.
    async fn prepare_file(&mut self, _uri: &str) -> Result<String> {
        Err(Error::Unsupported("prepare_file"))
    }

    // Image flashing is router-family territory; everything else refuses.

    async fn flash_uboot(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("flash_uboot"))
    }

    async fn flash_rootfs(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("flash_rootfs"))
    }

    async fn flash_linux(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("flash_linux"))
    }

    async fn flash_meta(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("flash_meta"))
    }

    async fn prepare_nfsroot(&mut self, _uri: &str) -> Result<()> {
        Err(Error::Unsupported("prepare_nfsroot"))
    }

    async fn check_memory_addresses(&mut self) -> Result<()> {
        Err(Error::Unsupported("check_memory_addresses"))
    }

    async fn boot_linux(&mut self) -> Result<()> {
        Err(Error::Unsupported("boot_linux"))
    }

    async fn wait_for_linux(&mut self) -> Result<()> {
        Err(Error::Unsupported("wait_for_linux"))
    }

    async fn wait_for_mounts(&mut self) -> Result<()> {
        Err(Error::Unsupported("wait_for_mounts"))
    }

    async fn wait_for_network(&mut self) -> Result<()> {
        Err(Error::Unsupported("wait_for_network"))
    }

    async fn network_restart(&mut self) -> Result<()> {
        Err(Error::Unsupported("network_restart"))
    }

    /// Close the console and release the transport.
    async fn teardown(&mut self) -> Result<()> {
        self.base_mut().session.close().await
    }
}
