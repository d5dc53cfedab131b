//! Station assembly and device ownership.
//!
//! The manager turns one station's configuration into live devices: the
//! board console plus the LAN, WAN and CMTS helpers wired around it. It
//! owns the devices for the run and tears their sessions down in reverse
//! construction order, board last.

use log::{info, warn};

use crate::config::{ConnectionType, RunOptions, StationConfig};
use crate::device::cmts::{ArrisCmts, CasaCmts};
use crate::device::{
    BaseDevice, ConsoleDevice, DeviceIdentity, LinuxDevice, OpenWrtRouter, QemuBoard, Role,
    RouterProfile, TftpServer,
};
use crate::error::Result;
use crate::power::{Credentials, get_power_device};
use crate::session::SessionConfig;
use crate::transport;

/// Owns every device of one station.
pub struct DeviceManager {
    devices: Vec<Box<dyn ConsoleDevice>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Open consoles to the station's devices and build the vocabulary
    /// objects around them.
    ///
    /// The board comes up first so helper failures leave a usable
    /// console for diagnosis. Helper devices are all optional.
    pub async fn from_station(
        name: &str,
        station: &StationConfig,
        options: &RunOptions,
    ) -> Result<Self> {
        let mut manager = Self::new();

        manager
            .devices
            .push(build_board(name, station, options).await?);
        info!("{name}: board console open ({})", station.board_type);

        if let Some(cmd) = &station.lan_device {
            manager
                .devices
                .push(build_helper(name, "lan", cmd, Role::Lan, options).await?);
        }
        if let Some(cmd) = &station.wan_device {
            let mut wan = build_helper(name, "wan", cmd, Role::Wan, options).await?;
            if let Some(tftp) = &station.tftp_server {
                let mut server = TftpServer::new(tftp.clone());
                if let Some(port) = station.tftp_port {
                    server.port = port;
                }
                wan.base_mut().tftp = Some(server);
            }
            manager.devices.push(wan);
        }
        if let Some(cmd) = &station.wlan_device {
            manager
                .devices
                .push(build_helper(name, "wlan", cmd, Role::WlanClient, options).await?);
        }
        if let Some(cmd) = &station.cmts_device {
            manager.devices.push(build_cmts(name, cmd, options).await?);
        }

        Ok(manager)
    }

    /// Add an already-constructed device (used by tests and custom rigs).
    pub fn push(&mut self, device: Box<dyn ConsoleDevice>) {
        self.devices.push(device);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The board under test.
    pub fn board_mut(&mut self) -> Option<&mut Box<dyn ConsoleDevice>> {
        self.by_role_mut(Role::Board)
    }

    /// First device with the given role.
    pub fn by_role_mut(&mut self, role: Role) -> Option<&mut Box<dyn ConsoleDevice>> {
        self.devices
            .iter_mut()
            .find(|d| d.identity().role == role)
    }

    /// All devices passing the predicate.
    pub fn filter_mut<P>(&mut self, mut predicate: P) -> Vec<&mut Box<dyn ConsoleDevice>>
    where
        P: FnMut(&DeviceIdentity) -> bool,
    {
        self.devices
            .iter_mut()
            .filter(|d| predicate(d.identity()))
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ConsoleDevice>> {
        self.devices.iter_mut()
    }

    /// Close every console, helpers first and the board last.
    ///
    /// Teardown keeps going past individual failures so one dead console
    /// cannot strand the rest; the first error is reported at the end.
    pub async fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;
        for device in self.devices.iter_mut().rev() {
            let name = device.identity().name.clone();
            if let Err(e) = device.teardown().await {
                warn!("{name}: teardown failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        self.devices.clear();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn build_board(
    name: &str,
    station: &StationConfig,
    options: &RunOptions,
) -> Result<Box<dyn ConsoleDevice>> {
    let identity = DeviceIdentity::new(station.board_type.clone(), name, Role::Board);
    let config = SessionConfig::for_device(name, options);

    if station.board_type.starts_with("qemu") {
        let board = QemuBoard::spawn(identity, station.conn_cmd.primary(), config).await?;
        return Ok(Box::new(board));
    }

    let session =
        transport::connect(station.connection_type, station.conn_cmd.primary(), config).await?;
    let mut base = BaseDevice::new(identity, session);

    if station.power.is_wired() {
        let credentials = match (&station.power.username, &station.power.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
            _ => None,
        };
        let power = get_power_device(
            station.power.ip.as_deref(),
            station.power.outlet.as_deref(),
            credentials,
        )
        .await?;
        base = base.with_power(power);
    }
    if let Some(tftp) = &station.tftp_server {
        let mut server = TftpServer::new(tftp.clone());
        if let Some(port) = station.tftp_port {
            server.port = port;
        }
        base = base.with_tftp(server);
    }

    Ok(Box::new(OpenWrtRouter::new(
        base,
        profile_for(&station.board_type),
    )))
}

/// Pick the router profile from the board model name.
fn profile_for(board_type: &str) -> RouterProfile {
    let lower = board_type.to_ascii_lowercase();
    if lower.contains("oe") || lower.contains("rdk") || lower.contains("yocto") {
        RouterProfile::openembedded()
    } else {
        RouterProfile::openwrt()
    }
}

async fn build_helper(
    station: &str,
    kind: &str,
    conn_cmd: &str,
    role: Role,
    options: &RunOptions,
) -> Result<Box<dyn ConsoleDevice>> {
    let tag = format!("{station}.{kind}");
    let config = SessionConfig::for_device(&tag, options);
    let session = transport::connect(ConnectionType::Telnet, conn_cmd, config).await?;
    let identity = DeviceIdentity::new("debian", tag, role);
    Ok(Box::new(LinuxDevice::new(identity, session)))
}

async fn build_cmts(
    station: &str,
    conn_cmd: &str,
    options: &RunOptions,
) -> Result<Box<dyn ConsoleDevice>> {
    let tag = format!("{station}.cmts");
    let config = SessionConfig::for_device(&tag, options);
    let session = transport::connect(ConnectionType::Telnet, conn_cmd, config).await?;

    // The head-end flavour rides in the connection command since the
    // station file has no separate model field for it.
    if conn_cmd.to_ascii_lowercase().contains("arris") {
        let identity = DeviceIdentity::new("arris-c4", tag, Role::Cmts);
        let base = BaseDevice::new(identity, session);
        let mut cmts = ArrisCmts::new(base, "admin", "admin", "admin");
        cmts.login().await?;
        Ok(Box::new(cmts))
    } else {
        let identity = DeviceIdentity::new("casa-c3200", tag, Role::Cmts);
        let base = BaseDevice::new(identity, session);
        let mut cmts = CasaCmts::new(base, "admin", "admin");
        cmts.login().await?;
        Ok(Box::new(cmts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transport::ScriptedTransport;

    fn linux(name: &str, role: Role) -> Box<dyn ConsoleDevice> {
        let transport = ScriptedTransport::new();
        let mut config = SessionConfig::default();
        config.prompts = vec![r"\$ ".to_string()];
        let session = Session::new(Box::new(transport), config);
        let identity = DeviceIdentity::new("debian", name, role);
        Box::new(LinuxDevice::new(identity, session))
    }

    #[tokio::test]
    async fn test_role_lookup() {
        let mut manager = DeviceManager::new();
        manager.push(linux("board", Role::Board));
        manager.push(linux("lan", Role::Lan));
        manager.push(linux("wan", Role::Wan));

        assert_eq!(manager.len(), 3);
        assert_eq!(manager.board_mut().unwrap().identity().name, "board");
        assert_eq!(
            manager.by_role_mut(Role::Wan).unwrap().identity().name,
            "wan"
        );
        assert!(manager.by_role_mut(Role::Cmts).is_none());
    }

    #[tokio::test]
    async fn test_filter_by_identity() {
        let mut manager = DeviceManager::new();
        manager.push(linux("board", Role::Board));
        manager.push(linux("lan1", Role::Lan));
        manager.push(linux("lan2", Role::Lan));

        let lans = manager.filter_mut(|id| id.role == Role::Lan);
        assert_eq!(lans.len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_clears_devices() {
        let mut manager = DeviceManager::new();
        manager.push(linux("board", Role::Board));
        manager.push(linux("lan", Role::Lan));

        manager.teardown().await.unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_profile_selection() {
        assert_eq!(profile_for("ap148").name, "openwrt");
        assert_eq!(profile_for("rdkb-arm").name, "openembedded");
    }
}
