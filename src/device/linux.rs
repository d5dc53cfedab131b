//! Generic Linux host devices: LAN and WAN clients, provisioner, syslog.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use regex::Regex;

use super::{BaseDevice, ConsoleDevice, DeviceIdentity};
use crate::error::{Error, Result};
use crate::session::Session;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// A Linux host reachable over a console: LAN client, WAN gateway,
/// provisioner or syslog sink depending on its role.
pub struct LinuxDevice {
    base: BaseDevice,
    tftp_root: String,
}

impl LinuxDevice {
    pub fn new(identity: DeviceIdentity, session: Session) -> Self {
        Self::from_base(BaseDevice::new(identity, session))
    }

    pub fn from_base(base: BaseDevice) -> Self {
        let tftp_root = base
            .tftp
            .as_ref()
            .map(|t| t.root.clone())
            .unwrap_or_else(|| "/tftpboot".to_string());
        Self { base, tftp_root }
    }

    /// Renew the DHCP lease on the LAN interface and learn the gateway.
    pub async fn start_lan_client(&mut self) -> Result<()> {
        let iface = self
            .base
            .lan_iface
            .clone()
            .ok_or(Error::Unsupported("start_lan_client without lan_iface"))?;
        info!("{}: renewing DHCP lease on {iface}", self.base.identity.name);

        self.base
            .session
            .check_output(&format!("killall dhclient; ip link set {iface} up"))
            .await?;
        self.base
            .session
            .check_output_in(&format!("dhclient -v {iface}"), Duration::from_secs(60))
            .await?;

        // Prove the lease and remember the default gateway.
        self.base.get_interface_ipaddr(&iface).await?;
        let routes = self.base.session.check_output("ip route show").await?;
        let re = Regex::new(r"default via (\d{1,3}(?:\.\d{1,3}){3})")?;
        self.base.lan_gateway = re
            .captures(&routes)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        Ok(())
    }

    /// Restart the TFTP daemon on a host serving images to loaders.
    pub async fn start_tftp_server(&mut self) -> Result<()> {
        self.base
            .session
            .check_output(&format!(
                "mkdir -p {root} && chmod a+rwx {root}",
                root = self.tftp_root
            ))
            .await?;
        self.base
            .session
            .check_output("service tftpd-hpa restart")
            .await?;
        Ok(())
    }

    /// Restart the DHCP daemon on a provisioner host.
    pub async fn restart_dhcp_server(&mut self) -> Result<()> {
        info!("{}: restarting DHCP server", self.base.identity.name);
        self.base
            .session
            .check_output_in("service isc-dhcp-server restart", Duration::from_secs(30))
            .await?;
        let status = self
            .base
            .session
            .check_output("service isc-dhcp-server status")
            .await?;
        if !status.contains("running") && !status.contains("active") {
            return Err(Error::Config("DHCP server failed to restart".to_string()));
        }
        Ok(())
    }

    /// Tail the syslog, for hosts acting as the syslog sink.
    pub async fn recent_syslog(&mut self, lines: usize) -> Result<String> {
        self.base
            .session
            .check_output(&format!("tail -n {lines} /var/log/syslog"))
            .await
    }
}

#[async_trait]
impl ConsoleDevice for LinuxDevice {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    async fn prepare_file(&mut self, uri: &str) -> Result<String> {
        let name = served_name(uri)
            .ok_or_else(|| Error::Config(format!("cannot derive a filename from '{uri}'")))?;
        let dest = format!("{}/{name}", self.tftp_root);

        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.base
                .session
                .check_output_in(&format!("curl -fsSL -o {dest} {uri}"), DOWNLOAD_TIMEOUT)
                .await?;
        } else {
            self.base
                .session
                .check_output_in(&format!("cp {uri} {dest}"), DOWNLOAD_TIMEOUT)
                .await?;
        }
        self.base
            .session
            .check_output(&format!("chmod a+r {dest}"))
            .await?;
        Ok(name)
    }

    async fn install_package(&mut self, uri: &str) -> Result<()> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let name = served_name(uri)
                .ok_or_else(|| Error::Config(format!("cannot derive a filename from '{uri}'")))?;
            self.base
                .session
                .check_output_in(&format!("curl -fsSL -o /tmp/{name} {uri}"), DOWNLOAD_TIMEOUT)
                .await?;
            self.base
                .session
                .check_output_in(&format!("dpkg -i /tmp/{name}"), DOWNLOAD_TIMEOUT)
                .await?;
        } else {
            self.base
                .session
                .check_output_in(
                    &format!("apt-get install -y {uri}"),
                    DOWNLOAD_TIMEOUT,
                )
                .await?;
        }
        Ok(())
    }
}

/// Last path segment of a URI or path, stripped of query strings.
fn served_name(uri: &str) -> Option<String> {
    let tail = uri.rsplit('/').next()?;
    let name = tail.split('?').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
