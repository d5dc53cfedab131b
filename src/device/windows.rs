//! Windows hosts reached over telnet.
//!
//! Same device contract, different shell: `cmd.exe` prompts, `ipconfig`
//! instead of `ifconfig`, `ping -n` instead of `ping -c`.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{BaseDevice, ConsoleDevice, DeviceIdentity};
use crate::error::{Error, Result};
use crate::session::Session;

/// Default `cmd.exe` prompt.
pub const WINDOWS_PROMPT: &str = r"[A-Za-z]:\\[^\r\n>]*>";

pub struct WindowsTelnetHost {
    base: BaseDevice,
}

impl WindowsTelnetHost {
    pub fn new(identity: DeviceIdentity, mut session: Session) -> Self {
        if session.prompts().is_empty() {
            session.set_prompts(vec![WINDOWS_PROMPT.to_string()]);
        }
        Self {
            base: BaseDevice::new(identity, session),
        }
    }

    async fn ipconfig(&mut self, iface: &str) -> Result<String> {
        let output = self.base.session.check_output("ipconfig /all").await?;
        // Narrow to the section for the requested adapter.
        let mut section = String::new();
        let mut in_section = false;
        for line in output.lines() {
            if line.contains("adapter") {
                in_section = line.contains(iface);
                continue;
            }
            if in_section {
                section.push_str(line);
                section.push('\n');
            }
        }
        if section.is_empty() {
            return Err(Error::Config(format!("no adapter section for {iface}")));
        }
        Ok(section)
    }
}

#[async_trait]
impl ConsoleDevice for WindowsTelnetHost {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }

    async fn get_interface_ipaddr(&mut self, iface: &str) -> Result<Ipv4Addr> {
        let section = self.ipconfig(iface).await?;
        let re = Regex::new(r"IPv4 Address[ .]*: (\d{1,3}(?:\.\d{1,3}){3})")?;
        re.captures(&section)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| Error::Config(format!("no IPv4 address on {iface}")))
    }

    async fn get_interface_ip6addr(&mut self, iface: &str) -> Result<Ipv6Addr> {
        let section = self.ipconfig(iface).await?;
        let re = Regex::new(r"IPv6 Address[ .]*: ([0-9a-fA-F:]+)")?;
        re.captures(&section)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| Error::Config(format!("no IPv6 address on {iface}")))
    }

    async fn get_interface_macaddr(&mut self, iface: &str) -> Result<String> {
        let section = self.ipconfig(iface).await?;
        let re = Regex::new(r"Physical Address[ .]*: ([0-9A-Fa-f-]{17})")?;
        let mac = re
            .captures(&section)
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::Config(format!("no MAC address on {iface}")))?;
        Ok(mac.as_str().replace('-', ":").to_lowercase())
    }

    async fn ping(
        &mut self,
        dest: &str,
        source: Option<&str>,
        count: usize,
        _iface: Option<&str>,
    ) -> Result<bool> {
        let mut cmd = format!("ping -n {count}");
        if let Some(source) = source {
            cmd.push_str(&format!(" -S {source}"));
        }
        cmd.push(' ');
        cmd.push_str(dest);

        let window = Duration::from_secs(count as u64 * 2 + 5);
        let output = self.base.session.check_output_in(&cmd, window).await?;
        let re = Regex::new(r"Received = (\d+)")?;
        let received: usize = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Ok(received == count)
    }

    async fn get_seconds_uptime(&mut self) -> Result<f64> {
        Err(Error::Unsupported("get_seconds_uptime"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Role;
    use crate::session::SessionConfig;
    use crate::transport::ScriptedTransport;

    const IPCONFIG: &str = "ipconfig /all\r\n\
Ethernet adapter Ethernet0:\r\n\
   Physical Address. . . . . . . . . : 00-25-2E-34-43-77\r\n\
   IPv4 Address. . . . . . . . . . . : 192.168.1.50\r\n\
\r\nC:\\Users\\test>";

    fn host(transport: ScriptedTransport) -> WindowsTelnetHost {
        let mut config = SessionConfig::default();
        config.timeout = Duration::from_millis(500);
        let session = Session::new(Box::new(transport), config);
        WindowsTelnetHost::new(
            DeviceIdentity::new("win10", "wlan_client", Role::WlanClient),
            session,
        )
    }

    #[tokio::test]
    async fn test_ipv4_from_ipconfig() {
        let transport = ScriptedTransport::new().on("ipconfig /all\n", IPCONFIG);
        let mut h = host(transport);
        let ip = h.get_interface_ipaddr("Ethernet0").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 168, 1, 50));
    }

    #[tokio::test]
    async fn test_mac_normalized_to_colons() {
        let transport = ScriptedTransport::new().on("ipconfig /all\n", IPCONFIG);
        let mut h = host(transport);
        let mac = h.get_interface_macaddr("Ethernet0").await.unwrap();
        assert_eq!(mac, "00:25:2e:34:43:77");
    }

    #[tokio::test]
    async fn test_ping_counts_received() {
        let transport = ScriptedTransport::new().on(
            "ping -n 4 192.168.1.1\n",
            "ping -n 4 192.168.1.1\r\n    Packets: Sent = 4, Received = 4, Lost = 0\r\nC:\\Users\\test>",
        );
        let mut h = host(transport);
        assert!(h.ping("192.168.1.1", None, 4, None).await.unwrap());
    }
}
