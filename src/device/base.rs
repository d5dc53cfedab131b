//! Base device: session ownership plus the Linux command vocabulary.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use log::debug;
use regex::Regex;

use super::{DeviceIdentity, TftpServer};
use crate::error::{Error, Result};
use crate::power::PowerController;
use crate::session::Session;

/// State shared by every device subtype.
pub struct BaseDevice {
    pub identity: DeviceIdentity,
    pub session: Session,
    /// Controller for the outlet this device owns, if wired to one.
    pub power: Option<Box<dyn PowerController>>,
    pub tftp: Option<TftpServer>,
    pub lan_iface: Option<String>,
    pub wan_iface: Option<String>,
    pub lan_gateway: Option<Ipv4Addr>,
}

impl BaseDevice {
    pub fn new(identity: DeviceIdentity, session: Session) -> Self {
        Self {
            identity,
            session,
            power: None,
            tftp: None,
            lan_iface: None,
            wan_iface: None,
            lan_gateway: None,
        }
    }

    pub fn with_power(mut self, power: Box<dyn PowerController>) -> Self {
        self.power = Some(power);
        self
    }

    pub fn with_tftp(mut self, tftp: TftpServer) -> Self {
        self.tftp = Some(tftp);
        self
    }

    pub fn with_lan_iface(mut self, iface: impl Into<String>) -> Self {
        self.lan_iface = Some(iface.into());
        self
    }

    pub fn with_wan_iface(mut self, iface: impl Into<String>) -> Self {
        self.wan_iface = Some(iface.into());
        self
    }

    pub async fn power_cycle(&mut self) -> Result<()> {
        debug!("power-cycling {}", self.identity.name);
        match self.power.as_mut() {
            Some(power) => power.reset().await,
            None => Err(Error::Unsupported("reset without a power controller")),
        }
    }

    /// IPv4 address of `iface`, from `ifconfig` output.
    pub async fn get_interface_ipaddr(&mut self, iface: &str) -> Result<Ipv4Addr> {
        let output = self.session.check_output(&format!("ifconfig {iface}")).await?;
        // Covers both net-tools ("inet addr:10.0.0.1") and busybox/iproute
        // ("inet 10.0.0.1") spellings.
        let re = Regex::new(r"inet (?:addr:)?(\d{1,3}(?:\.\d{1,3}){3})")?;
        let addr = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::Config(format!("no IPv4 address on {iface}")))?;
        addr.as_str()
            .parse()
            .map_err(|_| Error::Config(format!("bad IPv4 address on {iface}")))
    }

    /// Global-scope IPv6 address of `iface`.
    pub async fn get_interface_ip6addr(&mut self, iface: &str) -> Result<Ipv6Addr> {
        let output = self.session.check_output(&format!("ifconfig {iface}")).await?;
        let re = Regex::new(
            r"inet6 (?:addr: ?)?([0-9a-fA-F:]+)(?:/\d+)?[^\n]*(?:Scope:Global|scope global|<global>)",
        )?;
        let addr = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::Config(format!("no global IPv6 address on {iface}")))?;
        addr.as_str()
            .parse()
            .map_err(|_| Error::Config(format!("bad IPv6 address on {iface}")))
    }

    /// MAC address of `iface`.
    pub async fn get_interface_macaddr(&mut self, iface: &str) -> Result<String> {
        let output = self.session.check_output(&format!("ifconfig {iface}")).await?;
        let re = Regex::new(r"(?:HWaddr|ether) ([0-9A-Fa-f:]{17})")?;
        let mac = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .ok_or_else(|| Error::Config(format!("no MAC address on {iface}")))?;
        Ok(mac.as_str().to_lowercase())
    }

    /// Ping `dest` `count` times; true when every probe came back.
    pub async fn ping(
        &mut self,
        dest: &str,
        source: Option<&str>,
        count: usize,
        iface: Option<&str>,
    ) -> Result<bool> {
        let mut cmd = format!("ping -c {count}");
        if let Some(source) = source {
            cmd.push_str(&format!(" -I {source}"));
        } else if let Some(iface) = iface {
            cmd.push_str(&format!(" -I {iface}"));
        }
        cmd.push(' ');
        cmd.push_str(dest);

        // One second per probe plus slack for the resolver.
        let window = Duration::from_secs(count as u64 * 2 + 5);
        let output = self.session.check_output_in(&cmd, window).await?;
        Ok(parse_ping_received(&output) == Some(count))
    }

    /// Uptime in seconds, from `/proc/uptime`.
    pub async fn get_seconds_uptime(&mut self) -> Result<f64> {
        let output = self.session.check_output("cat /proc/uptime").await?;
        output
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::Config("unparseable /proc/uptime".to_string()))
    }
}

/// Parse "N received" / "N packets received" from ping output.
fn parse_ping_received(output: &str) -> Option<usize> {
    let re = Regex::new(r"(\d+) (?:packets )?received").ok()?;
    re.captures(output)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Role;
    use crate::session::SessionConfig;
    use crate::transport::ScriptedTransport;

    fn device(transport: ScriptedTransport) -> BaseDevice {
        let mut config = SessionConfig::default();
        config.prompts = vec![r"# ".to_string()];
        config.timeout = Duration::from_millis(500);
        let session = Session::new(Box::new(transport), config);
        BaseDevice::new(DeviceIdentity::new("linux", "lan", Role::Lan), session)
    }

    #[tokio::test]
    async fn test_interface_ipaddr_net_tools_format() {
        let transport = ScriptedTransport::new().on(
            "ifconfig eth0\n",
            "ifconfig eth0\r\neth0 Link encap:Ethernet HWaddr 00:25:2E:34:43:77\r\n\
             inet addr:10.0.0.42 Bcast:10.0.0.255 Mask:255.255.255.0\r\n# ",
        );
        let mut d = device(transport);
        let ip = d.get_interface_ipaddr("eth0").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 42));
    }

    #[tokio::test]
    async fn test_interface_ipaddr_missing() {
        let transport = ScriptedTransport::new().on(
            "ifconfig eth1\n",
            "ifconfig eth1\r\neth1 Link encap:Ethernet\r\n# ",
        );
        let mut d = device(transport);
        assert!(matches!(
            d.get_interface_ipaddr("eth1").await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_interface_macaddr_lowercased() {
        let transport = ScriptedTransport::new().on(
            "ifconfig eth0\n",
            "ifconfig eth0\r\neth0: flags=4163 ether 00:25:2E:34:43:77 txqueuelen 1000\r\n# ",
        );
        let mut d = device(transport);
        let mac = d.get_interface_macaddr("eth0").await.unwrap();
        assert_eq!(mac, "00:25:2e:34:43:77");
    }

    #[tokio::test]
    async fn test_ping_all_received() {
        let transport = ScriptedTransport::new().on(
            "ping -c 3 10.0.0.1\n",
            "ping -c 3 10.0.0.1\r\n3 packets transmitted, 3 packets received, 0% packet loss\r\n# ",
        );
        let mut d = device(transport);
        assert!(d.ping("10.0.0.1", None, 3, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_ping_partial_loss_is_false() {
        let transport = ScriptedTransport::new().on(
            "ping -c 3 10.0.0.1\n",
            "ping -c 3 10.0.0.1\r\n3 packets transmitted, 1 packets received, 66% packet loss\r\n# ",
        );
        let mut d = device(transport);
        assert!(!d.ping("10.0.0.1", None, 3, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_uptime() {
        let transport = ScriptedTransport::new().on(
            "cat /proc/uptime\n",
            "cat /proc/uptime\r\n1234.56 4000.00\r\n# ",
        );
        let mut d = device(transport);
        let uptime = d.get_seconds_uptime().await.unwrap();
        assert!((uptime - 1234.56).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_power_cycle_without_controller() {
        let mut d = device(ScriptedTransport::new());
        assert!(matches!(
            d.power_cycle().await,
            Err(Error::Unsupported(_))
        ));
    }
}
