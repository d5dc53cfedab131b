//! Arris (C4) CMTS.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{CmStatus, Cmts, to_cmts_mac};
use crate::device::{BaseDevice, ConsoleDevice};
use crate::error::{Error, Result};
use crate::session::ExpectPattern;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Arris C4 head-end.
///
/// Same contract as Casa with different command spellings: status is
/// reported as `Operational`, and channel locks come from the DCID/UCID
/// columns of the detail view.
pub struct ArrisCmts {
    base: BaseDevice,
    username: String,
    password: String,
    enable_password: String,
}

impl ArrisCmts {
    pub const PROMPTS: [&'static str; 2] = [r"[Aa]rris[^\s>#]*> ", r"[Aa]rris[^\s>#]*# "];

    pub fn new(
        mut base: BaseDevice,
        username: impl Into<String>,
        password: impl Into<String>,
        enable_password: impl Into<String>,
    ) -> Self {
        base.session
            .set_prompts(Self::PROMPTS.iter().map(|p| p.to_string()).collect());
        Self {
            base,
            username: username.into(),
            password: password.into(),
            enable_password: enable_password.into(),
        }
    }

    pub async fn login(&mut self) -> Result<()> {
        self.base
            .session
            .expect_in(&[ExpectPattern::regex(r"[Uu]sername:")], LOGIN_TIMEOUT)
            .await?;
        let username = self.username.clone();
        self.base.session.sendline(&username).await?;
        self.base
            .session
            .expect_in(&[ExpectPattern::regex(r"[Pp]assword:")], LOGIN_TIMEOUT)
            .await?;
        let password = self.password.clone();
        self.base.session.sendline(&password).await?;
        self.base.session.expect_prompt_in(LOGIN_TIMEOUT).await?;

        self.base.session.sendline("enable").await?;
        self.base
            .session
            .expect_in(&[ExpectPattern::regex(r"[Pp]assword:")], LOGIN_TIMEOUT)
            .await?;
        let enable = self.enable_password.clone();
        self.base.session.sendline(&enable).await?;
        self.base.session.expect_prompt_in(LOGIN_TIMEOUT).await?;

        // Disable paging so long tables arrive in one read.
        self.base.session.check_output("no pagination").await?;
        Ok(())
    }

    async fn show_modem(&mut self, mac: &str, detail: bool) -> Result<String> {
        let cmd = if detail {
            format!("show cable modem {mac} detail")
        } else {
            format!("show cable modem {mac}")
        };
        self.base.session.check_output(&cmd).await
    }
}

#[async_trait]
impl ConsoleDevice for ArrisCmts {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }
}

#[async_trait]
impl Cmts for ArrisCmts {
    async fn check_online(&mut self, cm_mac: &str) -> Result<CmStatus> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, false).await?;
        let re = Regex::new(
            r"(?m)\b(Operational|Registered|Ranging|Offline|Initializing|Denied)\b",
        )?;
        let status = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Config(format!("no status for modem {mac}")))?;
        if status == "Operational" {
            Ok(CmStatus::Online)
        } else {
            Ok(CmStatus::Other(status))
        }
    }

    async fn clear_offline(&mut self, cm_mac: &str) -> Result<()> {
        let mac = to_cmts_mac(cm_mac);
        self.base
            .session
            .check_output(&format!("clear cable modem {mac} offline"))
            .await?;
        Ok(())
    }

    async fn clear_cm_reset(&mut self, cm_mac: &str) -> Result<()> {
        let mac = to_cmts_mac(cm_mac);
        self.base
            .session
            .check_output(&format!("clear cable modem {mac} reset"))
            .await?;
        Ok(())
    }

    async fn get_cmip(&mut self, cm_mac: &str) -> Result<Option<Ipv4Addr>> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, false).await?;
        let re = Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3})")?;
        let ip: Option<Ipv4Addr> = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        Ok(ip.filter(|ip| !ip.is_unspecified()))
    }

    async fn get_cmipv6(&mut self, cm_mac: &str) -> Result<Option<Ipv6Addr>> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, true).await?;
        let re = Regex::new(r"([0-9a-fA-F]{1,4}(?::[0-9a-fA-F:]+)+)")?;
        Ok(re
            .captures(&output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()))
    }

    async fn get_mtaip(
        &mut self,
        cm_mac: &str,
        mta_mac: Option<&str>,
    ) -> Result<Option<Ipv4Addr>> {
        let mac = to_cmts_mac(cm_mac);
        let output = self
            .base
            .session
            .check_output(&format!("show cable modem {mac} cpe"))
            .await?;
        let re = Regex::new(r"(?m)^(\S+)\s+(\d{1,3}(?:\.\d{1,3}){3})")?;
        for caps in re.captures_iter(&output) {
            let row_mac = caps.get(1).map(|m| m.as_str());
            let row_ip = caps.get(2).map(|m| m.as_str());
            let wanted = mta_mac.map(to_cmts_mac);
            match (&wanted, row_mac) {
                (Some(w), Some(m)) if m.eq_ignore_ascii_case(w) => {
                    return Ok(row_ip.and_then(|ip| ip.parse().ok()));
                }
                (None, _) => return Ok(row_ip.and_then(|ip| ip.parse().ok())),
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn get_cm_mac_domain(&mut self, cm_mac: &str) -> Result<String> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, true).await?;
        let re = Regex::new(r"[Mm]ac [Dd]omain\s*:?\s*(\S+)")?;
        re.captures(&output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Config(format!("no MAC domain for modem {mac}")))
    }

    async fn dut_chnl_lock(&mut self, cm_mac: &str) -> Result<(usize, usize)> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, true).await?;
        let ds = count_ids(&output, "DCID")?;
        let us = count_ids(&output, "UCID")?;
        Ok((ds, us))
    }
}

/// Count ids in a "DCID : 1, 2, 3" style line.
fn count_ids(output: &str, label: &str) -> Result<usize> {
    let re = Regex::new(&format!(r"{label}s?\s*:?\s*([\d, ]+)"))?;
    Ok(re
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split(',').filter(|s| !s.trim().is_empty()).count())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceIdentity, Role};
    use crate::session::{Session, SessionConfig};
    use crate::transport::ScriptedTransport;

    fn cmts(transport: ScriptedTransport) -> ArrisCmts {
        let mut config = SessionConfig::default();
        config.timeout = Duration::from_millis(500);
        let session = Session::new(Box::new(transport), config);
        let base = BaseDevice::new(
            DeviceIdentity::new("arris-c4", "cmts", Role::Cmts),
            session,
        );
        ArrisCmts::new(base, "admin", "arris", "enable")
    }

    #[tokio::test]
    async fn test_operational_is_online() {
        let transport = ScriptedTransport::new().on(
            "show cable modem 0025.2e34.4377\n",
            "show cable modem 0025.2e34.4377\r\n\
             0025.2e34.4377  10.1.0.55  13/0  2/0  Operational\r\narris# ",
        );
        let mut c = cmts(transport);
        assert!(c.check_online("00:25:2e:34:43:77").await.unwrap().is_online());
    }

    #[tokio::test]
    async fn test_ranging_is_other() {
        let transport = ScriptedTransport::new().on(
            "show cable modem 0025.2e34.4377\n",
            "show cable modem 0025.2e34.4377\r\n\
             0025.2e34.4377  0.0.0.0  13/0  2/0  Ranging\r\narris# ",
        );
        let mut c = cmts(transport);
        assert_eq!(
            c.check_online("0025.2e34.4377").await.unwrap(),
            CmStatus::Other("Ranging".to_string())
        );
    }

    #[tokio::test]
    async fn test_dcid_ucid_counts() {
        let transport = ScriptedTransport::new().on(
            "show cable modem 0025.2e34.4377 detail\n",
            "show cable modem 0025.2e34.4377 detail\r\n\
             Mac Domain : 2\r\n\
             DCIDs      : 1, 2, 3, 4, 5, 6, 7, 8\r\n\
             UCIDs      : 1, 2, 3, 4\r\narris# ",
        );
        let mut c = cmts(transport);
        assert_eq!(c.dut_chnl_lock("0025.2e34.4377").await.unwrap(), (8, 4));
    }
}
