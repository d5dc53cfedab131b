//! Casa Systems CMTS.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{CmStatus, Cmts, to_cmts_mac};
use crate::device::{BaseDevice, ConsoleDevice};
use crate::error::{Error, Result};
use crate::session::ExpectPattern;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Casa C2200/C3200 head-end.
pub struct CasaCmts {
    base: BaseDevice,
    username: String,
    password: String,
}

impl CasaCmts {
    pub const PROMPTS: [&'static str; 2] = [r"CASA-[^\s>#]+> ", r"CASA-[^\s>#]+# "];

    pub fn new(mut base: BaseDevice, username: impl Into<String>, password: impl Into<String>) -> Self {
        base.session
            .set_prompts(Self::PROMPTS.iter().map(|p| p.to_string()).collect());
        Self {
            base,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Drive the login dialogue and enter enable mode.
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
        let idx = self
            .base
            .session
            .expect_in(
                &[
                    ExpectPattern::regex(r"[Pp]assword:"),
                    ExpectPattern::regex(Self::PROMPTS[1]),
                ],
                LOGIN_TIMEOUT,
            )
            .await?;
        if idx == 0 {
            let password = self.password.clone();
            self.base.session.sendline(&password).await?;
            self.base.session.expect_prompt_in(LOGIN_TIMEOUT).await?;
        }
        Ok(())
    }

    async fn show_modem(&mut self, mac: &str, suffix: &str) -> Result<String> {
        let cmd = if suffix.is_empty() {
            format!("show cable modem {mac}")
        } else {
            format!("show cable modem {mac} {suffix}")
        };
        self.base.session.check_output(&cmd).await
    }
}

#[async_trait]
impl ConsoleDevice for CasaCmts {
    fn base(&self) -> &BaseDevice {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDevice {
        &mut self.base
    }
}

#[async_trait]
impl Cmts for CasaCmts {
    async fn check_online(&mut self, cm_mac: &str) -> Result<CmStatus> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, "").await?;
        let re = Regex::new(
            r"(?m)\b(online\(p[kt]+\)|w-online|p-online|online|offline|init\([a-z0-9]+\)|ranging|reject\([a-z]+\))",
        )?;
        let status = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Config(format!("no status for modem {mac}")))?;
        if status.starts_with("online") {
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
        let output = self.show_modem(&mac, "").await?;
        let re = Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3})")?;
        let ip: Option<Ipv4Addr> = re
            .captures(&output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        // An unregistered modem shows the zero address.
        Ok(ip.filter(|ip| !ip.is_unspecified()))
    }

    async fn get_cmipv6(&mut self, cm_mac: &str) -> Result<Option<Ipv6Addr>> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, "ipv6").await?;
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
        let output = self.show_modem(&mac, "cpe").await?;
        let re = Regex::new(r"(?m)^(\d{1,3}(?:\.\d{1,3}){3})\s+(\S+)")?;
        for caps in re.captures_iter(&output) {
            let row_ip = caps.get(1).map(|m| m.as_str());
            let row_mac = caps.get(2).map(|m| m.as_str());
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
        let output = self.show_modem(&mac, "verbose").await?;
        let re = Regex::new(r"MAC Domain\s*:?\s*(\S+)")?;
        re.captures(&output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::Config(format!("no MAC domain for modem {mac}")))
    }

    async fn dut_chnl_lock(&mut self, cm_mac: &str) -> Result<(usize, usize)> {
        let mac = to_cmts_mac(cm_mac);
        let output = self.show_modem(&mac, "verbose").await?;
        let ds = count_channel_set(&output, "Downstream Channel Set")?;
        let us = count_channel_set(&output, "Upstream Channel Set")?;
        Ok((ds, us))
    }
}

/// Count the channel ids in a "... Channel Set : 1, 2, 3" line.
fn count_channel_set(output: &str, label: &str) -> Result<usize> {
    let re = Regex::new(&format!(r"{label}\s*:?\s*([\d, ]+)"))?;
    Ok(re
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split(',').filter(|s| !s.trim().is_empty()).count())
        .unwrap_or(0))
}
