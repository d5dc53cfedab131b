//! Console-driven power switches (telnet CLIs).

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use super::{Credentials, PowerController};
use crate::error::Result;
use crate::session::{ExpectPattern, Session, SessionConfig};
use crate::transport::{ProcessTransport, escapes};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

async fn telnet_session(host: &str, prompts: Vec<String>) -> Result<Session> {
    let transport = ProcessTransport::spawn(&format!("telnet {host}"), escapes::shell())?;
    let mut config = SessionConfig::default();
    config.prompts = prompts;
    config.tag = format!("power:{host}");
    Ok(Session::new(Box::new(transport), config))
}

async fn username_password_login(
    session: &mut Session,
    credentials: &Option<Credentials>,
) -> Result<()> {
    let (user, pass) = match credentials {
        Some(c) => (c.username.clone(), c.password().to_string()),
        None => ("admin".to_string(), "admin".to_string()),
    };
    session
        .expect_in(&[ExpectPattern::regex(r"[Uu]sername:")], LOGIN_TIMEOUT)
        .await?;
    session.sendline(&user).await?;
    session
        .expect_in(&[ExpectPattern::regex(r"[Pp]assword:")], LOGIN_TIMEOUT)
        .await?;
    session.sendline(&pass).await?;
    session.expect_prompt_in(LOGIN_TIMEOUT).await?;
    Ok(())
}

/// Raritan PX generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaritanModel {
    Px2,
    Px3,
}

/// Raritan PX2/PX3 rack PDU.
///
/// Has a native cycle command, so `reset` is a single `power outlets N
/// cycle /y` rather than the off/hold/on default.
pub struct RaritanPx {
    session: Session,
    outlet: String,
    model: RaritanModel,
}

impl RaritanPx {
    pub async fn connect(
        host: &str,
        outlet: &str,
        credentials: Option<Credentials>,
        model: RaritanModel,
    ) -> Result<Self> {
        let mut session = telnet_session(host, vec![r"# ".to_string()]).await?;
        username_password_login(&mut session, &credentials).await?;
        Ok(Self::with_session(session, outlet, model))
    }

    pub fn with_session(mut session: Session, outlet: &str, model: RaritanModel) -> Self {
        if session.prompts().is_empty() {
            session.set_prompts(vec![r"# ".to_string()]);
        }
        Self {
            session,
            outlet: outlet.to_string(),
            model,
        }
    }

    async fn outlet_command(&mut self, action: &str) -> Result<()> {
        let cmd = format!("power outlets {} {action} /y", self.outlet);
        debug!("{}: {cmd}", self.name());
        self.session.sendline(&cmd).await?;
        self.session.expect_prompt_in(COMMAND_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl PowerController for RaritanPx {
    fn name(&self) -> &str {
        match self.model {
            RaritanModel::Px2 => "raritan-px2",
            RaritanModel::Px3 => "raritan-px3",
        }
    }

    async fn power_on(&mut self) -> Result<()> {
        self.outlet_command("on").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.outlet_command("off").await
    }

    async fn reset(&mut self) -> Result<()> {
        self.outlet_command("cycle").await
    }
}

/// ServerTech Sentry Switched CDU.
pub struct SentrySwitchedCdu {
    session: Session,
    outlet: String,
}

impl SentrySwitchedCdu {
    pub async fn connect(
        host: &str,
        outlet: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let mut session = telnet_session(host, vec![r"Switched CDU: ".to_string()]).await?;
        username_password_login(&mut session, &credentials).await?;
        Ok(Self::with_session(session, outlet))
    }

    pub fn with_session(mut session: Session, outlet: &str) -> Self {
        if session.prompts().is_empty() {
            session.set_prompts(vec![r"Switched CDU: ".to_string()]);
        }
        Self {
            session,
            outlet: outlet.to_string(),
        }
    }

    async fn outlet_command(&mut self, action: &str) -> Result<()> {
        let cmd = format!("{action} .a{}", self.outlet);
        debug!("sentry: {cmd}");
        self.session.sendline(&cmd).await?;
        self.session
            .expect_in(
                &[ExpectPattern::regex(r"Command successful")],
                COMMAND_TIMEOUT,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PowerController for SentrySwitchedCdu {
    fn name(&self) -> &str {
        "sentry-cdu"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.outlet_command("on").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.outlet_command("off").await
    }

    async fn reset(&mut self) -> Result<()> {
        self.outlet_command("reboot").await
    }
}

/// APC switched rack PDU (AOS CLI).
///
/// No native cycle with a guaranteed hold, so `reset` stays the
/// default off/hold/on sequence.
pub struct ApcSwitch {
    session: Session,
    outlet: String,
}

impl ApcSwitch {
    pub async fn connect(
        host: &str,
        outlet: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let mut session = telnet_session(host, vec![r"apc>".to_string()]).await?;
        let (user, pass) = match &credentials {
            Some(c) => (c.username.clone(), c.password().to_string()),
            None => ("apc".to_string(), "apc".to_string()),
        };
        session
            .expect_in(&[ExpectPattern::regex(r"User Name :")], LOGIN_TIMEOUT)
            .await?;
        session.sendline(&user).await?;
        session
            .expect_in(&[ExpectPattern::regex(r"Password  ?:")], LOGIN_TIMEOUT)
            .await?;
        session.sendline(&pass).await?;
        session.expect_prompt_in(LOGIN_TIMEOUT).await?;
        Ok(Self::with_session(session, outlet))
    }

    pub fn with_session(mut session: Session, outlet: &str) -> Self {
        if session.prompts().is_empty() {
            session.set_prompts(vec![r"apc>".to_string()]);
        }
        Self {
            session,
            outlet: outlet.to_string(),
        }
    }

    async fn outlet_command(&mut self, verb: &str) -> Result<()> {
        let cmd = format!("{verb} {}", self.outlet);
        self.session.sendline(&cmd).await?;
        self.session
            .expect_in(&[ExpectPattern::regex(r"E000: Success")], COMMAND_TIMEOUT)
            .await?;
        self.session.expect_prompt_in(COMMAND_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl PowerController for ApcSwitch {
    fn name(&self) -> &str {
        "apc"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.outlet_command("olOn").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.outlet_command("olOff").await
    }
}

/// Koukaam NetIO-230 style switch (KSHELL protocol on its own port).
pub struct NetioSwitch {
    session: Session,
    outlet: String,
}

impl NetioSwitch {
    pub async fn connect(
        host: &str,
        outlet: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let mut session = telnet_session(host, vec![]).await?;
        let (user, pass) = match &credentials {
            Some(c) => (c.username.clone(), c.password().to_string()),
            None => ("admin".to_string(), "admin".to_string()),
        };
        session
            .expect_in(&[ExpectPattern::regex(r"100 HELLO")], LOGIN_TIMEOUT)
            .await?;
        session.sendline(&format!("login {user} {pass}")).await?;
        session
            .expect_in(&[ExpectPattern::regex(r"250 OK")], LOGIN_TIMEOUT)
            .await?;
        Ok(Self::with_session(session, outlet))
    }

    pub fn with_session(session: Session, outlet: &str) -> Self {
        Self {
            session,
            outlet: outlet.to_string(),
        }
    }

    async fn port_command(&mut self, state: u8) -> Result<()> {
        self.session
            .sendline(&format!("port {} {state}", self.outlet))
            .await?;
        self.session
            .expect_in(&[ExpectPattern::regex(r"250 OK")], COMMAND_TIMEOUT)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PowerController for NetioSwitch {
    fn name(&self) -> &str {
        "netio"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.port_command(1).await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.port_command(0).await
    }

    /// State 2 is the switch's own short off/on cycle.
    async fn reset(&mut self) -> Result<()> {
        self.port_command(2).await
    }
}
