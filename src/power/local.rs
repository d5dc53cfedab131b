//! Local power controllers: shell commands, serial relays, SNMP and the
//! human fallback.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::PowerController;
use crate::error::{Error, Result};
use crate::session::{Session, SessionConfig};
use crate::transport::{ProcessTransport, escapes};

/// Run a shell command for each power action (`cmd://` outlets).
///
/// The configured command is invoked with `on`/`off` appended.
pub struct CommandPower {
    command: String,
}

impl CommandPower {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    async fn run(&self, action: &str) -> Result<()> {
        let cmd = format!("{} {action}", self.command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(Error::Config(format!("power command failed: {cmd}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PowerController for CommandPower {
    fn name(&self) -> &str {
        "cmd"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.run("on").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.run("off").await
    }
}

/// Relay board hanging off a local serial port (`serial://` outlets).
///
/// Drives the relay's line protocol through `cu`, like the serial
/// console transports do.
pub struct SerialRelay {
    session: Session,
}

impl SerialRelay {
    pub async fn connect(dev: &str) -> Result<Self> {
        let transport =
            ProcessTransport::spawn(&format!("cu -l {dev} -s 9600"), escapes::serial())?;
        let mut config = SessionConfig::default();
        config.tag = format!("relay:{dev}");
        Ok(Self {
            session: Session::new(Box::new(transport), config),
        })
    }

    pub fn with_session(session: Session) -> Self {
        Self { session }
    }

    async fn set(&mut self, state: &str) -> Result<()> {
        self.session.sendline(&format!("relay {state}")).await
    }
}

#[async_trait]
impl PowerController for SerialRelay {
    fn name(&self) -> &str {
        "serial-relay"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.set("on").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.set("off").await
    }
}

/// CyberPower PDU, driven through net-snmp's `snmpset`.
pub struct CyberPowerSnmp {
    address: String,
    outlet: String,
    community: String,
}

/// ePDUOutletControlOutletCommand for the CyberPower enterprise MIB.
const CYBERPOWER_OUTLET_OID: &str = "1.3.6.1.4.1.3808.1.1.3.3.3.1.1.4";

impl CyberPowerSnmp {
    pub fn new(address: &str, outlet: &str) -> Self {
        Self {
            address: address.to_string(),
            outlet: outlet.to_string(),
            community: "private".to_string(),
        }
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = community.into();
        self
    }

    async fn snmpset(&self, value: u8) -> Result<()> {
        let oid = format!("{CYBERPOWER_OUTLET_OID}.{}", self.outlet);
        let status = Command::new("snmpset")
            .args(["-v2c", "-c", &self.community, &self.address, &oid, "i"])
            .arg(value.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(Error::Config(format!(
                "snmpset failed for outlet {} at {}",
                self.outlet, self.address
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PowerController for CyberPowerSnmp {
    fn name(&self) -> &str {
        "cyberpower"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.snmpset(1).await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.snmpset(2).await
    }
}

/// Operator fallback when no controllable switch is configured.
///
/// Prints instructions and blocks until the operator confirms on stdin.
pub struct HumanButtonPusher {
    outlet: String,
}

impl HumanButtonPusher {
    pub fn new(outlet: &str) -> Self {
        Self {
            outlet: outlet.to_string(),
        }
    }

    async fn prompt(&self, action: &str) -> Result<()> {
        println!("=== operator action required ===");
        println!("Please switch power {action} for outlet '{}'", self.outlet);
        println!("Press Enter when done.");
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match tokio::time::timeout(Duration::from_secs(600), stdin.read_line(&mut line)).await {
            Ok(read) => {
                read?;
                info!("operator confirmed power {action}");
                Ok(())
            }
            Err(_) => {
                warn!("no operator confirmation within 10 minutes");
                Err(Error::Config("operator did not confirm power action".into()))
            }
        }
    }
}

#[async_trait]
impl PowerController for HumanButtonPusher {
    fn name(&self) -> &str {
        "human"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.prompt("ON").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.prompt("OFF").await
    }
}
