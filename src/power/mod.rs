//! Power controllers.
//!
//! One contract over many PDU models: `power_on`, `power_off` and
//! `reset`, where the default reset is off, a mandatory hold, then on.
//! Models with a native cycle command (Raritan, NetIO, Sentry) override
//! `reset` with it. Selection runs through [`get_power_device`]: an
//! explicit outlet URI scheme wins, an address-less configuration falls
//! back to a human operator, and anything else is identified by
//! fetching the switch's web root and matching vendor markers.

mod console;
mod http;
mod local;

pub use console::{ApcSwitch, NetioSwitch, RaritanModel, RaritanPx, SentrySwitchedCdu};
pub use http::{DliSwitch, Ip9258Switch, WemoSwitch};
pub use local::{CommandPower, CyberPowerSnmp, HumanButtonPusher, SerialRelay};

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Minimum off-to-on hold during a default reset.
pub const RESET_HOLD: Duration = Duration::from_secs(5);

/// Username/password pair for a switch.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Uniform power switch contract.
///
/// An outlet is owned by exactly one device; cycle sequences are not
/// atomic and must not be interleaved with other actions on the same
/// controller.
#[async_trait]
pub trait PowerController: Send {
    /// Model label for logs.
    fn name(&self) -> &str;

    async fn power_on(&mut self) -> Result<()>;

    async fn power_off(&mut self) -> Result<()>;

    /// Cycle the outlet: off, hold at least [`RESET_HOLD`], on.
    async fn reset(&mut self) -> Result<()> {
        info!("{}: power cycling", self.name());
        self.power_off().await?;
        tokio::time::sleep(RESET_HOLD).await;
        self.power_on().await
    }
}

/// Switch vendors recognisable from their web root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Dli,
    Sentry,
    Apc,
    Ip9258,
    Ip9820,
    CyberPower,
}

/// Match vendor markers in the HTML of a switch's web root.
pub fn identify_vendor(html: &str) -> Option<Vendor> {
    const MARKERS: [(&str, Vendor); 6] = [
        ("<title>Power Controller", Vendor::Dli),
        ("Sentry Switched CDU", Vendor::Sentry),
        ("<title>APC", Vendor::Apc),
        ("IP9258", Vendor::Ip9258),
        ("IP9820", Vendor::Ip9820),
        ("Cyber Power Systems", Vendor::CyberPower),
    ];
    MARKERS
        .iter()
        .find(|(marker, _)| html.contains(marker))
        .map(|(_, vendor)| *vendor)
}

/// Factory-default credentials tried after a 401, per vendor.
fn default_credentials() -> Vec<Credentials> {
    vec![
        Credentials::new("admin", "1234"),
        Credentials::new("admn", "admn"),
        Credentials::new("apc", "apc"),
        Credentials::new("admin", "12345678"),
        Credentials::new("cyber", "cyber"),
    ]
}

/// Outlet URI schemes with dedicated constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Wemo,
    Serial,
    Cmd,
    Px2,
    Px3,
    Netio,
}

const SCHEMES: [(&str, Scheme); 6] = [
    ("wemo", Scheme::Wemo),
    ("serial", Scheme::Serial),
    ("cmd", Scheme::Cmd),
    ("px2", Scheme::Px2),
    ("px3", Scheme::Px3),
    ("netio", Scheme::Netio),
];

/// Split an outlet string like `px3://10.0.0.9;3` into scheme and target.
fn parse_outlet_uri(outlet: &str) -> Option<(Scheme, &str)> {
    let (scheme, rest) = outlet.split_once("://")?;
    let scheme = SCHEMES
        .iter()
        .find(|(name, _)| *name == scheme)
        .map(|(_, s)| *s)?;
    Some((scheme, rest))
}

/// Split `host;outlet` targets used by the console-driven schemes.
fn split_target(rest: &str) -> (String, String) {
    match rest.split_once(';') {
        Some((host, outlet)) => (host.to_string(), outlet.to_string()),
        None => (rest.to_string(), "1".to_string()),
    }
}

/// Build the controller for a device's power wiring.
///
/// Selection order: outlet URI scheme, human fallback when no address
/// is configured, then HTTP vendor identification (with a credential
/// retry pass on 401).
pub async fn get_power_device(
    address: Option<&str>,
    outlet: Option<&str>,
    credentials: Option<Credentials>,
) -> Result<Box<dyn PowerController>> {
    if let Some((scheme, rest)) = outlet.and_then(parse_outlet_uri) {
        debug!("power scheme dispatch: {scheme:?} -> {rest}");
        return match scheme {
            Scheme::Wemo => Ok(Box::new(WemoSwitch::new(rest))),
            Scheme::Serial => Ok(Box::new(SerialRelay::connect(rest).await?)),
            Scheme::Cmd => Ok(Box::new(CommandPower::new(rest))),
            Scheme::Px2 => {
                let (host, outlet) = split_target(rest);
                let px =
                    RaritanPx::connect(&host, &outlet, credentials, RaritanModel::Px2).await?;
                Ok(Box::new(px))
            }
            Scheme::Px3 => {
                let (host, outlet) = split_target(rest);
                let px =
                    RaritanPx::connect(&host, &outlet, credentials, RaritanModel::Px3).await?;
                Ok(Box::new(px))
            }
            Scheme::Netio => {
                let (host, outlet) = split_target(rest);
                Ok(Box::new(NetioSwitch::connect(&host, &outlet, credentials).await?))
            }
        };
    }

    let Some(address) = address else {
        return Ok(Box::new(HumanButtonPusher::new(outlet.unwrap_or("?"))));
    };
    let outlet = outlet.unwrap_or("1").to_string();

    let client = reqwest::Client::new();
    let (vendor, working) = identify_over_http(&client, address, credentials.clone()).await?;
    build_identified(vendor, address, &outlet, working).await
}

/// Fetch the switch's web root and identify its vendor, retrying 401s
/// with the supplied credentials and then each vendor default pair.
pub async fn identify_over_http(
    client: &reqwest::Client,
    address: &str,
    credentials: Option<Credentials>,
) -> Result<(Vendor, Option<Credentials>)> {
    let url = format!("http://{address}/");

    let response = client.get(&url).send().await?;
    if response.status() != reqwest::StatusCode::UNAUTHORIZED {
        let html = response.text().await?;
        let vendor = identify_vendor(&html).ok_or_else(|| Error::UnknownPowerDevice {
            address: address.to_string(),
        })?;
        return Ok((vendor, credentials));
    }

    let mut candidates = Vec::new();
    candidates.extend(credentials);
    candidates.extend(default_credentials());

    for creds in candidates {
        let response = client
            .get(&url)
            .basic_auth(&creds.username, Some(creds.password()))
            .send()
            .await?;
        if !response.status().is_success() {
            continue;
        }
        let html = response.text().await?;
        if let Some(vendor) = identify_vendor(&html) {
            return Ok((vendor, Some(creds)));
        }
    }
    Err(Error::UnknownPowerDevice {
        address: address.to_string(),
    })
}

async fn build_identified(
    vendor: Vendor,
    address: &str,
    outlet: &str,
    credentials: Option<Credentials>,
) -> Result<Box<dyn PowerController>> {
    info!("identified {vendor:?} power switch at {address}");
    Ok(match vendor {
        Vendor::Dli => Box::new(DliSwitch::new(address, outlet, credentials)),
        Vendor::Ip9258 => Box::new(Ip9258Switch::new(address, outlet, credentials, false)),
        Vendor::Ip9820 => Box::new(Ip9258Switch::new(address, outlet, credentials, true)),
        Vendor::CyberPower => Box::new(CyberPowerSnmp::new(address, outlet)),
        Vendor::Sentry => {
            Box::new(SentrySwitchedCdu::connect(address, outlet, credentials).await?)
        }
        Vendor::Apc => Box::new(ApcSwitch::connect(address, outlet, credentials).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        On,
        Off,
    }

    struct RecordingController {
        events: Arc<Mutex<Vec<(Event, tokio::time::Instant)>>>,
    }

    #[async_trait]
    impl PowerController for RecordingController {
        fn name(&self) -> &str {
            "recording"
        }

        async fn power_on(&mut self) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((Event::On, tokio::time::Instant::now()));
            Ok(())
        }

        async fn power_off(&mut self) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((Event::Off, tokio::time::Instant::now()));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_reset_is_off_hold_on() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut controller = RecordingController {
            events: events.clone(),
        };

        controller.reset().await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, Event::Off);
        assert_eq!(events[1].0, Event::On);
        assert!(events[1].1.duration_since(events[0].1) >= RESET_HOLD);
    }

    #[test]
    fn test_identify_vendor_markers() {
        assert_eq!(
            identify_vendor("<html><title>Power Controller</title>"),
            Some(Vendor::Dli)
        );
        assert_eq!(
            identify_vendor("... Sentry Switched CDU v7 ..."),
            Some(Vendor::Sentry)
        );
        assert_eq!(identify_vendor("<title>APC | Login</title>"), Some(Vendor::Apc));
        assert_eq!(identify_vendor("model IP9258 rev2"), Some(Vendor::Ip9258));
        assert_eq!(identify_vendor("model IP9820"), Some(Vendor::Ip9820));
        assert_eq!(
            identify_vendor("(c) Cyber Power Systems"),
            Some(Vendor::CyberPower)
        );
        assert_eq!(identify_vendor("<html>hello</html>"), None);
    }

    #[test]
    fn test_parse_outlet_uri() {
        assert_eq!(
            parse_outlet_uri("px3://10.0.0.9;3"),
            Some((Scheme::Px3, "10.0.0.9;3"))
        );
        assert_eq!(
            parse_outlet_uri("cmd://power-strip toggle"),
            Some((Scheme::Cmd, "power-strip toggle"))
        );
        assert_eq!(parse_outlet_uri("3"), None);
        assert_eq!(parse_outlet_uri("ftp://x"), None);
    }

    #[test]
    fn test_split_target() {
        assert_eq!(
            split_target("10.0.0.9;3"),
            ("10.0.0.9".to_string(), "3".to_string())
        );
        assert_eq!(split_target("10.0.0.9"), ("10.0.0.9".to_string(), "1".to_string()));
    }

    async fn serve_once(listener: TcpListener, status_line: &'static str, body: &'static str) {
        serve_once_on(&listener, status_line, body).await;
    }

    #[tokio::test]
    async fn test_http_identification_sentry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK",
            "<html>Sentry Switched CDU</html>",
        ));

        let client = reqwest::Client::new();
        let (vendor, _) = identify_over_http(&client, &addr.to_string(), None)
            .await
            .unwrap();
        assert_eq!(vendor, Vendor::Sentry);
    }

    #[tokio::test]
    async fn test_http_identification_retries_credentials_after_401() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            serve_once_on(&listener, "HTTP/1.1 401 Unauthorized", "denied").await;
            serve_once_on(&listener, "HTTP/1.1 200 OK", "<title>APC</title>").await;
        });

        let client = reqwest::Client::new();
        let creds = Credentials::new("apc", "apc");
        let (vendor, working) = identify_over_http(&client, &addr.to_string(), Some(creds))
            .await
            .unwrap();
        assert_eq!(vendor, Vendor::Apc);
        assert_eq!(working.unwrap().username, "apc");
    }

    async fn serve_once_on(listener: &TcpListener, status_line: &str, body: &str) {
        use tokio::io::AsyncReadExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        // Consume the request head before answering.
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await.unwrap();
        let response = format!(
            "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_http_identification_unknown_device() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK",
            "<html>just a webserver</html>",
        ));

        let client = reqwest::Client::new();
        let err = identify_over_http(&client, &addr.to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPowerDevice { .. }));
    }
}
