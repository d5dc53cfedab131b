//! HTTP-driven power switches.

use async_trait::async_trait;
use log::debug;

use super::{Credentials, PowerController};
use crate::error::Result;

/// Digital Loggers web power switch (legacy CGI interface).
pub struct DliSwitch {
    client: reqwest::Client,
    base: String,
    outlet: String,
    credentials: Option<Credentials>,
}

impl DliSwitch {
    pub fn new(address: &str, outlet: &str, credentials: Option<Credentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("http://{address}"),
            outlet: outlet.to_string(),
            credentials,
        }
    }

    async fn set_state(&self, state: &str) -> Result<()> {
        let url = dli_url(&self.base, &self.outlet, state);
        debug!("dli: GET {url}");
        let mut request = self.client.get(&url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password()));
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

fn dli_url(base: &str, outlet: &str, state: &str) -> String {
    format!("{base}/outlet?{outlet}={state}")
}

#[async_trait]
impl PowerController for DliSwitch {
    fn name(&self) -> &str {
        "dli-wps"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.set_state("ON").await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.set_state("OFF").await
    }
}

/// Aviosys IP9258/IP9820 switch.
pub struct Ip9258Switch {
    client: reqwest::Client,
    base: String,
    outlet: String,
    credentials: Option<Credentials>,
    ip9820: bool,
}

impl Ip9258Switch {
    pub fn new(
        address: &str,
        outlet: &str,
        credentials: Option<Credentials>,
        ip9820: bool,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("http://{address}"),
            outlet: outlet.to_string(),
            credentials,
            ip9820,
        }
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        let url = ip92xx_url(&self.base, &self.outlet, on);
        debug!("ip92xx: GET {url}");
        let mut request = self.client.get(&url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password()));
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

fn ip92xx_url(base: &str, outlet: &str, on: bool) -> String {
    let state = if on { 1 } else { 0 };
    format!("{base}/Set.cmd?CMD=SetPower+P6{outlet}={state}")
}

#[async_trait]
impl PowerController for Ip9258Switch {
    fn name(&self) -> &str {
        if self.ip9820 { "ip9820" } else { "ip9258" }
    }

    async fn power_on(&mut self) -> Result<()> {
        self.set_state(true).await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.set_state(false).await
    }
}

/// Belkin WeMo switch, driven over its UPnP SOAP endpoint.
pub struct WemoSwitch {
    client: reqwest::Client,
    host: String,
}

impl WemoSwitch {
    pub fn new(host: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.to_string(),
        }
    }

    async fn set_binary_state(&self, on: bool) -> Result<()> {
        let url = format!("http://{}:49153/upnp/control/basicevent1", self.host);
        debug!("wemo: POST {url}");
        self.client
            .post(&url)
            .header(
                "SOAPACTION",
                "\"urn:Belkin:service:basicevent:1#SetBinaryState\"",
            )
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .body(wemo_soap_body(on))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn wemo_soap_body(on: bool) -> String {
    let state = if on { 1 } else { 0 };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:SetBinaryState xmlns:u=\"urn:Belkin:service:basicevent:1\">\
         <BinaryState>{state}</BinaryState>\
         </u:SetBinaryState></s:Body></s:Envelope>"
    )
}

#[async_trait]
impl PowerController for WemoSwitch {
    fn name(&self) -> &str {
        "wemo"
    }

    async fn power_on(&mut self) -> Result<()> {
        self.set_binary_state(true).await
    }

    async fn power_off(&mut self) -> Result<()> {
        self.set_binary_state(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dli_url() {
        assert_eq!(
            dli_url("http://10.0.0.1", "3", "OFF"),
            "http://10.0.0.1/outlet?3=OFF"
        );
    }

    #[test]
    fn test_ip92xx_url() {
        assert_eq!(
            ip92xx_url("http://10.0.0.2", "1", true),
            "http://10.0.0.2/Set.cmd?CMD=SetPower+P61=1"
        );
        assert_eq!(
            ip92xx_url("http://10.0.0.2", "1", false),
            "http://10.0.0.2/Set.cmd?CMD=SetPower+P61=0"
        );
    }

    #[test]
    fn test_wemo_body_states() {
        assert!(wemo_soap_body(true).contains("<BinaryState>1</BinaryState>"));
        assert!(wemo_soap_body(false).contains("<BinaryState>0</BinaryState>"));
    }
}
