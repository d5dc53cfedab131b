//! CMTS head-end devices.
//!
//! A CMTS is the device cable modems register against. The contract is
//! modem-centric: every operation is keyed by the modem's MAC address,
//! which the head-end wants in its native dotted form. [`to_cmts_mac`]
//! adapts colon-form addresses at each method entry and is idempotent,
//! so callers may pass either form.

mod arris;
mod casa;

pub use arris::ArrisCmts;
pub use casa::CasaCmts;

use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;

use super::ConsoleDevice;
use crate::error::Result;

/// Registration state of a cable modem as reported by the head-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmStatus {
    Online,
    /// Any non-online state, carrying the head-end's own wording
    /// (`offline`, `init(r2)`, `p-online`, ...).
    Other(String),
}

impl CmStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, CmStatus::Online)
    }
}

/// The head-end contract shared by all CMTS vendors.
#[async_trait]
pub trait Cmts: ConsoleDevice {
    /// Registration state of the modem.
    async fn check_online(&mut self, cm_mac: &str) -> Result<CmStatus>;

    /// Drop the modem's stale offline entry from the head-end tables.
    async fn clear_offline(&mut self, cm_mac: &str) -> Result<()>;

    /// Force the modem to re-register.
    async fn clear_cm_reset(&mut self, cm_mac: &str) -> Result<()>;

    /// Modem's provisioned IPv4 address, if registered.
    async fn get_cmip(&mut self, cm_mac: &str) -> Result<Option<Ipv4Addr>>;

    /// Modem's provisioned IPv6 address, if registered.
    async fn get_cmipv6(&mut self, cm_mac: &str) -> Result<Option<Ipv6Addr>>;

    /// IPv4 address of the modem's embedded MTA, if present.
    async fn get_mtaip(&mut self, cm_mac: &str, mta_mac: Option<&str>)
    -> Result<Option<Ipv4Addr>>;

    /// MAC domain the modem is registered in.
    async fn get_cm_mac_domain(&mut self, cm_mac: &str) -> Result<String>;

    /// Downstream/upstream channel counts the modem has locked.
    async fn dut_chnl_lock(&mut self, cm_mac: &str) -> Result<(usize, usize)>;
}

/// Convert a MAC address to the CMTS-native dotted form.
///
/// `00:25:2E:34:43:77` becomes `0025.2e34.4377`. Already-native input
/// passes through unchanged (lowercased forms stay byte-identical), so
/// applying the adapter twice equals applying it once. Unrecognized
/// strings pass through untouched.
pub fn to_cmts_mac(mac: &str) -> String {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && is_hex(p)) {
        let flat: String = parts.join("").to_lowercase();
        return format!("{}.{}.{}", &flat[0..4], &flat[4..8], &flat[8..12]);
    }
    mac.to_string()
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colon_form_converted() {
        assert_eq!(to_cmts_mac("00:25:2E:34:43:77"), "0025.2e34.4377");
    }

    #[test]
    fn test_native_form_passes_through() {
        assert_eq!(to_cmts_mac("0025.2e34.4377"), "0025.2e34.4377");
    }

    #[test]
    fn test_idempotent() {
        let once = to_cmts_mac("a0:b1:c2:d3:e4:f5");
        let twice = to_cmts_mac(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "a0b1.c2d3.e4f5");
    }

    #[test]
    fn test_garbage_untouched() {
        assert_eq!(to_cmts_mac("not-a-mac"), "not-a-mac");
        assert_eq!(to_cmts_mac("00:25:2E"), "00:25:2E");
    }
}
