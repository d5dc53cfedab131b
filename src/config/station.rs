//! Station configuration file parsing.
//!
//! The configuration is a JSON object keyed by station name. An optional
//! top-level `locations` object holds shared settings that stations pull
//! in with a `location` key; it is removed from the mapping and merged
//! per station before deserialization (list-valued keys are extended,
//! scalars overwritten).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// How the console channel to a device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Run a shell command that produces interactive I/O.
    LocalCmd,
    /// Run a local serial-terminal program (e.g. `cu -l <dev> -s <baud>`).
    LocalSerial,
    /// TCP to a ser2net port.
    #[serde(rename = "ser2net")]
    Ser2Net,
    /// Drive a kermit command interpreter.
    Kermit,
    /// Spawn telnet to `host [port]`.
    Telnet,
}

/// A connection command: a single string, or an ordered list for boards
/// with more than one console.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConnCmd {
    One(String),
    Many(Vec<String>),
}

impl ConnCmd {
    /// The first (or only) connection command.
    pub fn primary(&self) -> &str {
        match self {
            ConnCmd::One(cmd) => cmd,
            ConnCmd::Many(cmds) => cmds.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All connection commands in order.
    pub fn all(&self) -> Vec<&str> {
        match self {
            ConnCmd::One(cmd) => vec![cmd.as_str()],
            ConnCmd::Many(cmds) => cmds.iter().map(String::as_str).collect(),
        }
    }
}

/// Power switch wiring for a station.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowerConfig {
    /// IP address of the power switch, if networked.
    #[serde(rename = "powerip")]
    pub ip: Option<String>,
    /// Outlet identifier; interpretation is switch-specific and may be a URI.
    #[serde(rename = "powerport")]
    pub outlet: Option<String>,
    /// Credentials for switches that need them.
    #[serde(rename = "powerusername")]
    pub username: Option<String>,
    #[serde(rename = "powerpassword")]
    pub password: Option<String>,
}

impl PowerConfig {
    /// Whether any power wiring is present at all.
    pub fn is_wired(&self) -> bool {
        self.ip.is_some() || self.outlet.is_some()
    }
}

fn default_true() -> bool {
    true
}

/// One station: a board and the helper devices wired around it.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Board model, e.g. "ap148" or "CH7465LG".
    pub board_type: String,

    /// Command(s) that open the board console.
    pub conn_cmd: ConnCmd,

    /// How `conn_cmd` is interpreted.
    pub connection_type: ConnectionType,

    /// Connection command for the LAN-side helper host.
    #[serde(default)]
    pub lan_device: Option<String>,

    /// Connection command for the WAN-side helper host.
    #[serde(default)]
    pub wan_device: Option<String>,

    /// Connection command for the wireless client host.
    #[serde(default)]
    pub wlan_device: Option<String>,

    /// Connection command for the CMTS head-end, for cable stations.
    #[serde(default)]
    pub cmts_device: Option<String>,

    #[serde(default = "default_true")]
    pub available_for_autotests: bool,

    #[serde(default)]
    pub notes: Option<String>,

    /// Features this station provides, matched against required features.
    #[serde(default)]
    pub feature: Vec<String>,

    /// Key into the shared `locations` object (already merged at parse time).
    #[serde(default)]
    pub location: Option<String>,

    /// Power switch wiring.
    #[serde(flatten)]
    pub power: PowerConfig,

    /// TFTP server address for image staging, when not the WAN host.
    #[serde(default)]
    pub tftp_server: Option<String>,

    #[serde(default)]
    pub tftp_port: Option<u16>,
}

/// The whole parsed configuration, stations in file order.
#[derive(Debug, Clone)]
pub struct FarmConfig {
    pub stations: IndexMap<String, StationConfig>,
}

impl FarmConfig {
    /// Parse a configuration file, applying the `locations` merge.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut root: serde_json::Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid config JSON: {e}")))?;

        let locations = root.remove("locations");

        if let Some(Value::Object(ref locations)) = locations {
            for station in root.values_mut() {
                let Some(loc_key) = station.get("location").and_then(Value::as_str) else {
                    continue;
                };
                let Some(Value::Object(loc)) = locations.get(loc_key) else {
                    return Err(Error::Config(format!("unknown location '{loc_key}'")));
                };
                let Some(station) = station.as_object_mut() else {
                    continue;
                };
                merge_location(station, loc);
            }
        }

        let stations: IndexMap<String, StationConfig> =
            serde_json::from_value(Value::Object(root))
                .map_err(|e| Error::Config(format!("invalid station entry: {e}")))?;

        Ok(Self { stations })
    }

    /// Look up a station by name.
    pub fn station(&self, name: &str) -> Result<&StationConfig> {
        self.stations
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown station '{name}'")))
    }
}

/// Merge a location object into a station: lists extend, scalars overwrite.
fn merge_location(
    station: &mut serde_json::Map<String, Value>,
    location: &serde_json::Map<String, Value>,
) {
    for (key, value) in location {
        match value {
            Value::Array(items) => {
                let entry = station
                    .entry(key.clone())
                    .or_insert_with(|| Value::Array(vec![]));
                if let Value::Array(existing) = entry {
                    existing.extend(items.iter().cloned());
                } else {
                    *entry = value.clone();
                }
            }
            _ => {
                station.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "locations": {
            "lab1": {
                "feature": ["docsis"],
                "tftp_server": "10.64.0.2"
            }
        },
        "station-1": {
            "board_type": "ap148",
            "conn_cmd": "telnet 10.64.0.1 6000",
            "connection_type": "ser2net",
            "feature": ["wifi"],
            "location": "lab1",
            "powerip": "10.64.0.50",
            "powerport": "3"
        },
        "station-2": {
            "board_type": "qemux86",
            "conn_cmd": ["qemu-system-i386 -nographic", "true"],
            "connection_type": "local_cmd",
            "available_for_autotests": false
        }
    }"#;

    #[test]
    fn test_parse_and_order() {
        let config = FarmConfig::from_json(CONFIG).unwrap();
        let names: Vec<_> = config.stations.keys().collect();
        assert_eq!(names, ["station-1", "station-2"]);
    }

    #[test]
    fn test_locations_merge_extends_lists_and_overwrites_scalars() {
        let config = FarmConfig::from_json(CONFIG).unwrap();
        let station = config.station("station-1").unwrap();
        // Own list entries kept, location entries appended.
        assert_eq!(station.feature, ["wifi", "docsis"]);
        // Scalar from the location object.
        assert_eq!(station.tftp_server.as_deref(), Some("10.64.0.2"));
    }

    #[test]
    fn test_conn_cmd_forms() {
        let config = FarmConfig::from_json(CONFIG).unwrap();
        assert_eq!(
            config.station("station-1").unwrap().conn_cmd.primary(),
            "telnet 10.64.0.1 6000"
        );
        assert_eq!(config.station("station-2").unwrap().conn_cmd.all().len(), 2);
    }

    #[test]
    fn test_power_wiring() {
        let config = FarmConfig::from_json(CONFIG).unwrap();
        let station = config.station("station-1").unwrap();
        assert!(station.power.is_wired());
        assert_eq!(station.power.outlet.as_deref(), Some("3"));
        assert!(!config.station("station-2").unwrap().power.is_wired());
    }

    #[test]
    fn test_unknown_station() {
        let config = FarmConfig::from_json(CONFIG).unwrap();
        assert!(matches!(
            config.station("station-9"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_location_rejected() {
        let bad = r#"{
            "locations": {},
            "s": {
                "board_type": "x",
                "conn_cmd": "cat",
                "connection_type": "local_cmd",
                "location": "nowhere"
            }
        }"#;
        assert!(matches!(FarmConfig::from_json(bad), Err(Error::Config(_))));
    }

    #[test]
    fn test_connection_type_names() {
        for (text, expected) in [
            ("\"local_cmd\"", ConnectionType::LocalCmd),
            ("\"local_serial\"", ConnectionType::LocalSerial),
            ("\"ser2net\"", ConnectionType::Ser2Net),
            ("\"kermit\"", ConnectionType::Kermit),
            ("\"telnet\"", ConnectionType::Telnet),
        ] {
            let parsed: ConnectionType = serde_json::from_str(text).unwrap();
            assert_eq!(parsed, expected);
        }
    }
}
