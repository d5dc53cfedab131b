//! Environment variable parsing.
//!
//! `RunOptions::from_env` is the only place the process environment is
//! consulted; the resulting struct is immutable and passed down through
//! construction.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Debug verbosity, from `BFT_DEBUG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
    #[default]
    Off,
    /// `BFT_DEBUG=y`: bold send/expect lines with caller locations.
    On,
    /// `BFT_DEBUG=yy`: additionally mirror incoming bytes, colorized per device.
    Verbose,
}

/// `BFT_OPTIONS` key `proxy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyMode {
    #[default]
    Normal,
    Sock5,
}

/// `BFT_OPTIONS` key `webdriver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WebDriver {
    #[default]
    Chrome,
    Ffox,
}

/// `BFT_OPTIONS` key `disp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayBackend {
    #[default]
    Xvfb,
    Xephyr,
    Xvnc,
}

/// Recognised `BFT_OPTIONS` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BftOptions {
    pub proxy: ProxyMode,
    pub webdriver: WebDriver,
    pub disp: DisplayBackend,
    /// 0 (auto) or a port in 1024..=65535.
    pub disp_port: u16,
    /// Display geometry as (width, height).
    pub disp_size: Option<(u32, u32)>,
}

impl BftOptions {
    /// Parse a space-separated list of `key:value` pairs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut options = BftOptions::default();
        for pair in text.split_whitespace() {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("BFT_OPTIONS entry '{pair}' is not key:value")))?;
            match key {
                "proxy" => {
                    options.proxy = match value {
                        "normal" => ProxyMode::Normal,
                        "sock5" => ProxyMode::Sock5,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "webdriver" => {
                    options.webdriver = match value {
                        "chrome" => WebDriver::Chrome,
                        "ffox" => WebDriver::Ffox,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "disp" => {
                    options.disp = match value {
                        "xvfb" => DisplayBackend::Xvfb,
                        "xephyr" => DisplayBackend::Xephyr,
                        "xvnc" => DisplayBackend::Xvnc,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "disp_port" => {
                    let port: u16 = value.parse().map_err(|_| bad_value(key, value))?;
                    if port != 0 && port < 1024 {
                        return Err(bad_value(key, value));
                    }
                    options.disp_port = port;
                }
                "disp_size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| bad_value(key, value))?;
                    let width = w.parse().map_err(|_| bad_value(key, value))?;
                    let height = h.parse().map_err(|_| bad_value(key, value))?;
                    options.disp_size = Some((width, height));
                }
                _ => return Err(Error::Config(format!("unknown BFT_OPTIONS key '{key}'"))),
            }
        }
        Ok(options)
    }
}

fn bad_value(key: &str, value: &str) -> Error {
    Error::Config(format!("bad BFT_OPTIONS value '{value}' for key '{key}'"))
}

/// Immutable per-run options, parsed once from the environment.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Default config path, from `BFT_CONFIG`.
    pub config_path: Option<PathBuf>,

    /// Overlay directories searched for testsuites/config, from `BFT_OVERLAY`.
    pub overlays: Vec<PathBuf>,

    /// Debug verbosity, from `BFT_DEBUG`.
    pub debug: DebugLevel,

    /// Global escape hatch disabling all error detectors,
    /// from `BFT_DISABLE_ERROR_DETECT`.
    pub disable_error_detect: bool,

    /// Parsed `BFT_OPTIONS`.
    pub options: BftOptions,
}

impl RunOptions {
    /// Read the `BFT_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Parse from an explicit variable map (testable without the process env).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let debug = match vars.get("BFT_DEBUG").map(String::as_str) {
            None | Some("") | Some("n") => DebugLevel::Off,
            Some("y") => DebugLevel::On,
            Some("yy") => DebugLevel::Verbose,
            Some(other) => {
                return Err(Error::Config(format!("bad BFT_DEBUG value '{other}'")));
            }
        };

        let options = match vars.get("BFT_OPTIONS") {
            Some(text) => BftOptions::parse(text)?,
            None => BftOptions::default(),
        };

        Ok(Self {
            config_path: vars.get("BFT_CONFIG").map(PathBuf::from),
            overlays: vars
                .get("BFT_OVERLAY")
                .map(|v| v.split_whitespace().map(PathBuf::from).collect())
                .unwrap_or_default(),
            debug,
            disable_error_detect: vars.contains_key("BFT_DISABLE_ERROR_DETECT"),
            options,
        })
    }
}
