//! # Bfarm
//!
//! Async device-interaction core for hardware test farms.
//!
//! Bfarm drives real routers, emulated boards and lab helper hosts
//! through their consoles: serial lines, ser2net ports, telnet and
//! locally spawned commands. On top of the raw expect/send session it
//! layers a polymorphic device vocabulary (OpenWrt/OpenEmbedded routers,
//! QEMU boards, Linux helpers, CMTS head-ends) plus power control and
//! station locking, so tests talk to `board.reset()` rather than to a
//! file descriptor.
//!
//! ## Features
//!
//! - Expect/send console sessions with earliest-match semantics
//! - Transcript instrumentation with caller locations (`BFT_DEBUG`)
//! - Kernel panic and crashdump detectors on every match
//! - Bootloader break-in, TFTP flashing and boot supervision
//! - Power controller family (Raritan, Sentry, APC, DLI, NetIO, WeMo, ...)
//! - Jenkins lockable-resources client for board leasing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bfarm::config::{FarmConfig, RunOptions};
//! use bfarm::manager::DeviceManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bfarm::Error> {
//!     let options = RunOptions::from_env()?;
//!     let text = std::fs::read_to_string("stations.json")?;
//!     let config = FarmConfig::from_json(&text)?;
//!
//!     let station = config.station("station-1")?;
//!     let mut manager = DeviceManager::from_station("station-1", station, &options).await?;
//!
//!     let board = manager.board_mut().unwrap();
//!     board.reset().await?;
//!     board.wait_for_linux().await?;
//!     println!("uptime: {}s", board.get_seconds_uptime().await?);
//!
//!     manager.teardown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod lock;
pub mod manager;
pub mod power;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use config::{FarmConfig, RunOptions, StationConfig};
pub use device::cmts::{CmStatus, Cmts};
pub use device::{BaseDevice, BootStage, ConsoleDevice, DeviceIdentity, Role};
pub use error::{Error, Result};
pub use lock::{AcquiredLock, LockClient};
pub use manager::DeviceManager;
pub use power::{Credentials, PowerController};
pub use session::{ExpectPattern, Session, SessionConfig};
