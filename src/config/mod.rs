//! Run configuration.
//!
//! Two inputs feed the engine: the JSON station file enumerating devices
//! and their wiring, and the `BFT_*` environment variables. Both are
//! parsed once at the edge into immutable values threaded through
//! construction; nothing in the core reads the process environment after
//! startup.

mod env;
mod station;

pub use env::{BftOptions, DebugLevel, DisplayBackend, ProxyMode, RunOptions, WebDriver};
pub use station::{ConnCmd, ConnectionType, FarmConfig, PowerConfig, StationConfig};
