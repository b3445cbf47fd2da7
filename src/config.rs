//! Hub client configuration.
//!
//! Centralizes the endpoint, timeouts, and protocol tunables into a single
//! struct handed to [`Hub`](crate::Hub) at construction, providing a single
//! source of truth with documented defaults.

use std::time::Duration;

use crate::protocol::FieldLayout;

/// Illustrative default address of a Sunflower hub on a home LAN.
pub const DEFAULT_HOST: &str = "192.168.1.59";

/// TCP port the hub listens on.
pub const DEFAULT_PORT: u16 = 10003;

/// Configuration for one hub connection.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Hub host name or IP address.
    pub host: String,
    /// Hub TCP port.
    pub port: u16,
    /// Bound on the initial TCP connect.
    pub connect_timeout: Duration,
    /// Read/write timeout applied to the connected socket.
    pub io_timeout: Duration,
    /// Minimum elapsed time between two device-list refreshes; calls inside
    /// the window are served from cache.
    pub refresh_interval: Duration,
    /// Push frames discarded per command before the reply is given up on.
    pub max_push_frames: usize,
    /// Field offsets of device-list records for this hub's firmware.
    pub layout: FieldLayout,
}

impl HubConfig {
    /// Configuration for a hub at `host:port` with default tunables.
    pub fn new(host: impl Into<String>, port: u16) -> HubConfig {
        HubConfig {
            host: host.into(),
            port,
            ..HubConfig::default()
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(4),
            io_timeout: Duration::from_secs(4),
            refresh_interval: Duration::from_secs(1),
            max_push_frames: 16,
            layout: FieldLayout::CURRENT,
        }
    }
}
