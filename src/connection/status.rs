// Connection status of MIDI output devices

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    /// Not (or no longer) present in the transport's device list
    Disconnected,
    /// Waiting for the platform to grant MIDI access
    Connecting,
    Connected,
    /// The last message could not be delivered
    Error,
}

impl DeviceStatus {
    /// Status of a queue from what the transport told us
    pub fn resolve(transport_ready: bool, has_handle: bool) -> Self {
        match (transport_ready, has_handle) {
            (_, true) => DeviceStatus::Connected,
            (false, false) => DeviceStatus::Connecting,
            (true, false) => DeviceStatus::Disconnected,
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Disconnected
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Error => "error",
        };
        write!(f, "{}", label)
    }
}
