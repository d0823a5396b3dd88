use std::net::SocketAddr;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::{DEFAULT_BAUD_RATE, DEFAULT_PATH_PREFIXES, MAX_RECONNECT_ATTEMPTS};
use crate::power::constants::{DEFAULT_DEBOUNCE, DEFAULT_OFF_COMMAND, DEFAULT_ON_COMMAND};

// durations are stored in humantime notation ("5m", "250ms")
mod humantime_duration {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::de::Error;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    // skips discovery when set
    pub path: Option<String>,
    pub path_prefixes: Vec<String>,
    pub baud_rate: u32,
    pub max_reconnect_attempts: u32,
    #[serde(with = "humantime_duration")]
    pub reconnect_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            path: None,
            path_prefixes: DEFAULT_PATH_PREFIXES.iter().map(|prefix| prefix.to_string()).collect(),
            baud_rate: DEFAULT_BAUD_RATE,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayConfig {
    #[serde(with = "humantime_duration")]
    pub debounce: Duration,
    pub on_command: String,
    pub off_command: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            debounce: DEFAULT_DEBOUNCE,
            on_command: DEFAULT_ON_COMMAND.to_string(),
            off_command: DEFAULT_OFF_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub relay: RelayConfig,
}
