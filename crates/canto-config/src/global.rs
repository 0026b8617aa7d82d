//! Top-level configuration tree and the sections that don't warrant their
//! own file.

use serde::{Deserialize, Serialize};

use crate::device::DeviceConfig;
use crate::instrument::InstrumentConfig;
use crate::led::LedConfig;

/// SocketCAN transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "BusConfig::default_interface")]
    pub interface: String,
    #[serde(default = "BusConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "BusConfig::default_retries")]
    pub retries: u32,
}

impl BusConfig {
    fn default_interface() -> String {
        "can0".to_string()
    }
    fn default_timeout_ms() -> u64 {
        200
    }
    fn default_retries() -> u32 {
        3
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            interface: Self::default_interface(),
            timeout_ms: Self::default_timeout_ms(),
            retries: Self::default_retries(),
        }
    }
}

/// The complete canto configuration tree, as loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub led: LedConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}
