//! Typed configuration loading and calibration storage for canto.
//!
//! Configuration is plain TOML, loaded system -> user -> CLI override with
//! later files winning section-by-section. Unknown keys are a hard error by
//! default (`ConfigError::UnknownKey`) — a typo in a config file should be
//! loud, not silently ignored — with `--compat-ignore-unknown-keys` as an
//! escape hatch for forward/backward compatibility across canto versions.

mod calibration;
mod device;
mod error;
mod global;
mod instrument;
mod led;
mod loader;
mod snapshot;

pub use calibration::Calibration;
pub use device::{DetectorOverrides, DeviceConfig, EventSource};
pub use error::ConfigError;
pub use global::{BusConfig, GlobalConfig};
pub use instrument::InstrumentConfig;
pub use led::LedConfig;
pub use loader::{discover_config_files, load, load_from_file, merge_configs, ConfigSources};
pub use snapshot::CalibrationSnapshot;
