//! Device roster construction: explicit config entries first, falling back
//! to a bus-wide discovery ping sweep when none are configured.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canto_config::{DeviceConfig, GlobalConfig};
use canto_proto::DeviceId;
use canto_transport::{CanBus, DeviceClient};
use tracing::{info, warn};

/// The widest candidate range swept during discovery when the config file
/// lists no devices explicitly.
const DISCOVERY_RANGE: std::ops::RangeInclusive<u8> = 0..=31;

pub struct RosterEntry {
    pub config: DeviceConfig,
    pub client: Arc<DeviceClient>,
}

pub fn build(bus: Arc<Mutex<CanBus>>, config: &GlobalConfig) -> Vec<RosterEntry> {
    let timeout = Duration::from_millis(config.bus.timeout_ms);

    if !config.devices.is_empty() {
        info!(count = config.devices.len(), "using explicit device roster from config");
        return config
            .devices
            .iter()
            .filter_map(|device| {
                let id = match DeviceId::new(device.id) {
                    Some(id) => id,
                    None => {
                        warn!(id = device.id, "device id out of range, skipping");
                        return None;
                    }
                };
                let client = DeviceClient::new(Arc::clone(&bus), id)
                    .with_timeout(timeout)
                    .with_retries(config.bus.retries);
                Some(RosterEntry { config: device.clone(), client: Arc::new(client) })
            })
            .collect();
    }

    info!("no devices configured, discovering over the bus");
    let candidates = DISCOVERY_RANGE.filter_map(DeviceId::new);
    canto_transport::discover(Arc::clone(&bus), candidates, timeout)
        .into_iter()
        .map(|client| {
            let device = DeviceConfig { id: client.id().get(), ..DeviceConfig::default() };
            RosterEntry { config: device, client: Arc::new(client) }
        })
        .collect()
}
