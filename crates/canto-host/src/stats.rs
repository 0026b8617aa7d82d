//! Per-device counters surfaced by the `status`/`monitor` commands.

use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    pub samples_ok: u64,
    pub samples_err: u64,
    pub events_emitted: u64,
    pub last_seen: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct FleetStats {
    by_device: HashMap<u8, DeviceStats>,
}

impl FleetStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, device_id: u8) -> &mut DeviceStats {
        self.by_device.entry(device_id).or_default()
    }

    pub fn record_ok(&mut self, device_id: u8) {
        let e = self.entry(device_id);
        e.samples_ok += 1;
        e.last_seen = Some(Instant::now());
    }

    pub fn record_err(&mut self, device_id: u8) {
        self.entry(device_id).samples_err += 1;
    }

    pub fn record_events(&mut self, device_id: u8, count: usize) {
        self.entry(device_id).events_emitted += count as u64;
    }

    pub fn get(&self, device_id: u8) -> Option<&DeviceStats> {
        self.by_device.get(&device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u8, &DeviceStats)> {
        self.by_device.iter()
    }
}
