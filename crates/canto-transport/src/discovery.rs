//! Bus-wide discovery: ping every candidate device id and report who
//! answers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use canto_proto::DeviceId;
use tracing::info;

use crate::bus::CanBus;
use crate::client::DeviceClient;

/// Ping every id in `candidates` and return clients for the ones that
/// answered. Devices that don't respond within `timeout` are silently
/// skipped, not treated as an error.
pub fn discover(
    bus: Arc<Mutex<CanBus>>,
    candidates: impl IntoIterator<Item = DeviceId>,
    timeout: Duration,
) -> Vec<DeviceClient> {
    let mut found = Vec::new();
    for id in candidates {
        let client = DeviceClient::new(Arc::clone(&bus), id).with_timeout(timeout).with_retries(1);
        match client.ping() {
            Ok(pong) => {
                info!(device = %id, proto = pong.proto, "device responded to discovery ping");
                found.push(DeviceClient::new(Arc::clone(&bus), id));
            }
            Err(_) => continue,
        }
    }
    found
}
