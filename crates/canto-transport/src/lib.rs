//! SocketCAN transport and request/reply device client for the canto bus.
//!
//! [`CanBus`] owns the blocking socket and a small deferred-frame queue.
//! [`DeviceClient`] layers request/reply semantics on top: retry-on-timeout,
//! status-then-typed-frame ordering, and a per-device remembered last error.

mod bus;
mod client;
mod discovery;
mod error;

pub use bus::CanBus;
pub use client::{Aht20Reading, DeviceClient, HmcConfig, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
pub use discovery::discover;
pub use error::TransportError;
