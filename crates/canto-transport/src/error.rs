//! Transport-layer errors.

use thiserror::Error;

use canto_proto::{CodecError, DeviceId, StatusCode};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open CAN interface {interface}: {source}")]
    Open { interface: String, source: std::io::Error },
    #[error("CAN I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arbitration id 0x{0:03X} doesn't fit in 11 bits")]
    BadArbitrationId(u16),
    #[error("payload longer than 8 bytes")]
    BadPayload,
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("device {0} did not respond after all retries")]
    NoResponse(DeviceId),
    #[error("frame codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("device {device} replied with an error status {status:?} (tag {tag})")]
    DeviceError { device: DeviceId, status: StatusCode, tag: u8 },
    #[error("invalid argument: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_mentions_device_and_status() {
        let id = DeviceId::new(3).unwrap();
        let err = TransportError::DeviceError { device: id, status: StatusCode::ErrRange, tag: 0x70 };
        let msg = err.to_string();
        assert!(msg.contains("device 3"));
        assert!(msg.contains("ErrRange"));
    }
}
