//! The raw on-wire frame: an 11-bit arbitration ID plus an 8-byte payload.

use thiserror::Error;

/// A raw CAN frame as seen on the bus. Decoding into a [`crate::StatusReply`]
/// or [`crate::TypedFrame`] happens separately, since the right
/// interpretation of `byte0 == 0` depends on what the caller is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub arbitration_id: u16,
    pub payload: [u8; 8],
}

impl Frame {
    pub fn new(arbitration_id: u16, payload: [u8; 8]) -> Self {
        Self { arbitration_id, payload }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unrecognized status code byte 0x{0:02X}")]
    UnknownStatusCode(u8),
    #[error("expected a typed frame (byte0 == 0), got 0x{0:02X}")]
    NotATypedFrame(u8),
    #[error("unrecognized frame subtype 0x{0:02X}")]
    UnknownSubtype(u8),
    #[error("field_id {0} out of range [1,19]")]
    FieldIdOutOfRange(u8),
    #[error("stream_id {0} out of range [0,4]")]
    StreamIdOutOfRange(u8),
}
