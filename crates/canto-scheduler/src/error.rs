//! Scheduler and voice-engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to initialize voice engine: {0}")]
    EngineInit(String),
    #[error("MIDI port not found: {0}")]
    PortNotFound(String),
    #[error("failed to send to voice engine: {0}")]
    Send(String),
    #[error("voice engine does not implement this operation: {0}")]
    NotImplemented(&'static str),
    #[error("no voice registered for device {0}")]
    UnknownDevice(u8),
}
