//! LED pipeline errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedError {
    #[error("led worker for device {0} is not running")]
    WorkerGone(u8),
    #[error("led command queue for device {0} is full, dropping command")]
    QueueFull(u8),
    #[error(transparent)]
    Transport(#[from] canto_transport::TransportError),
}
