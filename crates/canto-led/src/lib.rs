//! LED feedback pipeline: one bounded command queue and worker thread per
//! device, decoupling sensor/scheduler-driven color changes from the pace
//! the bus and device firmware can actually sustain.

mod command;
mod error;
mod gradient;
mod queue;
mod worker;

pub use command::{AnimMode, GradientStop, LedCommand};
pub use error::LedError;
pub use gradient::diff_stops;
pub use worker::{spawn, LedWorkerHandle};
