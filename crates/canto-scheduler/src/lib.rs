//! Beat-quantized polyphonic note scheduler and voice engine.
//!
//! [`BeatClock`] tracks musical position; [`VoiceMixer`] owns per-device
//! additive-polyphony state and a [`VoiceEngine`] backend; [`Scheduler`]
//! ties them together, accumulating sensor-driven note requests per device
//! and flushing them to the mixer on beat boundaries.

mod clock;
mod engine;
mod error;
mod midi_engine;
mod scheduler;
mod stub_engines;
mod voice;

pub use clock::BeatClock;
pub use engine::VoiceEngine;
pub use error::SchedulerError;
pub use midi_engine::MidiPortEngine;
pub use scheduler::{intensity_to_velocity, Scheduler};
pub use stub_engines::{ExternalDspEngine, SoundfontEngine};
pub use voice::{ChordResult, VoiceMixer, VoiceSettings};
