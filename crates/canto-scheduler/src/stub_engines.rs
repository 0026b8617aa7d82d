//! Placeholder [`VoiceEngine`] backends for synthesis paths this build
//! doesn't wire up yet. Kept as real (if inert) types so the scheduler's
//! device-to-engine assignment can name them without a feature-flagged
//! hole in the enum.

use crate::engine::VoiceEngine;
use crate::error::SchedulerError;

/// An in-process soundfont renderer. Not implemented: this build routes
/// audio through MIDI hardware/software ports, not an embedded synth.
pub struct SoundfontEngine {
    pub soundfont_path: String,
}

impl SoundfontEngine {
    pub fn new(soundfont_path: impl Into<String>) -> Self {
        Self { soundfont_path: soundfont_path.into() }
    }
}

impl VoiceEngine for SoundfontEngine {
    fn load_instrument(&mut self, _instrument: &str) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::load_instrument"))
    }

    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::note_on"))
    }

    fn note_off(&mut self, _channel: u8, _pitch: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::note_off"))
    }

    fn program_select(&mut self, _channel: u8, _bank: u8, _preset: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::program_select"))
    }

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::control_change"))
    }

    fn pitch_bend(&mut self, _channel: u8, _value: i16) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::pitch_bend"))
    }

    fn channel_pressure(&mut self, _channel: u8, _value: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("SoundfontEngine::channel_pressure"))
    }
}

/// An external DSP process addressed over some future IPC channel. Not
/// implemented for the same reason as [`SoundfontEngine`].
pub struct ExternalDspEngine {
    pub endpoint: String,
}

impl ExternalDspEngine {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }
}

impl VoiceEngine for ExternalDspEngine {
    fn load_instrument(&mut self, _instrument: &str) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::load_instrument"))
    }

    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::note_on"))
    }

    fn note_off(&mut self, _channel: u8, _pitch: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::note_off"))
    }

    fn program_select(&mut self, _channel: u8, _bank: u8, _preset: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::program_select"))
    }

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::control_change"))
    }

    fn pitch_bend(&mut self, _channel: u8, _value: i16) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::pitch_bend"))
    }

    fn channel_pressure(&mut self, _channel: u8, _value: u8) -> Result<(), SchedulerError> {
        Err(SchedulerError::NotImplemented("ExternalDspEngine::channel_pressure"))
    }
}
