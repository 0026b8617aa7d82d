//! A [`VoiceEngine`] backed by a hardware/software MIDI output port via
//! `midir`.

use midir::{MidiOutput, MidiOutputConnection};
use tracing::info;

use crate::engine::VoiceEngine;
use crate::error::SchedulerError;

/// Sends note/program/CC messages to one MIDI output port.
pub struct MidiPortEngine {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidiPortEngine {
    /// Open the first output port whose name contains `port_pattern`.
    pub fn open(port_pattern: &str) -> Result<Self, SchedulerError> {
        let midi_out =
            MidiOutput::new("canto-scheduler").map_err(|e| SchedulerError::EngineInit(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| midi_out.port_name(p).map(|n| n.contains(port_pattern)).unwrap_or(false))
            .ok_or_else(|| SchedulerError::PortNotFound(port_pattern.to_string()))?;

        let port_name =
            midi_out.port_name(port).map_err(|e| SchedulerError::EngineInit(e.to_string()))?;
        let connection = midi_out
            .connect(port, "canto-output")
            .map_err(|e| SchedulerError::EngineInit(e.to_string()))?;

        info!(port = %port_name, "opened MIDI output");
        Ok(Self { connection, port_name })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl VoiceEngine for MidiPortEngine {
    /// The port is already opened by [`MidiPortEngine::open`]; re-loading
    /// just re-points the connection at a differently-named port, for the
    /// rare case an instrument change means switching outputs entirely.
    fn load_instrument(&mut self, instrument: &str) -> Result<(), SchedulerError> {
        if instrument.is_empty() || self.port_name.contains(instrument) {
            return Ok(());
        }
        *self = MidiPortEngine::open(instrument)?;
        Ok(())
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) -> Result<(), SchedulerError> {
        self.connection
            .send(&[0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }

    fn note_off(&mut self, channel: u8, pitch: u8) -> Result<(), SchedulerError> {
        self.connection
            .send(&[0x80 | (channel & 0x0F), pitch & 0x7F, 0])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }

    fn program_select(&mut self, channel: u8, bank: u8, preset: u8) -> Result<(), SchedulerError> {
        // Bank select (MSB, CC 0) then program change; LSB omitted since no
        // bank here needs more than 7 bits.
        self.connection
            .send(&[0xB0 | (channel & 0x0F), 0x00, bank & 0x7F])
            .map_err(|e| SchedulerError::Send(e.to_string()))?;
        self.connection
            .send(&[0xC0 | (channel & 0x0F), preset & 0x7F])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), SchedulerError> {
        self.connection
            .send(&[0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }

    fn pitch_bend(&mut self, channel: u8, value: i16) -> Result<(), SchedulerError> {
        let centered = (value as i32 + 8192).clamp(0, 16383) as u16;
        let lsb = (centered & 0x7F) as u8;
        let msb = ((centered >> 7) & 0x7F) as u8;
        self.connection
            .send(&[0xE0 | (channel & 0x0F), lsb, msb])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }

    fn channel_pressure(&mut self, channel: u8, value: u8) -> Result<(), SchedulerError> {
        self.connection
            .send(&[0xD0 | (channel & 0x0F), value & 0x7F])
            .map_err(|e| SchedulerError::Send(e.to_string()))
    }
}
