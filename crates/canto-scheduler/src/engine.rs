//! The voice engine abstraction: whatever actually turns notes into sound.
//!
//! Kept as a trait, not baked into the mixer, so the scheduler's
//! additive-polyphony bookkeeping doesn't care whether notes land on a
//! hardware MIDI port, an in-process soundfont renderer, or some other
//! synthesis backend.

use crate::error::SchedulerError;

/// One instrument's sound-producing backend. Implementors own their own
/// connection state; the mixer only ever calls through this trait.
pub trait VoiceEngine: Send {
    /// Load the underlying instrument (soundfont file, MIDI port pattern, or
    /// DSP endpoint, depending on backend) before any channel is played.
    fn load_instrument(&mut self, instrument: &str) -> Result<(), SchedulerError>;
    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) -> Result<(), SchedulerError>;
    fn note_off(&mut self, channel: u8, pitch: u8) -> Result<(), SchedulerError>;
    fn program_select(&mut self, channel: u8, bank: u8, preset: u8) -> Result<(), SchedulerError>;
    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), SchedulerError>;
    /// 14-bit pitch bend, `value` centered at 0 (range -8192..=8191).
    fn pitch_bend(&mut self, channel: u8, value: i16) -> Result<(), SchedulerError>;
    fn channel_pressure(&mut self, channel: u8, value: u8) -> Result<(), SchedulerError>;
}
