//! Beat-quantized scheduling: sensor-driven note requests accumulate per
//! device and are only handed to the [`VoiceMixer`] on the next beat
//! boundary, so simultaneous sector activity across devices lands on a
//! shared musical grid instead of firing at arbitrary sensor-poll times.

use std::collections::HashMap;
use std::time::Instant;

use canto_config::InstrumentConfig;

use crate::clock::BeatClock;
use crate::error::SchedulerError;
use crate::voice::{ChordResult, VoiceMixer};

/// A pending note request for one device, accumulated until the next beat.
/// `note = None` means "cleared": the device should stop once flushed.
#[derive(Debug, Clone, Copy, Default)]
struct PendingNote {
    note: Option<u8>,
    intensity: u8,
    force_retrigger: bool,
    clear_voice: bool,
}

/// Maps a 0..255 sensor intensity to a MIDI velocity through a gamma curve:
/// `velocity = round(vel_min + (vel_max - vel_min) * (intensity / full_scale) ^ gamma)`.
pub fn intensity_to_velocity(intensity: u8, gamma: f64) -> u8 {
    intensity_to_velocity_ranged(intensity, gamma, 255, 0, 127)
}

fn intensity_to_velocity_ranged(intensity: u8, gamma: f64, full_scale: u16, vel_min: u8, vel_max: u8) -> u8 {
    let normalized = (intensity as f64 / full_scale.max(1) as f64).clamp(0.0, 1.0);
    let shaped = normalized.powf(gamma.max(1e-6));
    let span = vel_max as f64 - vel_min as f64;
    (vel_min as f64 + shaped * span).round().clamp(0.0, 127.0) as u8
}

/// Maps a 0..`full_scale` sensor intensity to a voice slot's target gain:
/// `level = min_level + (max_level - min_level) * (intensity / full_scale) ^ gamma`.
pub fn intensity_to_level(intensity: u8, full_scale: u16, min_level: f64, max_level: f64, gamma: f64) -> f64 {
    let normalized = (intensity as f64 / full_scale.max(1) as f64).clamp(0.0, 1.0);
    let shaped = normalized.powf(gamma.max(1e-6));
    (min_level + (max_level - min_level) * shaped).clamp(0.0, 1.0)
}

/// Drives the beat clock, accumulates pending notes, and flushes them into
/// the [`VoiceMixer`] once per beat.
pub struct Scheduler {
    clock: BeatClock,
    mixer: VoiceMixer,
    config: InstrumentConfig,
    pending: HashMap<u8, PendingNote>,
    last_applied_beat: u64,
}

impl Scheduler {
    pub fn new(mixer: VoiceMixer, config: InstrumentConfig) -> Self {
        Self {
            clock: BeatClock::new(config.bpm),
            mixer,
            config,
            pending: HashMap::new(),
            last_applied_beat: 0,
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.config.bpm = bpm;
        self.clock.set_bpm(bpm);
    }

    /// Queue a note for `device_id`, to take effect on the next beat
    /// boundary crossed by [`tick`](Self::tick). Multiple calls before the
    /// next tick replace the pending note rather than merge — only the
    /// latest sensor read for a device matters once a beat elapses. `notes`
    /// carries at most one note (the sector-to-note mapping is one note per
    /// device); the last one wins if more than one is passed.
    pub fn queue_notes(&mut self, device_id: u8, notes: Vec<u8>, intensity: u8, force_retrigger: bool) {
        let note = notes.last().copied();
        self.pending.insert(device_id, PendingNote { note, intensity, force_retrigger, clear_voice: false });
    }

    /// Advance the clock and, if a beat boundary was crossed, flush every
    /// device's pending note into the mixer. Returns the per-device results
    /// for whatever was flushed this call.
    pub fn tick(&mut self) -> Result<Vec<(u8, ChordResult)>, SchedulerError> {
        let beat = self.clock.current_beat();
        if beat == self.last_applied_beat {
            return Ok(Vec::new());
        }
        self.last_applied_beat = beat;

        let mut results = Vec::new();
        for (device_id, pending) in self.pending.drain() {
            let Some(note) = pending.note else {
                self.mixer.stop_device(device_id, self.config.fadeout_ms)?;
                continue;
            };
            let velocity = intensity_to_velocity_ranged(
                pending.intensity,
                self.config.velocity_gamma,
                self.config.intensity_full_scale,
                self.config.velocity_min,
                self.config.velocity_max,
            );
            let level = intensity_to_level(
                pending.intensity,
                self.config.intensity_full_scale,
                self.config.min_level,
                self.config.max_level,
                self.config.level_gamma,
            );
            let result = self.mixer.play_note(
                device_id,
                note,
                level,
                self.config.fadein_ms,
                velocity,
                pending.force_retrigger,
                pending.clear_voice,
            )?;
            results.push((device_id, result));
        }
        Ok(results)
    }

    /// Immediately stop a device, bypassing beat quantization (used for
    /// deactivation/session-ended events, which should cut sound at once).
    pub fn stop_device_now(&mut self, device_id: u8) -> Result<Vec<u8>, SchedulerError> {
        self.pending.remove(&device_id);
        self.mixer.stop_device(device_id, self.config.fadeout_ms)
    }

    pub fn process_note_durations(&mut self, now: Instant) -> Result<(), SchedulerError> {
        self.mixer.process_timeouts(now)
    }

    pub fn mixer_mut(&mut self) -> &mut VoiceMixer {
        &mut self.mixer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VoiceEngine;
    use crate::voice::VoiceSettings;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn intensity_to_velocity_gamma_one_is_linear() {
        assert_eq!(intensity_to_velocity(0, 1.0), 0);
        assert_eq!(intensity_to_velocity(255, 1.0), 127);
        assert_eq!(intensity_to_velocity(128, 1.0), 64);
    }

    #[test]
    fn intensity_to_velocity_gamma_above_one_favors_louder_extremes() {
        let linear = intensity_to_velocity(128, 1.0);
        let shaped = intensity_to_velocity(128, 2.0);
        assert!(shaped < linear);
    }

    #[derive(Default)]
    struct NullEngine;
    impl VoiceEngine for NullEngine {
        fn load_instrument(&mut self, _instrument: &str) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn note_off(&mut self, _channel: u8, _pitch: u8) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn program_select(&mut self, _channel: u8, _bank: u8, _preset: u8) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn pitch_bend(&mut self, _channel: u8, _value: i16) -> Result<(), SchedulerError> {
            Ok(())
        }
        fn channel_pressure(&mut self, _channel: u8, _value: u8) -> Result<(), SchedulerError> {
            Ok(())
        }
    }

    fn device_settings(channel_a: u8) -> VoiceSettings {
        VoiceSettings {
            channel_a,
            channel_b: channel_a + 1,
            bank: 0,
            preset: 0,
            note_duration_s: 0.0,
            device_gain: 1.0,
            retrigger_floor: 0.05,
        }
    }

    /// §8 scenario 5: two devices queuing notes at different sub-beat times
    /// both flush on the same beat boundary.
    #[test]
    fn beat_quantization_flushes_two_devices_on_the_same_beat() {
        let mut mixer = VoiceMixer::new(Box::new(NullEngine));
        mixer.register_device(1, device_settings(0));
        mixer.register_device(2, device_settings(2));
        let config = InstrumentConfig { bpm: 600.0, ..InstrumentConfig::default() };
        let mut scheduler = Scheduler::new(mixer, config);

        // Drain the clock's initial beat so the queued notes below land on
        // the next boundary, not whatever beat `new` happened to start on.
        let _ = scheduler.tick();

        scheduler.queue_notes(1, vec![62], 120, false);
        sleep(Duration::from_millis(20));
        scheduler.queue_notes(2, vec![67], 90, false);

        // Neither has reached the next 100 ms boundary yet.
        assert!(scheduler.tick().unwrap().is_empty());

        sleep(Duration::from_millis(90));
        let flushed = scheduler.tick().unwrap();
        let devices: std::collections::HashSet<u8> = flushed.iter().map(|(d, _)| *d).collect();
        assert_eq!(devices, [1, 2].into_iter().collect());
    }
}
