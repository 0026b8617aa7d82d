//! Per-device voice slots and the crossfade gain ramp.
//!
//! Each device owns exactly two voice slots on two MIDI channels. A note
//! replacing a different held note crossfades: the new note takes the
//! currently-inactive slot at gain 0 and ramps up while the old slot ramps
//! to 0, then the active slot index swaps. A background worker thread ramps
//! every slot's gain toward its target a few hundred times a second, driving
//! CC7 from the ramped gain and releasing a slot's note once both its
//! current and target gain settle at the floor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::engine::VoiceEngine;
use crate::error::SchedulerError;

const TICK_PERIOD: Duration = Duration::from_millis(2);
const GAIN_FLOOR: f64 = 0.001;

/// Per-device envelope and program settings that override the scheduler's
/// defaults.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSettings {
    pub channel_a: u8,
    pub channel_b: u8,
    pub bank: u8,
    pub preset: u8,
    pub note_duration_s: f64,
    pub device_gain: f64,
    pub retrigger_floor: f64,
}

#[derive(Debug, Clone, Copy)]
struct VoiceSlot {
    channel: u8,
    note: Option<u8>,
    gain: f64,
    target_gain: f64,
    fade_ms: u32,
    last_cc7: u8,
}

impl VoiceSlot {
    fn new(channel: u8) -> Self {
        Self { channel, note: None, gain: 0.0, target_gain: 0.0, fade_ms: 1, last_cc7: 0 }
    }
}

struct DeviceVoice {
    settings: VoiceSettings,
    slots: [VoiceSlot; 2],
    active: usize,
    program_selected: bool,
    note_deadline: Option<Instant>,
}

impl DeviceVoice {
    fn new(settings: VoiceSettings) -> Self {
        Self {
            settings,
            slots: [VoiceSlot::new(settings.channel_a), VoiceSlot::new(settings.channel_b)],
            active: 0,
            program_selected: false,
            note_deadline: None,
        }
    }

    fn inactive(&self) -> usize {
        1 - self.active
    }
}

/// Result of a [`VoiceMixer::play_note`] call.
#[derive(Debug, Clone, Copy)]
pub struct ChordResult {
    pub started: Option<u8>,
    pub stopped: Option<u8>,
    pub crossfaded: bool,
}

/// Owns every device's voice slots and the single [`VoiceEngine`] they
/// share, plus the background gain-ramp worker.
pub struct VoiceMixer {
    engine: Arc<Mutex<Box<dyn VoiceEngine>>>,
    voices: Arc<Mutex<HashMap<u8, DeviceVoice>>>,
    stop: Arc<AtomicBool>,
    tick_thread: Option<JoinHandle<()>>,
}

impl VoiceMixer {
    pub fn new(engine: Box<dyn VoiceEngine>) -> Self {
        let engine = Arc::new(Mutex::new(engine));
        let voices: Arc<Mutex<HashMap<u8, DeviceVoice>>> = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let tick_engine = Arc::clone(&engine);
        let tick_voices = Arc::clone(&voices);
        let tick_stop = Arc::clone(&stop);
        let tick_thread = std::thread::Builder::new()
            .name("voice-ramp".to_string())
            .spawn(move || run_ramp(tick_engine, tick_voices, tick_stop))
            .expect("spawn voice ramp thread");

        Self { engine, voices, stop, tick_thread: Some(tick_thread) }
    }

    pub fn register_device(&mut self, device_id: u8, settings: VoiceSettings) {
        self.voices.lock().unwrap().insert(device_id, DeviceVoice::new(settings));
    }

    fn ensure_program(&self, device_id: u8) -> Result<(), SchedulerError> {
        let mut voices = self.voices.lock().unwrap();
        let voice = voices.get_mut(&device_id).ok_or(SchedulerError::UnknownDevice(device_id))?;
        if voice.program_selected {
            return Ok(());
        }
        let settings = voice.settings;
        let mut engine = self.engine.lock().unwrap();
        engine.program_select(settings.channel_a, settings.bank, settings.preset)?;
        engine.program_select(settings.channel_b, settings.bank, settings.preset)?;
        voice.program_selected = true;
        Ok(())
    }

    /// Apply a sector/intensity event's note decision to a device's two
    /// voice slots.
    ///
    /// - `clear_voice`: hard note-off on both slots, then restart `note` on
    ///   slot 0 ramping from 0 to `level`.
    /// - Active slot already plays `note`: just re-level it; retrigger only
    ///   when `retrigger` is set, or both gains are already at or below the
    ///   device's `retrigger_floor` and `level` is above it.
    /// - Otherwise: crossfade — the new note takes the inactive slot at 0
    ///   gain ramping to `level`, the old active slot ramps to 0, and the
    ///   active index swaps.
    #[allow(clippy::too_many_arguments)]
    pub fn play_note(
        &mut self,
        device_id: u8,
        note: u8,
        level: f64,
        fade_ms: u32,
        velocity: u8,
        retrigger: bool,
        clear_voice: bool,
    ) -> Result<ChordResult, SchedulerError> {
        self.ensure_program(device_id)?;
        let level = level.clamp(0.0, 1.0);
        let note = note.min(127);
        let velocity = velocity.clamp(1, 127);
        let fade_ms = fade_ms.max(1);

        let mut voices = self.voices.lock().unwrap();
        let voice = voices.get_mut(&device_id).ok_or(SchedulerError::UnknownDevice(device_id))?;
        let retrigger_floor = voice.settings.retrigger_floor;
        let mut engine = self.engine.lock().unwrap();

        if voice.settings.note_duration_s > 0.0 {
            voice.note_deadline = Some(Instant::now() + Duration::from_secs_f64(voice.settings.note_duration_s));
        }

        if clear_voice {
            let mut stopped = None;
            for slot in &mut voice.slots {
                if let Some(n) = slot.note.take() {
                    let _ = engine.note_off(slot.channel, n);
                    stopped = Some(n);
                }
                slot.gain = 0.0;
                slot.target_gain = 0.0;
                slot.last_cc7 = 0;
            }
            voice.active = 0;
            let slot = &mut voice.slots[0];
            slot.note = Some(note);
            slot.target_gain = level;
            slot.fade_ms = fade_ms;
            engine.note_on(slot.channel, note, velocity)?;
            return Ok(ChordResult { started: Some(note), stopped, crossfaded: false });
        }

        let active_idx = voice.active;
        if voice.slots[active_idx].note == Some(note) {
            let slot = &mut voice.slots[active_idx];
            let was_floor = slot.gain <= retrigger_floor && slot.target_gain <= retrigger_floor;
            slot.target_gain = level;
            slot.fade_ms = fade_ms;
            let retriggered = retrigger || (was_floor && level > retrigger_floor);
            if retriggered {
                let _ = engine.note_off(slot.channel, note);
                engine.note_on(slot.channel, note, velocity)?;
                slot.gain = 0.0;
            }
            return Ok(ChordResult {
                started: retriggered.then_some(note),
                stopped: None,
                crossfaded: false,
            });
        }

        let inactive_idx = voice.inactive();
        let old_note = voice.slots[active_idx].note;
        {
            let old = &mut voice.slots[active_idx];
            old.target_gain = 0.0;
            old.fade_ms = fade_ms;
        }
        {
            let slot = &mut voice.slots[inactive_idx];
            if let Some(n) = slot.note.take() {
                let _ = engine.note_off(slot.channel, n);
            }
            slot.note = Some(note);
            slot.gain = 0.0;
            slot.target_gain = level;
            slot.fade_ms = fade_ms;
            engine.note_on(slot.channel, note, velocity)?;
        }
        voice.active = inactive_idx;
        Ok(ChordResult { started: Some(note), stopped: old_note, crossfaded: true })
    }

    /// Adjust the active slot's target gain only, without touching the
    /// held note.
    pub fn set_level(&mut self, device_id: u8, level: f64, fade_ms: u32) -> Result<(), SchedulerError> {
        let mut voices = self.voices.lock().unwrap();
        let voice = voices.get_mut(&device_id).ok_or(SchedulerError::UnknownDevice(device_id))?;
        let active = voice.active;
        let slot = &mut voice.slots[active];
        slot.target_gain = level.clamp(0.0, 1.0);
        slot.fade_ms = fade_ms.max(1);
        Ok(())
    }

    /// Ramp both slots' targets to 0; the ramp worker turns the note-offs
    /// into actual MIDI once each slot settles at the floor.
    pub fn stop_device(&mut self, device_id: u8, release_ms: u32) -> Result<Vec<u8>, SchedulerError> {
        let mut voices = self.voices.lock().unwrap();
        let voice = voices.get_mut(&device_id).ok_or(SchedulerError::UnknownDevice(device_id))?;
        voice.note_deadline = None;
        let mut stopping = Vec::new();
        for slot in &mut voice.slots {
            if let Some(n) = slot.note {
                stopping.push(n);
            }
            slot.target_gain = 0.0;
            slot.fade_ms = release_ms.max(1);
        }
        Ok(stopping)
    }

    pub fn any_active_notes(&self) -> bool {
        self.voices.lock().unwrap().values().any(|v| v.slots.iter().any(|s| s.note.is_some()))
    }

    /// Release any device whose fixed `note_duration_s` deadline has
    /// elapsed, using a quarter of that duration as the release ramp.
    pub fn process_timeouts(&mut self, now: Instant) -> Result<(), SchedulerError> {
        let expired: Vec<(u8, u32)> = {
            let voices = self.voices.lock().unwrap();
            voices
                .iter()
                .filter(|(_, v)| v.note_deadline.map(|d| d <= now).unwrap_or(false))
                .map(|(&id, v)| (id, (v.settings.note_duration_s * 1000.0 / 4.0).max(1.0) as u32))
                .collect()
        };
        for (device_id, release_ms) in expired {
            self.stop_device(device_id, release_ms.max(1))?;
        }
        Ok(())
    }
}

impl Drop for VoiceMixer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.tick_thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_ramp(
    engine: Arc<Mutex<Box<dyn VoiceEngine>>>,
    voices: Arc<Mutex<HashMap<u8, DeviceVoice>>>,
    stop: Arc<AtomicBool>,
) {
    let mut last_tick = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(TICK_PERIOD);
        let now = Instant::now();
        let dt_ms = now.duration_since(last_tick).as_secs_f64() * 1000.0;
        last_tick = now;

        let mut voices = voices.lock().unwrap();
        let mut engine = engine.lock().unwrap();
        for voice in voices.values_mut() {
            let device_gain = voice.settings.device_gain;
            for slot in &mut voice.slots {
                step_slot(slot, dt_ms, device_gain, engine.as_mut());
            }
        }
    }
}

fn step_slot(slot: &mut VoiceSlot, dt_ms: f64, device_gain: f64, engine: &mut dyn VoiceEngine) {
    if (slot.gain - slot.target_gain).abs() > f64::EPSILON {
        let step = dt_ms / slot.fade_ms as f64;
        if slot.gain < slot.target_gain {
            slot.gain = (slot.gain + step).min(slot.target_gain);
        } else {
            slot.gain = (slot.gain - step).max(slot.target_gain);
        }
    }

    if slot.note.is_some() {
        let cc7 = ((slot.gain * device_gain).clamp(0.0, 1.0) * 127.0).round() as u8;
        if cc7 != slot.last_cc7 {
            let _ = engine.control_change(slot.channel, 7, cc7);
            slot.last_cc7 = cc7;
        }
        if slot.gain <= GAIN_FLOOR && slot.target_gain <= GAIN_FLOOR {
            let note = slot.note.take().unwrap();
            let _ = engine.note_off(slot.channel, note);
            slot.gain = 0.0;
            slot.last_cc7 = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingEngine {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl VoiceEngine for RecordingEngine {
        fn load_instrument(&mut self, instrument: &str) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("load {instrument}"));
            Ok(())
        }
        fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("on {channel} {pitch} {velocity}"));
            Ok(())
        }
        fn note_off(&mut self, channel: u8, pitch: u8) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("off {channel} {pitch}"));
            Ok(())
        }
        fn program_select(&mut self, channel: u8, bank: u8, preset: u8) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("program {channel} {bank} {preset}"));
            Ok(())
        }
        fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("cc {channel} {controller} {value}"));
            Ok(())
        }
        fn pitch_bend(&mut self, channel: u8, value: i16) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("bend {channel} {value}"));
            Ok(())
        }
        fn channel_pressure(&mut self, channel: u8, value: u8) -> Result<(), SchedulerError> {
            self.events.lock().unwrap().push(format!("pressure {channel} {value}"));
            Ok(())
        }
    }

    fn settings() -> VoiceSettings {
        VoiceSettings {
            channel_a: 0,
            channel_b: 1,
            bank: 0,
            preset: 0,
            note_duration_s: 0.0,
            device_gain: 1.0,
            retrigger_floor: 0.05,
        }
    }

    #[test]
    fn new_note_starts_on_slot_zero() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { events: events.clone() };
        let mut mixer = VoiceMixer::new(Box::new(engine));
        mixer.register_device(1, settings());

        let result = mixer.play_note(1, 60, 1.0, 20, 100, false, false).unwrap();
        assert_eq!(result.started, Some(60));
        assert!(events.lock().unwrap().iter().any(|e| e == "on 0 60 100"));
    }

    #[test]
    fn different_note_crossfades_to_the_other_slot() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { events: events.clone() };
        let mut mixer = VoiceMixer::new(Box::new(engine));
        mixer.register_device(1, settings());

        mixer.play_note(1, 60, 1.0, 20, 100, false, false).unwrap();
        let result = mixer.play_note(1, 64, 1.0, 20, 100, false, false).unwrap();
        assert!(result.crossfaded);
        assert_eq!(result.started, Some(64));
        assert_eq!(result.stopped, Some(60));
        assert!(events.lock().unwrap().iter().any(|e| e == "on 1 64 100"));
    }

    #[test]
    fn clear_voice_cuts_both_slots_before_restarting() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { events: events.clone() };
        let mut mixer = VoiceMixer::new(Box::new(engine));
        mixer.register_device(1, settings());

        mixer.play_note(1, 60, 1.0, 20, 100, false, false).unwrap();
        mixer.play_note(1, 64, 1.0, 20, 100, false, false).unwrap();
        let result = mixer.play_note(1, 67, 1.0, 20, 100, false, true).unwrap();
        assert_eq!(result.started, Some(67));
    }

    #[test]
    fn stop_device_ramps_both_slots_to_silence() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { events: events.clone() };
        let mut mixer = VoiceMixer::new(Box::new(engine));
        mixer.register_device(1, settings());
        mixer.play_note(1, 60, 1.0, 5, 100, false, false).unwrap();

        mixer.stop_device(1, 5).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!mixer.any_active_notes());
        assert!(events.lock().unwrap().iter().any(|e| e == "off 0 60"));
    }
}
