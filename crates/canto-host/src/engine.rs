//! The main engine tick: drains whatever the CAN listener queued for each
//! device, runs it through that device's [`EventDetector`], and fans the
//! resulting events out to the beat scheduler and the LED pipeline.
//!
//! Transport I/O, the LED worker, and the MIDI writer all run on their own
//! threads; this loop owns scheduler and detector state single-threaded, as
//! the authoritative source of per-device musical state.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use canto_config::{DeviceConfig, GlobalConfig, LedConfig};
use canto_detect::{Event, EventDetectionConfig, EventDetector, EventKind};
use canto_led::{AnimMode, LedCommand, LedWorkerHandle};
use canto_scheduler::{MidiPortEngine, Scheduler, VoiceMixer, VoiceSettings};
use canto_transport::{CanBus, DeviceClient};
use tracing::{debug, info, warn};

use crate::listener::{self, MagFeed, MagListener};
use crate::roster::{self, RosterEntry};
use crate::stats::FleetStats;

/// A fallback intensity used when an event carries no elevation sample of
/// its own (sector-changed / passing-change), mirroring the original
/// player's `level_from_intensity(profile, 60)` fallback.
const FALLBACK_INTENSITY: u8 = 153;

struct Device {
    config: DeviceConfig,
    client: Arc<DeviceClient>,
    /// `None` for a hardware-event-source device: its sector/intensity
    /// events are detected on-device and arrive as `EVENT` frames, so there
    /// is nothing for a host-side detector to do.
    detector: Option<EventDetector>,
    led: LedWorkerHandle,
}

pub struct Engine {
    devices: Vec<Device>,
    scheduler: Scheduler,
    stats: FleetStats,
    feed: MagFeed,
    listener: Option<MagListener>,
    led_config: LedConfig,
}

fn detector_config_for(device: &DeviceConfig) -> EventDetectionConfig {
    let mut cfg = EventDetectionConfig::from_calibration(&device.calibration);
    if let Some(v) = device.detector.change_threshold {
        cfg.change_threshold = v;
    }
    if let Some(v) = device.detector.deactivation_timeout_ms {
        cfg.deactivation_timeout_ms = v;
    }
    if let Some(v) = device.detector.session_timeout_ms {
        cfg.session_timeout_ms = v;
    }
    cfg
}

fn now_s(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

/// Mag is stream 1, the on-device event stream is stream 4 — the two
/// telemetry sources that feed a device's event pipeline, software or
/// hardware respectively.
fn event_source_stream(source: canto_config::EventSource) -> u8 {
    match source {
        canto_config::EventSource::Software => 1,
        canto_config::EventSource::Hardware => 4,
    }
}

impl Engine {
    pub fn new(config: &GlobalConfig, bus: Arc<Mutex<CanBus>>, midi_port: &str) -> Result<Self> {
        let engine = MidiPortEngine::open(midi_port).context("failed to open MIDI output port")?;
        let mut mixer = VoiceMixer::new(Box::new(engine));

        let entries: Vec<RosterEntry> = roster::build(Arc::clone(&bus), config);
        if entries.is_empty() {
            warn!("no devices found on the bus");
        }
        let device_ids: Vec<u8> = entries.iter().map(|e| e.config.id).collect();
        let (listener, feed) = listener::spawn(bus, &device_ids);

        let start = Instant::now();
        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            let channel_a = entry.config.voice_channel.unwrap_or(entry.config.id);
            let channel_b = entry.config.voice_channel_b.unwrap_or((channel_a + 1) % 16);
            mixer.register_device(
                entry.config.id,
                VoiceSettings {
                    channel_a,
                    channel_b,
                    bank: 0,
                    preset: 0,
                    note_duration_s: config.instrument.note_duration_ms as f64 / 1000.0,
                    device_gain: config.instrument.device_gain,
                    retrigger_floor: config.instrument.retrigger_floor,
                },
            );

            let detector = match entry.config.event_source {
                canto_config::EventSource::Software => {
                    Some(EventDetector::new(detector_config_for(&entry.config), now_s(start)))
                }
                canto_config::EventSource::Hardware => None,
            };
            let led = canto_led::spawn(Arc::clone(&entry.client), config.led);

            devices.push(Device { config: entry.config, client: entry.client, detector, led });
        }

        let scheduler = Scheduler::new(mixer, config.instrument);
        Ok(Self {
            devices,
            scheduler,
            stats: FleetStats::new(),
            feed,
            listener: Some(listener),
            led_config: config.led,
        })
    }

    /// Ordered startup: verify calibration is loaded, enable the streams
    /// this host reads, then bring the LED strip to a known base state.
    pub fn start_devices(&mut self) -> Result<()> {
        for device in &mut self.devices {
            if device.detector.is_some() {
                if let Err(e) = device.client.calib_load() {
                    warn!(device = device.config.id, error = %e, "calibration load failed, using device defaults");
                }
            }
            let stream = event_source_stream(device.config.event_source);
            if let Err(e) = device.client.set_stream_enable(stream, true) {
                warn!(device = device.config.id, error = %e, stream, "failed to enable event-source stream");
            }
            device.led.push(LedCommand::Clear);
            device.led.push(LedCommand::SetState { on: true, mode: 0 });
            device.led.push(LedCommand::SetAnim { mode: AnimMode::SectorFollow, speed: self.led_config.base_speed });
        }
        Ok(())
    }

    pub fn stop_devices(&mut self) {
        for device in &self.devices {
            let stream = event_source_stream(device.config.event_source);
            let _ = device.client.set_stream_enable(stream, false);
            device.led.push(LedCommand::Clear);
        }
        if let Some(listener) = self.listener.take() {
            listener.shutdown();
        }
    }

    /// One pass over every device: drain whatever the CAN listener queued
    /// since the last tick, detect events, route them, then flush the beat
    /// scheduler.
    pub fn tick(&mut self, start: Instant) -> Result<()> {
        let timestamp = now_s(start);
        for device in &mut self.devices {
            match &mut device.detector {
                Some(detector) => {
                    let samples = self.feed.drain(device.config.id);
                    if samples.is_empty() {
                        continue;
                    }
                    self.stats.record_ok(device.config.id);
                    for sample in samples {
                        let events =
                            detector.process_mag_sample(sample.x as f64, sample.y as f64, sample.z as f64, timestamp);
                        self.stats.record_events(device.config.id, events.len());
                        route_events(&device.config, &self.led_config, &mut self.scheduler, &device.led, &events);
                    }
                }
                None => {
                    let events = self.feed.drain_events(device.config.id);
                    if events.is_empty() {
                        continue;
                    }
                    self.stats.record_ok(device.config.id);
                    self.stats.record_events(device.config.id, events.len());
                    route_events(&device.config, &self.led_config, &mut self.scheduler, &device.led, &events);
                }
            }
        }

        for result in self.scheduler.tick()? {
            let (device_id, chord) = result;
            debug!(device = device_id, ?chord, "flushed beat-quantized chord");
        }
        self.scheduler.process_note_durations(Instant::now())?;
        Ok(())
    }

    pub fn stats(&self) -> &FleetStats {
        &self.stats
    }

    pub fn device_ids(&self) -> Vec<u8> {
        self.devices.iter().map(|d| d.config.id).collect()
    }
}

fn color_for_intensity(intensity: u8) -> (u8, u8, u8) {
    (intensity, 255 - intensity / 2, 64)
}

fn route_events(
    device: &DeviceConfig,
    led_config: &LedConfig,
    scheduler: &mut Scheduler,
    led: &LedWorkerHandle,
    events: &[Event],
) {
    for event in events {
        match event.kind {
            EventKind::SectorActivated => {
                let sector = event.p0;
                let intensity = event.p1;
                let note = device.note_for_sector(sector);
                scheduler.queue_notes(device.id, vec![note], intensity, false);
                led.push(LedCommand::SetActiveSector(sector));
                let (r, g, b) = color_for_intensity(intensity);
                led.push(LedCommand::SetSectorColor { sector, r, g, b });
            }
            EventKind::SectorChanged => {
                let to = event.p1;
                let note = device.note_for_sector(to);
                scheduler.queue_notes(device.id, vec![note], FALLBACK_INTENSITY, false);
                led.push(LedCommand::SetActiveSector(to));
            }
            EventKind::PassingSectorChange => {
                let sector = event.p0;
                let note = device.note_for_sector(sector);
                scheduler.queue_notes(device.id, vec![note], FALLBACK_INTENSITY, false);
                led.push(LedCommand::SetActiveSector(sector));
            }
            EventKind::IntensityChange => {
                let sector = event.p0;
                let intensity = event.p1;
                let note = device.note_for_sector(sector);
                scheduler.queue_notes(device.id, vec![note], intensity, false);
                let (r, g, b) = color_for_intensity(intensity);
                led.push(LedCommand::SetSectorColor { sector, r, g, b });
            }
            EventKind::SectionDeactivated
            | EventKind::SessionEnded
            | EventKind::PossibleMechanicalFailure
            | EventKind::ErrorNoData => {
                let _ = scheduler.stop_device_now(device.id);
                led.push(LedCommand::SetSectorColor { sector: 0, r: 0, g: 0, b: 0 });
                led.push(LedCommand::SetAnim { mode: AnimMode::SectorFollow, speed: led_config.base_speed });
            }
            EventKind::SessionStarted => {
                info!(device = device.id, "session started");
                led.push(LedCommand::SetAnim { mode: AnimMode::Gradient, speed: led_config.play_speed });
            }
        }
    }
}
