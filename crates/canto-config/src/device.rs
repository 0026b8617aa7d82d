//! Per-device configuration: identity plus the calibration and detector
//! overrides that apply to it.

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;

/// Per-device overrides for the event detector's timing thresholds. Left as
/// `Option` so an unset field falls back to the detector's own default
/// rather than silently zeroing it out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectorOverrides {
    pub change_threshold: Option<f64>,
    pub deactivation_timeout_ms: Option<u32>,
    pub session_timeout_ms: Option<u32>,
}

/// Where a device's sector/intensity events come from: detected on the host
/// from a streamed magnetometer sample, or detected on-device and forwarded
/// as `EVENT` frames directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    Software,
    Hardware,
}

/// One device's roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub detector: DetectorOverrides,
    /// MIDI channel (or equivalent voice-engine device slot) this sensor's
    /// first voice slot drives. Defaults to its bus id.
    #[serde(default)]
    pub voice_channel: Option<u8>,
    /// Second voice slot's channel, used for the crossfade partner note.
    /// Defaults to `voice_channel + 1` (mod 16).
    #[serde(default)]
    pub voice_channel_b: Option<u8>,
    /// Sector-to-note table, indexed by `(sector - 1) % note_map.len()`.
    /// Falls back to [`DeviceConfig::default_note_map`] when unset.
    #[serde(default)]
    pub note_map: Option<Vec<u8>>,
    /// Whether this device's sector events are detected on the host (from
    /// streamed mag samples) or on-device (streamed as `EVENT` frames).
    #[serde(default)]
    pub event_source: EventSource,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: None,
            calibration: Calibration::default(),
            detector: DetectorOverrides::default(),
            voice_channel: None,
            voice_channel_b: None,
            note_map: None,
            event_source: EventSource::default(),
        }
    }
}

impl DeviceConfig {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("device-{}", self.id))
    }

    /// A 6-tone default scale, matching the original player's hardcoded
    /// `note_map` default.
    pub fn default_note_map() -> Vec<u8> {
        vec![60, 61, 63, 65, 66, 68]
    }

    pub fn note_for_sector(&self, sector: u8) -> u8 {
        let map = self.note_map.as_deref().unwrap_or(&[]);
        if map.is_empty() {
            let default = Self::default_note_map();
            let idx = (sector.max(1) - 1) as usize % default.len();
            default[idx]
        } else {
            let idx = (sector.max(1) - 1) as usize % map.len();
            map[idx]
        }
    }
}
