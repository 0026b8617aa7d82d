//! Beat-quantized scheduler tuning: tempo, voice envelope, and the
//! intensity/velocity/level shaping curves.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstrumentConfig {
    #[serde(default = "InstrumentConfig::default_bpm")]
    pub bpm: f64,
    /// Fixed note duration in ms; `0` means "hold until explicitly stopped".
    #[serde(default)]
    pub note_duration_ms: u32,
    /// Crossfade-in time for a new or replacing note.
    #[serde(default = "InstrumentConfig::default_fadein_ms")]
    pub fadein_ms: u32,
    /// Release/crossfade-out time for a note being cut or a stopped device.
    #[serde(default = "InstrumentConfig::default_fadeout_ms")]
    pub fadeout_ms: u32,
    /// Exponent applied to normalized intensity before mapping to MIDI
    /// velocity; `1.0` is linear, `>1.0` favors louder notes, `<1.0`
    /// favors quieter ones.
    #[serde(default = "InstrumentConfig::default_velocity_gamma")]
    pub velocity_gamma: f64,
    #[serde(default = "InstrumentConfig::default_velocity_min")]
    pub velocity_min: u8,
    #[serde(default = "InstrumentConfig::default_velocity_max")]
    pub velocity_max: u8,
    /// Sensor intensity value (0..=255 raw scale) that maps to `level = 1.0`.
    #[serde(default = "InstrumentConfig::default_intensity_full_scale")]
    pub intensity_full_scale: u16,
    #[serde(default = "InstrumentConfig::default_min_level")]
    pub min_level: f64,
    #[serde(default = "InstrumentConfig::default_max_level")]
    pub max_level: f64,
    /// Exponent applied to normalized intensity before mapping to a voice
    /// slot's target gain.
    #[serde(default = "InstrumentConfig::default_level_gamma")]
    pub level_gamma: f64,
    /// Below this gain, a slot counts as silent for retrigger purposes.
    #[serde(default = "InstrumentConfig::default_retrigger_floor")]
    pub retrigger_floor: f64,
    /// Overall per-device gain multiplier applied on top of a slot's ramped
    /// gain when deriving CC7.
    #[serde(default = "InstrumentConfig::default_device_gain")]
    pub device_gain: f64,
}

impl InstrumentConfig {
    fn default_bpm() -> f64 {
        120.0
    }
    fn default_fadein_ms() -> u32 {
        20
    }
    fn default_fadeout_ms() -> u32 {
        220
    }
    fn default_velocity_gamma() -> f64 {
        0.7
    }
    fn default_velocity_min() -> u8 {
        1
    }
    fn default_velocity_max() -> u8 {
        127
    }
    fn default_intensity_full_scale() -> u16 {
        255
    }
    fn default_min_level() -> f64 {
        0.2
    }
    fn default_max_level() -> f64 {
        1.0
    }
    fn default_level_gamma() -> f64 {
        1.7
    }
    fn default_retrigger_floor() -> f64 {
        0.05
    }
    fn default_device_gain() -> f64 {
        1.0
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            bpm: Self::default_bpm(),
            note_duration_ms: 0,
            fadein_ms: Self::default_fadein_ms(),
            fadeout_ms: Self::default_fadeout_ms(),
            velocity_gamma: Self::default_velocity_gamma(),
            velocity_min: Self::default_velocity_min(),
            velocity_max: Self::default_velocity_max(),
            intensity_full_scale: Self::default_intensity_full_scale(),
            min_level: Self::default_min_level(),
            max_level: Self::default_max_level(),
            level_gamma: Self::default_level_gamma(),
            retrigger_floor: Self::default_retrigger_floor(),
            device_gain: Self::default_device_gain(),
        }
    }
}

impl InstrumentConfig {
    pub fn beat_period_s(&self) -> f64 {
        60.0 / self.bpm.max(1e-6)
    }
}
