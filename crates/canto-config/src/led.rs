//! LED command pipeline tuning: queue depth, retry/spacing, and the
//! keepalive interval that keeps a strip's simple-mode fallback at bay.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedConfig {
    #[serde(default = "LedConfig::default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "LedConfig::default_command_spacing_ms")]
    pub command_spacing_ms: u64,
    #[serde(default = "LedConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "LedConfig::default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Fall back to a flat single-color "simple mode" after this many
    /// consecutive failed gradient pushes.
    #[serde(default = "LedConfig::default_simple_mode_after_failures")]
    pub simple_mode_after_failures: u32,
    /// Animation speed while idle ("sector-follow" mode).
    #[serde(default = "LedConfig::default_base_speed")]
    pub base_speed: u8,
    /// Animation speed while a device is actively playing ("gradient" mode).
    #[serde(default = "LedConfig::default_play_speed")]
    pub play_speed: u8,
    /// Strip length in pixels, sent on startup and on simple-mode fallback.
    #[serde(default = "LedConfig::default_strip_length")]
    pub strip_length: u16,
}

impl LedConfig {
    fn default_queue_depth() -> usize {
        16
    }
    fn default_command_spacing_ms() -> u64 {
        10
    }
    fn default_max_retries() -> u32 {
        3
    }
    fn default_keepalive_interval_ms() -> u64 {
        2000
    }
    fn default_simple_mode_after_failures() -> u32 {
        5
    }
    fn default_base_speed() -> u8 {
        40
    }
    fn default_play_speed() -> u8 {
        90
    }
    fn default_strip_length() -> u16 {
        60
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            queue_depth: Self::default_queue_depth(),
            command_spacing_ms: Self::default_command_spacing_ms(),
            max_retries: Self::default_max_retries(),
            keepalive_interval_ms: Self::default_keepalive_interval_ms(),
            simple_mode_after_failures: Self::default_simple_mode_after_failures(),
            base_speed: Self::default_base_speed(),
            play_speed: Self::default_play_speed(),
            strip_length: Self::default_strip_length(),
        }
    }
}
