//! Monotonic beat clock: converts wall-clock time to beat position at a
//! fixed tempo.
//!
//! Unlike a tempo-map-driven transport, canto's tempo is a single BPM value
//! that can change at runtime (via config reload) but never varies
//! mid-measure, so the clock only needs to remember the position and
//! instant of its last tempo change.

use std::time::Instant;

/// Tracks playback position in beats, advancing from wall-clock time at a
/// configurable BPM.
pub struct BeatClock {
    bpm: f64,
    start_instant: Instant,
    start_position: f64,
}

impl BeatClock {
    pub fn new(bpm: f64) -> Self {
        Self { bpm: bpm.max(1e-6), start_instant: Instant::now(), start_position: 0.0 }
    }

    /// Current position in beats.
    pub fn position(&self) -> f64 {
        let elapsed_s = self.start_instant.elapsed().as_secs_f64();
        self.start_position + elapsed_s * (self.bpm / 60.0)
    }

    /// The integer beat index the clock is currently inside.
    pub fn current_beat(&self) -> u64 {
        self.position().floor() as u64
    }

    /// Change tempo without discontinuity: the current position becomes the
    /// new reference point.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.start_position = self.position();
        self.start_instant = Instant::now();
        self.bpm = bpm.max(1e-6);
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beat_period_s(&self) -> f64 {
        60.0 / self.bpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn position_advances_with_wall_time() {
        let clock = BeatClock::new(120.0);
        sleep(Duration::from_millis(20));
        assert!(clock.position() > 0.0);
    }

    #[test]
    fn set_bpm_preserves_current_position() {
        let mut clock = BeatClock::new(60.0);
        sleep(Duration::from_millis(10));
        let before = clock.position();
        clock.set_bpm(240.0);
        let after = clock.position();
        assert!((after - before).abs() < 0.05);
        assert_eq!(clock.bpm(), 240.0);
    }
}
