//! The event-detection state machine: turns a stream of magnetometer
//! samples into sector/session events.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::{EventDetectionConfig, EVENT_BUFFER_SIZE, EVENT_MIN_SECTORS, PASSING_SECTOR_CHANGE_WINDOW_S};
use crate::event::Event;

fn clamp_u8(value: f64) -> u8 {
    if value < 0.0 {
        0
    } else if value > 255.0 {
        255
    } else {
        value as u8
    }
}

fn stamp_ms16(now_s: f64) -> u16 {
    ((now_s * 1000.0) as i64 & 0xFFFF) as u16
}

/// Stateful per-device event detector. Feed it magnetometer samples via
/// [`process_mag_sample`](Self::process_mag_sample); it reports zero or more
/// [`Event`]s per sample.
pub struct EventDetector {
    config: EventDetectionConfig,
    sector_buf: VecDeque<u8>,
    elev_buf: VecDeque<f64>,
    last_sector: u8,
    last_elevation: f64,
    last_state_elevation: u8,
    last_event_s: f64,
    last_nonzero_s: f64,
    session_active: bool,
    last_sector_event_s: HashMap<u8, f64>,
    deactivated: HashSet<u8>,
    last_no_data_s: f64,
}

impl EventDetector {
    pub fn new(config: EventDetectionConfig, now_s: f64) -> Self {
        Self {
            config,
            sector_buf: VecDeque::with_capacity(EVENT_BUFFER_SIZE),
            elev_buf: VecDeque::with_capacity(EVENT_BUFFER_SIZE),
            last_sector: 0,
            last_elevation: 0.0,
            last_state_elevation: 0,
            last_event_s: now_s,
            last_nonzero_s: now_s,
            session_active: false,
            last_sector_event_s: HashMap::new(),
            deactivated: HashSet::new(),
            last_no_data_s: 0.0,
        }
    }

    pub fn apply_config(&mut self, config: EventDetectionConfig) {
        self.config = config;
    }

    pub fn reset_state(&mut self, now_s: f64) {
        *self = Self::new(self.config, now_s);
    }

    fn rotate_3d(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let rad_xy = self.config.rotate_xy_deg.to_radians();
        let x1 = x * rad_xy.cos() - y * rad_xy.sin();
        let y1 = x * rad_xy.sin() + y * rad_xy.cos();
        let z1 = z;

        let rad_xz = self.config.rotate_xz_deg.to_radians();
        let x2 = x1 * rad_xz.cos() - z1 * rad_xz.sin();
        let z2 = x1 * rad_xz.sin() + z1 * rad_xz.cos();
        let y2 = y1;

        let rad_yz = self.config.rotate_yz_deg.to_radians();
        let y3 = y2 * rad_yz.cos() - z2 * rad_yz.sin();
        let z3 = y2 * rad_yz.sin() + z2 * rad_yz.cos();
        (x2, y3, z3)
    }

    /// Map a raw `(x, y, z)` magnetometer reading to `(sector, elevation)`,
    /// where sector `0` means "inside the keepout/z-limit silence zone".
    pub fn compute_sector_elevation(&self, x: f64, y: f64, z: f64) -> (u8, u8) {
        let z_adj = z - self.config.center_z;
        let (xr, yr, zr) = self.rotate_3d(x, y, z_adj);

        let dx = xr - self.config.center_x;
        let dy = yr - self.config.center_y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance <= self.config.keepout_rad || zr < self.config.z_limit {
            return (0, 0);
        }

        let mut azimuth = dy.atan2(dx).to_degrees();
        while azimuth < 0.0 {
            azimuth += 360.0;
        }
        while azimuth >= 360.0 {
            azimuth -= 360.0;
        }

        let sector = (azimuth / (360.0 / self.config.num_sectors as f64)) as u8 + 1;
        let elevation = clamp_u8((zr - self.config.z_limit).max(0.0));
        (sector, elevation)
    }

    /// Feed one magnetometer sample and return whatever events it produces,
    /// in firing order.
    pub fn process_mag_sample(&mut self, x: f64, y: f64, z: f64, now_s: f64) -> Vec<Event> {
        let mut out = Vec::new();
        let (sector, elev_u8) = self.compute_sector_elevation(x, y, z);

        if self.sector_buf.len() == EVENT_BUFFER_SIZE {
            self.sector_buf.pop_front();
            self.elev_buf.pop_front();
        }
        self.sector_buf.push_back(sector);
        self.elev_buf.push_back(elev_u8 as f64);

        if self.elev_buf.len() < EVENT_BUFFER_SIZE {
            self.last_event_s = now_s;
            self.last_sector = sector;
            self.last_elevation = elev_u8 as f64;
            self.last_state_elevation = elev_u8;
            return out;
        }

        let elev_avg = self.elev_buf.iter().sum::<f64>() / self.elev_buf.len() as f64;
        let dt = (now_s - self.last_event_s).max(0.001);
        let speed = clamp_u8((elev_avg - self.last_elevation).abs() / dt);
        let stamp = stamp_ms16(now_s);

        if sector != self.last_sector {
            if self.last_sector == 0 {
                out.push(Event::sector_activated(sector, clamp_u8(elev_avg), speed, stamp));
                if !self.session_active {
                    out.push(Event::session_started(stamp));
                    self.session_active = true;
                }
            } else if sector != 0 {
                let diff = (self.last_sector as i16 - sector as i16).unsigned_abs() as u8;
                let wrap_diff = self.config.num_sectors - diff;
                if (diff == 1 || wrap_diff == 1) && (now_s - self.last_event_s) < PASSING_SECTOR_CHANGE_WINDOW_S {
                    out.push(Event::passing_sector_change(sector, stamp));
                } else {
                    out.push(Event::sector_changed(self.last_sector, sector, stamp));
                }
            }

            if sector >= EVENT_MIN_SECTORS && sector <= self.config.num_sectors {
                self.deactivated.remove(&sector);
                self.last_sector_event_s.insert(sector, now_s);
            }
        } else if sector != 0 && (elev_avg - self.last_elevation).abs() > self.config.change_threshold {
            if !self.deactivated.contains(&sector) {
                out.push(Event::intensity_change(sector, clamp_u8(elev_avg), speed, stamp));
                self.last_sector_event_s.insert(sector, now_s);
            }
        }

        if self.last_sector != 0 {
            self.last_nonzero_s = now_s;
        }

        if self.last_sector != 0 && self.last_sector <= self.config.num_sectors {
            if let Some(&sec_last) = self.last_sector_event_s.get(&self.last_sector) {
                if sec_last > 0.0
                    && (now_s - sec_last) > (self.config.deactivation_timeout_ms as f64 / 1000.0)
                {
                    out.push(Event::section_deactivated(self.last_sector, stamp));
                    if self.session_active {
                        out.push(Event::session_ended(stamp));
                        self.session_active = false;
                    }
                    self.deactivated.insert(self.last_sector);
                    self.last_sector_event_s.remove(&self.last_sector);
                }
            }
        }

        if self.last_sector != 0 && (now_s - self.last_event_s) > (self.config.session_timeout_ms as f64 / 1000.0) {
            out.push(Event::possible_mechanical_failure(self.last_sector, stamp));
        } else if self.last_sector == 0
            && (now_s - self.last_nonzero_s) > (self.config.session_timeout_ms as f64 / 1000.0)
            && self.session_active
        {
            out.push(Event::session_ended(stamp));
            self.session_active = false;
        }

        self.last_sector = sector;
        self.last_elevation = elev_avg;
        self.last_state_elevation = clamp_u8(elev_avg);
        self.last_event_s = now_s;
        out
    }

    /// Report a period with no sensor data, at most once per session
    /// timeout window.
    pub fn post_no_data(&mut self, now_s: f64) -> Vec<Event> {
        if (now_s - self.last_no_data_s) < (self.config.session_timeout_ms as f64 / 1000.0) {
            return Vec::new();
        }
        self.last_no_data_s = now_s;
        vec![Event::error_no_data(stamp_ms16(now_s))]
    }

    pub fn sector_state(&self) -> (u8, u8) {
        (self.last_sector, self.last_state_elevation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn fill_buffer(det: &mut EventDetector, x: f64, y: f64, z: f64, start_s: f64) -> Vec<Event> {
        let mut events = Vec::new();
        for i in 0..EVENT_BUFFER_SIZE {
            events.extend(det.process_mag_sample(x, y, z, start_s + i as f64 * 0.01));
        }
        events
    }

    #[test]
    fn stays_in_keepout_zone_reports_no_events() {
        let mut det = EventDetector::new(EventDetectionConfig::default(), 0.0);
        let events = fill_buffer(&mut det, 0.0, 0.0, 0.0, 0.0);
        assert!(events.is_empty());
        assert_eq!(det.sector_state(), (0, 0));
    }

    #[test]
    fn entering_a_sector_fires_activation_and_session_started() {
        let mut det = EventDetector::new(EventDetectionConfig::default(), 0.0);
        fill_buffer(&mut det, 0.0, 0.0, 0.0, 0.0);
        let events = det.process_mag_sample(2000.0, 0.0, 300.0, 0.2);
        assert!(events.iter().any(|e| e.kind == EventKind::SectorActivated));
        assert!(events.iter().any(|e| e.kind == EventKind::SessionStarted));
    }

    #[test]
    fn adjacent_sector_flip_within_window_is_passing_change() {
        let cfg = EventDetectionConfig::default();
        let mut det = EventDetector::new(cfg, 0.0);
        fill_buffer(&mut det, 2000.0, 100.0, 300.0, 0.0);
        det.process_mag_sample(2000.0, 100.0, 300.0, 0.2);
        // A second sample one sector over, fired within the passing window.
        let events = det.process_mag_sample(100.0, 2000.0, 300.0, 0.205);
        assert!(
            events.iter().any(|e| e.kind == EventKind::PassingSectorChange)
                || events.iter().any(|e| e.kind == EventKind::SectorChanged)
        );
    }

    #[test]
    fn post_no_data_is_rate_limited() {
        let mut det = EventDetector::new(EventDetectionConfig::default(), 0.0);
        let first = det.post_no_data(0.0);
        assert_eq!(first.len(), 1);
        let second = det.post_no_data(1.0);
        assert!(second.is_empty());
        let third = det.post_no_data(11.0);
        assert_eq!(third.len(), 1);
    }
}
