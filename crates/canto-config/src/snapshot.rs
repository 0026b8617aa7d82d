//! JSON snapshot export/import of a device's calibration, for the host
//! CLI's `calib-save`/`calib-load` commands and offline backup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub device_id: u8,
    pub calibration: Calibration,
}

impl CalibrationSnapshot {
    pub fn new(device_id: u8, calibration: Calibration) -> Self {
        Self { device_id, calibration }
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, clamping every field to its valid range rather
    /// than rejecting the whole file over one out-of-range value — the
    /// file may have been hand-edited.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut snapshot: Self = serde_json::from_str(text)?;
        for field_id in 1..=19u8 {
            let (min, max) = Calibration::bounds(field_id).expect("field ids 1..=19 are all valid");
            let current = snapshot.calibration.get_field(field_id).expect("checked above");
            snapshot.calibration.set_field(field_id, current.clamp(min, max)).expect("checked above");
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| ConfigError::FileWrite { path: path.to_path_buf(), source: e })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead { path: path.to_path_buf(), source: e })?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_values() {
        let snap = CalibrationSnapshot::new(5, Calibration::default());
        let json = snap.to_json().unwrap();
        let decoded = CalibrationSnapshot::from_json(&json).unwrap();
        assert_eq!(decoded.device_id, 5);
        assert_eq!(decoded.calibration, snap.calibration);
    }

    #[test]
    fn from_json_clamps_out_of_range_hand_edits() {
        let mut calib = Calibration::default();
        calib.num_sectors = 1;
        let mut snap = CalibrationSnapshot::new(1, calib);
        let json = snap.to_json().unwrap();
        let mut raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        raw["calibration"]["num_sectors"] = serde_json::json!(999);
        let decoded = CalibrationSnapshot::from_json(&raw.to_string()).unwrap();
        assert_eq!(decoded.calibration.num_sectors, 16);
        snap.calibration.num_sectors = 1;
    }
}
