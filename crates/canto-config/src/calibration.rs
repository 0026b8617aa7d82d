//! The 19-field per-device calibration vector: magnetometer geometry plus
//! earth-field and mount-offset corrections, addressable over CAN by
//! `field_id` in `[1, 19]` (`0` means "all fields" for a bulk `calib_get`).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

macro_rules! calibration_fields {
    ($($field:ident: $id:expr, [$min:expr, $max:expr]),+ $(,)?) => {
        /// Magnetometer calibration for one device, clamped to firmware
        /// range at load/set time so nothing downstream has to re-check it.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub struct Calibration {
            $(pub $field: i32,)+
        }

        impl Calibration {
            /// Field id (`1..=19`) for a named calibration field.
            pub fn field_id(name: &str) -> Option<u8> {
                match name {
                    $(stringify!($field) => Some($id),)+
                    _ => None,
                }
            }

            pub fn field_name(field_id: u8) -> Option<&'static str> {
                match field_id {
                    $($id => Some(stringify!($field)),)+
                    _ => None,
                }
            }

            pub fn bounds(field_id: u8) -> Option<(i32, i32)> {
                match field_id {
                    $($id => Some(($min, $max)),)+
                    _ => None,
                }
            }

            /// Set one field by id, clamping to its valid range.
            pub fn set_field(&mut self, field_id: u8, value: i32) -> Result<(), ConfigError> {
                match field_id {
                    $($id => { self.$field = value.clamp($min, $max); Ok(()) })+
                    _ => Err(ConfigError::UnknownCalibrationField(field_id)),
                }
            }

            pub fn get_field(&self, field_id: u8) -> Result<i32, ConfigError> {
                match field_id {
                    $($id => Ok(self.$field),)+
                    _ => Err(ConfigError::UnknownCalibrationField(field_id)),
                }
            }
        }
    };
}

calibration_fields! {
    center_x: 1, [-32768, 32767],
    center_y: 2, [-32768, 32767],
    center_z: 3, [-32768, 32767],
    rotate_xy: 4, [-36000, 36000],
    rotate_xz: 5, [-36000, 36000],
    rotate_yz: 6, [-36000, 36000],
    keepout_rad: 7, [0, 32767],
    z_limit: 8, [-32768, 32767],
    data_radius: 9, [10, 32767],
    mag_offset_x: 10, [-32768, 32767],
    mag_offset_y: 11, [-32768, 32767],
    mag_offset_z: 12, [-32768, 32767],
    earth_x: 13, [-32768, 32767],
    earth_y: 14, [-32768, 32767],
    earth_z: 15, [-32768, 32767],
    earth_valid: 16, [0, 1],
    z_max: 17, [-32768, 32767],
    elev_curve: 18, [10, 500],
    num_sectors: 19, [1, 16],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            center_x: 0,
            center_y: 0,
            center_z: 0,
            rotate_xy: 0,
            rotate_xz: 0,
            rotate_yz: 0,
            keepout_rad: 1000,
            z_limit: 150,
            data_radius: 3000,
            mag_offset_x: 0,
            mag_offset_y: 0,
            mag_offset_z: 0,
            earth_x: 0,
            earth_y: 0,
            earth_z: 0,
            earth_valid: 0,
            z_max: 32767,
            elev_curve: 100,
            num_sectors: 6,
        }
    }
}

impl Calibration {
    pub fn num_sectors(&self) -> u8 {
        self.num_sectors.clamp(1, 16) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_id_round_trips_through_name() {
        assert_eq!(Calibration::field_id("keepout_rad"), Some(7));
        assert_eq!(Calibration::field_name(7), Some("keepout_rad"));
    }

    #[test]
    fn set_field_clamps_out_of_range() {
        let mut calib = Calibration::default();
        calib.set_field(19, 99).unwrap();
        assert_eq!(calib.num_sectors, 16);
        calib.set_field(19, 0).unwrap();
        assert_eq!(calib.num_sectors, 1);
    }

    #[test]
    fn unknown_field_id_errors() {
        let mut calib = Calibration::default();
        assert!(calib.set_field(20, 0).is_err());
        assert!(calib.get_field(0).is_err());
    }
}
