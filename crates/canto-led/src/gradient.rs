//! Gradient-stop diffing: only push the stops that actually changed, since
//! a full strip repaint costs more bus traffic than most updates need.

use crate::command::GradientStop;

/// Compare `previous` against `next` and return only the stops in `next`
/// that are new or differ from `previous` at the same index. A stop count
/// change (grow or shrink) sends every stop in `next`, since the device has
/// no notion of a partial-length update.
pub fn diff_stops(previous: &[GradientStop], next: &[GradientStop]) -> Vec<GradientStop> {
    if previous.len() != next.len() {
        return next.to_vec();
    }
    previous
        .iter()
        .zip(next.iter())
        .filter_map(|(prev, cur)| if prev != cur { Some(*cur) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(position: u8, r: u8, g: u8, b: u8) -> GradientStop {
        GradientStop { position, r, g, b }
    }

    #[test]
    fn identical_gradients_diff_to_nothing() {
        let stops = vec![stop(0, 255, 0, 0), stop(128, 0, 255, 0)];
        assert!(diff_stops(&stops, &stops).is_empty());
    }

    #[test]
    fn changed_stop_is_reported() {
        let prev = vec![stop(0, 255, 0, 0), stop(128, 0, 255, 0)];
        let next = vec![stop(0, 255, 0, 0), stop(128, 0, 0, 255)];
        let diff = diff_stops(&prev, &next);
        assert_eq!(diff, vec![stop(128, 0, 0, 255)]);
    }

    #[test]
    fn length_change_sends_everything() {
        let prev = vec![stop(0, 255, 0, 0)];
        let next = vec![stop(0, 255, 0, 0), stop(255, 0, 0, 255)];
        assert_eq!(diff_stops(&prev, &next), next);
    }
}
