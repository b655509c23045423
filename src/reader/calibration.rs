//! Needle angle and angle-to-value mapping.
//!
//! Angles are measured clockwise from straight up, in [0, 360). The dial's
//! scale starts at `min_angle` and runs clockwise through 0° to `max_angle`.

use crate::config::CalibrationConfig;

/// Clockwise angle of the needle, from the pivot `center` to `tip`, in image
/// coordinates (y grows downward). `None` when the two points coincide.
pub fn needle_angle(center: (f64, f64), tip: (f64, f64)) -> Option<f64> {
    let dx = tip.0 - center.0;
    let dy = center.1 - tip.1;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let angle = (90.0 - dy.atan2(dx).to_degrees()).rem_euclid(360.0);
    // rem_euclid can land exactly on the modulus for tiny negatives
    Some(if angle >= 360.0 { 0.0 } else { angle })
}

/// Map a needle angle to a gauge value, clamped to the configured range and
/// rounded to two decimals.
pub fn value_for_angle(calibration: &CalibrationConfig, angle: f64) -> f64 {
    let CalibrationConfig {
        min_angle,
        max_angle,
        min_value,
        max_value,
    } = *calibration;

    let span = 360.0 - min_angle + max_angle;
    let swept = if angle >= min_angle {
        angle - min_angle
    } else {
        angle + 360.0 - min_angle
    };
    let raw = swept * (max_value - min_value) / span;

    round2(raw.max(min_value).min(max_value))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> CalibrationConfig {
        CalibrationConfig::default()
    }

    /// Dials whose sweep crosses 0°, including one with a non-zero minimum.
    fn wrapping_dials() -> Vec<CalibrationConfig> {
        let dial = |min_angle, max_angle, min_value, max_value| CalibrationConfig {
            min_angle,
            max_angle,
            min_value,
            max_value,
        };
        vec![
            cal(),
            dial(200.0, 160.0, 0.0, 100.0),
            dial(300.0, 60.0, 10.0, 50.0),
            dial(270.0, 90.0, 0.0, 10.0),
        ]
    }

    #[test]
    fn test_angle_cardinal_directions() {
        let c = (250.0, 250.0);
        assert_eq!(needle_angle(c, (250.0, 100.0)), Some(0.0));
        assert_eq!(needle_angle(c, (400.0, 250.0)), Some(90.0));
        assert_eq!(needle_angle(c, (250.0, 400.0)), Some(180.0));
        assert_eq!(needle_angle(c, (100.0, 250.0)), Some(270.0));
    }

    #[test]
    fn test_angle_just_left_of_up_wraps_high() {
        let a = needle_angle((250.0, 250.0), (247.0, 70.0)).unwrap();
        assert!(a > 358.0 && a < 360.0, "got {a}");
    }

    #[test]
    fn test_tip_on_center_has_no_angle() {
        assert_eq!(needle_angle((250.0, 250.0), (250.0, 250.0)), None);
    }

    #[test]
    fn test_min_angle_maps_to_min_value() {
        assert_eq!(value_for_angle(&cal(), 225.0), 0.0);
    }

    #[test]
    fn test_max_angle_maps_to_max_value() {
        assert_eq!(value_for_angle(&cal(), 137.0), 120.0);
    }

    #[test]
    fn test_straight_up() {
        // 135 / 272 * 120
        assert_eq!(value_for_angle(&cal(), 0.0), 59.56);
    }

    #[test]
    fn test_dead_zone_clamps_to_max() {
        // 180° lies past the end of the scale
        assert_eq!(value_for_angle(&cal(), 180.0), 120.0);
    }

    #[test]
    fn test_continuous_across_zero() {
        for dial in wrapping_dials() {
            let before = value_for_angle(&dial, 359.99);
            let after = value_for_angle(&dial, 0.0);
            assert!((after - before).abs() < 0.05, "{dial:?}: {before} vs {after}");
        }
    }

    #[test]
    fn test_monotonic_along_scale() {
        for dial in wrapping_dials() {
            let span = 360.0 - dial.min_angle + dial.max_angle;
            let mut angle = dial.min_angle;
            let mut prev = value_for_angle(&dial, angle);
            let mut swept = 0.0;
            while swept < span {
                angle = (angle + 0.5) % 360.0;
                swept += 0.5;
                let v = value_for_angle(&dial, angle);
                assert!(v >= prev, "{dial:?}: value fell at {angle}: {prev} -> {v}");
                prev = v;
            }
        }
    }

    #[test]
    fn test_output_always_in_range() {
        for dial in wrapping_dials() {
            for a in 0..720 {
                let angle = f64::from(a) * 0.5;
                let v = value_for_angle(&dial, angle);
                assert!(
                    (dial.min_value..=dial.max_value).contains(&v),
                    "{dial:?}: {angle}° -> {v}"
                );
            }
        }
    }
}
