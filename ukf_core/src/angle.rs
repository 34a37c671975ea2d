//! Angle wrapping for the heading and bearing components.

use std::f64::consts::PI;

/// Wraps an angle into (-π, π].
///
/// Angles already inside the interval are returned untouched so that
/// repeated normalisation is exact. NaN passes through unchanged.
pub fn normalize_angle(angle: f64) -> f64 {
    if (angle > -PI && angle <= PI) || !angle.is_finite() {
        return angle;
    }

    let wrapped = angle.sin().atan2(angle.cos());
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_in_range_is_identity() {
        for angle in [0.0, 0.5, -3.0, PI, -PI + 1e-12] {
            assert_eq!(normalize_angle(angle), angle);
        }
    }

    #[test]
    fn test_wraps_large_angles() {
        assert_relative_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-3.0 * PI / 2.0), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(2.0 * PI + 0.25), 0.25, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-40.0 * PI - 0.1), -0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_minus_pi_maps_to_pi() {
        assert_relative_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_result_always_in_half_open_interval() {
        let mut angle = -50.0;
        while angle < 50.0 {
            let wrapped = normalize_angle(angle);
            assert!(wrapped > -PI && wrapped <= PI, "{} -> {}", angle, wrapped);
            angle += 0.37;
        }
    }

    #[test]
    fn test_nan_passes_through() {
        assert!(normalize_angle(f64::NAN).is_nan());
    }
}
