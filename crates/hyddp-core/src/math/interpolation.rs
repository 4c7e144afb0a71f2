//! Linear interpolation over time-stamped samples
//!
//! Time arrays may contain a repeated stamp at event times (pre- and
//! post-event samples). A query exactly at such a stamp resolves to the
//! pre-event sample; anything after it uses the post-event sample.

use std::ops::{Add, Mul};

/// Bracketing segment for `time`
///
/// Returns `(index, alpha)` such that the interpolated value is
/// `(1 - alpha) * v[index] + alpha * v[index + 1]`. Queries outside the
/// sampled range are clamped to the end points.
pub fn time_segment(times: &[f64], time: f64) -> (usize, f64) {
    let n = times.len();
    if n < 2 || time <= times[0] {
        return (0, 0.0);
    }
    if time >= times[n - 1] {
        // Last sample, even when the final stamp is repeated
        return (n - 2, 1.0);
    }

    let index = times.partition_point(|&t| t < time).saturating_sub(1).min(n - 2);
    let span = times[index + 1] - times[index];
    let alpha = if span > 0.0 { (time - times[index]) / span } else { 0.0 };
    (index, alpha.clamp(0.0, 1.0))
}

/// Interpolate a sampled trajectory at `time`
///
/// # Panics
/// When `values` is empty or shorter than `times` (programming error).
pub fn interpolate<T>(times: &[f64], values: &[T], time: f64) -> T
where
    T: Clone + Add<Output = T> + Mul<f64, Output = T>,
{
    if values.len() == 1 || times.len() < 2 {
        return values[0].clone();
    }

    let (index, alpha) = time_segment(times, time);
    if alpha == 0.0 {
        values[index].clone()
    } else if alpha == 1.0 {
        values[index + 1].clone()
    } else {
        values[index].clone() * (1.0 - alpha) + values[index + 1].clone() * alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector;
    use approx::assert_relative_eq;

    #[test]
    fn test_segment_inside() {
        let times = [0.0, 1.0, 2.0];
        let (i, a) = time_segment(&times, 1.5);
        assert_eq!(i, 1);
        assert_relative_eq!(a, 0.5);
    }

    #[test]
    fn test_clamped_outside() {
        let times = [0.0, 1.0, 2.0];
        let values = [1.0, 2.0, 5.0];
        assert_relative_eq!(interpolate(&times, &values, -1.0), 1.0);
        assert_relative_eq!(interpolate(&times, &values, 3.0), 5.0);
    }

    #[test]
    fn test_event_stamp_resolves_to_pre_event() {
        // Samples: ... 1.0 (pre-event), 1.0 (post-event) ...
        let times = [0.0, 1.0, 1.0, 2.0];
        let values = [0.0, 1.0, 10.0, 11.0];
        assert_relative_eq!(interpolate(&times, &values, 1.0), 1.0);
        assert_relative_eq!(interpolate(&times, &values, 0.5), 0.5);
        assert_relative_eq!(interpolate(&times, &values, 1.5), 10.5);
    }

    #[test]
    fn test_vector_interpolation() {
        let times = [0.0, 2.0];
        let values = [Vector::from_vec(vec![0.0, 2.0]), Vector::from_vec(vec![2.0, 0.0])];
        let v = interpolate(&times, &values, 0.5);
        assert_relative_eq!(v, Vector::from_vec(vec![0.5, 1.5]), epsilon = 1e-12);
    }
}
