//! Mode schedule
//!
//! A sequence of N discrete modes separated by N-1 event times:
//!
//! ```text
//!        ------ | ------ | ------ | ...  ------ | ------
//!              t[0]     t[1]     t[2]        t[n-1]
//! mode:  m[0]      m[1]     m[2]   ...   m[n-1]     m[n]
//! ```
//!
//! A query exactly at a switch time belongs to the earlier segment.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mode schedule construction errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModeScheduleError {
    #[error("invalid schedule: {num_events} event times require {expected_modes} modes, got {num_modes}")]
    InvalidSchedule {
        num_events: usize,
        num_modes: usize,
        expected_modes: usize,
    },
    #[error("event times must be strictly increasing (index {index})")]
    UnorderedEventTimes { index: usize },
    #[error("event time at index {index} is not finite")]
    NonFiniteEventTime { index: usize },
}

/// Ordered sequence of modes separated by event times
///
/// Immutable once constructed. Between solves the whole value is replaced.
/// Deserialization goes through [`ModeSchedule::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModeScheduleData")]
pub struct ModeSchedule {
    event_times: Vec<f64>,
    mode_sequence: Vec<usize>,
}

/// Unchecked serialized form
#[derive(Deserialize)]
struct ModeScheduleData {
    event_times: Vec<f64>,
    mode_sequence: Vec<usize>,
}

impl TryFrom<ModeScheduleData> for ModeSchedule {
    type Error = ModeScheduleError;

    fn try_from(data: ModeScheduleData) -> Result<Self, Self::Error> {
        Self::new(data.event_times, data.mode_sequence)
    }
}

impl Default for ModeSchedule {
    /// Single mode `0` without events
    fn default() -> Self {
        Self {
            event_times: Vec::new(),
            mode_sequence: vec![0],
        }
    }
}

impl ModeSchedule {
    /// Create a mode schedule
    ///
    /// # Arguments
    /// * `event_times` - Switch times, strictly increasing (size N-1)
    /// * `mode_sequence` - Mode identifiers (size N, N >= 1)
    pub fn new(event_times: Vec<f64>, mode_sequence: Vec<usize>) -> Result<Self, ModeScheduleError> {
        if mode_sequence.is_empty() || event_times.len() + 1 != mode_sequence.len() {
            return Err(ModeScheduleError::InvalidSchedule {
                num_events: event_times.len(),
                num_modes: mode_sequence.len(),
                expected_modes: event_times.len() + 1,
            });
        }

        for (index, t) in event_times.iter().enumerate() {
            if !t.is_finite() {
                return Err(ModeScheduleError::NonFiniteEventTime { index });
            }
        }

        if let Some(index) = event_times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ModeScheduleError::UnorderedEventTimes { index: index + 1 });
        }

        Ok(Self {
            event_times,
            mode_sequence,
        })
    }

    /// Event times (size N-1)
    pub fn event_times(&self) -> &[f64] {
        &self.event_times
    }

    /// Mode sequence (size N)
    pub fn mode_sequence(&self) -> &[usize] {
        &self.mode_sequence
    }

    /// Number of phases N
    pub fn num_phases(&self) -> usize {
        self.mode_sequence.len()
    }

    /// Index of the phase active at `time`
    ///
    /// Counts the event times strictly before `time`, so a query at
    /// `event_times[i]` returns `i`.
    pub fn phase_index(&self, time: f64) -> usize {
        self.event_times.partition_point(|&t| t < time)
    }

    /// Mode active at `time`
    pub fn mode_at(&self, time: f64) -> usize {
        self.mode_sequence[self.phase_index(time)]
    }

    /// Event times strictly inside `(start, end)`
    pub fn event_times_in(&self, start: f64, end: f64) -> &[f64] {
        let first = self.event_times.partition_point(|&t| t <= start);
        let last = self.event_times.partition_point(|&t| t < end);
        if first >= last {
            &[]
        } else {
            &self.event_times[first..last]
        }
    }
}

impl fmt::Display for ModeSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event times:   {{")?;
        for (i, t) in self.event_times.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        writeln!(f, "}}")?;
        write!(f, "mode sequence: {{")?;
        for (i, m) in self.mode_sequence.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", m)?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> ModeSchedule {
        ModeSchedule::new(vec![1.0, 2.0, 3.0], vec![4, 7, 2, 9]).unwrap()
    }

    #[test]
    fn test_default_has_single_mode() {
        let ms = ModeSchedule::default();
        assert_eq!(ms.num_phases(), 1);
        assert_eq!(ms.mode_at(-100.0), 0);
        assert_eq!(ms.mode_at(100.0), 0);
    }

    #[test]
    fn test_lookup_outside_events() {
        let ms = schedule();
        assert_eq!(ms.phase_index(-5.0), 0);
        assert_eq!(ms.mode_at(-5.0), 4);
        assert_eq!(ms.phase_index(10.0), 3);
        assert_eq!(ms.mode_at(10.0), 9);
    }

    #[test]
    fn test_boundary_goes_to_lower_segment() {
        let ms = schedule();
        assert_eq!(ms.phase_index(1.0), 0);
        assert_eq!(ms.phase_index(2.0), 1);
        assert_eq!(ms.phase_index(3.0), 2);
        assert_eq!(ms.phase_index(3.0 + 1e-12), 3);
        assert_eq!(ms.mode_at(2.0), 7);
    }

    #[test]
    fn test_lookup_is_monotonic() {
        let ms = schedule();
        let mut last = 0;
        for i in 0..=500 {
            let t = -1.0 + i as f64 * 0.01;
            let idx = ms.phase_index(t);
            assert!(idx >= last, "phase index decreased at t = {}", t);
            last = idx;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_off_by_one_is_rejected() {
        let result = ModeSchedule::new(vec![1.0, 2.0], vec![0, 1]);
        assert!(matches!(
            result,
            Err(ModeScheduleError::InvalidSchedule { num_events: 2, num_modes: 2, expected_modes: 3 })
        ));

        assert!(ModeSchedule::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_unordered_events_are_rejected() {
        let result = ModeSchedule::new(vec![1.0, 1.0], vec![0, 1, 2]);
        assert_eq!(result, Err(ModeScheduleError::UnorderedEventTimes { index: 1 }));
    }

    #[test]
    fn test_event_times_in_horizon() {
        let ms = schedule();
        assert_eq!(ms.event_times_in(0.0, 10.0), &[1.0, 2.0, 3.0]);
        assert_eq!(ms.event_times_in(1.0, 3.0), &[2.0]);
        assert!(ms.event_times_in(3.5, 4.0).is_empty());
    }

    #[test]
    fn test_swap_replaces_whole_value() {
        let mut a = schedule();
        let mut b = ModeSchedule::default();
        std::mem::swap(&mut a, &mut b);
        assert_eq!(a.num_phases(), 1);
        assert_eq!(b.num_phases(), 4);
    }

    #[test]
    fn test_display() {
        let text = schedule().to_string();
        assert!(text.contains("event times:   {1, 2, 3}"));
        assert!(text.contains("mode sequence: {4, 7, 2, 9}"));
    }

    #[test]
    fn test_serde_round_trip_checks_invariants() {
        let json = serde_json::to_string(&schedule()).unwrap();
        let restored: ModeSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, schedule());

        let unordered = r#"{"event_times":[2.0,1.0],"mode_sequence":[0,1,2]}"#;
        assert!(serde_json::from_str::<ModeSchedule>(unordered).is_err());
        let missing_mode = r#"{"event_times":[1.0],"mode_sequence":[0]}"#;
        assert!(serde_json::from_str::<ModeSchedule>(missing_mode).is_err());
    }
}
