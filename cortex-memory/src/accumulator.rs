//! Signal accumulators — derived on read, never stored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Accumulated view of one signal at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalAccumulator {
    /// The signal key (`intent:question`, `tool:grep`, …).
    pub signal_id: String,
    /// Event count.
    pub count: u64,
    /// Timestamp of the earliest event.
    pub first_seen: DateTime<Utc>,
    /// Timestamp of the most recent event.
    pub last_seen: DateTime<Utc>,
    /// Distinct sessions that emitted the signal.
    pub session_ids: BTreeSet<String>,
    /// Every contributing event, in append order.
    pub event_ids: Vec<String>,
    /// Exponential decay factor at the evaluation time.
    pub decay: f64,
}

/// Exponential half-life decay between `last_seen` and `as_of`.
///
/// `exp(−ln2 / half_life_hours × Δh)`, with Δh clamped at zero — an
/// `as_of` that predates `last_seen` evaluates to 1.0, not a boost.
pub fn decay_factor(last_seen: DateTime<Utc>, as_of: DateTime<Utc>, half_life_hours: f64) -> f64 {
    if half_life_hours <= 0.0 {
        return 1.0;
    }
    let delta_hours =
        ((as_of - last_seen).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    (-(std::f64::consts::LN_2) / half_life_hours * delta_hours).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn decay_is_one_at_last_seen() {
        assert_eq!(decay_factor(ts(2), ts(2), 4.0), 1.0);
    }

    #[test]
    fn decay_halves_at_half_life() {
        let d = decay_factor(ts(0), ts(4), 4.0);
        assert!((d - 0.5).abs() < 1e-12, "got {d}");
    }

    #[test]
    fn one_hour_with_four_hour_half_life() {
        // exp(−ln2/4 × 1) ≈ 0.8409
        let d = decay_factor(ts(2), ts(3), 4.0);
        assert!((d - 0.840896415).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn past_as_of_clamps_to_one() {
        assert_eq!(decay_factor(ts(5), ts(1), 4.0), 1.0);
    }

    #[test]
    fn zero_half_life_means_no_decay() {
        assert_eq!(decay_factor(ts(0), ts(23), 0.0), 1.0);
    }
}
