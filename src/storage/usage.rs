// src/storage/usage.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error count above which a key is marked unhealthy.
pub const MAX_ERRORS_BEFORE_UNHEALTHY: u64 = 5;

/// Usage statistics of a single API key
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct UsageRecord {
    pub last_used: DateTime<Utc>,
    pub usage_count: u64,
    pub tokens_used: u64,
    pub cost_used: f64,
    pub daily_cost: f64,
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UsageRecord {
    /// A zeroed record stamped with `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_used: now,
            usage_count: 0,
            tokens_used: 0,
            cost_used: 0.0,
            daily_cost: 0.0,
            error_count: 0,
            last_error: None,
        }
    }

    /// Apply one successful request.
    ///
    /// The daily cost restarts from `cost` when `now` falls on a different UTC
    /// calendar day than the previous use.
    pub fn record_usage(&mut self, tokens: u64, cost: f64, now: DateTime<Utc>) {
        if self.last_used.date_naive() == now.date_naive() {
            self.daily_cost += cost;
        } else {
            self.daily_cost = cost;
        }
        self.usage_count += 1;
        self.tokens_used += tokens;
        self.cost_used += cost;
        self.last_used = now;
    }

    /// Record a failure. Returns true when the key crossed the unhealthy threshold.
    pub fn record_error(&mut self, message: impl Into<String>) -> bool {
        self.error_count += 1;
        self.last_error = Some(message.into());
        self.error_count > MAX_ERRORS_BEFORE_UNHEALTHY
    }
}

impl Default for UsageRecord {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn daily_cost_accumulates_within_a_day() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        let mut usage = UsageRecord::new(morning);
        usage.record_usage(100, 0.25, morning + Duration::hours(1));
        usage.record_usage(50, 0.5, morning + Duration::hours(2));

        assert_eq!(usage.usage_count, 2);
        assert_eq!(usage.tokens_used, 150);
        assert!((usage.daily_cost - 0.75).abs() < 1e-9);
        assert!((usage.cost_used - 0.75).abs() < 1e-9);
    }

    #[test]
    fn daily_cost_resets_on_a_new_day() {
        let day_one = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
        let mut usage = UsageRecord::new(day_one);
        usage.record_usage(100, 3.0, day_one);
        usage.record_usage(10, 0.4, day_one + Duration::hours(2));

        assert!((usage.daily_cost - 0.4).abs() < 1e-9);
        assert!((usage.cost_used - 3.4).abs() < 1e-9);
        assert_eq!(usage.last_used, day_one + Duration::hours(2));
    }

    #[test]
    fn sixth_error_crosses_the_threshold() {
        let mut usage = UsageRecord::default();
        for i in 1..=5 {
            assert!(!usage.record_error(format!("error {i}")));
        }
        assert!(usage.record_error("error 6"));
        assert_eq!(usage.error_count, 6);
        assert_eq!(usage.last_error.as_deref(), Some("error 6"));
    }
}
