use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker behavior.
///
/// Durations are (de)serialized as whole milliseconds, e.g.
/// `{"failure_count_to_open": 3, "failure_track_window_ms": 10000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerPolicy {
    /// Failures inside the window that trip the breaker out of `Closed`.
    pub failure_count_to_open: usize,
    #[serde(rename = "failure_track_window_ms", with = "millis")]
    pub failure_track_window: Duration,
    /// How long `Open` rejects calls before letting a trial through.
    #[serde(rename = "keep_open_duration_ms", with = "millis")]
    pub keep_open_duration: Duration,
    /// Successes in `HalfOpen` needed to close again.
    pub success_count_to_close: usize,
    /// Whether `run` reports an open circuit as an error or as `Ok(false)`.
    pub throw_on_open: bool,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_count_to_open: 5,
            failure_track_window: Duration::from_secs(60),
            keep_open_duration: Duration::from_secs(30),
            success_count_to_close: 2,
            throw_on_open: true,
        }
    }
}

impl BreakerPolicy {
    pub fn with_failure_count_to_open(mut self, count: usize) -> Self {
        self.failure_count_to_open = count.max(1);
        self
    }

    pub fn with_failure_track_window(mut self, window: Duration) -> Self {
        self.failure_track_window = window;
        self
    }

    pub fn with_keep_open_duration(mut self, duration: Duration) -> Self {
        self.keep_open_duration = duration;
        self
    }

    pub fn with_success_count_to_close(mut self, count: usize) -> Self {
        self.success_count_to_close = count.max(1);
        self
    }

    /// Raises zero counts, which deserialization lets through, to 1.
    pub fn normalized(self) -> Self {
        let (failures, successes) = (self.failure_count_to_open, self.success_count_to_close);
        self.with_failure_count_to_open(failures)
            .with_success_count_to_close(successes)
    }

    pub fn with_throw_on_open(mut self, throw_on_open: bool) -> Self {
        self.throw_on_open = throw_on_open;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: BreakerPolicy =
            serde_json::from_str(r#"{"failure_count_to_open": 3, "keep_open_duration_ms": 1000}"#)
                .unwrap();
        assert_eq!(policy.failure_count_to_open, 3);
        assert_eq!(policy.keep_open_duration, Duration::from_secs(1));
        assert_eq!(policy.failure_track_window, Duration::from_secs(60));
        assert!(policy.throw_on_open);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["failure_track_window_ms"], 60_000);
    }
}
