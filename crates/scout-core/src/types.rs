use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Current time in epoch milliseconds.
    pub fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Whole seconds elapsed between `self` and `later`, clamped at zero.
    pub fn seconds_until(&self, later: Timestamp) -> u64 {
        (later.0 - self.0).max(0) as u64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Execution mode for an analysis pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// All tasks start together and are joined.
    #[default]
    Parallel,
    /// Tasks run one after another in list order.
    Serial,
}

impl ExecutionMode {
    pub fn from_parallel_flag(parallel: bool) -> Self {
        if parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Serial
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Parallel => write!(f, "parallel"),
            ExecutionMode::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(ExecutionMode::Parallel),
            "serial" => Ok(ExecutionMode::Serial),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

/// Canonical form of a target entity name: trimmed, ASCII letters upper-cased.
///
/// Returns `None` for blank input.
pub fn normalize_entity(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

/// Coarse calendar bucket used to scope memoized results (`YYYY-MM`).
pub fn period_bucket(at: DateTime<Local>) -> String {
    at.format("%Y-%m").to_string()
}

/// Period bucket for the current local time.
pub fn current_period() -> String {
    period_bucket(Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_now_is_recent() {
        let ts = Timestamp::now();
        assert!((Utc::now().timestamp() - ts.0).abs() <= 1);
    }

    #[test]
    fn test_timestamp_to_datetime_roundtrip() {
        let now = Utc::now();
        let ts = Timestamp::from_datetime(now);
        assert_eq!(ts.to_datetime().timestamp(), now.timestamp());
    }

    #[test]
    fn test_seconds_until_clamps_negative() {
        let a = Timestamp(100);
        assert_eq!(a.seconds_until(Timestamp(160)), 60);
        assert_eq!(a.seconds_until(Timestamp(40)), 0);
    }

    #[test]
    fn test_execution_mode_parse_and_display() {
        assert_eq!("parallel".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
        assert_eq!("serial".parse::<ExecutionMode>(), Ok(ExecutionMode::Serial));
        assert!("fast".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Serial.to_string(), "serial");
        assert_eq!(
            ExecutionMode::from_parallel_flag(false),
            ExecutionMode::Serial
        );
    }

    #[test]
    fn test_execution_mode_serde() {
        let json = serde_json::to_string(&ExecutionMode::Parallel).unwrap();
        assert_eq!(json, "\"parallel\"");
    }

    #[test]
    fn test_normalize_entity() {
        assert_eq!(normalize_entity("  il17ra "), Some("IL17RA".to_string()));
        assert_eq!(normalize_entity("TNF-α"), Some("TNF-α".to_string()));
        assert_eq!(normalize_entity("   "), None);
        assert_eq!(normalize_entity(""), None);
    }

    #[test]
    fn test_period_bucket_format() {
        let at = Local.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(period_bucket(at), "2025-03");
    }
}
