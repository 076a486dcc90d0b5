//! Time window selection for a run.

use crate::error::{AggregatorError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Textual format of explicit window bounds, interpreted as UTC.
pub const WINDOW_TIME_FORMAT: &str = "%Y-%m-%d,%H:%M";

/// Which events a run covers.
///
/// # Example
///
/// ```rust
/// use fleetgrid::TimeWindow;
///
/// let json = r#"{"mode":"range","start":"2014-07-30,00:00","end":"2014-07-30,23:59"}"#;
/// let window: TimeWindow = serde_json::from_str(json).unwrap();
/// let resolved = window.resolve(chrono::Utc::now()).unwrap();
/// assert_eq!(resolved.end - resolved.start, 23 * 3600 + 59 * 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimeWindow {
    /// Explicit bounds in `YYYY-MM-DD,HH:MM` (UTC).
    Range { start: String, end: String },
    /// The `hours` hours up to the moment of resolution.
    LastHours { hours: i64 },
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::LastHours { hours: 1 }
    }
}

/// Inclusive `[start, end]` in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedWindow {
    pub start: i64,
    pub end: i64,
}

impl ResolvedWindow {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

impl TimeWindow {
    /// Resolve against `now`. Only last-hours windows depend on it.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<ResolvedWindow> {
        let (start, end) = match self {
            TimeWindow::Range { start, end } => (
                parse_window_time("window.start", start)?,
                parse_window_time("window.end", end)?,
            ),
            TimeWindow::LastHours { hours } => {
                if *hours <= 0 {
                    return Err(AggregatorError::config(
                        "window.hours",
                        format!("must be positive, got {}", hours),
                    ));
                }
                let end = now.timestamp();
                let span = hours.checked_mul(3600).ok_or_else(|| {
                    AggregatorError::config("window.hours", format!("{} hours is too large", hours))
                })?;
                (end.saturating_sub(span), end)
            }
        };

        if start >= end {
            return Err(AggregatorError::config(
                "window",
                format!("start ({}) >= end ({})", start, end),
            ));
        }

        Ok(ResolvedWindow { start, end })
    }

    /// Check the window without pinning it to a clock.
    pub fn validate(&self) -> Result<()> {
        self.resolve(Utc::now()).map(|_| ())
    }

    pub fn is_range(&self) -> bool {
        matches!(self, TimeWindow::Range { .. })
    }
}

/// Parse `YYYY-MM-DD,HH:MM` as UTC epoch seconds.
pub fn parse_window_time(field: &'static str, value: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(value.trim(), WINDOW_TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| {
            AggregatorError::config(
                field,
                format!("invalid date {:?} (expected {}): {}", value, WINDOW_TIME_FORMAT, e),
            )
        })
}

/// Format epoch seconds as `YYYY-MM-DD,HH:MM` (UTC).
pub fn format_window_time(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format(WINDOW_TIME_FORMAT).to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_window_time() {
        assert_eq!(parse_window_time("window.start", "1970-01-01,00:00").unwrap(), 0);
        assert_eq!(
            parse_window_time("window.start", "2014-07-30,12:30").unwrap(),
            1406723400
        );
        assert!(parse_window_time("window.start", "2014-07-30 12:30").is_err());
        assert!(parse_window_time("window.start", "0000-00-00,00:00").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        assert_eq!(format_window_time(1406723400), "2014-07-30,12:30");
    }

    #[test]
    fn test_range_resolution() {
        let window = TimeWindow::Range {
            start: "2014-07-30,00:00".into(),
            end: "2014-07-31,00:00".into(),
        };
        let resolved = window.resolve(Utc::now()).unwrap();
        assert_eq!(resolved.end - resolved.start, 86_400);
        assert!(resolved.contains(resolved.start));
        assert!(resolved.contains(resolved.end));
        assert!(!resolved.contains(resolved.end + 1));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let window = TimeWindow::Range {
            start: "2014-07-31,00:00".into(),
            end: "2014-07-30,00:00".into(),
        };
        let err = window.resolve(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AggregatorError::InvalidConfiguration { field: "window", .. }
        ));
    }

    #[test]
    fn test_last_hours_resolution() {
        let now = Utc.with_ymd_and_hms(2014, 7, 30, 12, 0, 0).unwrap();
        let resolved = TimeWindow::LastHours { hours: 3 }.resolve(now).unwrap();
        assert_eq!(resolved.end, now.timestamp());
        assert_eq!(resolved.start, now.timestamp() - 3 * 3600);
    }

    #[test]
    fn test_non_positive_hours_rejected() {
        assert!(TimeWindow::LastHours { hours: 0 }.validate().is_err());
        assert!(TimeWindow::LastHours { hours: -2 }.validate().is_err());
    }
}
