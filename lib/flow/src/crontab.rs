//! Crontab representation and minute-tick evaluation.
//!
//! A [`Crontab`] couples a raw 5-field cron expression with its parsed
//! schedule. Only the expression string is ever persisted; the schedule is
//! reconstructed on load and never serialized.

use crate::error::FlowError;
use chrono::{DateTime, Duration, Timelike, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated crontab schedule for a flow.
///
/// The zero value (empty expression) means "unscheduled". Two crontabs are
/// equal iff their source expressions are textually equal; no semantic
/// schedule-equivalence checking is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Crontab {
    expression: String,
    schedule: Option<Schedule>,
}

/// Converts a 5-field expression (minute hour day-of-month month day-of-week)
/// to the 6-field form the `cron` crate expects by pinning seconds to zero.
fn normalize(expr: &str) -> String {
    format!("0 {expr}")
}

/// Truncates a timestamp to minute resolution.
fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

impl Crontab {
    /// Creates the zero crontab ("unscheduled").
    #[must_use]
    pub fn zero() -> Self {
        Self {
            expression: String::new(),
            schedule: None,
        }
    }

    /// Validates a crontab expression.
    ///
    /// The empty string is valid and means "unscheduled". Anything else must
    /// be exactly 5 whitespace-separated fields under standard
    /// minute/hour/day-of-month/month/day-of-week syntax. Descriptor
    /// shorthands such as `@daily` are rejected here.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidSchedule` if the expression is malformed.
    pub fn validate(expression: &str) -> Result<(), FlowError> {
        if expression.is_empty() {
            return Ok(());
        }

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(FlowError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        Schedule::from_str(&normalize(expression)).map_err(|e| FlowError::InvalidSchedule {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Builds a crontab from an expression.
    ///
    /// Returns `None` for blank or malformed input; callers use nilness as
    /// "no schedule", so this never errors. Unlike [`Crontab::validate`],
    /// construction also accepts descriptor shorthands such as `@daily`.
    #[must_use]
    pub fn build(expression: &str) -> Option<Self> {
        if expression.is_empty() {
            return None;
        }

        let schedule = if expression.split_whitespace().count() == 5 {
            Schedule::from_str(&normalize(expression)).ok()?
        } else {
            Schedule::from_str(expression).ok()?
        };
        Some(Self {
            expression: expression.to_string(),
            schedule: Some(schedule),
        })
    }

    /// Returns the source expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns true if this crontab carries no schedule.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.schedule.is_none()
    }

    /// Returns whether the schedule fires during the minute containing `now`.
    ///
    /// Computes the schedule's next fire time strictly after `now - 1
    /// minute` and fires iff that time, truncated to the minute, equals
    /// `now` truncated to the minute. A poller invoking this once per
    /// minute, at any second within the minute, catches each tick exactly
    /// once.
    #[must_use]
    pub fn should_fire_now(&self, now: DateTime<Utc>) -> bool {
        let Some(schedule) = &self.schedule else {
            return false;
        };

        let window_start = now - Duration::minutes(1);
        match schedule.after(&window_start).next() {
            Some(next) => truncate_to_minute(next) == truncate_to_minute(now),
            None => false,
        }
    }

    /// Formats a minute-granularity tick flag for `time`.
    ///
    /// The flag is `YYYYMMDD.HHMMSS` with seconds truncated to zero; two
    /// evaluations within the same minute yield the same flag. Combined with
    /// a flow id it forms the deduplication token for crontab-triggered run
    /// records.
    #[must_use]
    pub fn tick_flag(time: DateTime<Utc>) -> String {
        truncate_to_minute(time).format("%Y%m%d.%H%M%S").to_string()
    }
}

impl PartialEq for Crontab {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for Crontab {}

impl fmt::Display for Crontab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

// Persisted form is the raw expression. A malformed persisted string loads
// as "no schedule" rather than failing the document load.
impl From<String> for Crontab {
    fn from(expression: String) -> Self {
        match Self::build(&expression) {
            Some(crontab) => crontab,
            None => Self {
                expression,
                schedule: None,
            },
        }
    }
}

impl From<Crontab> for String {
    fn from(crontab: Crontab) -> Self {
        crontab.expression
    }
}
