//! Execution records.
//!
//! An execution is one run of a script or job. Its record is created before
//! any logging starts and completed after the log has been fully written.
//! Status and run-state are persisted as single-letter codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::level::MessageLevel;
use crate::store::{ExecutionId, StoreError};

/// Outcome of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Normal,
    Warning,
    Error,
}

impl ExecutionStatus {
    pub fn code(self) -> &'static str {
        match self {
            ExecutionStatus::Normal => "S",
            ExecutionStatus::Warning => "W",
            ExecutionStatus::Error => "E",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, StoreError> {
        match code {
            "S" => Ok(ExecutionStatus::Normal),
            "W" => Ok(ExecutionStatus::Warning),
            "E" => Ok(ExecutionStatus::Error),
            other => Err(StoreError::UnknownCode(other.to_string())),
        }
    }

    /// Status implied by the highest severity logged during an execution.
    pub fn from_max_level(level: Option<MessageLevel>) -> Self {
        match level {
            Some(MessageLevel::Error) => ExecutionStatus::Error,
            Some(MessageLevel::Warning) => ExecutionStatus::Warning,
            _ => ExecutionStatus::Normal,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Normal => "Normal",
            ExecutionStatus::Warning => "Warning",
            ExecutionStatus::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Lifecycle stage of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Executing,
    Completed,
}

impl RunState {
    pub fn code(self) -> &'static str {
        match self {
            RunState::Pending => "P",
            RunState::Executing => "X",
            RunState::Completed => "C",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, StoreError> {
        match code {
            "P" => Ok(RunState::Pending),
            "X" => Ok(RunState::Executing),
            "C" => Ok(RunState::Completed),
            other => Err(StoreError::UnknownCode(other.to_string())),
        }
    }
}

/// Stored execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub run_state: RunState,
    pub simulation: bool,
}

impl ExecutionRecord {
    /// Wall-clock duration; running executions are measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// Whether the execution started at least `days` whole days before `now`.
    pub fn is_older_than(&self, days: u32, now: DateTime<Utc>) -> bool {
        (now - self.start_time).num_days() >= i64::from(days)
    }
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.execution_id,
            self.start_time.format("%Y-%m-%d %H:%M:%S"),
            self.status
        )?;
        if self.simulation {
            f.write_str(" (simulation)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: 3,
            start_time: start,
            end_time: end,
            status: ExecutionStatus::Warning,
            run_state: RunState::Completed,
            simulation: true,
        }
    }

    #[test]
    fn test_status_codes() {
        for status in [
            ExecutionStatus::Normal,
            ExecutionStatus::Warning,
            ExecutionStatus::Error,
        ] {
            assert_eq!(ExecutionStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(ExecutionStatus::from_code("Q").is_err());
    }

    #[test]
    fn test_run_state_codes() {
        for state in [RunState::Pending, RunState::Executing, RunState::Completed] {
            assert_eq!(RunState::from_code(state.code()).unwrap(), state);
        }
        assert!(matches!(
            RunState::from_code("Z"),
            Err(StoreError::UnknownCode(code)) if code == "Z"
        ));
    }

    #[test]
    fn test_status_from_max_level() {
        assert_eq!(ExecutionStatus::from_max_level(None), ExecutionStatus::Normal);
        assert_eq!(
            ExecutionStatus::from_max_level(Some(MessageLevel::Information)),
            ExecutionStatus::Normal
        );
        assert_eq!(
            ExecutionStatus::from_max_level(Some(MessageLevel::Warning)),
            ExecutionStatus::Warning
        );
        assert_eq!(
            ExecutionStatus::from_max_level(Some(MessageLevel::Error)),
            ExecutionStatus::Error
        );
    }

    #[test]
    fn test_duration_and_age() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = start + Duration::days(10);

        let running = record(start, None);
        assert_eq!(running.duration(now), Duration::days(10));

        let finished = record(start, Some(start + Duration::seconds(90)));
        assert_eq!(finished.duration(now), Duration::seconds(90));

        assert!(finished.is_older_than(10, now));
        assert!(!finished.is_older_than(11, now));
        assert!(finished.is_older_than(0, now));
    }

    #[test]
    fn test_display() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = record(start, None).to_string();
        assert_eq!(text, "3 2024-01-02 03:04:05 Warning (simulation)");
    }
}
