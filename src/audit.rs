//! Audit log rows for finished uploads.
//!
//! [`AuditLogger::record`] is a pure function of a finished [`UploadJob`]; [`AuditLogger::persist`]
//! writes the record as one row of an externally created log table with columns
//! `(date, time, target, duration_seconds, row_count, status)`.

use std::fmt;

use tracing::debug;

use crate::connection::ConnectionManager;
use crate::error::{UploadError, UploadResult};
use crate::job::{CommitState, LogTarget, UploadJob};
use crate::types::Value;

/// Status column of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    /// Loaded and verified.
    Commit,
    /// Load failed, nothing applied.
    RollBack,
    /// Loaded, but the row count disagrees.
    Fault,
}

impl LogStatus {
    /// Text stored in the log table.
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Commit => "Commit",
            LogStatus::RollBack => "RollBack",
            LogStatus::Fault => "Fault",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// End date, `YYYY-MM-DD`.
    pub date: String,
    /// End time, `HH:MM:SS`.
    pub time: String,
    /// Target table as given.
    pub target: String,
    /// Whole seconds between start and end.
    pub duration_seconds: i64,
    /// Dataset row count.
    pub row_count: i64,
    /// Outcome.
    pub status: LogStatus,
}

impl LogRecord {
    fn params(&self) -> [Value; 6] {
        [
            Value::Utf8(self.date.clone()),
            Value::Utf8(self.time.clone()),
            Value::Utf8(self.target.clone()),
            Value::Int64(self.duration_seconds),
            Value::Int64(self.row_count),
            Value::Utf8(self.status.as_str().to_string()),
        ]
    }
}

/// Builds and stores audit rows in one log table.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log_target: LogTarget,
}

impl AuditLogger {
    /// Log into `log_target`.
    pub fn new(log_target: LogTarget) -> Self {
        Self { log_target }
    }

    /// The log table.
    pub fn log_target(&self) -> &LogTarget {
        &self.log_target
    }

    /// Compute the audit row for a finished job.
    pub fn record(job: &UploadJob, dataset_row_count: usize) -> UploadResult<LogRecord> {
        let status = match job.commit_state() {
            CommitState::Committed => LogStatus::Commit,
            CommitState::RolledBack => LogStatus::RollBack,
            CommitState::Fault => LogStatus::Fault,
            CommitState::Pending => {
                return Err(UploadError::JobPending {
                    target: job.target().to_string(),
                });
            }
        };
        let ended_at = job.ended_at().ok_or_else(|| UploadError::JobPending {
            target: job.target().to_string(),
        })?;

        Ok(LogRecord {
            date: ended_at.format("%Y-%m-%d").to_string(),
            time: ended_at.format("%H:%M:%S").to_string(),
            target: job.target().to_string(),
            duration_seconds: (ended_at - job.started_at()).num_seconds().max(0),
            row_count: i64::try_from(dataset_row_count).unwrap_or(i64::MAX),
            status,
        })
    }

    /// Insert `record` into the log table in its own transaction.
    pub fn persist(&self, conn: &ConnectionManager, record: &LogRecord) -> UploadResult<()> {
        let sql = format!("INSERT INTO {} VALUES (?, ?, ?, ?, ?, ?)", self.log_target);
        conn.execute_with(&sql, &record.params())?;
        debug!(
            log_table = %self.log_target,
            target_table = %record.target,
            status = %record.status,
            "audit row written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::UploadTarget;
    use crate::strategy::StrategyKind;
    use chrono::{Local, TimeZone};

    fn finished(state: CommitState) -> UploadJob {
        let start = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap();
        let end = Local.with_ymd_and_hms(2024, 5, 6, 7, 9, 30).unwrap();
        let mut job = UploadJob::start_at(
            UploadTarget::new("dbo.[sales]").unwrap(),
            StrategyKind::MassStatementInsert,
            start,
        );
        job.finish_at(state, 42, end);
        job
    }

    #[test]
    fn record_is_derived_from_job_timing() {
        let record = AuditLogger::record(&finished(CommitState::Committed), 42).unwrap();
        assert_eq!(
            record,
            LogRecord {
                date: "2024-05-06".to_string(),
                time: "07:09:30".to_string(),
                target: "dbo.[sales]".to_string(),
                duration_seconds: 90,
                row_count: 42,
                status: LogStatus::Commit,
            }
        );
    }

    #[test]
    fn fault_and_rollback_statuses() {
        assert_eq!(
            AuditLogger::record(&finished(CommitState::Fault), 42).unwrap().status.as_str(),
            "Fault"
        );
        assert_eq!(
            AuditLogger::record(&finished(CommitState::RolledBack), 42).unwrap().status.as_str(),
            "RollBack"
        );
    }

    #[test]
    fn pending_job_has_no_record() {
        let job = UploadJob::start(UploadTarget::new("main.t").unwrap(), StrategyKind::BulkFileLoad);
        assert!(matches!(
            AuditLogger::record(&job, 1).unwrap_err(),
            UploadError::JobPending { .. }
        ));
    }
}
