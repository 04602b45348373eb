//! Job records and the views handed to callers.

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

use scout_core::Timestamp;
use scout_pipeline::TaskSummary;

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "timed_out" => Ok(JobStatus::TimedOut),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// One background pipeline execution for a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub target_entity: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result_ref: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
}

impl Job {
    /// A fresh `Pending` job. The id is `{entity}_{YYYYmmdd_HHMMSS}` in local time.
    pub fn new(target_entity: &str, created_at: Timestamp) -> Self {
        Self {
            job_id: job_id_for(target_entity, created_at),
            target_entity: target_entity.to_string(),
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            result_ref: None,
            errors: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn elapsed_secs(&self, now: Timestamp) -> u64 {
        self.created_at.seconds_until(now)
    }
}

pub fn job_id_for(target_entity: &str, at: Timestamp) -> String {
    format!(
        "{}_{}",
        target_entity,
        at.to_datetime()
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S")
    )
}

/// Job status as returned by a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            result_ref: job.result_ref.clone(),
            errors: (!job.errors.is_empty()).then(|| job.errors.clone()),
        }
    }
}

/// A memoized, fresh result for an entity in the current period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedReport {
    pub entity: String,
    pub result_ref: String,
    pub job_id: String,
    pub generated_at: Timestamp,
}

/// What `launch` did.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// A pipeline run was started, or an identical job was already in flight.
    Started { job_id: String },
    /// A fresh result already exists; nothing was launched.
    Cached(CachedReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_display_and_parse() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::TimedOut,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_job_id_format() {
        let at = Local.with_ymd_and_hms(2025, 6, 1, 9, 5, 7).unwrap();
        let job = Job::new("IL17RA", Timestamp(at.timestamp()));
        assert_eq!(job.job_id, "IL17RA_20250601_090507");
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_status_view_omits_empty_fields() {
        let job = Job::new("EGFR", Timestamp(0));
        let json = serde_json::to_value(JobStatusView::from(&job)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "pending"}));

        let mut failed = job;
        failed.status = JobStatus::Failed;
        failed.errors.push("report synthesis failed".into());
        let view = JobStatusView::from(&failed);
        assert_eq!(view.errors.unwrap().len(), 1);
    }

    #[test]
    fn test_elapsed_secs() {
        let job = Job::new("EGFR", Timestamp(100));
        assert_eq!(job.elapsed_secs(Timestamp(145)), 45);
    }
}
