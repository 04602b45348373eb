use thiserror::Error;

use scout_cache::CacheError;
use scout_core::ScoutError;

use crate::types::JobStatus;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job status transition from {0} to {1}")]
    InvalidTransition(JobStatus, JobStatus),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("corrupt job record {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Errors a caller of `JobLauncher::launch` can see. Failures inside the
/// background pipeline are never returned here; they land in the job record.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("target entity must not be empty")]
    EmptyEntity,

    #[error(transparent)]
    Job(#[from] JobError),
}

impl From<CacheError> for LaunchError {
    fn from(err: CacheError) -> Self {
        LaunchError::Job(JobError::Cache(err))
    }
}

impl From<JobError> for ScoutError {
    fn from(err: JobError) -> Self {
        ScoutError::Job(err.to_string())
    }
}

impl From<LaunchError> for ScoutError {
    fn from(err: LaunchError) -> Self {
        ScoutError::Job(err.to_string())
    }
}
