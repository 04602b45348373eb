//! Job status transitions.
//!
//! Pending -> Running -> Completed/Failed/TimedOut
//! Pending -> Failed (worker could not start)

use crate::error::JobError;
use crate::types::JobStatus;

/// Validate that a status transition is allowed. Nothing leaves a
/// terminal state.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), JobError> {
    let valid = matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Running)
            | (JobStatus::Pending, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::Completed)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::TimedOut)
    );

    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidTransition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::TimedOut,
    ];

    #[test]
    fn test_pending_to_running() {
        assert!(validate_transition(JobStatus::Pending, JobStatus::Running).is_ok());
    }

    #[test]
    fn test_pending_to_failed() {
        assert!(validate_transition(JobStatus::Pending, JobStatus::Failed).is_ok());
    }

    #[test]
    fn test_running_to_terminal() {
        assert!(validate_transition(JobStatus::Running, JobStatus::Completed).is_ok());
        assert!(validate_transition(JobStatus::Running, JobStatus::Failed).is_ok());
        assert!(validate_transition(JobStatus::Running, JobStatus::TimedOut).is_ok());
    }

    #[test]
    fn test_pending_cannot_skip_to_completed() {
        assert!(validate_transition(JobStatus::Pending, JobStatus::Completed).is_err());
        assert!(validate_transition(JobStatus::Pending, JobStatus::TimedOut).is_err());
    }

    #[test]
    fn test_running_cannot_regress() {
        let err = validate_transition(JobStatus::Running, JobStatus::Pending).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition(JobStatus::Running, JobStatus::Pending)
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.into_iter().filter(JobStatus::is_terminal) {
            for to in ALL {
                assert!(
                    validate_transition(from, to).is_err(),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_self_transitions_rejected() {
        for status in ALL {
            assert!(validate_transition(status, status).is_err());
        }
    }
}
