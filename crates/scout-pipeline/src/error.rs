use thiserror::Error;

use scout_core::ScoutError;

/// Failure of a single analysis task. Recorded against the task's name and
/// never propagated past the executor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Failure to turn aggregated results into a report artifact.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("no usable results for {entity}")]
    NoUsableResults { entity: String },

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render report: {0}")]
    Render(#[from] std::fmt::Error),
}

/// Invalid executor construction.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("pipeline has no tasks")]
    NoTasks,

    #[error("duplicate task name: {0}")]
    DuplicateTask(String),
}

impl From<PipelineError> for ScoutError {
    fn from(err: PipelineError) -> Self {
        ScoutError::Pipeline(err.to_string())
    }
}
