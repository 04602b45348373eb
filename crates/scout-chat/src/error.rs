//! Error types for the conversation controller.

use scout_core::ScoutError;

/// Errors a conversational turn can return. Everything else that goes
/// wrong during a turn is reported in the response and the session state.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session store error: {0}")]
    SessionStore(String),
}

/// Failure of an extraction service. Never surfaces from a turn: the
/// controller falls back to the heuristic extractor instead.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid extraction response: {0}")]
    InvalidResponse(String),
    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<ChatError> for ScoutError {
    fn from(err: ChatError) -> Self {
        ScoutError::Chat(err.to_string())
    }
}

impl From<ExtractionError> for ScoutError {
    fn from(err: ExtractionError) -> Self {
        ScoutError::Chat(err.to_string())
    }
}
