//! Sessions and the wire shapes of a conversational turn.

use std::fmt;

use serde::{Deserialize, Serialize};

use scout_core::Timestamp;

/// Conversation states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Init,
    WaitingConfirm,
    Analyzing,
    Completed,
    Error,
}

impl SessionState {
    /// Status string reported to clients.
    pub fn status_label(&self) -> &'static str {
        match self {
            SessionState::Init => "waiting_input",
            SessionState::WaitingConfirm => "waiting_confirmation",
            SessionState::Analyzing => "analyzing",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Init => write!(f, "init"),
            SessionState::WaitingConfirm => write!(f, "waiting_confirm"),
            SessionState::Analyzing => write!(f, "analyzing"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: Timestamp,
}

/// Per-conversation state. Mutated only by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub state: SessionState,
    pub target_entity: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub last_job_id: Option<String>,
    /// Report of the last completed analysis.
    pub result_ref: Option<String>,
    /// When the current job was launched.
    pub job_started_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: SessionState::Init,
            target_entity: None,
            history: Vec::new(),
            last_job_id: None,
            result_ref: None,
            job_started_at: None,
            last_error: None,
        }
    }

    /// Append to history, dropping the oldest entries beyond `limit`.
    pub fn push_history(&mut self, role: Role, text: &str, limit: usize) {
        self.history.push(HistoryEntry {
            role,
            text: text.to_string(),
            timestamp: Timestamp::now(),
        });
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Forget the current target and job.
    pub fn reset(&mut self) {
        self.state = SessionState::Init;
        self.target_entity = None;
        self.last_job_id = None;
        self.result_ref = None;
        self.job_started_at = None;
        self.last_error = None;
    }
}

/// Kind of a turn response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    NeedEntity,
    Confirm,
    MultipleEntities,
    Analyzing,
    InProgress,
    Completed,
    Error,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub message: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TurnResponse {
    pub fn new(kind: ResponseKind, message: String, state: SessionState) -> Self {
        Self {
            kind,
            message,
            status: state.status_label().to_string(),
            entity: None,
            job_id: None,
            candidates: None,
            confidence: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_entity(mut self, entity: Option<&str>) -> Self {
        self.entity = entity.map(str::to_string);
        self
    }

    pub fn with_job(mut self, job_id: Option<&str>) -> Self {
        self.job_id = job_id.map(str::to_string);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}
