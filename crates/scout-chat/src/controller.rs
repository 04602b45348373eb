//! Conversation controller.
//!
//! Each turn loads the session, classifies the message, runs it through
//! the transition table and performs the resulting action. Sessions in
//! `Analyzing` poll their job instead of being classified.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use scout_core::config::ConversationConfig;
use scout_core::normalize_entity;
use scout_jobs::{JobLauncher, JobStatus, LaunchOutcome};

use crate::error::{ChatError, ExtractionError};
use crate::extraction::{Extraction, ExtractionService};
use crate::heuristic::HeuristicExtractor;
use crate::messages;
use crate::session::SessionStore;
use crate::transitions::{transition, Action, Intent};
use crate::types::{
    HistoryEntry, ResponseKind, Role, Session, SessionState, TurnRequest, TurnResponse,
};

pub struct ConversationController {
    sessions: SessionStore,
    launcher: Arc<JobLauncher>,
    extractor: Option<Arc<dyn ExtractionService>>,
    fallback: HeuristicExtractor,
    config: ConversationConfig,
}

impl ConversationController {
    /// Controller using only the heuristic extractor.
    pub fn new(
        launcher: Arc<JobLauncher>,
        config: ConversationConfig,
    ) -> Result<Self, ExtractionError> {
        Ok(Self {
            sessions: SessionStore::new(),
            launcher,
            extractor: None,
            fallback: HeuristicExtractor::new(config.heuristic_confidence)?,
            config,
        })
    }

    /// Use `extractor` as the primary extraction service.
    pub fn with_extractor(mut self, extractor: Arc<dyn ExtractionService>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub async fn handle_turn(&self, request: &TurnRequest) -> Result<TurnResponse, ChatError> {
        self.handle_message(&request.session_id, &request.text).await
    }

    /// Process one user message.
    ///
    /// Only invalid messages and session store faults are errors; every
    /// downstream failure becomes an `error` response and the session
    /// recovers on the next message.
    pub async fn handle_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<TurnResponse, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let max = self.config.max_message_length;
        if text.chars().count() > max {
            return Err(ChatError::MessageTooLong(max));
        }

        let mut session = self.sessions.load_or_create(session_id)?;
        let limit = self.config.history_limit;

        let response = if session.state == SessionState::Analyzing {
            session.push_history(Role::User, text, limit);
            self.poll_job(&mut session)
        } else {
            let extraction = self.extract(text, &session.history).await;
            let intent = Intent::classify(&extraction, session.target_entity.as_deref());
            debug!(session_id, state = %session.state, ?intent, "Message classified");
            session.push_history(Role::User, text, limit);
            self.apply(&mut session, &intent, extraction.confidence)
        };

        session.push_history(Role::Assistant, &response.message, limit);
        self.sessions.save(session)?;
        Ok(response)
    }

    /// Report the session's current status without a user message.
    /// Sessions in `Analyzing` check their job.
    pub fn poll(&self, session_id: &str) -> Result<TurnResponse, ChatError> {
        let mut session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
        let entity = session.target_entity.clone();

        let response = match session.state {
            SessionState::Analyzing => self.poll_job(&mut session),
            SessionState::Completed => TurnResponse::new(
                ResponseKind::Completed,
                messages::completed(
                    entity.as_deref().unwrap_or_default(),
                    session.result_ref.as_deref().unwrap_or("unavailable"),
                ),
                SessionState::Completed,
            )
            .with_entity(entity.as_deref())
            .with_job(session.last_job_id.as_deref()),
            SessionState::Error => TurnResponse::new(
                ResponseKind::Error,
                session
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
                SessionState::Error,
            )
            .with_entity(entity.as_deref()),
            SessionState::WaitingConfirm => TurnResponse::new(
                ResponseKind::Confirm,
                messages::reprompt(entity.as_deref().unwrap_or_default()),
                SessionState::WaitingConfirm,
            )
            .with_entity(entity.as_deref()),
            SessionState::Init => TurnResponse::new(
                ResponseKind::NeedEntity,
                messages::need_entity(),
                SessionState::Init,
            ),
        };

        self.sessions.save(session)?;
        Ok(response)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<Session>, ChatError> {
        self.sessions.get(session_id)
    }

    pub fn session_ids(&self) -> Result<Vec<String>, ChatError> {
        self.sessions.ids()
    }

    pub fn history(&self, session_id: &str) -> Result<Vec<HistoryEntry>, ChatError> {
        self.sessions
            .get(session_id)?
            .map(|session| session.history)
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))
    }

    /// Delete a session and its history.
    pub fn clear(&self, session_id: &str) -> Result<(), ChatError> {
        if self.sessions.remove(session_id)? {
            info!(session_id, "Session cleared");
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(session_id.to_string()))
        }
    }

    pub fn launcher(&self) -> &JobLauncher {
        &self.launcher
    }

    async fn extract(&self, text: &str, history: &[HistoryEntry]) -> Extraction {
        let Some(extractor) = &self.extractor else {
            return self.fallback.analyze(text);
        };
        match AssertUnwindSafe(extractor.extract(text, history))
            .catch_unwind()
            .await
        {
            Ok(Ok(extraction)) => normalized(extraction),
            Ok(Err(e)) => {
                warn!(error = %e, "Extraction failed, using heuristic fallback");
                self.fallback.analyze(text)
            }
            Err(_) => {
                warn!("Extraction service panicked, using heuristic fallback");
                self.fallback.analyze(text)
            }
        }
    }

    fn apply(&self, session: &mut Session, intent: &Intent, confidence: f32) -> TurnResponse {
        let from = session.state;
        let (next, action) = transition(from, intent);
        if matches!(from, SessionState::Completed | SessionState::Error)
            && next != SessionState::Completed
            && !matches!(action, Action::Refresh(_))
        {
            session.reset();
        }
        session.state = next;

        match action {
            Action::PromptForEntity => {
                TurnResponse::new(ResponseKind::NeedEntity, messages::need_entity(), next)
            }
            Action::ConfirmEntity(entity) => {
                let message =
                    messages::confirm(&entity, confidence, self.config.low_confidence_threshold);
                let response = TurnResponse::new(ResponseKind::Confirm, message, next)
                    .with_entity(Some(&entity))
                    .with_confidence(confidence);
                session.target_entity = Some(entity);
                response
            }
            Action::Disambiguate(candidates) => TurnResponse::new(
                ResponseKind::MultipleEntities,
                messages::multiple_entities(&candidates),
                next,
            )
            .with_status("waiting_selection")
            .with_entity(session.target_entity.as_deref())
            .with_candidates(candidates),
            Action::Launch => self.launch(session, false),
            Action::Refresh(entity) => {
                if let Some(entity) = entity {
                    session.target_entity = Some(entity);
                }
                self.launch(session, true)
            }
            Action::Cancel => {
                info!(session_id = %session.session_id, "Analysis cancelled");
                session.target_entity = None;
                TurnResponse::new(ResponseKind::Chat, messages::cancelled(), next)
            }
            Action::Reprompt => match session.target_entity.clone() {
                Some(entity) => {
                    TurnResponse::new(ResponseKind::Confirm, messages::reprompt(&entity), next)
                        .with_entity(Some(&entity))
                }
                None => {
                    session.state = SessionState::Init;
                    TurnResponse::new(
                        ResponseKind::NeedEntity,
                        messages::need_entity(),
                        SessionState::Init,
                    )
                }
            },
            Action::PollJob => self.poll_job(session),
            Action::ListEntities => TurnResponse::new(
                ResponseKind::Chat,
                messages::entities_listed(&self.discussed_entities(session)),
                next,
            ),
        }
    }

    fn launch(&self, session: &mut Session, refresh: bool) -> TurnResponse {
        let Some(entity) = session.target_entity.clone() else {
            session.state = SessionState::Init;
            return TurnResponse::new(
                ResponseKind::NeedEntity,
                messages::need_entity(),
                SessionState::Init,
            );
        };

        if refresh {
            if let Err(e) = self.launcher.invalidate(&entity) {
                warn!(entity = %entity, error = %e, "Failed to invalidate cached result");
            }
        }

        match self.launcher.launch(&entity, None) {
            Ok(LaunchOutcome::Started { job_id }) => {
                info!(session_id = %session.session_id, job_id = %job_id, entity = %entity, "Analysis launched");
                session.state = SessionState::Analyzing;
                session.last_job_id = Some(job_id.clone());
                session.result_ref = None;
                session.last_error = None;
                session.job_started_at = Some(self.launcher.store().now());
                TurnResponse::new(
                    ResponseKind::Analyzing,
                    messages::analyzing(&entity, &job_id),
                    SessionState::Analyzing,
                )
                .with_entity(Some(&entity))
                .with_job(Some(&job_id))
            }
            Ok(LaunchOutcome::Cached(report)) => {
                session.state = SessionState::Completed;
                session.last_job_id = Some(report.job_id.clone());
                session.result_ref = Some(report.result_ref.clone());
                TurnResponse::new(
                    ResponseKind::Completed,
                    messages::cached_result(&entity, &report.result_ref),
                    SessionState::Completed,
                )
                .with_entity(Some(&entity))
                .with_job(Some(&report.job_id))
            }
            Err(e) => {
                warn!(session_id = %session.session_id, entity = %entity, error = %e, "Launch failed");
                session.state = SessionState::Error;
                session.last_error = Some(e.to_string());
                TurnResponse::new(
                    ResponseKind::Error,
                    messages::launch_failed(&entity, &e.to_string()),
                    SessionState::Error,
                )
                .with_entity(Some(&entity))
            }
        }
    }

    fn poll_job(&self, session: &mut Session) -> TurnResponse {
        let entity = session.target_entity.clone().unwrap_or_default();
        let Some(job_id) = session.last_job_id.clone() else {
            session.state = SessionState::Error;
            session.last_error = Some("no job to check".to_string());
            return TurnResponse::new(
                ResponseKind::Error,
                messages::launch_failed(&entity, "no job to check"),
                SessionState::Error,
            );
        };

        let job = match self.launcher.job(&job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job status unreadable");
                None
            }
        };
        let Some(job) = job else {
            session.state = SessionState::Error;
            session.last_error = Some(format!("job {} not found", job_id));
            return TurnResponse::new(
                ResponseKind::Error,
                messages::job_missing(&job_id),
                SessionState::Error,
            )
            .with_entity(Some(&entity))
            .with_job(Some(&job_id));
        };

        let (kind, message) = match job.status {
            JobStatus::Pending | JobStatus::Running => {
                session.state = SessionState::Analyzing;
                let now = self.launcher.store().now();
                let elapsed = match session.job_started_at {
                    Some(started) => started.seconds_until(now),
                    None => job.elapsed_secs(now),
                };
                (
                    ResponseKind::InProgress,
                    messages::in_progress(&entity, elapsed),
                )
            }
            JobStatus::Completed => {
                session.state = SessionState::Completed;
                session.result_ref = job.result_ref.clone();
                let result_ref = job.result_ref.as_deref().unwrap_or("unavailable");
                (
                    ResponseKind::Completed,
                    messages::completed(&entity, result_ref),
                )
            }
            JobStatus::Failed | JobStatus::TimedOut => {
                session.state = SessionState::Error;
                session.last_error = Some(job.errors.join("; "));
                let message = if job.status == JobStatus::TimedOut {
                    messages::timed_out(&entity, &job.errors)
                } else {
                    messages::failed(&entity, &job.errors)
                };
                (ResponseKind::Error, message)
            }
        };

        TurnResponse::new(kind, message, session.state)
            .with_entity(Some(&entity))
            .with_job(Some(&job_id))
    }

    /// Entities the user has mentioned in this session, in order.
    fn discussed_entities(&self, session: &Session) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        let mentioned = session
            .history
            .iter()
            .filter(|entry| entry.role == Role::User)
            .flat_map(|entry| self.fallback.entities(&entry.text))
            .chain(session.target_entity.clone());
        for entity in mentioned {
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
        entities
    }
}

/// Normalize and deduplicate entities returned by an external service.
fn normalized(mut extraction: Extraction) -> Extraction {
    let mut entities: Vec<String> = Vec::new();
    for entity in extraction.entities.iter().filter_map(|e| normalize_entity(e)) {
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }
    extraction.entities = entities;
    extraction
}
