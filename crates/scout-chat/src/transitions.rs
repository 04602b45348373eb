//! Conversation transition table.
//!
//! An `Extraction` is first classified into an `Intent`; the table then
//! maps `(state, intent)` to the next state and the `Action` the
//! controller performs. The table is pure: launching, polling and
//! rendering happen in the controller.

use crate::extraction::Extraction;
use crate::types::SessionState;

/// What the user meant by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Affirm,
    Reject,
    Entity(String),
    MultipleEntities(Vec<String>),
    NoEntity,
    ListEntities,
    ForceRefresh(Option<String>),
}

impl Intent {
    /// Classify an extraction relative to the session's current target.
    ///
    /// Rejection wins over everything. A confirmation naming only the
    /// current target (or nothing) is an affirmation; one naming a new
    /// target is a new request for that target.
    pub fn classify(extraction: &Extraction, current_target: Option<&str>) -> Self {
        let entities = &extraction.entities;
        if extraction.is_rejection {
            return Intent::Reject;
        }
        let only_current = entities.is_empty()
            || (entities.len() == 1 && Some(entities[0].as_str()) == current_target);
        if extraction.is_confirmation && only_current && !extraction.refresh_requested {
            return Intent::Affirm;
        }
        if extraction.refresh_requested {
            return Intent::ForceRefresh(entities.first().cloned());
        }
        if extraction.list_requested {
            return Intent::ListEntities;
        }
        match entities.as_slice() {
            [] => Intent::NoEntity,
            [single] => Intent::Entity(single.clone()),
            _ => Intent::MultipleEntities(entities.clone()),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PromptForEntity,
    ConfirmEntity(String),
    Disambiguate(Vec<String>),
    Launch,
    Cancel,
    Reprompt,
    PollJob,
    ListEntities,
    /// Invalidate the cached result and launch again. `None` means the
    /// session's current target.
    Refresh(Option<String>),
}

pub fn transition(state: SessionState, intent: &Intent) -> (SessionState, Action) {
    use SessionState::*;

    match (state, intent) {
        (Init, Intent::Entity(entity)) | (Init, Intent::ForceRefresh(Some(entity))) => {
            (WaitingConfirm, Action::ConfirmEntity(entity.clone()))
        }
        (Init, Intent::MultipleEntities(candidates)) => {
            (Init, Action::Disambiguate(candidates.clone()))
        }
        (Init, Intent::ListEntities) => (Init, Action::ListEntities),
        (Init, _) => (Init, Action::PromptForEntity),

        (WaitingConfirm, Intent::Affirm) => (Analyzing, Action::Launch),
        (WaitingConfirm, Intent::Reject) => (Init, Action::Cancel),
        (WaitingConfirm, Intent::Entity(entity)) => {
            (WaitingConfirm, Action::ConfirmEntity(entity.clone()))
        }
        (WaitingConfirm, Intent::MultipleEntities(candidates)) => {
            (WaitingConfirm, Action::Disambiguate(candidates.clone()))
        }
        (WaitingConfirm, _) => (WaitingConfirm, Action::Reprompt),

        (Analyzing, _) => (Analyzing, Action::PollJob),

        (Completed, Intent::ListEntities) => (Completed, Action::ListEntities),
        (Completed, Intent::ForceRefresh(entity)) => (Analyzing, Action::Refresh(entity.clone())),
        // Anything else starts over.
        (Completed, other) | (Error, other) => transition(Init, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(entities: &[&str]) -> Extraction {
        Extraction {
            entities: entities.iter().map(|e| e.to_string()).collect(),
            confidence: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_rejection_wins() {
        let mut ex = extraction(&["EGFR"]);
        ex.is_rejection = true;
        ex.is_confirmation = true;
        assert_eq!(Intent::classify(&ex, Some("EGFR")), Intent::Reject);
    }

    #[test]
    fn test_classify_confirmation_of_current_target() {
        let mut ex = extraction(&["IL17RA"]);
        ex.is_confirmation = true;
        assert_eq!(Intent::classify(&ex, Some("IL17RA")), Intent::Affirm);
        assert_eq!(
            Intent::classify(&extraction(&[]), Some("IL17RA")),
            Intent::NoEntity
        );
    }

    #[test]
    fn test_classify_confirmation_naming_new_target() {
        let mut ex = extraction(&["EGFR"]);
        ex.is_confirmation = true;
        assert_eq!(
            Intent::classify(&ex, Some("IL17RA")),
            Intent::Entity("EGFR".into())
        );
    }

    #[test]
    fn test_classify_refresh_list_and_counts() {
        let mut refresh = extraction(&["EGFR"]);
        refresh.refresh_requested = true;
        refresh.is_confirmation = true;
        assert_eq!(
            Intent::classify(&refresh, None),
            Intent::ForceRefresh(Some("EGFR".into()))
        );

        let mut list = extraction(&[]);
        list.list_requested = true;
        assert_eq!(Intent::classify(&list, None), Intent::ListEntities);

        assert_eq!(
            Intent::classify(&extraction(&["EGFR", "KRAS"]), None),
            Intent::MultipleEntities(vec!["EGFR".into(), "KRAS".into()])
        );
    }

    #[test]
    fn test_init_rows() {
        assert_eq!(
            transition(SessionState::Init, &Intent::Entity("IL17RA".into())),
            (
                SessionState::WaitingConfirm,
                Action::ConfirmEntity("IL17RA".into())
            )
        );
        assert_eq!(
            transition(SessionState::Init, &Intent::NoEntity),
            (SessionState::Init, Action::PromptForEntity)
        );
        assert_eq!(
            transition(SessionState::Init, &Intent::Affirm),
            (SessionState::Init, Action::PromptForEntity)
        );
        let candidates = vec!["EGFR".to_string(), "KRAS".to_string()];
        assert_eq!(
            transition(
                SessionState::Init,
                &Intent::MultipleEntities(candidates.clone())
            ),
            (SessionState::Init, Action::Disambiguate(candidates))
        );
    }

    #[test]
    fn test_waiting_confirm_rows() {
        let state = SessionState::WaitingConfirm;
        assert_eq!(
            transition(state, &Intent::Affirm),
            (SessionState::Analyzing, Action::Launch)
        );
        assert_eq!(
            transition(state, &Intent::Reject),
            (SessionState::Init, Action::Cancel)
        );
        assert_eq!(
            transition(state, &Intent::Entity("EGFR".into())),
            (state, Action::ConfirmEntity("EGFR".into()))
        );
        assert_eq!(transition(state, &Intent::NoEntity), (state, Action::Reprompt));
        assert_eq!(transition(state, &Intent::ListEntities), (state, Action::Reprompt));
    }

    #[test]
    fn test_analyzing_always_polls() {
        for intent in [Intent::Affirm, Intent::Reject, Intent::Entity("EGFR".into())] {
            assert_eq!(
                transition(SessionState::Analyzing, &intent),
                (SessionState::Analyzing, Action::PollJob)
            );
        }
    }

    #[test]
    fn test_completed_rows() {
        let state = SessionState::Completed;
        assert_eq!(
            transition(state, &Intent::ListEntities),
            (state, Action::ListEntities)
        );
        assert_eq!(
            transition(state, &Intent::ForceRefresh(None)),
            (SessionState::Analyzing, Action::Refresh(None))
        );
        assert_eq!(
            transition(state, &Intent::Entity("EGFR".into())),
            (
                SessionState::WaitingConfirm,
                Action::ConfirmEntity("EGFR".into())
            )
        );
    }

    #[test]
    fn test_error_recovers_like_init() {
        assert_eq!(
            transition(SessionState::Error, &Intent::NoEntity),
            (SessionState::Init, Action::PromptForEntity)
        );
        assert_eq!(
            transition(SessionState::Error, &Intent::Entity("KRAS".into())),
            (
                SessionState::WaitingConfirm,
                Action::ConfirmEntity("KRAS".into())
            )
        );
    }
}
