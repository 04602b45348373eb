pub mod controller;
pub mod error;
pub mod extraction;
pub mod heuristic;
pub mod messages;
pub mod session;
pub mod transitions;
pub mod types;

pub use controller::ConversationController;
pub use error::{ChatError, ExtractionError};
pub use extraction::{Extraction, ExtractionService};
pub use heuristic::HeuristicExtractor;
pub use session::SessionStore;
pub use transitions::{transition, Action, Intent};
pub use types::{
    HistoryEntry, ResponseKind, Role, Session, SessionState, TurnRequest, TurnResponse,
};
