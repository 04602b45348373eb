//! Extraction service boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::types::HistoryEntry;

/// Structured reading of one user message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Normalized candidate entities, in order of first mention.
    pub entities: Vec<String>,
    pub is_confirmation: bool,
    pub is_rejection: bool,
    /// User asked to rerun an analysis despite a cached result.
    pub refresh_requested: bool,
    /// User asked which targets came up earlier.
    pub list_requested: bool,
    pub confidence: f32,
}

/// Turns free text into an `Extraction`.
///
/// Implementations may call remote models and may fail; the controller
/// falls back to `HeuristicExtractor` on any error or panic.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        history: &[HistoryEntry],
    ) -> Result<Extraction, ExtractionError>;
}
