//! Analysis task boundary.
//!
//! Concrete retrievers (PubMed, trial registries, patent offices, market
//! data) live outside this crate and plug in through `AnalysisTask`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TaskError;
use crate::types::{
    ClinicalResult, CommercialResult, LiteratureResult, PatentResult, TaskKind, TaskOutput,
};

/// Input handed to each task. Every task receives its own copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskInput {
    pub entity: String,
    /// Usable outputs of tasks that ran earlier in serial mode. Always
    /// empty in parallel mode.
    pub prior: Vec<TaskOutput>,
}

impl TaskInput {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            prior: Vec::new(),
        }
    }
}

/// One independent unit of analysis run by the executor.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Name the result is recorded under. Defaults to the kind.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    async fn run(&self, input: TaskInput) -> Result<TaskOutput, TaskError>;
}

/// Task that answers from canned data after a fixed latency.
///
/// Used when no live source is configured for a kind, and by tests.
pub struct OfflineTask {
    kind: TaskKind,
    latency: Duration,
}

impl OfflineTask {
    pub fn new(kind: TaskKind, latency: Duration) -> Self {
        Self { kind, latency }
    }

    /// One offline task per kind, in canonical order.
    pub fn full_set(latency: Duration) -> Vec<Arc<dyn AnalysisTask>> {
        TaskKind::ALL
            .into_iter()
            .map(|kind| Arc::new(OfflineTask::new(kind, latency)) as Arc<dyn AnalysisTask>)
            .collect()
    }
}

#[async_trait]
impl AnalysisTask for OfflineTask {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn run(&self, input: TaskInput) -> Result<TaskOutput, TaskError> {
        if input.entity.trim().is_empty() {
            return Err(TaskError::Failed("empty target entity".to_string()));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(kind = %self.kind, entity = %input.entity, prior = input.prior.len(), "Offline task answered");

        let entity = input.entity;
        let output = match self.kind {
            TaskKind::Literature => TaskOutput::Literature(LiteratureResult {
                total_literature: 1,
                target_analysis: Some(format!(
                    "{} has no live literature source configured; offline summary only.",
                    entity
                )),
                confidence: Some(0.1),
                ..Default::default()
            }),
            TaskKind::Clinical => TaskOutput::Clinical(ClinicalResult {
                summary: Some(format!("No trial registry configured for {}.", entity)),
                confidence: Some(0.1),
                ..Default::default()
            }),
            TaskKind::Patent => TaskOutput::Patent(PatentResult {
                report: Some(format!("No patent source configured for {}.", entity)),
                ..Default::default()
            }),
            TaskKind::Commercial => TaskOutput::Commercial(CommercialResult {
                market_overview: Some(format!(
                    "No market data source configured for {}.",
                    entity
                )),
                ..Default::default()
            }),
        };
        Ok(output)
    }
}
