//! Pipeline executor.
//!
//! Runs a fixed list of analysis tasks against one entity, either all at
//! once (`JoinSet` fan-out) or one after another, under a single wall-clock
//! deadline. Every attempt is merged into a shared ledger; the ledger is
//! sealed when the run ends so writes from abandoned tasks are dropped.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use scout_core::config::{PipelineConfig, MAX_DEADLINE_SECS};
use scout_core::ExecutionMode;

use crate::error::{PipelineError, TaskError};
use crate::results::{ResultMap, TaskResult};
use crate::synthesizer::ReportSynthesizer;
use crate::task::{AnalysisTask, TaskInput};
use crate::types::TaskOutput;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every task was attempted and synthesis produced an artifact.
    Completed,
    /// The run finished but synthesis could not produce an artifact.
    Failed,
    /// The deadline passed before every task finished.
    TimedOut,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::Failed => write!(f, "failed"),
            PipelineStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One pipeline invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub target_entity: String,
    pub mode: ExecutionMode,
    pub deadline_seconds: u64,
}

/// Per-task accounting for a finished run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub name: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub results: ResultMap,
    pub errors: Vec<String>,
    pub status: PipelineStatus,
    pub elapsed_seconds: f64,
    pub artifact: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
}

#[derive(Clone, Copy, Debug)]
struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

#[derive(Default)]
struct LedgerState {
    sealed: bool,
    results: ResultMap,
    summaries: Vec<TaskSummary>,
}

/// Result state shared by the tasks of one run.
#[derive(Default)]
struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Never held across task code.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, name: &str, result: TaskResult) {
        let mut state = self.lock();
        if state.sealed {
            debug!(task = name, "Ignoring result from abandoned task");
            return;
        }
        if !state.results.record(name, result) {
            debug!(task = name, "Kept earlier usable result");
        }
    }

    fn summarize(&self, summary: TaskSummary) {
        let mut state = self.lock();
        if !state.sealed {
            state.summaries.push(summary);
        }
    }

    fn successes(&self) -> Vec<TaskOutput> {
        self.lock().results.successes()
    }

    fn seal(&self) -> (ResultMap, Vec<TaskSummary>) {
        let mut state = self.lock();
        state.sealed = true;
        (state.results.clone(), state.summaries.clone())
    }
}

pub struct PipelineExecutor {
    tasks: Vec<Arc<dyn AnalysisTask>>,
    synthesizer: Arc<dyn ReportSynthesizer>,
    retry: RetryPolicy,
    default_mode: ExecutionMode,
    default_deadline: Duration,
}

impl PipelineExecutor {
    /// Build an executor. Task names must be unique.
    pub fn new(
        tasks: Vec<Arc<dyn AnalysisTask>>,
        synthesizer: Arc<dyn ReportSynthesizer>,
    ) -> Result<Self, PipelineError> {
        if tasks.is_empty() {
            return Err(PipelineError::NoTasks);
        }
        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.name().to_string()) {
                return Err(PipelineError::DuplicateTask(task.name().to_string()));
            }
        }
        Ok(Self {
            tasks,
            synthesizer,
            retry: RetryPolicy {
                retries: 0,
                backoff: Duration::from_millis(50),
            },
            default_mode: ExecutionMode::Parallel,
            default_deadline: Duration::from_secs(1800),
        })
    }

    pub fn from_config(
        config: &PipelineConfig,
        tasks: Vec<Arc<dyn AnalysisTask>>,
        synthesizer: Arc<dyn ReportSynthesizer>,
    ) -> Result<Self, PipelineError> {
        Ok(Self::new(tasks, synthesizer)?
            .with_retries(config.task_retries, Duration::from_millis(config.retry_backoff_ms))
            .with_defaults(
                ExecutionMode::from_parallel_flag(config.parallel),
                Duration::from_secs(config.deadline_secs),
            ))
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retry = RetryPolicy { retries, backoff };
        self
    }

    pub fn with_defaults(mut self, mode: ExecutionMode, deadline: Duration) -> Self {
        self.default_mode = mode;
        self.default_deadline = deadline;
        self
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    /// A request for `entity` using the configured mode and deadline.
    pub fn request(&self, entity: &str) -> PipelineRequest {
        PipelineRequest {
            target_entity: entity.to_string(),
            mode: self.default_mode,
            deadline_seconds: self.default_deadline.as_secs(),
        }
    }

    /// Run every task and synthesize a report. Never fails: task errors,
    /// timeouts and synthesis errors are all reported in the outcome.
    pub async fn run(&self, request: PipelineRequest) -> PipelineOutcome {
        let started = Instant::now();
        if request.deadline_seconds > MAX_DEADLINE_SECS {
            warn!(
                requested = request.deadline_seconds,
                max = MAX_DEADLINE_SECS,
                "Pipeline deadline clamped"
            );
        }
        let deadline =
            started + Duration::from_secs(request.deadline_seconds.min(MAX_DEADLINE_SECS));
        let ledger = Arc::new(Ledger::default());
        let entity = request.target_entity.as_str();

        info!(
            entity,
            mode = %request.mode,
            tasks = self.tasks.len(),
            deadline_secs = request.deadline_seconds,
            "Pipeline started"
        );

        let timed_out = match request.mode {
            ExecutionMode::Parallel => self.run_parallel(entity, &ledger, deadline).await,
            ExecutionMode::Serial => self.run_serial(entity, &ledger, deadline).await,
        };
        let (results, summaries) = ledger.seal();

        let mut errors: Vec<String> = results
            .errors()
            .into_iter()
            .map(|(name, message)| format!("{} analysis failed: {}", name, message))
            .collect();

        let (status, artifact) = if timed_out {
            let finished: HashSet<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
            let unfinished: Vec<String> = self
                .task_names()
                .into_iter()
                .filter(|name| !finished.contains(name.as_str()))
                .collect();
            warn!(
                entity,
                unfinished = %unfinished.join(","),
                "Pipeline deadline exceeded"
            );
            errors.push(format!(
                "pipeline exceeded deadline of {}s; unfinished: {}",
                request.deadline_seconds,
                unfinished.join(", ")
            ));
            (PipelineStatus::TimedOut, None)
        } else {
            match self.synthesizer.synthesize(entity, &results).await {
                Ok(artifact) => (PipelineStatus::Completed, Some(artifact)),
                Err(e) => {
                    warn!(entity, error = %e, "Report synthesis failed");
                    errors.push(format!("report synthesis failed: {}", e));
                    (PipelineStatus::Failed, None)
                }
            }
        };

        let elapsed = started.elapsed();
        info!(
            entity,
            status = %status,
            usable = results.usable_count(),
            failed = results.error_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Pipeline finished"
        );

        PipelineOutcome {
            results,
            errors,
            status,
            elapsed_seconds: elapsed.as_secs_f64(),
            artifact,
            tasks: summaries,
        }
    }

    /// Returns `true` if the deadline fired first.
    async fn run_parallel(&self, entity: &str, ledger: &Arc<Ledger>, deadline: Instant) -> bool {
        let mut set = JoinSet::new();
        for task in &self.tasks {
            set.spawn(run_task(
                Arc::clone(task),
                TaskInput::new(entity),
                Arc::clone(ledger),
                self.retry,
            ));
        }

        let joined = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Analysis task did not complete");
                }
            }
        })
        .await;

        if joined.is_err() {
            ledger.seal();
            set.abort_all();
            return true;
        }
        false
    }

    async fn run_serial(&self, entity: &str, ledger: &Arc<Ledger>, deadline: Instant) -> bool {
        for task in &self.tasks {
            let input = TaskInput {
                entity: entity.to_string(),
                prior: ledger.successes(),
            };
            let step = run_task(Arc::clone(task), input, Arc::clone(ledger), self.retry);
            if tokio::time::timeout_at(deadline, step).await.is_err() {
                ledger.seal();
                return true;
            }
        }
        false
    }
}

async fn run_task(
    task: Arc<dyn AnalysisTask>,
    input: TaskInput,
    ledger: Arc<Ledger>,
    retry: RetryPolicy,
) {
    let name = task.name().to_string();
    let started = Instant::now();
    let mut attempts = 0;
    let mut succeeded;

    loop {
        attempts += 1;
        let result = AssertUnwindSafe(task.run(input.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(output) => {
                succeeded = output.is_usable();
                debug!(task = %name, attempts, usable = succeeded, "Analysis task returned");
                ledger.record(&name, TaskResult::Ok(output));
            }
            Err(e) => {
                succeeded = false;
                warn!(task = %name, attempts, error = %e, "Analysis task failed");
                ledger.record(&name, TaskResult::Error(e.to_string()));
            }
        }

        if succeeded || attempts > retry.retries {
            break;
        }
        tokio::time::sleep(retry.backoff).await;
    }

    ledger.summarize(TaskSummary {
        name,
        succeeded,
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
    });
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
