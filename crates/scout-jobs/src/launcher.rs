//! Job launcher.
//!
//! `launch` records the job synchronously, then hands the pipeline run to a
//! supervised background worker: a task on the current tokio runtime when
//! there is one, otherwise a dedicated thread with its own runtime. The
//! supervisor catches panics and start-up failures so every job reaches a
//! terminal status. A worker that is dropped before it settles, for example
//! by a runtime that is shutting down, fails its job on drop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use scout_cache::TtlCache;
use scout_core::{current_period, normalize_entity, ExecutionMode, ScoutConfig};
use scout_pipeline::{PipelineExecutor, PipelineOutcome, PipelineRequest, PipelineStatus};

use crate::error::{JobError, LaunchError};
use crate::store::JobStore;
use crate::types::{CachedReport, Job, JobStatus, JobStatusView, LaunchOutcome};

pub struct JobLauncher {
    store: JobStore,
    executor: Arc<PipelineExecutor>,
    permits: Arc<Semaphore>,
}

/// Everything a background worker needs, owned.
struct Worker {
    store: JobStore,
    executor: Arc<PipelineExecutor>,
    permits: Arc<Semaphore>,
}

impl JobLauncher {
    pub fn new(store: JobStore, executor: Arc<PipelineExecutor>, max_concurrent_jobs: usize) -> Self {
        Self {
            store,
            executor,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn from_config(
        cache: Arc<TtlCache>,
        executor: Arc<PipelineExecutor>,
        config: &ScoutConfig,
    ) -> Self {
        Self::new(
            JobStore::from_config(cache, &config.cache),
            executor,
            config.jobs.max_concurrent_jobs,
        )
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Launch an analysis of `target_entity`, or return the fresh cached
    /// result for this period.
    ///
    /// The job record exists before this returns. `mode` overrides the
    /// executor's configured mode. Only invalid input and cache faults are
    /// errors here; pipeline failures end up in the job record.
    pub fn launch(
        &self,
        target_entity: &str,
        mode: Option<ExecutionMode>,
    ) -> Result<LaunchOutcome, LaunchError> {
        let entity = normalize_entity(target_entity).ok_or(LaunchError::EmptyEntity)?;
        let period = current_period();

        if let Some(report) = self.store.cached_result(&entity, &period)? {
            info!(entity = %entity, job_id = %report.job_id, "Returning cached result");
            return Ok(LaunchOutcome::Cached(report));
        }

        let (job, created) = self.store.create(Job::new(&entity, self.store.now()))?;
        if !created {
            info!(job_id = %job.job_id, "Identical job already launched");
            return Ok(LaunchOutcome::Started { job_id: job.job_id });
        }

        let mut request = self.executor.request(&entity);
        if let Some(mode) = mode {
            request.mode = mode;
        }
        self.spawn(job.job_id.clone(), request, period);

        Ok(LaunchOutcome::Started { job_id: job.job_id })
    }

    pub fn job(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        self.store.get(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<Option<JobStatusView>, JobError> {
        Ok(self.store.get(job_id)?.as_ref().map(JobStatusView::from))
    }

    /// Drop the cached result for `target_entity` so the next launch reruns.
    pub fn invalidate(&self, target_entity: &str) -> Result<(), LaunchError> {
        let entity = normalize_entity(target_entity).ok_or(LaunchError::EmptyEntity)?;
        self.store.invalidate_result(&entity, &current_period())?;
        Ok(())
    }

    /// Entities with a fresh cached result this period.
    pub fn cached_entities(&self) -> Result<Vec<String>, JobError> {
        self.store.cached_entities(&current_period())
    }

    fn spawn(&self, job_id: String, request: PipelineRequest, period: String) {
        let worker = Worker {
            store: self.store.clone(),
            executor: Arc::clone(&self.executor),
            permits: Arc::clone(&self.permits),
        };

        let guard = SettleGuard {
            store: self.store.clone(),
            job_id: job_id.clone(),
            armed: true,
        };

        if let Ok(handle) = Handle::try_current() {
            handle.spawn(worker.supervise(job_id, request, period, guard));
            return;
        }

        let thread_job_id = job_id.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("job-{}", job_id))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => {
                        runtime.block_on(worker.supervise(thread_job_id, request, period, guard))
                    }
                    Err(e) => {
                        guard.disarm();
                        worker.fail(&thread_job_id, format!("failed to start job runtime: {}", e));
                    }
                }
            });
        // On failure the closure, and with it the guard, has already been dropped.
        if let Err(e) = spawned {
            error!(job_id = %job_id, error = %e, "Failed to start job worker thread");
        }
    }
}

impl Worker {
    async fn supervise(
        self,
        job_id: String,
        request: PipelineRequest,
        period: String,
        guard: SettleGuard,
    ) {
        let run = AssertUnwindSafe(self.run(&job_id, request, &period)).catch_unwind();
        if let Err(panic) = run.await {
            let message = panic_message(panic.as_ref());
            error!(job_id = %job_id, panic = %message, "Job worker panicked");
            self.fail(&job_id, format!("job worker panicked: {}", message));
        }
        guard.disarm();
    }

    async fn run(&self, job_id: &str, request: PipelineRequest, period: &str) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.fail(job_id, format!("job queue closed: {}", e));
                return;
            }
        };

        if let Err(e) = self.store.transition(job_id, JobStatus::Running, |_| {}) {
            warn!(job_id, error = %e, "Could not mark job running, abandoning run");
            return;
        }

        let entity = request.target_entity.clone();
        let outcome = self.executor.run(request).await;
        self.finish(job_id, &entity, outcome, period);
    }

    fn finish(&self, job_id: &str, entity: &str, outcome: PipelineOutcome, period: &str) {
        let status = match outcome.status {
            PipelineStatus::Completed => JobStatus::Completed,
            PipelineStatus::Failed => JobStatus::Failed,
            PipelineStatus::TimedOut => JobStatus::TimedOut,
        };

        // Memoize before the terminal status becomes visible. Timed-out
        // partials are never memoized.
        if let (JobStatus::Completed, Some(result_ref)) = (status, outcome.artifact.clone()) {
            let report = CachedReport {
                entity: entity.to_string(),
                result_ref,
                job_id: job_id.to_string(),
                generated_at: self.store.now(),
            };
            if let Err(e) = self.store.store_result(&report, period) {
                warn!(job_id, error = %e, "Could not cache job result");
            }
        }

        let recorded = self.store.transition(job_id, status, |job| {
            job.result_ref = outcome.artifact;
            job.errors = outcome.errors;
            job.tasks = outcome.tasks;
        });
        if let Err(e) = recorded {
            warn!(job_id, error = %e, "Could not record job outcome");
        }
    }

    fn fail(&self, job_id: &str, reason: String) {
        record_failure(&self.store, job_id, reason);
    }
}

/// Travels with the worker future. Dropped while armed, it fails the job.
struct SettleGuard {
    store: JobStore,
    job_id: String,
    armed: bool,
}

impl SettleGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.armed {
            record_failure(
                &self.store,
                &self.job_id,
                "job worker stopped before the job finished".to_string(),
            );
        }
    }
}

fn record_failure(store: &JobStore, job_id: &str, reason: String) {
    error!(job_id, reason = %reason, "Job failed outside the pipeline");
    let result = store.transition(job_id, JobStatus::Failed, |job| {
        job.errors.push(reason);
    });
    if let Err(e) = result {
        warn!(job_id, error = %e, "Could not record job failure");
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scout_pipeline::{
        AnalysisTask, ReportSynthesizer, ResultMap, SynthesisError, TaskError, TaskInput,
        TaskKind, TaskOutput, PatentResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingTask {
        kind: TaskKind,
        runs: Arc<AtomicUsize>,
        sleep: Duration,
        fail: bool,
    }

    #[async_trait]
    impl AnalysisTask for CountingTask {
        fn kind(&self) -> TaskKind {
            self.kind
        }
        async fn run(&self, _input: TaskInput) -> Result<TaskOutput, TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.sleep).await;
            if self.fail {
                return Err(TaskError::Failed("source offline".into()));
            }
            Ok(TaskOutput::Patent(PatentResult {
                total_patents: 3,
                ..Default::default()
            }))
        }
    }

    struct StaticSynthesizer;

    #[async_trait]
    impl ReportSynthesizer for StaticSynthesizer {
        async fn synthesize(
            &self,
            entity: &str,
            results: &ResultMap,
        ) -> Result<String, SynthesisError> {
            if results.usable_count() == 0 {
                return Err(SynthesisError::NoUsableResults {
                    entity: entity.to_string(),
                });
            }
            Ok(format!("reports/{}.md", entity))
        }
    }

    struct PanickingSynthesizer;

    #[async_trait]
    impl ReportSynthesizer for PanickingSynthesizer {
        async fn synthesize(&self, _: &str, _: &ResultMap) -> Result<String, SynthesisError> {
            panic!("template missing")
        }
    }

    struct Fixture {
        launcher: JobLauncher,
        runs: Arc<AtomicUsize>,
    }

    fn fixture_with(
        sleep: Duration,
        fail: bool,
        deadline: Duration,
        synthesizer: Arc<dyn ReportSynthesizer>,
        max_jobs: usize,
    ) -> Fixture {
        let runs = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn AnalysisTask> = Arc::new(CountingTask {
            kind: TaskKind::Patent,
            runs: runs.clone(),
            sleep,
            fail,
        });
        let executor = PipelineExecutor::new(vec![task], synthesizer)
            .unwrap()
            .with_defaults(ExecutionMode::Parallel, deadline);
        let cache = Arc::new(TtlCache::new(4));
        let store = JobStore::new(cache, Duration::from_secs(3600), Duration::from_secs(3600));
        Fixture {
            launcher: JobLauncher::new(store, Arc::new(executor), max_jobs),
            runs,
        }
    }

    fn fixture(sleep: Duration) -> Fixture {
        fixture_with(
            sleep,
            false,
            Duration::from_secs(30),
            Arc::new(StaticSynthesizer),
            4,
        )
    }

    fn started(outcome: LaunchOutcome) -> String {
        match outcome {
            LaunchOutcome::Started { job_id } => job_id,
            other => panic!("expected a started job, got {:?}", other),
        }
    }

    async fn wait_terminal(launcher: &JobLauncher, job_id: &str) -> Job {
        for _ in 0..200 {
            if let Some(job) = launcher.job(job_id).unwrap() {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_launch_records_job_before_returning() {
        let f = fixture(Duration::from_millis(200));
        let job_id = started(f.launcher.launch("il17ra", None).unwrap());

        assert!(job_id.starts_with("IL17RA_"));
        let view = f.launcher.status(&job_id).unwrap().unwrap();
        assert!(matches!(view.status, JobStatus::Pending | JobStatus::Running));

        let job = wait_terminal(&f.launcher, &job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_ref.as_deref(), Some("reports/IL17RA.md"));
        assert_eq!(job.tasks.len(), 1);
        assert!(job.started_at.is_some() && job.completed_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_polled_status_never_regresses() {
        let f = fixture(Duration::from_millis(150));
        let job_id = started(f.launcher.launch("EGFR", None).unwrap());

        let rank = |s: JobStatus| match s {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            _ => 2,
        };
        let mut observed = Vec::new();
        loop {
            let status = f.launcher.status(&job_id).unwrap().unwrap().status;
            if observed.last() != Some(&status) {
                observed.push(status);
            }
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(observed.windows(2).all(|w| rank(w[0]) < rank(w[1])));
        assert_eq!(observed.last(), Some(&JobStatus::Completed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_launch_same_period_returns_cached_result() {
        let f = fixture(Duration::from_millis(20));
        let job_id = started(f.launcher.launch("IL17RA", None).unwrap());
        wait_terminal(&f.launcher, &job_id).await;

        match f.launcher.launch("IL17RA", None).unwrap() {
            LaunchOutcome::Cached(report) => {
                assert_eq!(report.entity, "IL17RA");
                assert_eq!(report.job_id, job_id);
                assert_eq!(report.result_ref, "reports/IL17RA.md");
            }
            other => panic!("expected cached result, got {:?}", other),
        }
        assert_eq!(f.runs.load(Ordering::SeqCst), 1);
        assert_eq!(f.launcher.cached_entities().unwrap(), vec!["IL17RA".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidate_forces_rerun() {
        let f = fixture(Duration::ZERO);
        let first = started(f.launcher.launch("IL17RA", None).unwrap());
        wait_terminal(&f.launcher, &first).await;

        f.launcher.invalidate("IL17RA").unwrap();
        // Job ids have one-second resolution.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = started(f.launcher.launch("IL17RA", None).unwrap());
        assert_ne!(first, second);
        wait_terminal(&f.launcher, &second).await;
        assert_eq!(f.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_second_launch_is_deduplicated() {
        let f = fixture(Duration::from_millis(300));
        let first = started(f.launcher.launch("TNF", None).unwrap());
        let second = started(f.launcher.launch("TNF", None).unwrap());
        if first == second {
            wait_terminal(&f.launcher, &first).await;
            assert_eq!(f.runs.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_empty_entity_is_rejected() {
        let f = fixture(Duration::ZERO);
        assert!(matches!(
            f.launcher.launch("   ", None),
            Err(LaunchError::EmptyEntity)
        ));
        assert!(matches!(
            f.launcher.invalidate(""),
            Err(LaunchError::EmptyEntity)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_synthesis_failure_marks_job_failed() {
        let f = fixture_with(
            Duration::ZERO,
            true,
            Duration::from_secs(30),
            Arc::new(StaticSynthesizer),
            4,
        );
        let job_id = started(f.launcher.launch("KRAS", None).unwrap());
        let job = wait_terminal(&f.launcher, &job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.errors.iter().any(|e| e.contains("patent analysis failed")));
        assert!(job.errors.iter().any(|e| e.contains("report synthesis failed")));
        assert!(f.launcher.cached_entities().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_is_recorded_and_not_cached() {
        let f = fixture_with(
            Duration::from_secs(10),
            false,
            Duration::from_secs(1),
            Arc::new(StaticSynthesizer),
            4,
        );
        let started_at = std::time::Instant::now();
        let job_id = started(f.launcher.launch("KRAS", None).unwrap());
        let job = wait_terminal(&f.launcher, &job_id).await;

        assert_eq!(job.status, JobStatus::TimedOut);
        assert!(started_at.elapsed() < Duration::from_secs(4));
        assert!(matches!(
            f.launcher.launch("KRAS", None).unwrap(),
            LaunchOutcome::Started { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panic_in_pipeline_becomes_failed_status() {
        let f = fixture_with(
            Duration::ZERO,
            false,
            Duration::from_secs(30),
            Arc::new(PanickingSynthesizer),
            4,
        );
        let job_id = started(f.launcher.launch("MYC", None).unwrap());
        let job = wait_terminal(&f.launcher, &job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.errors[0].contains("template missing"));
    }

    #[test]
    fn test_launch_without_runtime_uses_worker_thread() {
        let f = fixture(Duration::from_millis(10));
        let job_id = started(f.launcher.launch("BRAF", None).unwrap());

        let mut status = JobStatus::Pending;
        for _ in 0..200 {
            status = f.launcher.status(&job_id).unwrap().unwrap().status;
            if status.is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        assert_eq!(status, JobStatus::Completed);
    }

    #[test]
    fn test_launch_on_stopped_runtime_fails_job() {
        let f = fixture(Duration::from_millis(10));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = runtime.handle().clone();
        runtime.shutdown_background();

        let _entered = handle.enter();
        let job_id = started(f.launcher.launch("BRAF", None).unwrap());

        let mut job = f.launcher.job(&job_id).unwrap().unwrap();
        for _ in 0..40 {
            if job.status.is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(25));
            job = f.launcher.job(&job_id).unwrap().unwrap();
        }
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.errors[0].contains("stopped before the job finished"));
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_bound_keeps_extra_jobs_pending() {
        let f = fixture_with(
            Duration::from_millis(400),
            false,
            Duration::from_secs(30),
            Arc::new(StaticSynthesizer),
            1,
        );
        let first = started(f.launcher.launch("AAA", None).unwrap());
        let second = started(f.launcher.launch("BBB", None).unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut statuses = vec![
            f.launcher.status(&first).unwrap().unwrap().status,
            f.launcher.status(&second).unwrap().unwrap().status,
        ];
        statuses.sort_by_key(|s| s.to_string());
        assert_eq!(statuses, vec![JobStatus::Pending, JobStatus::Running]);

        assert_eq!(wait_terminal(&f.launcher, &first).await.status, JobStatus::Completed);
        assert_eq!(wait_terminal(&f.launcher, &second).await.status, JobStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serial_mode_override() {
        let f = fixture(Duration::ZERO);
        let job_id = started(
            f.launcher
                .launch("CD19", Some(ExecutionMode::Serial))
                .unwrap(),
        );
        assert_eq!(wait_terminal(&f.launcher, &job_id).await.status, JobStatus::Completed);
    }
}
