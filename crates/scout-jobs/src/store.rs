//! Typed job and result records over the shared TTL cache.
//!
//! Keys:
//! - `job_status:{job_id}` holds a serialized `Job`
//! - `result:{entity}:{period}` holds a `CachedReport`

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use scout_cache::TtlCache;
use scout_core::config::CacheConfig;
use scout_core::Timestamp;

use crate::error::JobError;
use crate::state_machine::validate_transition;
use crate::types::{CachedReport, Job, JobStatus};

const STATUS_PREFIX: &str = "job_status:";
const RESULT_PREFIX: &str = "result:";

pub fn status_key(job_id: &str) -> String {
    format!("{}{}", STATUS_PREFIX, job_id)
}

pub fn result_key(entity: &str, period: &str) -> String {
    format!("{}{}:{}", RESULT_PREFIX, entity, period)
}

#[derive(Clone)]
pub struct JobStore {
    cache: Arc<TtlCache>,
    status_ttl: Duration,
    result_ttl: Duration,
}

impl JobStore {
    pub fn new(cache: Arc<TtlCache>, status_ttl: Duration, result_ttl: Duration) -> Self {
        Self {
            cache,
            status_ttl,
            result_ttl,
        }
    }

    pub fn from_config(cache: Arc<TtlCache>, config: &CacheConfig) -> Self {
        Self::new(
            cache,
            Duration::from_secs(config.job_status_ttl_secs),
            Duration::from_secs(config.result_ttl_secs),
        )
    }

    pub fn now(&self) -> Timestamp {
        self.cache.now()
    }

    /// Insert `job` unless a record with the same id already exists.
    ///
    /// Returns the stored record and whether it was newly created. An
    /// existing record wins: same entity, same second means same job.
    pub fn create(&self, job: Job) -> Result<(Job, bool), JobError> {
        let key = status_key(&job.job_id);
        let job_id = job.job_id.clone();
        let (stored, created) = self.cache.update(&key, Some(self.status_ttl), |current| {
            match current.map(|value| decode(&job_id, value)) {
                Some(Ok(existing)) => (None, (Ok(existing), false)),
                // Unreadable records are replaced.
                Some(Err(_)) | None => match serde_json::to_value(&job) {
                    Ok(value) => (Some(value), (Ok(job), true)),
                    Err(e) => (
                        None,
                        (
                            Err(JobError::Corrupt {
                                job_id: job_id.clone(),
                                reason: e.to_string(),
                            }),
                            false,
                        ),
                    ),
                },
            }
        })?;
        let stored = stored?;
        if created {
            info!(job_id = %stored.job_id, entity = %stored.target_entity, "Job created");
        } else {
            debug!(job_id = %stored.job_id, "Job already exists");
        }
        Ok((stored, created))
    }

    pub fn get(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        match self.cache.get(&status_key(job_id))? {
            Some(value) => decode(job_id, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Move a job to `to`, applying `apply` to the record in the same
    /// critical section. Rejects regressions and unknown jobs.
    pub fn transition<F>(&self, job_id: &str, to: JobStatus, apply: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job),
    {
        let now = self.now();
        let key = status_key(job_id);
        let updated = self.cache.update(&key, Some(self.status_ttl), |current| {
            let Some(value) = current else {
                return (None, Err(JobError::NotFound(job_id.to_string())));
            };
            let mut job = match decode(job_id, value) {
                Ok(job) => job,
                Err(e) => return (None, Err(e)),
            };
            if let Err(e) = validate_transition(job.status, to) {
                return (None, Err(e));
            }
            job.status = to;
            match to {
                JobStatus::Running => job.started_at = Some(now),
                status if status.is_terminal() => job.completed_at = Some(now),
                _ => {}
            }
            apply(&mut job);
            match serde_json::to_value(&job) {
                Ok(value) => (Some(value), Ok(job)),
                Err(e) => (
                    None,
                    Err(JobError::Corrupt {
                        job_id: job_id.to_string(),
                        reason: e.to_string(),
                    }),
                ),
            }
        })??;
        info!(job_id, status = %updated.status, "Job status changed");
        Ok(updated)
    }

    pub fn cached_result(&self, entity: &str, period: &str) -> Result<Option<CachedReport>, JobError> {
        Ok(self.cache.get_json(&result_key(entity, period))?)
    }

    pub fn store_result(&self, report: &CachedReport, period: &str) -> Result<(), JobError> {
        self.cache
            .set_json(&result_key(&report.entity, period), report, Some(self.result_ttl))?;
        Ok(())
    }

    pub fn invalidate_result(&self, entity: &str, period: &str) -> Result<(), JobError> {
        self.cache.delete(&result_key(entity, period))?;
        info!(entity, period, "Cached result invalidated");
        Ok(())
    }

    /// Entities with a fresh result in `period`, sorted.
    pub fn cached_entities(&self, period: &str) -> Result<Vec<String>, JobError> {
        let suffix = format!(":{}", period);
        Ok(self
            .cache
            .keys_with_prefix(RESULT_PREFIX)?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(RESULT_PREFIX)
                    .and_then(|rest| rest.strip_suffix(&suffix))
                    .map(str::to_string)
            })
            .collect())
    }
}

fn decode(job_id: &str, value: &Value) -> Result<Job, JobError> {
    serde_json::from_value(value.clone()).map_err(|e| JobError::Corrupt {
        job_id: job_id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_cache::ManualClock;
    use serde_json::json;

    fn store_with_clock() -> (JobStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp(1_700_000_000)));
        let cache = Arc::new(TtlCache::new(4).with_clock(clock.clone()));
        let store = JobStore::new(cache, Duration::from_secs(3600), Duration::from_secs(86_400));
        (store, clock)
    }

    #[test]
    fn test_create_and_get() {
        let (store, _clock) = store_with_clock();
        let job = Job::new("IL17RA", store.now());
        let (stored, created) = store.create(job.clone()).unwrap();
        assert!(created);
        assert_eq!(stored, job);
        assert_eq!(store.get(&job.job_id).unwrap(), Some(job));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_create_same_id_returns_existing() {
        let (store, _clock) = store_with_clock();
        let job = Job::new("IL17RA", store.now());
        store.create(job.clone()).unwrap();
        store
            .transition(&job.job_id, JobStatus::Running, |_| {})
            .unwrap();

        let (existing, created) = store.create(job.clone()).unwrap();
        assert!(!created);
        assert_eq!(existing.status, JobStatus::Running);
    }

    #[test]
    fn test_transition_sets_timestamps_and_applies() {
        let (store, clock) = store_with_clock();
        let job = Job::new("EGFR", store.now());
        store.create(job.clone()).unwrap();

        clock.advance(2);
        let running = store
            .transition(&job.job_id, JobStatus::Running, |_| {})
            .unwrap();
        assert_eq!(running.started_at, Some(store.now()));

        clock.advance(10);
        let done = store
            .transition(&job.job_id, JobStatus::Completed, |job| {
                job.result_ref = Some("reports/EGFR.md".into());
            })
            .unwrap();
        assert_eq!(done.completed_at, Some(store.now()));
        assert_eq!(
            store.get(&job.job_id).unwrap().unwrap().result_ref.as_deref(),
            Some("reports/EGFR.md")
        );
    }

    #[test]
    fn test_transition_rejects_regression_and_leaves_record() {
        let (store, _clock) = store_with_clock();
        let job = Job::new("EGFR", store.now());
        store.create(job.clone()).unwrap();
        store.transition(&job.job_id, JobStatus::Running, |_| {}).unwrap();
        store.transition(&job.job_id, JobStatus::Failed, |_| {}).unwrap();

        let err = store
            .transition(&job.job_id, JobStatus::Running, |job| {
                job.errors.push("should not be stored".into())
            })
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition(JobStatus::Failed, JobStatus::Running)));

        let stored = store.get(&job.job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.errors.is_empty());
    }

    #[test]
    fn test_transition_unknown_job() {
        let (store, _clock) = store_with_clock();
        let err = store
            .transition("nope", JobStatus::Running, |_| {})
            .unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[test]
    fn test_status_expires_with_ttl() {
        let (store, clock) = store_with_clock();
        let job = Job::new("EGFR", store.now());
        store.create(job.clone()).unwrap();
        clock.advance(3600);
        assert_eq!(store.get(&job.job_id).unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_is_reported_and_replaced_on_create() {
        let (store, _clock) = store_with_clock();
        let job = Job::new("EGFR", store.now());
        store
            .cache
            .set(&status_key(&job.job_id), json!("garbage"), None)
            .unwrap();

        assert!(matches!(
            store.get(&job.job_id),
            Err(JobError::Corrupt { .. })
        ));
        let (_, created) = store.create(job.clone()).unwrap();
        assert!(created);
        assert!(store.get(&job.job_id).unwrap().is_some());
    }

    #[test]
    fn test_result_roundtrip_invalidate_and_list() {
        let (store, _clock) = store_with_clock();
        for entity in ["IL17RA", "EGFR"] {
            let report = CachedReport {
                entity: entity.to_string(),
                result_ref: format!("reports/{}.md", entity),
                job_id: format!("{}_20250101_000000", entity),
                generated_at: store.now(),
            };
            store.store_result(&report, "2025-01").unwrap();
        }
        store
            .store_result(
                &CachedReport {
                    entity: "TNF".into(),
                    result_ref: "reports/TNF.md".into(),
                    job_id: "TNF_20241201_000000".into(),
                    generated_at: store.now(),
                },
                "2024-12",
            )
            .unwrap();

        assert_eq!(
            store.cached_entities("2025-01").unwrap(),
            vec!["EGFR".to_string(), "IL17RA".to_string()]
        );
        assert!(store.cached_result("IL17RA", "2025-01").unwrap().is_some());
        assert!(store.cached_result("IL17RA", "2025-02").unwrap().is_none());

        store.invalidate_result("IL17RA", "2025-01").unwrap();
        assert!(store.cached_result("IL17RA", "2025-01").unwrap().is_none());
        assert_eq!(store.cached_entities("2025-01").unwrap(), vec!["EGFR".to_string()]);
    }
}
