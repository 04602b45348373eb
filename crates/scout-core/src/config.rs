use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScoutError};

/// Upper bound on `pipeline.deadline_secs` (one week).
pub const MAX_DEADLINE_SECS: u64 = 7 * 24 * 3600;

/// Top-level configuration for the scout application.
///
/// Loaded from `~/.scout/config.toml` by default. Each section corresponds
/// to one subsystem crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

impl ScoutConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScoutConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings that would make a subsystem unusable.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.deadline_secs == 0 {
            return Err(ScoutError::Config(
                "pipeline.deadline_secs must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.deadline_secs > MAX_DEADLINE_SECS {
            return Err(ScoutError::Config(format!(
                "pipeline.deadline_secs must be at most {}",
                MAX_DEADLINE_SECS
            )));
        }
        if self.cache.shards == 0 {
            return Err(ScoutError::Config(
                "cache.shards must be greater than zero".to_string(),
            ));
        }
        if self.conversation.history_limit == 0 {
            return Err(ScoutError::Config(
                "conversation.history_limit must be greater than zero".to_string(),
            ));
        }
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(ScoutError::Config(
                "jobs.max_concurrent_jobs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The data directory with a leading `~` expanded against `$HOME`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Location of the durable cache database.
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir().join(&self.cache.db_file)
    }

    /// Directory report artifacts are written to.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir().join(&self.pipeline.reports_dir)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the cache database and report artifacts.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.scout/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// TTL cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Mirror entries into the SQLite durable tier.
    pub persistent: bool,
    /// Database file name, relative to `general.data_dir`.
    pub db_file: String,
    /// TTL applied when a caller does not pass one. 0 means never expire.
    pub default_ttl_secs: u64,
    pub job_status_ttl_secs: u64,
    /// Lifetime of a memoized analysis result (30 days).
    pub result_ttl_secs: u64,
    /// Number of independently locked memory shards.
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            db_file: "cache.db".to_string(),
            default_ttl_secs: 3600,
            job_status_ttl_secs: 3600,
            result_ttl_secs: 30 * 24 * 3600,
            shards: 16,
        }
    }
}

/// Analysis pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fan tasks out concurrently instead of running them in order.
    pub parallel: bool,
    /// Hard wall-clock bound on one pipeline run.
    pub deadline_secs: u64,
    /// Extra attempts for a failing task.
    pub task_retries: u32,
    pub retry_backoff_ms: u64,
    /// Report directory, relative to `general.data_dir`.
    pub reports_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            deadline_secs: 1800,
            task_retries: 0,
            retry_backoff_ms: 50,
            reports_dir: "reports".to_string(),
        }
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Pipelines allowed to run at once. Further jobs wait in `Pending`.
    pub max_concurrent_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
        }
    }
}

/// Conversation controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// History entries kept per session.
    pub history_limit: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Confidence reported by the heuristic extractor.
    pub heuristic_confidence: f32,
    /// Below this confidence the confirmation prompt asks the user to double check.
    pub low_confidence_threshold: f32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_limit: 30,
            max_message_length: 2000,
            heuristic_confidence: 0.5,
            low_confidence_threshold: 0.8,
        }
    }
}
