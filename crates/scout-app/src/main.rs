//! Scout application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the cache (memory tier plus optional SQLite durable tier)
//! 4. Build the pipeline executor, job launcher and conversation controller
//! 5. Drive one conversation session from stdin

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use scout_cache::{DurableStore, SqliteStore, TtlCache};
use scout_chat::{ChatError, ConversationController, Role, TurnResponse};
use scout_core::ScoutConfig;
use scout_jobs::JobLauncher;
use scout_pipeline::{MarkdownReportSynthesizer, OfflineTask, PipelineExecutor};

use cli::CliArgs;

/// Simulated latency of the built-in offline analysis tasks.
const OFFLINE_TASK_LATENCY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Load errors are reported once tracing is up.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match ScoutConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (ScoutConfig::default(), Some(e)),
    };
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if args.serial {
        config.pipeline.parallel = false;
    }

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Scout v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }
    config.validate()?;

    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Cache.
    let durable: Option<Arc<dyn DurableStore>> = if config.cache.persistent {
        let db_path = config.cache_db_path();
        match SqliteStore::open(&db_path) {
            Ok(store) => {
                tracing::info!(path = %db_path.display(), "Durable cache opened");
                Some(Arc::new(store) as Arc<dyn DurableStore>)
            }
            Err(e) => {
                tracing::warn!(path = %db_path.display(), error = %e, "Durable cache unavailable, running memory-only");
                None
            }
        }
    } else {
        None
    };
    let cache = Arc::new(TtlCache::from_config(&config.cache, durable));
    match cache.purge_expired() {
        Ok(purged) => tracing::info!(purged, "Expired cache entries purged"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache entries"),
    }

    // Pipeline, jobs, conversation.
    let synthesizer = Arc::new(MarkdownReportSynthesizer::new(config.reports_dir()));
    let executor = PipelineExecutor::from_config(
        &config.pipeline,
        OfflineTask::full_set(OFFLINE_TASK_LATENCY),
        synthesizer,
    )?;
    tracing::info!(tasks = ?executor.task_names(), parallel = config.pipeline.parallel, "Pipeline ready");

    let launcher = Arc::new(JobLauncher::from_config(
        Arc::clone(&cache),
        Arc::new(executor),
        &config,
    ));
    let controller = ConversationController::new(Arc::clone(&launcher), config.conversation.clone())?;

    // Conversation loop.
    let session_id = uuid::Uuid::new_v4().to_string();
    println!(
        "Scout v{} (session {}). Name a target to analyze, or /help for commands.",
        env!("CARGO_PKG_VERSION"),
        session_id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/status" => print_turn(controller.poll(&session_id)),
            "/history" => match controller.history(&session_id) {
                Ok(history) => {
                    for entry in history {
                        let who = match entry.role {
                            Role::User => "you",
                            Role::Assistant => "scout",
                        };
                        println!("[{}] {}: {}", entry.timestamp, who, entry.text);
                    }
                }
                Err(e) => println!("error: {}", e),
            },
            "/clear" => match controller.clear(&session_id) {
                Ok(()) => println!("Session cleared."),
                Err(e) => println!("error: {}", e),
            },
            "/stats" => match cache.stats() {
                Ok(stats) => {
                    println!("memory entries: {}", stats.memory_entries);
                    match (stats.durable_entries, stats.durable_location) {
                        (Some(count), Some(location)) => {
                            println!("durable entries: {} ({})", count, location)
                        }
                        _ => println!("durable tier: none"),
                    }
                }
                Err(e) => println!("error: {}", e),
            },
            "/entities" => match launcher.cached_entities() {
                Ok(entities) if entities.is_empty() => println!("No cached results this month."),
                Ok(entities) => println!("Cached this month: {}", entities.join(", ")),
                Err(e) => println!("error: {}", e),
            },
            _ if line.starts_with("/job ") => {
                let job_id = line.trim_start_matches("/job ").trim();
                match launcher.status(job_id) {
                    Ok(Some(view)) => println!("{}", serde_json::to_string_pretty(&view)?),
                    Ok(None) => println!("Job {} not found.", job_id),
                    Err(e) => println!("error: {}", e),
                }
            }
            _ => print_turn(controller.handle_message(&session_id, line).await),
        }
    }

    tracing::info!("Scout shutting down");
    Ok(())
}

fn print_turn(result: Result<TurnResponse, ChatError>) {
    match result {
        Ok(response) => println!("{}\n  [{}]", response.message, response.status),
        Err(e) => println!("error: {}", e),
    }
}

fn print_help() {
    println!(
        "/status         check the current analysis\n\
         /history        show this conversation\n\
         /clear          forget this conversation\n\
         /entities       list targets with a cached report this month\n\
         /job <job_id>   show a job's status record\n\
         /stats          cache statistics\n\
         /quit           exit"
    );
}
