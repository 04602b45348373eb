//! Command line arguments.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Scout: conversational target assessment with background analysis jobs.
#[derive(Parser, Debug)]
#[command(name = "scout", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the cache database and reports.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Run analysis tasks one after another instead of concurrently.
    #[arg(long = "serial")]
    pub serial: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SCOUT_CONFIG env var > ~/.scout/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SCOUT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// `--data-dir` override, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Effective log level: --log-level flag, else the configured level.
    pub fn resolve_log_level(&self, configured: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| configured.to_string())
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".scout").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "scout",
            "--config",
            "/tmp/scout.toml",
            "-d",
            "/tmp/data",
            "--log-level",
            "debug",
            "--serial",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/scout.toml"));
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/data"));
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(args.serial);
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["scout"]);
        assert!(args.resolve_data_dir().is_none());
        assert_eq!(args.resolve_log_level("warn"), "warn");
        assert!(!args.serial);
    }
}
