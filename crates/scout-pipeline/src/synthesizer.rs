//! Report synthesis.

use std::fmt::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use tracing::info;

use crate::error::SynthesisError;
use crate::results::{ResultMap, TaskResult};
use crate::types::TaskKind;

/// Turns aggregated task results into a report artifact.
///
/// Must tolerate any subset of entries being error markers or absent.
/// Returns an artifact reference, or an error when nothing usable exists.
#[async_trait]
pub trait ReportSynthesizer: Send + Sync {
    async fn synthesize(&self, entity: &str, results: &ResultMap)
        -> Result<String, SynthesisError>;
}

/// Writes a markdown report to `{reports_dir}/{entity}_report_{YYYYmmdd_HHMMSS}.md`
/// and returns its path.
pub struct MarkdownReportSynthesizer {
    reports_dir: PathBuf,
}

impl MarkdownReportSynthesizer {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    /// Render the report body without touching the filesystem.
    pub fn render(entity: &str, results: &ResultMap) -> Result<String, SynthesisError> {
        if results.usable_count() == 0 {
            return Err(SynthesisError::NoUsableResults {
                entity: entity.to_string(),
            });
        }

        let mut out = String::new();
        writeln!(out, "# {} target assessment\n", entity)?;
        writeln!(
            out,
            "_Generated {}. {} of {} sources usable._",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            results.usable_count(),
            results.len().max(TaskKind::ALL.len()),
        )?;

        let known: Vec<&str> = TaskKind::ALL.iter().map(|k| k.as_str()).collect();
        let mut sections: Vec<(String, Option<&TaskResult>)> = TaskKind::ALL
            .iter()
            .map(|kind| (kind.title().to_string(), results.get(kind.as_str())))
            .collect();
        // Tasks registered under custom names go after the standard sections.
        sections.extend(
            results
                .iter()
                .filter(|(name, _)| !known.contains(&name.as_str()))
                .map(|(name, result)| (name.clone(), Some(result))),
        );

        for (title, result) in sections {
            writeln!(out, "\n## {}\n", title)?;
            match result {
                Some(TaskResult::Ok(output)) if output.is_usable() => {
                    for line in output.summary_lines() {
                        writeln!(out, "{}", line)?;
                    }
                }
                Some(TaskResult::Ok(_)) => writeln!(out, "_No data returned._")?,
                Some(TaskResult::Error(message)) => writeln!(out, "_Unavailable: {}_", message)?,
                None => writeln!(out, "_Not analyzed._")?,
            }
        }
        Ok(out)
    }

    fn file_name(entity: &str) -> String {
        let safe: String = entity
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "{}_report_{}.md",
            safe,
            Local::now().format("%Y%m%d_%H%M%S")
        )
    }
}

#[async_trait]
impl ReportSynthesizer for MarkdownReportSynthesizer {
    async fn synthesize(
        &self,
        entity: &str,
        results: &ResultMap,
    ) -> Result<String, SynthesisError> {
        let body = Self::render(entity, results)?;
        tokio::fs::create_dir_all(&self.reports_dir).await?;
        let path = self.reports_dir.join(Self::file_name(entity));
        tokio::fs::write(&path, body).await?;
        info!(entity, path = %path.display(), "Report written");
        Ok(path.display().to_string())
    }
}
