//! Per-task result variants.
//!
//! Each analysis kind has its own result struct whose fields are all
//! optional or defaulted, so partial answers from a source are still
//! representable. `TaskOutput` tags them by kind.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Literature,
    Clinical,
    Patent,
    Commercial,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Literature,
        TaskKind::Clinical,
        TaskKind::Patent,
        TaskKind::Commercial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Literature => "literature",
            TaskKind::Clinical => "clinical",
            TaskKind::Patent => "patent",
            TaskKind::Commercial => "commercial",
        }
    }

    /// Section heading used in reports.
    pub fn title(&self) -> &'static str {
        match self {
            TaskKind::Literature => "Literature",
            TaskKind::Clinical => "Clinical trials",
            TaskKind::Patent => "Patents",
            TaskKind::Commercial => "Commercial landscape",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literature" => Ok(TaskKind::Literature),
            "clinical" => Ok(TaskKind::Clinical),
            "patent" => Ok(TaskKind::Patent),
            "commercial" => Ok(TaskKind::Commercial),
            _ => Err(format!("Unknown task kind: {}", s)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteratureResult {
    pub total_literature: u32,
    pub disease_mechanism: Option<String>,
    pub treatment_strategy: Option<String>,
    pub target_analysis: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub confidence: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalResult {
    pub total_trials: u32,
    pub active_trials: u32,
    pub completed_trials: u32,
    #[serde(default)]
    pub phase_distribution: BTreeMap<String, u32>,
    pub summary: Option<String>,
    pub confidence: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentResult {
    pub total_patents: u32,
    pub analyzed_patents: u32,
    pub report: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommercialResult {
    pub market_overview: Option<String>,
    pub competitive_landscape: Option<String>,
    pub strategic_recommendations: Option<String>,
    #[serde(default)]
    pub data_sources: Vec<String>,
}

/// Output of one analysis task, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    Literature(LiteratureResult),
    Clinical(ClinicalResult),
    Patent(PatentResult),
    Commercial(CommercialResult),
}

fn has_text(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn push_text(lines: &mut Vec<String>, label: &str, field: &Option<String>) {
    if let Some(text) = field.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(format!("- **{}**: {}", label, text.trim()));
    }
}

impl TaskOutput {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskOutput::Literature(_) => TaskKind::Literature,
            TaskOutput::Clinical(_) => TaskKind::Clinical,
            TaskOutput::Patent(_) => TaskKind::Patent,
            TaskOutput::Commercial(_) => TaskKind::Commercial,
        }
    }

    /// Whether the output carries anything a report can use. An output
    /// with every field empty counts as a null result.
    pub fn is_usable(&self) -> bool {
        match self {
            TaskOutput::Literature(r) => {
                r.total_literature > 0
                    || has_text(&r.disease_mechanism)
                    || has_text(&r.treatment_strategy)
                    || has_text(&r.target_analysis)
            }
            TaskOutput::Clinical(r) => r.total_trials > 0 || has_text(&r.summary),
            TaskOutput::Patent(r) => r.total_patents > 0 || has_text(&r.report),
            TaskOutput::Commercial(r) => {
                has_text(&r.market_overview)
                    || has_text(&r.competitive_landscape)
                    || has_text(&r.strategic_recommendations)
            }
        }
    }

    /// Markdown bullet lines describing the output.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match self {
            TaskOutput::Literature(r) => {
                push_text(&mut lines, "Disease mechanism", &r.disease_mechanism);
                push_text(&mut lines, "Treatment strategy", &r.treatment_strategy);
                push_text(&mut lines, "Target analysis", &r.target_analysis);
                lines.push(format!("- Publications reviewed: {}", r.total_literature));
                for reference in &r.references {
                    lines.push(format!("  - {}", reference));
                }
            }
            TaskOutput::Clinical(r) => {
                push_text(&mut lines, "Summary", &r.summary);
                lines.push(format!(
                    "- Trials: {} total, {} active, {} completed",
                    r.total_trials, r.active_trials, r.completed_trials
                ));
                for (phase, count) in &r.phase_distribution {
                    lines.push(format!("  - {}: {}", phase, count));
                }
            }
            TaskOutput::Patent(r) => {
                push_text(&mut lines, "Report", &r.report);
                lines.push(format!(
                    "- Patents: {} found, {} analyzed",
                    r.total_patents, r.analyzed_patents
                ));
            }
            TaskOutput::Commercial(r) => {
                push_text(&mut lines, "Market overview", &r.market_overview);
                push_text(&mut lines, "Competitive landscape", &r.competitive_landscape);
                push_text(&mut lines, "Recommendations", &r.strategic_recommendations);
                for source in &r.data_sources {
                    lines.push(format!("  - source: {}", source));
                }
            }
        }
        lines
    }
}
