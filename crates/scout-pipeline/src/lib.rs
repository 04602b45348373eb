pub mod error;
pub mod executor;
pub mod results;
pub mod synthesizer;
pub mod task;
pub mod types;

pub use error::{PipelineError, SynthesisError, TaskError};
pub use executor::{PipelineExecutor, PipelineOutcome, PipelineRequest, PipelineStatus, TaskSummary};
pub use results::{ResultMap, TaskResult};
pub use synthesizer::{MarkdownReportSynthesizer, ReportSynthesizer};
pub use task::{AnalysisTask, OfflineTask, TaskInput};
pub use types::{
    ClinicalResult, CommercialResult, LiteratureResult, PatentResult, TaskKind, TaskOutput,
};
