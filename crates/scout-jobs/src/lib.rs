pub mod error;
pub mod launcher;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::{JobError, LaunchError};
pub use launcher::JobLauncher;
pub use state_machine::validate_transition;
pub use store::{result_key, status_key, JobStore};
pub use types::{CachedReport, Job, JobStatus, JobStatusView, LaunchOutcome};
