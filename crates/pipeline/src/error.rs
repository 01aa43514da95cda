use atelier_core::error::StoreError;
use atelier_core::failure::{classify_failure, FailureCategory};
use atelier_core::job::JobType;
use atelier_core::types::RecordId;
use atelier_imaging::CompositingError;

/// Why a poll session ended without a succeeded job.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PollError {
    /// The job reached the terminal `failed` status.
    #[error("Job {job_id} failed: {message}")]
    JobFailed {
        job_id: RecordId,
        /// Worker-provided failure message.
        message: String,
        /// Structured failure code, when the worker sent one.
        code: Option<String>,
    },

    /// Every read was used while the job stayed non-terminal.
    #[error("Job {job_id} did not finish after {attempts} status reads")]
    Timeout { job_id: RecordId, attempts: u32 },

    /// A status read failed at the transport level.
    #[error("Failed to read status of job {job_id}: {message}")]
    Transport { job_id: RecordId, message: String },

    /// Local observation was stopped before a terminal status.
    #[error("Polling was cancelled")]
    Cancelled,
}

/// Pipeline-level failure surfaced to the caller of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Missing prerequisites; no job was created.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A generation is already in progress")]
    AlreadyGenerating,

    /// A collaborator call failed (create job, working copy, lookups).
    #[error("Store request failed: {0}")]
    Transport(#[from] StoreError),

    /// A stage job ended in `failed`.
    #[error("{stage} job failed: {message}")]
    JobFailed {
        stage: JobType,
        message: String,
        code: Option<String>,
    },

    /// A stage job never reached a terminal status.
    #[error("{stage} job timed out after {attempts} status reads")]
    PollingTimeout { stage: JobType, attempts: u32 },

    #[error(transparent)]
    Compositing(#[from] CompositingError),

    #[error("Generation was cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Attribute a poll failure to the stage that was being polled.
    pub fn from_poll(stage: JobType, err: PollError) -> Self {
        match err {
            PollError::JobFailed { message, code, .. } => Self::JobFailed {
                stage,
                message,
                code,
            },
            PollError::Timeout { attempts, .. } => Self::PollingTimeout { stage, attempts },
            PollError::Transport { message, .. } => Self::Transport(StoreError::Transport(message)),
            PollError::Cancelled => Self::Cancelled,
        }
    }

    /// Failure category for user-facing reporting.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::JobFailed { message, code, .. } => classify_failure(code.as_deref(), message),
            Self::PollingTimeout { .. } => FailureCategory::Timeout,
            Self::Transport(_) => FailureCategory::ServiceUnavailable,
            Self::Validation(_)
            | Self::AlreadyGenerating
            | Self::Compositing(_)
            | Self::Cancelled => FailureCategory::Unknown,
        }
    }

    /// Single message shown to the user when the pipeline ends in failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::AlreadyGenerating => "A generation is already running.".to_string(),
            Self::Cancelled => "Generation cancelled.".to_string(),
            Self::Compositing(_) => {
                "Your garment photos could not be combined. Try removing one and generating again."
                    .to_string()
            }
            _ => self.category().user_message().to_string(),
        }
    }
}
