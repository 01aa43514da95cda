//! Generation job record, its type/status enums and poll bounds.
//!
//! A [`Job`] is created in [`JobStatus::Queued`] by the orchestrator,
//! mutated only by the remote worker, and observed read-only by the
//! poller.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{RecordId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default delay between two status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Read budget for single-image jobs (headshot, body composite, product shot).
pub const SINGLE_IMAGE_MAX_ATTEMPTS: u32 = 60;

/// Read budget for the intermediate mannequin stage.
pub const MANNEQUIN_MAX_ATTEMPTS: u32 = 60;

/// Read budget for the final multi-reference outfit render.
pub const RENDER_MAX_ATTEMPTS: u32 = 120;

/// Result payload keys that may carry the produced image, in priority order.
const OUTPUT_IMAGE_KEYS: &[&str] = &["image_url", "image_path"];

// ---------------------------------------------------------------------------
// JobType
// ---------------------------------------------------------------------------

/// Kind of remote generation work a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    HeadshotGenerate,
    BodyComposite,
    ProductShot,
    OutfitMannequin,
    OutfitRender,
}

impl JobType {
    /// Wire name of the job type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeadshotGenerate => "headshot_generate",
            Self::BodyComposite => "body_composite",
            Self::ProductShot => "product_shot",
            Self::OutfitMannequin => "outfit_mannequin",
            Self::OutfitRender => "outfit_render",
        }
    }

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "headshot_generate" => Ok(Self::HeadshotGenerate),
            "body_composite" => Ok(Self::BodyComposite),
            "product_shot" => Ok(Self::ProductShot),
            "outfit_mannequin" => Ok(Self::OutfitMannequin),
            "outfit_render" => Ok(Self::OutfitRender),
            other => Err(CoreError::Validation(format!("Unknown job type '{other}'"))),
        }
    }

    /// Whether the job produces a single image from a single reference.
    ///
    /// These run as a standalone stage outside the outfit pipeline.
    pub fn is_single_image(self) -> bool {
        matches!(
            self,
            Self::HeadshotGenerate | Self::BodyComposite | Self::ProductShot
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// Monotonic: `queued -> processing -> {succeeded | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// `succeeded` and `failed` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether the remote worker may move a job from `self` to `next`.
    ///
    /// Staying in the same non-terminal status is allowed (repeated reads
    /// return the same value). Nothing leaves a terminal status.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Queued | Self::Processing) => true,
            (Self::Queued | Self::Processing, Self::Succeeded | Self::Failed) => true,
            (Self::Processing, Self::Processing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A tracked unit of remote generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: RecordId,
    pub owner_id: RecordId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Opaque, per-type input payload.
    pub input: serde_json::Value,
    /// Opaque, per-type result payload. Set once the job succeeds.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Worker-provided failure message.
    #[serde(default)]
    pub error: Option<String>,
    /// Structured failure code, when the worker provides one.
    #[serde(default)]
    pub error_code: Option<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub feedback_at: Option<Timestamp>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reference to the image produced by a succeeded job, if any.
    pub fn output_image(&self) -> Option<&str> {
        let result = self.result.as_ref()?;
        OUTPUT_IMAGE_KEYS
            .iter()
            .find_map(|key| result.get(*key).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
    }

    /// Worker failure message, or a generic one if the worker left it empty.
    pub fn failure_message(&self) -> String {
        match self.error.as_deref() {
            Some(msg) if !msg.trim().is_empty() => msg.to_string(),
            _ => format!("{} job failed without an error message", self.job_type),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll bounds
// ---------------------------------------------------------------------------

/// Wall-clock ceiling for polling one job: `max_attempts * interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollOptions {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub const fn single_image() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, SINGLE_IMAGE_MAX_ATTEMPTS)
    }

    pub const fn mannequin() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, MANNEQUIN_MAX_ATTEMPTS)
    }

    pub const fn render() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, RENDER_MAX_ATTEMPTS)
    }

    /// Total time budget before the poller gives up.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::single_image()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
