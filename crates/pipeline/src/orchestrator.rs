//! Multi-stage generation pipelines.
//!
//! An outfit render runs against a private working copy of the outfit:
//!
//! ```text
//! Validating -> StagingWorkingCopy -> [MannequinStage] -> RenderStage -> Succeeded
//!      |                 |                    |                 |
//!      +-> Failed        +--------------------+-----------------+-> Failed (archived)
//! ```
//!
//! The mannequin stage only runs when the selection has more garments than
//! the render model accepts in one request; it reduces the selection to a
//! single dressed-mannequin image that the render stage then consumes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::config::PipelineConfig;
use atelier_core::job::{Job, JobType, PollOptions};
use atelier_core::selection::{selection_signature, CompositeResult, GarmentItem};
use atelier_core::store::{JobStore, OutfitStore};
use atelier_core::types::RecordId;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::composite::CompositeProducer;
use crate::error::GenerationError;
use crate::poller::JobPoller;
use crate::precompositor::BackgroundPreCompositor;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Reference photos of the person being dressed.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAssets {
    pub body_image: Option<String>,
    pub face_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutfitRenderRequest {
    pub owner_id: RecordId,
    pub outfit_id: RecordId,
    pub items: Vec<GarmentItem>,
    pub references: ReferenceAssets,
}

/// A finished outfit render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// The succeeded `outfit_render` job.
    pub job: Job,
    /// Image produced by the render job.
    pub image_url: String,
    pub working_copy_id: RecordId,
    /// The succeeded `outfit_mannequin` job, when that stage ran.
    pub mannequin_job: Option<Job>,
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tracking {
    generating: bool,
    job_id: Option<RecordId>,
    cancel: Option<CancellationToken>,
    /// Bumped for every accepted run so a stale guard cannot reset a newer one.
    epoch: u64,
}

/// Clears the tracking state when its run ends, unless `cancel()` or a
/// newer run already took over.
struct RunGuard<'a> {
    tracking: &'a Mutex<Tracking>,
    epoch: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut tracking = lock(self.tracking);
        if tracking.epoch == self.epoch {
            tracking.generating = false;
            tracking.job_id = None;
            tracking.cancel = None;
        }
    }
}

fn lock(tracking: &Mutex<Tracking>) -> MutexGuard<'_, Tracking> {
    tracking.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// GenerationOrchestrator
// ---------------------------------------------------------------------------

/// Sequences job stages through a single [`JobPoller`].
///
/// One pipeline may be in flight per orchestrator.
pub struct GenerationOrchestrator {
    jobs: Arc<dyn JobStore>,
    outfits: Arc<dyn OutfitStore>,
    composites: Arc<dyn CompositeProducer>,
    precompositor: Option<Arc<BackgroundPreCompositor>>,
    config: PipelineConfig,
    poller: JobPoller,
    tracking: Mutex<Tracking>,
}

impl GenerationOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        outfits: Arc<dyn OutfitStore>,
        composites: Arc<dyn CompositeProducer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            poller: JobPoller::new(Arc::clone(&jobs)),
            jobs,
            outfits,
            composites,
            precompositor: None,
            config,
            tracking: Mutex::new(Tracking::default()),
        }
    }

    /// Reuse composites prepared in the background for the mannequin stage.
    pub fn with_precompositor(mut self, precompositor: Arc<BackgroundPreCompositor>) -> Self {
        self.precompositor = Some(precompositor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_generating(&self) -> bool {
        lock(&self.tracking).generating
    }

    /// Job of the stage currently being polled.
    pub fn tracked_job(&self) -> Option<RecordId> {
        lock(&self.tracking).job_id
    }

    /// Stop local tracking of the current pipeline.
    ///
    /// The in-flight call returns [`GenerationError::Cancelled`]. The remote
    /// job is not stopped.
    pub async fn cancel(&self) {
        {
            let mut tracking = lock(&self.tracking);
            tracking.generating = false;
            tracking.job_id = None;
            tracking.epoch += 1;
            if let Some(token) = tracking.cancel.take() {
                tracing::info!("Generation cancelled");
                token.cancel();
            }
        }
        self.poller.stop().await;
    }

    /// Render an outfit on the reference person, inserting the mannequin
    /// stage when the selection is too large for the render model.
    pub async fn generate_outfit(
        &self,
        request: OutfitRenderRequest,
    ) -> Result<RenderOutcome, GenerationError> {
        let (_guard, cancel) = self.begin()?;

        let (body_image, face_image) = validate(&request)?;

        let working_copy_id = self.outfits.duplicate_outfit(request.outfit_id).await?;
        tracing::info!(
            outfit_id = %request.outfit_id,
            working_copy_id = %working_copy_id,
            items = request.items.len(),
            "Working copy staged",
        );

        let result = self
            .run_outfit_stages(&request, working_copy_id, body_image, face_image, &cancel)
            .await;

        if let Err(e) = &result {
            tracing::warn!(working_copy_id = %working_copy_id, error = %e, "Outfit generation failed");
            if let Err(archive_err) = self.outfits.archive(working_copy_id).await {
                tracing::error!(
                    working_copy_id = %working_copy_id,
                    error = %archive_err,
                    "Failed to archive working copy",
                );
            }
        }
        result
    }

    /// Run one single-image job (`headshot_generate`, `body_composite` or
    /// `product_shot`) to completion.
    pub async fn run_single(
        &self,
        owner_id: RecordId,
        job_type: JobType,
        input: serde_json::Value,
    ) -> Result<Job, GenerationError> {
        if !job_type.is_single_image() {
            return Err(GenerationError::Validation(format!(
                "{job_type} is not a single-image job"
            )));
        }
        let (_guard, cancel) = self.begin()?;
        self.run_stage(owner_id, job_type, input, self.config.single_image_poll, &cancel)
            .await
    }

    // ---- private helpers ----

    /// Claim the re-entrancy guard for a new run.
    fn begin(&self) -> Result<(RunGuard<'_>, CancellationToken), GenerationError> {
        let mut tracking = lock(&self.tracking);
        if tracking.generating || tracking.job_id.is_some() {
            return Err(GenerationError::AlreadyGenerating);
        }
        tracking.generating = true;
        tracking.epoch += 1;
        let cancel = CancellationToken::new();
        tracking.cancel = Some(cancel.clone());
        Ok((
            RunGuard {
                tracking: &self.tracking,
                epoch: tracking.epoch,
            },
            cancel,
        ))
    }

    async fn run_outfit_stages(
        &self,
        request: &OutfitRenderRequest,
        working_copy_id: RecordId,
        body_image: &str,
        face_image: &str,
        cancel: &CancellationToken,
    ) -> Result<RenderOutcome, GenerationError> {
        let category_ids: Vec<String> = request
            .items
            .iter()
            .filter_map(|item| item.category_id.clone())
            .collect();
        let categories = if category_ids.is_empty() {
            Vec::new()
        } else {
            self.outfits.category_names(&category_ids).await?
        };

        let model = &self.config.render_model;
        let mut mannequin_job = None;
        let mut garments = json!({
            "item_images": request.items.iter().map(|i| i.image_url.as_str()).collect::<Vec<_>>(),
        });

        if model.needs_mannequin(request.items.len()) {
            tracing::info!(
                items = request.items.len(),
                max_items = model.max_items,
                model = %model.name,
                "Selection exceeds model limit, running mannequin stage",
            );
            let composite = self.obtain_composite(request).await?;
            let input = json!({
                "outfit_id": working_copy_id,
                "composite_url": composite.public_url,
                "composite_path": composite.storage_key,
                "item_count": request.items.len(),
                "categories": categories,
                "model": model.name,
            });
            let job = self
                .run_stage(
                    request.owner_id,
                    JobType::OutfitMannequin,
                    input,
                    self.config.mannequin_poll,
                    cancel,
                )
                .await?;
            let image = job.output_image().ok_or_else(|| GenerationError::JobFailed {
                stage: JobType::OutfitMannequin,
                message: "mannequin job succeeded without an output image".to_string(),
                code: None,
            })?;
            garments = json!({ "mannequin_image": image });
            mannequin_job = Some(job);
        }

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let mut input = json!({
            "outfit_id": working_copy_id,
            "body_image": body_image,
            "face_image": face_image,
            "categories": categories,
            "model": model.name,
        });
        if let (Some(input), Some(garments)) = (input.as_object_mut(), garments.as_object()) {
            input.extend(garments.clone());
        }

        let job = self
            .run_stage(
                request.owner_id,
                JobType::OutfitRender,
                input,
                self.config.render_poll,
                cancel,
            )
            .await?;
        let image_url = job
            .output_image()
            .ok_or_else(|| GenerationError::JobFailed {
                stage: JobType::OutfitRender,
                message: "render job succeeded without an output image".to_string(),
                code: None,
            })?
            .to_string();

        tracing::info!(job_id = %job.id, working_copy_id = %working_copy_id, "Outfit render succeeded");
        Ok(RenderOutcome {
            job,
            image_url,
            working_copy_id,
            mannequin_job,
        })
    }

    /// Composite prepared in the background for this exact selection, or a
    /// fresh one.
    async fn obtain_composite(
        &self,
        request: &OutfitRenderRequest,
    ) -> Result<CompositeResult, GenerationError> {
        let signature = selection_signature(&request.items);
        if let Some(pre) = &self.precompositor {
            if let Some(hit) = pre.take_stored_or_await_pending(&signature).await {
                tracing::debug!(path = %hit.storage_key, "Using pre-computed composite");
                return Ok(hit);
            }
        }
        tracing::debug!("Compositing on demand");
        Ok(self
            .composites
            .produce(request.owner_id, &request.items)
            .await?)
    }

    /// Create, trigger and poll one job until it is terminal.
    async fn run_stage(
        &self,
        owner_id: RecordId,
        job_type: JobType,
        input: serde_json::Value,
        options: PollOptions,
        cancel: &CancellationToken,
    ) -> Result<Job, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let job = self.jobs.create_job(owner_id, job_type, input).await?;
        {
            let mut tracking = lock(&self.tracking);
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            tracking.job_id = Some(job.id);
        }
        tracing::info!(job_id = %job.id, stage = %job_type, "Stage job created");

        if let Err(e) = self.jobs.trigger_execution(job.id).await {
            tracing::warn!(
                job_id = %job.id,
                stage = %job_type,
                error = %e,
                "Trigger call failed, polling anyway",
            );
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            outcome = self.poller.wait_for_terminal(job.id, options) => outcome,
        };

        outcome.map_err(|e| GenerationError::from_poll(job_type, e))
    }
}

/// Reference photos and a non-empty selection are required before any
/// remote call.
fn validate(request: &OutfitRenderRequest) -> Result<(&str, &str), GenerationError> {
    fn present(s: &Option<String>) -> Option<&str> {
        s.as_deref().filter(|s| !s.trim().is_empty())
    }

    let body = present(&request.references.body_image).ok_or_else(|| {
        GenerationError::Validation("Add a full-body reference photo before generating.".into())
    })?;
    let face = present(&request.references.face_image).ok_or_else(|| {
        GenerationError::Validation("Add a face reference photo before generating.".into())
    })?;
    if request.items.is_empty() {
        return Err(GenerationError::Validation(
            "Select at least one garment to generate an outfit.".into(),
        ));
    }
    Ok((body, face))
}
