//! In-memory collaborators shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::error::StoreError;
use atelier_core::job::{Job, JobStatus, JobType};
use atelier_core::selection::{selection_signature, CompositeResult, GarmentItem};
use atelier_core::store::{BlobStore, ImageSource, JobStore, OutfitStore};
use atelier_core::types::RecordId;
use atelier_imaging::CompositingError;
use atelier_pipeline::composite::CompositeProducer;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// What the fake returns for one status read.
#[derive(Debug, Clone)]
pub enum Step {
    Status(JobStatus),
    Fail(&'static str),
    TransportError,
}

#[derive(Default)]
struct JobsInner {
    scripts: HashMap<JobType, Vec<Step>>,
    jobs: HashMap<RecordId, Job>,
    reads: HashMap<RecordId, usize>,
    created: Vec<(JobType, serde_json::Value)>,
    triggered: Vec<RecordId>,
}

/// Job store whose status reads follow a per-type script. The last step
/// repeats once the script runs out; an unscripted type succeeds at once.
#[derive(Default)]
pub struct FakeJobStore {
    inner: Mutex<JobsInner>,
    fail_triggers: AtomicBool,
}

impl FakeJobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job_type: JobType, steps: Vec<Step>) {
        self.inner.lock().unwrap().scripts.insert(job_type, steps);
    }

    pub fn fail_triggers(&self) {
        self.fail_triggers.store(true, Ordering::SeqCst);
    }

    /// Insert a queued job without going through `create_job`.
    pub fn insert(&self, job_type: JobType) -> RecordId {
        let job = queued_job(job_type, serde_json::json!({}));
        let id = job.id;
        self.inner.lock().unwrap().jobs.insert(id, job);
        id
    }

    pub fn reads(&self, job_id: RecordId) -> usize {
        self.inner.lock().unwrap().reads.get(&job_id).copied().unwrap_or(0)
    }

    pub fn created_types(&self) -> Vec<JobType> {
        self.inner.lock().unwrap().created.iter().map(|(t, _)| *t).collect()
    }

    pub fn input_of(&self, job_type: JobType) -> Option<serde_json::Value> {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .find(|(t, _)| *t == job_type)
            .map(|(_, input)| input.clone())
    }

    pub fn triggered(&self) -> usize {
        self.inner.lock().unwrap().triggered.len()
    }
}

fn queued_job(job_type: JobType, input: serde_json::Value) -> Job {
    Job {
        id: Uuid::new_v4(),
        owner_id: Uuid::nil(),
        job_type,
        status: JobStatus::Queued,
        input,
        result: None,
        error: None,
        error_code: None,
        created_at: chrono::Utc::now(),
        feedback_at: None,
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn create_job(
        &self,
        owner_id: RecordId,
        job_type: JobType,
        input: serde_json::Value,
    ) -> Result<Job, StoreError> {
        let mut job = queued_job(job_type, input.clone());
        job.owner_id = owner_id;
        let mut inner = self.inner.lock().unwrap();
        inner.created.push((job_type, input));
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn trigger_execution(&self, job_id: RecordId) -> Result<(), StoreError> {
        self.inner.lock().unwrap().triggered.push(job_id);
        if self.fail_triggers.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("gateway timeout".into()));
        }
        Ok(())
    }

    async fn get_job_fresh(&self, job_id: RecordId) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let read = {
            let count = inner.reads.entry(job_id).or_insert(0);
            *count += 1;
            *count
        };
        let mut job = inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        let step = inner
            .scripts
            .get(&job.job_type)
            .and_then(|steps| steps.get(read - 1).or(steps.last()))
            .cloned()
            .unwrap_or(Step::Status(JobStatus::Succeeded));

        match step {
            Step::TransportError => return Err(StoreError::Transport("connection reset".into())),
            Step::Status(status) => job.status = status,
            Step::Fail(message) => {
                job.status = JobStatus::Failed;
                job.error = Some(message.to_string());
            }
        }
        if job.status == JobStatus::Succeeded {
            job.result = Some(serde_json::json!({
                "image_url": format!("https://cdn.test/{}/{}.png", job.job_type, job.id),
            }));
        }
        inner.jobs.insert(job_id, job.clone());
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Outfits
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeOutfitStore {
    pub duplicated: Mutex<Vec<RecordId>>,
    pub archived: Mutex<Vec<RecordId>>,
}

impl FakeOutfitStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn duplicates(&self) -> Vec<RecordId> {
        self.duplicated.lock().unwrap().clone()
    }

    pub fn archives(&self) -> Vec<RecordId> {
        self.archived.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutfitStore for FakeOutfitStore {
    async fn duplicate_outfit(&self, _outfit_id: RecordId) -> Result<RecordId, StoreError> {
        let id = Uuid::new_v4();
        self.duplicated.lock().unwrap().push(id);
        Ok(id)
    }

    async fn archive(&self, record_id: RecordId) -> Result<(), StoreError> {
        self.archived.lock().unwrap().push(record_id);
        Ok(())
    }

    async fn category_names(&self, category_ids: &[String]) -> Result<Vec<String>, StoreError> {
        Ok(category_ids.iter().map(|id| format!("category {id}")).collect())
    }
}

// ---------------------------------------------------------------------------
// Blobs and images
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBlobStore {
    pub uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl FakeBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        self.uploads
            .lock()
            .unwrap()
            .push((bucket.to_string(), path.to_string(), bytes));
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://blobs.test/{bucket}/{path}")
    }
}

/// Serves a small PNG for every URL, except ones containing `broken`.
#[derive(Default)]
pub struct FakeImageSource;

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        if url.contains("broken") {
            return Err(StoreError::Status {
                status: 404,
                body: "not found".into(),
            });
        }
        Ok(png(40, 60, [30, 60, 90]))
    }
}

/// A white PNG with a centered colored block.
pub fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
        if inside {
            image::Rgba([color[0], color[1], color[2], 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

/// Records every selection it is asked to composite; takes `delay` of
/// simulated time per call.
#[derive(Default)]
pub struct FakeProducer {
    pub calls: AtomicUsize,
    pub selections: Mutex<Vec<String>>,
    pub delay: Duration,
    pub fail: bool,
}

impl FakeProducer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompositeProducer for FakeProducer {
    async fn produce(
        &self,
        owner_id: RecordId,
        items: &[GarmentItem],
    ) -> Result<CompositeResult, CompositingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let signature = selection_signature(items);
        self.selections.lock().unwrap().push(signature.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(CompositingError::Decode("bad source".into()));
        }
        Ok(CompositeResult {
            storage_key: format!("{owner_id}/{}.jpg", signature.replace(',', "_")),
            public_url: format!("https://blobs.test/composites/{owner_id}/grid.jpg"),
            selection_signature: signature,
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn items(ids: &[&str]) -> Vec<GarmentItem> {
    ids.iter()
        .map(|id| GarmentItem::new(*id, format!("https://img.test/{id}.png")))
        .collect()
}

pub fn numbered_items(n: usize) -> Vec<GarmentItem> {
    (0..n)
        .map(|i| {
            GarmentItem::new(format!("g{i}"), format!("https://img.test/g{i}.png"))
                .with_category(format!("c{}", i % 3))
        })
        .collect()
}
