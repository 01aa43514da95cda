//! Contracts of the external collaborators the generation core drives.
//!
//! The core never talks to the network directly; it only sees these
//! traits. `atelier-remote` implements all of them over HTTP.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::{Job, JobType};
use crate::types::RecordId;

/// Job persistence and remote execution.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `queued` status.
    async fn create_job(
        &self,
        owner_id: RecordId,
        job_type: JobType,
        input: serde_json::Value,
    ) -> Result<Job, StoreError>;

    /// Ask the remote worker to start a job.
    ///
    /// A transport failure here does not mean the worker did not start.
    async fn trigger_execution(&self, job_id: RecordId) -> Result<(), StoreError>;

    /// Read the current job state, bypassing any caching layer.
    async fn get_job_fresh(&self, job_id: RecordId) -> Result<Job, StoreError>;
}

/// Blob storage for composites.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `bytes` to `bucket/path`, returning the stored path.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Displayable URL for a stored object.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Outfit records the pipeline renders against.
#[async_trait]
pub trait OutfitStore: Send + Sync {
    /// Create a private working copy of an outfit, returning its id.
    async fn duplicate_outfit(&self, outfit_id: RecordId) -> Result<RecordId, StoreError>;

    /// Soft-delete a record.
    async fn archive(&self, record_id: RecordId) -> Result<(), StoreError>;

    /// Resolve display names for garment categories, in input order.
    async fn category_names(&self, category_ids: &[String]) -> Result<Vec<String>, StoreError>;
}

/// Source image download.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError>;
}
