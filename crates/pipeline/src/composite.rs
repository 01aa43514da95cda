//! Fetch, compose and upload a garment grid for a selection.

use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::selection::{selection_signature, CompositeResult, GarmentItem};
use atelier_core::store::{BlobStore, ImageSource};
use atelier_core::types::RecordId;
use atelier_imaging::{CompositingError, GridComposer};
use base64::Engine;
use sha2::{Digest, Sha256};

/// MIME type of uploaded composites.
const COMPOSITE_CONTENT_TYPE: &str = "image/jpeg";

/// Length of the hashed signature used in composite file names.
const COMPOSITE_KEY_LEN: usize = 32;

/// Produces an uploaded composite for a selection.
#[async_trait]
pub trait CompositeProducer: Send + Sync {
    async fn produce(
        &self,
        owner_id: RecordId,
        items: &[GarmentItem],
    ) -> Result<CompositeResult, CompositingError>;
}

/// Storage path of the composite for `signature`, scoped to the owner.
pub fn composite_path(owner_id: RecordId, signature: &str) -> String {
    let hash = Sha256::digest(signature.as_bytes());
    let hex = format!("{hash:x}");
    format!("{owner_id}/{}.jpg", &hex[..COMPOSITE_KEY_LEN])
}

/// Base64 form of an encoded composite, for workers that take inline images.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// [`CompositeProducer`] backed by [`GridComposer`].
///
/// Sources are downloaded concurrently; composition runs on the
/// blocking pool since it is CPU-bound.
pub struct GridCompositeProducer {
    images: Arc<dyn ImageSource>,
    blobs: Arc<dyn BlobStore>,
    bucket: String,
    composer: GridComposer,
}

impl GridCompositeProducer {
    pub fn new(
        images: Arc<dyn ImageSource>,
        blobs: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        composer: GridComposer,
    ) -> Self {
        Self {
            images,
            blobs,
            bucket: bucket.into(),
            composer,
        }
    }

    /// Download every source and compose them, without uploading.
    pub async fn compose(&self, items: &[GarmentItem]) -> Result<Vec<u8>, CompositingError> {
        let sources = futures::future::try_join_all(items.iter().map(|item| self.fetch(item))).await?;

        let composer = self.composer.clone();
        tokio::task::spawn_blocking(move || composer.compose_encoded(&sources))
            .await
            .map_err(|e| CompositingError::Task(e.to_string()))?
    }

    async fn fetch(&self, item: &GarmentItem) -> Result<Vec<u8>, CompositingError> {
        self.images
            .fetch(&item.image_url)
            .await
            .map_err(|e| CompositingError::Fetch {
                url: item.image_url.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl CompositeProducer for GridCompositeProducer {
    async fn produce(
        &self,
        owner_id: RecordId,
        items: &[GarmentItem],
    ) -> Result<CompositeResult, CompositingError> {
        let signature = selection_signature(items);
        let jpeg = self.compose(items).await?;
        let size_bytes = jpeg.len();

        let path = composite_path(owner_id, &signature);
        let stored = self
            .blobs
            .upload(&self.bucket, &path, jpeg, COMPOSITE_CONTENT_TYPE)
            .await
            .map_err(|e| CompositingError::Upload(e.to_string()))?;
        let public_url = self.blobs.public_url(&self.bucket, &stored);

        tracing::info!(
            owner_id = %owner_id,
            items = items.len(),
            size_bytes,
            path = %stored,
            "Composite uploaded",
        );

        Ok(CompositeResult {
            selection_signature: signature,
            storage_key: stored,
            public_url,
        })
    }
}
