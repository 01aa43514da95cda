//! Object storage uploads and source image downloads.

use async_trait::async_trait;
use atelier_core::error::StoreError;
use atelier_core::store::{BlobStore, ImageSource};
use reqwest::header::CONTENT_TYPE;

use crate::client::RemoteClient;
use crate::error::RemoteError;

#[async_trait]
impl BlobStore for RemoteClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let size_bytes = bytes.len();
        let response = self
            .http
            .post(self.object_url(bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(RemoteError::from)?;

        Self::check_status(response).await?;
        tracing::debug!(bucket, path, size_bytes, "Object uploaded");
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.api_url)
    }
}

#[async_trait]
impl ImageSource for RemoteClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(RemoteError::from)?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(RemoteError::from)?;
        Ok(bytes.to_vec())
    }
}
