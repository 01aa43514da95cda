//! Shared HTTP plumbing for the REST backend.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// HTTP client for the generation backend.
///
/// Implements [`JobStore`](atelier_core::store::JobStore),
/// [`BlobStore`](atelier_core::store::BlobStore),
/// [`OutfitStore`](atelier_core::store::OutfitStore) and
/// [`ImageSource`](atelier_core::store::ImageSource).
#[derive(Clone)]
pub struct RemoteClient {
    pub(crate) http: reqwest::Client,
    pub(crate) api_url: String,
}

impl RemoteClient {
    /// Build a client with auth headers attached to every request.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| RemoteError::Unexpected("API key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| RemoteError::Unexpected("API key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_client(http, &config.api_url))
    }

    /// Reuse an existing [`reqwest::Client`]; auth headers are the caller's
    /// responsibility.
    pub fn with_client(http: reqwest::Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- crate helpers ----

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.api_url)
    }

    pub(crate) fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.api_url)
    }

    pub(crate) fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.api_url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or [`RemoteError::Api`] with the
    /// status and body text on failure.
    pub(crate) async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    pub(crate) async fn check_status(response: reqwest::Response) -> Result<(), RemoteError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// First row of a PostgREST-style row set.
pub(crate) fn single_row<T>(rows: Vec<T>, what: &str) -> Result<T, RemoteError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| RemoteError::Unexpected(format!("no {what} row returned")))
}
