use std::time::Duration;

use atelier_core::error::CoreError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the REST backend.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL without a trailing slash, e.g. `https://project.example.co`.
    pub api_url: String,
    /// Key sent as both `apikey` and bearer token.
    pub api_key: String,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `ATELIER_API_URL`      | (required) |
    /// | `ATELIER_API_KEY`      | (required) |
    /// | `REQUEST_TIMEOUT_SECS` | `30`       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CoreError::Config(format!("{key} must be set")))
        };

        let api_url = required("ATELIER_API_URL")?;
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "ATELIER_API_URL must be an http(s) URL, got {api_url:?}"
            )));
        }
        let api_key = required("ATELIER_API_KEY")?;

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    CoreError::Config(format!(
                        "REQUEST_TIMEOUT_SECS must be a positive integer, got {raw:?}"
                    ))
                })?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            request_timeout,
            ..Self::new(api_url, api_key)
        })
    }
}
