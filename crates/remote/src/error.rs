use atelier_core::error::StoreError;

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl From<RemoteError> for StoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Request(e) if e.is_decode() => StoreError::Decode(e.to_string()),
            RemoteError::Request(e) => StoreError::Transport(e.to_string()),
            RemoteError::Api { status, body } => StoreError::Status { status, body },
            RemoteError::Unexpected(msg) => StoreError::Decode(msg),
        }
    }
}
