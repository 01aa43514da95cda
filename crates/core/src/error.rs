#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors returned by the external collaborators in [`crate::store`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request never produced a response (network, DNS, TLS, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status code.
    #[error("Backend error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    /// The backend answered, but the payload could not be interpreted.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}
