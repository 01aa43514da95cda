/// Failures while loading, drawing, encoding or shipping a composite.
#[derive(Debug, thiserror::Error)]
pub enum CompositingError {
    /// A source image could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The composite could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// A source image could not be downloaded.
    #[error("Failed to fetch source image {url}: {message}")]
    Fetch { url: String, message: String },

    /// The finished composite could not be uploaded.
    #[error("Failed to upload composite: {0}")]
    Upload(String),

    /// The compositing task was aborted before producing a result.
    #[error("Compositing task aborted: {0}")]
    Task(String),
}
