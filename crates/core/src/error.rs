use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index dimension {stored} does not match embedding dimension {requested}")]
    DimensionMismatch { stored: usize, requested: usize },

    #[error("vector count {vectors} does not match metadata count {metadata}")]
    AlignmentViolation { vectors: usize, metadata: usize },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("session id is required for student uploads")]
    MissingSessionId,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("provider failed: {0}")]
    Provider(#[from] ProviderError),
}
