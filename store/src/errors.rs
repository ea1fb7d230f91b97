use thiserror::Error;

/// The error taxonomy from §7: each component returns its narrowest kind
/// internally, and the service facade re-wraps internal I/O/SQLite errors
/// into `Internal` with a short diagnostic, logging the underlying cause
/// and never leaking filesystem paths or SQL text to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    // --- client-caused ---
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid hash: {0}")]
    InvalidHash(String),
    #[error("invalid topic name: {0}")]
    InvalidTopicName(String),
    #[error("missing required parameter: {0}")]
    MissingParam(String),
    #[error("invalid filename")]
    InvalidFilenameFormat,
    #[error("metadata key too long")]
    MetadataKeyTooLong,
    #[error("metadata value too long")]
    MetadataValueTooLong,
    #[error("invalid batch operation: {0}")]
    BatchInvalidOperation(String),
    #[error("asset too large")]
    AssetTooLarge,
    #[error("parent asset not found")]
    ParentNotFound,

    // --- state ---
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),
    #[error("topic is unhealthy")]
    TopicUnhealthy,
    #[error("asset not found")]
    AssetNotFound,
    #[error("preset not found: {0}")]
    PresetNotFound(String),
    #[error("disk limit exceeded")]
    DiskLimitExceeded,
    #[error("not configured")]
    NotConfigured,

    // --- internal ---
    #[error("internal error: {0}")]
    Internal(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("metadata error: {0}")]
    MetadataError(String),
    #[error("streaming error: {0}")]
    StreamingError(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        tracing::error!(error = %e, "internal I/O error");
        ServiceError::Internal("I/O failure".to_string())
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!(error = %e, "internal SQLite error");
        ServiceError::Internal("database failure".to_string())
    }
}

impl From<meshhub_castore::DigestError> for ServiceError {
    fn from(e: meshhub_castore::DigestError) -> Self {
        ServiceError::InvalidHash(e.to_string())
    }
}
