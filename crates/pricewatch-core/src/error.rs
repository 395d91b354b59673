use thiserror::Error;

/// Application-wide error types for Pricewatch.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (non-success status, unreadable body, bad URL).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The rendering engine failed (browser launch, tab, DOM read).
    #[error("Render error: {0}")]
    RenderError(String),

    /// Reading or writing the response cache failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A crawl was requested for a source no adapter is registered for.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// The operation was aborted by a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error came from the network or fetch layer.
    ///
    /// Fetch-level errors halt a single pagination branch; everything else
    /// is reported through its own scope.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RenderError(_)
        )
    }
}
