use thiserror::Error;

/// Errors raised by the embedded datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Unique violation on `users.email` or `users.external_subject` (§4.1).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for proxy_core::ProxyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => proxy_core::ProxyError::NotFound(what),
            StoreError::Conflict(what) => proxy_core::ProxyError::Conflict(what),
            StoreError::Database(e) => proxy_core::ProxyError::Database(e),
        }
    }
}
