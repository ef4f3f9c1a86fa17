use thiserror::Error;

/// Converts into `ProxyError` at the crate boundary (§7).
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("{0}")]
    MalformedInput(String),

    #[error("file too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Store(#[from] proxy_store::StoreError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AttachmentError>;

impl From<AttachmentError> for proxy_core::ProxyError {
    fn from(e: AttachmentError) -> Self {
        match e {
            AttachmentError::MalformedInput(m) => proxy_core::ProxyError::MalformedInput(m),
            AttachmentError::PayloadTooLarge { size, max } => proxy_core::ProxyError::PayloadTooLarge { size, max },
            AttachmentError::UnsupportedMediaType(m) => proxy_core::ProxyError::UnsupportedMediaType(m),
            AttachmentError::Store(e) => e.into(),
            AttachmentError::Io(e) => proxy_core::ProxyError::Internal(e.to_string()),
        }
    }
}
