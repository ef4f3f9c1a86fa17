use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("daily quota exceeded")]
    Exceeded,
}

pub type Result<T> = std::result::Result<T, QuotaError>;

impl From<QuotaError> for proxy_core::ProxyError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded => proxy_core::ProxyError::QuotaExceeded,
        }
    }
}
