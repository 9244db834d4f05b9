// src/error.rs
// Error taxonomy for the memory service

use thiserror::Error;

/// Errors raised by embedding providers. Everything except `RateLimit` is
/// retryable; rate limits are surfaced immediately so callers can back off
/// with the server-provided delay.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rate limited (retry after {retry_after_secs}s)")]
    RateLimit {
        provider: String,
        retry_after_secs: u64,
    },

    #[error("{provider} request timed out after {timeout_secs}s")]
    Timeout {
        provider: String,
        timeout_secs: u64,
    },

    #[error("failed to connect to {provider}: {message}")]
    Connect { provider: String, message: String },

    #[error("{provider} returned status {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {provider}: {message}")]
    BadResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::RateLimit { .. })
    }
}

/// Top-level error type for the memory core.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Bad caller input: empty text, out-of-range similarity, missing tenant
    /// key. Mapped to 4xx at the HTTP edge.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("vector store: {0}")]
    VectorStore(String),

    #[error("primary store: {0}")]
    PrimaryStore(#[from] sqlx::Error),

    #[error("primary store: {0}")]
    PrimaryStoreInternal(#[from] anyhow::Error),

    #[error("classifier: {0}")]
    Classifier(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_not_retryable() {
        let err = ProviderError::RateLimit {
            provider: "google".into(),
            retry_after_secs: 2,
        };
        assert!(!err.is_retryable());

        let err = ProviderError::Timeout {
            provider: "google".into(),
            timeout_secs: 30,
        };
        assert!(err.is_retryable());
    }
}
