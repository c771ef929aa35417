//! Core trait for arbiter backends.

use async_trait::async_trait;

use crate::types::{ArbitrationRequest, Verdict};

/// Error types for arbiter operations.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    /// Backend is not available
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The backend answered with something that is not a verdict
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Client construction failed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// An external service that suggests a ruling for a dispute.
///
/// The verdict is advisory; callers decide whether to apply it.
#[async_trait]
pub trait ArbiterBackend: Send + Sync {
    /// Backend identifier (e.g., model name).
    fn id(&self) -> &str;

    /// Check if the backend is currently available.
    async fn is_available(&self) -> bool;

    /// Judge a dispute.
    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Verdict, ArbiterError>;
}
