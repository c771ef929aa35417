//! ArbiterService - entry point for requesting advisory rulings.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::backend::{ArbiterBackend, ArbiterError};
use crate::types::{ArbitrationRequest, Verdict};

/// Error types for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No backend available
    #[error("No arbiter backend available")]
    NoBackendAvailable,

    /// Backend did not answer in time
    #[error("Arbiter timed out after {0}ms")]
    Timeout(u64),

    /// Backend error
    #[error("Backend error: {0}")]
    Backend(#[from] ArbiterError),

    /// Backend answered with an unusable verdict
    #[error("Invalid verdict: {0}")]
    InvalidVerdict(String),
}

/// Configuration for the ArbiterService.
#[derive(Debug, Clone)]
pub struct ArbiterServiceConfig {
    /// Timeout per arbitration (ms)
    pub timeout_ms: u64,
    /// Whether to log all requests
    pub audit_enabled: bool,
    /// Upper bound on the stake a verdict may carry
    pub max_ai_stake: u64,
}

impl Default for ArbiterServiceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            audit_enabled: true,
            max_ai_stake: 100,
        }
    }
}

/// Selects a backend and returns validated verdicts.
pub struct ArbiterService {
    config: ArbiterServiceConfig,
    backends: Vec<Arc<dyn ArbiterBackend>>,
    audit: Arc<AuditLog>,
}

impl ArbiterService {
    /// Create a new service with the given backends, in preference order.
    pub fn new(backends: Vec<Arc<dyn ArbiterBackend>>) -> Self {
        Self {
            config: ArbiterServiceConfig::default(),
            backends,
            audit: Arc::new(AuditLog::new()),
        }
    }

    pub fn with_config(mut self, config: ArbiterServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ArbiterServiceConfig {
        &self.config
    }

    /// Request a verdict for a dispute.
    ///
    /// The stake on the returned verdict is capped at `max_ai_stake`.
    pub async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Verdict, ServiceError> {
        let entry_id = if self.config.audit_enabled {
            Some(self.audit.log_request(request).await)
        } else {
            None
        };

        debug!(
            request_id = %request.request_id,
            dispute_id = %request.dispute_id,
            "Requesting arbitration"
        );

        let result = self.run(request).await;

        if let Some(entry_id) = entry_id {
            match &result {
                Ok(verdict) => self.audit.log_verdict(&entry_id, verdict).await,
                Err(e) => self.audit.log_failure(&entry_id, None, e.to_string()).await,
            }
        }

        match &result {
            Ok(verdict) => info!(
                dispute_id = %request.dispute_id,
                ruling = verdict.ruling.as_str(),
                confidence = verdict.confidence_score,
                ai_stake = verdict.ai_stake,
                arbiter = %verdict.arbiter_id,
                "Arbiter verdict received"
            ),
            Err(e) => warn!(dispute_id = %request.dispute_id, error = %e, "Arbitration failed"),
        }

        result
    }

    async fn run(&self, request: &ArbitrationRequest) -> Result<Verdict, ServiceError> {
        let backend = self.select_backend().await?;
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let verdict = tokio::time::timeout(timeout, backend.arbitrate(request))
            .await
            .map_err(|_| ServiceError::Timeout(self.config.timeout_ms))??;

        self.validate(verdict, backend.id())
    }

    fn validate(&self, mut verdict: Verdict, backend_id: &str) -> Result<Verdict, ServiceError> {
        let confidence = verdict.confidence_score;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ServiceError::InvalidVerdict(format!(
                "confidence_score {} outside [0, 1]",
                verdict.confidence_score
            )));
        }

        if verdict.ai_stake > self.config.max_ai_stake {
            debug!(
                requested = verdict.ai_stake,
                cap = self.config.max_ai_stake,
                "Capping arbiter stake"
            );
            verdict.ai_stake = self.config.max_ai_stake;
        }

        if verdict.arbiter_id.is_empty() {
            verdict.arbiter_id = backend_id.to_string();
        }

        Ok(verdict)
    }

    /// Get recent audit entries.
    pub async fn get_audit_log(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent(limit).await
    }

    /// Select the first available backend.
    async fn select_backend(&self) -> Result<Arc<dyn ArbiterBackend>, ServiceError> {
        for backend in &self.backends {
            if backend.is_available().await {
                return Ok(Arc::clone(backend));
            }
        }
        Err(ServiceError::NoBackendAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockArbiter;
    use crate::types::{BountyMetadata, EvidenceBundle, Ruling};
    use tokio_test::{assert_err, assert_ok};

    fn request() -> ArbitrationRequest {
        ArbitrationRequest::new(
            "bounty-1",
            "dispute-1",
            EvidenceBundle::default(),
            EvidenceBundle::default(),
            BountyMetadata::default(),
        )
    }

    #[tokio::test]
    async fn test_first_available_backend_wins() {
        let down = Arc::new(MockArbiter::new("down").with_available(false));
        let up = Arc::new(
            MockArbiter::new("up")
                .with_verdict(Verdict::new(Ruling::GuildWins, 0.9, "ok").with_stake(500)),
        );
        let service = ArbiterService::new(vec![down.clone(), up.clone()]);

        let verdict = assert_ok!(service.arbitrate(&request()).await);
        assert_eq!(verdict.arbiter_id, "up");
        assert_eq!(verdict.ai_stake, 100);
        assert_eq!(down.call_count(), 0);
        assert_eq!(up.call_count(), 1);

        let audit = service.get_audit_log(10).await;
        assert_eq!(audit.len(), 1);
        assert!(audit[0].outcome.is_some());
    }

    #[tokio::test]
    async fn test_no_backend() {
        let down = Arc::new(MockArbiter::new("down").with_available(false));
        let service = ArbiterService::new(vec![down]);
        let err = assert_err!(service.arbitrate(&request()).await);
        assert!(matches!(err, ServiceError::NoBackendAvailable));
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = Arc::new(MockArbiter::new("slow").with_delay(Duration::from_millis(200)));
        let service = ArbiterService::new(vec![slow]).with_config(ArbiterServiceConfig {
            timeout_ms: 20,
            ..Default::default()
        });

        let err = assert_err!(service.arbitrate(&request()).await);
        assert!(matches!(err, ServiceError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_confidence() {
        let odd = Arc::new(
            MockArbiter::new("odd").with_verdict(Verdict::new(Ruling::Split, 1.5, "sure")),
        );
        let service = ArbiterService::new(vec![odd]);

        let err = assert_err!(service.arbitrate(&request()).await);
        assert!(matches!(err, ServiceError::InvalidVerdict(_)));
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let broken = Arc::new(MockArbiter::new("broken").with_failure("boom"));
        let service = ArbiterService::new(vec![broken]);

        let err = assert_err!(service.arbitrate(&request()).await);
        assert!(matches!(err, ServiceError::Backend(ArbiterError::RequestFailed(_))));
    }
}
