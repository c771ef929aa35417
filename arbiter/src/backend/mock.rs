//! Mock arbiter backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;
use crate::types::{ArbitrationRequest, Ruling, Verdict};

/// Mock backend for testing.
///
/// Returns a fixed verdict, or fails, optionally after a delay.
pub struct MockArbiter {
    model_id: String,
    available: AtomicBool,
    verdict: Verdict,
    failure: Option<String>,
    delay: Option<Duration>,
    call_count: AtomicU32,
    last_request: Mutex<Option<ArbitrationRequest>>,
}

impl MockArbiter {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            verdict: Verdict::new(Ruling::Split, 0.5, "Mock verdict"),
            failure: None,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Set the verdict returned by `arbitrate`.
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self
    }

    /// Make every call fail with a request error.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Get the number of times arbitrate was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The most recent request received.
    pub async fn last_request(&self) -> Option<ArbitrationRequest> {
        self.last_request.lock().await.clone()
    }
}

impl Default for MockArbiter {
    fn default() -> Self {
        Self::new("mock-arbiter")
    }
}

#[async_trait]
impl ArbiterBackend for MockArbiter {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Verdict, ArbiterError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().await = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(ArbiterError::Unavailable("Mock arbiter disabled".to_string()));
        }

        if let Some(message) = &self.failure {
            return Err(ArbiterError::RequestFailed(message.clone()));
        }

        Ok(self.verdict.clone().with_arbiter(&self.model_id))
    }
}
