//! Audit trail for arbiter invocations.
//!
//! Every request is recorded together with the evidence digests it was
//! judged on, so a verdict can later be matched to the exact evidence.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{ArbitrationRequest, Ruling, Verdict};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// How an arbitration attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Verdict { ruling: Ruling, ai_stake: u64 },
    Failed(String),
}

/// An entry in the audit log.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub entry_id: String,
    pub request_id: String,
    pub dispute_id: String,
    pub client_evidence_digest: String,
    pub guild_evidence_digest: String,
    /// Backend that handled the request
    pub arbiter_id: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub confidence_score: Option<f32>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Create an entry from a request.
    pub fn from_request(request: &ArbitrationRequest) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            request_id: request.request_id.clone(),
            dispute_id: request.dispute_id.clone(),
            client_evidence_digest: request.client_evidence.digest(),
            guild_evidence_digest: request.guild_evidence.digest(),
            arbiter_id: None,
            outcome: None,
            confidence_score: None,
            requested_at: request.requested_at,
            responded_at: None,
            duration_ms: None,
        }
    }

    fn close(&mut self, arbiter_id: Option<&str>, outcome: AuditOutcome) {
        let now = Utc::now();
        self.arbiter_id = arbiter_id.map(str::to_string);
        self.outcome = Some(outcome);
        self.responded_at = Some(now);
        self.duration_ms = Some((now - self.requested_at).num_milliseconds().max(0) as u64);
    }
}

/// Audit log of arbiter invocations, newest first.
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Log a request (before processing).
    pub async fn log_request(&self, request: &ArbitrationRequest) -> String {
        let entry = AuditEntry::from_request(request);
        let entry_id = entry.entry_id.clone();

        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }

        entry_id
    }

    /// Record the verdict for an entry.
    pub async fn log_verdict(&self, entry_id: &str, verdict: &Verdict) {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.confidence_score = Some(verdict.confidence_score);
            entry.close(
                Some(&verdict.arbiter_id),
                AuditOutcome::Verdict {
                    ruling: verdict.ruling,
                    ai_stake: verdict.ai_stake,
                },
            );
        }
    }

    /// Record a failure for an entry.
    pub async fn log_failure(
        &self,
        entry_id: &str,
        arbiter_id: Option<&str>,
        reason: impl Into<String>,
    ) {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.close(arbiter_id, AuditOutcome::Failed(reason.into()));
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entry by request ID.
    pub async fn get_by_request(&self, request_id: &str) -> Option<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.request_id == request_id).cloned()
    }

    /// Get entries for a dispute.
    pub async fn get_by_dispute(&self, dispute_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.dispute_id == dispute_id)
            .cloned()
            .collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let total = entries.len();
        let verdicts = entries
            .iter()
            .filter(|e| matches!(e.outcome, Some(AuditOutcome::Verdict { .. })))
            .count();
        let failures = entries
            .iter()
            .filter(|e| matches!(e.outcome, Some(AuditOutcome::Failed(_))))
            .count();

        let avg_duration_ms = if total > 0 {
            entries.iter().filter_map(|e| e.duration_ms).sum::<u64>() / total as u64
        } else {
            0
        };

        AuditStats {
            total_requests: total,
            verdicts,
            failures,
            avg_duration_ms,
        }
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone)]
pub struct AuditStats {
    pub total_requests: usize,
    pub verdicts: usize,
    pub failures: usize,
    pub avg_duration_ms: u64,
}
