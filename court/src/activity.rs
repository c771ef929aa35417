//! Activity log of trust and credit impacting events.
//!
//! Informational only; the ledger journal is authoritative for credits.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use ledger::AccountRef;
use serde::{Deserialize, Serialize};

/// Maximum entries retained before pruning.
const MAX_ACTIVITY_ENTRIES: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    BountyPosted,
    BountyAccepted,
    BountyCompleted,
    BountyFailed,
    BountyCancelled,
    DisputeWon,
    DisputeLost,
    DisputeSplit,
    JurorAligned,
    JurorDissented,
    ArbiterStakeReturned,
    ArbiterStakeForfeited,
    TrustDecayed,
    Demurrage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entry_id: String,
    pub account: AccountRef,
    pub kind: ActivityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounty_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<String>,
    /// Net change to available credits
    pub credit_delta: i64,
    pub trust_delta: f64,
    pub recorded_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(account: AccountRef, kind: ActivityKind) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            account,
            kind,
            bounty_id: None,
            dispute_id: None,
            credit_delta: 0,
            trust_delta: 0.0,
            recorded_at: Utc::now(),
        }
    }

    pub fn for_bounty(mut self, bounty_id: impl Into<String>) -> Self {
        self.bounty_id = Some(bounty_id.into());
        self
    }

    pub fn for_dispute(mut self, dispute_id: impl Into<String>) -> Self {
        self.dispute_id = Some(dispute_id.into());
        self
    }

    pub fn with_credits(mut self, credit_delta: i64) -> Self {
        self.credit_delta = credit_delta;
        self
    }

    pub fn with_trust(mut self, trust_delta: f64) -> Self {
        self.trust_delta = trust_delta;
        self
    }
}

/// Append-only activity log, newest first.
pub struct ActivityLog {
    entries: Arc<RwLock<VecDeque<ActivityEntry>>>,
    max_entries: usize,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_max_entries(MAX_ACTIVITY_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    pub async fn record(&self, entry: ActivityEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    pub async fn record_all(&self, batch: impl IntoIterator<Item = ActivityEntry>) {
        let mut entries = self.entries.write().await;
        for entry in batch {
            entries.push_front(entry);
        }

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    pub async fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    pub async fn for_account(&self, account: &AccountRef, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| &e.account == account)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn for_dispute(&self, dispute_id: &str) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.dispute_id.as_deref() == Some(dispute_id))
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activity_newest_first_and_filtered() {
        let log = ActivityLog::new();
        let guild = AccountRef::guild("g1");

        log.record(ActivityEntry::new(guild.clone(), ActivityKind::BountyAccepted).for_bounty("b1"))
            .await;
        log.record(
            ActivityEntry::new(guild.clone(), ActivityKind::DisputeWon)
                .for_dispute("d1")
                .with_credits(100)
                .with_trust(5.0),
        )
        .await;
        let lost = ActivityEntry::new(AccountRef::user("c1"), ActivityKind::DisputeLost);
        log.record(lost.for_dispute("d1")).await;

        let mine = log.for_account(&guild, 10).await;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].kind, ActivityKind::DisputeWon);
        assert_eq!(log.for_dispute("d1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_activity_pruned() {
        let log = ActivityLog::with_max_entries(2);
        let guild = AccountRef::guild("g1");
        log.record_all(
            (0..5).map(|_| ActivityEntry::new(guild.clone(), ActivityKind::TrustDecayed)),
        )
        .await;
        assert_eq!(log.count().await, 2);
    }
}
