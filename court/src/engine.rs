//! BountyCourt - entry point tying the ledger, store, arbiter and signals
//! together.
//!
//! Operations are split by concern across `bounty`, `dispute`, `tribunal`,
//! `settlement` and `reputation`; this module holds the shared state and the
//! helpers they use.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbiter::ArbiterService;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ledger::{AccountRef, Ledger, LedgerBatch, Leg, Receipt};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::activity::ActivityLog;
use crate::config::CourtConfig;
use crate::error::Result;
use crate::events::{CourtEvent, EventBus, EventRecord};
use crate::reputation::DecayReport;
use crate::signals::{AnomalyOracle, Matchmaker, NoSignals};
use crate::store::CourtStore;
use crate::types::{Bounty, Dispute};

/// Result of one maintenance pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<Bounty>,
    pub escalated: Vec<Dispute>,
    pub decay: DecayReport,
}

/// The bounty court.
pub struct BountyCourt {
    pub(crate) config: CourtConfig,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) store: Arc<dyn CourtStore>,
    pub(crate) arbiter: Arc<ArbiterService>,
    pub(crate) matchmaker: Arc<dyn Matchmaker>,
    pub(crate) oracle: Arc<dyn AnomalyOracle>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) activity: Arc<ActivityLog>,
    /// Serializes writes per bounty
    bounty_gates: DashMap<String, Arc<Mutex<()>>>,
    /// Serializes writes per dispute; taken before a bounty gate, never after
    dispute_gates: DashMap<String, Arc<Mutex<()>>>,
}

impl BountyCourt {
    pub fn new(
        ledger: Arc<Ledger>,
        store: Arc<dyn CourtStore>,
        arbiter: Arc<ArbiterService>,
    ) -> Self {
        Self {
            config: CourtConfig::default(),
            ledger,
            store,
            arbiter,
            matchmaker: Arc::new(NoSignals),
            oracle: Arc::new(NoSignals),
            events: Arc::new(EventBus::new()),
            activity: Arc::new(ActivityLog::new()),
            bounty_gates: DashMap::new(),
            dispute_gates: DashMap::new(),
        }
    }

    pub fn with_config(mut self, config: CourtConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_matchmaker(mut self, matchmaker: Arc<dyn Matchmaker>) -> Self {
        self.matchmaker = matchmaker;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn AnomalyOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_activity(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    pub fn config(&self) -> &CourtConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Ledger account the AI arbiter stakes from.
    pub fn arbiter_account(&self) -> AccountRef {
        AccountRef::arbiter(self.config.dispute.arbiter_account.as_str())
    }

    /// Run every periodic job once: deadline expiry, stale escalation and
    /// reputation decay.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.expire_overdue(now).await?;
        let escalated = self.escalate_stale(now).await?;
        let decay = self.decay_sweep(now).await?;

        info!(
            expired = expired.len(),
            escalated = escalated.len(),
            decayed = decay.decayed,
            "Court sweep completed"
        );

        Ok(SweepReport {
            expired,
            escalated,
            decay,
        })
    }

    pub(crate) async fn bounty_gate(&self, bounty_id: &str) -> OwnedMutexGuard<()> {
        Self::gate(&self.bounty_gates, bounty_id).await
    }

    pub(crate) async fn dispute_gate(&self, dispute_id: &str) -> OwnedMutexGuard<()> {
        Self::gate(&self.dispute_gates, dispute_id).await
    }

    /// Drop the gate of a bounty that reached a terminal state. Terminal
    /// records are never written again, so late waiters only read.
    pub(crate) fn forget_bounty_gate(&self, bounty: &Bounty) {
        if bounty.status.is_terminal() {
            self.bounty_gates.remove(&bounty.id);
        }
    }

    /// Drop the gate of a resolved dispute.
    pub(crate) fn forget_dispute_gate(&self, dispute: &Dispute) {
        if dispute.is_resolved() {
            self.dispute_gates.remove(&dispute.id);
        }
    }

    async fn gate(gates: &DashMap<String, Arc<Mutex<()>>>, id: &str) -> OwnedMutexGuard<()> {
        let gate = gates
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        gate.lock_owned().await
    }

    /// Store a bounty change made under its gate.
    pub(crate) async fn save_bounty(&self, mut bounty: Bounty) -> Result<Bounty> {
        bounty.updated_at = Utc::now();
        self.store.replace_bounty(bounty).await
    }

    /// Put back a bounty record written ahead of a ledger commit that failed.
    pub(crate) async fn restore_bounty(&self, mut previous: Bounty, stored_revision: u64) {
        previous.revision = stored_revision;
        if let Err(e) = self.save_bounty(previous).await {
            error!(error = %e, "Failed to restore bounty after aborted commit");
        }
    }

    /// Put back a dispute record written ahead of a ledger commit that failed.
    pub(crate) async fn restore_dispute(&self, mut previous: Dispute, stored_revision: u64) {
        previous.revision = stored_revision;
        if let Err(e) = self.store.replace_dispute(previous).await {
            error!(error = %e, "Failed to restore dispute after aborted commit");
        }
    }

    /// Commit a batch and emit a trust event for every account whose trust
    /// the batch changed.
    pub(crate) async fn commit_tracking_trust(&self, batch: LedgerBatch) -> Result<Receipt> {
        let tracked: BTreeSet<AccountRef> = batch
            .legs
            .iter()
            .filter_map(|leg| match leg {
                Leg::AdjustTrust { account, .. } => Some(account.clone()),
                _ => None,
            })
            .collect();

        let mut before = Vec::with_capacity(tracked.len());
        for account in tracked {
            if let Ok(snapshot) = self.ledger.account(&account).await {
                before.push((account, snapshot.standing.trust_score));
            }
        }

        let receipt = self.ledger.commit(batch).await?;

        for (account, old_score) in before {
            match self.ledger.account(&account).await {
                Ok(after) if after.standing.trust_score != old_score => {
                    self.events.emit(CourtEvent::TrustChanged {
                        account,
                        old_score,
                        new_score: after.standing.trust_score,
                        rank: after.standing.rank,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(account = %account, error = %e, "Account vanished after commit"),
            }
        }

        Ok(receipt)
    }
}

/// Net change to available credits of one account within a receipt.
pub(crate) fn credit_delta(receipt: &Receipt, account: &AccountRef) -> i64 {
    receipt
        .transactions
        .iter()
        .filter(|t| &t.account == account)
        .map(|t| t.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::NewBounty;

    #[tokio::test]
    async fn test_gates_dropped_once_records_are_final() {
        let ledger = Arc::new(Ledger::new());
        let client = AccountRef::user("c1");
        ledger.open_account(&client).await;
        ledger.deposit(&client, 500).await.unwrap();

        let court = BountyCourt::new(
            ledger,
            Arc::new(InMemoryStore::new()),
            Arc::new(ArbiterService::new(Vec::new())),
        );
        let params = NewBounty {
            reward_credits: 100,
            client_stake: 10,
            ..Default::default()
        };

        let cancelled = court.post_bounty(&client, params.clone()).await.unwrap();
        let open = court.post_bounty(&client, params).await.unwrap();
        court.match_bounty(&open.id).await.unwrap_err();
        court.cancel_bounty(&cancelled.id, &client).await.unwrap();

        assert!(!court.bounty_gates.contains_key(&cancelled.id));
        assert!(court.bounty_gates.contains_key(&open.id));
    }
}
