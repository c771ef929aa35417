//! Reputation decay.
//!
//! Settlement applies trust deltas inside its ledger batch. This module runs
//! the periodic sweep that erodes the trust of idle accounts and, when
//! configured, charges demurrage on their idle credits.

use chrono::{DateTime, Utc};
use ledger::{AccountKind, AccountRef, LedgerBatch, Rank, TransactionKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activity::{ActivityEntry, ActivityKind};
use crate::config::{span, ReputationConfig};
use crate::engine::BountyCourt;
use crate::error::Result;
use crate::events::CourtEvent;

/// Outcome of one decay sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayReport {
    pub examined: usize,
    pub decayed: usize,
    pub demurrage_collected: u64,
}

/// Trust after one decay step, floored at zero.
pub fn decayed_score(score: f64, decay_rate: f64) -> f64 {
    (score * (1.0 - decay_rate.clamp(0.0, 1.0))).max(0.0)
}

/// Whether an account is due for decay at `now`.
fn is_due(
    last_active_at: DateTime<Utc>,
    last_decayed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &ReputationConfig,
) -> bool {
    let idle = span(config.inactivity_threshold_secs)
        .is_some_and(|threshold| now - last_active_at > threshold);
    let period_elapsed = match (last_decayed_at, span(config.decay_period_secs)) {
        (None, _) => true,
        (Some(at), Some(period)) => now - at >= period,
        (Some(_), None) => false,
    };
    idle && period_elapsed
}

impl BountyCourt {
    /// Decay the trust of every idle account not yet decayed this period.
    ///
    /// Trust is changed under the account lock, the same lock settlement
    /// batches take.
    pub async fn decay_sweep(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        let config = self.config.reputation.clone();
        let treasury = AccountRef::treasury();
        let mut report = DecayReport::default();

        for account in self.ledger.account_refs() {
            if account.kind == AccountKind::Treasury {
                continue;
            }
            report.examined += 1;

            let change = self
                .ledger
                .update_standing(&account, |standing| {
                    if !is_due(standing.last_active_at, standing.last_decayed_at, now, &config) {
                        return None;
                    }
                    let old_score = standing.trust_score;
                    standing.set_trust(decayed_score(old_score, config.decay_rate));
                    standing.last_decayed_at = Some(now);
                    Some((old_score, standing.trust_score, standing.rank))
                })
                .await?;

            let Some((old_score, new_score, rank)) = change else {
                continue;
            };
            report.decayed += 1;
            self.record_decay(&account, old_score, new_score, rank).await;

            if config.demurrage_bps > 0 {
                report.demurrage_collected +=
                    self.charge_demurrage(&account, &treasury, &config).await;
            }
        }

        info!(
            examined = report.examined,
            decayed = report.decayed,
            demurrage = report.demurrage_collected,
            "Decay sweep completed"
        );
        Ok(report)
    }

    async fn record_decay(&self, account: &AccountRef, old_score: f64, new_score: f64, rank: Rank) {
        debug!(account = %account, old_score, new_score, rank = rank.as_str(), "Trust decayed");
        if old_score != new_score {
            self.events.emit(CourtEvent::TrustChanged {
                account: account.clone(),
                old_score,
                new_score,
                rank,
            });
        }
        let entry = ActivityEntry::new(account.clone(), ActivityKind::TrustDecayed);
        self.activity.record(entry.with_trust(new_score - old_score)).await;
    }

    /// Move a share of idle credits to the treasury. Returns the amount moved.
    async fn charge_demurrage(
        &self,
        account: &AccountRef,
        treasury: &AccountRef,
        config: &ReputationConfig,
    ) -> u64 {
        let available = match self.ledger.balance(account).await {
            Ok(balance) => balance.available,
            Err(e) => {
                warn!(account = %account, error = %e, "Skipping demurrage");
                return 0;
            }
        };
        let bps = u128::from(config.demurrage_bps.min(10_000));
        let amount = (u128::from(available) * bps / 10_000) as u64;
        if amount == 0 {
            return 0;
        }

        let batch = LedgerBatch::new()
            .debit(account, amount, TransactionKind::DecayAdjustment)
            .credit(treasury, amount, TransactionKind::DecayAdjustment);
        match self.ledger.commit(batch).await {
            Ok(_) => {
                let entry = ActivityEntry::new(account.clone(), ActivityKind::Demurrage);
                self.activity.record(entry.with_credits(-(amount as i64))).await;
                amount
            }
            Err(e) => {
                // Balance moved since it was read; the next sweep retries.
                warn!(account = %account, amount, error = %e, "Demurrage skipped");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_decayed_score() {
        assert_eq!(decayed_score(100.0, 0.05), 95.0);
        assert_eq!(decayed_score(0.0, 0.05), 0.0);
        assert_eq!(decayed_score(40.0, 2.0), 0.0);
    }

    #[test]
    fn test_due_only_when_idle_and_period_elapsed() {
        let config = ReputationConfig::default();
        let now = Utc::now();
        let long_ago = now - Duration::days(60);

        assert!(is_due(long_ago, None, now, &config));
        assert!(!is_due(now - Duration::days(1), None, now, &config));
        assert!(!is_due(long_ago, Some(now - Duration::days(1)), now, &config));
        assert!(is_due(long_ago, Some(now - Duration::days(8)), now, &config));
    }

    #[test]
    fn test_unrepresentable_threshold_never_decays() {
        let config = ReputationConfig {
            inactivity_threshold_secs: u64::MAX / 2,
            ..Default::default()
        };
        let now = Utc::now();
        assert!(!is_due(now - Duration::days(3650), None, now, &config));
    }
}
