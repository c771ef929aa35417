//! Read-only signals from external services: guild matchmaking and anomaly
//! risk scores.

use async_trait::async_trait;
use ledger::{Account, AccountRef};

use crate::types::Bounty;

/// Suggests a guild for an open bounty.
#[async_trait]
pub trait Matchmaker: Send + Sync {
    /// Pick a guild from `candidates`, or `None` when nothing fits.
    async fn suggest_guild(&self, bounty: &Bounty, candidates: &[Account]) -> Option<AccountRef>;
}

/// Risk score in 0.0 - 1.0 per account; higher is riskier.
#[async_trait]
pub trait AnomalyOracle: Send + Sync {
    async fn risk_score(&self, account: &AccountRef) -> f64;
}

/// No external signals: never suggests, never flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignals;

#[async_trait]
impl Matchmaker for NoSignals {
    async fn suggest_guild(&self, _bounty: &Bounty, _candidates: &[Account]) -> Option<AccountRef> {
        None
    }
}

#[async_trait]
impl AnomalyOracle for NoSignals {
    async fn risk_score(&self, _account: &AccountRef) -> f64 {
        0.0
    }
}

/// Picks the most trusted guild that can cover the required stake.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustMatchmaker;

#[async_trait]
impl Matchmaker for TrustMatchmaker {
    async fn suggest_guild(&self, bounty: &Bounty, candidates: &[Account]) -> Option<AccountRef> {
        candidates
            .iter()
            .filter(|a| a.balance.available >= bounty.guild_stake_required)
            .max_by(|a, b| {
                a.standing
                    .trust_score
                    .total_cmp(&b.standing.trust_score)
                    // Prefer the lower id on equal trust.
                    .then_with(|| b.account.cmp(&a.account))
            })
            .map(|a| a.account.clone())
    }
}
