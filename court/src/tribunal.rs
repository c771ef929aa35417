//! Tribunal: juror selection, stake-weighted voting and ruling computation.

use std::cmp::Reverse;

use arbiter::Ruling;
use chrono::Utc;
use ledger::{AccountKind, AccountRef, LedgerBatch, LedgerError, TxLinks};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::engine::BountyCourt;
use crate::error::{CourtError, Result};
use crate::events::CourtEvent;
use crate::types::{Dispute, DisputeTier, RulingSource, TribunalVote};

/// Weighted sampling without replacement (Efraimidis-Spirakis).
///
/// Each candidate gets the key `u^(1/w)` for uniform `u`; the `size` largest
/// keys win. Non-positive weights are treated as the smallest positive weight.
pub fn select_panel<R: Rng + ?Sized>(
    candidates: &[(AccountRef, f64)],
    size: usize,
    rng: &mut R,
) -> Vec<AccountRef> {
    let mut keyed: Vec<(f64, &AccountRef)> = candidates
        .iter()
        .map(|(account, weight)| {
            let weight = if weight.is_finite() && *weight > 0.0 {
                *weight
            } else {
                f64::MIN_POSITIVE
            };
            let u: f64 = rng.gen_range(f64::EPSILON..1.0);
            (u.powf(1.0 / weight), account)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    keyed.into_iter().take(size).map(|(_, a)| a.clone()).collect()
}

/// Quorum: strictly more than `fraction` of the empaneled jurors voted.
pub fn has_quorum(votes: usize, jurors: usize, fraction: f64) -> bool {
    jurors > 0 && votes as f64 > fraction * jurors as f64
}

/// Ruling with the highest total stake. Ties go to the higher vote count,
/// then to the ruling that received the earliest vote.
pub fn tally(votes: &[TribunalVote]) -> Option<Ruling> {
    Ruling::ALL
        .iter()
        .filter_map(|ruling| {
            let mut weight: u128 = 0;
            let mut count = 0usize;
            let mut first = None;
            for (i, vote) in votes.iter().enumerate().filter(|(_, v)| v.vote == *ruling) {
                weight += u128::from(vote.staked_amount);
                count += 1;
                first.get_or_insert(i);
            }
            first.map(|first| (*ruling, weight, count, first))
        })
        .max_by_key(|(_, weight, count, first)| (*weight, *count, Reverse(*first)))
        .map(|(ruling, ..)| ruling)
}

impl BountyCourt {
    /// Draw a juror panel for a dispute, weighted by trust.
    pub(crate) async fn empanel(&self, dispute: &Dispute) -> Result<Vec<AccountRef>> {
        let config = &self.config.tribunal;
        let mut candidates = Vec::new();

        for guild in self.ledger.accounts_of_kind(AccountKind::Guild).await {
            if dispute.party_of(&guild.account).is_some() {
                continue;
            }
            if guild.balance.available < config.min_juror_stake {
                continue;
            }
            let risk = self.oracle.risk_score(&guild.account).await;
            if risk > config.max_risk_score {
                debug!(guild = %guild.account, risk, "Skipping risky juror candidate");
                continue;
            }
            candidates.push((guild.account, guild.standing.trust_score.max(1.0)));
        }

        let required = config.min_panel_size.max(1);
        if candidates.len() < required {
            return Err(CourtError::InsufficientJurors {
                available: candidates.len(),
                required,
            });
        }

        let size = config.panel_size.max(required).min(candidates.len());
        let panel = {
            let mut rng = rand::thread_rng();
            select_panel(&candidates, size, &mut rng)
        };
        Ok(panel)
    }

    /// Cast a stake-weighted vote. Reaching quorum settles the dispute.
    pub async fn cast_vote(
        &self,
        dispute_id: &str,
        juror: &AccountRef,
        vote: Ruling,
        staked_amount: u64,
    ) -> Result<Dispute> {
        match self.try_cast_vote(dispute_id, juror, vote, staked_amount).await {
            Err(CourtError::ConcurrentModification(what)) => {
                debug!(dispute_id, what = %what, "Retrying vote after concurrent write");
                self.try_cast_vote(dispute_id, juror, vote, staked_amount).await
            }
            other => other,
        }
    }

    async fn try_cast_vote(
        &self,
        dispute_id: &str,
        juror: &AccountRef,
        vote: Ruling,
        staked_amount: u64,
    ) -> Result<Dispute> {
        let _gate = self.dispute_gate(dispute_id).await;
        let mut dispute = self.store.dispute(dispute_id).await?;

        if dispute.is_resolved() {
            return Err(CourtError::transition("dispute is already resolved"));
        }
        if dispute.tier != DisputeTier::Tribunal {
            return Err(CourtError::transition("dispute is not before a tribunal"));
        }
        if !dispute.is_juror(juror) {
            return Err(CourtError::NotAJuror(juror.to_string()));
        }
        if dispute.has_voted(juror) {
            return Err(CourtError::DuplicateVote(juror.to_string()));
        }
        if staked_amount < self.config.tribunal.min_juror_stake {
            return Err(CourtError::InvalidAmount(format!(
                "vote stake must be at least {}",
                self.config.tribunal.min_juror_stake
            )));
        }

        let links = TxLinks::bounty(&dispute.bounty_id).with_dispute(&dispute.id);
        self.ledger
            .commit(LedgerBatch::linked(links.clone()).lock(juror, staked_amount))
            .await
            .map_err(|e| match e {
                LedgerError::InsufficientFunds { .. } => CourtError::InsufficientStakeForVote {
                    requested: staked_amount,
                },
                other => other.into(),
            })?;

        dispute.tribunal_votes.push(TribunalVote {
            juror: juror.clone(),
            vote,
            staked_amount,
            cast_at: Utc::now(),
        });
        // An unstored vote must not keep its stake locked.
        let dispute = match self.store.replace_dispute(dispute).await {
            Ok(dispute) => dispute,
            Err(e) => {
                self.ledger
                    .commit(LedgerBatch::linked(links).release(juror, staked_amount))
                    .await?;
                return Err(e);
            }
        };

        let jurors = dispute.tribunal_jurors.as_ref().map(Vec::len).unwrap_or(0);
        info!(
            dispute_id = %dispute.id,
            juror = %juror,
            stake = staked_amount,
            votes = dispute.tribunal_votes.len(),
            jurors,
            "Tribunal vote cast"
        );
        self.events.emit(CourtEvent::VoteCast {
            dispute_id: dispute.id.clone(),
            juror: juror.clone(),
            staked_amount,
        });

        if !has_quorum(dispute.tribunal_votes.len(), jurors, self.config.tribunal.quorum_fraction) {
            return Ok(dispute);
        }

        // The vote is stored; a failed settlement is retried by the sweep.
        match self.rule_locked(dispute.clone()).await {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                warn!(dispute_id = %dispute.id, error = %e, "Tribunal settlement deferred");
                Ok(dispute)
            }
        }
    }

    /// Settle a tribunal that has reached quorum. A no-op without quorum or
    /// once resolved.
    pub async fn finalize_tribunal(&self, dispute_id: &str) -> Result<Dispute> {
        match self.try_finalize_tribunal(dispute_id).await {
            Err(CourtError::ConcurrentModification(_)) => {
                self.try_finalize_tribunal(dispute_id).await
            }
            other => other,
        }
    }

    async fn try_finalize_tribunal(&self, dispute_id: &str) -> Result<Dispute> {
        let _gate = self.dispute_gate(dispute_id).await;
        let dispute = self.store.dispute(dispute_id).await?;

        if dispute.is_resolved() || dispute.tier != DisputeTier::Tribunal {
            return Ok(dispute);
        }
        let jurors = dispute.tribunal_jurors.as_ref().map(Vec::len).unwrap_or(0);
        if !has_quorum(dispute.tribunal_votes.len(), jurors, self.config.tribunal.quorum_fraction) {
            return Ok(dispute);
        }

        self.rule_locked(dispute).await
    }

    /// Compute the ruling and settle. Caller holds the dispute gate.
    async fn rule_locked(&self, dispute: Dispute) -> Result<Dispute> {
        let ruling = tally(&dispute.tribunal_votes)
            .ok_or_else(|| CourtError::transition("tribunal has no votes"))?;
        self.settle_locked(dispute, ruling, RulingSource::Tribunal).await
    }
}
