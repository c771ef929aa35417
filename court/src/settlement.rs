//! Atomic settlement of a ruling.
//!
//! A ruling becomes exactly one ledger batch covering the parties, the jurors
//! and the arbiter stake. The dispute and bounty records are swapped to their
//! settled state first; the batch commits last and a failed commit restores
//! both records.

use std::collections::BTreeMap;

use arbiter::Ruling;
use chrono::Utc;
use ledger::{AccountRef, LedgerBatch, TransactionKind, TxLinks};
use tracing::info;

use crate::activity::{ActivityEntry, ActivityKind};
use crate::config::SettlementConfig;
use crate::engine::{credit_delta, BountyCourt};
use crate::error::{CourtError, Result};
use crate::events::CourtEvent;
use crate::types::{Bounty, BountyStatus, Dispute, DisputeStatus, RulingSource, TribunalVote};

const BPS_DENOMINATOR: u128 = 10_000;

/// How juror stakes are redistributed after a tribunal ruling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JurorDistribution {
    /// Aligned jurors getting their own stake back
    pub releases: Vec<(AccountRef, u64)>,
    /// Dissenting stake moved to an aligned juror: (from, to, amount)
    pub transfers: Vec<(AccountRef, AccountRef, u64)>,
    /// Rounding remainders and unmatched dissent: (from, amount)
    pub to_treasury: Vec<(AccountRef, u64)>,
}

/// Aligned jurors recover their stake plus a share of each dissenting stake
/// proportional to their own stake. Rounding remainders go to the treasury.
pub fn distribute_juror_stakes(votes: &[TribunalVote], ruling: Ruling) -> JurorDistribution {
    let (aligned, dissent): (Vec<&TribunalVote>, Vec<&TribunalVote>) =
        votes.iter().partition(|v| v.vote == ruling);

    let aligned_total: u128 = aligned.iter().map(|v| u128::from(v.staked_amount)).sum();
    let mut distribution = JurorDistribution {
        releases: aligned
            .iter()
            .map(|v| (v.juror.clone(), v.staked_amount))
            .collect(),
        ..Default::default()
    };

    for loser in dissent {
        if aligned_total == 0 {
            distribution.to_treasury.push((loser.juror.clone(), loser.staked_amount));
            continue;
        }

        let pool = u128::from(loser.staked_amount);
        let mut paid: u128 = 0;
        for winner in &aligned {
            let share = pool * u128::from(winner.staked_amount) / aligned_total;
            if share > 0 {
                distribution
                    .transfers
                    .push((loser.juror.clone(), winner.juror.clone(), share as u64));
                paid += share;
            }
        }
        let remainder = (pool - paid) as u64;
        if remainder > 0 {
            distribution.to_treasury.push((loser.juror.clone(), remainder));
        }
    }

    distribution
}

/// Everything a ruling does, computed before anything is written.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub ruling: Ruling,
    pub batch: LedgerBatch,
    pub bounty_status: BountyStatus,
    /// Activity per account: kind and trust delta
    pub outcomes: BTreeMap<AccountRef, (ActivityKind, f64)>,
}

/// Build the settlement of a ruling.
pub fn plan_settlement(
    bounty: &Bounty,
    dispute: &Dispute,
    ruling: Ruling,
    config: &SettlementConfig,
    arbiter: &AccountRef,
) -> SettlementPlan {
    let client = &dispute.client;
    let guild = &dispute.guild;
    let reward = bounty.reward_credits;
    let client_stake = dispute.client_stake_at_risk;
    let guild_stake = dispute.guild_stake_at_risk;

    let links = TxLinks::bounty(&bounty.id).with_dispute(&dispute.id);
    let mut batch = LedgerBatch::linked(links);
    let mut outcomes = BTreeMap::new();

    let bounty_status = match ruling {
        Ruling::ClientWins => {
            batch = batch
                .forfeit(guild, client, guild_stake)
                .release(client, reward.saturating_add(client_stake))
                .adjust_trust(client, config.win_delta)
                .adjust_trust(guild, -config.loss_delta);
            outcomes.insert(client.clone(), (ActivityKind::DisputeWon, config.win_delta));
            outcomes.insert(guild.clone(), (ActivityKind::DisputeLost, -config.loss_delta));
            BountyStatus::Failed
        }
        Ruling::GuildWins => {
            batch = batch
                .forfeit(client, guild, client_stake)
                .release(guild, guild_stake)
                .forfeit_as(
                    client,
                    guild,
                    reward,
                    TransactionKind::Reward,
                    TransactionKind::Reward,
                )
                .adjust_trust(guild, config.win_delta)
                .adjust_trust(client, -config.loss_delta);
            outcomes.insert(guild.clone(), (ActivityKind::DisputeWon, config.win_delta));
            outcomes.insert(client.clone(), (ActivityKind::DisputeLost, -config.loss_delta));
            BountyStatus::Completed
        }
        Ruling::Split => {
            let bps = u128::from(config.split_guild_share_bps.min(10_000));
            let guild_share = (u128::from(reward) * bps / BPS_DENOMINATOR) as u64;
            batch = batch
                .release(client, client_stake)
                .release(guild, guild_stake)
                .forfeit_as(
                    client,
                    guild,
                    guild_share,
                    TransactionKind::Reward,
                    TransactionKind::Reward,
                )
                .release(client, reward - guild_share)
                .adjust_trust(client, -config.split_penalty)
                .adjust_trust(guild, -config.split_penalty);
            outcomes.insert(client.clone(), (ActivityKind::DisputeSplit, -config.split_penalty));
            outcomes.insert(guild.clone(), (ActivityKind::DisputeSplit, -config.split_penalty));
            BountyStatus::Completed
        }
    };

    if !dispute.tribunal_votes.is_empty() {
        let treasury = AccountRef::treasury();
        let distribution = distribute_juror_stakes(&dispute.tribunal_votes, ruling);

        for (juror, stake) in &distribution.releases {
            batch = batch
                .release(juror, *stake)
                .adjust_trust(juror, config.juror_aligned_delta);
            let aligned = (ActivityKind::JurorAligned, config.juror_aligned_delta);
            outcomes.insert(juror.clone(), aligned);
        }
        for (from, to, amount) in &distribution.transfers {
            batch = batch.forfeit(from, to, *amount);
        }
        for (from, amount) in &distribution.to_treasury {
            batch = batch.forfeit(from, &treasury, *amount);
        }
        for vote in dispute.tribunal_votes.iter().filter(|v| v.vote != ruling) {
            batch = batch.adjust_trust(&vote.juror, -config.juror_dissent_delta);
            outcomes.insert(
                vote.juror.clone(),
                (ActivityKind::JurorDissented, -config.juror_dissent_delta),
            );
        }
    }

    if let Some(suggestion) = &dispute.ai_suggestion {
        if suggestion.ai_stake_locked > 0 {
            if suggestion.ruling == ruling {
                batch = batch.release(arbiter, suggestion.ai_stake_locked);
                outcomes.insert(arbiter.clone(), (ActivityKind::ArbiterStakeReturned, 0.0));
            } else {
                batch = batch.forfeit(arbiter, &AccountRef::treasury(), suggestion.ai_stake_locked);
                outcomes.insert(arbiter.clone(), (ActivityKind::ArbiterStakeForfeited, 0.0));
            }
        }
    }

    SettlementPlan {
        ruling,
        batch,
        bounty_status,
        outcomes,
    }
}

impl BountyCourt {
    /// Apply a ruling: swap the dispute and bounty records to their settled
    /// state, then commit one ledger batch. A failed commit restores the
    /// stored records. A resolved dispute is returned unchanged. Caller holds
    /// the dispute gate.
    pub(crate) async fn settle_locked(
        &self,
        mut dispute: Dispute,
        ruling: Ruling,
        source: RulingSource,
    ) -> Result<Dispute> {
        if dispute.is_resolved() {
            return Ok(dispute);
        }

        let _bounty_gate = self.bounty_gate(&dispute.bounty_id).await;
        let mut bounty = self.store.bounty(&dispute.bounty_id).await?;
        if bounty.status != BountyStatus::Disputed {
            return Err(CourtError::transition(format!(
                "bounty {} is {}, not disputed",
                bounty.id, bounty.status
            )));
        }

        let plan = plan_settlement(
            &bounty,
            &dispute,
            ruling,
            &self.config.settlement,
            &self.arbiter_account(),
        );

        let now = Utc::now();
        let open_dispute = self.store.dispute(&dispute.id).await?;
        dispute.final_ruling = Some(ruling);
        dispute.ruling_source = Some(source);
        dispute.status = DisputeStatus::Resolved;
        dispute.resolved_at = Some(now);
        // Revision check happens here, before any credit moves.
        let dispute = self.store.replace_dispute(dispute).await?;

        let open_bounty = bounty.clone();
        let from = bounty.status;
        bounty.status = plan.bounty_status;
        bounty.guild_stake_locked = 0;
        let bounty = match self.save_bounty(bounty).await {
            Ok(bounty) => bounty,
            Err(e) => {
                self.restore_dispute(open_dispute, dispute.revision).await;
                return Err(e);
            }
        };

        let receipt = match self.commit_tracking_trust(plan.batch).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.restore_bounty(open_bounty, bounty.revision).await;
                self.restore_dispute(open_dispute, dispute.revision).await;
                return Err(e);
            }
        };

        info!(
            dispute_id = %dispute.id,
            bounty_id = %bounty.id,
            ruling = ruling.as_str(),
            source = ?source,
            batch_id = %receipt.batch_id,
            entries = receipt.transactions.len(),
            "Dispute settled"
        );

        self.activity
            .record_all(plan.outcomes.into_iter().map(|(account, (kind, trust))| {
                let credits = credit_delta(&receipt, &account);
                ActivityEntry::new(account, kind)
                    .for_bounty(&bounty.id)
                    .for_dispute(&dispute.id)
                    .with_credits(credits)
                    .with_trust(trust)
            }))
            .await;

        self.events.emit(CourtEvent::BountyStatusChanged {
            bounty_id: bounty.id.clone(),
            from,
            to: bounty.status,
        });
        self.events.emit(CourtEvent::DisputeResolved {
            dispute_id: dispute.id.clone(),
            bounty_id: bounty.id.clone(),
            ruling,
            source,
        });

        self.forget_bounty_gate(&bounty);
        self.forget_dispute_gate(&dispute);
        Ok(dispute)
    }
}
