//! Bounty lifecycle.
//!
//! ```text
//! Open ─▶ Matched ─▶ Accepted ─▶ InProgress ─▶ Submitted ─▶ UnderReview ─▶ Completed
//!  │         │          │            │             │              │
//!  └─────────┴─▶ Cancelled          └─▶ Failed     └──────────────┴─▶ Disputed ─▶ Completed|Failed
//!                                      (deadline)
//! ```
//!
//! The client escrows reward plus stake at posting; the guild locks its stake
//! at acceptance. Both stay locked until the bounty reaches a terminal state.

use arbiter::{EvidenceItem, Party};
use chrono::{DateTime, Utc};
use ledger::{
    AccountKind, AccountRef, LedgerBatch, LedgerError, Receipt, TransactionKind, TxLinks,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity::{ActivityEntry, ActivityKind};
use crate::config::span;
use crate::engine::{credit_delta, BountyCourt};
use crate::error::{CourtError, Result};
use crate::events::CourtEvent;
use crate::types::{Bounty, BountyStatus, Dispute, NewBounty};

/// Result of reviewing a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Completed(Bounty),
    Disputed { bounty: Bounty, dispute: Dispute },
}

fn expect_status(bounty: &Bounty, allowed: &[BountyStatus], action: &str) -> Result<()> {
    if bounty.status.is_terminal() {
        return Err(CourtError::transition(format!(
            "bounty {} is {} and final",
            bounty.id, bounty.status
        )));
    }
    if allowed.contains(&bounty.status) {
        Ok(())
    } else {
        Err(CourtError::transition(format!(
            "cannot {} a bounty that is {}",
            action, bounty.status
        )))
    }
}

fn expect_client(bounty: &Bounty, actor: &AccountRef) -> Result<()> {
    if *actor == bounty.client {
        Ok(())
    } else {
        Err(CourtError::unauthorized("only the client may do this"))
    }
}

fn expect_worker(bounty: &Bounty, actor: &AccountRef) -> Result<()> {
    if bounty.is_accepted_by(actor) {
        Ok(())
    } else {
        Err(CourtError::unauthorized("only the accepting guild may do this"))
    }
}

/// Ledger legs that pay out a successfully delivered bounty.
pub(crate) fn completion_batch(bounty: &Bounty, guild: &AccountRef) -> LedgerBatch {
    LedgerBatch::linked(TxLinks::bounty(&bounty.id))
        .release(guild, bounty.guild_stake_locked)
        .forfeit_as(
            &bounty.client,
            guild,
            bounty.reward_credits,
            TransactionKind::Reward,
            TransactionKind::Reward,
        )
        .release(&bounty.client, bounty.client_stake)
        .adjust_trust(guild, bounty.reputation_bonus)
}

impl BountyCourt {
    pub async fn bounty(&self, bounty_id: &str) -> Result<Bounty> {
        self.store.bounty(bounty_id).await
    }

    pub async fn bounties(&self) -> Vec<Bounty> {
        self.store.bounties().await
    }

    /// Post a bounty, escrowing reward and client stake.
    pub async fn post_bounty(&self, client: &AccountRef, params: NewBounty) -> Result<Bounty> {
        if client.kind != AccountKind::User {
            return Err(CourtError::unauthorized("only users post bounties"));
        }
        if params.reward_credits < self.config.bounty.min_reward {
            return Err(CourtError::InvalidAmount(format!(
                "reward must be at least {}",
                self.config.bounty.min_reward
            )));
        }
        if !params.reputation_bonus.is_finite() || params.reputation_bonus < 0.0 {
            return Err(CourtError::InvalidAmount(
                "reputation bonus must be non-negative".to_string(),
            ));
        }
        let escrow = params
            .reward_credits
            .checked_add(params.client_stake)
            .ok_or_else(|| CourtError::InvalidAmount("escrow overflows".to_string()))?;

        let now = Utc::now();
        let deadline = match params.deadline {
            Some(deadline) => deadline,
            None => span(self.config.bounty.default_deadline_secs)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| {
                    CourtError::InvalidRequest("default deadline is out of range".to_string())
                })?,
        };
        if deadline <= now {
            return Err(CourtError::InvalidRequest("deadline must be in the future".to_string()));
        }

        self.ledger.account(client).await?;
        let bounty = Bounty::new(client.clone(), params, deadline);

        self.ledger
            .commit(LedgerBatch::linked(TxLinks::bounty(&bounty.id)).lock(client, escrow))
            .await?;

        let bounty = match self.store.insert_bounty(bounty).await {
            Ok(bounty) => bounty,
            Err(e) => {
                self.ledger
                    .commit(LedgerBatch::new().release(client, escrow))
                    .await?;
                return Err(e);
            }
        };

        info!(
            bounty_id = %bounty.id,
            client = %client,
            reward = bounty.reward_credits,
            escrow,
            "Bounty posted"
        );
        self.events.emit(CourtEvent::BountyPosted {
            bounty_id: bounty.id.clone(),
            client: client.clone(),
            reward_credits: bounty.reward_credits,
        });
        self.activity
            .record(
                ActivityEntry::new(client.clone(), ActivityKind::BountyPosted)
                    .for_bounty(&bounty.id)
                    .with_credits(-(escrow as i64)),
            )
            .await;

        Ok(bounty)
    }

    /// Ask the matchmaker for a guild. No stake moves.
    pub async fn match_bounty(&self, bounty_id: &str) -> Result<Bounty> {
        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_status(&bounty, &[BountyStatus::Open], "match")?;

        let mut candidates = Vec::new();
        for guild in self.ledger.accounts_of_kind(AccountKind::Guild).await {
            let risk = self.oracle.risk_score(&guild.account).await;
            if risk <= self.config.tribunal.max_risk_score {
                candidates.push(guild);
            }
        }

        let guild = self
            .matchmaker
            .suggest_guild(&bounty, &candidates)
            .await
            .ok_or_else(|| {
                CourtError::ExternalServiceUnavailable("no guild suggestion".to_string())
            })?;

        if !candidates.iter().any(|c| c.account == guild) {
            return Err(CourtError::ExternalServiceUnavailable(
                "matchmaker suggested an ineligible guild".to_string(),
            ));
        }

        bounty.status = BountyStatus::Matched;
        bounty.matched_guild = Some(guild.clone());
        let bounty = self.save_bounty(bounty).await?;

        info!(bounty_id = %bounty.id, guild = %guild, "Bounty matched");
        self.events.emit(CourtEvent::BountyMatched {
            bounty_id: bounty.id.clone(),
            guild,
        });
        Ok(bounty)
    }

    /// Accept a bounty, locking the guild stake.
    pub async fn accept_bounty(&self, bounty_id: &str, guild: &AccountRef) -> Result<Bounty> {
        if !guild.is_guild() {
            return Err(CourtError::unauthorized("only guilds accept bounties"));
        }

        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_status(&bounty, &[BountyStatus::Open, BountyStatus::Matched], "accept")?;
        if let Some(matched) = &bounty.matched_guild {
            if matched != guild {
                return Err(CourtError::unauthorized("bounty is matched to another guild"));
            }
        }

        self.ledger.account(guild).await?;
        let required = bounty.guild_stake_required;
        self.ledger
            .commit(LedgerBatch::linked(TxLinks::bounty(&bounty.id)).lock(guild, required))
            .await
            .map_err(|e| match e {
                LedgerError::InsufficientFunds { .. } => {
                    CourtError::InsufficientGuildStake { required }
                }
                other => other.into(),
            })?;

        bounty.status = BountyStatus::Accepted;
        bounty.accepted_by = Some(guild.clone());
        bounty.guild_stake_locked = required;
        let bounty = match self.save_bounty(bounty).await {
            Ok(bounty) => bounty,
            Err(e) => {
                self.ledger
                    .commit(LedgerBatch::new().release(guild, required))
                    .await?;
                return Err(e);
            }
        };

        info!(bounty_id = %bounty.id, guild = %guild, stake = required, "Bounty accepted");
        self.events.emit(CourtEvent::BountyAccepted {
            bounty_id: bounty.id.clone(),
            guild: guild.clone(),
            stake_locked: required,
        });
        self.activity
            .record(
                ActivityEntry::new(guild.clone(), ActivityKind::BountyAccepted)
                    .for_bounty(&bounty.id)
                    .with_credits(-(required as i64)),
            )
            .await;

        Ok(bounty)
    }

    pub async fn start_work(&self, bounty_id: &str, guild: &AccountRef) -> Result<Bounty> {
        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_worker(&bounty, guild)?;
        expect_status(&bounty, &[BountyStatus::Accepted], "start work on")?;

        bounty.status = BountyStatus::InProgress;
        self.store_transition(bounty, BountyStatus::Accepted).await
    }

    pub async fn submit_proof(
        &self,
        bounty_id: &str,
        guild: &AccountRef,
        proof: impl Into<String>,
    ) -> Result<Bounty> {
        let proof = proof.into();
        if proof.trim().is_empty() {
            return Err(CourtError::InvalidRequest("proof of work is empty".to_string()));
        }

        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_worker(&bounty, guild)?;
        expect_status(&bounty, &[BountyStatus::InProgress], "submit proof for")?;

        bounty.status = BountyStatus::Submitted;
        bounty.proof = Some(proof);
        self.store_transition(bounty, BountyStatus::InProgress).await
    }

    pub async fn begin_review(&self, bounty_id: &str, client: &AccountRef) -> Result<Bounty> {
        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_client(&bounty, client)?;
        expect_status(&bounty, &[BountyStatus::Submitted], "review")?;

        bounty.status = BountyStatus::UnderReview;
        self.store_transition(bounty, BountyStatus::Submitted).await
    }

    /// Approve or reject a submission. Rejection opens a dispute.
    pub async fn review_submission(
        &self,
        bounty_id: &str,
        client: &AccountRef,
        approve: bool,
        reason: Option<String>,
    ) -> Result<ReviewOutcome> {
        let _gate = self.bounty_gate(bounty_id).await;
        let bounty = self.store.bounty(bounty_id).await?;
        expect_client(&bounty, client)?;
        expect_status(
            &bounty,
            &[BountyStatus::Submitted, BountyStatus::UnderReview],
            "review",
        )?;

        if approve {
            return Ok(ReviewOutcome::Completed(self.complete_locked(bounty).await?));
        }

        let (bounty, dispute) = self.open_dispute_locked(bounty, Party::Client, reason).await?;
        Ok(ReviewOutcome::Disputed { bounty, dispute })
    }

    /// Raise a dispute over a submitted bounty. Either party may raise one.
    pub async fn raise_dispute(
        &self,
        bounty_id: &str,
        actor: &AccountRef,
        statement: Option<String>,
    ) -> Result<Dispute> {
        let _gate = self.bounty_gate(bounty_id).await;
        let bounty = self.store.bounty(bounty_id).await?;

        let party = if *actor == bounty.client {
            Party::Client
        } else if bounty.is_accepted_by(actor) {
            Party::Guild
        } else {
            return Err(CourtError::unauthorized("only the bounty parties may raise a dispute"));
        };
        expect_status(
            &bounty,
            &[BountyStatus::Submitted, BountyStatus::UnderReview],
            "dispute",
        )?;

        let (_, dispute) = self.open_dispute_locked(bounty, party, statement).await?;
        Ok(dispute)
    }

    /// Withdraw an unaccepted bounty and release the escrow.
    pub async fn cancel_bounty(&self, bounty_id: &str, client: &AccountRef) -> Result<Bounty> {
        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        expect_client(&bounty, client)?;
        expect_status(&bounty, &[BountyStatus::Open, BountyStatus::Matched], "cancel")?;

        let escrow = bounty.client_escrow();
        let batch = LedgerBatch::linked(TxLinks::bounty(&bounty.id)).release(client, escrow);

        bounty.status = BountyStatus::Cancelled;
        let (bounty, _) = self.commit_transition(bounty, batch).await?;

        self.activity
            .record(
                ActivityEntry::new(client.clone(), ActivityKind::BountyCancelled)
                    .for_bounty(&bounty.id)
                    .with_credits(escrow as i64),
            )
            .await;
        Ok(bounty)
    }

    /// Fail every accepted or in-progress bounty past its deadline. The guild
    /// stake goes to the client and the client escrow is released.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Bounty>> {
        let mut expired = Vec::new();

        for candidate in self.store.bounties().await {
            if !is_overdue(&candidate, now) {
                continue;
            }
            match self.expire_one(&candidate.id, now).await {
                Ok(Some(bounty)) => expired.push(bounty),
                Ok(None) => {}
                Err(e) => warn!(bounty_id = %candidate.id, error = %e, "Failed to expire bounty"),
            }
        }

        Ok(expired)
    }

    async fn expire_one(&self, bounty_id: &str, now: DateTime<Utc>) -> Result<Option<Bounty>> {
        let _gate = self.bounty_gate(bounty_id).await;
        let mut bounty = self.store.bounty(bounty_id).await?;
        if !is_overdue(&bounty, now) {
            return Ok(None);
        }
        let guild = bounty
            .accepted_by
            .clone()
            .ok_or_else(|| CourtError::transition("accepted bounty has no guild"))?;

        let loss = self.config.settlement.loss_delta;
        let batch = LedgerBatch::linked(TxLinks::bounty(&bounty.id))
            .forfeit(&guild, &bounty.client, bounty.guild_stake_locked)
            .release(&bounty.client, bounty.client_escrow())
            .adjust_trust(&guild, -loss);

        bounty.status = BountyStatus::Failed;
        bounty.guild_stake_locked = 0;
        let (bounty, receipt) = self.commit_transition(bounty, batch).await?;

        info!(
            bounty_id = %bounty.id,
            guild = %guild,
            deadline = %bounty.deadline,
            "Bounty expired"
        );
        self.activity
            .record_all([
                ActivityEntry::new(guild.clone(), ActivityKind::BountyFailed)
                    .for_bounty(&bounty.id)
                    .with_credits(credit_delta(&receipt, &guild))
                    .with_trust(-loss),
                ActivityEntry::new(bounty.client.clone(), ActivityKind::BountyFailed)
                    .for_bounty(&bounty.id)
                    .with_credits(credit_delta(&receipt, &bounty.client)),
            ])
            .await;

        Ok(Some(bounty))
    }

    /// Pay out a delivered bounty. Caller holds the bounty gate.
    async fn complete_locked(&self, mut bounty: Bounty) -> Result<Bounty> {
        let guild = bounty
            .accepted_by
            .clone()
            .ok_or_else(|| CourtError::transition("submitted bounty has no guild"))?;

        let batch = completion_batch(&bounty, &guild);

        bounty.status = BountyStatus::Completed;
        bounty.guild_stake_locked = 0;
        let (bounty, receipt) = self.commit_transition(bounty, batch).await?;

        info!(
            bounty_id = %bounty.id,
            guild = %guild,
            reward = bounty.reward_credits,
            "Bounty completed"
        );
        self.activity
            .record(
                ActivityEntry::new(guild.clone(), ActivityKind::BountyCompleted)
                    .for_bounty(&bounty.id)
                    .with_credits(credit_delta(&receipt, &guild))
                    .with_trust(bounty.reputation_bonus),
            )
            .await;

        Ok(bounty)
    }

    /// Create a dispute and mark the bounty disputed. Caller holds the bounty
    /// gate.
    async fn open_dispute_locked(
        &self,
        mut bounty: Bounty,
        raised_by: Party,
        statement: Option<String>,
    ) -> Result<(Bounty, Dispute)> {
        let guild = bounty
            .accepted_by
            .clone()
            .ok_or_else(|| CourtError::transition("submitted bounty has no guild"))?;

        let mut dispute = Dispute::open(&bounty, guild, raised_by);
        if let Some(statement) = statement.filter(|s| !s.trim().is_empty()) {
            dispute
                .evidence_mut(raised_by)
                .push(EvidenceItem::new(raised_by, statement));
            dispute.status = dispute.tier.active_status();
        }
        let dispute = self.store.insert_dispute(dispute).await?;

        let from = bounty.status;
        bounty.status = BountyStatus::Disputed;
        bounty.dispute_id = Some(dispute.id.clone());
        let bounty = self.store_transition(bounty, from).await?;

        info!(
            bounty_id = %bounty.id,
            dispute_id = %dispute.id,
            raised_by = ?raised_by,
            client_stake = dispute.client_stake_at_risk,
            guild_stake = dispute.guild_stake_at_risk,
            "Dispute raised"
        );
        self.events.emit(CourtEvent::DisputeRaised {
            dispute_id: dispute.id.clone(),
            bounty_id: bounty.id.clone(),
            raised_by,
        });

        Ok((bounty, dispute))
    }

    /// Save a status change and announce it.
    /// Store a terminal bounty state, then commit its ledger batch. A failed
    /// commit restores the stored record. Caller holds the bounty gate.
    async fn commit_transition(
        &self,
        bounty: Bounty,
        batch: LedgerBatch,
    ) -> Result<(Bounty, Receipt)> {
        let previous = self.store.bounty(&bounty.id).await?;
        let stored = self.save_bounty(bounty).await?;

        let receipt = match self.commit_tracking_trust(batch).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.restore_bounty(previous, stored.revision).await;
                return Err(e);
            }
        };

        debug!(
            bounty_id = %stored.id,
            from = %previous.status,
            to = %stored.status,
            "Bounty transition"
        );
        self.events.emit(CourtEvent::BountyStatusChanged {
            bounty_id: stored.id.clone(),
            from: previous.status,
            to: stored.status,
        });
        self.forget_bounty_gate(&stored);
        Ok((stored, receipt))
    }

    async fn store_transition(&self, bounty: Bounty, from: BountyStatus) -> Result<Bounty> {
        let bounty = self.save_bounty(bounty).await?;
        debug!(bounty_id = %bounty.id, from = %from, to = %bounty.status, "Bounty transition");
        self.events.emit(CourtEvent::BountyStatusChanged {
            bounty_id: bounty.id.clone(),
            from,
            to: bounty.status,
        });
        Ok(bounty)
    }
}

fn is_overdue(bounty: &Bounty, now: DateTime<Utc>) -> bool {
    let working = matches!(bounty.status, BountyStatus::Accepted | BountyStatus::InProgress);
    working && bounty.deadline < now
}
