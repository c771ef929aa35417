//! Dispute tiers: negotiation, AI arbitration and escalation to a tribunal.
//!
//! Every write runs under the dispute gate. Calls to the arbiter are made
//! without the gate and re-validated against the dispute revision afterwards.

use arbiter::{ArbitrationRequest, BountyMetadata, EvidenceItem, Party, Ruling};
use chrono::{DateTime, Utc};
use ledger::{AccountRef, LedgerBatch, LedgerError, TxLinks};
use tracing::{debug, info, warn};

use crate::config::{span, AcceptancePolicy};
use crate::engine::BountyCourt;
use crate::error::{CourtError, Result};
use crate::events::CourtEvent;
use crate::types::{
    AiSuggestion, Dispute, DisputeStatus, DisputeTier, Proposal, RulingSource, SuggestionResponse,
};

fn expect_party(dispute: &Dispute, actor: &AccountRef) -> Result<Party> {
    dispute
        .party_of(actor)
        .ok_or_else(|| CourtError::unauthorized("only the disputing parties may do this"))
}

fn expect_open(dispute: &Dispute) -> Result<()> {
    if dispute.is_resolved() {
        Err(CourtError::transition("dispute is already resolved"))
    } else {
        Ok(())
    }
}

fn expect_tier(dispute: &Dispute, tier: DisputeTier, action: &str) -> Result<()> {
    if dispute.tier == tier {
        Ok(())
    } else {
        Err(CourtError::transition(format!(
            "cannot {} during {}",
            action,
            dispute.tier.as_str()
        )))
    }
}

impl BountyCourt {
    pub async fn dispute(&self, dispute_id: &str) -> Result<Dispute> {
        self.store.dispute(dispute_id).await
    }

    pub async fn disputes(&self) -> Vec<Dispute> {
        self.store.disputes().await
    }

    /// Add evidence for the actor's side. Evidence closes once a tribunal sits.
    pub async fn submit_evidence(
        &self,
        dispute_id: &str,
        actor: &AccountRef,
        content: impl Into<String>,
        attachment_uri: Option<String>,
    ) -> Result<Dispute> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CourtError::InvalidRequest("evidence is empty".to_string()));
        }

        let _gate = self.dispute_gate(dispute_id).await;
        let mut dispute = self.store.dispute(dispute_id).await?;
        let party = expect_party(&dispute, actor)?;
        expect_open(&dispute)?;
        if dispute.tier == DisputeTier::Tribunal {
            return Err(CourtError::transition("evidence is closed once a tribunal sits"));
        }

        let mut item = EvidenceItem::new(party, content);
        if let Some(uri) = attachment_uri {
            item = item.with_attachment(uri);
        }
        let item_id = item.id.clone();
        dispute.evidence_mut(party).push(item);
        if dispute.status == DisputeStatus::Open {
            dispute.status = DisputeStatus::Negotiating;
        }
        let dispute = self.store.replace_dispute(dispute).await?;

        debug!(dispute_id, party = ?party, item_id = %item_id, "Evidence submitted");
        self.events.emit(CourtEvent::EvidenceSubmitted {
            dispute_id: dispute.id.clone(),
            party,
            item_id,
        });
        Ok(dispute)
    }

    /// Offer a settlement to the other party. A new offer replaces the old one.
    pub async fn propose_settlement(
        &self,
        dispute_id: &str,
        actor: &AccountRef,
        ruling: Ruling,
        note: Option<String>,
    ) -> Result<Dispute> {
        let _gate = self.dispute_gate(dispute_id).await;
        let mut dispute = self.store.dispute(dispute_id).await?;
        let party = expect_party(&dispute, actor)?;
        expect_open(&dispute)?;
        expect_tier(&dispute, DisputeTier::Negotiation, "propose a settlement")?;

        dispute.proposal = Some(Proposal {
            proposed_by: party,
            ruling,
            note,
            proposed_at: Utc::now(),
        });
        dispute.status = DisputeStatus::Negotiating;
        let dispute = self.store.replace_dispute(dispute).await?;

        info!(dispute_id, party = ?party, ruling = ruling.as_str(), "Settlement proposed");
        self.events.emit(CourtEvent::SettlementProposed {
            dispute_id: dispute.id.clone(),
            party,
            ruling,
        });
        Ok(dispute)
    }

    /// Accept the other party's proposal and settle with it.
    pub async fn accept_proposal(&self, dispute_id: &str, actor: &AccountRef) -> Result<Dispute> {
        match self.try_accept_proposal(dispute_id, actor).await {
            Err(CourtError::ConcurrentModification(_)) => {
                self.try_accept_proposal(dispute_id, actor).await
            }
            other => other,
        }
    }

    async fn try_accept_proposal(&self, dispute_id: &str, actor: &AccountRef) -> Result<Dispute> {
        let _gate = self.dispute_gate(dispute_id).await;
        let dispute = self.store.dispute(dispute_id).await?;
        let party = expect_party(&dispute, actor)?;
        if dispute.is_resolved() {
            return Ok(dispute);
        }
        expect_tier(&dispute, DisputeTier::Negotiation, "accept a proposal")?;

        let proposal = dispute
            .proposal
            .clone()
            .ok_or_else(|| CourtError::transition("there is no proposal to accept"))?;
        if proposal.proposed_by == party {
            return Err(CourtError::unauthorized("a party cannot accept its own proposal"));
        }

        self.settle_locked(dispute, proposal.ruling, RulingSource::Negotiation)
            .await
    }

    /// Move a dispute to the next tier on a party's request.
    pub async fn escalate(&self, dispute_id: &str, actor: &AccountRef) -> Result<Dispute> {
        let dispute = {
            let _gate = self.dispute_gate(dispute_id).await;
            let dispute = self.store.dispute(dispute_id).await?;
            expect_party(&dispute, actor)?;
            self.escalate_locked(dispute, false).await?
        };
        Ok(self.after_escalation(dispute).await)
    }

    /// Escalate every dispute that outlived its tier budget. Tribunals are
    /// not escalated further; one that reached quorum without settling is
    /// finalized here.
    pub async fn escalate_stale(&self, now: DateTime<Utc>) -> Result<Vec<Dispute>> {
        let mut escalated = Vec::new();

        for candidate in self.store.disputes().await {
            if candidate.is_resolved() {
                continue;
            }

            if candidate.tier == DisputeTier::Tribunal {
                if let Err(e) = self.finalize_tribunal(&candidate.id).await {
                    warn!(dispute_id = %candidate.id, error = %e, "Tribunal finalization failed");
                }
                continue;
            }

            if !self.is_stale(&candidate, now) {
                if candidate.tier == DisputeTier::AiArbiter && candidate.ai_suggestion.is_none() {
                    // Retry a suggestion that failed earlier.
                    if let Err(e) = self.request_suggestion(&candidate.id).await {
                        debug!(
                            dispute_id = %candidate.id,
                            error = %e,
                            "Suggestion still unavailable"
                        );
                    }
                }
                continue;
            }

            match self.escalate_if_stale(&candidate.id, now).await {
                Ok(Some(dispute)) => escalated.push(self.after_escalation(dispute).await),
                Ok(None) => {}
                Err(e) => warn!(
                    dispute_id = %candidate.id,
                    error = %e,
                    "Failed to escalate stale dispute"
                ),
            }
        }

        Ok(escalated)
    }

    async fn escalate_if_stale(
        &self,
        dispute_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Dispute>> {
        let _gate = self.dispute_gate(dispute_id).await;
        let dispute = self.store.dispute(dispute_id).await?;
        if dispute.is_resolved() || !self.is_stale(&dispute, now) {
            return Ok(None);
        }
        self.escalate_locked(dispute, true).await.map(Some)
    }

    fn is_stale(&self, dispute: &Dispute, now: DateTime<Utc>) -> bool {
        let budget = match dispute.tier {
            DisputeTier::Negotiation => self.config.dispute.negotiation_timeout_secs,
            DisputeTier::AiArbiter => self.config.dispute.ai_arbiter_timeout_secs,
            DisputeTier::Tribunal => return false,
        };
        // A budget too large to represent never runs out.
        span(budget).is_some_and(|budget| now - dispute.tier_entered_at > budget)
    }

    /// Advance one tier. Entering the tribunal draws the panel. Caller holds
    /// the dispute gate.
    async fn escalate_locked(&self, mut dispute: Dispute, automatic: bool) -> Result<Dispute> {
        expect_open(&dispute)?;
        let from = dispute.tier;
        let to = from
            .next()
            .ok_or_else(|| CourtError::transition("tribunal is the final tier"))?;

        if to == DisputeTier::Tribunal && dispute.tribunal_jurors.is_none() {
            let jurors = self.empanel(&dispute).await?;
            dispute.tribunal_jurors = Some(jurors);
        }
        dispute
            .enter_tier(to, Utc::now())
            .map_err(CourtError::InvalidStateTransition)?;
        let dispute = self.store.replace_dispute(dispute).await?;

        info!(
            dispute_id = %dispute.id,
            from = from.as_str(),
            to = to.as_str(),
            automatic,
            "Dispute escalated"
        );
        self.events.emit(CourtEvent::DisputeEscalated {
            dispute_id: dispute.id.clone(),
            from,
            to,
            automatic,
        });
        if let Some(jurors) = &dispute.tribunal_jurors {
            if to == DisputeTier::Tribunal {
                self.events.emit(CourtEvent::JurorsEmpaneled {
                    dispute_id: dispute.id.clone(),
                    jurors: jurors.clone(),
                });
            }
        }

        Ok(dispute)
    }

    /// Ask the arbiter right after entering its tier. Failure leaves the
    /// dispute waiting for a retry.
    async fn after_escalation(&self, dispute: Dispute) -> Dispute {
        if dispute.tier != DisputeTier::AiArbiter || dispute.ai_suggestion.is_some() {
            return dispute;
        }
        match self.request_suggestion(&dispute.id).await {
            Ok(updated) => updated,
            Err(e) => {
                debug!(dispute_id = %dispute.id, error = %e, "No suggestion after escalation");
                self.store.dispute(&dispute.id).await.unwrap_or(dispute)
            }
        }
    }

    /// Obtain an advisory ruling from the AI arbiter and lock its stake.
    ///
    /// Returns the dispute unchanged when a suggestion is already recorded.
    pub async fn request_suggestion(&self, dispute_id: &str) -> Result<Dispute> {
        let snapshot = self.store.dispute(dispute_id).await?;
        expect_open(&snapshot)?;
        expect_tier(&snapshot, DisputeTier::AiArbiter, "request a suggestion")?;
        if snapshot.ai_suggestion.is_some() {
            return Ok(snapshot);
        }

        let bounty = self.store.bounty(&snapshot.bounty_id).await?;
        let request = ArbitrationRequest::new(
            &bounty.id,
            &snapshot.id,
            snapshot.client_evidence.clone(),
            snapshot.guild_evidence.clone(),
            BountyMetadata {
                title: bounty.title.clone(),
                description: bounty.description.clone(),
                reward_credits: bounty.reward_credits,
                client_stake: snapshot.client_stake_at_risk,
                guild_stake: snapshot.guild_stake_at_risk,
                proof_of_work: bounty.proof.clone(),
                deadline: Some(bounty.deadline),
            },
        );

        let verdict = match self.arbiter.arbitrate(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(dispute_id, error = %e, "AI arbiter unavailable");
                self.events.emit(CourtEvent::ArbiterUnavailable {
                    dispute_id: dispute_id.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let _gate = self.dispute_gate(dispute_id).await;
        let mut dispute = self.store.dispute(dispute_id).await?;
        if dispute.revision != snapshot.revision {
            return Err(CourtError::ConcurrentModification(format!(
                "dispute {} changed during arbitration",
                dispute_id
            )));
        }

        let arbiter = self.arbiter_account();
        let available = self.ledger.open_account(&arbiter).await.balance.available;
        let offered = verdict.ai_stake.min(available);
        let links = TxLinks::bounty(&dispute.bounty_id).with_dispute(&dispute.id);
        let locked = match self
            .ledger
            .commit(LedgerBatch::linked(links).lock(&arbiter, offered))
            .await
        {
            Ok(_) => offered,
            Err(LedgerError::InsufficientFunds { .. }) => {
                warn!(dispute_id, offered, "Arbiter account short; suggestion recorded unstaked");
                0
            }
            Err(e) => return Err(e.into()),
        };

        dispute.ai_suggestion = Some(AiSuggestion {
            ruling: verdict.ruling,
            confidence_score: verdict.confidence_score,
            reasoning: verdict.reasoning,
            ai_stake: verdict.ai_stake,
            ai_stake_locked: locked,
            arbiter_id: verdict.arbiter_id,
            suggested_at: Utc::now(),
        });
        let dispute = match self.store.replace_dispute(dispute).await {
            Ok(dispute) => dispute,
            Err(e) => {
                if locked > 0 {
                    self.ledger
                        .commit(LedgerBatch::new().release(&arbiter, locked))
                        .await?;
                }
                return Err(e);
            }
        };

        if let Some(suggestion) = &dispute.ai_suggestion {
            info!(
                dispute_id,
                ruling = suggestion.ruling.as_str(),
                confidence = suggestion.confidence_score,
                stake = locked,
                "AI suggestion recorded"
            );
            self.events.emit(CourtEvent::AiSuggestionRecorded {
                dispute_id: dispute.id.clone(),
                ruling: suggestion.ruling,
                confidence_score: suggestion.confidence_score,
                ai_stake_locked: locked,
            });
        }
        Ok(dispute)
    }

    /// Accept or reject the AI suggestion. Rejection sends the dispute to a
    /// tribunal; acceptance settles according to the acceptance policy.
    pub async fn respond_to_suggestion(
        &self,
        dispute_id: &str,
        actor: &AccountRef,
        accept: bool,
    ) -> Result<Dispute> {
        match self.try_respond_to_suggestion(dispute_id, actor, accept).await {
            Err(CourtError::ConcurrentModification(_)) => {
                self.try_respond_to_suggestion(dispute_id, actor, accept).await
            }
            other => other,
        }
    }

    async fn try_respond_to_suggestion(
        &self,
        dispute_id: &str,
        actor: &AccountRef,
        accept: bool,
    ) -> Result<Dispute> {
        let _gate = self.dispute_gate(dispute_id).await;
        let mut dispute = self.store.dispute(dispute_id).await?;
        let party = expect_party(&dispute, actor)?;
        if dispute.is_resolved() {
            return Ok(dispute);
        }
        expect_tier(&dispute, DisputeTier::AiArbiter, "respond to a suggestion")?;

        let ruling = dispute
            .ai_suggestion
            .as_ref()
            .map(|s| s.ruling)
            .ok_or_else(|| CourtError::transition("there is no suggestion to respond to"))?;
        if dispute.has_responded(party) {
            return Err(CourtError::transition("party has already responded"));
        }

        dispute.suggestion_responses.push(SuggestionResponse {
            party,
            accepted: accept,
            responded_at: Utc::now(),
        });
        info!(dispute_id, party = ?party, accept, "Suggestion response");

        if !accept {
            return self.escalate_locked(dispute, false).await;
        }

        let settle = match self.config.dispute.ai_acceptance {
            AcceptancePolicy::EitherParty => true,
            AcceptancePolicy::BothParties => [Party::Client, Party::Guild].iter().all(|p| {
                dispute
                    .suggestion_responses
                    .iter()
                    .any(|r| r.party == *p && r.accepted)
            }),
        };

        if settle {
            self.settle_locked(dispute, ruling, RulingSource::AiArbiter).await
        } else {
            self.store.replace_dispute(dispute).await
        }
    }
}
