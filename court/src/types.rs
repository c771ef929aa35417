//! Bounty and dispute records.

use arbiter::{EvidenceBundle, Party, Ruling};
use chrono::{DateTime, Utc};
use ledger::AccountRef;
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Lifecycle state of a bounty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum BountyStatus {
    Open,
    Matched,
    Accepted,
    InProgress,
    Submitted,
    UnderReview,
    Disputed,
    Completed,
    Failed,
    Cancelled,
}

impl BountyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BountyStatus::Open => "open",
            BountyStatus::Matched => "matched",
            BountyStatus::Accepted => "accepted",
            BountyStatus::InProgress => "in_progress",
            BountyStatus::Submitted => "submitted",
            BountyStatus::UnderReview => "under_review",
            BountyStatus::Disputed => "disputed",
            BountyStatus::Completed => "completed",
            BountyStatus::Failed => "failed",
            BountyStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BountyStatus::Completed | BountyStatus::Failed | BountyStatus::Cancelled
        )
    }
}

impl std::fmt::Display for BountyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for posting a bounty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct NewBounty {
    pub title: String,
    pub description: String,
    pub reward_credits: u64,
    /// Collateral the client puts at risk in a dispute
    pub client_stake: u64,
    /// Collateral a guild must lock to accept
    pub guild_stake_required: u64,
    /// Trust granted to the guild on completion
    pub reputation_bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// A work contract between a client and a guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Bounty {
    pub id: String,
    pub client: AccountRef,
    pub title: String,
    pub description: String,
    pub status: BountyStatus,
    pub reward_credits: u64,
    pub client_stake: u64,
    pub guild_stake_required: u64,
    pub guild_stake_locked: u64,
    pub reputation_bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<AccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_guild: Option<AccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    pub deadline: DateTime<Utc>,
    /// Incremented on every stored change
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bounty {
    pub fn new(client: AccountRef, params: NewBounty, deadline: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client,
            title: params.title,
            description: params.description,
            status: BountyStatus::Open,
            reward_credits: params.reward_credits,
            client_stake: params.client_stake,
            guild_stake_required: params.guild_stake_required,
            guild_stake_locked: 0,
            reputation_bonus: params.reputation_bonus,
            accepted_by: None,
            matched_guild: None,
            dispute_id: None,
            proof: None,
            deadline,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credits the client holds in escrow while the bounty is live.
    pub fn client_escrow(&self) -> u64 {
        self.reward_credits.saturating_add(self.client_stake)
    }

    pub fn is_accepted_by(&self, guild: &AccountRef) -> bool {
        self.accepted_by.as_ref() == Some(guild)
    }
}

/// Escalation tier of a dispute. Ordered; a dispute never moves down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum DisputeTier {
    Negotiation,
    AiArbiter,
    Tribunal,
}

impl DisputeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeTier::Negotiation => "negotiation",
            DisputeTier::AiArbiter => "ai_arbiter",
            DisputeTier::Tribunal => "tribunal",
        }
    }

    pub fn next(&self) -> Option<DisputeTier> {
        match self {
            DisputeTier::Negotiation => Some(DisputeTier::AiArbiter),
            DisputeTier::AiArbiter => Some(DisputeTier::Tribunal),
            DisputeTier::Tribunal => None,
        }
    }

    /// Status a dispute carries while active in this tier.
    pub fn active_status(&self) -> DisputeStatus {
        match self {
            DisputeTier::Negotiation => DisputeStatus::Negotiating,
            DisputeTier::AiArbiter => DisputeStatus::AiAnalysis,
            DisputeTier::Tribunal => DisputeStatus::InTribunal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Negotiating,
    AiAnalysis,
    InTribunal,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Negotiating => "negotiating",
            DisputeStatus::AiAnalysis => "ai_analysis",
            DisputeStatus::InTribunal => "in_tribunal",
            DisputeStatus::Resolved => "resolved",
        }
    }
}

/// Where a final ruling came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RulingSource {
    Negotiation,
    AiArbiter,
    Tribunal,
}

/// A settlement offered during negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Proposal {
    pub proposed_by: Party,
    pub ruling: Ruling,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub proposed_at: DateTime<Utc>,
}

/// Advisory ruling recorded from the AI arbiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AiSuggestion {
    pub ruling: Ruling,
    pub confidence_score: f32,
    pub reasoning: String,
    /// Stake the arbiter offered
    pub ai_stake: u64,
    /// Stake actually locked from the arbiter account
    pub ai_stake_locked: u64,
    pub arbiter_id: String,
    pub suggested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct SuggestionResponse {
    pub party: Party,
    pub accepted: bool,
    pub responded_at: DateTime<Utc>,
}

/// One juror's vote. Votes are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TribunalVote {
    pub juror: AccountRef,
    pub vote: Ruling,
    pub staked_amount: u64,
    pub cast_at: DateTime<Utc>,
}

/// A contested bounty moving through the escalation tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Dispute {
    pub id: String,
    pub bounty_id: String,
    pub client: AccountRef,
    pub guild: AccountRef,
    pub raised_by: Party,
    pub tier: DisputeTier,
    pub status: DisputeStatus,
    pub client_evidence: EvidenceBundle,
    pub guild_evidence: EvidenceBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Proposal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_suggestion: Option<AiSuggestion>,
    pub suggestion_responses: Vec<SuggestionResponse>,
    /// Fixed once empaneled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tribunal_jurors: Option<Vec<AccountRef>>,
    pub tribunal_votes: Vec<TribunalVote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_ruling: Option<Ruling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruling_source: Option<RulingSource>,
    pub client_stake_at_risk: u64,
    pub guild_stake_at_risk: u64,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub tier_entered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// Open a dispute over a bounty that holds both stakes.
    pub fn open(bounty: &Bounty, guild: AccountRef, raised_by: Party) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            bounty_id: bounty.id.clone(),
            client: bounty.client.clone(),
            guild,
            raised_by,
            tier: DisputeTier::Negotiation,
            status: DisputeStatus::Open,
            client_evidence: EvidenceBundle::default(),
            guild_evidence: EvidenceBundle::default(),
            proposal: None,
            ai_suggestion: None,
            suggestion_responses: Vec::new(),
            tribunal_jurors: None,
            tribunal_votes: Vec::new(),
            final_ruling: None,
            ruling_source: None,
            client_stake_at_risk: bounty.client_stake,
            guild_stake_at_risk: bounty.guild_stake_locked,
            revision: 0,
            created_at: now,
            tier_entered_at: now,
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == DisputeStatus::Resolved
    }

    /// Which side an account is on, if any.
    pub fn party_of(&self, account: &AccountRef) -> Option<Party> {
        if *account == self.client {
            Some(Party::Client)
        } else if *account == self.guild {
            Some(Party::Guild)
        } else {
            None
        }
    }

    pub fn evidence_mut(&mut self, party: Party) -> &mut EvidenceBundle {
        match party {
            Party::Client => &mut self.client_evidence,
            Party::Guild => &mut self.guild_evidence,
        }
    }

    pub fn is_juror(&self, account: &AccountRef) -> bool {
        self.tribunal_jurors
            .as_ref()
            .map(|jurors| jurors.contains(account))
            .unwrap_or(false)
    }

    pub fn has_voted(&self, account: &AccountRef) -> bool {
        self.tribunal_votes.iter().any(|v| &v.juror == account)
    }

    pub fn has_responded(&self, party: Party) -> bool {
        self.suggestion_responses.iter().any(|r| r.party == party)
    }

    /// Move to a tier, refusing to regress or stay put.
    pub fn enter_tier(&mut self, tier: DisputeTier, now: DateTime<Utc>) -> Result<(), String> {
        if self.is_resolved() {
            return Err("dispute is already resolved".to_string());
        }
        if tier <= self.tier {
            return Err(format!(
                "cannot move from {} to {}",
                self.tier.as_str(),
                tier.as_str()
            ));
        }
        self.tier = tier;
        self.status = tier.active_status();
        self.tier_entered_at = now;
        Ok(())
    }
}
