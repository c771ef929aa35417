//! Request and verdict types exchanged with the AI arbiter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Outcome of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Ruling {
    /// Delivered work does not satisfy the contract
    ClientWins,
    /// Delivered work satisfies the contract
    GuildWins,
    /// Partial delivery; stakes return and the reward is divided
    Split,
}

impl Ruling {
    pub const ALL: [Ruling; 3] = [Ruling::ClientWins, Ruling::GuildWins, Ruling::Split];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ruling::ClientWins => "client_wins",
            Ruling::GuildWins => "guild_wins",
            Ruling::Split => "split",
        }
    }

    /// Parse the wire form, tolerating case and separator differences.
    pub fn parse(raw: &str) -> Option<Ruling> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "clientwins" | "client" => Some(Ruling::ClientWins),
            "guildwins" | "guild" => Some(Ruling::GuildWins),
            "split" => Some(Ruling::Split),
            _ => None,
        }
    }
}

/// Which side of a dispute submitted something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Client,
    Guild,
}

impl Party {
    pub fn other(&self) -> Party {
        match self {
            Party::Client => Party::Guild,
            Party::Guild => Party::Client,
        }
    }

    /// The ruling that favours this party.
    pub fn winning_ruling(&self) -> Ruling {
        match self {
            Party::Client => Ruling::ClientWins,
            Party::Guild => Ruling::GuildWins,
        }
    }
}

/// A single piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EvidenceItem {
    pub id: String,
    pub submitted_by: Party,
    /// Statement or description
    pub content: String,
    /// Optional link to an attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_uri: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl EvidenceItem {
    pub fn new(submitted_by: Party, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            submitted_by,
            content: content.into(),
            attachment_uri: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, uri: impl Into<String>) -> Self {
        self.attachment_uri = Some(uri.into());
        self
    }
}

/// Append-only evidence of one party.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EvidenceBundle {
    pub items: Vec<EvidenceItem>,
}

impl EvidenceBundle {
    pub fn push(&mut self, item: EvidenceItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// SHA-256 over the item ids and contents, in submission order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for item in &self.items {
            hasher.update(item.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(item.content.as_bytes());
            hasher.update([0u8]);
            if let Some(uri) = &item.attachment_uri {
                hasher.update(uri.as_bytes());
            }
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Bounty facts the arbiter needs to judge the delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BountyMetadata {
    pub title: String,
    pub description: String,
    pub reward_credits: u64,
    pub client_stake: u64,
    pub guild_stake: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_of_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Request sent to an arbiter backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ArbitrationRequest {
    pub request_id: String,
    pub bounty_id: String,
    pub dispute_id: String,
    pub client_evidence: EvidenceBundle,
    pub guild_evidence: EvidenceBundle,
    pub bounty: BountyMetadata,
    pub requested_at: DateTime<Utc>,
}

impl ArbitrationRequest {
    pub fn new(
        bounty_id: impl Into<String>,
        dispute_id: impl Into<String>,
        client_evidence: EvidenceBundle,
        guild_evidence: EvidenceBundle,
        bounty: BountyMetadata,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            bounty_id: bounty_id.into(),
            dispute_id: dispute_id.into(),
            client_evidence,
            guild_evidence,
            bounty,
            requested_at: Utc::now(),
        }
    }
}

/// Advisory ruling returned by the arbiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Verdict {
    pub ruling: Ruling,
    /// Confidence in the ruling (0.0 - 1.0)
    pub confidence_score: f32,
    pub reasoning: String,
    /// Credits the arbiter puts at risk on this ruling
    pub ai_stake: u64,
    /// Backend that produced the verdict
    pub arbiter_id: String,
}

impl Verdict {
    pub fn new(ruling: Ruling, confidence_score: f32, reasoning: impl Into<String>) -> Self {
        Self {
            ruling,
            confidence_score,
            reasoning: reasoning.into(),
            ai_stake: 0,
            arbiter_id: String::new(),
        }
    }

    pub fn with_stake(mut self, ai_stake: u64) -> Self {
        self.ai_stake = ai_stake;
        self
    }

    pub fn with_arbiter(mut self, arbiter_id: impl Into<String>) -> Self {
        self.arbiter_id = arbiter_id.into();
        self
    }
}
