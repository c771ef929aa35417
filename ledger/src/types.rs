//! Core types for the stake ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Trust score assigned to freshly opened accounts.
pub const DEFAULT_TRUST_SCORE: f64 = 50.0;

/// Upper bound of the trust scale.
pub const MAX_TRUST_SCORE: f64 = 100.0;

/// Kind of ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Individual client or hunter
    User,
    /// Worker collective
    Guild,
    /// External AI arbitration service
    Arbiter,
    /// Protocol treasury (receives remainders and forfeited arbiter stake)
    Treasury,
}

impl AccountKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::User => "user",
            AccountKind::Guild => "guild",
            AccountKind::Arbiter => "arbiter",
            AccountKind::Treasury => "treasury",
        }
    }
}

/// Reference to a ledger account.
///
/// Ordering is total so that multi-account commits can acquire locks in a
/// stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AccountRef {
    pub kind: AccountKind,
    pub id: String,
}

impl AccountRef {
    pub fn new(kind: AccountKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(AccountKind::User, id)
    }

    pub fn guild(id: impl Into<String>) -> Self {
        Self::new(AccountKind::Guild, id)
    }

    pub fn arbiter(id: impl Into<String>) -> Self {
        Self::new(AccountKind::Arbiter, id)
    }

    /// The single protocol treasury account.
    pub fn treasury() -> Self {
        Self::new(AccountKind::Treasury, "treasury")
    }

    pub fn is_guild(&self) -> bool {
        self.kind == AccountKind::Guild
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Split of an account's credits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Balance {
    /// Credits free to spend or stake
    pub available: u64,
    /// Credits locked as collateral
    pub staked: u64,
}

impl Balance {
    pub fn new(available: u64, staked: u64) -> Self {
        Self { available, staked }
    }

    /// Available plus staked.
    pub fn total(&self) -> u64 {
        self.available.saturating_add(self.staked)
    }
}

/// Reputation rank derived from the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    #[default]
    Initiate,
    Apprentice,
    Journeyman,
    Veteran,
    Master,
    Legend,
}

impl Rank {
    /// All ranks, lowest first.
    pub const ALL: [Rank; 6] = [
        Rank::Initiate,
        Rank::Apprentice,
        Rank::Journeyman,
        Rank::Veteran,
        Rank::Master,
        Rank::Legend,
    ];

    /// Lowest trust score that earns this rank.
    pub fn min_score(&self) -> f64 {
        match self {
            Rank::Initiate => 0.0,
            Rank::Apprentice => 20.0,
            Rank::Journeyman => 40.0,
            Rank::Veteran => 60.0,
            Rank::Master => 80.0,
            Rank::Legend => 95.0,
        }
    }

    /// Rank for a trust score, using the fixed breakpoints.
    pub fn for_score(score: f64) -> Rank {
        Rank::ALL
            .iter()
            .rev()
            .copied()
            .find(|rank| score >= rank.min_score())
            .unwrap_or(Rank::Initiate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Initiate => "initiate",
            Rank::Apprentice => "apprentice",
            Rank::Journeyman => "journeyman",
            Rank::Veteran => "veteran",
            Rank::Master => "master",
            Rank::Legend => "legend",
        }
    }
}

/// Reputation state of an account.
///
/// Mutable under the account lock; balances are not part of it so a standing
/// update can never move credits outside the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Standing {
    /// Trust score, clamped to 0-100
    pub trust_score: f64,
    /// Rank recomputed on every trust change
    pub rank: Rank,
    /// Last time a ledger leg touched this account
    pub last_active_at: DateTime<Utc>,
    /// Last time the decay sweep processed this account
    pub last_decayed_at: Option<DateTime<Utc>>,
}

impl Standing {
    pub fn new(trust_score: f64, now: DateTime<Utc>) -> Self {
        let trust_score = trust_score.clamp(0.0, MAX_TRUST_SCORE);
        Self {
            trust_score,
            rank: Rank::for_score(trust_score),
            last_active_at: now,
            last_decayed_at: None,
        }
    }

    /// Set the trust score (clamped) and recompute the rank.
    pub fn set_trust(&mut self, score: f64) {
        self.trust_score = score.clamp(0.0, MAX_TRUST_SCORE);
        self.rank = Rank::for_score(self.trust_score);
    }

    /// Add a signed delta to the trust score.
    pub fn adjust(&mut self, delta: f64) {
        self.set_trust(self.trust_score + delta);
    }
}

/// Snapshot of a ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Account {
    pub account: AccountRef,
    /// Cached balance; the journal is authoritative
    pub balance: Balance,
    pub standing: Standing,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(account: AccountRef, trust_score: f64) -> Self {
        let now = Utc::now();
        Self {
            account,
            balance: Balance::default(),
            standing: Standing::new(trust_score, now),
            created_at: now,
        }
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Reward,
    StakeLock,
    StakeRelease,
    DisputeWin,
    DisputeLoss,
    Deposit,
    Withdrawal,
    DecayAdjustment,
}

/// Optional links from a transaction to the domain objects that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TxLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounty_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<String>,
}

impl TxLinks {
    pub fn bounty(bounty_id: impl Into<String>) -> Self {
        Self {
            bounty_id: Some(bounty_id.into()),
            dispute_id: None,
        }
    }

    pub fn with_dispute(mut self, dispute_id: impl Into<String>) -> Self {
        self.dispute_id = Some(dispute_id.into());
        self
    }
}

/// An append-only journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Transaction {
    pub id: String,
    /// Batch this entry was committed in
    pub batch_id: String,
    pub account: AccountRef,
    pub links: TxLinks,
    pub kind: TransactionKind,
    /// Signed change to available credits
    pub amount: i64,
    /// Signed change to staked credits
    pub staked_delta: i64,
    /// Balance of `account` right after this entry
    pub balance_after: Balance,
    pub created_at: DateTime<Utc>,
}
