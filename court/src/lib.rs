//! Guildhall Court - bounty lifecycle and dispute resolution
//!
//! Holds client and guild stakes at risk while a bounty is worked, and
//! resolves contested bounties through escalating tiers:
//!
//! ```text
//! Negotiation ─▶ AI Arbiter ─▶ Tribunal ─▶ Resolved
//!      │              │             │
//!      └──────────────┴─────────────┴──▶ one atomic settlement batch
//! ```
//!
//! - **Bounties**: escrow at posting, guild stake at acceptance, payout on approval
//! - **Disputes**: evidence, proposals, advisory AI rulings, stake-weighted juries
//! - **Settlement**: every ruling moves credits, juror stakes and trust in one batch
//! - **Reputation**: trust deltas on outcomes, periodic decay of idle accounts
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use arbiter::{ArbiterService, MockArbiter};
//! use court::{BountyCourt, InMemoryStore, NewBounty};
//! use ledger::{AccountRef, Ledger};
//!
//! let ledger = Arc::new(Ledger::new());
//! let arbiter = Arc::new(ArbiterService::new(vec![Arc::new(MockArbiter::new("mock"))]));
//! let court = BountyCourt::new(ledger, Arc::new(InMemoryStore::new()), arbiter);
//!
//! let bounty = court.post_bounty(&AccountRef::user("alice"), NewBounty {
//!     title: "Fix the parser".into(),
//!     reward_credits: 200,
//!     client_stake: 100,
//!     guild_stake_required: 50,
//!     ..Default::default()
//! }).await?;
//! ```

pub mod activity;
pub mod bounty;
pub mod config;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod events;
pub mod reputation;
pub mod settlement;
pub mod signals;
pub mod store;
pub mod tribunal;
pub mod types;

// Re-export main types
pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use bounty::ReviewOutcome;
pub use config::{AcceptancePolicy, CourtConfig};
pub use engine::{BountyCourt, SweepReport};
pub use error::{CourtError, ErrorKind, Result};
pub use events::{CourtEvent, EventBus, EventRecord};
pub use reputation::DecayReport;
pub use settlement::{distribute_juror_stakes, plan_settlement, JurorDistribution, SettlementPlan};
pub use signals::{AnomalyOracle, Matchmaker, NoSignals, TrustMatchmaker};
pub use store::{CourtStore, InMemoryStore};
pub use tribunal::{has_quorum, select_panel, tally};
pub use types::*;
