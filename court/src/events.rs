//! Event bus for court state changes.
//!
//! Consumers subscribe to a broadcast channel. Emission never fails: when no
//! subscriber is listening the event is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use arbiter::{Party, Ruling};
use chrono::{DateTime, Utc};
use ledger::{AccountRef, Rank};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{BountyStatus, DisputeTier, RulingSource};

/// Events buffered per subscriber before the oldest are dropped
const EVENT_BUFFER: usize = 1024;

/// Court state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CourtEvent {
    BountyPosted {
        bounty_id: String,
        client: AccountRef,
        reward_credits: u64,
    },
    BountyMatched {
        bounty_id: String,
        guild: AccountRef,
    },
    BountyAccepted {
        bounty_id: String,
        guild: AccountRef,
        stake_locked: u64,
    },
    BountyStatusChanged {
        bounty_id: String,
        from: BountyStatus,
        to: BountyStatus,
    },
    DisputeRaised {
        dispute_id: String,
        bounty_id: String,
        raised_by: Party,
    },
    EvidenceSubmitted {
        dispute_id: String,
        party: Party,
        item_id: String,
    },
    SettlementProposed {
        dispute_id: String,
        party: Party,
        ruling: Ruling,
    },
    DisputeEscalated {
        dispute_id: String,
        from: DisputeTier,
        to: DisputeTier,
        automatic: bool,
    },
    AiSuggestionRecorded {
        dispute_id: String,
        ruling: Ruling,
        confidence_score: f32,
        ai_stake_locked: u64,
    },
    ArbiterUnavailable {
        dispute_id: String,
        reason: String,
    },
    JurorsEmpaneled {
        dispute_id: String,
        jurors: Vec<AccountRef>,
    },
    VoteCast {
        dispute_id: String,
        juror: AccountRef,
        staked_amount: u64,
    },
    DisputeResolved {
        dispute_id: String,
        bounty_id: String,
        ruling: Ruling,
        source: RulingSource,
    },
    TrustChanged {
        account: AccountRef,
        old_score: f64,
        new_score: f64,
        rank: Rank,
    },
}

impl CourtEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CourtEvent::BountyPosted { .. } => "bounty_posted",
            CourtEvent::BountyMatched { .. } => "bounty_matched",
            CourtEvent::BountyAccepted { .. } => "bounty_accepted",
            CourtEvent::BountyStatusChanged { .. } => "bounty_status_changed",
            CourtEvent::DisputeRaised { .. } => "dispute_raised",
            CourtEvent::EvidenceSubmitted { .. } => "evidence_submitted",
            CourtEvent::SettlementProposed { .. } => "settlement_proposed",
            CourtEvent::DisputeEscalated { .. } => "dispute_escalated",
            CourtEvent::AiSuggestionRecorded { .. } => "ai_suggestion_recorded",
            CourtEvent::ArbiterUnavailable { .. } => "arbiter_unavailable",
            CourtEvent::JurorsEmpaneled { .. } => "jurors_empaneled",
            CourtEvent::VoteCast { .. } => "vote_cast",
            CourtEvent::DisputeResolved { .. } => "dispute_resolved",
            CourtEvent::TrustChanged { .. } => "trust_changed",
        }
    }
}

/// An emitted event with its emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: CourtEvent,
    pub emitted_at: DateTime<Utc>,
}

pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    emitted: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: CourtEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind();
        let record = EventRecord {
            event,
            emitted_at: Utc::now(),
        };
        if self.sender.send(record).is_err() {
            debug!(kind, "No event subscribers");
        }
    }

    /// Total events emitted since creation.
    pub fn emitted_count(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(CourtEvent::BountyMatched {
            bounty_id: "b1".to_string(),
            guild: AccountRef::guild("g1"),
        });

        let record = rx.recv().await.unwrap();
        assert_eq!(record.event.kind(), "bounty_matched");
        assert_eq!(bus.emitted_count(), 1);
    }

    #[test]
    fn test_emit_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(CourtEvent::ArbiterUnavailable {
            dispute_id: "d1".to_string(),
            reason: "timeout".to_string(),
        });
        assert_eq!(bus.emitted_count(), 1);
    }

    #[test]
    fn test_tagged_serialization() {
        let event = CourtEvent::VoteCast {
            dispute_id: "d1".to_string(),
            juror: AccountRef::guild("g2"),
            staked_amount: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "VoteCast");
        assert_eq!(json["data"]["staked_amount"], 10);
    }
}
