//! End-to-end court flows against the in-memory store
//!
//! Covers:
//! - Bounty lifecycle payouts, cancellation and deadline expiry
//! - Negotiated, AI-arbitrated and tribunal settlements
//! - Tier monotonicity and vote-once guarantees under concurrency
//! - Lost record writes during settlement and voting
//! - Reputation decay and demurrage
//!
//! Every flow ends with a full journal replay of the ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arbiter::{ArbiterBackend, ArbiterService, MockArbiter, Party, Ruling, Verdict};
use chrono::{Duration, Utc};
use async_trait::async_trait;
use court::{
    AcceptancePolicy, Bounty, BountyCourt, BountyStatus, CourtConfig, CourtError, CourtEvent,
    CourtStore, Dispute, DisputeStatus, DisputeTier, ErrorKind, InMemoryStore, NewBounty,
    ReviewOutcome, RulingSource, TrustMatchmaker,
};
use ledger::{AccountRef, Balance, Ledger};
use tokio_test::assert_ok;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    court: Arc<BountyCourt>,
    ledger: Arc<Ledger>,
    mock: Arc<MockArbiter>,
    store: Arc<FlakyStore>,
}

/// In-memory store that can be told to lose the next record writes.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    dispute_write_failures: AtomicUsize,
    bounty_write_failures: AtomicUsize,
}

impl FlakyStore {
    fn fail_dispute_writes(&self, n: usize) {
        self.dispute_write_failures.store(n, Ordering::SeqCst);
    }

    fn fail_bounty_writes(&self, n: usize) {
        self.bounty_write_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CourtStore for FlakyStore {
    async fn insert_bounty(&self, bounty: Bounty) -> court::Result<Bounty> {
        self.inner.insert_bounty(bounty).await
    }

    async fn bounty(&self, id: &str) -> court::Result<Bounty> {
        self.inner.bounty(id).await
    }

    async fn replace_bounty(&self, bounty: Bounty) -> court::Result<Bounty> {
        if Self::take_failure(&self.bounty_write_failures) {
            return Err(CourtError::ConcurrentModification(format!("bounty {}", bounty.id)));
        }
        self.inner.replace_bounty(bounty).await
    }

    async fn bounties(&self) -> Vec<Bounty> {
        self.inner.bounties().await
    }

    async fn insert_dispute(&self, dispute: Dispute) -> court::Result<Dispute> {
        self.inner.insert_dispute(dispute).await
    }

    async fn dispute(&self, id: &str) -> court::Result<Dispute> {
        self.inner.dispute(id).await
    }

    async fn replace_dispute(&self, dispute: Dispute) -> court::Result<Dispute> {
        if Self::take_failure(&self.dispute_write_failures) {
            return Err(CourtError::ConcurrentModification(format!("dispute {}", dispute.id)));
        }
        self.inner.replace_dispute(dispute).await
    }

    async fn disputes(&self) -> Vec<Dispute> {
        self.inner.disputes().await
    }
}

fn client() -> AccountRef {
    AccountRef::user("alice")
}

fn guild() -> AccountRef {
    AccountRef::guild("forge")
}

fn juror(n: u8) -> AccountRef {
    AccountRef::guild(format!("j{}", n))
}

fn arbiter_account() -> AccountRef {
    AccountRef::arbiter("ai-arbiter")
}

fn config() -> CourtConfig {
    let mut config = CourtConfig::default();
    config.tribunal.panel_size = 3;
    config.tribunal.min_panel_size = 3;
    config
}

async fn harness_with(config: CourtConfig, mock: MockArbiter) -> Harness {
    let ledger = Arc::new(Ledger::new());
    for (account, credits) in [
        (client(), 1000),
        (guild(), 500),
        (juror(1), 100),
        (juror(2), 100),
        (juror(3), 100),
        (arbiter_account(), 200),
    ] {
        ledger.open_account(&account).await;
        ledger.deposit(&account, credits).await.unwrap();
    }

    let mock = Arc::new(mock);
    let backend: Arc<dyn ArbiterBackend> = mock.clone();
    let arbiter = Arc::new(ArbiterService::new(vec![backend]));
    let store = Arc::new(FlakyStore::default());
    let court = BountyCourt::new(ledger.clone(), store.clone(), arbiter)
        .with_config(config)
        .with_matchmaker(Arc::new(TrustMatchmaker));

    Harness {
        court: Arc::new(court),
        ledger,
        mock,
        store,
    }
}

async fn harness() -> Harness {
    harness_with(config(), MockArbiter::new("mock")).await
}

fn standard_bounty() -> NewBounty {
    NewBounty {
        title: "Port the scheduler".to_string(),
        description: "Move the job scheduler onto the new runtime".to_string(),
        reward_credits: 200,
        client_stake: 100,
        guild_stake_required: 50,
        reputation_bonus: 3.0,
        deadline: None,
    }
}

/// Post, accept, work and submit; the client then rejects the submission.
async fn disputed(h: &Harness) -> Dispute {
    let bounty = h.court.post_bounty(&client(), standard_bounty()).await.unwrap();
    h.court.accept_bounty(&bounty.id, &guild()).await.unwrap();
    h.court.start_work(&bounty.id, &guild()).await.unwrap();
    h.court.submit_proof(&bounty.id, &guild(), "PR #42 merged").await.unwrap();

    match h
        .court
        .review_submission(&bounty.id, &client(), false, Some("Tests are failing".to_string()))
        .await
        .unwrap()
    {
        ReviewOutcome::Disputed { dispute, .. } => dispute,
        ReviewOutcome::Completed(_) => panic!("rejection should open a dispute"),
    }
}

/// Escalate a fresh dispute all the way to a tribunal.
async fn before_tribunal(h: &Harness) -> Dispute {
    let dispute = disputed(h).await;
    h.court.escalate(&dispute.id, &client()).await.unwrap();
    h.court.escalate(&dispute.id, &client()).await.unwrap()
}

async fn balance(h: &Harness, account: &AccountRef) -> Balance {
    h.ledger.balance(account).await.unwrap()
}

async fn trust(h: &Harness, account: &AccountRef) -> f64 {
    h.ledger.account(account).await.unwrap().standing.trust_score
}

// =============================================================================
// Bounty lifecycle
// =============================================================================

#[tokio::test]
async fn test_approved_bounty_pays_guild() {
    let h = harness().await;
    let bounty = h.court.post_bounty(&client(), standard_bounty()).await.unwrap();
    assert_eq!(balance(&h, &client()).await, Balance::new(700, 300));

    let matched = h.court.match_bounty(&bounty.id).await.unwrap();
    assert_eq!(matched.matched_guild, Some(guild()));

    let err = h.court.accept_bounty(&bounty.id, &juror(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    h.court.accept_bounty(&bounty.id, &guild()).await.unwrap();
    h.court.start_work(&bounty.id, &guild()).await.unwrap();
    h.court.submit_proof(&bounty.id, &guild(), "Delivered").await.unwrap();
    h.court.begin_review(&bounty.id, &client()).await.unwrap();

    let outcome = h
        .court
        .review_submission(&bounty.id, &client(), true, None)
        .await
        .unwrap();
    let ReviewOutcome::Completed(done) = outcome else {
        panic!("approval should complete the bounty");
    };

    assert_eq!(done.status, BountyStatus::Completed);
    assert_eq!(balance(&h, &client()).await, Balance::new(800, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(700, 0));
    assert_eq!(trust(&h, &guild()).await, 53.0);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_guild_without_stake_cannot_accept() {
    let h = harness().await;
    let mut params = standard_bounty();
    params.guild_stake_required = 600;
    let bounty = h.court.post_bounty(&client(), params).await.unwrap();

    let err = h.court.accept_bounty(&bounty.id, &guild()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientGuildStake);
    assert_eq!(h.court.bounty(&bounty.id).await.unwrap().status, BountyStatus::Open);
    assert_eq!(balance(&h, &guild()).await, Balance::new(500, 0));
}

#[tokio::test]
async fn test_client_cannot_overcommit() {
    let h = harness().await;
    let mut params = standard_bounty();
    params.reward_credits = 950;

    let err = h.court.post_bounty(&client(), params).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(h.court.bounties().await.is_empty());
}

#[tokio::test]
async fn test_cancel_releases_escrow_once() {
    let h = harness().await;
    let bounty = h.court.post_bounty(&client(), standard_bounty()).await.unwrap();

    let err = h.court.cancel_bounty(&bounty.id, &guild()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let cancelled = h.court.cancel_bounty(&bounty.id, &client()).await.unwrap();
    assert_eq!(cancelled.status, BountyStatus::Cancelled);
    assert_eq!(balance(&h, &client()).await, Balance::new(1000, 0));

    let err = h.court.cancel_bounty(&bounty.id, &client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert!(err.to_string().contains("final"), "{}", err);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_overdue_bounty_fails_and_forfeits_guild_stake() {
    let h = harness().await;
    let mut params = standard_bounty();
    params.deadline = Some(Utc::now() + Duration::hours(1));
    let bounty = h.court.post_bounty(&client(), params).await.unwrap();
    h.court.accept_bounty(&bounty.id, &guild()).await.unwrap();

    assert!(h.court.expire_overdue(Utc::now()).await.unwrap().is_empty());

    let expired = h
        .court
        .expire_overdue(Utc::now() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].status, BountyStatus::Failed);

    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(450, 0));
    assert_eq!(trust(&h, &guild()).await, 40.0);
    assert_ok!(h.ledger.verify_all().await);
}

// =============================================================================
// Negotiation
// =============================================================================

#[tokio::test]
async fn test_negotiated_split() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    assert_eq!(dispute.status, DisputeStatus::Negotiating);

    h.court
        .propose_settlement(
            &dispute.id,
            &guild(),
            Ruling::Split,
            Some("Half the work landed".to_string()),
        )
        .await
        .unwrap();

    let err = h.court.accept_proposal(&dispute.id, &guild()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let resolved = h.court.accept_proposal(&dispute.id, &client()).await.unwrap();
    assert_eq!(resolved.final_ruling, Some(Ruling::Split));
    assert_eq!(resolved.ruling_source, Some(RulingSource::Negotiation));

    assert_eq!(balance(&h, &client()).await, Balance::new(900, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(600, 0));
    assert_eq!(trust(&h, &client()).await, 48.0);
    assert_eq!(trust(&h, &guild()).await, 48.0);

    let bounty = h.court.bounty(&resolved.bounty_id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Completed);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_repeated_settlement_is_noop() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    h.court
        .propose_settlement(&dispute.id, &client(), Ruling::ClientWins, None)
        .await
        .unwrap();
    h.court.accept_proposal(&dispute.id, &guild()).await.unwrap();

    let entries = h.ledger.journal_len().await;
    let again = h.court.accept_proposal(&dispute.id, &guild()).await.unwrap();

    assert!(again.is_resolved());
    assert_eq!(h.ledger.journal_len().await, entries);
    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
}

#[tokio::test]
async fn test_concurrent_settlement_triggers_pay_once() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    h.court
        .propose_settlement(&dispute.id, &client(), Ruling::ClientWins, None)
        .await
        .unwrap();
    let mut events = h.court.subscribe();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let court = h.court.clone();
            let id = dispute.id.clone();
            tokio::spawn(async move { court.accept_proposal(&id, &guild()).await })
        })
        .collect();
    for task in tasks {
        let resolved = task.await.unwrap().unwrap();
        assert_eq!(resolved.final_ruling, Some(Ruling::ClientWins));
    }

    let mut resolutions = 0;
    while let Ok(record) = events.try_recv() {
        if matches!(record.event, CourtEvent::DisputeResolved { .. }) {
            resolutions += 1;
        }
    }
    assert_eq!(resolutions, 1);
    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(450, 0));
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_lost_dispute_write_is_retried_before_credits_move() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    h.court
        .propose_settlement(&dispute.id, &guild(), Ruling::GuildWins, None)
        .await
        .unwrap();

    h.store.fail_dispute_writes(1);
    let resolved = h.court.accept_proposal(&dispute.id, &client()).await.unwrap();

    assert_eq!(resolved.final_ruling, Some(Ruling::GuildWins));
    assert_eq!(balance(&h, &guild()).await, Balance::new(800, 0));
    assert_eq!(balance(&h, &client()).await, Balance::new(700, 0));
    let bounty = h.court.bounty(&resolved.bounty_id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Completed);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_failed_settlement_moves_nothing() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    h.court
        .propose_settlement(&dispute.id, &guild(), Ruling::GuildWins, None)
        .await
        .unwrap();
    let entries = h.ledger.journal_len().await;

    // Both the first attempt and its retry lose the bounty write.
    h.store.fail_bounty_writes(2);
    let err = h.court.accept_proposal(&dispute.id, &client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);

    let stored = h.court.dispute(&dispute.id).await.unwrap();
    assert!(!stored.is_resolved());
    assert_eq!(stored.final_ruling, None);
    assert!(stored.proposal.is_some());
    let bounty = h.court.bounty(&dispute.bounty_id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Disputed);
    assert_eq!(bounty.guild_stake_locked, 50);
    assert_eq!(h.ledger.journal_len().await, entries);
    assert_eq!(balance(&h, &client()).await, Balance::new(700, 300));
    assert_eq!(balance(&h, &guild()).await, Balance::new(450, 50));

    // The dispute is not stranded.
    let resolved = h.court.accept_proposal(&dispute.id, &client()).await.unwrap();
    assert_eq!(resolved.final_ruling, Some(Ruling::GuildWins));
    assert_eq!(balance(&h, &guild()).await, Balance::new(800, 0));
    assert_ok!(h.ledger.verify_all().await);
}

// =============================================================================
// AI arbiter
// =============================================================================

#[tokio::test]
async fn test_accepted_suggestion_settles_and_returns_ai_stake() {
    let mock = MockArbiter::new("mock").with_verdict(
        Verdict::new(Ruling::ClientWins, 0.9, "Submission does not meet the brief").with_stake(20),
    );
    let h = harness_with(config(), mock).await;
    let dispute = disputed(&h).await;

    let dispute = h.court.escalate(&dispute.id, &guild()).await.unwrap();
    assert_eq!(dispute.tier, DisputeTier::AiArbiter);
    let suggestion = dispute.ai_suggestion.clone().unwrap();
    assert_eq!(suggestion.ai_stake_locked, 20);
    assert_eq!(balance(&h, &arbiter_account()).await, Balance::new(180, 20));

    let request = h.mock.last_request().await.unwrap();
    assert_eq!(request.client_evidence.len(), 1);
    assert_eq!(request.bounty.reward_credits, 200);

    let resolved = h.court.respond_to_suggestion(&dispute.id, &client(), true).await.unwrap();
    assert_eq!(resolved.final_ruling, Some(Ruling::ClientWins));
    assert_eq!(resolved.ruling_source, Some(RulingSource::AiArbiter));
    assert_eq!(balance(&h, &arbiter_account()).await, Balance::new(200, 0));
    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_both_parties_policy_waits_for_second_acceptance() {
    let mut config = config();
    config.dispute.ai_acceptance = AcceptancePolicy::BothParties;
    let mock = MockArbiter::new("mock")
        .with_verdict(Verdict::new(Ruling::GuildWins, 0.8, "Work matches"));
    let h = harness_with(config, mock).await;
    let dispute = disputed(&h).await;
    h.court.escalate(&dispute.id, &client()).await.unwrap();

    let pending = h.court.respond_to_suggestion(&dispute.id, &guild(), true).await.unwrap();
    assert!(!pending.is_resolved());

    let err = h.court.respond_to_suggestion(&dispute.id, &guild(), true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let resolved = h.court.respond_to_suggestion(&dispute.id, &client(), true).await.unwrap();
    assert_eq!(resolved.final_ruling, Some(Ruling::GuildWins));
}

#[tokio::test]
async fn test_arbiter_failure_is_not_fatal() {
    let h = harness_with(config(), MockArbiter::new("mock").with_failure("model offline")).await;
    let dispute = disputed(&h).await;
    let mut events = h.court.subscribe();

    let dispute = h.court.escalate(&dispute.id, &client()).await.unwrap();
    assert_eq!(dispute.tier, DisputeTier::AiArbiter);
    assert!(dispute.ai_suggestion.is_none());

    let err = h.court.request_suggestion(&dispute.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalServiceUnavailable);

    let mut saw_unavailable = false;
    while let Ok(record) = events.try_recv() {
        if matches!(record.event, CourtEvent::ArbiterUnavailable { .. }) {
            saw_unavailable = true;
        }
    }
    assert!(saw_unavailable);

    // The dispute can still move on to a tribunal.
    let dispute = h.court.escalate(&dispute.id, &client()).await.unwrap();
    assert_eq!(dispute.tier, DisputeTier::Tribunal);
}

#[tokio::test]
async fn test_rejected_suggestion_escalates_without_moving_stake() {
    let mock = MockArbiter::new("mock")
        .with_verdict(Verdict::new(Ruling::Split, 0.4, "Partial delivery").with_stake(20));
    let h = harness_with(config(), mock).await;
    let dispute = disputed(&h).await;
    h.court
        .submit_evidence(
            &dispute.id,
            &guild(),
            "Benchmarks attached",
            Some("ipfs://bench".to_string()),
        )
        .await
        .unwrap();
    let before = h.court.escalate(&dispute.id, &client()).await.unwrap();
    assert_eq!(before.ai_suggestion.as_ref().unwrap().ruling, Ruling::Split);

    let client_before = balance(&h, &client()).await;
    let guild_before = balance(&h, &guild()).await;
    let arbiter_before = balance(&h, &arbiter_account()).await;

    let after = h.court.respond_to_suggestion(&dispute.id, &guild(), false).await.unwrap();

    assert_eq!(after.tier, DisputeTier::Tribunal);
    assert_eq!(after.status, DisputeStatus::InTribunal);
    assert_eq!(after.client_evidence, before.client_evidence);
    assert_eq!(after.guild_evidence, before.guild_evidence);
    assert_eq!(after.tribunal_jurors.as_ref().map(Vec::len), Some(3));
    assert_eq!(balance(&h, &client()).await, client_before);
    assert_eq!(balance(&h, &guild()).await, guild_before);
    assert_eq!(balance(&h, &arbiter_account()).await, arbiter_before);
}

// =============================================================================
// Tribunal
// =============================================================================

#[tokio::test]
async fn test_tribunal_guild_wins() {
    let mock = MockArbiter::new("mock")
        .with_verdict(Verdict::new(Ruling::Split, 0.5, "Unclear").with_stake(20));
    let h = harness_with(config(), mock).await;
    let dispute = before_tribunal(&h).await;

    let jurors = dispute.tribunal_jurors.clone().unwrap();
    assert!(!jurors.contains(&guild()));
    assert_eq!(jurors.len(), 3);

    let err = h.court.cast_vote(&dispute.id, &guild(), Ruling::GuildWins, 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAJuror);

    let err = h.court.cast_vote(&dispute.id, &juror(1), Ruling::GuildWins, 500).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStakeForVote);

    let open = h.court.cast_vote(&dispute.id, &juror(1), Ruling::GuildWins, 10).await.unwrap();
    assert!(!open.is_resolved());
    let resolved = h.court.cast_vote(&dispute.id, &juror(2), Ruling::GuildWins, 10).await.unwrap();

    assert_eq!(resolved.final_ruling, Some(Ruling::GuildWins));
    assert_eq!(resolved.ruling_source, Some(RulingSource::Tribunal));

    // Client stake to the guild, guild stake back, reward paid.
    assert_eq!(balance(&h, &client()).await, Balance::new(700, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(800, 0));
    let bounty = h.court.bounty(&resolved.bounty_id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Completed);
    assert_eq!(bounty.guild_stake_locked, 0);

    // The arbiter suggested Split and loses its stake.
    assert_eq!(balance(&h, &arbiter_account()).await, Balance::new(180, 0));
    assert_eq!(balance(&h, &AccountRef::treasury()).await, Balance::new(20, 0));

    assert_eq!(balance(&h, &juror(1)).await, Balance::new(100, 0));
    assert_eq!(trust(&h, &guild()).await, 55.0);
    assert_eq!(trust(&h, &client()).await, 40.0);
    assert_eq!(trust(&h, &juror(1)).await, 51.0);

    let err = h.court.cast_vote(&dispute.id, &juror(3), Ruling::ClientWins, 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_stake_weighted_tribunal_pays_aligned_juror() {
    let mut config = config();
    config.tribunal.quorum_fraction = 0.7;
    let h = harness_with(config, MockArbiter::new("mock")).await;
    let dispute = before_tribunal(&h).await;

    h.court.cast_vote(&dispute.id, &juror(1), Ruling::ClientWins, 30).await.unwrap();
    h.court.cast_vote(&dispute.id, &juror(2), Ruling::GuildWins, 10).await.unwrap();
    let resolved = h.court.cast_vote(&dispute.id, &juror(3), Ruling::GuildWins, 10).await.unwrap();

    assert_eq!(resolved.final_ruling, Some(Ruling::ClientWins));
    assert_eq!(balance(&h, &juror(1)).await, Balance::new(120, 0));
    assert_eq!(balance(&h, &juror(2)).await, Balance::new(90, 0));
    assert_eq!(balance(&h, &juror(3)).await, Balance::new(90, 0));

    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(450, 0));
    let bounty = h.court.bounty(&resolved.bounty_id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Failed);
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_concurrent_duplicate_vote() {
    let h = harness().await;
    let dispute = before_tribunal(&h).await;

    let a = {
        let court = h.court.clone();
        let id = dispute.id.clone();
        tokio::spawn(async move { court.cast_vote(&id, &juror(1), Ruling::ClientWins, 10).await })
    };
    let b = {
        let court = h.court.clone();
        let id = dispute.id.clone();
        tokio::spawn(async move { court.cast_vote(&id, &juror(1), Ruling::GuildWins, 10).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.kind(), ErrorKind::DuplicateVote);

    let stored = h.court.dispute(&dispute.id).await.unwrap();
    assert_eq!(stored.tribunal_votes.len(), 1);
    assert_eq!(balance(&h, &juror(1)).await, Balance::new(90, 10));
}

#[tokio::test]
async fn test_lost_vote_write_releases_stake() {
    let h = harness().await;
    let dispute = before_tribunal(&h).await;

    h.store.fail_dispute_writes(1);
    let stored = h.court.cast_vote(&dispute.id, &juror(1), Ruling::GuildWins, 10).await.unwrap();

    assert_eq!(stored.tribunal_votes.len(), 1);
    assert_eq!(balance(&h, &juror(1)).await, Balance::new(90, 10));
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_tribunal_needs_enough_jurors() {
    let mut config = config();
    config.tribunal.min_panel_size = 4;
    let h = harness_with(config, MockArbiter::new("mock")).await;
    let dispute = disputed(&h).await;
    h.court.escalate(&dispute.id, &client()).await.unwrap();

    let err = h.court.escalate(&dispute.id, &client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientJurors);
    assert_eq!(h.court.dispute(&dispute.id).await.unwrap().tier, DisputeTier::AiArbiter);
}

// =============================================================================
// Tier monotonicity and staleness
// =============================================================================

#[tokio::test]
async fn test_tribunal_is_final_tier() {
    let h = harness().await;
    let dispute = before_tribunal(&h).await;

    let err = h.court.escalate(&dispute.id, &client()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let err = h
        .court
        .submit_evidence(&dispute.id, &client(), "Late evidence", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let err = h
        .court
        .propose_settlement(&dispute.id, &client(), Ruling::Split, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);

    let err = h.court.escalate(&dispute.id, &juror(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_stale_disputes_escalate() {
    let h = harness().await;
    let dispute = disputed(&h).await;

    let report = h.court.sweep(Utc::now() + Duration::hours(1)).await.unwrap();
    assert!(report.escalated.is_empty());

    let escalated = h.court.escalate_stale(Utc::now() + Duration::hours(73)).await.unwrap();
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0].tier, DisputeTier::AiArbiter);
    assert!(escalated[0].ai_suggestion.is_some());

    let escalated = h.court.escalate_stale(Utc::now() + Duration::hours(49)).await.unwrap();
    assert_eq!(escalated.len(), 1);
    assert_eq!(escalated[0].tier, DisputeTier::Tribunal);

    let stored = h.court.dispute(&dispute.id).await.unwrap();
    assert_eq!(stored.raised_by, Party::Client);
    assert_eq!(stored.tier, DisputeTier::Tribunal);
}

#[tokio::test]
async fn test_unrepresentable_budget_never_goes_stale() {
    let mut config = config();
    config.dispute.negotiation_timeout_secs = u64::MAX / 2;
    let h = harness_with(config, MockArbiter::new("mock")).await;
    let dispute = disputed(&h).await;

    let report = h.court.sweep(Utc::now() + Duration::days(365)).await.unwrap();

    assert!(report.escalated.is_empty());
    assert_eq!(h.court.dispute(&dispute.id).await.unwrap().tier, DisputeTier::Negotiation);
}

#[tokio::test]
async fn test_unrepresentable_default_deadline_is_rejected() {
    let mut config = config();
    config.bounty.default_deadline_secs = u64::MAX;
    let h = harness_with(config, MockArbiter::new("mock")).await;

    let err = h.court.post_bounty(&client(), standard_bounty()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(balance(&h, &client()).await, Balance::new(1000, 0));
}

// =============================================================================
// Reputation
// =============================================================================

#[tokio::test]
async fn test_decay_once_per_period() {
    let h = harness().await;
    let later = Utc::now() + Duration::days(31);

    let report = h.court.decay_sweep(later).await.unwrap();
    assert_eq!(report.examined, 6);
    assert_eq!(report.decayed, 6);
    assert!((trust(&h, &guild()).await - 47.5).abs() < 1e-9);

    let report = h.court.decay_sweep(later + Duration::days(1)).await.unwrap();
    assert_eq!(report.decayed, 0);

    let report = h.court.decay_sweep(later + Duration::days(8)).await.unwrap();
    assert_eq!(report.decayed, 6);
    assert!((trust(&h, &guild()).await - 45.125).abs() < 1e-9);
}

#[tokio::test]
async fn test_demurrage_moves_idle_credits_to_treasury() {
    let mut config = config();
    config.reputation.demurrage_bps = 100;
    let h = harness_with(config, MockArbiter::new("mock")).await;

    let report = h.court.decay_sweep(Utc::now() + Duration::days(31)).await.unwrap();

    assert_eq!(balance(&h, &guild()).await, Balance::new(495, 0));
    assert_eq!(balance(&h, &client()).await, Balance::new(990, 0));
    // 10 + 5 + 1 + 1 + 1 + 2
    assert_eq!(report.demurrage_collected, 20);
    assert_eq!(balance(&h, &AccountRef::treasury()).await, Balance::new(20, 0));
    assert_ok!(h.ledger.verify_all().await);
}

#[tokio::test]
async fn test_decay_concurrent_with_settlement() {
    let h = harness().await;
    let dispute = disputed(&h).await;
    h.court
        .propose_settlement(&dispute.id, &client(), Ruling::ClientWins, None)
        .await
        .unwrap();

    let settle = {
        let court = h.court.clone();
        let id = dispute.id.clone();
        tokio::spawn(async move { court.accept_proposal(&id, &guild()).await })
    };
    let decay = {
        let court = h.court.clone();
        tokio::spawn(async move { court.decay_sweep(Utc::now() + Duration::days(31)).await })
    };
    assert!(settle.await.unwrap().unwrap().is_resolved());
    assert_eq!(decay.await.unwrap().unwrap().decayed, 6);

    // Either order is fine; neither update may be lost.
    let client_trust = trust(&h, &client()).await;
    let guild_trust = trust(&h, &guild()).await;
    assert!(
        [52.5, 52.25].iter().any(|t| (client_trust - t).abs() < 1e-9),
        "client trust {}",
        client_trust
    );
    assert!(
        [37.5, 38.0].iter().any(|t| (guild_trust - t).abs() < 1e-9),
        "guild trust {}",
        guild_trust
    );
    assert_eq!(balance(&h, &client()).await, Balance::new(1050, 0));
    assert_eq!(balance(&h, &guild()).await, Balance::new(450, 0));
    assert_ok!(h.ledger.verify_all().await);
}
