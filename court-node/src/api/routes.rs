//! API route handlers
//!
//! Thin wrappers: each handler decodes its body, calls one court operation
//! and returns the stored record.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use arbiter::Ruling;
use chrono::Utc;
use court::{Bounty, Dispute, NewBounty, ReviewOutcome, SweepReport};
use ledger::{Account, AccountKind, AccountRef};
use serde::Deserialize;

use super::{ApiError, SharedCourt};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

// === Request bodies ===

#[derive(Deserialize)]
pub struct PostBountyRequest {
    pub client: AccountRef,
    #[serde(flatten)]
    pub bounty: NewBounty,
}

/// Body of every action that needs nothing but the caller
#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: AccountRef,
}

#[derive(Deserialize)]
pub struct ProofRequest {
    pub actor: AccountRef,
    pub proof: String,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub actor: AccountRef,
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct DisputeRequest {
    pub actor: AccountRef,
    #[serde(default)]
    pub statement: Option<String>,
}

#[derive(Deserialize)]
pub struct EvidenceRequest {
    pub actor: AccountRef,
    pub content: String,
    #[serde(default)]
    pub attachment_uri: Option<String>,
}

#[derive(Deserialize)]
pub struct ProposalRequest {
    pub actor: AccountRef,
    pub ruling: Ruling,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub actor: AccountRef,
    pub accept: bool,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub juror: AccountRef,
    pub vote: Ruling,
    pub staked_amount: u64,
}

// === Bounties ===

/// GET /api/bounties
pub async fn list_bounties(State(court): State<SharedCourt>) -> Json<Vec<Bounty>> {
    Json(court.bounties().await)
}

/// POST /api/bounties
pub async fn post_bounty(
    State(court): State<SharedCourt>,
    Json(req): Json<PostBountyRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.post_bounty(&req.client, req.bounty).await?))
}

/// GET /api/bounties/:id
pub async fn get_bounty(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
) -> ApiResult<Bounty> {
    Ok(Json(court.bounty(&id).await?))
}

/// POST /api/bounties/:id/match
pub async fn match_bounty(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
) -> ApiResult<Bounty> {
    Ok(Json(court.match_bounty(&id).await?))
}

/// POST /api/bounties/:id/accept
pub async fn accept_bounty(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.accept_bounty(&id, &req.actor).await?))
}

/// POST /api/bounties/:id/start
pub async fn start_work(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.start_work(&id, &req.actor).await?))
}

/// POST /api/bounties/:id/proof
pub async fn submit_proof(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ProofRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.submit_proof(&id, &req.actor, req.proof).await?))
}

/// POST /api/bounties/:id/review/begin
pub async fn begin_review(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.begin_review(&id, &req.actor).await?))
}

/// POST /api/bounties/:id/review
pub async fn review_submission(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> ApiResult<ReviewOutcome> {
    Ok(Json(
        court
            .review_submission(&id, &req.actor, req.approve, req.reason)
            .await?,
    ))
}

/// POST /api/bounties/:id/dispute
pub async fn raise_dispute(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(court.raise_dispute(&id, &req.actor, req.statement).await?))
}

/// POST /api/bounties/:id/cancel
pub async fn cancel_bounty(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Bounty> {
    Ok(Json(court.cancel_bounty(&id, &req.actor).await?))
}

// === Disputes ===

/// GET /api/disputes
pub async fn list_disputes(State(court): State<SharedCourt>) -> Json<Vec<Dispute>> {
    Json(court.disputes().await)
}

/// GET /api/disputes/:id
pub async fn get_dispute(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
) -> ApiResult<Dispute> {
    Ok(Json(court.dispute(&id).await?))
}

/// POST /api/disputes/:id/evidence
pub async fn submit_evidence(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<EvidenceRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(
        court
            .submit_evidence(&id, &req.actor, req.content, req.attachment_uri)
            .await?,
    ))
}

/// POST /api/disputes/:id/proposal
pub async fn propose_settlement(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ProposalRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(
        court
            .propose_settlement(&id, &req.actor, req.ruling, req.note)
            .await?,
    ))
}

/// POST /api/disputes/:id/proposal/accept
pub async fn accept_proposal(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(court.accept_proposal(&id, &req.actor).await?))
}

/// POST /api/disputes/:id/escalate
pub async fn escalate(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(court.escalate(&id, &req.actor).await?))
}

/// POST /api/disputes/:id/suggestion - retry the AI arbiter
pub async fn request_suggestion(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
) -> ApiResult<Dispute> {
    Ok(Json(court.request_suggestion(&id).await?))
}

/// POST /api/disputes/:id/suggestion/respond
pub async fn respond_to_suggestion(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(court.respond_to_suggestion(&id, &req.actor, req.accept).await?))
}

/// POST /api/disputes/:id/votes
pub async fn cast_vote(
    State(court): State<SharedCourt>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Dispute> {
    Ok(Json(
        court
            .cast_vote(&id, &req.juror, req.vote, req.staked_amount)
            .await?,
    ))
}

// === Ledger and maintenance ===

/// GET /api/accounts/:kind/:id
pub async fn get_account(
    State(court): State<SharedCourt>,
    Path((kind, id)): Path<(AccountKind, String)>,
) -> ApiResult<Account> {
    let account = court
        .ledger()
        .account(&AccountRef::new(kind, id))
        .await
        .map_err(court::CourtError::from)?;
    Ok(Json(account))
}

/// POST /api/sweep - run the periodic jobs now
pub async fn sweep(State(court): State<SharedCourt>) -> ApiResult<SweepReport> {
    Ok(Json(court.sweep(Utc::now()).await?))
}
