//! HTTP API - the court operations exposed over JSON
//!
//! Callers identify themselves with an `AccountRef` in the request body;
//! authentication happens in front of this service.

pub mod routes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use court::{BountyCourt, CourtError, ErrorKind};
use serde::Serialize;
use tracing::warn;

/// Court shared across handlers
pub type SharedCourt = Arc<BountyCourt>;

/// Create the API router
pub fn create_router(court: SharedCourt) -> Router {
    Router::new()
        // Bounties
        .route("/api/bounties", get(routes::list_bounties).post(routes::post_bounty))
        .route("/api/bounties/:id", get(routes::get_bounty))
        .route("/api/bounties/:id/match", post(routes::match_bounty))
        .route("/api/bounties/:id/accept", post(routes::accept_bounty))
        .route("/api/bounties/:id/start", post(routes::start_work))
        .route("/api/bounties/:id/proof", post(routes::submit_proof))
        .route("/api/bounties/:id/review/begin", post(routes::begin_review))
        .route("/api/bounties/:id/review", post(routes::review_submission))
        .route("/api/bounties/:id/dispute", post(routes::raise_dispute))
        .route("/api/bounties/:id/cancel", post(routes::cancel_bounty))
        // Disputes
        .route("/api/disputes", get(routes::list_disputes))
        .route("/api/disputes/:id", get(routes::get_dispute))
        .route("/api/disputes/:id/evidence", post(routes::submit_evidence))
        .route("/api/disputes/:id/proposal", post(routes::propose_settlement))
        .route("/api/disputes/:id/proposal/accept", post(routes::accept_proposal))
        .route("/api/disputes/:id/escalate", post(routes::escalate))
        .route("/api/disputes/:id/suggestion", post(routes::request_suggestion))
        .route("/api/disputes/:id/suggestion/respond", post(routes::respond_to_suggestion))
        .route("/api/disputes/:id/votes", post(routes::cast_vote))
        // Ledger and maintenance
        .route("/api/accounts/:kind/:id", get(routes::get_account))
        .route("/api/sweep", post(routes::sweep))
        // Health check
        .route("/health", get(routes::health))
        .with_state(court)
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// A court error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CourtError);

impl From<CourtError> for ApiError {
    fn from(e: CourtError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized | ErrorKind::NotAJuror => StatusCode::FORBIDDEN,
        ErrorKind::InvalidStateTransition
        | ErrorKind::DuplicateVote
        | ErrorKind::ConcurrentModification => StatusCode::CONFLICT,
        ErrorKind::InsufficientFunds
        | ErrorKind::InsufficientGuildStake
        | ErrorKind::InsufficientStakeForVote
        | ErrorKind::InsufficientJurors => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidAmount | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ExternalServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            warn!(kind = kind.as_str(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter::{ArbiterBackend, ArbiterService, MockArbiter};
    use court::{InMemoryStore, TrustMatchmaker};
    use ledger::{AccountRef, Ledger};
    use serde_json::{json, Value};

    async fn serve() -> (String, SharedCourt) {
        let ledger = Arc::new(Ledger::new());
        for (account, credits) in [
            (AccountRef::user("alice"), 1000),
            (AccountRef::guild("forge"), 500),
            (AccountRef::arbiter("ai-arbiter"), 200),
        ] {
            ledger.open_account(&account).await;
            ledger.deposit(&account, credits).await.unwrap();
        }
        let backend: Arc<dyn ArbiterBackend> = Arc::new(MockArbiter::new("mock"));
        let court = Arc::new(
            BountyCourt::new(
                ledger,
                Arc::new(InMemoryStore::new()),
                Arc::new(ArbiterService::new(vec![backend])),
            )
            .with_matchmaker(Arc::new(TrustMatchmaker)),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(court.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), court)
    }

    fn alice() -> Value {
        json!({"kind": "user", "id": "alice"})
    }

    fn forge() -> Value {
        json!({"kind": "guild", "id": "forge"})
    }

    #[tokio::test]
    async fn test_bounty_dispute_and_settlement_over_http() {
        let (base, court) = serve().await;
        let http = reqwest::Client::new();

        let bounty: Value = http
            .post(format!("{}/api/bounties", base))
            .json(&json!({
                "client": alice(),
                "title": "Port the scheduler",
                "description": "Move the job scheduler onto the new runtime",
                "reward_credits": 200,
                "client_stake": 100,
                "guild_stake_required": 50,
                "reputation_bonus": 3.0
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = bounty["id"].as_str().unwrap().to_string();

        for (step, body) in [
            ("accept", json!({"actor": forge()})),
            ("start", json!({"actor": forge()})),
            ("proof", json!({"actor": forge(), "proof": "PR #42 merged"})),
        ] {
            let res = http
                .post(format!("{}/api/bounties/{}/{}", base, id, step))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert!(res.status().is_success(), "{} failed: {}", step, res.status());
        }

        let outcome: Value = http
            .post(format!("{}/api/bounties/{}/review", base, id))
            .json(&json!({"actor": alice(), "approve": false, "reason": "Tests are failing"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(outcome["outcome"], "disputed");
        let dispute_id = outcome["dispute"]["id"].as_str().unwrap().to_string();

        http.post(format!("{}/api/disputes/{}/proposal", base, dispute_id))
            .json(&json!({"actor": forge(), "ruling": "split"}))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap();
        let resolved: Value = http
            .post(format!("{}/api/disputes/{}/proposal/accept", base, dispute_id))
            .json(&json!({"actor": alice()}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resolved["final_ruling"], "split");

        let account: Value = http
            .get(format!("{}/api/accounts/guild/forge", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(account["balance"]["available"], 600);
        assert!(court.ledger().verify_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_court_errors_map_to_status_codes() {
        let (base, _court) = serve().await;
        let http = reqwest::Client::new();

        let res = http.get(format!("{}/api/bounties/missing", base)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["kind"], "not_found");

        let res = http
            .post(format!("{}/api/bounties", base))
            .json(&json!({"client": forge(), "reward_credits": 10}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = http.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "OK");
    }
}
