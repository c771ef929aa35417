//! Court error type.

use arbiter::ServiceError;
use ledger::LedgerError;
use serde::{Deserialize, Serialize};

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientFunds,
    InsufficientGuildStake,
    InsufficientStakeForVote,
    InvalidStateTransition,
    NotAJuror,
    DuplicateVote,
    ConcurrentModification,
    ExternalServiceUnavailable,
    Unauthorized,
    NotFound,
    InsufficientJurors,
    InvalidAmount,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InsufficientGuildStake => "insufficient_guild_stake",
            ErrorKind::InsufficientStakeForVote => "insufficient_stake_for_vote",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::NotAJuror => "not_a_juror",
            ErrorKind::DuplicateVote => "duplicate_vote",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::ExternalServiceUnavailable => "external_service_unavailable",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientJurors => "insufficient_jurors",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Error types for court operations.
#[derive(Debug, thiserror::Error)]
pub enum CourtError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u64, available: u64 },

    #[error("Guild cannot cover the required stake of {required}")]
    InsufficientGuildStake { required: u64 },

    #[error("Juror cannot cover a vote stake of {requested}")]
    InsufficientStakeForVote { requested: u64 },

    #[error("Invalid transition: {0}")]
    InvalidStateTransition(String),

    #[error("{0} is not a juror on this dispute")]
    NotAJuror(String),

    #[error("{0} already voted on this dispute")]
    DuplicateVote(String),

    #[error("{0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("External service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Only {available} eligible jurors, need {required}")]
    InsufficientJurors { available: usize, required: usize },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Ledger invariant failure; detail stays in the logs
    #[error("Internal ledger error")]
    Ledger(#[source] LedgerError),
}

impl CourtError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourtError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            CourtError::InsufficientGuildStake { .. } => ErrorKind::InsufficientGuildStake,
            CourtError::InsufficientStakeForVote { .. } => ErrorKind::InsufficientStakeForVote,
            CourtError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            CourtError::NotAJuror(_) => ErrorKind::NotAJuror,
            CourtError::DuplicateVote(_) => ErrorKind::DuplicateVote,
            CourtError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            CourtError::ExternalServiceUnavailable(_) => ErrorKind::ExternalServiceUnavailable,
            CourtError::Unauthorized(_) => ErrorKind::Unauthorized,
            CourtError::NotFound(_) => ErrorKind::NotFound,
            CourtError::InsufficientJurors { .. } => ErrorKind::InsufficientJurors,
            CourtError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            CourtError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CourtError::Ledger(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn transition(message: impl Into<String>) -> Self {
        CourtError::InvalidStateTransition(message.into())
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        CourtError::Unauthorized(message.into())
    }
}

impl From<LedgerError> for CourtError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                requested, available, ..
            } => CourtError::InsufficientFunds { requested, available },
            LedgerError::AccountNotFound(account) => {
                CourtError::NotFound(format!("account {}", account))
            }
            other => CourtError::Ledger(other),
        }
    }
}

impl From<ServiceError> for CourtError {
    fn from(err: ServiceError) -> Self {
        CourtError::ExternalServiceUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CourtError>;
