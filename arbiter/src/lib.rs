//! AI Arbiter for Guildhall disputes
//!
//! Produces advisory rulings for disputes in the AI arbitration tier:
//! - Trait-based backends (OpenAI-compatible endpoints, mock)
//! - Prompt assembly from bounty facts and both evidence bundles
//! - Audit trail keyed by evidence digests
//!
//! ```text
//! ┌─────────────────────────────┐
//! │        ArbiterService       │
//! │ (backend selection, timeout │
//! │  and verdict validation)    │
//! └──────────────┬──────────────┘
//!                ▼
//!        ┌───────────────┐
//!        │ ArbiterBackend│
//!        │ (OpenAI/Mock) │
//!        └───────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod prompt;
pub mod service;
pub mod types;

pub use backend::{ArbiterBackend, ArbiterError, MockArbiter, OpenAiArbiter};
pub use service::{ArbiterService, ArbiterServiceConfig, ServiceError};
pub use types::*;
