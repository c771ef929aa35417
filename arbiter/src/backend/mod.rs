//! Arbiter backend abstraction layer.
//!
//! Provides a trait-based interface over arbitration services:
//! - OpenAI-compatible chat completion endpoints (vLLM, Ollama, OpenAI, etc.)
//! - Mock backend for testing

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockArbiter;
pub use openai::OpenAiArbiter;
pub use traits::{ArbiterBackend, ArbiterError};
