//! Node configuration

use clap::ValueEnum;
use court::CourtConfig;
use ledger::AccountKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub arbiter: ArbiterConfig,
    #[serde(default)]
    pub court: CourtConfig,
    /// Accounts opened (and funded) at startup
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Seconds between court sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_port: default_http_port(),
        }
    }
}

/// Which arbiter backend to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Canned verdicts, no network
    #[default]
    Mock,
    /// OpenAI-compatible chat completions endpoint
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Cap on the stake a verdict may carry
    #[serde(default = "default_max_ai_stake")]
    pub max_ai_stake: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: None,
            timeout_ms: default_timeout_ms(),
            max_ai_stake: default_max_ai_stake(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAccount {
    pub kind: AccountKind,
    pub id: String,

    /// Credits deposited at startup
    #[serde(default)]
    pub deposit: u64,

    /// Starting trust score; the ledger default when absent
    #[serde(default)]
    pub trust: Option<f64>,
}

// Defaults
fn default_node_id() -> String { "court-1".to_string() }
fn default_sweep_interval() -> u64 { 60 }
fn default_bind_addr() -> String { "127.0.0.1".to_string() }
fn default_http_port() -> u16 { 8080 }
fn default_base_url() -> String { "http://localhost:11434/v1".to_string() }
fn default_model() -> String { "llama3".to_string() }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_max_ai_stake() -> u64 { 100 }
fn default_temperature() -> f32 { 0.2 }
