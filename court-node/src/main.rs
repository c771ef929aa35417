//! court-node: daemon hosting a Guildhall bounty court
//!
//! Builds the stake ledger, the AI arbiter service and the court from a TOML
//! file, serves the court operations over HTTP and runs the periodic sweep:
//! - deadline expiry of accepted bounties
//! - escalation of disputes that outlived their tier budget
//! - reputation decay of idle accounts

mod api;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arbiter::{ArbiterBackend, ArbiterService, ArbiterServiceConfig, MockArbiter, OpenAiArbiter};
use chrono::Utc;
use clap::{Parser, Subcommand};
use court::{BountyCourt, InMemoryStore, TrustMatchmaker};
use ledger::{AccountRef, Ledger};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use config::{BackendKind, Config};

#[derive(Parser)]
#[command(name = "court-node")]
#[command(about = "Bounty court daemon for Guildhall")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "court-node.toml")]
    config: String,

    /// Node ID (overrides config file)
    #[arg(long, env = "COURT_NODE_ID")]
    node_id: Option<String>,

    /// Seconds between sweeps (overrides config file)
    #[arg(long, env = "COURT_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// HTTP API port (overrides config file)
    #[arg(long, env = "COURT_HTTP_PORT")]
    http_port: Option<u16>,

    /// Arbiter backend (overrides config file)
    #[arg(long, env = "COURT_ARBITER_BACKEND", value_enum)]
    arbiter_backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and run the sweep loop until interrupted (default)
    Run,
    /// Run a single sweep and print the report as JSON
    SweepOnce,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("court_node=info".parse()?)
                .add_directive("court=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)
            .with_context(|| format!("reading {}", cli.config))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", cli.config))?
    } else {
        info!(path = %cli.config, "Config file not found, using defaults");
        Config::default()
    };

    if let Some(node_id) = cli.node_id {
        config.node.id = node_id;
    }
    if let Some(interval) = cli.sweep_interval_secs {
        config.node.sweep_interval_secs = interval;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(backend) = cli.arbiter_backend {
        config.arbiter.backend = backend;
    }
    config
        .court
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid court config: {}", e))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::SweepOnce => {
            let court = build_court(&config).await?;
            let report = court.sweep(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        node_id = %config.node.id,
        backend = ?config.arbiter.backend,
        sweep_interval_secs = config.node.sweep_interval_secs,
        "Starting court-node"
    );

    let court = Arc::new(build_court(&config).await?);

    let addr: SocketAddr = format!("{}:{}", config.api.bind_addr, config.api.http_port)
        .parse()
        .with_context(|| format!("invalid API address {}", config.api.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("API listening on http://{}", addr);
    let app = api::create_router(court.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server stopped");
        }
    });

    let mut events = court.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(record) => {
                    let payload = serde_json::to_string(&record.event).unwrap_or_default();
                    info!(kind = record.event.kind(), %payload, "Court event");
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let period = Duration::from_secs(config.node.sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match court.sweep(Utc::now()).await {
                    Ok(report) => debug!(
                        expired = report.expired.len(),
                        escalated = report.escalated.len(),
                        decayed = report.decay.decayed,
                        "Sweep finished"
                    ),
                    Err(e) => error!(error = %e, kind = e.kind().as_str(), "Sweep failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Assemble the ledger, arbiter service and court from configuration.
async fn build_court(config: &Config) -> anyhow::Result<BountyCourt> {
    let ledger = Arc::new(Ledger::new());
    for seed in &config.accounts {
        let account = AccountRef::new(seed.kind, seed.id.as_str());
        match seed.trust {
            Some(trust) => ledger.open_account_with_trust(&account, trust).await,
            None => ledger.open_account(&account).await,
        };
        if seed.deposit > 0 {
            ledger
                .deposit(&account, seed.deposit)
                .await
                .with_context(|| format!("seeding {}", account))?;
        }
    }
    info!(accounts = config.accounts.len(), "Ledger seeded");

    let backend: Arc<dyn ArbiterBackend> = match config.arbiter.backend {
        BackendKind::Mock => Arc::new(MockArbiter::new(config.arbiter.model.as_str())),
        BackendKind::Openai => {
            let api_key = config
                .arbiter
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            Arc::new(
                OpenAiArbiter::new(
                    config.arbiter.base_url.as_str(),
                    config.arbiter.model.as_str(),
                    api_key,
                )?
                .with_temperature(config.arbiter.temperature),
            )
        }
    };
    let arbiter = ArbiterService::new(vec![backend]).with_config(ArbiterServiceConfig {
        timeout_ms: config.arbiter.timeout_ms,
        max_ai_stake: config.arbiter.max_ai_stake,
        ..Default::default()
    });

    Ok(
        BountyCourt::new(ledger, Arc::new(InMemoryStore::new()), Arc::new(arbiter))
            .with_config(config.court.clone())
            .with_matchmaker(Arc::new(TrustMatchmaker)),
    )
}
