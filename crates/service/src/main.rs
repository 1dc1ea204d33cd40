//! RiskGate binary
//!
//! Loads configuration, initializes tracing, and serves the registry,
//! session manager and swap gate over HTTP until SIGINT / SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use rg_core::config::AppConfig;
use rg_service::engine::RiskGateService;

/// RiskGate token risk service
#[derive(Parser, Debug)]
#[command(name = "riskgate", about = "Token risk registry, session manager and swap gate")]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port, overrides `server.port`.
    #[arg(short, long, env = "RISKGATE_PORT")]
    port: Option<u16>,

    /// Emit JSON log lines instead of pretty output.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.logging.json |= args.json_logs;

    rg_core::logging::init_tracing(config.logging.json)?;

    tracing::info!(
        port = config.server.port,
        owner = %config.registry.owner,
        gate_mode = ?config.gate.mode,
        high = config.gate.high_threshold,
        medium = config.gate.medium_threshold,
        session_timeout_secs = config.session.timeout_secs,
        max_actions = config.session.max_actions,
        "starting riskgate"
    );

    let service = RiskGateService::new(config)?;
    service.run().await
}
