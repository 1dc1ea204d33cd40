//! Layered configuration for RiskGate.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (local dev owner, 1 h sessions, 70/40 thresholds)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `RISKGATE_`, nested with `__`)
//!
//! The result is validated before it is handed to any component.

use std::path::PathBuf;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Default registry owner: the first well-known local development account.
pub const DEFAULT_OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Default session inactivity timeout: one hour.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 3_600;

/// Default per-session action cap.
pub const DEFAULT_MAX_ACTIONS: u32 = 100;

/// Default high-risk threshold.
pub const DEFAULT_HIGH_THRESHOLD: u8 = 70;

/// Default medium-risk threshold.
pub const DEFAULT_MEDIUM_THRESHOLD: u8 = 40;

/// Default journal size that triggers rotation. 0 disables rotation.
pub const DEFAULT_JOURNAL_MAX_EVENTS: usize = 100_000;

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_max_actions() -> u32 {
    DEFAULT_MAX_ACTIONS
}

fn default_high_threshold() -> u8 {
    DEFAULT_HIGH_THRESHOLD
}

fn default_medium_threshold() -> u8 {
    DEFAULT_MEDIUM_THRESHOLD
}

fn default_port() -> u16 {
    8080
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("data/events.jsonl")
}

fn default_journal_max_events() -> usize {
    DEFAULT_JOURNAL_MAX_EVENTS
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Registry ownership and the initial updater allow-list.
    pub registry: RegistryConfig,
    /// Session limits.
    #[serde(default)]
    pub session: SessionConfig,
    /// Swap gate policy.
    #[serde(default)]
    pub gate: GateConfig,
    /// HTTP server and journal.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry access control bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Initial owner; implicitly authorized.
    pub owner: Address,
    /// Additional identities authorized to write risk records at startup.
    #[serde(default)]
    pub authorized: Vec<Address>,
}

/// Session manager limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Inactivity timeout in seconds.
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of actions per session.
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,
}

/// Swap gate policy.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Blocking policy.
    #[serde(default)]
    pub mode: GateMode,
    /// Scores at or above this are high risk.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,
    /// Scores at or above this are at least moderate risk.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u8,
}

/// Swap gate policy mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Never block; warn at medium and above.
    WarnOnly,
    /// Block at or above the high threshold.
    #[default]
    BlockHigh,
    /// Block at or above the medium threshold.
    Strict,
}

/// HTTP server and persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Event journal location.
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
    /// Rotate and compact the journal once it holds this many events.
    /// 0 disables rotation.
    #[serde(default = "default_journal_max_events")]
    pub journal_max_events: usize,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON logs instead of pretty output.
    #[serde(default)]
    pub json: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout_secs(),
            max_actions: default_max_actions(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            journal_path: default_journal_path(),
            journal_max_events: default_journal_max_events(),
        }
    }
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment overrides with prefix `RISKGATE_` and `__` as the
    ///    nesting separator (e.g., `RISKGATE_GATE__MODE=strict`).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default("registry.owner", DEFAULT_OWNER)?
            .set_default("registry.authorized", Vec::<String>::new())?
            .set_default("session.timeout_secs", DEFAULT_SESSION_TIMEOUT_SECS as i64)?
            .set_default("session.max_actions", DEFAULT_MAX_ACTIONS as i64)?
            .set_default("gate.mode", "block_high")?
            .set_default("gate.high_threshold", DEFAULT_HIGH_THRESHOLD as i64)?
            .set_default("gate.medium_threshold", DEFAULT_MEDIUM_THRESHOLD as i64)?
            .set_default("server.port", 8080i64)?
            .set_default("server.journal_path", "data/events.jsonl")?
            .set_default("server.journal_max_events", DEFAULT_JOURNAL_MAX_EVENTS as i64)?
            .set_default("logging.json", false)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (RISKGATE_ prefix) ─────────
        // The prefix separator is set explicitly; otherwise the crate reuses
        // the nesting separator and expects `RISKGATE__GATE__MODE`.
        builder = builder.add_source(
            Environment::with_prefix("RISKGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.registry.owner == Address::ZERO {
            bail!("registry owner must not be the zero address");
        }
        if self.registry.authorized.contains(&Address::ZERO) {
            bail!("registry authorized list must not contain the zero address");
        }
        if self.session.timeout_secs == 0 {
            bail!("session timeout must be at least one second");
        }
        if self.session.max_actions == 0 {
            bail!("session action cap must be at least one");
        }
        if self.gate.high_threshold > 100 {
            bail!(
                "gate high threshold {} exceeds the score range",
                self.gate.high_threshold
            );
        }
        if self.gate.medium_threshold > self.gate.high_threshold {
            bail!(
                "gate medium threshold {} is above high threshold {}",
                self.gate.medium_threshold,
                self.gate.high_threshold
            );
        }
        Ok(())
    }
}
