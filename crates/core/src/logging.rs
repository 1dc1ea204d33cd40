//! Logging and tracing initialization.
//!
//! [`init_tracing`] configures structured logging in one of two modes:
//! - **JSON mode** (`json = true`): machine-readable output with RFC 3339
//!   timestamps for log aggregation.
//! - **Pretty mode** (`json = false`): human-readable colored output for
//!   local development.
//!
//! Both modes honor `RUST_LOG` (e.g., `RUST_LOG=rg_registry=debug`).
//!
//! The [`SecretSanitizer`] layer flags events that carry key material. Hex
//! values are public on a ledger (addresses, hashes, session ids) and are
//! never flagged; only sensitive field names and non-hex high-entropy
//! strings are.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initialize the global tracing subscriber.
///
/// Returns an error instead of panicking if a subscriber is already set, so
/// tests and embedders can call it more than once.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(SecretSanitizer);

    if json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(MillisecondTimer)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE);

        registry.with(json_layer).try_init()?;
    } else {
        let pretty_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::CLOSE);

        registry.with(pretty_layer).try_init()?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct MillisecondTimer;

impl tracing_subscriber::fmt::time::FormatTime for MillisecondTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let now = chrono::Utc::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// A tracing layer that warns when key material shows up in log fields.
#[derive(Debug, Clone)]
pub struct SecretSanitizer;

impl<S> Layer<S> for SecretSanitizer
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &span::Attributes<'_>,
        _id: &span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = SecretCheckVisitor::default();
        attrs.record(&mut visitor);
        if visitor.found_secret {
            tracing::warn!("potential secret detected in span fields");
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = SecretCheckVisitor::default();
        event.record(&mut visitor);
        if visitor.found_secret {
            tracing::warn!("potential secret detected in event fields");
        }
    }
}

#[derive(Default)]
struct SecretCheckVisitor {
    found_secret: bool,
}

/// Field names that always indicate secrets regardless of value.
const SENSITIVE_FIELD_NAMES: &[&str] = &[
    "private_key",
    "signing_key",
    "mnemonic",
    "seed_phrase",
    "password",
    "secret",
    "api_key",
    "token_secret",
];

impl SecretCheckVisitor {
    fn looks_like_secret(value: &str) -> bool {
        let body = value.strip_prefix("0x").unwrap_or(value);
        if body.len() < 32 {
            return false;
        }
        // Addresses, hashes and session ids are public.
        if body.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        let alnum = body.chars().filter(|c| c.is_alphanumeric()).count();
        let ratio = alnum as f64 / body.len() as f64;
        ratio > 0.85
            && !body.contains(' ')
            && body
                .chars()
                .all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=')
    }
}

impl Visit for SecretCheckVisitor {
    fn record_debug(&mut self, field: &Field, _value: &dyn fmt::Debug) {
        if SENSITIVE_FIELD_NAMES.contains(&field.name()) {
            self.found_secret = true;
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if SENSITIVE_FIELD_NAMES.contains(&field.name()) || Self::looks_like_secret(value) {
            self.found_secret = true;
        }
    }
}
