//! Service wiring and lifecycle.
//!
//! [`SharedState`] owns the registry, session manager and gate built from
//! configuration, plus the optional event journal. [`RiskGateService`]
//! restores registry state from the journal, runs the HTTP server, and shuts
//! down on SIGINT / SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use rg_core::clock::{Clock, SystemClock};
use rg_core::config::AppConfig;
use rg_core::journal::EventJournal;
use rg_gate::RiskGate;
use rg_registry::{AuthorizationSet, RiskRegistry};
use rg_session::{SessionLimits, SessionManager};

use crate::events::ServiceEvent;
use crate::server;

/// The journal plus events that have not reached it yet.
struct JournalSink {
    journal: EventJournal<ServiceEvent>,
    /// Drained from the components but not yet written. Kept in order and
    /// retried ahead of newer events.
    pending: Vec<ServiceEvent>,
    /// Journal length right after the last compaction.
    base: usize,
}

/// Shared state accessible by all HTTP handlers.
pub struct SharedState {
    pub registry: Arc<RiskRegistry>,
    pub sessions: Arc<SessionManager>,
    pub gate: Arc<RiskGate>,
    journal: Option<Mutex<JournalSink>>,
    journal_max_events: usize,
}

impl SharedState {
    /// Build all components from configuration, without a journal.
    pub fn build(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let access = AuthorizationSet::with_updaters(
            config.registry.owner,
            config.registry.authorized.iter().copied(),
        );
        let registry = Arc::new(RiskRegistry::new(access, clock.clone()));
        let sessions = Arc::new(SessionManager::new(
            SessionLimits::from(&config.session),
            registry.clone(),
            clock.clone(),
        ));
        let gate = Arc::new(
            RiskGate::from_config(&config.gate, registry.clone(), clock)
                .context("invalid gate configuration")?,
        );

        Ok(Self {
            registry,
            sessions,
            gate,
            journal: None,
            journal_max_events: config.server.journal_max_events,
        })
    }

    /// Attach a journal. Subsequent [`flush_events`](Self::flush_events)
    /// calls persist to it.
    pub fn with_journal(mut self, journal: EventJournal<ServiceEvent>) -> Self {
        self.journal = Some(Mutex::new(JournalSink {
            journal,
            pending: Vec::new(),
            base: 0,
        }));
        self
    }

    /// Rebuild registry state from the attached journal.
    ///
    /// Returns the number of registry events applied. Session and gate
    /// events are kept for audit only; sessions are not resumed.
    pub fn restore(&self) -> Result<usize> {
        let Some(sink) = &self.journal else {
            return Ok(0);
        };
        let events = sink.lock().journal.replay()?;
        let applied = self
            .registry
            .restore(events.iter().filter_map(ServiceEvent::as_registry));
        Ok(applied)
    }

    /// Drain every component's event buffer and append to the journal.
    ///
    /// The journal lock is held across the drain so concurrent flushes keep
    /// each component's emission order. Events that fail to write stay
    /// queued and are retried first on the next flush; the error is
    /// returned so the caller can report that the change is not yet durable.
    ///
    /// Without a journal the events are dropped (they have already been
    /// logged) and the drained count is returned. With one, the number of
    /// events written is returned.
    pub fn flush_events(&self) -> Result<usize> {
        let mut guard = self.journal.as_ref().map(|j| j.lock());

        let mut events: Vec<ServiceEvent> = Vec::new();
        events.extend(self.registry.drain_events().into_iter().map(ServiceEvent::Registry));
        events.extend(self.sessions.drain_events().into_iter().map(ServiceEvent::Session));
        events.extend(self.gate.drain_events().into_iter().map(ServiceEvent::Gate));

        let Some(sink) = guard.as_deref_mut() else {
            return Ok(events.len());
        };
        sink.pending.extend(events);
        let written = Self::write_pending(sink)?;

        if self.journal_max_events > 0
            && sink.journal.len().saturating_sub(sink.base) >= self.journal_max_events
        {
            if let Err(e) = self.compact(sink) {
                // The events above are durable; a failed rotation only
                // delays compaction until the next flush.
                tracing::error!(error = %e, "event journal rotation failed");
            }
        }
        Ok(written)
    }

    /// Events drained from the components but not yet written.
    pub fn pending_events(&self) -> usize {
        self.journal.as_ref().map_or(0, |j| j.lock().pending.len())
    }

    fn write_pending(sink: &mut JournalSink) -> Result<usize> {
        if sink.pending.is_empty() {
            return Ok(0);
        }
        let queued = sink.pending.len();
        let written = sink
            .journal
            .append_all(&sink.pending)
            .with_context(|| format!("failed to persist events ({} queued)", queued))?;
        sink.pending.clear();
        Ok(written)
    }

    /// Archive the live journal and start a new one seeded with a registry
    /// snapshot, so restore still rebuilds the full registry.
    fn compact(&self, sink: &mut JournalSink) -> Result<()> {
        let archive = sink.journal.rotate()?;
        sink.pending
            .extend(self.registry.snapshot().into_iter().map(ServiceEvent::Registry));
        let carried = Self::write_pending(sink)?;
        sink.base = sink.journal.len();

        tracing::info!(
            archive = %archive.display(),
            journal = %sink.journal.path().display(),
            carried,
            "event journal rotated"
        );
        Ok(())
    }
}

pub struct RiskGateService {
    state: Arc<SharedState>,
    port: u16,
    cancel: CancellationToken,
}

impl RiskGateService {
    /// Build the service from configuration, open the journal, and restore
    /// registry state from it.
    pub fn new(config: AppConfig) -> Result<Self> {
        let journal = EventJournal::open(config.server.journal_path.clone())?;
        let state = SharedState::build(&config, Arc::new(SystemClock))?.with_journal(journal);

        let restored = state.restore()?;
        tracing::info!(
            restored,
            tokens = state.registry.token_count(),
            owner = %state.registry.owner(),
            journal = %config.server.journal_path.display(),
            "registry state loaded"
        );

        Ok(Self {
            state: Arc::new(state),
            port: config.server.port,
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// Run until SIGINT / SIGTERM.
    pub async fn run(self) -> Result<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            cancel.cancel();
        });

        server::run_server(self.state.clone(), self.port, self.cancel.clone()).await?;

        // Anything emitted by in-flight requests during shutdown.
        self.state.flush_events()?;
        tracing::info!("riskgate stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
