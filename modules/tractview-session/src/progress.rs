//! Reconciliation of the pull-based status poll and the push channel into
//! one progress signal.
//!
//! The poll loop is the only writer of authoritative run state. The push
//! path exists so a host can react to high-frequency events faster than the
//! poll cadence; it writes to its own last-observed slot and nothing else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use tractview_client::traits::{ProgressFeed, SimulatorApi};
use tractview_client::types::{PushMessage, RunStatus};

use crate::state::SessionState;
use crate::task::TaskGuard;

/// Cadence of the authoritative status poll.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Write capability for authoritative run state.
///
/// Only the poll loop is ever handed one. The push path gets a [`PhaseProbe`]
/// instead, which is what makes the single-writer rule structural rather
/// than a convention.
#[derive(Clone)]
pub struct StatusSink {
    state: Arc<RwLock<SessionState>>,
}

impl StatusSink {
    pub(crate) fn new(state: Arc<RwLock<SessionState>>) -> Self {
        Self { state }
    }

    /// Apply one poll response. Returns true once the run is terminal.
    pub async fn apply(&self, status: &RunStatus) -> bool {
        let mut state = self.state.write().await;
        state.phase.apply_status(status);
        state.phase.is_terminal()
    }
}

/// Read-only view of the run phase, for gating the push channel.
#[derive(Clone)]
pub struct PhaseProbe {
    state: Arc<RwLock<SessionState>>,
}

/// Whether the push channel should be open for a given run id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushGate {
    /// Not running yet; check again later.
    Wait,
    /// Running: open the channel.
    Open,
    /// Terminal or a different run: never open.
    Closed,
}

impl PhaseProbe {
    pub(crate) fn new(state: Arc<RwLock<SessionState>>) -> Self {
        Self { state }
    }

    async fn gate(&self, run_id: &str) -> PushGate {
        let state = self.state.read().await;
        if state.phase.run_id() != Some(run_id) || state.phase.is_terminal() {
            PushGate::Closed
        } else if state.phase.is_running() {
            PushGate::Open
        } else {
            PushGate::Wait
        }
    }
}

/// Observer invoked once per decoded push message, in arrival order.
pub type PushObserver = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Owns the poll task and the push task for exactly one run id.
///
/// Dropping it aborts both tasks, so replacing the sync for a new run, or
/// tearing the session down, can never leave a second progress writer or a
/// dangling channel alive.
pub struct ProgressSync {
    run_id: String,
    last_push: Arc<RwLock<Option<PushMessage>>>,
    connected: Arc<AtomicBool>,
    _poll: TaskGuard,
    _push: TaskGuard,
}

impl ProgressSync {
    pub fn start(
        run_id: String,
        api: Arc<dyn SimulatorApi>,
        feed: Arc<dyn ProgressFeed>,
        sink: StatusSink,
        probe: PhaseProbe,
        observer: Option<PushObserver>,
    ) -> Self {
        let last_push = Arc::new(RwLock::new(None));
        let connected = Arc::new(AtomicBool::new(false));

        let poll = TaskGuard::spawn(poll_loop(run_id.clone(), api, sink));
        let push = TaskGuard::spawn(push_loop(
            run_id.clone(),
            feed,
            probe,
            last_push.clone(),
            connected.clone(),
            observer,
        ));

        Self {
            run_id,
            last_push,
            connected,
            _poll: poll,
            _push: push,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether the push channel is currently open. Stays false for good once
    /// the connection drops; there is no reconnect at this layer.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The most recent push message, if any. Never authoritative.
    pub async fn last_push(&self) -> Option<PushMessage> {
        self.last_push.read().await.clone()
    }
}

async fn poll_loop(run_id: String, api: Arc<dyn SimulatorApi>, sink: StatusSink) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match api.run_status(&run_id).await {
            Ok(status) => {
                if sink.apply(&status).await {
                    debug!(run_id = run_id.as_str(), "Run is terminal, stopping poll");
                    break;
                }
            }
            Err(e) => {
                // A single failed poll is not fatal; keep the loop alive.
                warn!(run_id = run_id.as_str(), error = %e, "Status poll failed");
            }
        }
    }
}

async fn push_loop(
    run_id: String,
    feed: Arc<dyn ProgressFeed>,
    probe: PhaseProbe,
    last_push: Arc<RwLock<Option<PushMessage>>>,
    connected: Arc<AtomicBool>,
    observer: Option<PushObserver>,
) {
    // The channel is only open while the run is actually running.
    loop {
        match probe.gate(&run_id).await {
            PushGate::Open => break,
            PushGate::Closed => return,
            PushGate::Wait => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }

    let mut sub = match feed.subscribe(&run_id).await {
        Ok(sub) => sub,
        Err(e) => {
            debug!(run_id = run_id.as_str(), error = %e, "Push channel unavailable");
            return;
        }
    };
    connected.store(true, Ordering::Relaxed);

    while let Some(msg) = sub.next().await {
        if let Some(observer) = &observer {
            observer(&msg);
        }
        *last_push.write().await = Some(msg);
    }

    // Channel closed or dropped: it stays down.
    debug!(run_id = run_id.as_str(), "Push channel closed");
    connected.store(false, Ordering::Relaxed);
}
