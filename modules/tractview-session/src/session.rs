//! The session controller: policy configuration, interpretation history,
//! and the simulation run lifecycle.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use tractview_client::traits::{ProgressFeed, SimulatorApi};
use tractview_client::types::{MetricsSnapshot, PushMessage, TimeseriesPoint};
use tractview_common::{InterpretationEntry, PolicyConfig, DEFAULT_TOTAL_TIMESTEPS};

use crate::progress::{PhaseProbe, ProgressSync, PushObserver, StatusSink};
use crate::state::{RunPhase, SessionState};

/// Owns the policy configuration, the interpretation conversation and the
/// active run, and drives the progress synchronizer.
///
/// Every async operation catches its own failures: service errors end up as
/// text in `SessionState::error` with the prior state preserved, and nothing
/// propagates to the caller. Blank input is rejected before any request is
/// issued.
pub struct SessionController {
    api: Arc<dyn SimulatorApi>,
    feed: Arc<dyn ProgressFeed>,
    state: Arc<RwLock<SessionState>>,
    sync: Mutex<Option<ProgressSync>>,
    observer: Option<PushObserver>,
}

impl SessionController {
    pub fn new(api: Arc<dyn SimulatorApi>, feed: Arc<dyn ProgressFeed>) -> Self {
        Self {
            api,
            feed,
            state: Arc::new(RwLock::new(SessionState::default())),
            sync: Mutex::new(None),
            observer: None,
        }
    }

    /// Install a host callback invoked once per push message, in arrival
    /// order. Purely observational; the push path never writes run state.
    pub fn with_push_observer(mut self, observer: PushObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Snapshot of the whole session state.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Parse free-form policy text and replace the working configuration.
    ///
    /// Overlapping calls are not deduplicated: each issues its own request
    /// and whichever response arrives last wins.
    pub async fn interpret(&self, text: &str) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        self.begin_loading().await;
        match self.api.interpret(&text).await {
            Ok(resp) => {
                let mut state = self.state.write().await;
                state.config = Some(resp.config);
                state.summary = resp.summary.clone();
                state.warnings = resp.warnings.clone();
                state.affected_tracts = resp.affected_tracts;
                state.history.push(InterpretationEntry::user(text));
                state
                    .history
                    .push(InterpretationEntry::system(resp.summary, resp.warnings));
                state.error = None;
                state.is_loading = false;
            }
            Err(e) => {
                warn!(error = %e, "Policy interpretation failed");
                let mut state = self.state.write().await;
                state.error = Some(format!("Failed to interpret policy: {e}"));
                state.is_loading = false;
            }
        }
    }

    /// Refine the current configuration with a follow-up instruction.
    /// A no-op when there is no configuration to refine.
    pub async fn refine(&self, text: &str) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let Some(current) = self.state.read().await.config.clone() else {
            return;
        };

        self.begin_loading().await;
        match self.api.refine(&text, &current).await {
            Ok(resp) => {
                let mut state = self.state.write().await;
                state.config = Some(resp.config);
                state.summary = resp.summary.clone();
                state.warnings = resp.warnings.clone();
                state.affected_tracts = resp.affected_tracts;
                state.history.push(InterpretationEntry::user(text));
                state
                    .history
                    .push(InterpretationEntry::system(resp.summary, resp.warnings));
                state.error = None;
                state.is_loading = false;
            }
            Err(e) => {
                warn!(error = %e, "Policy refinement failed");
                let mut state = self.state.write().await;
                state.error = Some(format!("Failed to refine policy: {e}"));
                state.is_loading = false;
            }
        }
    }

    /// Apply a predefined configuration immediately, without the interpreter.
    ///
    /// Replaces the conversation with a single system entry and resets the
    /// run state and error, whatever they were. The only synchronous
    /// configuration path.
    pub async fn select_scenario(&self, config: PolicyConfig) {
        self.stop_sync().await;

        let summary = config.display_summary();
        let affected = config.affected_tracts();

        let mut state = self.state.write().await;
        state.config = Some(config);
        state.summary = summary.clone();
        state.warnings.clear();
        state.affected_tracts = affected;
        state.history = vec![InterpretationEntry::system(summary, Vec::new())];
        state.phase = RunPhase::Idle;
        state.error = None;
        state.is_loading = false;
    }

    /// Launch a simulation run for the current configuration and start
    /// synchronizing its progress. A no-op when there is no configuration.
    pub async fn launch(&self) {
        let Some(config) = self.state.read().await.config.clone() else {
            return;
        };

        self.begin_loading().await;
        match self.api.launch(&config).await {
            Ok(status) => {
                let total_steps = if status.total_steps > 0 {
                    status.total_steps
                } else {
                    DEFAULT_TOTAL_TIMESTEPS
                };
                {
                    let mut state = self.state.write().await;
                    state.phase = RunPhase::Pending {
                        run_id: status.run_id.clone(),
                        progress: 0.0,
                        current_step: 0,
                        total_steps,
                    };
                    state.error = None;
                    state.is_loading = false;
                }
                info!(run_id = status.run_id.as_str(), total_steps, "Simulation launched");
                self.start_sync(status.run_id).await;
            }
            Err(e) => {
                warn!(error = %e, "Simulation launch failed");
                let mut state = self.state.write().await;
                state.error = Some(format!("Failed to launch simulation: {e}"));
                state.is_loading = false;
            }
        }
    }

    /// Aggregate metric deltas for the completed run at one timestep.
    ///
    /// `None` until a run has completed, and on fetch failure (logged, not
    /// surfaced as a session error).
    pub async fn metrics_snapshot(&self, timestep: u32) -> Option<MetricsSnapshot> {
        let run_id = self.completed_run_id().await?;
        match self.api.metrics_snapshot(&run_id, timestep).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(run_id = run_id.as_str(), timestep, error = %e, "Metrics snapshot fetch failed");
                None
            }
        }
    }

    /// Full trajectory of one metric across the completed run.
    pub async fn timeseries(&self, metric: &str) -> Option<Vec<TimeseriesPoint>> {
        let run_id = self.completed_run_id().await?;
        match self.api.timeseries(&run_id, metric).await {
            Ok(points) => Some(points),
            Err(e) => {
                warn!(run_id = run_id.as_str(), metric, error = %e, "Timeseries fetch failed");
                None
            }
        }
    }

    /// Tear down synchronization and clear all state back to initial values.
    pub async fn reset(&self) {
        self.stop_sync().await;
        *self.state.write().await = SessionState::default();
    }

    /// Whether the push channel is currently open for the active run.
    pub async fn push_connected(&self) -> bool {
        match &*self.sync.lock().await {
            Some(sync) => sync.is_connected(),
            None => false,
        }
    }

    /// The most recent push message for the active run. Never authoritative;
    /// the poll loop owns run state.
    pub async fn last_push(&self) -> Option<PushMessage> {
        match &*self.sync.lock().await {
            Some(sync) => sync.last_push().await,
            None => None,
        }
    }

    async fn completed_run_id(&self) -> Option<String> {
        let state = self.state.read().await;
        if !state.phase.is_completed() {
            return None;
        }
        state.phase.run_id().map(str::to_string)
    }

    async fn begin_loading(&self) {
        self.state.write().await.is_loading = true;
    }

    async fn start_sync(&self, run_id: String) {
        let mut sync = self.sync.lock().await;
        // Drop the previous run's poll and push before starting new ones;
        // two live writers for one state is a correctness bug.
        *sync = None;
        *sync = Some(ProgressSync::start(
            run_id,
            self.api.clone(),
            self.feed.clone(),
            StatusSink::new(self.state.clone()),
            PhaseProbe::new(self.state.clone()),
            self.observer.clone(),
        ));
    }

    async fn stop_sync(&self) {
        *self.sync.lock().await = None;
    }
}
