//! Session state and the run lifecycle state machine.

use tractview_client::types::{RunStatus, RunStatusKind};
use tractview_common::{InterpretationEntry, PolicyConfig};

/// Lifecycle of the active simulation run, as one tagged state.
///
/// A single enum instead of independent status/progress/step fields, so the
/// impossible combinations (a progress value without a run, step counts on a
/// failed run) cannot be represented and cannot drift apart.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunPhase {
    /// No run has been launched.
    #[default]
    Idle,
    /// Launched, the engine has not started stepping yet.
    Pending {
        run_id: String,
        progress: f64,
        current_step: u32,
        total_steps: u32,
    },
    /// The engine is stepping.
    Running {
        run_id: String,
        progress: f64,
        current_step: u32,
        total_steps: u32,
    },
    /// Terminal: every timestep is available.
    Completed { run_id: String, total_steps: u32 },
    /// Terminal: the engine gave up.
    Failed { run_id: String, reason: String },
}

impl RunPhase {
    pub fn run_id(&self) -> Option<&str> {
        match self {
            RunPhase::Idle => None,
            RunPhase::Pending { run_id, .. }
            | RunPhase::Running { run_id, .. }
            | RunPhase::Completed { run_id, .. }
            | RunPhase::Failed { run_id, .. } => Some(run_id),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed { .. } | RunPhase::Failed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunPhase::Running { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunPhase::Completed { .. })
    }

    pub fn progress(&self) -> f64 {
        match self {
            RunPhase::Idle | RunPhase::Failed { .. } => 0.0,
            RunPhase::Pending { progress, .. } | RunPhase::Running { progress, .. } => *progress,
            RunPhase::Completed { .. } => 1.0,
        }
    }

    pub fn total_steps(&self) -> Option<u32> {
        match self {
            RunPhase::Idle | RunPhase::Failed { .. } => None,
            RunPhase::Pending { total_steps, .. }
            | RunPhase::Running { total_steps, .. }
            | RunPhase::Completed { total_steps, .. } => Some(*total_steps),
        }
    }

    /// Apply one authoritative status response.
    ///
    /// Enforces the lifecycle invariants: terminal states are absorbing,
    /// responses for a different run id are ignored, a pending status never
    /// demotes a running phase, and progress never decreases while the run
    /// is live. Returns whether the update was applied.
    pub fn apply_status(&mut self, status: &RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.run_id() {
            Some(id) if id == status.run_id => {}
            _ => return false,
        }
        if self.is_running() && status.status == RunStatusKind::Pending {
            return false;
        }

        let progress = status.progress.max(self.progress());
        *self = match status.status {
            RunStatusKind::Pending => RunPhase::Pending {
                run_id: status.run_id.clone(),
                progress,
                current_step: status.current_step,
                total_steps: status.total_steps,
            },
            RunStatusKind::Running => RunPhase::Running {
                run_id: status.run_id.clone(),
                progress,
                current_step: status.current_step,
                total_steps: status.total_steps,
            },
            RunStatusKind::Completed => RunPhase::Completed {
                run_id: status.run_id.clone(),
                total_steps: status.total_steps,
            },
            RunStatusKind::Failed => RunPhase::Failed {
                run_id: status.run_id.clone(),
                reason: status
                    .message
                    .clone()
                    .unwrap_or_else(|| "simulation failed".to_string()),
            },
        };
        true
    }
}

/// Everything the host view needs to render the session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub config: Option<PolicyConfig>,
    pub summary: String,
    pub warnings: Vec<String>,
    pub affected_tracts: Vec<String>,
    pub history: Vec<InterpretationEntry>,
    pub phase: RunPhase,
    pub is_loading: bool,
    pub error: Option<String>,
}
