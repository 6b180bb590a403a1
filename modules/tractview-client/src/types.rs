use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tractview_common::PolicyConfig;

/// Response from `POST /parse` and `POST /parse/refine`.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpretResponse {
    pub config: PolicyConfig,
    pub summary: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub affected_tracts: Vec<String>,
}

/// One entry from `GET /scenarios/predefined`.
#[derive(Debug, Clone, Deserialize)]
pub struct PredefinedScenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub config: PolicyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatusKind {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatusKind {
    /// Completed and failed are absorbing: nothing polls past them.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatusKind::Completed | RunStatusKind::Failed)
    }
}

impl std::fmt::Display for RunStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatusKind::Pending => write!(f, "pending"),
            RunStatusKind::Running => write!(f, "running"),
            RunStatusKind::Completed => write!(f, "completed"),
            RunStatusKind::Failed => write!(f, "failed"),
        }
    }
}

/// Response from `POST /simulations/run` and `GET /simulations/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub status: RunStatusKind,
    pub progress: f64,
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// One tract's metric values at one timestep.
#[derive(Debug, Clone, Deserialize)]
pub struct TractResultRow {
    pub tract_id: String,
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// Current/baseline comparison for one aggregate metric.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MetricDelta {
    pub current: f64,
    pub baseline: f64,
    pub delta: f64,
    pub delta_pct: f64,
}

/// Response from `GET /results/{id}/metrics`, keyed by metric name.
pub type MetricsSnapshot = BTreeMap<String, MetricDelta>;

/// One point of `GET /results/{id}/timeseries`.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesPoint {
    pub timestep: u32,
    #[serde(default)]
    pub date: String,
    pub value: f64,
}

/// One inbound message on the per-run progress channel.
///
/// The backend is free to extend this shape, so every field is optional and
/// unknown fields are ignored; a partial message still decodes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatusKind>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<u32>,
    #[serde(default)]
    pub total_steps: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}
