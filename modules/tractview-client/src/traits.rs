use async_trait::async_trait;

use tractview_common::{FeatureCollection, PolicyConfig};

use crate::error::Result;
use crate::types::{
    InterpretResponse, MetricsSnapshot, PredefinedScenario, PushMessage, RunStatus,
    TimeseriesPoint, TractResultRow,
};

/// The simulator backend, seen from the client side.
///
/// [`crate::SimulatorClient`] is the production implementation; the session
/// layer and its tests work against this trait so they can substitute
/// in-memory fakes.
#[async_trait]
pub trait SimulatorApi: Send + Sync {
    /// Parse free-form policy text into a structured configuration.
    async fn interpret(&self, text: &str) -> Result<InterpretResponse>;

    /// Refine an existing configuration with a follow-up instruction.
    async fn refine(&self, text: &str, current_config: &PolicyConfig)
        -> Result<InterpretResponse>;

    /// List the predefined scenario catalog.
    async fn predefined_scenarios(&self) -> Result<Vec<PredefinedScenario>>;

    /// Start a simulation run for a configuration.
    async fn launch(&self, config: &PolicyConfig) -> Result<RunStatus>;

    /// Authoritative status for one run.
    async fn run_status(&self, run_id: &str) -> Result<RunStatus>;

    /// Per-tract metric values at one timestep.
    async fn tract_results(&self, run_id: &str, timestep: u32) -> Result<Vec<TractResultRow>>;

    /// Aggregate current/baseline deltas at one timestep.
    async fn metrics_snapshot(&self, run_id: &str, timestep: u32) -> Result<MetricsSnapshot>;

    /// One metric across the whole run.
    async fn timeseries(&self, run_id: &str, metric: &str) -> Result<Vec<TimeseriesPoint>>;

    /// The static tract geometry collection, fetched once at startup.
    async fn base_geometry(&self) -> Result<FeatureCollection>;
}

/// A live subscription to one run's push channel.
///
/// `next` yields decoded messages in arrival order until the channel closes;
/// `None` means the connection is gone and stays gone (no reconnect at this
/// layer).
#[async_trait]
pub trait PushSubscription: Send {
    async fn next(&mut self) -> Option<PushMessage>;
}

/// Factory for per-run push subscriptions.
#[async_trait]
pub trait ProgressFeed: Send + Sync {
    async fn subscribe(&self, run_id: &str) -> Result<Box<dyn PushSubscription>>;
}
