pub mod error;
pub mod push;
pub mod traits;
pub mod types;

pub use error::{ApiError, Result};
pub use push::HttpProgressFeed;
pub use traits::{ProgressFeed, PushSubscription, SimulatorApi};
pub use types::{
    InterpretResponse, MetricDelta, MetricsSnapshot, PredefinedScenario, PushMessage, RunStatus,
    RunStatusKind, TimeseriesPoint, TractResultRow,
};

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use tractview_common::{Config, FeatureCollection, PolicyConfig};

/// HTTP client for the simulator backend.
pub struct SimulatorClient {
    client: reqwest::Client,
    base_url: String,
}

impl SimulatorClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_timeout(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;
        decode(resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            message,
        });
    }
    resp.json().await.map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl SimulatorApi for SimulatorClient {
    async fn interpret(&self, text: &str) -> Result<InterpretResponse> {
        let body = serde_json::json!({ "text": text });
        self.post_json("/parse", &body).await
    }

    async fn refine(
        &self,
        text: &str,
        current_config: &PolicyConfig,
    ) -> Result<InterpretResponse> {
        let body = serde_json::json!({ "text": text, "current_config": current_config });
        self.post_json("/parse/refine", &body).await
    }

    async fn predefined_scenarios(&self) -> Result<Vec<PredefinedScenario>> {
        self.get_json("/scenarios/predefined").await
    }

    async fn launch(&self, config: &PolicyConfig) -> Result<RunStatus> {
        let body = serde_json::json!({ "config": config });
        self.post_json("/simulations/run", &body).await
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatus> {
        self.get_json(&routes::status(run_id)).await
    }

    async fn tract_results(&self, run_id: &str, timestep: u32) -> Result<Vec<TractResultRow>> {
        self.get_json(&routes::tract_results(run_id, timestep)).await
    }

    async fn metrics_snapshot(&self, run_id: &str, timestep: u32) -> Result<MetricsSnapshot> {
        self.get_json(&routes::metrics(run_id, timestep)).await
    }

    async fn timeseries(&self, run_id: &str, metric: &str) -> Result<Vec<TimeseriesPoint>> {
        self.get_json(&routes::timeseries(run_id, metric)).await
    }

    async fn base_geometry(&self) -> Result<FeatureCollection> {
        self.get_json("/tracts/geojson").await
    }
}

/// Parameterized backend route paths, relative to the API base URL.
mod routes {
    pub fn status(run_id: &str) -> String {
        format!("/simulations/status/{run_id}")
    }

    pub fn tract_results(run_id: &str, timestep: u32) -> String {
        format!("/results/{run_id}/tracts?timestep={timestep}")
    }

    pub fn metrics(run_id: &str, timestep: u32) -> String {
        format!("/results/{run_id}/metrics?timestep={timestep}")
    }

    pub fn timeseries(run_id: &str, metric: &str) -> String {
        format!("/results/{run_id}/timeseries?metric={metric}")
    }
}
