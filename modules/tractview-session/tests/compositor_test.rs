//! Integration tests for the result compositor's fetch/merge/commit cycle,
//! in particular the discard-stale-fetch rule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use tractview_client::error::{ApiError, Result};
use tractview_client::traits::SimulatorApi;
use tractview_client::types::{
    InterpretResponse, MetricsSnapshot, PredefinedScenario, RunStatus, TimeseriesPoint,
    TractResultRow,
};
use tractview_common::{FeatureCollection, PolicyConfig, HAS_RESULT_KEY};
use tractview_session::ResultCompositor;

// ---------------------------------------------------------------------------
// Fake API with per-timestep gated result fetches
// ---------------------------------------------------------------------------

#[derive(Default)]
struct GatedApi {
    rows: Mutex<HashMap<u32, Vec<TractResultRow>>>,
    gates: Mutex<HashMap<u32, Arc<Notify>>>,
    fail: AtomicBool,
}

impl GatedApi {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue result rows for a timestep, gated until `release` is called.
    fn stage(&self, timestep: u32, rows: Vec<TractResultRow>) {
        self.rows.lock().unwrap().insert(timestep, rows);
        self.gates
            .lock()
            .unwrap()
            .insert(timestep, Arc::new(Notify::new()));
    }

    /// Let the fetch for a timestep resolve.
    fn release(&self, timestep: u32) {
        self.gates.lock().unwrap()[&timestep].notify_one();
    }
}

fn row(tract_id: &str, values: serde_json::Value) -> TractResultRow {
    serde_json::from_value(json!({"tract_id": tract_id, "values": values})).unwrap()
}

fn base_geometry(ids: &[&str]) -> FeatureCollection {
    let features = ids
        .iter()
        .map(|id| {
            json!({
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": []},
                "properties": {"tract_id": id},
            })
        })
        .collect::<Vec<_>>();
    serde_json::from_value(json!({"type": "FeatureCollection", "features": features})).unwrap()
}

#[async_trait]
impl SimulatorApi for GatedApi {
    async fn interpret(&self, _text: &str) -> Result<InterpretResponse> {
        unimplemented!("not used by the compositor")
    }

    async fn refine(&self, _text: &str, _current: &PolicyConfig) -> Result<InterpretResponse> {
        unimplemented!("not used by the compositor")
    }

    async fn predefined_scenarios(&self) -> Result<Vec<PredefinedScenario>> {
        Ok(Vec::new())
    }

    async fn launch(&self, _config: &PolicyConfig) -> Result<RunStatus> {
        unimplemented!("not used by the compositor")
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatus> {
        Err(ApiError::Api {
            status: 404,
            message: format!("unknown run '{run_id}'"),
        })
    }

    async fn tract_results(&self, _run_id: &str, timestep: u32) -> Result<Vec<TractResultRow>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Api {
                status: 500,
                message: "snapshot missing".to_string(),
            });
        }
        let gate = self.gates.lock().unwrap().get(&timestep).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&timestep)
            .cloned()
            .unwrap_or_default())
    }

    async fn metrics_snapshot(&self, _run_id: &str, _timestep: u32) -> Result<MetricsSnapshot> {
        Ok(MetricsSnapshot::new())
    }

    async fn timeseries(&self, _run_id: &str, _metric: &str) -> Result<Vec<TimeseriesPoint>> {
        Ok(Vec::new())
    }

    async fn base_geometry(&self) -> Result<FeatureCollection> {
        Ok(base_geometry(&["A", "B", "C", "D", "E"]))
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_merges_results_onto_every_base_feature() {
    let api = GatedApi::new();
    let compositor = Arc::new(ResultCompositor::load(api.clone()).await.unwrap());

    api.stage(
        3,
        vec![row("A", json!({"population": 100})), row("C", json!({"population": 50}))],
    );
    api.release(3);

    assert!(compositor.refresh(Some("run-1"), 3).await);

    let merged = compositor.merged().await;
    assert_eq!(merged.len(), compositor.base().len());

    let by_id: HashMap<String, _> = merged
        .features
        .iter()
        .map(|f| (f.join_key().to_string(), f.properties.clone()))
        .collect();
    assert_eq!(by_id["A"]["population"], json!(100));
    assert_eq!(by_id["A"][HAS_RESULT_KEY], json!(true));
    assert_eq!(by_id["C"]["population"], json!(50));
    for id in ["B", "D", "E"] {
        assert_eq!(by_id[id][HAS_RESULT_KEY], json!(false));
        assert!(!by_id[id].contains_key("population"));
    }
}

#[tokio::test]
async fn a_stale_fetch_never_overwrites_a_newer_one() {
    let api = GatedApi::new();
    let compositor = Arc::new(ResultCompositor::load(api.clone()).await.unwrap());

    api.stage(1, vec![row("A", json!({"population": 1}))]);
    api.stage(2, vec![row("A", json!({"population": 2}))]);

    // Timestep 1 is requested first, then superseded by timestep 2.
    let c1 = compositor.clone();
    let first = tokio::spawn(async move { c1.refresh(Some("run-1"), 1).await });
    settle().await;

    let c2 = compositor.clone();
    let second = tokio::spawn(async move { c2.refresh(Some("run-1"), 2).await });
    settle().await;

    // The newer fetch resolves first and commits.
    api.release(2);
    assert!(second.await.unwrap());

    // The older fetch resolves late and must be discarded.
    api.release(1);
    assert!(!first.await.unwrap());

    let merged = compositor.merged().await;
    let a = merged
        .features
        .iter()
        .find(|f| f.join_key() == "A")
        .unwrap();
    assert_eq!(a.properties["population"], json!(2));
}

#[tokio::test]
async fn refresh_without_a_run_falls_back_to_the_bare_base() {
    let api = GatedApi::new();
    let compositor = Arc::new(ResultCompositor::load(api.clone()).await.unwrap());

    api.stage(3, vec![row("A", json!({"population": 100}))]);
    api.release(3);
    compositor.refresh(Some("run-1"), 3).await;

    assert!(compositor.refresh(None, 3).await);

    let merged = compositor.merged().await;
    assert_eq!(merged, *compositor.base());
    assert!(!merged.features[0].properties.contains_key(HAS_RESULT_KEY));
}

#[tokio::test]
async fn a_failed_fetch_keeps_the_previous_merge() {
    let api = GatedApi::new();
    let compositor = Arc::new(ResultCompositor::load(api.clone()).await.unwrap());

    api.stage(3, vec![row("A", json!({"population": 100}))]);
    api.release(3);
    assert!(compositor.refresh(Some("run-1"), 3).await);

    api.fail.store(true, Ordering::SeqCst);
    assert!(!compositor.refresh(Some("run-1"), 4).await);

    let merged = compositor.merged().await;
    let a = merged
        .features
        .iter()
        .find(|f| f.join_key() == "A")
        .unwrap();
    assert_eq!(a.properties["population"], json!(100));
}

#[tokio::test]
async fn detach_discards_an_inflight_fetch() {
    let api = GatedApi::new();
    let compositor = Arc::new(ResultCompositor::load(api.clone()).await.unwrap());

    api.stage(5, vec![row("A", json!({"population": 5}))]);

    let c = compositor.clone();
    let pending = tokio::spawn(async move { c.refresh(Some("run-1"), 5).await });
    settle().await;

    compositor.detach();
    api.release(5);

    assert!(!pending.await.unwrap());
    let merged = compositor.merged().await;
    assert_eq!(merged, *compositor.base());
}
