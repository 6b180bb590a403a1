//! Merging per-timestep results onto the static tract geometry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use tractview_client::error::Result;
use tractview_client::traits::SimulatorApi;
use tractview_client::types::TractResultRow;
use tractview_common::{Feature, FeatureCollection, HAS_RESULT_KEY};

/// Merges fetched per-tract results onto the static base geometry.
///
/// Single writer: every commit is guarded by a generation counter, so a
/// stale fetch that resolves after a newer one was issued is discarded
/// instead of overwriting the newer merge.
pub struct ResultCompositor {
    api: Arc<dyn SimulatorApi>,
    base: FeatureCollection,
    merged: RwLock<FeatureCollection>,
    generation: AtomicU64,
}

impl ResultCompositor {
    pub fn new(api: Arc<dyn SimulatorApi>, base: FeatureCollection) -> Self {
        let merged = RwLock::new(base.clone());
        Self {
            api,
            base,
            merged,
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch the base geometry from the backend and build a compositor on it.
    pub async fn load(api: Arc<dyn SimulatorApi>) -> Result<Self> {
        let base = api.base_geometry().await?;
        debug!(tracts = base.len(), "Loaded base tract geometry");
        Ok(Self::new(api, base))
    }

    /// The immutable base geometry loaded at startup.
    pub fn base(&self) -> &FeatureCollection {
        &self.base
    }

    /// Snapshot of the current merged geometry.
    pub async fn merged(&self) -> FeatureCollection {
        self.merged.read().await.clone()
    }

    /// Invalidate any in-flight fetch without issuing a new one. Teardown
    /// path: a response that arrives after this never commits.
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Recompute the merged geometry for `(run_id, timestep)`.
    ///
    /// Issuing a new refresh supersedes any outstanding one. Returns true
    /// when this call's merge committed; false when it was superseded or the
    /// fetch failed (the previous merge stays in place either way).
    pub async fn refresh(&self, run_id: Option<&str>, timestep: u32) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(run_id) = run_id else {
            // No run: the base geometry stands on its own, unannotated.
            let mut merged = self.merged.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *merged = self.base.clone();
            return true;
        };

        let rows = match self.api.tract_results(run_id, timestep).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(run_id, timestep, error = %e, "Tract result fetch failed, keeping previous merge");
                return false;
            }
        };

        let next = merge_results(&self.base, &rows);

        let mut merged = self.merged.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(run_id, timestep, "Discarding superseded tract result fetch");
            return false;
        }
        *merged = next;
        true
    }
}

/// Overlay result rows onto the base features.
///
/// Every base feature appears in the output exactly once. Matched features
/// get the row's values merged in (result values win on collision) and
/// `hasResult: true`; unmatched features keep their base properties with
/// `hasResult: false`. Features whose join key is empty never match.
pub fn merge_results(base: &FeatureCollection, rows: &[TractResultRow]) -> FeatureCollection {
    let by_tract: HashMap<&str, &TractResultRow> =
        rows.iter().map(|row| (row.tract_id.as_str(), row)).collect();

    let features = base
        .features
        .iter()
        .map(|feature| {
            let key = feature.join_key();
            let matched = if key.is_empty() {
                None
            } else {
                by_tract.get(key)
            };

            let mut properties = feature.properties.clone();
            if let Some(row) = matched {
                for (name, value) in &row.values {
                    properties.insert(name.clone(), value.clone());
                }
            }
            properties.insert(HAS_RESULT_KEY.to_string(), Value::Bool(matched.is_some()));

            Feature {
                kind: feature.kind.clone(),
                geometry: feature.geometry.clone(),
                properties,
            }
        })
        .collect();

    FeatureCollection {
        kind: base.kind.clone(),
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base(ids: &[&str]) -> FeatureCollection {
        let features = ids
            .iter()
            .map(|id| {
                serde_json::from_value(json!({
                    "type": "Feature",
                    "geometry": {"type": "Polygon", "coordinates": []},
                    "properties": {"tract_id": id, "NAME": format!("Tract {id}")},
                }))
                .unwrap()
            })
            .collect();
        FeatureCollection {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }

    fn row(tract_id: &str, values: serde_json::Value) -> TractResultRow {
        serde_json::from_value(json!({"tract_id": tract_id, "values": values})).unwrap()
    }

    #[test]
    fn merges_matching_rows_and_flags_the_rest() {
        let base = base(&["A", "B", "C", "D", "E"]);
        let rows = vec![row("A", json!({"population": 100})), row("C", json!({"population": 50}))];

        let merged = merge_results(&base, &rows);
        assert_eq!(merged.len(), base.len());

        let by_id: HashMap<&str, &Feature> =
            merged.features.iter().map(|f| (f.join_key(), f)).collect();

        assert_eq!(by_id["A"].properties["population"], json!(100));
        assert_eq!(by_id["A"].properties[HAS_RESULT_KEY], json!(true));
        assert_eq!(by_id["C"].properties["population"], json!(50));
        for id in ["B", "D", "E"] {
            assert_eq!(by_id[id].properties[HAS_RESULT_KEY], json!(false));
            assert!(!by_id[id].properties.contains_key("population"));
            // Base properties are retained.
            assert_eq!(by_id[id].properties["NAME"], json!(format!("Tract {id}")));
        }
    }

    #[test]
    fn result_values_win_on_property_collision() {
        let base = base(&["A"]);
        let rows = vec![row("A", json!({"NAME": "overridden", "rent": 2400}))];

        let merged = merge_results(&base, &rows);
        assert_eq!(merged.features[0].properties["NAME"], json!("overridden"));
        assert_eq!(merged.features[0].properties["rent"], json!(2400));
    }

    #[test]
    fn features_without_identifiers_never_match() {
        let mut base = base(&["A"]);
        base.features[0].properties.remove("tract_id");

        // A row with an empty tract id must not join onto them either.
        let rows = vec![row("", json!({"population": 1}))];

        let merged = merge_results(&base, &rows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.features[0].properties[HAS_RESULT_KEY], json!(false));
        assert!(!merged.features[0].properties.contains_key("population"));
    }

    #[test]
    fn empty_result_set_keeps_every_feature() {
        let base = base(&["A", "B"]);
        let merged = merge_results(&base, &[]);

        assert_eq!(merged.len(), 2);
        for feature in &merged.features {
            assert_eq!(feature.properties[HAS_RESULT_KEY], json!(false));
        }
    }
}
