use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property key the compositor injects to mark whether a tract matched a
/// result row.
pub const HAS_RESULT_KEY: &str = "hasResult";

/// Primary join identifier on tract features.
pub const TRACT_ID_KEY: &str = "tract_id";

/// Fallback join identifier: the raw census GEOID, present on features that
/// predate the pipeline's identifier rename.
pub const GEOID_KEY: &str = "GEOID";

/// One areal unit: opaque polygon geometry plus a free-form property bag.
///
/// Geometry is carried as raw JSON. This layer never reads coordinates; it
/// joins result rows onto properties and hands the feature to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    pub geometry: Value,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl Feature {
    /// Join key used to match a result row: `tract_id`, falling back to
    /// `GEOID`, falling back to the empty string (which never matches).
    pub fn join_key(&self) -> &str {
        for key in [TRACT_ID_KEY, GEOID_KEY] {
            if let Some(Value::String(s)) = self.properties.get(key) {
                return s;
            }
        }
        ""
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_type")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self {
            kind: collection_type(),
            features: Vec::new(),
        }
    }
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
