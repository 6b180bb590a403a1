pub mod config;
pub mod geo;
pub mod types;

pub use config::Config;
pub use geo::{Feature, FeatureCollection, GEOID_KEY, HAS_RESULT_KEY, TRACT_ID_KEY};
pub use types::*;
