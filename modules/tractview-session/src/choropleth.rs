//! Choropleth styling: data-driven fills and affected-tract outlines.
//!
//! Pure given its inputs. The two encoding halves have independent
//! invalidation keys: the fill scale depends on `(metric, min, max)` and the
//! outline rule on `(affected, highlight)`, so changing one never rebuilds
//! the other.

use std::collections::BTreeSet;

use serde_json::Value;

use tractview_common::{Feature, FeatureCollection};

/// Opacity applied to every fill.
pub const FILL_OPACITY: f64 = 0.7;

/// Fill for features with no numeric value for the selected metric.
pub const NO_DATA_FILL: &str = "#cccccc";

/// Outline for affected tracts while highlighting is on.
pub const HIGHLIGHT_OUTLINE: &str = "#ff6b35";
pub const HIGHLIGHT_OUTLINE_WIDTH: f64 = 3.0;

/// Outline for everything else.
pub const NEUTRAL_OUTLINE: &str = "#666666";
pub const NEUTRAL_OUTLINE_WIDTH: f64 = 0.5;

/// Diverging warm-to-cool ramp (ColorBrewer RdBu stops). The scale runs over
/// the reversed `[max, min]` domain, so the maximum always lands on the warm
/// end and the minimum on the cool end regardless of the metric.
const DIVERGING_STOPS: [[u8; 3]; 5] = [
    [178, 24, 43],
    [244, 165, 130],
    [247, 247, 247],
    [146, 197, 222],
    [33, 102, 172],
];

fn interpolate_diverging(t: f64) -> String {
    let scaled = t.clamp(0.0, 1.0) * (DIVERGING_STOPS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(DIVERGING_STOPS.len() - 2);
    let frac = scaled - i as f64;
    let lo = DIVERGING_STOPS[i];
    let hi = DIVERGING_STOPS[i + 1];
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * frac).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        mix(lo[0], hi[0]),
        mix(lo[1], hi[1]),
        mix(lo[2], hi[2])
    )
}

/// A feature's value for a metric, if it is a finite number.
fn metric_value(feature: &Feature, metric: &str) -> Option<f64> {
    match feature.properties.get(metric) {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Per-feature style output, renderer-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStyle {
    pub fill: String,
    pub fill_opacity: f64,
    pub outline: String,
    pub outline_width: f64,
}

/// The color scale half of the layer, keyed by `(metric, min, max)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEncoding {
    metric: String,
    min: f64,
    max: f64,
}

impl Default for FillEncoding {
    fn default() -> Self {
        Self {
            metric: String::new(),
            min: 0.0,
            max: 1.0,
        }
    }
}

impl FillEncoding {
    /// Scan the collection for finite values of `metric` and fit the domain.
    /// No numeric values at all leaves the default `[0, 1]` domain.
    pub fn compute(features: &FeatureCollection, metric: &str) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for feature in &features.features {
            if let Some(v) = metric_value(feature, metric) {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if !min.is_finite() || !max.is_finite() {
            min = 0.0;
            max = 1.0;
        }
        Self {
            metric: metric.to_string(),
            min,
            max,
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Fill color for one value, through the reversed-domain diverging ramp.
    pub fn color_for(&self, value: f64) -> String {
        let t = if self.max == self.min {
            0.5
        } else {
            (self.max - value) / (self.max - self.min)
        };
        interpolate_diverging(t)
    }
}

/// The outline half of the layer, keyed by `(affected, highlight)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutlineEncoding {
    affected: BTreeSet<String>,
    highlight: bool,
}

impl OutlineEncoding {
    pub fn compute(affected: &[String], highlight: bool) -> Self {
        Self {
            affected: affected.iter().cloned().collect(),
            highlight,
        }
    }

    /// Outline color and width for one tract.
    pub fn outline_for(&self, tract_id: &str) -> (&'static str, f64) {
        if self.highlight && self.affected.contains(tract_id) {
            (HIGHLIGHT_OUTLINE, HIGHLIGHT_OUTLINE_WIDTH)
        } else {
            (NEUTRAL_OUTLINE, NEUTRAL_OUTLINE_WIDTH)
        }
    }
}

/// Caches the two encoding halves with independent invalidation keys and
/// styles a merged feature collection.
#[derive(Debug, Clone, Default)]
pub struct ChoroplethLayer {
    fill: FillEncoding,
    outline: OutlineEncoding,
}

impl ChoroplethLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_encoding(&self) -> &FillEncoding {
        &self.fill
    }

    pub fn outline_encoding(&self) -> &OutlineEncoding {
        &self.outline
    }

    /// Style every feature of the collection, in order.
    ///
    /// The fill scale is rebuilt only when `(metric, min, max)` changed; the
    /// outline rule only when `(affected, highlight)` changed.
    pub fn style(
        &mut self,
        features: &FeatureCollection,
        metric: &str,
        affected: &[String],
        highlight: bool,
    ) -> Vec<FeatureStyle> {
        let next_fill = FillEncoding::compute(features, metric);
        if self.fill != next_fill {
            self.fill = next_fill;
        }

        let next_outline = OutlineEncoding::compute(affected, highlight);
        if self.outline != next_outline {
            self.outline = next_outline;
        }

        features
            .features
            .iter()
            .map(|feature| {
                let fill = match metric_value(feature, metric) {
                    Some(v) => self.fill.color_for(v),
                    None => NO_DATA_FILL.to_string(),
                };
                let (outline, outline_width) = self.outline.outline_for(feature.join_key());
                FeatureStyle {
                    fill,
                    fill_opacity: FILL_OPACITY,
                    outline: outline.to_string(),
                    outline_width,
                }
            })
            .collect()
    }
}
