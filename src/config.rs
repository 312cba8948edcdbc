//! Engine tunables parsed from environment variables.
//!
//! Every knob has a default matching the historical behaviour; an unset or
//! unparseable variable falls back to that default rather than failing.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::consts::{CLUSTER_DISTANCE, DOUBLE_TAP_MS, HIT_TARGET_WIDTH, MODEL_SPACE_ID, SMALL_SHEET_LABEL_LIMIT};

/// Knobs for the metadata extractor's clustering pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractConfig {
    /// Maximum label-to-centroid distance for joining a cluster.
    pub cluster_distance: f64,
    /// Label count at or below which a level + key/value sheet is one room.
    pub small_sheet_limit: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { cluster_distance: CLUSTER_DISTANCE, small_sheet_limit: SMALL_SHEET_LABEL_LIMIT }
    }
}

/// Knobs for the drawing surface adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    /// Id of the background container excluded from interaction.
    pub model_space_id: String,
    /// Stroke width given to synthesized hit targets.
    pub hit_target_width: f64,
    /// Double-tap window for latching the debug overlay, in milliseconds.
    pub double_tap_ms: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            model_space_id: MODEL_SPACE_ID.to_string(),
            hit_target_width: HIT_TARGET_WIDTH,
            double_tap_ms: DOUBLE_TAP_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub extract: ExtractConfig,
    pub surface: SurfaceConfig,
}

impl EngineConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `PLANMARK_CLUSTER_DISTANCE`: default 500
    /// - `PLANMARK_SMALL_SHEET_LIMIT`: default 5
    /// - `PLANMARK_HIT_TARGET_WIDTH`: default 10
    /// - `PLANMARK_DOUBLE_TAP_MS`: default 300
    /// - `PLANMARK_MODEL_SPACE_ID`: default `*Model_Space`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let extract = ExtractConfig {
            cluster_distance: parse_or(&lookup, "PLANMARK_CLUSTER_DISTANCE", CLUSTER_DISTANCE),
            small_sheet_limit: parse_or(&lookup, "PLANMARK_SMALL_SHEET_LIMIT", SMALL_SHEET_LABEL_LIMIT),
        };
        let model_space_id = lookup("PLANMARK_MODEL_SPACE_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| MODEL_SPACE_ID.to_string());
        let surface = SurfaceConfig {
            model_space_id,
            hit_target_width: parse_or(&lookup, "PLANMARK_HIT_TARGET_WIDTH", HIT_TARGET_WIDTH),
            double_tap_ms: parse_or(&lookup, "PLANMARK_DOUBLE_TAP_MS", DOUBLE_TAP_MS),
        };
        Self { extract, surface }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match lookup(key).map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}
