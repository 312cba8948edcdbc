//! Shared constants for the annotation engine.

// ── Extraction ──────────────────────────────────────────────────

/// Maximum distance (drawing units) between a label and a cluster centroid.
pub const CLUSTER_DISTANCE: f64 = 500.0;

/// Label sets at or below this size holding a level label and a key/value
/// label are treated as one metadata block.
pub const SMALL_SHEET_LABEL_LIMIT: usize = 5;

/// Id given to the single cluster produced by the small-sheet shortcut.
pub const SHEET_CLUSTER_ID: &str = "plan-metadata";

// ── Drawing surface ─────────────────────────────────────────────

/// Id of the background container excluded from hit-testing.
pub const MODEL_SPACE_ID: &str = "*Model_Space";

/// Stroke width of the transparent duplicates laid behind thin elements.
pub const HIT_TARGET_WIDTH: f64 = 10.0;

/// Two modifier releases closer than this latch the debug overlay.
pub const DOUBLE_TAP_MS: u64 = 300;

/// Modifier key driving the hit-area overlay.
pub const OVERLAY_KEY: &str = "Alt";

// ── Highlight styles ────────────────────────────────────────────

pub const DEFAULT_COLOR: &str = "black";
pub const DEFAULT_WIDTH: f64 = 8.0;

pub const GROUPED_COLOR: &str = "blue";
pub const GROUPED_WIDTH: f64 = 12.0;

pub const ACTIVE_COLOR: &str = "orange";
pub const ACTIVE_WIDTH: f64 = 15.0;

pub const SELECTED_COLOR: &str = "#e0218a";
pub const SELECTED_WIDTH: f64 = 20.0;

// ── Persistence ─────────────────────────────────────────────────

pub const ANNOTATIONS_PREFIX: &str = "annotations";
pub const METADATA_OPTIONS_PREFIX: &str = "metadataOptions";
pub const LEGACY_ANNOTATIONS_PREFIX: &str = "lineGroups";

/// Display name used when a room references a group that no longer exists.
pub const UNKNOWN_GROUP_NAME: &str = "Unknown Group";
