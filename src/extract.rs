//! Metadata extraction from a drawing's text labels.
//!
//! DESIGN
//! ======
//! Extraction is a pure function of the label list. Each label is matched
//! against a `key: value` / `key = value` pattern (or the `USFL|FFL <value>`
//! shorthand), labels are clustered into provisional rooms by greedy
//! first-fit proximity to running centroids, and each cluster is read for a
//! name, a level and metadata entries.
//!
//! The clustering is order-dependent greedy first-fit. Existing plans must
//! keep clustering the same way, so only the threshold is tunable
//! ([`ExtractConfig`]); the algorithm is fixed.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error. Unparseable markup yields the labels read
//! before the fault (usually none), and zero labels yield zero rooms.

#[cfg(test)]
#[path = "extract_test.rs"]
mod extract_test;

use std::sync::OnceLock;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ExtractConfig;
use crate::consts::SHEET_CLUSTER_ID;
use crate::model::{MetadataOptionSet, ParsedRoom, RoomMetadata, TextLabel};

// =============================================================================
// TYPES
// =============================================================================

/// Everything one extraction pass derives from the label list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub rooms: Vec<ParsedRoom>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_level: Option<String>,
    pub all_labels: Vec<TextLabel>,
    pub metadata_options: MetadataOptionSet,
}

impl ExtractionResult {
    /// Sorted metadata keys present on any parsed room.
    #[must_use]
    pub fn metadata_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .rooms
            .iter()
            .flat_map(|room| room.metadata.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Distinct sorted values of `key` across parsed rooms. `key` is
    /// normalized like a label key.
    #[must_use]
    pub fn room_options(&self, key: &str) -> Vec<String> {
        let key = normalize_key(key);
        let mut values: Vec<String> = self
            .rooms
            .iter()
            .filter_map(|room| room.metadata.get(&key).cloned())
            .filter(|v| !v.is_empty())
            .collect();
        values.sort();
        values.dedup();
        values
    }
}

/// A `key → value` reading of one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Lower-cased with all whitespace removed.
    pub key: String,
    pub value: String,
}

/// Working cluster for the proximity pass.
struct Cluster {
    id: String,
    labels: Vec<TextLabel>,
    center_x: f64,
    center_y: f64,
}

impl Cluster {
    fn seed(index: usize, label: TextLabel) -> Self {
        Self { id: format!("room-{index}"), center_x: label.x, center_y: label.y, labels: vec![label] }
    }

    fn distance_to(&self, label: &TextLabel) -> f64 {
        (label.x - self.center_x).hypot(label.y - self.center_y)
    }

    #[allow(clippy::cast_precision_loss)]
    fn push(&mut self, label: TextLabel) {
        self.labels.push(label);
        let n = self.labels.len() as f64;
        self.center_x = self.labels.iter().map(|l| l.x).sum::<f64>() / n;
        self.center_y = self.labels.iter().map(|l| l.y).sum::<f64>() / n;
    }
}

// =============================================================================
// PATTERNS
// =============================================================================

type CachedRegex = OnceLock<Result<Regex, regex::Error>>;

/// Compile `pattern` once. A pattern that fails to compile matches nothing.
fn cached(cell: &'static CachedRegex, pattern: &str) -> Option<&'static Regex> {
    match cell.get_or_init(|| Regex::new(pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "label pattern failed to compile");
            None
        }
    }
}

fn key_value_re() -> Option<&'static Regex> {
    static RE: CachedRegex = OnceLock::new();
    cached(&RE, r"^([A-Za-z][A-Za-z0-9\s]*)\s*[:=]\s*(.+)$")
}

fn shorthand_re() -> Option<&'static Regex> {
    static RE: CachedRegex = OnceLock::new();
    cached(&RE, r"(?i)^(USFL|FFL)\s+(.+)$")
}

fn level_number_re() -> Option<&'static Regex> {
    static RE: CachedRegex = OnceLock::new();
    cached(&RE, r"(?i)level\s*(\d+)")
}

/// Lower-case and strip all whitespace: `"Ceiling Height"` → `"ceilingheight"`.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Match a label against the key/value pattern, falling back to the
/// `USFL|FFL <value>` shorthand. The value is the full remainder, trimmed.
#[must_use]
pub fn parse_key_value(text: &str) -> Option<KeyValue> {
    let caps = key_value_re()
        .and_then(|re| re.captures(text))
        .or_else(|| shorthand_re().and_then(|re| re.captures(text)))?;
    let key = normalize_key(caps.get(1)?.as_str());
    let value = caps.get(2)?.as_str().trim().to_string();
    if key.is_empty() {
        return None;
    }
    Some(KeyValue { key, value })
}

/// Like [`parse_key_value`] but with the value cut at the first `(`, as used
/// for the plan-wide option pool (`"120 (approx)"` → `"120"`).
#[must_use]
pub fn parse_option_value(text: &str) -> Option<KeyValue> {
    let mut kv = parse_key_value(text)?;
    if let Some(cut) = kv.value.find('(') {
        kv.value = kv.value[..cut].trim().to_string();
    }
    Some(kv)
}

/// `true` for labels like `"Level 2"`: mentions level, no separator.
#[must_use]
pub fn is_level_label(text: &str) -> bool {
    text.to_lowercase().contains("level") && !text.contains(':') && !text.contains('=')
}

/// Trailing level number if present (`"LEVEL 03"` → `"03"`), else the raw text.
#[must_use]
pub fn level_value(text: &str) -> String {
    level_number_re()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.to_string(), |m| m.as_str().to_string())
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Harvest labels from SVG markup and run [`extract`] over them.
#[must_use]
pub fn extract_svg(svg: &str, config: &ExtractConfig) -> ExtractionResult {
    extract(harvest_labels(svg), config)
}

/// Derive rooms, global level and the option pool from a label list.
#[must_use]
pub fn extract(labels: Vec<TextLabel>, config: &ExtractConfig) -> ExtractionResult {
    let mut metadata_options = MetadataOptionSet::new();
    let mut global_level = None;

    for label in &labels {
        if let Some(kv) = parse_option_value(&label.text) {
            if kv.key != "level" && kv.key != "plan" {
                metadata_options.insert(&kv.key, &kv.value);
            }
        }
        if is_level_label(&label.text) {
            global_level = Some(level_value(&label.text));
        }
    }

    let clusters = cluster_labels(&labels, config);
    let mut rooms: Vec<ParsedRoom> = clusters.into_iter().map(read_cluster).collect();

    if let Some(level) = &global_level {
        if rooms.iter().all(|room| !room.metadata.contains_key("level")) {
            for room in &mut rooms {
                room.metadata.insert("level".to_string(), level.clone());
            }
        }
    }

    debug!(
        labels = labels.len(),
        rooms = rooms.len(),
        option_keys = metadata_options.keys().len(),
        global_level = global_level.as_deref().unwrap_or(""),
        "drawing labels extracted"
    );

    ExtractionResult { rooms, global_level, all_labels: labels, metadata_options }
}

/// Group labels into clusters, either as one small metadata sheet or by
/// greedy first-fit proximity.
fn cluster_labels(labels: &[TextLabel], config: &ExtractConfig) -> Vec<Cluster> {
    if labels.is_empty() {
        return Vec::new();
    }

    let has_level = labels.iter().any(|l| is_level_label(&l.text));
    let has_key_value = labels.iter().any(|l| parse_key_value(&l.text).is_some());
    if has_level && has_key_value && labels.len() <= config.small_sheet_limit {
        let mut sheet = Cluster::seed(0, labels[0].clone());
        sheet.id = SHEET_CLUSTER_ID.to_string();
        for label in &labels[1..] {
            sheet.push(label.clone());
        }
        return vec![sheet];
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    for label in labels {
        match clusters
            .iter_mut()
            .find(|c| c.distance_to(label) <= config.cluster_distance)
        {
            Some(cluster) => cluster.push(label.clone()),
            None => {
                let index = clusters.len();
                clusters.push(Cluster::seed(index, label.clone()));
            }
        }
    }
    clusters
}

/// Read one cluster: key/value labels become metadata, a level label sets the
/// room level, anything else names the room (last one wins).
fn read_cluster(cluster: Cluster) -> ParsedRoom {
    let mut metadata = RoomMetadata::new();
    let mut name = None;

    for label in &cluster.labels {
        if let Some(kv) = parse_key_value(&label.text) {
            metadata.insert(kv.key, kv.value);
        } else if is_level_label(&label.text) {
            metadata.insert("level".to_string(), level_value(&label.text));
        } else {
            name = Some(label.text.clone());
        }
    }

    ParsedRoom { id: cluster.id, name, metadata, text_labels: cluster.labels }
}

// =============================================================================
// SVG LABEL HARVESTING
// =============================================================================

struct PendingLabel {
    id: String,
    x: f64,
    y: f64,
    text: String,
}

/// Collect every non-empty `<text>` node with its position and the id of its
/// nearest enclosing `<g>` (or `text-<n>`, `n` counting all text nodes).
#[must_use]
pub fn harvest_labels(svg: &str) -> Vec<TextLabel> {
    let mut reader = Reader::from_str(svg);
    let mut groups: Vec<Option<String>> = Vec::new();
    let mut pending: Option<PendingLabel> = None;
    let mut text_index = 0usize;
    let mut labels = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"g" => groups.push(attribute(&e, b"id").filter(|id| !id.is_empty())),
                b"text" => {
                    pending = Some(open_label(&e, groups.last().cloned().flatten(), text_index));
                    text_index += 1;
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"text" {
                    text_index += 1;
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(label) = pending.as_mut() {
                    match t.unescape() {
                        Ok(s) => label.text.push_str(&s),
                        Err(_) => label.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(label) = pending.as_mut() {
                    label.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"g" => {
                    groups.pop();
                }
                b"text" => {
                    if let Some(label) = pending.take() {
                        let text = label.text.trim();
                        if !text.is_empty() {
                            labels.push(TextLabel::new(label.id, text, label.x, label.y));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(position = reader.buffer_position(), error = %e, harvested = labels.len(), "drawing markup unparseable; label scan stopped");
                break;
            }
            Ok(_) => {}
        }
    }

    labels
}

fn open_label(e: &BytesStart<'_>, group_id: Option<String>, index: usize) -> PendingLabel {
    PendingLabel {
        id: group_id.unwrap_or_else(|| format!("text-{index}")),
        x: attribute(e, b"x").map_or(0.0, |v| parse_coordinate(&v)),
        y: attribute(e, b"y").map_or(0.0, |v| parse_coordinate(&v)),
        text: String::new(),
    }
}

/// Read an attribute value, unescaped where possible.
pub(crate) fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            return Some(match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            });
        }
    }
    None
}

/// Leading number of a coordinate attribute (`"12.5px"` → 12.5, `"3 4"` → 3).
/// Anything unreadable is 0.
#[must_use]
pub fn parse_coordinate(raw: &str) -> f64 {
    let token = raw
        .trim()
        .split(|c: char| c.is_whitespace() || c == ',')
        .next()
        .unwrap_or("");
    let end = token
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0) || c == 'e' || c == 'E'))
        .map_or(token.len(), |(i, _)| i);
    let mut candidate = &token[..end];
    while !candidate.is_empty() {
        if let Ok(v) = candidate.parse::<f64>() {
            return v;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    0.0
}

// =============================================================================
// LABEL HIDING
// =============================================================================

/// Return the markup with every `<text>` element hidden via
/// `style="display:none"`. Malformed markup is returned unchanged.
#[must_use]
pub fn hide_labels(svg: &str) -> String {
    match rewrite_hidden(svg) {
        Ok(out) => out,
        Err(message) => {
            warn!(error = %message, "could not hide drawing labels; markup left unchanged");
            svg.to_string()
        }
    }
}

fn rewrite_hidden(svg: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        let written = match event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"text" => writer.write_event(Event::Start(hidden(&e))),
            Event::Empty(e) if e.local_name().as_ref() == b"text" => writer.write_event(Event::Empty(hidden(&e))),
            other => writer.write_event(other),
        };
        written.map_err(|e| e.to_string())?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}

fn hidden(e: &BytesStart<'_>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut style = String::new();
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"style" {
            style = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
        } else {
            out.push_attribute(attr);
        }
    }
    let style = style.trim().trim_end_matches(';');
    let style = if style.is_empty() { "display:none".to_string() } else { format!("{style};display:none") };
    out.push_attribute(("style", style.as_str()));
    out
}
