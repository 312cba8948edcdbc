#![allow(clippy::float_cmp)]

use super::*;

fn label(id: &str, text: &str, x: f64, y: f64) -> TextLabel {
    TextLabel::new(id, text, x, y)
}

fn cfg() -> ExtractConfig {
    ExtractConfig::default()
}

// =============================================================
// Key/value classification
// =============================================================

#[test]
fn key_value_colon_and_equals() {
    assert_eq!(
        parse_key_value("Ceiling Height: 2700"),
        Some(KeyValue { key: "ceilingheight".into(), value: "2700".into() })
    );
    assert_eq!(parse_key_value("Area = 20 m2"), Some(KeyValue { key: "area".into(), value: "20 m2".into() }));
}

#[test]
fn key_value_shorthand_is_case_insensitive() {
    assert_eq!(parse_key_value("USFL 100.2"), Some(KeyValue { key: "usfl".into(), value: "100.2".into() }));
    assert_eq!(parse_key_value("ffl 12.5"), Some(KeyValue { key: "ffl".into(), value: "12.5".into() }));
}

#[test]
fn key_value_rejects_plain_text() {
    assert_eq!(parse_key_value("Kitchen"), None);
    assert_eq!(parse_key_value("Level 2"), None);
    assert_eq!(parse_key_value("12: thirteen"), None);
}

#[test]
fn option_value_truncates_at_parenthesis() {
    let kv = parse_option_value("USFL: 120 (approx)").unwrap();
    assert_eq!(kv.value, "120");
    // Room-level reading keeps the full remainder.
    assert_eq!(parse_key_value("USFL: 120 (approx)").unwrap().value, "120 (approx)");
}

#[test]
fn level_label_detection() {
    assert!(is_level_label("Level 2"));
    assert!(is_level_label("GROUND LEVEL"));
    assert!(!is_level_label("Level: 2"));
    assert!(!is_level_label("level = 2"));
    assert!(!is_level_label("Kitchen"));
}

#[test]
fn level_value_prefers_number() {
    assert_eq!(level_value("Level 03"), "03");
    assert_eq!(level_value("LEVEL2"), "2");
    assert_eq!(level_value("Ground Level"), "Ground Level");
}

// =============================================================
// Extraction scenarios
// =============================================================

#[test]
fn kitchen_sheet_yields_one_room() {
    let labels = vec![
        label("g1", "Level 2", 10.0, 10.0),
        label("g1", "Kitchen", 12.0, 30.0),
        label("g1", "USFL 100.2", 14.0, 50.0),
    ];
    let result = extract(labels, &cfg());

    assert_eq!(result.rooms.len(), 1);
    let room = &result.rooms[0];
    assert_eq!(room.name.as_deref(), Some("Kitchen"));
    assert_eq!(room.metadata.get("level").map(String::as_str), Some("2"));
    assert_eq!(room.metadata.get("usfl").map(String::as_str), Some("100.2"));
    assert_eq!(room.metadata.len(), 2);
    assert_eq!(result.global_level.as_deref(), Some("2"));
    assert_eq!(result.all_labels.len(), 3);
}

#[test]
fn small_sheet_ignores_distance() {
    // Far apart, but five or fewer labels with a level and a key/value label.
    let labels = vec![
        label("a", "Level 1", 0.0, 0.0),
        label("b", "FFL: 10", 5_000.0, 0.0),
        label("c", "Lobby", 0.0, 9_000.0),
    ];
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms.len(), 1);
    assert_eq!(result.rooms[0].id, SHEET_CLUSTER_ID);
    assert_eq!(result.rooms[0].text_labels.len(), 3);
}

#[test]
fn small_sheet_requires_key_value_label() {
    let labels = vec![label("a", "Level 1", 0.0, 0.0), label("b", "Lobby", 5_000.0, 0.0)];
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms.len(), 2);
}

#[test]
fn large_sets_cluster_by_proximity() {
    let labels = vec![
        label("a", "Kitchen", 0.0, 0.0),
        label("b", "FFL: 1", 100.0, 0.0),
        label("c", "Level 1", 0.0, 100.0),
        label("d", "Bedroom", 2_000.0, 2_000.0),
        label("e", "FFL: 2", 2_100.0, 2_000.0),
        label("f", "Zone: north", 2_000.0, 2_100.0),
    ];
    let result = extract(labels, &cfg());

    assert_eq!(result.rooms.len(), 2);
    assert_eq!(result.rooms[0].id, "room-0");
    assert_eq!(result.rooms[0].name.as_deref(), Some("Kitchen"));
    assert_eq!(result.rooms[0].metadata.get("ffl").map(String::as_str), Some("1"));
    assert_eq!(result.rooms[0].metadata.get("level").map(String::as_str), Some("1"));
    assert_eq!(result.rooms[1].id, "room-1");
    assert_eq!(result.rooms[1].name.as_deref(), Some("Bedroom"));
    assert_eq!(result.rooms[1].metadata.get("zone").map(String::as_str), Some("north"));
    assert!(!result.rooms[1].metadata.contains_key("level"));
}

#[test]
fn all_labels_within_threshold_form_one_cluster() {
    let labels: Vec<TextLabel> = (0..8)
        .map(|i| label(&format!("g{i}"), &format!("Note {i}"), f64::from(i) * 40.0, 0.0))
        .collect();
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms.len(), 1);
    assert_eq!(result.rooms[0].text_labels.len(), 8);
}

#[test]
fn label_beyond_threshold_starts_new_cluster() {
    let mut labels: Vec<TextLabel> = (0..6)
        .map(|i| label(&format!("g{i}"), "Wall", f64::from(i) * 10.0, 0.0))
        .collect();
    labels.push(label("far", "Stair", 10_000.0, 0.0));
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms.len(), 2);
    assert_eq!(result.rooms[1].text_labels[0].id, "far");
}

#[test]
fn clustering_follows_running_centroid() {
    // The third label is 520 from the first but within 500 of the centroid of
    // the first two, so it joins; order decides membership.
    let labels = vec![
        label("a", "A", 0.0, 0.0),
        label("b", "B", 400.0, 0.0),
        label("c", "C", 520.0, 0.0),
        label("d", "D", 0.0, 0.0),
        label("e", "E", 5.0, 0.0),
        label("f", "F", 6.0, 0.0),
    ];
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms.len(), 1);
}

#[test]
fn threshold_is_tunable() {
    let labels: Vec<TextLabel> = (0..6)
        .map(|i| label(&format!("g{i}"), "Wall", f64::from(i) * 100.0, 0.0))
        .collect();
    let tight = ExtractConfig { cluster_distance: 50.0, ..ExtractConfig::default() };
    assert_eq!(extract(labels.clone(), &tight).rooms.len(), 6);
    assert_eq!(extract(labels, &cfg()).rooms.len(), 1);
}

#[test]
fn last_plain_label_names_the_room() {
    let labels = vec![
        label("a", "Store", 0.0, 0.0),
        label("b", "Pantry", 1.0, 0.0),
        label("c", "Zone: west", 2.0, 0.0),
        label("d", "Area: 4", 3.0, 0.0),
        label("e", "Door", 4.0, 0.0),
        label("f", "Pantry 2", 5.0, 0.0),
    ];
    let result = extract(labels, &cfg());
    assert_eq!(result.rooms[0].name.as_deref(), Some("Pantry 2"));
}

#[test]
fn option_pool_excludes_level_and_plan() {
    let labels = vec![
        label("a", "Level: 4", 0.0, 0.0),
        label("b", "Plan: A1", 0.0, 0.0),
        label("c", "USFL 10 (max)", 0.0, 0.0),
        label("d", "usfl: 9", 0.0, 0.0),
        label("e", "Finish = oak", 0.0, 0.0),
        label("f", "Finish = ash", 0.0, 0.0),
    ];
    let result = extract(labels, &cfg());
    let options = &result.metadata_options;
    assert_eq!(options.keys(), vec!["finish", "usfl"]);
    assert_eq!(options.values("usfl"), vec!["10", "9"]);
    assert_eq!(options.values("finish"), vec!["ash", "oak"]);
    // Key/value "level" still lands on the room.
    assert_eq!(result.rooms[0].metadata.get("level").map(String::as_str), Some("4"));
    assert_eq!(result.rooms[0].metadata.get("plan").map(String::as_str), Some("A1"));
}

#[test]
fn empty_input_yields_empty_result() {
    let result = extract(Vec::new(), &cfg());
    assert!(result.rooms.is_empty());
    assert!(result.global_level.is_none());
    assert!(result.metadata_options.is_empty());
}

#[test]
fn result_helpers_list_keys_and_values() {
    let labels = vec![
        label("a", "Kitchen", 0.0, 0.0),
        label("b", "FFL: 1", 1.0, 0.0),
        label("c", "Bath", 3_000.0, 0.0),
        label("d", "FFL: 2", 3_001.0, 0.0),
        label("e", "Zone: east", 3_002.0, 0.0),
        label("f", "Hall", 9_000.0, 0.0),
    ];
    let result = extract(labels, &cfg());
    assert_eq!(result.metadata_keys(), vec!["ffl".to_string(), "zone".to_string()]);
    assert_eq!(result.room_options("FFL"), vec!["1".to_string(), "2".to_string()]);
    assert!(result.room_options("missing").is_empty());
}

#[test]
fn room_options_normalize_the_lookup_key() {
    let labels = vec![
        label("a", "Kitchen", 0.0, 0.0),
        label("b", "Ceiling Height: 2700", 1.0, 0.0),
        label("c", "Bath", 3_000.0, 0.0),
        label("d", "ceilingheight: 2400", 3_001.0, 0.0),
    ];
    let result = extract(labels, &cfg());
    assert_eq!(result.room_options("Ceiling Height"), vec!["2400".to_string(), "2700".to_string()]);
    assert_eq!(result.room_options(" CEILING height "), result.room_options("ceilingheight"));
}

// =============================================================
// SVG harvesting
// =============================================================

const PLAN_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
  <g id="*Model_Space">
    <g id="L1"><line x1="0" y1="0" x2="10" y2="0"/></g>
    <g id="T1"><text x="10" y="20">Level 2</text></g>
    <g id="T2"><text x="12.5px" y="30">Kit<tspan>chen</tspan></text></g>
    <g><text x="14" y="50">USFL 100.2</text></g>
  </g>
  <text x="1" y="2">   </text>
  <text x="bad">Fish &amp; Chips</text>
</svg>"#;

#[test]
fn harvest_reads_ids_positions_and_text() {
    let labels = harvest_labels(PLAN_SVG);
    assert_eq!(labels.len(), 4);
    assert_eq!(labels[0], TextLabel::new("T1", "Level 2", 10.0, 20.0));
    assert_eq!(labels[1], TextLabel::new("T2", "Kitchen", 12.5, 30.0));
    // Nearest <g> has no id → synthetic fallback by text index.
    assert_eq!(labels[2].id, "text-2");
    // Blank text node is skipped but still counted.
    assert_eq!(labels[3].id, "text-4");
    assert_eq!(labels[3].text, "Fish & Chips");
    assert_eq!(labels[3].x, 0.0);
}

#[test]
fn extract_svg_matches_label_scenario() {
    let result = extract_svg(PLAN_SVG, &cfg());
    assert_eq!(result.all_labels.len(), 4);
    assert_eq!(result.rooms.len(), 1);
    assert_eq!(result.rooms[0].metadata.get("usfl").map(String::as_str), Some("100.2"));
}

#[test]
fn harvest_survives_malformed_markup() {
    assert!(harvest_labels("<svg><g id='a'><text x='1'>ok</g></svg>").len() <= 1);
    assert!(harvest_labels("not xml at all").is_empty());
    assert!(harvest_labels("").is_empty());
    assert!(extract_svg("<<<", &cfg()).rooms.is_empty());
}

#[test]
fn coordinates_parse_leading_number() {
    assert_eq!(parse_coordinate("12.5px"), 12.5);
    assert_eq!(parse_coordinate("-3 4 5"), -3.0);
    assert_eq!(parse_coordinate("7,8"), 7.0);
    assert_eq!(parse_coordinate("1e2"), 100.0);
    assert_eq!(parse_coordinate("abc"), 0.0);
    assert_eq!(parse_coordinate(""), 0.0);
}

// =============================================================
// Label hiding
// =============================================================

#[test]
fn hide_labels_adds_display_none() {
    let out = hide_labels(r#"<svg><text x="1">A</text><line/></svg>"#);
    assert!(out.contains(r#"<text x="1" style="display:none">A</text>"#));
    assert!(out.contains("<line/>"));
}

#[test]
fn hide_labels_merges_existing_style() {
    let out = hide_labels(r#"<svg><text style="fill:red;">A</text></svg>"#);
    assert!(out.contains(r#"style="fill:red;display:none""#));
    assert_eq!(out.matches("style=").count(), 1);
}

#[test]
fn hide_labels_leaves_malformed_markup_unchanged() {
    let broken = "<svg><text>A</svg>";
    assert_eq!(hide_labels(broken), broken);
}
