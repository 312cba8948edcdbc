//! End-to-end flows: a drawing on disk, a file-backed plan, and the session
//! driving extraction, grouping, rooms and persistence together.

use std::collections::BTreeSet;

use planmark::config::EngineConfig;
use planmark::engine::{Action, PlanSession};
use planmark::model::{EntityId, EntityKind};
use planmark::selection::Point;
use planmark::storage::{FileStore, KeyValueStore, annotations_key, legacy_annotations_key};
use planmark::store::{AnnotationStore, Removal, RoomDraft};
use planmark::surface::{DrawingSurface, Style};
use planmark::view;

// =============================================================
// Helpers
// =============================================================

const FLOOR_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 4000 3000">
  <g id="*Model_Space">
    <g id="w1"><line x1="0" y1="0" x2="1000" y2="0"/></g>
    <g id="w2"><line x1="1000" y1="0" x2="1000" y2="800"/></g>
    <g id="w3"><polyline points="1000,800 0,800 0,0"/></g>
    <g id="w4"><line x1="2000" y1="0" x2="3000" y2="0"/></g>
    <g id="lbl-k1"><text x="400" y="300">Kitchen</text></g>
    <g id="lbl-k2"><text x="420" y="340">USFL: 100.2</text></g>
    <g id="lbl-b1"><text x="2500" y="300">Bath</text></g>
    <g id="lbl-b2"><text x="2520" y="340">FFL = 12 (approx)</text></g>
    <g id="lbl-b3"><text x="2540" y="380">Finish: Honed</text></g>
    <g id="lbl-x"><text x="3900" y="2900">Level 3</text></g>
  </g>
</svg>"#;

const PLAN: &str = "tower-a-03";

fn open(dir: &std::path::Path) -> PlanSession<FileStore> {
    PlanSession::open(FileStore::new(dir), PLAN, FLOOR_SVG, EngineConfig::default()).unwrap()
}

fn created(actions: &[Action]) -> EntityId {
    actions
        .iter()
        .find_map(|a| match a {
            Action::EntityCreated { id, .. } => Some(id.clone()),
            _ => None,
        })
        .unwrap()
}

fn group(session: &mut PlanSession<FileStore>, elements: &[&str], name: &str) -> EntityId {
    for id in elements {
        session.click_element(id, Point::new(0.0, 0.0));
    }
    created(&session.create_group(name))
}

// =============================================================
// Extraction
// =============================================================

#[test]
fn drawing_labels_cluster_into_rooms() {
    let dir = tempfile::tempdir().unwrap();
    let session = open(dir.path());
    let extraction = session.extraction();

    let names: Vec<Option<&str>> = extraction.rooms.iter().map(|r| r.name.as_deref()).collect();
    assert_eq!(names, vec![Some("Kitchen"), Some("Bath"), None]);
    assert_eq!(extraction.rooms[0].metadata.get("usfl").map(String::as_str), Some("100.2"));
    assert_eq!(extraction.rooms[1].metadata.get("ffl").map(String::as_str), Some("12 (approx)"));
    assert_eq!(extraction.global_level.as_deref(), Some("3"));

    // The option pool truncates at the parenthesis and is persisted for the plan.
    let options = session.store().options();
    assert_eq!(options.values("ffl"), vec!["12"]);
    assert_eq!(options.values("finish"), vec!["Honed"]);
    assert_eq!(extraction.metadata_keys(), vec!["ffl", "finish", "level", "usfl"]);
}

// =============================================================
// Annotation lifecycle
// =============================================================

#[test]
fn group_room_lifecycle_persists_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open(dir.path());

    let north = group(&mut session, &["w1", "w2"], "North walls");
    let south = group(&mut session, &["w3", "w4"], "South walls");
    session.set_stone_type(&north, Some("Carrara"));
    session.set_stone_type(&south, Some("Carrara"));
    session.click_entity(&north);
    session.click_entity(&south);
    let room = created(&session.create_room(RoomDraft {
        name: "Kitchen".into(),
        purpose: Some("Cooking".into()),
        metadata: [("USFL".to_string(), "100.2".to_string())].into_iter().collect(),
        ..RoomDraft::default()
    }));

    let reopened = open(dir.path());
    let graph = reopened.graph();
    assert_eq!(graph.len(), 3);
    let stored = graph.room(&room).unwrap();
    assert_eq!(stored.stone_type.as_deref(), Some("Carrara"));
    assert_eq!(stored.element_ids.iter().map(String::as_str).collect::<Vec<_>>(), vec!["w1", "w2", "w3", "w4"]);
    assert_eq!(stored.metadata.get("usfl").map(String::as_str), Some("100.2"));

    let detail = view::room_detail(graph, &room).unwrap();
    let children: BTreeSet<&str> = detail.child_groups.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(children, ["North walls", "South walls"].into_iter().collect());
}

#[test]
fn deleting_a_child_group_leaves_room_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open(dir.path());
    let north = group(&mut session, &["w1", "w2"], "North");
    let south = group(&mut session, &["w3", "w4"], "South");
    session.click_entity(&north);
    session.click_entity(&south);
    let room = created(&session.create_room(RoomDraft { name: "Hall".into(), ..RoomDraft::default() }));

    session.remove_from_entity("w1", &north);
    let actions = session.remove_from_entity("w2", &north);
    assert!(actions.contains(&Action::EntityDeleted { id: north.clone(), kind: EntityKind::Group }));

    let graph = session.graph();
    assert_eq!(graph.room(&room).unwrap().element_ids.len(), 4);
    let detail = view::room_detail(graph, &room).unwrap();
    assert!(detail.child_groups.iter().any(|c| c.name == "Unknown Group" && !c.resolved));

    // w1 is still inside the room, so it stays blue.
    assert_eq!(session.surface().find_element("w1").unwrap().style, Some(Style::GROUPED));
}

#[test]
fn popup_targets_track_membership() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open(dir.path());
    let north = group(&mut session, &["w1", "w2"], "North");
    let south = group(&mut session, &["w3", "w4"], "South");

    let targets = view::available_targets(session.graph(), "w1");
    assert_eq!(targets.groups.iter().map(|g| g.id.as_str()).collect::<Vec<_>>(), vec![south.as_str()]);

    session.add_to_entity("w1", &south);
    assert!(view::available_targets(session.graph(), "w1").is_empty());
    let described = view::describe_element(session.graph(), "w1");
    assert_eq!(described.groups.len(), 2);

    session.merge_groups(&south, &north);
    let merged = session.graph().group(&north).unwrap();
    assert_eq!(merged.element_ids.len(), 4);
    assert_eq!(session.selection().focused(), Some(north.as_str()));
}

#[test]
fn rejected_commands_leave_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open(dir.path());
    let north = group(&mut session, &["w1", "w2"], "North");
    let before = FileStore::new(dir.path()).get(&annotations_key(PLAN)).unwrap();

    let actions = session.merge_groups(&north, "missing");
    assert!(matches!(actions.as_slice(), [Action::Failed { error }] if error.code == "E_NOT_FOUND" && !error.retryable));
    assert_eq!(FileStore::new(dir.path()).get(&annotations_key(PLAN)).unwrap(), before);
}

// =============================================================
// Persistence formats
// =============================================================

#[test]
fn legacy_plan_is_migrated_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = FileStore::new(dir.path());
    storage.set(&legacy_annotations_key(PLAN), r#"{"group-1":["w1","w2"],"group-2":["w3"]}"#).unwrap();

    let session = PlanSession::open(storage, PLAN, FLOOR_SVG, EngineConfig::default()).unwrap();
    assert_eq!(session.graph().group("group-1").unwrap().name, "Group 1");
    assert_eq!(session.surface().find_element("w3").unwrap().style, Some(Style::GROUPED));
    assert_eq!(session.surface().find_element("w4").unwrap().style, Some(Style::DEFAULT));

    let rewritten = FileStore::new(dir.path()).get(&annotations_key(PLAN)).unwrap().unwrap();
    assert!(rewritten.contains(r#""kind":"group""#));
}

#[test]
fn corrupt_plan_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = FileStore::new(dir.path());
    storage.set(&annotations_key(PLAN), "{ this is not json").unwrap();

    let mut store = AnnotationStore::open(storage, PLAN).unwrap();
    assert!(store.graph().is_empty());
    let id = store.create_group(["a", "b"], "Fresh").unwrap();
    assert_eq!(store.remove_element(&id, "a").unwrap(), Removal::Removed);
}

#[test]
fn rendered_drawing_hides_labels_and_carries_styles() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open(dir.path());
    let north = group(&mut session, &["w1", "w2"], "North");
    session.click_entity(&north);
    session.click_element("w4", Point::new(0.0, 0.0));

    let svg = session.to_svg();
    assert!(svg.contains("display:none"));
    assert!(svg.contains("stroke:orange;stroke-width:15px"));
    assert!(svg.contains("stroke:#e0218a;stroke-width:20px"));
    assert_eq!(svg.matches(r#"class="hit-area""#).count(), session.surface().interactive_elements().len());
}
