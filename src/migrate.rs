//! Persisted-format normalization.
//!
//! DESIGN
//! ======
//! Three shapes have been written under a plan's annotation key over time:
//!
//! - legacy: `{ "<id>": ["<elementId>", ...] }`, bare element lists;
//! - historical objects: `{ "<id>": { name, lines, type, childGroups, ... } }`;
//! - current: `{ "<id>": { kind, name, elementIds, createdAt, ... } }`.
//!
//! [`migrate`] reads any mix of them entry by entry and yields a current
//! [`AnnotationGraph`]. Missing optional fields are back-filled with defaults,
//! so feeding the serialized result back in returns the same graph.
//!
//! ERROR HANDLING
//! ==============
//! Entries that cannot be read (wrong JSON type, a group without elements)
//! are logged and dropped. A document that is not a JSON object yields an
//! empty graph.

#[cfg(test)]
#[path = "migrate_test.rs"]
mod migrate_test;

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{AnnotationGraph, ElementId, Entity, EntityKind, Group, Room, RoomMetadata, now_rfc3339};

/// Name given to current-format entities saved without one.
const UNNAMED: &str = "Unnamed Group";

/// Parse and migrate a persisted document.
///
/// # Errors
///
/// Returns the JSON error when `text` is not valid JSON.
pub fn migrate_str(text: &str) -> Result<AnnotationGraph, serde_json::Error> {
    let raw: Value = serde_json::from_str(text)?;
    Ok(migrate(&raw))
}

/// Normalize a persisted document into the current graph.
#[must_use]
pub fn migrate(raw: &Value) -> AnnotationGraph {
    let mut graph = AnnotationGraph::new();
    let Some(entries) = raw.as_object() else {
        if !raw.is_null() {
            warn!(kind = json_kind(raw), "annotation document is not an object; starting empty");
        }
        return graph;
    };

    for (id, value) in entries {
        let entity = match value {
            Value::Array(items) => legacy_group(id, items),
            Value::Object(fields) => current_entity(id, fields),
            other => {
                warn!(entity_id = %id, kind = json_kind(other), "unreadable annotation entry dropped");
                None
            }
        };
        if let Some(entity) = entity {
            graph.insert(entity);
        }
    }
    graph
}

/// Display name for a legacy entry: `group-3` → `Group 3`.
#[must_use]
pub fn legacy_name(id: &str) -> String {
    match id.split('-').nth(1) {
        Some(suffix) if !suffix.is_empty() => format!("Group {suffix}"),
        _ => format!("Group {id}"),
    }
}

fn legacy_group(id: &str, items: &[Value]) -> Option<Entity> {
    let element_ids: BTreeSet<ElementId> = items.iter().filter_map(element_id).collect();
    if element_ids.is_empty() {
        warn!(entity_id = %id, "legacy group without elements dropped");
        return None;
    }
    Some(Entity::Group(Group {
        id: id.to_string(),
        name: legacy_name(id),
        element_ids,
        created_at: now_rfc3339(),
        stone_type: None,
    }))
}

fn current_entity(id: &str, fields: &Map<String, Value>) -> Option<Entity> {
    let kind = match text(fields, &["kind", "type"]) {
        None => EntityKind::Group,
        Some(raw) => EntityKind::parse(&raw).unwrap_or_else(|| {
            warn!(entity_id = %id, kind = %raw, "unknown entity kind; reading as group");
            EntityKind::Group
        }),
    };
    let name = text(fields, &["name"]).unwrap_or_else(|| UNNAMED.to_string());
    let element_ids: BTreeSet<ElementId> = list(fields, &["elementIds", "lines"]).into_iter().collect();
    let created_at = text(fields, &["createdAt"]).unwrap_or_else(now_rfc3339);
    let stone_type = text(fields, &["stoneType"]);

    match kind {
        EntityKind::Group => {
            if element_ids.is_empty() {
                warn!(entity_id = %id, "group without elements dropped");
                return None;
            }
            Some(Entity::Group(Group { id: id.to_string(), name, element_ids, created_at, stone_type }))
        }
        EntityKind::Room => Some(Entity::Room(Room {
            id: id.to_string(),
            name,
            element_ids,
            created_at,
            purpose: text(fields, &["purpose"]),
            description: text(fields, &["description"]),
            stone_type,
            child_group_ids: list(fields, &["childGroupIds", "childGroups", "sourceGroups"]),
            metadata: metadata(fields),
        })),
    }
}

/// First non-blank string among `keys`, trimmed.
fn text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First array among `keys`, read as element or entity ids.
fn list(fields: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_array))
        .map(|items| {
            let mut seen = BTreeSet::new();
            items
                .iter()
                .filter_map(element_id)
                .filter(|id| seen.insert(id.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn element_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn metadata(fields: &Map<String, Value>) -> RoomMetadata {
    let Some(entries) = fields.get("metadata").and_then(Value::as_object) else {
        return RoomMetadata::new();
    };
    entries
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            (!value.is_empty()).then(|| (key.clone(), value))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
