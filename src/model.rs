//! Data model: extracted labels, provisional rooms, and the annotation graph.
//!
//! Two families of types live here. The extraction read-model (`TextLabel`,
//! `ParsedRoom`, `MetadataOptionSet`) is recomputed from the drawing on every
//! load and never persisted as-is. The annotation graph (`Entity`,
//! `AnnotationGraph`) is the operator's work: groups of drawing elements and
//! rooms composed from groups, persisted per plan.
//!
//! Entities reference drawing elements by id string only. Nothing in this
//! module holds a handle into the rendered drawing.

#[cfg(test)]
#[path = "model_test.rs"]
mod model_test;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Identifier of a drawing element (the `id` of its wrapping `<g>`).
pub type ElementId = String;

/// Identifier of a group or room. Unique across both kinds.
pub type EntityId = String;

/// Normalized metadata key → value.
pub type RoomMetadata = BTreeMap<String, String>;

// =============================================================================
// EXTRACTION READ-MODEL
// =============================================================================

/// A text label harvested from the drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    /// Enclosing element id, or a synthetic `text-<n>` fallback.
    pub id: String,
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl TextLabel {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, x: f64, y: f64) -> Self {
        Self { id: id.into(), text: text.into(), x, y }
    }
}

/// A provisional room: labels clustered by proximity plus what they say.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRoom {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub metadata: RoomMetadata,
    pub text_labels: Vec<TextLabel>,
}

/// Plan-wide pool of observed values per metadata key, used by pickers.
///
/// Values per key are distinct and kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataOptionSet {
    options: BTreeMap<String, BTreeSet<String>>,
}

impl MetadataOptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value under `key`. Blank values are ignored. Returns `true`
    /// when the value was not already known.
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() || key.is_empty() {
            return false;
        }
        self.options.entry(key.to_string()).or_default().insert(value.to_string())
    }

    /// Fold every value of `other` into this set. Returns `true` if anything was added.
    pub fn merge(&mut self, other: &MetadataOptionSet) -> bool {
        let mut changed = false;
        for (key, values) in &other.options {
            for value in values {
                changed |= self.insert(key, value);
            }
        }
        changed
    }

    /// Sorted values observed for `key`.
    #[must_use]
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.options
            .get(key)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Sorted keys with at least one value.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.options.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.options.get(key).is_some_and(|values| values.contains(value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

// =============================================================================
// ANNOTATION ENTITIES
// =============================================================================

/// Discriminator shared by [`Entity`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Group,
    Room,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Room => "room",
        }
    }

    /// Parse the persisted discriminator. Unknown values yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "group" => Some(Self::Group),
            "room" => Some(Self::Room),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named set of drawing elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: EntityId,
    pub name: String,
    /// Never empty while the group exists.
    pub element_ids: BTreeSet<ElementId>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stone_type: Option<String>,
}

/// A named aggregate of groups.
///
/// `element_ids` is the union of the child groups' elements at creation time
/// and does not follow later edits to those groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: EntityId,
    pub name: String,
    pub element_ids: BTreeSet<ElementId>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stone_type: Option<String>,
    #[serde(default)]
    pub child_group_ids: Vec<EntityId>,
    #[serde(default)]
    pub metadata: RoomMetadata,
}

/// A group or a room, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Group(Group),
    Room(Room),
}

impl Entity {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Group(_) => EntityKind::Group,
            Self::Room(_) => EntityKind::Room,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Group(g) => &g.id,
            Self::Room(r) => &r.id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Group(g) => &g.name,
            Self::Room(r) => &r.name,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> &str {
        match self {
            Self::Group(g) => &g.created_at,
            Self::Room(r) => &r.created_at,
        }
    }

    #[must_use]
    pub fn element_ids(&self) -> &BTreeSet<ElementId> {
        match self {
            Self::Group(g) => &g.element_ids,
            Self::Room(r) => &r.element_ids,
        }
    }

    pub fn element_ids_mut(&mut self) -> &mut BTreeSet<ElementId> {
        match self {
            Self::Group(g) => &mut g.element_ids,
            Self::Room(r) => &mut r.element_ids,
        }
    }

    #[must_use]
    pub fn stone_type(&self) -> Option<&str> {
        match self {
            Self::Group(g) => g.stone_type.as_deref(),
            Self::Room(r) => r.stone_type.as_deref(),
        }
    }

    pub fn set_stone_type(&mut self, stone_type: Option<String>) {
        match self {
            Self::Group(g) => g.stone_type = stone_type,
            Self::Room(r) => r.stone_type = stone_type,
        }
    }

    #[must_use]
    pub fn contains(&self, element_id: &str) -> bool {
        self.element_ids().contains(element_id)
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::Room(_) => None,
        }
    }

    #[must_use]
    pub fn as_room(&self) -> Option<&Room> {
        match self {
            Self::Room(r) => Some(r),
            Self::Group(_) => None,
        }
    }
}

// =============================================================================
// ANNOTATION GRAPH
// =============================================================================

/// All groups and rooms of one plan, keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationGraph {
    entities: BTreeMap<EntityId, Entity>,
}

impl AnnotationGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity under its own id.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id().to_string(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entities.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.get(id).and_then(Entity::as_group)
    }

    #[must_use]
    pub fn room(&self, id: &str) -> Option<&Room> {
        self.get(id).and_then(Entity::as_room)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Entities ordered by creation time, then id, optionally filtered by kind.
    #[must_use]
    pub fn sorted(&self, kind: Option<EntityKind>) -> Vec<&Entity> {
        let mut out: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .collect();
        out.sort_by(|a, b| a.created_at().cmp(b.created_at()).then_with(|| a.id().cmp(b.id())));
        out
    }

    /// `true` if any entity (group or room) contains the element.
    #[must_use]
    pub fn is_annotated(&self, element_id: &str) -> bool {
        self.entities.values().any(|e| e.contains(element_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Current UTC time as an RFC 3339 string. Empty if the clock cannot be formatted.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
