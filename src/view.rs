//! Read models for the presentation layer.
//!
//! Everything here is a pure function of an [`AnnotationGraph`]; nothing is
//! cached between calls. Entity lists come back oldest first.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use serde::Serialize;

use crate::consts::UNKNOWN_GROUP_NAME;
use crate::model::{AnnotationGraph, Entity, EntityId, EntityKind, Group, Room, RoomMetadata};

/// Groups and rooms related to one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElementEntities<'a> {
    pub groups: Vec<&'a Group>,
    pub rooms: Vec<&'a Room>,
}

impl ElementEntities<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.rooms.is_empty()
    }
}

/// One child reference of a room, resolved against the current graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildGroup {
    pub id: EntityId,
    /// Current group name, or the placeholder when the group is gone.
    pub name: String,
    pub resolved: bool,
}

/// Detail panel contents for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub id: EntityId,
    pub name: String,
    pub purpose: Option<String>,
    pub description: Option<String>,
    pub stone_type: Option<String>,
    pub element_count: usize,
    pub metadata: RoomMetadata,
    pub child_groups: Vec<ChildGroup>,
}

/// All entities, optionally of one kind, oldest first.
#[must_use]
pub fn list_entities(graph: &AnnotationGraph, kind: Option<EntityKind>) -> Vec<&Entity> {
    graph.sorted(kind)
}

/// Entities that contain `element_id`.
#[must_use]
pub fn describe_element<'a>(graph: &'a AnnotationGraph, element_id: &str) -> ElementEntities<'a> {
    partition(graph, |entity| entity.contains(element_id))
}

/// Entities that do not yet contain `element_id`.
#[must_use]
pub fn available_targets<'a>(graph: &'a AnnotationGraph, element_id: &str) -> ElementEntities<'a> {
    partition(graph, |entity| !entity.contains(element_id))
}

/// Resolve a room for its detail panel. `None` if `room_id` is not a room.
#[must_use]
pub fn room_detail(graph: &AnnotationGraph, room_id: &str) -> Option<RoomDetail> {
    let room = graph.room(room_id)?;
    let child_groups = room
        .child_group_ids
        .iter()
        .map(|id| match graph.group(id) {
            Some(group) => ChildGroup { id: id.clone(), name: group.name.clone(), resolved: true },
            None => ChildGroup { id: id.clone(), name: UNKNOWN_GROUP_NAME.to_string(), resolved: false },
        })
        .collect();
    Some(RoomDetail {
        id: room.id.clone(),
        name: room.name.clone(),
        purpose: room.purpose.clone(),
        description: room.description.clone(),
        stone_type: room.stone_type.clone(),
        element_count: room.element_ids.len(),
        metadata: room.metadata.clone(),
        child_groups,
    })
}

fn partition<'a, F>(graph: &'a AnnotationGraph, keep: F) -> ElementEntities<'a>
where
    F: Fn(&Entity) -> bool,
{
    let mut out = ElementEntities::default();
    for entity in graph.sorted(None) {
        if !keep(entity) {
            continue;
        }
        match entity {
            Entity::Group(group) => out.groups.push(group),
            Entity::Room(room) => out.rooms.push(room),
        }
    }
    out
}
