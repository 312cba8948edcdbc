//! Annotation store: the per-plan group/room graph and its mutation API.
//!
//! DESIGN
//! ======
//! The store owns one plan's [`AnnotationGraph`] and the plan-wide
//! [`MetadataOptionSet`]. Every mutation validates its arguments, builds the
//! next graph on a copy, writes the whole graph through the injected
//! [`KeyValueStore`], and only then swaps it in. Callers hand over fully
//! decided arguments (names, purposes, metadata); nothing here asks for more
//! input mid-operation.
//!
//! Rooms snapshot their children: a room's `element_ids` is the union of its
//! child groups at creation time and is not touched by later edits to those
//! groups. Deleting a group leaves rooms pointing at it; readers resolve such
//! references as "Unknown Group".
//!
//! ERROR HANDLING
//! ==============
//! Precondition failures and storage failures come back as
//! [`AnnotationError`] and leave the graph as it was. Corrupt or
//! unrecognized persisted data found while opening is logged, read as empty
//! and left in place until the next mutation. The option set is a
//! derived cache: a failed option write is logged and the in-memory set kept.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::BTreeSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::extract::normalize_key;
use crate::migrate::migrate;
use crate::model::{
    AnnotationGraph, ElementId, Entity, EntityId, EntityKind, Group, MetadataOptionSet, Room, RoomMetadata,
    now_rfc3339,
};
use crate::storage::{KeyValueStore, StorageError, annotations_key, legacy_annotations_key, metadata_options_key};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("a group needs at least 2 elements, got {count}")]
    TooFewElements { count: usize },
    #[error("a room needs at least 2 groups, got {count}")]
    TooFewGroups { count: usize },
    #[error("name must not be empty")]
    EmptyName,
    #[error("metadata key must not be empty")]
    EmptyKey,
    #[error("element id must not be empty")]
    EmptyElementId,
    #[error("entity not found: {0}")]
    NotFound(EntityId),
    #[error("not a group: {0}")]
    NotAGroup(EntityId),
    #[error("not a room: {0}")]
    NotARoom(EntityId),
    #[error("cannot merge group {0} into itself")]
    SelfMerge(EntityId),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ErrorCode for AnnotationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::TooFewElements { .. } => "E_TOO_FEW_ELEMENTS",
            Self::TooFewGroups { .. } => "E_TOO_FEW_GROUPS",
            Self::EmptyName => "E_EMPTY_NAME",
            Self::EmptyKey => "E_EMPTY_KEY",
            Self::EmptyElementId => "E_EMPTY_ELEMENT_ID",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::NotAGroup(_) => "E_NOT_A_GROUP",
            Self::NotARoom(_) => "E_NOT_A_ROOM",
            Self::SelfMerge(_) => "E_SELF_MERGE",
            Self::Storage(e) => e.error_code(),
            Self::Serialize(_) => "E_SERIALIZE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.retryable(),
            _ => false,
        }
    }
}

/// Arguments for [`AnnotationStore::create_room`].
#[derive(Debug, Clone, Default)]
pub struct RoomDraft {
    pub child_group_ids: Vec<EntityId>,
    pub name: String,
    pub purpose: Option<String>,
    pub description: Option<String>,
    /// Initial metadata; keys are normalized, blank values dropped.
    pub metadata: RoomMetadata,
}

/// What [`AnnotationStore::remove_element`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The element was not in the group.
    Unchanged,
    Removed,
    /// The last element went and the group with it.
    GroupDeleted,
}

// =============================================================================
// STORE
// =============================================================================

pub struct AnnotationStore<S> {
    storage: S,
    plan_id: String,
    graph: AnnotationGraph,
    options: MetadataOptionSet,
}

impl<S: KeyValueStore> AnnotationStore<S> {
    /// Load a plan's graph and option set.
    ///
    /// Falls back to the legacy key when the current one is absent, migrates
    /// whatever it finds, and rewrites the document when migration changed it.
    /// Documents that migrate to nothing are left as stored.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Storage`] when the backing store cannot be read.
    pub fn open(storage: S, plan_id: impl Into<String>) -> Result<Self, AnnotationError> {
        let plan_id = plan_id.into();
        let current = storage.get(&annotations_key(&plan_id))?;
        let from_legacy = current.is_none();
        let raw = match current {
            Some(text) => Some(text),
            None => storage.get(&legacy_annotations_key(&plan_id))?,
        };

        let mut graph = AnnotationGraph::new();
        let mut rewrite = false;
        if let Some(text) = raw {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                    graph = migrate(&value);
                    let recognized = value.is_object() && !graph.is_empty();
                    if recognized {
                        rewrite = from_legacy || serde_json::to_value(&graph).map_or(true, |v| v != value);
                    } else if value.as_object().is_none_or(|entries| !entries.is_empty()) {
                        warn!(%plan_id, "store: unrecognized annotation document; starting empty");
                    }
                }
                Err(e) => warn!(%plan_id, error = %e, "store: corrupt annotation document; starting empty"),
            }
        }

        let options = match storage.get(&metadata_options_key(&plan_id))? {
            Some(text) => serde_json::from_str::<MetadataOptionSet>(&text).unwrap_or_else(|e| {
                warn!(%plan_id, error = %e, "store: corrupt metadata options; starting empty");
                MetadataOptionSet::new()
            }),
            None => MetadataOptionSet::new(),
        };

        let mut store = Self { storage, plan_id, graph: AnnotationGraph::new(), options };
        if rewrite {
            if let Err(e) = store.commit(graph.clone()) {
                warn!(plan_id = %store.plan_id, error = %e, "store: could not rewrite migrated annotations");
                store.graph = graph;
            }
        } else {
            store.graph = graph;
        }
        info!(plan_id = %store.plan_id, entities = store.graph.len(), migrated = rewrite, "store: plan loaded");
        Ok(store)
    }

    // --- Queries ---

    #[must_use]
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    #[must_use]
    pub fn graph(&self) -> &AnnotationGraph {
        &self.graph
    }

    #[must_use]
    pub fn options(&self) -> &MetadataOptionSet {
        &self.options
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    // --- Groups ---

    /// Create a group over at least two distinct elements. Ids are trimmed and
    /// blank ones skipped, the same way a persisted document is read back.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::TooFewElements`], [`AnnotationError::EmptyName`], or a
    /// persistence failure.
    pub fn create_group<I>(&mut self, element_ids: I, name: &str) -> Result<EntityId, AnnotationError>
    where
        I: IntoIterator,
        I::Item: Into<ElementId>,
    {
        let element_ids: BTreeSet<ElementId> = element_ids
            .into_iter()
            .map(Into::into)
            .map(|id: ElementId| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if element_ids.len() < 2 {
            return Err(AnnotationError::TooFewElements { count: element_ids.len() });
        }
        let name = required_name(name)?;

        let id = self.fresh_id(EntityKind::Group);
        let count = element_ids.len();
        let mut next = self.graph.clone();
        next.insert(Entity::Group(Group {
            id: id.clone(),
            name,
            element_ids,
            created_at: now_rfc3339(),
            stone_type: None,
        }));
        self.commit(next)?;
        info!(plan_id = %self.plan_id, group_id = %id, count, "store: group created");
        Ok(id)
    }

    /// Add an element to a group. Returns `false` if it was already a member.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::EmptyElementId`], [`AnnotationError::NotFound`],
    /// [`AnnotationError::NotAGroup`], or a persistence failure.
    pub fn add_element(&mut self, group_id: &str, element_id: &str) -> Result<bool, AnnotationError> {
        let element_id = required_element_id(element_id)?;
        self.require_group(group_id)?;
        let mut next = self.graph.clone();
        let added = next
            .get_mut(group_id)
            .is_some_and(|group| group.element_ids_mut().insert(element_id.clone()));
        if !added {
            return Ok(false);
        }
        self.commit(next)?;
        info!(plan_id = %self.plan_id, %group_id, %element_id, "store: element added");
        Ok(true)
    }

    /// Remove an element from a group, deleting the group when it empties.
    /// Rooms that listed the group keep their snapshot.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::EmptyElementId`], [`AnnotationError::NotFound`],
    /// [`AnnotationError::NotAGroup`], or a persistence failure.
    pub fn remove_element(&mut self, group_id: &str, element_id: &str) -> Result<Removal, AnnotationError> {
        let element_id = required_element_id(element_id)?;
        self.require_group(group_id)?;
        let mut next = self.graph.clone();
        let Some(group) = next.get_mut(group_id) else {
            return Err(AnnotationError::NotFound(group_id.to_string()));
        };
        if !group.element_ids_mut().remove(&element_id) {
            return Ok(Removal::Unchanged);
        }
        let outcome = if group.element_ids().is_empty() {
            next.remove(group_id);
            Removal::GroupDeleted
        } else {
            Removal::Removed
        };
        self.commit(next)?;
        match outcome {
            Removal::GroupDeleted => info!(plan_id = %self.plan_id, %group_id, "store: last element removed; group deleted"),
            _ => info!(plan_id = %self.plan_id, %group_id, %element_id, "store: element removed"),
        }
        Ok(outcome)
    }

    /// Fold `source` into `target` and delete `source`.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::SelfMerge`], [`AnnotationError::NotFound`],
    /// [`AnnotationError::NotAGroup`], or a persistence failure.
    pub fn merge_groups(&mut self, source_id: &str, target_id: &str) -> Result<(), AnnotationError> {
        if source_id == target_id {
            return Err(AnnotationError::SelfMerge(source_id.to_string()));
        }
        let source = self.require_group(source_id)?.element_ids.clone();
        self.require_group(target_id)?;

        let mut next = self.graph.clone();
        if let Some(target) = next.get_mut(target_id) {
            target.element_ids_mut().extend(source);
        }
        next.remove(source_id);
        self.commit(next)?;
        info!(plan_id = %self.plan_id, %source_id, %target_id, "store: groups merged");
        Ok(())
    }

    // --- Rooms ---

    /// Create a room over at least two existing groups.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::TooFewGroups`], [`AnnotationError::NotFound`],
    /// [`AnnotationError::NotAGroup`], [`AnnotationError::EmptyName`], or a
    /// persistence failure.
    pub fn create_room(&mut self, draft: RoomDraft) -> Result<EntityId, AnnotationError> {
        let mut seen = BTreeSet::new();
        let child_group_ids: Vec<EntityId> = draft
            .child_group_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if child_group_ids.len() < 2 {
            return Err(AnnotationError::TooFewGroups { count: child_group_ids.len() });
        }

        let mut element_ids = BTreeSet::new();
        let mut stone_type = None;
        for (i, child_id) in child_group_ids.iter().enumerate() {
            let child = self.require_group(child_id)?;
            element_ids.extend(child.element_ids.iter().cloned());
            if i == 0 {
                stone_type.clone_from(&child.stone_type);
            }
        }
        let name = required_name(&draft.name)?;

        let metadata: RoomMetadata = draft
            .metadata
            .into_iter()
            .map(|(key, value)| (normalize_key(&key), value.trim().to_string()))
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();

        let id = self.fresh_id(EntityKind::Room);
        let mut next = self.graph.clone();
        next.insert(Entity::Room(Room {
            id: id.clone(),
            name,
            element_ids,
            created_at: now_rfc3339(),
            purpose: optional_text(draft.purpose.as_deref()),
            description: optional_text(draft.description.as_deref()),
            stone_type,
            child_group_ids,
            metadata: metadata.clone(),
        }));
        self.commit(next)?;
        info!(plan_id = %self.plan_id, room_id = %id, "store: room created");
        self.observe_options(metadata.iter());
        Ok(id)
    }

    /// Assign one metadata key on a room, or clear it when `value` is `None`
    /// or blank. New values join the plan's option set.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::EmptyKey`], [`AnnotationError::NotFound`],
    /// [`AnnotationError::NotARoom`], or a persistence failure.
    pub fn set_metadata_value(&mut self, room_id: &str, key: &str, value: Option<&str>) -> Result<(), AnnotationError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(AnnotationError::EmptyKey);
        }
        self.require_room(room_id)?;
        let value = value.map(str::trim).filter(|v| !v.is_empty());

        let mut next = self.graph.clone();
        if let Some(Entity::Room(room)) = next.get_mut(room_id) {
            match value {
                Some(v) => room.metadata.insert(key.clone(), v.to_string()),
                None => room.metadata.remove(&key),
            };
        }
        self.commit(next)?;
        info!(plan_id = %self.plan_id, %room_id, %key, cleared = value.is_none(), "store: room metadata set");
        if let Some(v) = value {
            self.observe_options([(&key, &v.to_string())]);
        }
        Ok(())
    }

    /// Set or clear (on `None` or blank) the stone type of any entity.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::NotFound`] or a persistence failure.
    pub fn set_stone_type(&mut self, entity_id: &str, stone_type: Option<&str>) -> Result<(), AnnotationError> {
        let stone_type = optional_text(stone_type);
        let mut next = self.graph.clone();
        let Some(entity) = next.get_mut(entity_id) else {
            return Err(AnnotationError::NotFound(entity_id.to_string()));
        };
        entity.set_stone_type(stone_type.clone());
        self.commit(next)?;
        info!(plan_id = %self.plan_id, %entity_id, stone_type = stone_type.as_deref().unwrap_or(""), "store: stone type set");
        Ok(())
    }

    // --- Any entity ---

    /// Delete a group or room. Deleting a room leaves its groups alone;
    /// deleting a group leaves rooms referencing it with a dangling id.
    ///
    /// # Errors
    ///
    /// [`AnnotationError::NotFound`] or a persistence failure.
    pub fn delete_entity(&mut self, entity_id: &str) -> Result<Entity, AnnotationError> {
        let mut next = self.graph.clone();
        let Some(removed) = next.remove(entity_id) else {
            return Err(AnnotationError::NotFound(entity_id.to_string()));
        };
        self.commit(next)?;
        info!(plan_id = %self.plan_id, %entity_id, kind = %removed.kind(), "store: entity deleted");
        Ok(removed)
    }

    // --- Options ---

    /// Fold extracted options into the plan's option set and persist it if
    /// anything was new. Returns whether the set changed.
    pub fn sync_options(&mut self, extracted: &MetadataOptionSet) -> bool {
        let mut next = self.options.clone();
        if !next.merge(extracted) {
            return false;
        }
        self.store_options(next);
        true
    }

    fn observe_options<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut next = self.options.clone();
        let mut changed = false;
        for (key, value) in entries {
            changed |= next.insert(key, value);
        }
        if changed {
            self.store_options(next);
        }
    }

    fn store_options(&mut self, next: MetadataOptionSet) {
        let key = metadata_options_key(&self.plan_id);
        let written = match serde_json::to_string(&next) {
            Ok(text) => self.storage.set(&key, &text).map_err(AnnotationError::from),
            Err(e) => Err(AnnotationError::from(e)),
        };
        if let Err(e) = written {
            warn!(plan_id = %self.plan_id, error = %e, "store: could not persist metadata options");
        }
        self.options = next;
    }

    // --- Internals ---

    fn commit(&mut self, next: AnnotationGraph) -> Result<(), AnnotationError> {
        let text = serde_json::to_string(&next)?;
        self.storage.set(&annotations_key(&self.plan_id), &text)?;
        self.graph = next;
        Ok(())
    }

    fn fresh_id(&self, kind: EntityKind) -> EntityId {
        loop {
            let id = format!("{}-{}", kind.as_str(), Uuid::new_v4().simple());
            if !self.graph.contains(&id) {
                return id;
            }
        }
    }

    fn require_group(&self, id: &str) -> Result<&Group, AnnotationError> {
        match self.graph.get(id) {
            None => Err(AnnotationError::NotFound(id.to_string())),
            Some(Entity::Group(group)) => Ok(group),
            Some(Entity::Room(_)) => Err(AnnotationError::NotAGroup(id.to_string())),
        }
    }

    fn require_room(&self, id: &str) -> Result<&Room, AnnotationError> {
        match self.graph.get(id) {
            None => Err(AnnotationError::NotFound(id.to_string())),
            Some(Entity::Room(room)) => Ok(room),
            Some(Entity::Group(_)) => Err(AnnotationError::NotARoom(id.to_string())),
        }
    }
}

fn required_name(raw: &str) -> Result<String, AnnotationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AnnotationError::EmptyName);
    }
    Ok(name.to_string())
}

fn required_element_id(raw: &str) -> Result<ElementId, AnnotationError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AnnotationError::EmptyElementId);
    }
    Ok(id.to_string())
}

fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
