//! Selection and highlight controller.
//!
//! DESIGN
//! ======
//! The controller holds the interactive state of one plan view: the hovered
//! element and its tooltip, the ad-hoc element selection gathered for a new
//! group, the set of active saved entities, the focused entity whose detail
//! panel is open, and the element popup.
//!
//! Styling is never cached. [`SelectionController::render`] derives every
//! element's [`Highlight`] from the current graph and selection each time, so
//! deselecting something falls back to whatever still applies rather than to
//! a remembered previous style.
//!
//! Groups and rooms are never active together. A room is active alone; making
//! it active also pulls its children's elements into the element selection,
//! and making it inactive takes exactly those back out.

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{AnnotationGraph, ElementId, Entity, EntityId, EntityKind};
use crate::surface::{DrawingSurface, Style};

// =============================================================================
// TYPES
// =============================================================================

/// A pointer position in host coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Transient hover label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tooltip {
    pub element_id: ElementId,
    pub at: Point,
    /// Names of the entities containing the element, oldest first.
    pub entity_names: Vec<String>,
}

/// Persistent detail popup anchored where an element was clicked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    pub element_id: ElementId,
    pub at: Point,
}

/// Visual state of one element, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Default,
    /// Member of any group or room.
    Grouped,
    /// Member of an active entity.
    Active,
    /// Picked for a new group.
    Selected,
}

impl Highlight {
    #[must_use]
    pub fn style(self) -> Style {
        match self {
            Self::Default => Style::DEFAULT,
            Self::Grouped => Style::GROUPED,
            Self::Active => Style::ACTIVE,
            Self::Selected => Style::SELECTED,
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    tooltip: Option<Tooltip>,
    popup: Option<Popup>,
    selected: BTreeSet<ElementId>,
    active: BTreeSet<EntityId>,
    focused: Option<EntityId>,
    /// Elements pulled into `selected` by the active room.
    expanded: BTreeSet<ElementId>,
}

impl SelectionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries ---

    #[must_use]
    pub fn hovered(&self) -> Option<&str> {
        self.tooltip.as_ref().map(|t| t.element_id.as_str())
    }

    #[must_use]
    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    #[must_use]
    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    #[must_use]
    pub fn selected_element_ids(&self) -> &BTreeSet<ElementId> {
        &self.selected
    }

    #[must_use]
    pub fn active_entity_ids(&self) -> &BTreeSet<EntityId> {
        &self.active
    }

    #[must_use]
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Active ids that resolve to groups, for room creation.
    #[must_use]
    pub fn active_group_ids(&self, graph: &AnnotationGraph) -> Vec<EntityId> {
        graph
            .sorted(Some(EntityKind::Group))
            .into_iter()
            .map(Entity::id)
            .filter(|id| self.active.contains(*id))
            .map(str::to_string)
            .collect()
    }

    // --- Hover ---

    /// Pointer entered an element. Never touches the selection.
    pub fn hover_enter(&mut self, element_id: &str, at: Point, graph: &AnnotationGraph) {
        let entity_names = graph
            .sorted(None)
            .into_iter()
            .filter(|e| e.contains(element_id))
            .map(|e| e.name().to_string())
            .collect();
        self.tooltip = Some(Tooltip { element_id: element_id.to_string(), at, entity_names });
    }

    pub fn hover_move(&mut self, at: Point) {
        if let Some(tooltip) = self.tooltip.as_mut() {
            tooltip.at = at;
        }
    }

    pub fn hover_leave(&mut self) {
        self.tooltip = None;
    }

    // --- Clicks ---

    /// Toggle an element in the ad-hoc selection. Selecting opens the popup at
    /// the pointer; deselecting closes it. Returns whether it is now selected.
    pub fn click_element(&mut self, element_id: &str, at: Point) -> bool {
        if self.selected.remove(element_id) {
            self.expanded.remove(element_id);
            self.popup = None;
            false
        } else {
            self.selected.insert(element_id.to_string());
            self.popup = Some(Popup { element_id: element_id.to_string(), at });
            true
        }
    }

    /// Toggle a saved entity. Returns whether it is now active; unknown ids
    /// are ignored.
    pub fn click_entity(&mut self, entity_id: &str, graph: &AnnotationGraph) -> bool {
        match graph.get(entity_id) {
            None => false,
            Some(Entity::Room(_)) => {
                let was_active = self.active.contains(entity_id);
                self.clear_active();
                if was_active {
                    return false;
                }
                self.active.insert(entity_id.to_string());
                self.focused = Some(entity_id.to_string());
                for element in room_child_elements(entity_id, graph) {
                    if self.selected.insert(element.clone()) {
                        self.expanded.insert(element);
                    }
                }
                true
            }
            Some(Entity::Group(_)) => {
                self.drop_rooms(graph);
                if self.active.remove(entity_id) {
                    if self.focused.as_deref() == Some(entity_id) {
                        self.focused = None;
                    }
                    false
                } else {
                    self.active.insert(entity_id.to_string());
                    self.focused = Some(entity_id.to_string());
                    true
                }
            }
        }
    }

    /// Make `entity_id` the sole active and focused entity.
    pub fn focus_only(&mut self, entity_id: &str, graph: &AnnotationGraph) {
        self.clear_active();
        if graph.contains(entity_id) {
            self.click_entity(entity_id, graph);
        }
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// Drop the ad-hoc element selection and the popup.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.expanded.clear();
        self.popup = None;
    }

    /// Deactivate every entity, returning any room-expanded elements.
    pub fn clear_active(&mut self) {
        for element in std::mem::take(&mut self.expanded) {
            self.selected.remove(&element);
        }
        self.active.clear();
        self.focused = None;
    }

    /// Forget active or focused ids that no longer resolve after a mutation.
    pub fn reconcile(&mut self, graph: &AnnotationGraph) {
        self.active.retain(|id| graph.contains(id));
        if self.focused.as_deref().is_some_and(|id| !graph.contains(id)) {
            self.focused = None;
        }
        if !self.active.iter().any(|id| graph.room(id).is_some()) {
            for element in std::mem::take(&mut self.expanded) {
                self.selected.remove(&element);
            }
        }
    }

    fn drop_rooms(&mut self, graph: &AnnotationGraph) {
        let rooms: Vec<EntityId> = self.active.iter().filter(|id| graph.room(id).is_some()).cloned().collect();
        if rooms.is_empty() {
            return;
        }
        for element in std::mem::take(&mut self.expanded) {
            self.selected.remove(&element);
        }
        for id in &rooms {
            self.active.remove(id);
            if self.focused.as_deref() == Some(id.as_str()) {
                self.focused = None;
            }
        }
    }

    // --- Highlighting ---

    /// Highlight for one element under the current state.
    #[must_use]
    pub fn highlight(&self, element_id: &str, graph: &AnnotationGraph) -> Highlight {
        if self.selected.contains(element_id) {
            Highlight::Selected
        } else if self.active.iter().filter_map(|id| graph.get(id)).any(|e| e.contains(element_id)) {
            Highlight::Active
        } else if graph.is_annotated(element_id) {
            Highlight::Grouped
        } else {
            Highlight::Default
        }
    }

    /// Restyle every interactive element of `surface`. Returns how many were styled.
    pub fn render<D: DrawingSurface + ?Sized>(&self, surface: &mut D, graph: &AnnotationGraph) -> usize {
        let grouped: BTreeSet<&str> = graph.iter().flat_map(|e| e.element_ids().iter().map(String::as_str)).collect();
        let active: BTreeSet<&str> = self
            .active
            .iter()
            .filter_map(|id| graph.get(id))
            .flat_map(|e| e.element_ids().iter().map(String::as_str))
            .collect();

        let elements = surface.interactive_elements();
        for id in &elements {
            let highlight = if self.selected.contains(id) {
                Highlight::Selected
            } else if active.contains(id.as_str()) {
                Highlight::Active
            } else if grouped.contains(id.as_str()) {
                Highlight::Grouped
            } else {
                Highlight::Default
            };
            surface.style(id, highlight.style());
        }
        elements.len()
    }
}

/// Current elements of a room's resolvable child groups.
fn room_child_elements(room_id: &str, graph: &AnnotationGraph) -> BTreeSet<ElementId> {
    graph
        .room(room_id)
        .map(|room| {
            room.child_group_ids
                .iter()
                .filter_map(|id| graph.group(id))
                .flat_map(|group| group.element_ids.iter().cloned())
                .collect()
        })
        .unwrap_or_default()
}
