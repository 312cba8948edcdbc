//! Plan session: one plan view wired end to end.
//!
//! DESIGN
//! ======
//! [`PlanSession`] owns the drawing surface, the annotation store, the
//! selection controller and the overlay toggle for a single plan. The host
//! forwards pointer and keyboard events plus confirmed operator commands; each
//! handler returns the [`Action`]s the host should apply (show a tooltip,
//! repaint, report a rejected command). Inputs such as names and metadata are
//! collected by the host before calling in, so no handler waits on the
//! operator.
//!
//! After every successful mutation the selection is reconciled against the
//! new graph and every interactive element is restyled from scratch.
//!
//! ERROR HANDLING
//! ==============
//! Opening a plan fails only when the backing store cannot be read. Command
//! handlers never fail: a rejected command leaves state untouched and comes
//! back as [`Action::Failed`] carrying a stable error code.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::consts::OVERLAY_KEY;
use crate::error::{ErrorCode, ErrorReport};
use crate::extract::{ExtractionResult, extract_svg, hide_labels};
use crate::model::{AnnotationGraph, ElementId, EntityId, EntityKind};
use crate::overlay::OverlayToggle;
use crate::selection::{Point, Popup, SelectionController, Tooltip};
use crate::storage::KeyValueStore;
use crate::store::{AnnotationError, AnnotationStore, Removal, RoomDraft};
use crate::surface::{DrawingSurface, SvgSurface};

/// Actions returned from handlers for the host to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Show, move or (on `None`) hide the hover tooltip.
    Tooltip { tooltip: Option<Tooltip> },
    /// Show or (on `None`) hide the element detail popup.
    Popup { popup: Option<Popup> },
    #[serde(rename_all = "camelCase")]
    SelectionChanged { selected_element_ids: Vec<ElementId>, active_entity_ids: Vec<EntityId>, focused: Option<EntityId> },
    EntityCreated { id: EntityId, kind: EntityKind },
    EntityUpdated { id: EntityId },
    EntityDeleted { id: EntityId, kind: EntityKind },
    /// Show or hide the hit-area overlay.
    Overlay { visible: bool },
    /// Element styles changed; repaint.
    RenderNeeded { styled: usize },
    Failed { error: ErrorReport },
}

pub struct PlanSession<S> {
    config: EngineConfig,
    surface: SvgSurface,
    store: AnnotationStore<S>,
    selection: SelectionController,
    overlay: OverlayToggle,
    extraction: ExtractionResult,
}

impl<S: KeyValueStore> PlanSession<S> {
    /// Open `plan_id` from `storage` and load `svg` as its drawing.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Storage`] when the backing store cannot be read.
    pub fn open(storage: S, plan_id: impl Into<String>, svg: &str, config: EngineConfig) -> Result<Self, AnnotationError> {
        let store = AnnotationStore::open(storage, plan_id)?;
        let mut session = Self {
            surface: SvgSurface::parse("", &config.surface),
            overlay: OverlayToggle::new(config.surface.double_tap_ms),
            config,
            store,
            selection: SelectionController::new(),
            extraction: ExtractionResult::default(),
        };
        session.load_drawing(svg);
        Ok(session)
    }

    // --- Drawing ---

    /// Replace the drawing: re-extract metadata, fold new options into the
    /// plan's set, install hit targets and restyle. Selection is kept for
    /// ids that still resolve.
    pub fn load_drawing(&mut self, svg: &str) -> Vec<Action> {
        self.extraction = extract_svg(svg, &self.config.extract);
        self.store.sync_options(&self.extraction.metadata_options);
        self.surface = SvgSurface::parse(&hide_labels(svg), &self.config.surface);
        let elements = self.surface.interactive_elements();
        let installed = self.surface.install_hit_targets(&elements);
        info!(
            plan_id = %self.store.plan_id(),
            elements = elements.len(),
            hit_targets = installed,
            rooms = self.extraction.rooms.len(),
            "session: drawing loaded"
        );
        self.selection.reconcile(self.store.graph());
        vec![self.render()]
    }

    // --- Pointer input ---

    pub fn pointer_enter(&mut self, element_id: &str, at: Point) -> Vec<Action> {
        if !self.is_interactive(element_id) {
            return Vec::new();
        }
        self.selection.hover_enter(element_id, at, self.store.graph());
        vec![self.tooltip_action()]
    }

    pub fn pointer_move(&mut self, at: Point) -> Vec<Action> {
        if self.selection.tooltip().is_none() {
            return Vec::new();
        }
        self.selection.hover_move(at);
        vec![self.tooltip_action()]
    }

    pub fn pointer_leave(&mut self) -> Vec<Action> {
        if self.selection.tooltip().is_none() {
            return Vec::new();
        }
        self.selection.hover_leave();
        vec![Action::Tooltip { tooltip: None }]
    }

    /// Toggle an element in the ad-hoc selection.
    pub fn click_element(&mut self, element_id: &str, at: Point) -> Vec<Action> {
        if !self.is_interactive(element_id) {
            return Vec::new();
        }
        self.selection.click_element(element_id, at);
        vec![self.popup_action(), self.selection_action(), self.render()]
    }

    /// Toggle a saved group or room from the entity list.
    pub fn click_entity(&mut self, entity_id: &str) -> Vec<Action> {
        if !self.store.graph().contains(entity_id) {
            debug!(%entity_id, "session: click on unknown entity ignored");
            return Vec::new();
        }
        self.selection.click_entity(entity_id, self.store.graph());
        vec![self.selection_action(), self.render()]
    }

    pub fn close_popup(&mut self) -> Vec<Action> {
        self.selection.close_popup();
        vec![Action::Popup { popup: None }]
    }

    /// Drop the ad-hoc element selection.
    pub fn clear_selection(&mut self) -> Vec<Action> {
        self.selection.clear_selection();
        vec![self.popup_action(), self.selection_action(), self.render()]
    }

    // --- Keyboard input ---

    pub fn key_down(&mut self, key: &str) -> Vec<Action> {
        if key != OVERLAY_KEY {
            return Vec::new();
        }
        vec![Action::Overlay { visible: self.overlay.key_down() }]
    }

    /// Key released at `now_ms` (host clock, milliseconds).
    pub fn key_up(&mut self, key: &str, now_ms: u64) -> Vec<Action> {
        if key != OVERLAY_KEY {
            return Vec::new();
        }
        vec![Action::Overlay { visible: self.overlay.key_up(now_ms) }]
    }

    // --- Commands ---

    /// Group the currently selected elements under `name`, then clear the selection.
    pub fn create_group(&mut self, name: &str) -> Vec<Action> {
        let elements = self.selection.selected_element_ids().clone();
        match self.store.create_group(elements, name) {
            Ok(id) => {
                self.selection.clear_selection();
                let mut actions = self.committed(Action::EntityCreated { id, kind: EntityKind::Group });
                actions.push(Action::Popup { popup: None });
                actions
            }
            Err(e) => self.rejected("create_group", &e),
        }
    }

    /// Build a room from the active groups. `draft.child_group_ids` is
    /// replaced by the active groups, oldest first.
    pub fn create_room(&mut self, draft: RoomDraft) -> Vec<Action> {
        let draft = RoomDraft { child_group_ids: self.selection.active_group_ids(self.store.graph()), ..draft };
        match self.store.create_room(draft) {
            Ok(id) => {
                self.selection.clear_active();
                self.committed(Action::EntityCreated { id, kind: EntityKind::Room })
            }
            Err(e) => self.rejected("create_room", &e),
        }
    }

    /// Add one element to a group from the detail popup.
    pub fn add_to_entity(&mut self, element_id: &str, group_id: &str) -> Vec<Action> {
        match self.store.add_element(group_id, element_id) {
            Ok(true) => self.committed(Action::EntityUpdated { id: group_id.to_string() }),
            Ok(false) => Vec::new(),
            Err(e) => self.rejected("add_to_entity", &e),
        }
    }

    /// Remove one element from a group from the detail popup.
    pub fn remove_from_entity(&mut self, element_id: &str, group_id: &str) -> Vec<Action> {
        match self.store.remove_element(group_id, element_id) {
            Ok(Removal::Unchanged) => Vec::new(),
            Ok(Removal::Removed) => self.committed(Action::EntityUpdated { id: group_id.to_string() }),
            Ok(Removal::GroupDeleted) => {
                self.committed(Action::EntityDeleted { id: group_id.to_string(), kind: EntityKind::Group })
            }
            Err(e) => self.rejected("remove_from_entity", &e),
        }
    }

    /// Fold `source_id` into `target_id`; the target becomes the sole active group.
    pub fn merge_groups(&mut self, source_id: &str, target_id: &str) -> Vec<Action> {
        match self.store.merge_groups(source_id, target_id) {
            Ok(()) => {
                self.selection.focus_only(target_id, self.store.graph());
                let mut actions = self.committed(Action::EntityDeleted { id: source_id.to_string(), kind: EntityKind::Group });
                actions.insert(1, Action::EntityUpdated { id: target_id.to_string() });
                actions
            }
            Err(e) => self.rejected("merge_groups", &e),
        }
    }

    pub fn delete_entity(&mut self, entity_id: &str) -> Vec<Action> {
        match self.store.delete_entity(entity_id) {
            Ok(removed) => self.committed(Action::EntityDeleted { id: entity_id.to_string(), kind: removed.kind() }),
            Err(e) => self.rejected("delete_entity", &e),
        }
    }

    /// Assign or (on `None` / blank) clear one metadata key on a room.
    pub fn set_metadata_value(&mut self, room_id: &str, key: &str, value: Option<&str>) -> Vec<Action> {
        match self.store.set_metadata_value(room_id, key, value) {
            Ok(()) => self.committed(Action::EntityUpdated { id: room_id.to_string() }),
            Err(e) => self.rejected("set_metadata_value", &e),
        }
    }

    pub fn set_stone_type(&mut self, entity_id: &str, stone_type: Option<&str>) -> Vec<Action> {
        match self.store.set_stone_type(entity_id, stone_type) {
            Ok(()) => self.committed(Action::EntityUpdated { id: entity_id.to_string() }),
            Err(e) => self.rejected("set_stone_type", &e),
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn graph(&self) -> &AnnotationGraph {
        self.store.graph()
    }

    #[must_use]
    pub fn store(&self) -> &AnnotationStore<S> {
        &self.store
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    #[must_use]
    pub fn surface(&self) -> &SvgSurface {
        &self.surface
    }

    #[must_use]
    pub fn extraction(&self) -> &ExtractionResult {
        &self.extraction
    }

    #[must_use]
    pub fn overlay_visible(&self) -> bool {
        self.overlay.visible()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The drawing with labels hidden, current styles and hit targets applied.
    #[must_use]
    pub fn to_svg(&self) -> String {
        self.surface.to_svg()
    }

    pub fn into_storage(self) -> S {
        self.store.into_storage()
    }

    // --- Internals ---

    fn is_interactive(&self, element_id: &str) -> bool {
        let known = element_id != self.config.surface.model_space_id && self.surface.find_element(element_id).is_some();
        if !known {
            debug!(%element_id, "session: pointer event on non-interactive element ignored");
        }
        known
    }

    fn committed(&mut self, primary: Action) -> Vec<Action> {
        self.selection.reconcile(self.store.graph());
        vec![primary, self.selection_action(), self.render()]
    }

    fn rejected(&self, command: &str, err: &AnnotationError) -> Vec<Action> {
        warn!(plan_id = %self.store.plan_id(), command, code = err.error_code(), error = %err, "session: command rejected");
        vec![Action::Failed { error: ErrorReport::from_error(err) }]
    }

    fn render(&mut self) -> Action {
        let styled = self.selection.render(&mut self.surface, self.store.graph());
        Action::RenderNeeded { styled }
    }

    fn tooltip_action(&self) -> Action {
        Action::Tooltip { tooltip: self.selection.tooltip().cloned() }
    }

    fn popup_action(&self) -> Action {
        Action::Popup { popup: self.selection.popup().cloned() }
    }

    fn selection_action(&self) -> Action {
        Action::SelectionChanged {
            selected_element_ids: self.selection.selected_element_ids().iter().cloned().collect(),
            active_entity_ids: self.selection.active_entity_ids().iter().cloned().collect(),
            focused: self.selection.focused().map(str::to_string),
        }
    }
}
