//! Drawing surface port and the in-memory SVG implementation.
//!
//! DESIGN
//! ======
//! The engine never holds a live handle into a rendered drawing. It talks to a
//! [`DrawingSurface`] by element id: look an element up, restyle it, list the
//! interactive elements, and lay enlarged hit targets behind thin ones. Every
//! operation on an unknown id is a no-op.
//!
//! [`SvgSurface`] indexes SVG markup once: every `<g id=…>` is an element, and
//! the `line`/`path`/`polyline`/`polygon` primitives inside it are what gets
//! stroked. Styles and hit targets are kept beside the markup and written out
//! by [`SvgSurface::to_svg`]. Hit targets are marked with `data-hit-area-for`,
//! so re-indexing rendered output does not enlarge the same element twice.

#[cfg(test)]
#[path = "surface_test.rs"]
mod surface_test;

use std::collections::{BTreeSet, HashMap};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use crate::config::SurfaceConfig;
use crate::consts::{
    ACTIVE_COLOR, ACTIVE_WIDTH, DEFAULT_COLOR, DEFAULT_WIDTH, GROUPED_COLOR, GROUPED_WIDTH, SELECTED_COLOR,
    SELECTED_WIDTH,
};
use crate::extract::attribute;
use crate::model::ElementId;

/// Attribute linking a synthesized hit target to the element it enlarges.
const HIT_AREA_ATTR: &str = "data-hit-area-for";

// =============================================================================
// TYPES
// =============================================================================

/// Stroke applied to an element's primitives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub color: &'static str,
    /// Stroke width in pixels.
    pub width: f64,
}

impl Style {
    pub const DEFAULT: Self = Self { color: DEFAULT_COLOR, width: DEFAULT_WIDTH };
    pub const GROUPED: Self = Self { color: GROUPED_COLOR, width: GROUPED_WIDTH };
    pub const ACTIVE: Self = Self { color: ACTIVE_COLOR, width: ACTIVE_WIDTH };
    pub const SELECTED: Self = Self { color: SELECTED_COLOR, width: SELECTED_WIDTH };

    fn css(self) -> String {
        format!("stroke:{};stroke-width:{}px", self.color, self.width)
    }
}

/// Snapshot of one addressable element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    /// Number of stylable primitives inside the element.
    pub primitives: usize,
    /// Last style applied, if any.
    pub style: Option<Style>,
    pub has_hit_target: bool,
}

/// Port between the engine and a rendered drawing.
pub trait DrawingSurface {
    /// Look up an element by id.
    fn find_element(&self, id: &str) -> Option<Element>;

    /// Restyle an element immediately. Unknown ids are ignored.
    fn style(&mut self, id: &str, style: Style);

    /// Ids of all hit-testable elements, background container excluded.
    fn interactive_elements(&self) -> Vec<ElementId>;

    /// Lay a transparent, wider duplicate behind each listed element that does
    /// not have one yet. Returns how many were added.
    fn install_hit_targets(&mut self, elements: &[ElementId]) -> usize;
}

// =============================================================================
// SVG SURFACE
// =============================================================================

#[derive(Debug, Clone)]
struct Slot {
    id: ElementId,
    primitives: usize,
    style: Option<Style>,
    has_hit_target: bool,
    /// A clone for this element already sits in the markup.
    in_markup: bool,
}

/// Nesting scope while walking the markup.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Element(usize),
    Plain,
    HitArea,
}

/// In-memory drawing surface over SVG markup.
#[derive(Debug, Clone)]
pub struct SvgSurface {
    markup: String,
    config: SurfaceConfig,
    slots: Vec<Slot>,
    index: HashMap<ElementId, usize>,
}

impl SvgSurface {
    /// Index `markup`. Malformed markup keeps the elements read before the fault.
    #[must_use]
    pub fn parse(markup: &str, config: &SurfaceConfig) -> Self {
        let mut surface = Self {
            markup: markup.to_string(),
            config: config.clone(),
            slots: Vec::new(),
            index: HashMap::new(),
        };
        surface.index_markup();
        surface
    }

    fn index_markup(&mut self) {
        let mut reader = Reader::from_str(&self.markup);
        let mut scopes: Vec<Scope> = Vec::new();
        let mut enlarged: BTreeSet<String> = BTreeSet::new();
        let mut slots: Vec<Slot> = Vec::new();
        let mut index: HashMap<ElementId, usize> = HashMap::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"g" {
                        scopes.push(open_scope(&e, &mut slots, &mut index, &mut enlarged));
                    } else if is_primitive(&e) {
                        count_primitive(&scopes, &mut slots);
                    }
                }
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"g" {
                        open_scope(&e, &mut slots, &mut index, &mut enlarged);
                    } else if is_primitive(&e) {
                        count_primitive(&scopes, &mut slots);
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"g" {
                        scopes.pop();
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    warn!(position = reader.buffer_position(), error = %e, indexed = slots.len(), "drawing markup unparseable; element index truncated");
                    break;
                }
                Ok(_) => {}
            }
        }

        for id in &enlarged {
            if let Some(&i) = index.get(id) {
                slots[i].has_hit_target = true;
                slots[i].in_markup = true;
            }
        }
        self.slots = slots;
        self.index = index;
    }

    /// The markup as loaded.
    #[must_use]
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Serialize the drawing with current styles and hit targets applied.
    /// Falls back to the original markup if it cannot be re-read.
    #[must_use]
    pub fn to_svg(&self) -> String {
        match self.render() {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "could not render styled drawing; returning original markup");
                self.markup.clone()
            }
        }
    }

    fn slot(&self, id: &str) -> Option<&Slot> {
        self.index.get(id).map(|&i| &self.slots[i])
    }

    fn render(&self) -> Result<String, String> {
        let mut reader = Reader::from_str(&self.markup);
        let mut events: Vec<Event<'static>> = Vec::new();
        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Eof => break,
                event => events.push(event.into_owned()),
            }
        }

        let mut writer = Writer::new(Vec::new());
        let mut styles: Vec<Option<Style>> = Vec::new();
        for (i, event) in events.iter().enumerate() {
            let out = match event {
                Event::Start(e) if e.local_name().as_ref() == b"g" => {
                    if let Some(slot) = self.enlarged_slot(e) {
                        let end = matching_end(&events, i);
                        self.write_hit_target(&mut writer, slot, &events[i..end])?;
                    }
                    let style = if attribute(e, HIT_AREA_ATTR.as_bytes()).is_some() {
                        None
                    } else {
                        self.element_style(e).or(styles.last().copied().flatten())
                    };
                    styles.push(style);
                    Event::Start(e.clone())
                }
                Event::Empty(e) if e.local_name().as_ref() == b"g" => {
                    if let Some(slot) = self.enlarged_slot(e) {
                        self.write_hit_target(&mut writer, slot, std::slice::from_ref(event))?;
                    }
                    Event::Empty(e.clone())
                }
                Event::End(e) if e.local_name().as_ref() == b"g" => {
                    styles.pop();
                    Event::End(e.clone())
                }
                Event::Start(e) if is_primitive(e) => match styles.last().copied().flatten() {
                    Some(style) => Event::Start(with_style(e, style)),
                    None => Event::Start(e.clone()),
                },
                Event::Empty(e) if is_primitive(e) => match styles.last().copied().flatten() {
                    Some(style) => Event::Empty(with_style(e, style)),
                    None => Event::Empty(e.clone()),
                },
                other => other.clone(),
            };
            writer.write_event(out).map_err(|e| e.to_string())?;
        }

        String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
    }

    fn element_style(&self, e: &BytesStart<'_>) -> Option<Style> {
        attribute(e, b"id").and_then(|id| self.slot(&id)).and_then(|slot| slot.style)
    }

    /// Slot for a `<g>` whose hit target was installed in memory but is not
    /// already present in the markup.
    fn enlarged_slot(&self, e: &BytesStart<'_>) -> Option<&Slot> {
        let id = attribute(e, b"id")?;
        let slot = self.slot(&id)?;
        (slot.has_hit_target && !slot.in_markup).then_some(slot)
    }

    /// Write a transparent clone of `subtree` (a `<g>` and its content).
    fn write_hit_target(&self, writer: &mut Writer<Vec<u8>>, slot: &Slot, subtree: &[Event<'static>]) -> Result<(), String> {
        let width = self.config.hit_target_width.to_string();
        for (i, event) in subtree.iter().enumerate() {
            let out = match event {
                Event::Start(e) if e.local_name().as_ref() == b"g" => Event::Start(hit_group(e, &slot.id, i == 0)),
                Event::Empty(e) if e.local_name().as_ref() == b"g" => Event::Empty(hit_group(e, &slot.id, i == 0)),
                Event::Start(e) if is_primitive(e) => Event::Start(transparent(e, &width)),
                Event::Empty(e) if is_primitive(e) => Event::Empty(transparent(e, &width)),
                other => other.clone(),
            };
            writer.write_event(out).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl DrawingSurface for SvgSurface {
    fn find_element(&self, id: &str) -> Option<Element> {
        self.slot(id).map(|slot| Element {
            id: slot.id.clone(),
            primitives: slot.primitives,
            style: slot.style,
            has_hit_target: slot.has_hit_target,
        })
    }

    fn style(&mut self, id: &str, style: Style) {
        match self.index.get(id) {
            Some(&i) => self.slots[i].style = Some(style),
            None => debug!(element_id = id, "style skipped; element not in drawing"),
        }
    }

    fn interactive_elements(&self) -> Vec<ElementId> {
        self.slots
            .iter()
            .filter(|slot| slot.id != self.config.model_space_id)
            .map(|slot| slot.id.clone())
            .collect()
    }

    fn install_hit_targets(&mut self, elements: &[ElementId]) -> usize {
        let mut added = 0;
        for id in elements {
            if *id == self.config.model_space_id {
                continue;
            }
            if let Some(&i) = self.index.get(id.as_str()) {
                if !self.slots[i].has_hit_target {
                    self.slots[i].has_hit_target = true;
                    added += 1;
                }
            }
        }
        if added > 0 {
            debug!(added, "hit targets installed");
        }
        added
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn is_primitive(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"line" | b"path" | b"polyline" | b"polygon")
}

fn open_scope(
    e: &BytesStart<'_>,
    slots: &mut Vec<Slot>,
    index: &mut HashMap<ElementId, usize>,
    enlarged: &mut BTreeSet<String>,
) -> Scope {
    if let Some(target) = attribute(e, HIT_AREA_ATTR.as_bytes()) {
        enlarged.insert(target);
        return Scope::HitArea;
    }
    match attribute(e, b"id").filter(|id| !id.is_empty()) {
        Some(id) if !index.contains_key(&id) => {
            let i = slots.len();
            index.insert(id.clone(), i);
            slots.push(Slot { id, primitives: 0, style: None, has_hit_target: false, in_markup: false });
            Scope::Element(i)
        }
        _ => Scope::Plain,
    }
}

fn count_primitive(scopes: &[Scope], slots: &mut [Slot]) {
    match scopes.iter().rev().find(|s| !matches!(s, Scope::Plain)) {
        Some(Scope::Element(i)) => slots[*i].primitives += 1,
        Some(Scope::HitArea | Scope::Plain) | None => {}
    }
}

/// Index one past the `End` closing the `Start` at `start`.
fn matching_end(events: &[Event<'static>], start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, event) in events[start..].iter().enumerate() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return start + offset + 1;
                }
            }
            _ => {}
        }
    }
    events.len()
}

/// Copy of `e` without the `skip` attributes, so they can be replaced.
fn rebuilt(e: &BytesStart<'_>, skip: &[&str]) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes().flatten() {
        if !skip.iter().any(|key| attr.key.as_ref() == key.as_bytes()) {
            out.push_attribute(attr);
        }
    }
    out
}

fn with_style(e: &BytesStart<'_>, style: Style) -> BytesStart<'static> {
    let existing = attribute(e, b"style").unwrap_or_default();
    let existing = existing.trim().trim_end_matches(';');
    let css = if existing.is_empty() { style.css() } else { format!("{existing};{}", style.css()) };
    let mut out = rebuilt(e, &["style"]);
    out.push_attribute(("style", css.as_str()));
    out
}

fn hit_group(e: &BytesStart<'_>, target: &str, outermost: bool) -> BytesStart<'static> {
    let mut out = rebuilt(e, &["id", "class", "style"]);
    if outermost {
        out.push_attribute(("class", "hit-area"));
        out.push_attribute((HIT_AREA_ATTR, target));
        out.push_attribute(("style", "pointer-events:all;cursor:pointer"));
    }
    out
}

fn transparent(e: &BytesStart<'_>, width: &str) -> BytesStart<'static> {
    let mut out = rebuilt(e, &["id", "stroke", "fill", "stroke-width", "style"]);
    out.push_attribute(("stroke", "transparent"));
    out.push_attribute(("fill", "transparent"));
    out.push_attribute(("stroke-width", width));
    out.push_attribute(("style", "vector-effect:non-scaling-stroke"));
    out
}
