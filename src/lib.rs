//! Floor-plan annotation engine.
//!
//! The engine sits between a rendered vector drawing and a presentation layer.
//! It extracts room metadata from the drawing's text labels, lets an operator
//! compose drawn elements into named groups and groups into rooms, keeps the
//! element highlighting consistent with that membership, and persists the
//! annotation graph per plan through an injected key-value port. Rendering,
//! file conversion and routing live outside this crate; the host wires pointer
//! and keyboard events into [`engine::PlanSession`] and applies the returned
//! [`engine::Action`]s.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Per-plan session wiring everything together |
//! | [`model`] | Labels, parsed rooms, groups/rooms and the annotation graph |
//! | [`extract`] | Label harvesting, key/value classification, proximity clustering |
//! | [`surface`] | Drawing surface port and the in-memory SVG implementation |
//! | [`overlay`] | Hit-area debug overlay toggle |
//! | [`storage`] | Key-value persistence port and key layout |
//! | [`migrate`] | Legacy and current persisted-format normalization |
//! | [`store`] | Annotation store: validated mutations + persist |
//! | [`selection`] | Hover/click/multi-select state and highlight priority |
//! | [`view`] | Read models for the presentation layer |
//! | [`config`] | Environment-driven tunables |
//! | [`consts`] | Shared defaults (thresholds, styles, key prefixes) |
//! | [`error`] | Stable error codes |

pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod extract;
pub mod migrate;
pub mod model;
pub mod overlay;
pub mod selection;
pub mod storage;
pub mod store;
pub mod surface;
pub mod view;
