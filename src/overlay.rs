//! Hit-area debug overlay toggle.
//!
//! Holding the modifier key shows the enlarged hit targets; releasing hides
//! them again. Two releases within the double-tap window latch the overlay on
//! until the next double tap. The host feeds key transitions with a
//! millisecond timestamp and shows or hides the overlay per [`OverlayToggle::visible`].

#[cfg(test)]
#[path = "overlay_test.rs"]
mod overlay_test;

use tracing::debug;

use crate::consts::DOUBLE_TAP_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayToggle {
    double_tap_ms: u64,
    held: bool,
    latched: bool,
    last_release_ms: Option<u64>,
}

impl Default for OverlayToggle {
    fn default() -> Self {
        Self::new(DOUBLE_TAP_MS)
    }
}

impl OverlayToggle {
    #[must_use]
    pub fn new(double_tap_ms: u64) -> Self {
        Self { double_tap_ms, held: false, latched: false, last_release_ms: None }
    }

    /// Modifier pressed. Returns the new visibility.
    pub fn key_down(&mut self) -> bool {
        self.held = true;
        self.visible()
    }

    /// Modifier released at `now_ms`. Returns the new visibility.
    pub fn key_up(&mut self, now_ms: u64) -> bool {
        self.held = false;
        if let Some(last) = self.last_release_ms {
            if now_ms.saturating_sub(last) < self.double_tap_ms {
                self.latched = !self.latched;
                debug!(latched = self.latched, "hit-area overlay latch toggled");
            }
        }
        self.last_release_ms = Some(now_ms);
        self.visible()
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.held || self.latched
    }

    #[must_use]
    pub fn latched(&self) -> bool {
        self.latched
    }
}
