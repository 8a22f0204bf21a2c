//! Platform abstraction layer
//!
//! The simulation never touches a real document. Hosts supply:
//! - An element tree with geometry and computed-style queries (`ElementHost`)
//! - A clone-and-style-copy primitive producing a detached visual (`VisualResource`)
//! - A frame clock (`scheduler::FrameScheduler`)
//! - Pointer samples with page coordinates and timestamps (`PointerSample`)

pub mod memory;
pub mod scheduler;
pub mod text;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use memory::{MemoryHost, MemoryVisual, VisualLog};
pub use scheduler::{FrameCallback, FrameScheduler, ManualScheduler};

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::Rect;
use crate::error::Result;
use crate::sim::BodyId;

/// Non-owning key for a source element in the host tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an element, used for exclusion rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    /// Lowercase tag name ("div", "span", ...)
    pub tag: String,
    /// Value of the id attribute, if any
    pub dom_id: Option<String>,
}

impl ElementInfo {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            dom_id: None,
        }
    }

    pub fn with_dom_id(mut self, dom_id: &str) -> Self {
        self.dom_id = Some(dom_id.to_string());
        self
    }
}

/// The slice of computed style the explosion cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedStyle {
    /// CSS `background-image` ("none" when unset)
    pub background_image: String,
    /// CSS `background-color`
    pub background_color: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            background_image: "none".to_string(),
            background_color: "rgba(0, 0, 0, 0)".to_string(),
        }
    }
}

impl ComputedStyle {
    pub fn new(background_image: &str, background_color: &str) -> Self {
        Self {
            background_image: background_image.to_string(),
            background_color: background_color.to_string(),
        }
    }

    /// No background image at all
    pub fn has_no_image(&self) -> bool {
        let image = self.background_image.trim();
        image.is_empty() || image.eq_ignore_ascii_case("none")
    }

    /// Background color is fully transparent
    pub fn has_transparent_color(&self) -> bool {
        let color: String = self
            .background_color
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        color.contains("transparent") || color.contains("rgba(0,0,0,0)")
    }

    /// Draws nothing of its own
    pub fn is_backgroundless(&self) -> bool {
        self.has_no_image() && self.has_transparent_color()
    }
}

/// Where a visual should be drawn this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Top-left in page coordinates (before rotation about the center)
    pub top_left: Vec2,
    pub size: Vec2,
    /// Rotation about the center (radians, clockwise on screen)
    pub angle: f32,
}

/// One pointer event: page position plus a millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub pos: Vec2,
    pub t_ms: f64,
}

impl PointerSample {
    pub fn new(x: f32, y: f32, t_ms: f64) -> Self {
        Self {
            pos: Vec2::new(x, y),
            t_ms,
        }
    }
}

/// A detached stand-in for a source element, owned by exactly one body
pub trait VisualResource {
    /// Move/rotate the visual to match the body
    fn render(&mut self, pose: &Pose);

    /// Flag the visual as draggable-home
    fn set_repairable(&mut self, repairable: bool);

    /// Start the repair completion animation
    fn begin_repair(&mut self);

    /// Remove the visual from the page
    fn detach(self);
}

/// Element tree and page services the orchestrator needs
pub trait ElementHost {
    type Visual: VisualResource;

    /// Container whose descendants explode
    fn root(&self) -> Option<ElementId>;

    /// Direct element children, in document order
    fn children(&self, id: ElementId) -> Vec<ElementId>;

    fn info(&self, id: ElementId) -> Result<ElementInfo>;

    /// Bounding box in page coordinates
    fn bounding_box(&self, id: ElementId) -> Result<Rect>;

    fn computed_style(&self, id: ElementId) -> Result<ComputedStyle>;

    /// Clone the element shallowly, copy its look, and place it at `rect`
    fn snapshot(&self, id: ElementId, rect: Rect) -> Result<Self::Visual>;

    /// Hide or restore the original element
    fn set_visible(&self, id: ElementId, visible: bool);

    /// Collision bounds in page coordinates
    fn viewport(&self) -> Rect;

    /// Rewrite text under `root` into one element per word. Returns how many
    /// word elements were made.
    fn split_text(&self, _root: ElementId) -> usize {
        0
    }

    /// Show a ghost outline where a body's element belongs
    fn show_repair_hint(&self, _body: BodyId, _rect: Rect) {}

    fn hide_repair_hint(&self, _body: BodyId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backgroundless_detection() {
        assert!(ComputedStyle::default().is_backgroundless());
        assert!(ComputedStyle::new("none", "transparent").is_backgroundless());
        assert!(ComputedStyle::new("", "RGBA(0, 0, 0, 0)").is_backgroundless());
        assert!(!ComputedStyle::new("url(a.png)", "transparent").is_backgroundless());
        assert!(!ComputedStyle::new("none", "rgb(255, 0, 0)").is_backgroundless());
        assert!(!ComputedStyle::new("none", "rgba(0, 0, 0, 0.5)").is_backgroundless());
    }

    #[test]
    fn test_element_info_lowercases_tag() {
        let info = ElementInfo::new("DIV").with_dom_id("fw");
        assert_eq!(info.tag, "div");
        assert_eq!(info.dom_id.as_deref(), Some("fw"));
    }
}
