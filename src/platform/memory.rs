//! In-memory host
//!
//! A plain element tree with rectangles, styles and visibility. Used by the
//! native binary to run explosions headless, and by tests. Visuals record what
//! happened to them in a shared `VisualLog`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{ComputedStyle, ElementHost, ElementId, ElementInfo, Pose, VisualResource};
use crate::Rect;
use crate::error::{ExplodeError, Result};
use crate::sim::BodyId;

#[derive(Debug, Clone)]
struct MemoryElement {
    info: ElementInfo,
    rect: Rect,
    style: ComputedStyle,
    children: Vec<ElementId>,
    parent: Option<ElementId>,
}

/// Everything visuals and hints did, for inspection
#[derive(Debug, Default)]
pub struct VisualLog {
    /// Last pose rendered per element
    pub poses: HashMap<ElementId, Pose>,
    pub render_count: usize,
    pub repairable: HashSet<ElementId>,
    pub repairing: HashSet<ElementId>,
    pub detached: Vec<ElementId>,
    pub hints: HashMap<BodyId, Rect>,
}

/// Visual stand-in produced by `MemoryHost::snapshot`
#[derive(Debug)]
pub struct MemoryVisual {
    source: ElementId,
    log: Rc<RefCell<VisualLog>>,
}

impl MemoryVisual {
    pub fn source(&self) -> ElementId {
        self.source
    }
}

impl VisualResource for MemoryVisual {
    fn render(&mut self, pose: &Pose) {
        let mut log = self.log.borrow_mut();
        log.poses.insert(self.source, *pose);
        log.render_count += 1;
    }

    fn set_repairable(&mut self, repairable: bool) {
        let mut log = self.log.borrow_mut();
        if repairable {
            log.repairable.insert(self.source);
        } else {
            log.repairable.remove(&self.source);
        }
    }

    fn begin_repair(&mut self) {
        self.log.borrow_mut().repairing.insert(self.source);
    }

    fn detach(self) {
        self.log.borrow_mut().detached.push(self.source);
    }
}

/// Element tree held in memory
#[derive(Debug)]
pub struct MemoryHost {
    viewport: Rect,
    root: Option<ElementId>,
    elements: RefCell<Vec<MemoryElement>>,
    hidden: RefCell<HashSet<ElementId>>,
    failing_snapshots: RefCell<HashSet<ElementId>>,
    log: Rc<RefCell<VisualLog>>,
}

impl MemoryHost {
    /// New host whose root covers the whole viewport
    pub fn new(viewport: Rect) -> Self {
        let mut host = Self {
            viewport,
            root: None,
            elements: RefCell::new(Vec::new()),
            hidden: RefCell::new(HashSet::new()),
            failing_snapshots: RefCell::new(HashSet::new()),
            log: Rc::new(RefCell::new(VisualLog::default())),
        };
        let root = host.push(None, ElementInfo::new("div"), viewport, ComputedStyle::default());
        host.root = Some(root);
        host
    }

    fn push(
        &self,
        parent: Option<ElementId>,
        info: ElementInfo,
        rect: Rect,
        style: ComputedStyle,
    ) -> ElementId {
        let mut elements = self.elements.borrow_mut();
        let id = ElementId(elements.len() as u32);
        elements.push(MemoryElement {
            info,
            rect,
            style,
            children: Vec::new(),
            parent,
        });
        if let Some(parent) = parent {
            elements[parent.0 as usize].children.push(id);
        }
        id
    }

    /// The explosion root
    pub fn root_id(&self) -> ElementId {
        self.root.unwrap_or(ElementId(0))
    }

    /// Add a plain element with an opaque background (becomes a body)
    pub fn add(&self, parent: ElementId, tag: &str, rect: Rect) -> ElementId {
        self.add_styled(
            parent,
            ElementInfo::new(tag),
            rect,
            ComputedStyle::new("none", "rgb(255, 255, 255)"),
        )
    }

    /// Add a transparent, backgroundless element (skipped once it has children)
    pub fn add_transparent(&self, parent: ElementId, tag: &str, rect: Rect) -> ElementId {
        self.add_styled(parent, ElementInfo::new(tag), rect, ComputedStyle::default())
    }

    pub fn add_styled(
        &self,
        parent: ElementId,
        info: ElementInfo,
        rect: Rect,
        style: ComputedStyle,
    ) -> ElementId {
        self.push(Some(parent), info, rect, style)
    }

    /// Make `snapshot` fail for this element
    pub fn fail_snapshot(&self, id: ElementId) {
        self.failing_snapshots.borrow_mut().insert(id);
    }

    pub fn is_visible(&self, id: ElementId) -> bool {
        !self.hidden.borrow().contains(&id)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements
            .borrow()
            .get(id.0 as usize)
            .and_then(|e| e.parent)
    }

    /// Shared record of visual activity
    pub fn visual_log(&self) -> Rc<RefCell<VisualLog>> {
        self.log.clone()
    }

    fn with_element<T>(&self, id: ElementId, f: impl FnOnce(&MemoryElement) -> T) -> Result<T> {
        self.elements
            .borrow()
            .get(id.0 as usize)
            .map(f)
            .ok_or(ExplodeError::Detached(id))
    }
}

impl ElementHost for MemoryHost {
    type Visual = MemoryVisual;

    fn root(&self) -> Option<ElementId> {
        self.root
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.with_element(id, |e| e.children.clone())
            .unwrap_or_default()
    }

    fn info(&self, id: ElementId) -> Result<ElementInfo> {
        self.with_element(id, |e| e.info.clone())
    }

    fn bounding_box(&self, id: ElementId) -> Result<Rect> {
        let rect = self.with_element(id, |e| e.rect)?;
        if !rect.is_finite() {
            return Err(ExplodeError::Geometry {
                element: id,
                reason: "non-finite rectangle".to_string(),
            });
        }
        Ok(rect)
    }

    fn computed_style(&self, id: ElementId) -> Result<ComputedStyle> {
        self.with_element(id, |e| e.style.clone())
    }

    fn snapshot(&self, id: ElementId, rect: Rect) -> Result<MemoryVisual> {
        if self.failing_snapshots.borrow().contains(&id) {
            return Err(ExplodeError::Snapshot {
                element: id,
                reason: "clone rejected".to_string(),
            });
        }
        self.with_element(id, |_| ())?;
        let mut visual = MemoryVisual {
            source: id,
            log: self.log.clone(),
        };
        visual.render(&Pose {
            top_left: rect.min,
            size: rect.size,
            angle: 0.0,
        });
        Ok(visual)
    }

    fn set_visible(&self, id: ElementId, visible: bool) {
        let mut hidden = self.hidden.borrow_mut();
        if visible {
            hidden.remove(&id);
        } else {
            hidden.insert(id);
        }
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn show_repair_hint(&self, body: BodyId, rect: Rect) {
        self.log.borrow_mut().hints.insert(body, rect);
    }

    fn hide_repair_hint(&self, body: BodyId) {
        self.log.borrow_mut().hints.remove(&body);
    }
}
