//! Browser host
//!
//! Elements are keyed by a `data-explode-id` attribute so the simulation only
//! ever holds plain ids. Visuals are absolutely positioned shallow clones
//! appended to `<body>`; frames come from `requestAnimationFrame`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlElement, Node, Performance, PointerEvent, Window};

use super::text::{TextRun, UNSPLIT_TAGS, is_splittable, split_words};
use super::{ComputedStyle, ElementHost, ElementId, ElementInfo, FrameCallback, Pose, PointerSample, VisualResource};
use crate::Rect;
use crate::error::{ExplodeError, Result};
use crate::explosion::{Explosion, PointerRouter, SharedSession};
use crate::settings::ExplosionSettings;
use crate::sim::BodyId;

/// Container whose descendants explode
pub const ROOT_SELECTOR: &str = ".wrap";

const ID_ATTR: &str = "data-explode-id";
const SOURCE_ATTR: &str = "data-explode-source";
const CLONE_CLASS: &str = "phy-clone";
const WORD_CLASS: &str = "fw-word";
const HINT_CLASS: &str = "repair-hint";

/// Computed properties copied onto clones so they look like their source
const COPIED_STYLES: [&str; 9] = [
    "display",
    "visibility",
    "background-color",
    "background",
    "color",
    "font",
    "border",
    "border-radius",
    "box-shadow",
];

fn js_reason(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}

fn set_styles(el: &HtmlElement, styles: &[(&str, &str)]) {
    let style = el.style();
    for (name, value) in styles {
        let _ = style.set_property(name, value);
    }
}

/// A detached clone standing in for its source element
pub struct DomVisual {
    el: HtmlElement,
}

impl VisualResource for DomVisual {
    fn render(&mut self, pose: &Pose) {
        set_styles(
            &self.el,
            &[
                ("left", &format!("{}px", pose.top_left.x)),
                ("top", &format!("{}px", pose.top_left.y)),
                ("transform", &format!("rotate({}rad)", pose.angle)),
            ],
        );
    }

    fn set_repairable(&mut self, repairable: bool) {
        let _ = self
            .el
            .class_list()
            .toggle_with_force("repairable", repairable);
    }

    fn begin_repair(&mut self) {
        let _ = self.el.class_list().add_1("repair-ripple");
        // "repaired" lands a frame later so the transition runs
        let el = self.el.clone();
        let closure = Closure::once(move |_time: f64| {
            let _ = el.class_list().add_1("repaired");
        });
        if let Some(window) = web_sys::window() {
            let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        }
        closure.forget();
    }

    fn detach(self) {
        self.el.remove();
    }
}

/// The live document as an element host
pub struct DomHost {
    window: Window,
    document: Document,
    root_selector: String,
    excluded_ids: Vec<String>,
    registry: RefCell<Vec<Element>>,
    hints: RefCell<HashMap<BodyId, Element>>,
}

impl DomHost {
    /// Host for the current page; `None` outside a browser window
    pub fn new(root_selector: &str, settings: &ExplosionSettings) -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self {
            window,
            document,
            root_selector: root_selector.to_string(),
            excluded_ids: settings.excluded_ids.clone(),
            registry: RefCell::new(Vec::new()),
            hints: RefCell::new(HashMap::new()),
        })
    }

    /// Stable id for an element, tagging it on first sight
    fn register(&self, el: &Element) -> ElementId {
        let mut registry = self.registry.borrow_mut();
        if let Some(existing) = el
            .get_attribute(ID_ATTR)
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&n| registry.get(n as usize).is_some_and(|known| known == el))
        {
            return ElementId(existing);
        }
        let id = ElementId(registry.len() as u32);
        registry.push(el.clone());
        let _ = el.set_attribute(ID_ATTR, &id.0.to_string());
        id
    }

    fn element(&self, id: ElementId) -> Result<Element> {
        self.registry
            .borrow()
            .get(id.0 as usize)
            .filter(|el| el.is_connected())
            .cloned()
            .ok_or(ExplodeError::Detached(id))
    }

    fn scroll(&self) -> (f32, f32) {
        (
            self.window.scroll_x().unwrap_or(0.0) as f32,
            self.window.scroll_y().unwrap_or(0.0) as f32,
        )
    }

    fn split_under(&self, node: &Node) -> usize {
        let kids = node.child_nodes();
        let nodes: Vec<Node> = (0..kids.length()).filter_map(|i| kids.get(i)).collect();
        let mut made = 0;
        for child in nodes {
            match child.node_type() {
                Node::TEXT_NODE => made += self.split_text_node(&child),
                Node::ELEMENT_NODE => {
                    if let Some(el) = child.dyn_ref::<Element>() {
                        let tag = el.tag_name().to_ascii_lowercase();
                        if UNSPLIT_TAGS.contains(&tag.as_str())
                            || self.excluded_ids.iter().any(|x| *x == el.id())
                            || el.class_list().contains(WORD_CLASS)
                        {
                            continue;
                        }
                    }
                    made += self.split_under(&child);
                }
                _ => {}
            }
        }
        made
    }

    fn split_text_node(&self, text: &Node) -> usize {
        let Some(content) = text.node_value() else {
            return 0;
        };
        if !is_splittable(&content) {
            return 0;
        }
        let Some(parent) = text.parent_node() else {
            return 0;
        };

        let frag = self.document.create_document_fragment();
        let mut made = 0;
        for run in split_words(&content) {
            match run {
                TextRun::Space(space) => {
                    let _ = frag.append_child(&self.document.create_text_node(space));
                }
                TextRun::Word(word) => {
                    let Ok(span) = self.document.create_element("span") else {
                        continue;
                    };
                    span.set_class_name(WORD_CLASS);
                    if let Some(html) = span.dyn_ref::<HtmlElement>() {
                        set_styles(html, &[("display", "inline")]);
                    }
                    let _ = span.append_child(&self.document.create_text_node(word));
                    let _ = frag.append_child(&span);
                    made += 1;
                }
            }
        }

        match parent.replace_child(&frag, text) {
            Ok(_) => made,
            Err(e) => {
                log::warn!("could not split text node: {}", js_reason(&e));
                0
            }
        }
    }

    /// Shallow copies of the source's direct children, links disarmed
    fn copy_children(&self, source: &Element, clone: &HtmlElement) {
        let kids = source.child_nodes();
        for i in 0..kids.length() {
            let Some(child) = kids.get(i) else {
                continue;
            };
            match child.node_type() {
                Node::TEXT_NODE => {
                    let text = child.node_value().unwrap_or_default();
                    let _ = clone.append_child(&self.document.create_text_node(&text));
                }
                Node::ELEMENT_NODE => {
                    let Ok(shallow) = child.clone_node() else {
                        continue;
                    };
                    if let Some(el) = shallow.dyn_ref::<Element>() {
                        let _ = el.remove_attribute("id");
                        let _ = el.remove_attribute(ID_ATTR);
                        if el.tag_name().eq_ignore_ascii_case("a") {
                            let _ = el.remove_attribute("href");
                            let _ = el.remove_attribute("target");
                        }
                    }
                    let _ = clone.append_child(&shallow);
                }
                _ => {}
            }
        }
    }
}

impl ElementHost for DomHost {
    type Visual = DomVisual;

    fn root(&self) -> Option<ElementId> {
        let root = self.document.query_selector(&self.root_selector).ok()??;
        Some(self.register(&root))
    }

    fn children(&self, id: ElementId) -> Vec<ElementId> {
        let Ok(el) = self.element(id) else {
            return Vec::new();
        };
        let kids = el.children();
        (0..kids.length())
            .filter_map(|i| kids.item(i))
            .map(|child| self.register(&child))
            .collect()
    }

    fn info(&self, id: ElementId) -> Result<ElementInfo> {
        let el = self.element(id)?;
        let info = ElementInfo::new(&el.tag_name());
        let dom_id = el.id();
        Ok(if dom_id.is_empty() {
            info
        } else {
            info.with_dom_id(&dom_id)
        })
    }

    fn bounding_box(&self, id: ElementId) -> Result<Rect> {
        let r = self.element(id)?.get_bounding_client_rect();
        let (sx, sy) = self.scroll();
        let rect = Rect::new(
            r.left() as f32 + sx,
            r.top() as f32 + sy,
            r.width() as f32,
            r.height() as f32,
        );
        if !rect.is_finite() {
            return Err(ExplodeError::Geometry {
                element: id,
                reason: format!("non-finite client rect {:?}", rect),
            });
        }
        Ok(rect)
    }

    fn computed_style(&self, id: ElementId) -> Result<ComputedStyle> {
        let el = self.element(id)?;
        let style = self
            .window
            .get_computed_style(&el)
            .map_err(|e| ExplodeError::Style {
                element: id,
                reason: js_reason(&e),
            })?
            .ok_or_else(|| ExplodeError::Style {
                element: id,
                reason: "no computed style".to_string(),
            })?;
        Ok(ComputedStyle::new(
            &style.get_property_value("background-image").unwrap_or_default(),
            &style.get_property_value("background-color").unwrap_or_default(),
        ))
    }

    fn snapshot(&self, id: ElementId, rect: Rect) -> Result<DomVisual> {
        let el = self.element(id)?;
        let fail = |reason: String| ExplodeError::Snapshot { element: id, reason };

        let clone = el
            .clone_node()
            .map_err(|e| fail(js_reason(&e)))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| fail("not an HTML element".to_string()))?;
        clone.set_class_name(&el.class_name());
        let _ = clone.remove_attribute("id");
        let _ = clone.remove_attribute(ID_ATTR);
        let _ = clone.set_attribute(SOURCE_ATTR, &id.0.to_string());
        let _ = clone.class_list().add_1(CLONE_CLASS);
        self.copy_children(&el, &clone);

        if let Ok(Some(computed)) = self.window.get_computed_style(&el) {
            for prop in COPIED_STYLES {
                if let Ok(value) = computed.get_property_value(prop) {
                    if !value.is_empty() {
                        let _ = clone.style().set_property(prop, &value);
                    }
                }
            }
        }
        set_styles(
            &clone,
            &[
                ("position", "absolute"),
                ("width", &format!("{}px", rect.width())),
                ("height", &format!("{}px", rect.height())),
                ("box-sizing", "border-box"),
                ("margin", "0"),
                ("overflow", "hidden"),
                ("z-index", "9999"),
                ("pointer-events", "auto"),
                ("cursor", "grab"),
                ("will-change", "left, top, transform"),
                ("transform-origin", "center center"),
                ("visibility", "visible"),
            ],
        );

        let body = self
            .document
            .body()
            .ok_or_else(|| fail("document has no body".to_string()))?;
        body.append_child(&clone).map_err(|e| fail(js_reason(&e)))?;

        let mut visual = DomVisual { el: clone };
        visual.render(&Pose {
            top_left: rect.min,
            size: rect.size,
            angle: 0.0,
        });
        Ok(visual)
    }

    fn set_visible(&self, id: ElementId, visible: bool) {
        if let Ok(el) = self.element(id) {
            if let Some(html) = el.dyn_ref::<HtmlElement>() {
                set_styles(html, &[("visibility", if visible { "visible" } else { "hidden" })]);
            }
        }
    }

    fn viewport(&self) -> Rect {
        let (sx, sy) = self.scroll();
        let w = self.window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let h = self.window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        Rect::new(sx, sy, w as f32, h as f32)
    }

    fn split_text(&self, root: ElementId) -> usize {
        match self.element(root) {
            Ok(el) => self.split_under(&el),
            Err(_) => 0,
        }
    }

    fn show_repair_hint(&self, body: BodyId, rect: Rect) {
        self.hide_repair_hint(body);
        let Ok(hint) = self.document.create_element("div") else {
            return;
        };
        hint.set_class_name(HINT_CLASS);
        if let Some(html) = hint.dyn_ref::<HtmlElement>() {
            set_styles(
                html,
                &[
                    ("position", "absolute"),
                    ("left", &format!("{}px", rect.min.x)),
                    ("top", &format!("{}px", rect.min.y)),
                    ("width", &format!("{}px", rect.width())),
                    ("height", &format!("{}px", rect.height())),
                    ("pointer-events", "none"),
                    ("z-index", "9998"),
                ],
            );
        }
        if let Some(page) = self.document.body() {
            let _ = page.append_child(&hint);
            self.hints.borrow_mut().insert(body, hint);
        }
    }

    fn hide_repair_hint(&self, body: BodyId) {
        if let Some(hint) = self.hints.borrow_mut().remove(&body) {
            hint.remove();
        }
    }
}

/// `requestAnimationFrame`-backed scheduler
pub struct RafScheduler {
    window: Window,
    performance: Option<Performance>,
}

impl RafScheduler {
    pub fn new(window: Window) -> Self {
        let performance = window.performance();
        Self { window, performance }
    }
}

impl super::FrameScheduler for RafScheduler {
    fn now(&self) -> f64 {
        self.performance
            .as_ref()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn post(&self, callback: FrameCallback) {
        let closure = Closure::once(move |time: f64| callback(time));
        let _ = self
            .window
            .request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }
}

/// Source element of the clone under an event's target
fn event_source(event: &web_sys::Event) -> Option<ElementId> {
    let target = event.target()?.dyn_into::<Element>().ok()?;
    let clone = target.closest(&format!(".{}", CLONE_CLASS)).ok()??;
    let source = clone.get_attribute(SOURCE_ATTR)?.parse::<u32>().ok()?;
    Some(ElementId(source))
}

fn page_now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

fn sample(event: &PointerEvent) -> PointerSample {
    PointerSample::new(event.page_x() as f32, event.page_y() as f32, page_now())
}

thread_local! {
    static ACTIVE: RefCell<Option<Explosion<DomHost>>> = const { RefCell::new(None) };
    static ROUTER: PointerRouter<DomHost> = PointerRouter::new();
    static LISTENING: Cell<bool> = const { Cell::new(false) };
}

/// Route document pointer events to `session`.
///
/// The document listeners are added on first use and stay for the page's
/// lifetime; later sessions only replace the router's target.
pub fn wire_pointer(session: SharedSession<DomVisual>, host: Rc<DomHost>) {
    let document = host.document.clone();
    ROUTER.with(|router| router.attach(session, host));
    if LISTENING.replace(true) {
        return;
    }

    let on_down = Closure::<dyn FnMut(_)>::new(move |event: PointerEvent| {
        let Some(source) = event_source(&event) else {
            return;
        };
        if ROUTER.with(|router| router.pointer_down(source, sample(&event))) {
            event.prevent_default();
        }
    });
    let _ = document.add_event_listener_with_callback("pointerdown", on_down.as_ref().unchecked_ref());
    on_down.forget();

    let on_move = Closure::<dyn FnMut(_)>::new(move |event: PointerEvent| {
        ROUTER.with(|router| router.pointer_move(sample(&event)));
    });
    let _ = document.add_event_listener_with_callback("pointermove", on_move.as_ref().unchecked_ref());
    on_move.forget();

    let on_up = Closure::<dyn FnMut(_)>::new(move |event: PointerEvent| {
        let outcome = ROUTER.with(|router| router.pointer_up(sample(&event)));
        log::trace!("{}: {:?}", event.type_(), outcome);
    });
    for kind in ["pointerup", "pointercancel"] {
        let _ = document.add_event_listener_with_callback(kind, on_up.as_ref().unchecked_ref());
    }
    on_up.forget();

    // Swallow the click that ends a drag, before page handlers see it
    let on_click = Closure::<dyn FnMut(_)>::new(move |event: web_sys::MouseEvent| {
        let Some(source) = event_source(&event) else {
            return;
        };
        if ROUTER.with(|router| router.suppress_click(source, page_now())) {
            event.prevent_default();
            event.stop_propagation();
        }
    });
    let _ = document.add_event_listener_with_callback_and_bool(
        "click",
        on_click.as_ref().unchecked_ref(),
        true,
    );
    on_click.forget();
}

/// Explode the page. Returns the trigger report as JSON.
#[wasm_bindgen(js_name = triggerExplosion)]
pub fn trigger_explosion() -> String {
    let report = ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        if active.as_ref().is_some_and(|e| e.is_active()) {
            log::warn!("explosion already running");
            return None;
        }

        let settings = ExplosionSettings::load();
        let Some(host) = DomHost::new(ROOT_SELECTOR, &settings) else {
            log::warn!("no document to explode");
            return None;
        };
        let window = host.window.clone();
        if let Some(body) = host.document.body() {
            set_styles(&body, &[("overflow", "hidden")]);
        }

        let explosion = match Explosion::new(Rc::new(host), settings) {
            Ok(explosion) => explosion,
            Err(e) => {
                log::warn!("explosion not started: {}", e);
                return None;
            }
        };
        let scheduler = Rc::new(RafScheduler::new(window));
        let report = explosion.trigger(&scheduler);
        if let Some(session) = explosion.session() {
            wire_pointer(session, explosion.host().clone());
        }
        *active = Some(explosion);
        Some(report)
    });

    report
        .and_then(|r| serde_json::to_string(&r).ok())
        .unwrap_or_else(|| "null".to_string())
}

/// Trigger the explosion from a button click
pub fn install_trigger_button(button_id: &str) {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let Some(button) = document.get_element_by_id(button_id) else {
        log::warn!("trigger button #{} not found", button_id);
        return;
    };
    let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
        let report = trigger_explosion();
        log::info!("explosion triggered: {}", report);
    });
    let _ = button.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
    closure.forget();
}
