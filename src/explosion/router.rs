//! Pointer routing
//!
//! Page-level pointer listeners live as long as the page, sessions do not. The
//! router holds whichever session is current; a new trigger replaces it and a
//! finished one is dropped on the next event.

use std::cell::RefCell;
use std::rc::Rc;

use super::driver::SharedSession;
use crate::platform::{ElementHost, ElementId, PointerSample};
use crate::sim::ReleaseOutcome;

type Live<H> = (SharedSession<<H as ElementHost>::Visual>, Rc<H>);

/// Sends pointer input to the live session, if there is one
pub struct PointerRouter<H: ElementHost> {
    live: RefCell<Option<Live<H>>>,
}

impl<H: ElementHost> Default for PointerRouter<H> {
    fn default() -> Self {
        Self {
            live: RefCell::new(None),
        }
    }
}

impl<H: ElementHost> PointerRouter<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route input to `session` from now on
    pub fn attach(&self, session: SharedSession<H::Visual>, host: Rc<H>) {
        if self.live.borrow_mut().replace((session, host)).is_some() {
            log::debug!("pointer input moved to a new session");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.live.borrow().is_some()
    }

    /// Current session, dropping it once every piece is gone
    fn live(&self) -> Option<Live<H>> {
        let mut slot = self.live.borrow_mut();
        if slot.as_ref().is_some_and(|(s, _)| s.borrow().is_empty()) {
            log::debug!("session finished, pointer input detached");
            *slot = None;
        }
        slot.clone()
    }

    /// Grab the body standing in for `source`
    pub fn pointer_down(&self, source: ElementId, sample: PointerSample) -> bool {
        let Some((session, _)) = self.live() else {
            return false;
        };
        let mut s = session.borrow_mut();
        match s.body_for_source(source) {
            Some(id) => s.pointer_down(id, sample),
            None => false,
        }
    }

    /// Move the held body. Returns false when nothing is held.
    pub fn pointer_move(&self, sample: PointerSample) -> bool {
        let Some((session, _)) = self.live() else {
            return false;
        };
        let mut s = session.borrow_mut();
        if s.grabbed().is_none() {
            return false;
        }
        s.pointer_move(sample);
        true
    }

    pub fn pointer_up(&self, sample: PointerSample) -> ReleaseOutcome {
        let Some((session, host)) = self.live() else {
            return ReleaseOutcome::Ignored;
        };
        session.borrow_mut().pointer_up(sample, host.as_ref())
    }

    /// Whether a click landing on `source`'s body should be swallowed
    pub fn suppress_click(&self, source: ElementId, now: f64) -> bool {
        let Some((session, _)) = self.live() else {
            return false;
        };
        let s = session.borrow();
        s.body_for_source(source)
            .is_some_and(|id| s.suppress_click(id, now))
    }
}
