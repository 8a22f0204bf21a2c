//! One explosion's live state
//!
//! The session owns every body with its visual, the repair graph and the
//! shockwave. Frame chains and pointer handlers mutate it through a shared
//! `Rc<RefCell<_>>`, always on the same thread and never re-entrantly.

use std::collections::BTreeMap;

use glam::Vec2;
use rand_pcg::Pcg32;

use crate::consts::*;
use crate::platform::{ElementHost, ElementId, PointerSample, VisualResource};
use crate::sim::{Arena, Body, BodyId, ReleaseOutcome, RepairGraph, Shockwave};

/// Called after a body is dropped home, with the element it restored
pub type RepairListener = Box<dyn FnMut(BodyId, ElementId)>;

/// A body and the visual standing in for its element
#[derive(Debug)]
pub struct Piece<V> {
    pub body: Body,
    visual: Option<V>,
}

impl<V: VisualResource> Piece<V> {
    fn render(&mut self) {
        if let Some(visual) = self.visual.as_mut() {
            visual.render(&self.body.pose());
        }
    }

    fn detach(&mut self) {
        if let Some(visual) = self.visual.take() {
            visual.detach();
        }
    }
}

/// Bodies, repair graph and shockwave for a single explosion
pub struct ExplosionSession<V> {
    pieces: BTreeMap<BodyId, Piece<V>>,
    graph: RepairGraph,
    shockwave: Shockwave,
    arena: Arena,
    rng: Pcg32,
    removal_delay_ms: f64,
    last_frame: f64,
    grabbed: Option<BodyId>,
    repaired: usize,
    on_repair: Option<RepairListener>,
}

impl<V: VisualResource> ExplosionSession<V> {
    pub fn new(
        arena: Arena,
        graph: RepairGraph,
        shockwave: Shockwave,
        rng: Pcg32,
        removal_delay_ms: f64,
    ) -> Self {
        let last_frame = shockwave.started_at;
        Self {
            pieces: BTreeMap::new(),
            graph,
            shockwave,
            arena,
            rng,
            removal_delay_ms,
            last_frame,
            grabbed: None,
            repaired: 0,
            on_repair: None,
        }
    }

    /// Take ownership of a body and its visual
    pub fn insert(&mut self, body: Body, visual: V) {
        self.pieces.insert(
            body.id,
            Piece {
                body,
                visual: Some(visual),
            },
        );
    }

    pub fn set_repair_listener(&mut self, listener: impl FnMut(BodyId, ElementId) + 'static) {
        self.on_repair = Some(Box::new(listener));
    }

    /// Run the repair graph's bootstrap and grant the first permissions.
    /// Returns how many bodies became repairable.
    pub fn bootstrap_repairs(&mut self) -> usize {
        let allowed = self.graph.bootstrap();
        self.grant(&allowed)
    }

    fn grant(&mut self, bodies: &[BodyId]) -> usize {
        let mut granted = 0;
        for id in bodies {
            let Some(piece) = self.pieces.get_mut(id) else {
                continue;
            };
            if piece.body.allow_repair() {
                if let Some(visual) = piece.visual.as_mut() {
                    visual.set_repairable(true);
                }
                granted += 1;
            }
        }
        granted
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.pieces.get(&id).map(|p| &p.body)
    }

    /// Bodies in id order
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.pieces.values().map(|p| &p.body)
    }

    pub fn graph(&self) -> &RepairGraph {
        &self.graph
    }

    pub fn shockwave(&self) -> &Shockwave {
        &self.shockwave
    }

    /// Bodies repaired so far
    pub fn repaired(&self) -> usize {
        self.repaired
    }

    pub fn grabbed(&self) -> Option<BodyId> {
        self.grabbed
    }

    /// Advance the shockwave. Returns false once the wave is over.
    pub fn shockwave_tick(&mut self, now: f64) -> bool {
        let tick = self.shockwave.advance(
            now,
            self.pieces.values_mut().map(|p| &mut p.body),
            &mut self.rng,
        );
        if tick.finished {
            self.shockwave
                .release_stragglers(self.pieces.values_mut().map(|p| &mut p.body));
            log::debug!(
                "shockwave finished, {} bodies struck",
                self.shockwave.applied_count()
            );
            return false;
        }
        true
    }

    /// One animation frame. Returns false once no pieces remain.
    pub fn frame<H>(&mut self, now: f64, host: &H) -> bool
    where
        H: ElementHost<Visual = V>,
    {
        let ms = (now - self.last_frame).clamp(FRAME_MIN_MS, FRAME_MAX_MS);
        self.last_frame = now;
        let dt = ms as f32 * SIM_UNITS_PER_MS;
        let dt_secs = (ms / 1000.0) as f32;

        self.purge(now, host);

        for piece in self.pieces.values_mut() {
            let body = &mut piece.body;
            if body.removed {
                continue;
            }
            if body.is_dragging() {
                body.drag_rotate(dt_secs);
                if let Some(rect) = body.take_due_hint(now) {
                    host.show_repair_hint(body.id, rect);
                }
            }
            body.step(dt, &self.arena);
        }

        for piece in self.pieces.values_mut() {
            if !piece.body.removed {
                piece.render();
            }
        }

        !self.pieces.is_empty()
    }

    /// Detach visuals of repaired bodies whose removal delay has passed
    fn purge<H>(&mut self, now: f64, host: &H)
    where
        H: ElementHost<Visual = V>,
    {
        let due: Vec<BodyId> = self
            .pieces
            .values()
            .filter(|p| p.body.removal_due(now))
            .map(|p| p.body.id)
            .collect();
        for id in due {
            if let Some(mut piece) = self.pieces.remove(&id) {
                piece.detach();
                host.hide_repair_hint(id);
                log::trace!("purged body {}", id);
            }
        }
    }

    /// Live body standing in for `source`
    pub fn body_for_source(&self, source: ElementId) -> Option<BodyId> {
        self.pieces
            .values()
            .find(|p| !p.body.removed && p.body.source() == Some(source))
            .map(|p| p.body.id)
    }

    /// Topmost body under a page point
    pub fn body_at(&self, point: Vec2) -> Option<BodyId> {
        self.pieces
            .values()
            .rev()
            .filter(|p| !p.body.removed)
            .find(|p| {
                let body = &p.body;
                let local = Vec2::from_angle(-body.angle).rotate(point - body.pos);
                local.abs().cmple(body.size() * 0.5).all()
            })
            .map(|p| p.body.id)
    }

    /// Grab a body. Returns false if it cannot be picked up.
    pub fn pointer_down(&mut self, id: BodyId, sample: PointerSample) -> bool {
        if self.grabbed.is_some() {
            return false;
        }
        let Some(piece) = self.pieces.get_mut(&id) else {
            return false;
        };
        if piece.body.begin_drag(sample) {
            self.grabbed = Some(id);
            true
        } else {
            false
        }
    }

    pub fn pointer_move(&mut self, sample: PointerSample) {
        let Some(id) = self.grabbed else {
            return;
        };
        if let Some(piece) = self.pieces.get_mut(&id) {
            piece.body.drag_to(sample);
            piece.render();
        }
    }

    /// Release whatever is held; repairs it if it was dropped home
    pub fn pointer_up<H>(&mut self, sample: PointerSample, host: &H) -> ReleaseOutcome
    where
        H: ElementHost<Visual = V>,
    {
        let Some(id) = self.grabbed.take() else {
            return ReleaseOutcome::Ignored;
        };
        host.hide_repair_hint(id);
        let outcome = match self.pieces.get_mut(&id) {
            Some(piece) => piece.body.end_drag(sample),
            None => ReleaseOutcome::Ignored,
        };
        if outcome == ReleaseOutcome::Repair {
            self.repair(id, sample.t_ms, host);
        }
        outcome
    }

    /// Whether a click on this body right now should be swallowed
    pub fn suppress_click(&self, id: BodyId, now: f64) -> bool {
        self.pieces
            .get(&id)
            .is_some_and(|p| p.body.suppresses_click(now))
    }

    /// Put a body's element back and pass repair permission down the tree
    fn repair<H>(&mut self, id: BodyId, now: f64, host: &H)
    where
        H: ElementHost<Visual = V>,
    {
        let Some(piece) = self.pieces.get_mut(&id) else {
            return;
        };
        let Some(source) = piece.body.source() else {
            return;
        };

        host.set_visible(source, true);
        if let Some(visual) = piece.visual.as_mut() {
            visual.begin_repair();
        }
        piece.body.mark_removed(now, self.removal_delay_ms);
        host.hide_repair_hint(id);
        self.repaired += 1;

        let allowed = self.graph.repair(source);
        let granted = self.grant(&allowed);
        log::info!(
            "body {} repaired element {}, {} more repairable",
            id,
            source,
            granted
        );

        if let Some(listener) = self.on_repair.as_mut() {
            listener(id, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rect;
    use crate::platform::{MemoryHost, MemoryVisual};
    use crate::sim::{NodeRole, NodeState, RepairAnchor};
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    const VIEW: Rect = Rect {
        min: Vec2::ZERO,
        size: Vec2::new(800.0, 600.0),
    };

    /// Host with one parent element and one child, both turned into bodies
    fn session_with_family(host: &MemoryHost) -> (ExplosionSession<MemoryVisual>, ElementId, ElementId) {
        let root = host.root_id();
        let parent_rect = Rect::new(100.0, 100.0, 200.0, 100.0);
        let child_rect = Rect::new(120.0, 120.0, 60.0, 20.0);
        let parent = host.add(root, "div", parent_rect);
        let child = host.add(parent, "span", child_rect);

        let mut graph = RepairGraph::new(root);
        graph.insert(parent, root, NodeRole::Physical(BodyId(0)));
        graph.insert(child, parent, NodeRole::Physical(BodyId(1)));

        let wave = Shockwave::new(Vec2::new(400.0, 500.0), 5.5, VIEW.size, 0.0);
        let mut session = ExplosionSession::new(
            Arena::new(VIEW),
            graph,
            wave,
            Pcg32::seed_from_u64(1),
            REMOVAL_DELAY_MS,
        );
        for (idx, (el, rect)) in [(parent, parent_rect), (child, child_rect)].into_iter().enumerate() {
            let body = Body::new(BodyId(idx as u32), rect).with_anchor(RepairAnchor::new(el, rect));
            let visual = host.snapshot(el, rect).unwrap();
            host.set_visible(el, false);
            session.insert(body, visual);
        }
        (session, parent, child)
    }

    fn move_body(session: &mut ExplosionSession<MemoryVisual>, id: BodyId, to: Vec2, host: &MemoryHost, t: f64) -> ReleaseOutcome {
        let from = session.body(id).unwrap().pos;
        assert!(session.pointer_down(id, PointerSample::new(from.x, from.y, t)));
        session.pointer_move(PointerSample::new(to.x, to.y, t + 50.0));
        session.pointer_up(PointerSample::new(to.x, to.y, t + 100.0), host)
    }

    #[test]
    fn test_bootstrap_grants_top_level_only() {
        let host = MemoryHost::new(VIEW);
        let (mut session, parent, _) = session_with_family(&host);
        assert_eq!(session.bootstrap_repairs(), 1);
        assert!(session.body(BodyId(0)).unwrap().repair_allowed());
        assert!(!session.body(BodyId(1)).unwrap().repair_allowed());
        assert!(host.visual_log().borrow().repairable.contains(&parent));
    }

    #[test]
    fn test_repair_restores_element_and_unlocks_children() {
        let host = MemoryHost::new(VIEW);
        let (mut session, parent, child) = session_with_family(&host);
        session.bootstrap_repairs();

        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = fired.clone();
        session.set_repair_listener(move |body, el| sink.borrow_mut().push((body, el)));

        // Child is not repairable yet
        let outcome = move_body(&mut session, BodyId(1), Vec2::new(150.0, 130.0), &host, 0.0);
        assert_eq!(outcome, ReleaseOutcome::Released);

        let outcome = move_body(&mut session, BodyId(0), Vec2::new(205.0, 150.0), &host, 200.0);
        assert_eq!(outcome, ReleaseOutcome::Repair);
        assert!(host.is_visible(parent));
        assert!(!host.is_visible(child));
        assert_eq!(session.graph().state(parent), Some(NodeState::Repaired));
        assert_eq!(session.graph().state(child), Some(NodeState::Hidden));
        assert_eq!(*fired.borrow(), vec![(BodyId(0), parent)]);
        assert!(session.body(BodyId(1)).unwrap().repair_allowed());
        assert!(session.body(BodyId(0)).unwrap().removed);
        assert_eq!(session.repaired(), 1);

        let outcome = move_body(&mut session, BodyId(1), Vec2::new(150.0, 130.0), &host, 400.0);
        assert_eq!(outcome, ReleaseOutcome::Repair);
        assert!(host.is_visible(child));
        assert_eq!(fired.borrow().len(), 2);
    }

    #[test]
    fn test_removed_visual_detached_after_delay() {
        let host = MemoryHost::new(VIEW);
        let (mut session, parent, _) = session_with_family(&host);
        session.bootstrap_repairs();
        move_body(&mut session, BodyId(0), Vec2::new(200.0, 150.0), &host, 0.0);

        // Repair happened at t=100
        assert!(session.frame(500.0, &host));
        assert_eq!(session.len(), 2);
        assert!(session.frame(620.0, &host));
        assert_eq!(session.len(), 1);
        let log = host.visual_log();
        assert_eq!(log.borrow().detached, vec![parent]);
        assert!(log.borrow().repairing.contains(&parent));
    }

    #[test]
    fn test_frame_loop_ends_when_everything_is_repaired() {
        let host = MemoryHost::new(VIEW);
        let (mut session, _, _) = session_with_family(&host);
        session.bootstrap_repairs();
        move_body(&mut session, BodyId(0), Vec2::new(200.0, 150.0), &host, 0.0);
        move_body(&mut session, BodyId(1), Vec2::new(150.0, 130.0), &host, 200.0);
        assert!(!session.frame(1000.0, &host));
        assert!(session.is_empty());
    }

    #[test]
    fn test_frame_dt_is_clamped() {
        let host = MemoryHost::new(VIEW);
        let (mut session, _, _) = session_with_family(&host);
        let y0 = session.body(BodyId(0)).unwrap().pos.y;

        // A 10 s gap is treated as a 40 ms frame: one step of dt = 2.4
        session.frame(10_000.0, &host);
        let body = session.body(BodyId(0)).unwrap();
        let dt = 40.0 * SIM_UNITS_PER_MS;
        let expected_vel = GRAVITY * dt * LINEAR_DAMPING.powf(dt);
        assert!((body.vel.y - expected_vel).abs() < 1e-4);
        assert!((body.pos.y - (y0 + GRAVITY * dt * dt)).abs() < 1e-3);
    }

    #[test]
    fn test_short_frame_counts_as_minimum_step() {
        let host = MemoryHost::new(VIEW);
        let (mut session, _, _) = session_with_family(&host);
        let y0 = session.body(BodyId(0)).unwrap().pos.y;

        // 1 ms after the last frame still advances a full 8 ms: dt = 0.48
        assert!(session.frame(1.0, &host));
        let body = session.body(BodyId(0)).unwrap();
        let dt = 8.0 * SIM_UNITS_PER_MS;
        assert!((dt - 0.48).abs() < 1e-6);
        let expected_vel = GRAVITY * dt * LINEAR_DAMPING.powf(dt);
        assert!((body.vel.y - expected_vel).abs() < 1e-5);
        assert!((body.pos.y - (y0 + GRAVITY * dt * dt)).abs() < 1e-3);
    }

    #[test]
    fn test_hint_shown_while_held_and_hidden_on_release() {
        let host = MemoryHost::new(VIEW);
        let (mut session, _, _) = session_with_family(&host);
        session.bootstrap_repairs();
        let pos = session.body(BodyId(0)).unwrap().pos;
        session.pointer_down(BodyId(0), PointerSample::new(pos.x, pos.y, 0.0));

        session.frame(1000.0, &host);
        assert!(host.visual_log().borrow().hints.is_empty());
        session.frame(2040.0, &host);
        assert!(host.visual_log().borrow().hints.contains_key(&BodyId(0)));

        session.pointer_move(PointerSample::new(600.0, 400.0, 2080.0));
        let outcome = session.pointer_up(PointerSample::new(600.0, 400.0, 2100.0), &host);
        assert_eq!(outcome, ReleaseOutcome::Released);
        assert!(host.visual_log().borrow().hints.is_empty());
    }

    #[test]
    fn test_single_grab_and_hit_testing() {
        let host = MemoryHost::new(VIEW);
        let (mut session, _, _) = session_with_family(&host);

        // Child sits on top of its parent
        assert_eq!(session.body_at(Vec2::new(150.0, 130.0)), Some(BodyId(1)));
        assert_eq!(session.body_at(Vec2::new(280.0, 180.0)), Some(BodyId(0)));
        assert_eq!(session.body_at(Vec2::new(700.0, 50.0)), None);
        let parent = session.body(BodyId(0)).and_then(|b| b.source()).unwrap();
        assert_eq!(session.body_for_source(parent), Some(BodyId(0)));
        assert_eq!(session.body_for_source(ElementId(99)), None);

        assert!(session.pointer_down(BodyId(1), PointerSample::new(150.0, 130.0, 0.0)));
        assert!(!session.pointer_down(BodyId(0), PointerSample::new(280.0, 180.0, 0.0)));
        assert_eq!(session.grabbed(), Some(BodyId(1)));
        assert!(!session.suppress_click(BodyId(1), 10.0));
        session.pointer_move(PointerSample::new(170.0, 130.0, 20.0));
        assert!(session.suppress_click(BodyId(1), 30.0));
    }
}
