//! Explosion orchestration
//!
//! Walks the host's element tree, turns every qualifying element into a body
//! (or marks it as a pass-through wrapper), arms the blast and starts the
//! shockwave and animation chains.

pub mod driver;
pub mod router;
pub mod session;

pub use driver::{SharedSession, run_frames, run_shockwave};
pub use router::PointerRouter;
pub use session::{ExplosionSession, Piece, RepairListener};

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::Rect;
use crate::error::Result;
use crate::platform::{ElementHost, ElementId, FrameScheduler};
use crate::settings::{Blast, ExplosionSettings};
use crate::sim::{Body, BodyId, NodeRole, RepairAnchor, RepairGraph, Shockwave, arm_body};

/// What a trigger did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    /// Elements under the root that passed the id/tag filters
    pub candidates: usize,
    /// Bodies built
    pub created: usize,
    /// Transparent wrappers hidden without a body
    pub skipped: usize,
    /// Subtrees excluded by id/tag, plus elements too small to explode
    pub excluded: usize,
    /// Elements dropped because a host query failed
    pub failed: usize,
}

/// How one candidate element is handled
enum Classification {
    TooSmall,
    Skip,
    Physical(Rect),
}

/// Explosion entry point bound to a host
pub struct Explosion<H: ElementHost> {
    host: Rc<H>,
    settings: ExplosionSettings,
    session: RefCell<Option<SharedSession<H::Visual>>>,
}

impl<H> Explosion<H>
where
    H: ElementHost + 'static,
    H::Visual: 'static,
{
    pub fn new(host: Rc<H>, settings: ExplosionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            host,
            settings,
            session: RefCell::new(None),
        })
    }

    pub fn host(&self) -> &Rc<H> {
        &self.host
    }

    pub fn settings(&self) -> &ExplosionSettings {
        &self.settings
    }

    /// The live session, once triggered
    pub fn session(&self) -> Option<SharedSession<H::Visual>> {
        self.session.borrow().clone()
    }

    /// Whether a session is still running
    pub fn is_active(&self) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|s| !s.borrow().is_empty())
    }

    /// Blow the page up.
    ///
    /// Builds every body, then queues the shockwave and animation chains on
    /// `scheduler` and returns; nothing animates until the scheduler runs.
    /// Never fails: per-element problems are logged and counted.
    pub fn trigger<S>(&self, scheduler: &Rc<S>) -> TriggerReport
    where
        S: FrameScheduler + ?Sized + 'static,
    {
        if self.is_active() {
            log::warn!("explosion already running, ignoring trigger");
            return TriggerReport::default();
        }

        let now = scheduler.now();
        let Some((session, report)) = self.build_session(now) else {
            return TriggerReport::default();
        };
        log::info!(
            "explosion: {} bodies from {} candidates ({} wrappers, {} excluded, {} failed)",
            report.created,
            report.candidates,
            report.skipped,
            report.excluded,
            report.failed
        );

        let session = Rc::new(RefCell::new(session));
        *self.session.borrow_mut() = Some(session.clone());

        run_shockwave(session.clone(), scheduler.clone());
        run_frames(session, self.host.clone(), scheduler.clone());
        report
    }

    /// Select elements and build a session without scheduling anything.
    /// Returns `None` when the host has no root.
    pub fn build_session(&self, now: f64) -> Option<(ExplosionSession<H::Visual>, TriggerReport)> {
        let host = self.host.as_ref();
        let Some(root) = host.root() else {
            log::warn!("explosion root not found, aborting");
            return None;
        };

        let words = host.split_text(root);
        if words > 0 {
            log::debug!("split text into {} word elements", words);
        }

        let viewport = host.viewport();
        let seed = self.settings.seed.unwrap_or_else(|| now.to_bits());
        let mut rng = Pcg32::seed_from_u64(seed);
        let blast = self.settings.resolve_blast(viewport, &mut rng);
        log::info!(
            "blast at ({:.0}, {:.0}) strength {:.2}, seed {}",
            blast.origin.x,
            blast.origin.y,
            blast.strength,
            seed
        );

        let mut report = TriggerReport::default();
        let mut graph = RepairGraph::new(root);
        let mut pieces = Vec::new();

        // Pre-order walk so parents are in the graph before their children
        let mut stack: Vec<(ElementId, ElementId)> = host
            .children(root)
            .into_iter()
            .rev()
            .map(|child| (child, root))
            .collect();

        while let Some((id, parent)) = stack.pop() {
            let info = match host.info(id) {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("skipping element: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            if self.settings.excludes(&info.tag, info.dom_id.as_deref()) {
                report.excluded += 1;
                continue;
            }
            report.candidates += 1;

            let children = host.children(id);
            let next_body = BodyId(pieces.len() as u32);
            let role = match self.classify(id, !children.is_empty()) {
                Ok(Classification::TooSmall) => {
                    report.excluded += 1;
                    NodeRole::Inert
                }
                Ok(Classification::Skip) => {
                    host.set_visible(id, false);
                    report.skipped += 1;
                    NodeRole::Skip
                }
                Ok(Classification::Physical(rect)) => {
                    match self.physicalize(id, rect, next_body, &blast, &mut rng) {
                        Ok(piece) => {
                            pieces.push(piece);
                            NodeRole::Physical(next_body)
                        }
                        Err(e) => {
                            log::warn!("<{}> not exploded: {}", info.tag, e);
                            report.failed += 1;
                            NodeRole::Inert
                        }
                    }
                }
                Err(e) => {
                    log::warn!("<{}> not exploded: {}", info.tag, e);
                    report.failed += 1;
                    NodeRole::Inert
                }
            };

            graph.insert(id, parent, role);
            stack.extend(children.into_iter().rev().map(|child| (child, id)));
        }

        let shockwave = Shockwave::new(blast.origin, blast.strength, viewport.size, now);
        let mut session = ExplosionSession::new(
            self.settings.arena(viewport),
            graph,
            shockwave,
            rng,
            self.settings.removal_delay_ms as f64,
        );
        for (body, visual) in pieces {
            session.insert(body, visual);
        }
        report.created = session.len();

        let repairable = session.bootstrap_repairs();
        log::debug!("{} bodies repairable from the start", repairable);

        Some((session, report))
    }

    fn classify(&self, id: ElementId, has_children: bool) -> Result<Classification> {
        let rect = self.host.bounding_box(id)?;
        let min = self.settings.min_element_size;
        if rect.width() < min || rect.height() < min {
            return Ok(Classification::TooSmall);
        }
        let style = self.host.computed_style(id)?;
        if has_children && style.is_backgroundless() {
            return Ok(Classification::Skip);
        }
        Ok(Classification::Physical(rect))
    }

    /// Snapshot the element and build its armed, frozen body
    fn physicalize(
        &self,
        id: ElementId,
        rect: Rect,
        body_id: BodyId,
        blast: &Blast,
        rng: &mut Pcg32,
    ) -> Result<(Body, H::Visual)> {
        let visual = self.host.snapshot(id, rect)?;

        let anchor = RepairAnchor::new(id, rect).with_threshold(self.settings.repair_distance);
        let mut body = Body::new(body_id, rect)
            .with_frozen(true)
            .with_anchor(anchor);
        arm_body(&mut body, blast.origin, blast.strength, rng);

        self.host.set_visible(id, false);
        Ok((body, visual))
    }
}
