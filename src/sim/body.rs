//! Rigid rectangle bodies
//!
//! A `Body` stands in for one page element after the blast. It integrates
//! under gravity, bounces off the viewport edges, settles flat on the floor,
//! and can be picked up and dropped back where its element used to be.

use std::collections::VecDeque;
use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::{Arena, boundary_contacts, resolve_contact};
use super::settle::try_settle;
use crate::consts::*;
use crate::platform::{ElementId, PointerSample, Pose};
use crate::{Rect, normalize_angle, shortest_angle_delta};

/// Session-unique body identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blast impulse waiting for the shockwave front to arrive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingImpulse {
    /// Velocity change to apply
    pub dv: Vec2,
    /// Impulse magnitude, used to derive the torque at the struck corner
    pub j: f32,
    /// Unit direction away from the blast origin
    pub dir: Vec2,
}

/// Where a body's element lives and how close it must be dropped to repair it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairAnchor {
    /// The element this body replaced (lookup key only)
    pub source: ElementId,
    /// Element's rectangle at blast time
    pub original_rect: Rect,
    /// Max drop distance from the original center (px)
    pub threshold: f32,
}

impl RepairAnchor {
    pub fn new(source: ElementId, original_rect: Rect) -> Self {
        Self {
            source,
            original_rect,
            threshold: REPAIR_DISTANCE,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    pub fn original_center(&self) -> Vec2 {
        self.original_rect.center()
    }
}

/// What a pointer release did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The body was not being dragged
    Ignored,
    /// Thrown back into the simulation
    Released,
    /// Dropped home; the repair callback must run
    Repair,
}

#[derive(Debug, Clone)]
struct DragState {
    /// Pointer position minus body center at grab time
    offset: Vec2,
    start: Vec2,
    started_at: f64,
    samples: VecDeque<PointerSample>,
    did_move: bool,
    hint_shown: bool,
}

/// A simulated rectangle
#[derive(Debug, Clone)]
pub struct Body {
    pub id: BodyId,
    width: f32,
    height: f32,
    /// Center in page coordinates
    pub pos: Vec2,
    pub vel: Vec2,
    /// Rotation, kept in (-π, π]
    pub angle: f32,
    pub angular_vel: f32,
    mass: f32,
    inertia: f32,
    /// Not simulated (waiting for the shockwave, or held by the pointer)
    pub frozen: bool,
    /// Resting on the floor; steps are no-ops
    pub settled: bool,
    /// Repaired and waiting for its visual to be detached
    pub removed: bool,
    pub removal_at: Option<f64>,
    pub pending: Option<PendingImpulse>,
    pub anchor: Option<RepairAnchor>,
    repair_allowed: bool,
    repair_fired: bool,
    drag: Option<DragState>,
    last_release_at: Option<f64>,
    last_drag_moved: bool,
}

impl Body {
    /// Body covering `rect`, at rest and unrotated
    pub fn new(id: BodyId, rect: Rect) -> Self {
        let width = rect.width().max(1.0);
        let height = rect.height().max(1.0);
        let mass = (width * height * MASS_PER_AREA).max(MIN_MASS);
        let inertia = ((1.0 / 12.0) * mass * (width * width + height * height)).max(MIN_INERTIA);

        Self {
            id,
            width,
            height,
            pos: rect.min + Vec2::new(width, height) * 0.5,
            vel: Vec2::ZERO,
            angle: 0.0,
            angular_vel: 0.0,
            mass,
            inertia,
            frozen: false,
            settled: false,
            removed: false,
            removal_at: None,
            pending: None,
            anchor: None,
            repair_allowed: false,
            repair_fired: false,
            drag: None,
            last_release_at: None,
            last_drag_moved: false,
        }
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn with_anchor(mut self, anchor: RepairAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Source element, if this body replaced one
    pub fn source(&self) -> Option<ElementId> {
        self.anchor.map(|a| a.source)
    }

    /// Corners at the current pose: top-left, top-right, bottom-right, bottom-left
    pub fn corners(&self) -> [Vec2; 4] {
        self.corners_at(self.pos, self.angle)
    }

    /// Corners for an arbitrary pose, same order as `corners`
    pub fn corners_at(&self, center: Vec2, angle: f32) -> [Vec2; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let rot = Vec2::from_angle(angle);
        [
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ]
        .map(|local| center + rot.rotate(local))
    }

    pub fn pose(&self) -> Pose {
        Pose {
            top_left: self.pos - self.size() * 0.5,
            size: self.size(),
            angle: self.angle,
        }
    }

    /// Advance by `dt` simulation units
    pub fn step(&mut self, dt: f32, arena: &Arena) {
        if self.frozen || self.settled || self.removed {
            return;
        }
        let material = arena.material;

        self.vel.y += material.gravity * dt;

        let mut pred_pos = self.pos + self.vel * dt;
        let pred_angle = self.angle + self.angular_vel * dt;

        let corners = self.corners_at(pred_pos, pred_angle);
        for contact in boundary_contacts(&corners, &arena.bounds) {
            let response = resolve_contact(
                &contact,
                pred_pos,
                self.vel,
                self.angular_vel,
                self.mass,
                self.inertia,
                &material,
            );
            pred_pos += response.correction;
            self.vel = response.vel;
            self.angular_vel = response.angular_vel;
        }

        self.pos = pred_pos;
        self.angle = pred_angle;

        self.vel *= LINEAR_DAMPING.powf(dt);
        self.angular_vel *= ANGULAR_DAMPING;
        self.vel = self
            .vel
            .clamp(Vec2::splat(-MAX_LINEAR_SPEED), Vec2::splat(MAX_LINEAR_SPEED));
        self.angular_vel = self
            .angular_vel
            .clamp(-MAX_ANGULAR_SPEED, MAX_ANGULAR_SPEED);

        self.sanitize();
        self.angle = normalize_angle(self.angle);

        try_settle(self, arena);
    }

    /// Zero out any NaN/∞ component
    fn sanitize(&mut self) {
        if !self.vel.x.is_finite() {
            self.vel.x = 0.0;
        }
        if !self.vel.y.is_finite() {
            self.vel.y = 0.0;
        }
        if !self.pos.x.is_finite() {
            self.pos.x = 0.0;
        }
        if !self.pos.y.is_finite() {
            self.pos.y = 0.0;
        }
        if !self.angle.is_finite() {
            self.angle = 0.0;
        }
        if !self.angular_vel.is_finite() {
            self.angular_vel = 0.0;
        }
    }

    /// Put the body (back) into the simulation
    pub fn unfreeze(&mut self) {
        self.frozen = false;
        self.settled = false;
    }

    /// Take the blast impulse, leaving none behind
    pub fn take_pending(&mut self) -> Option<PendingImpulse> {
        self.pending.take()
    }

    /// Grant repair permission. Returns true the first time only.
    pub fn allow_repair(&mut self) -> bool {
        let newly = !self.repair_allowed;
        self.repair_allowed = true;
        newly
    }

    #[inline]
    pub fn repair_allowed(&self) -> bool {
        self.repair_allowed
    }

    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Pointer down on this body. Returns false if it cannot be grabbed.
    pub fn begin_drag(&mut self, sample: PointerSample) -> bool {
        if self.removed || self.drag.is_some() {
            return false;
        }
        self.settled = false;
        self.frozen = true;
        self.vel = Vec2::ZERO;
        self.angular_vel = 0.0;
        self.last_drag_moved = false;

        let mut samples = VecDeque::new();
        samples.push_back(sample);
        self.drag = Some(DragState {
            offset: sample.pos - self.pos,
            start: sample.pos,
            started_at: sample.t_ms,
            samples,
            did_move: false,
            hint_shown: false,
        });
        true
    }

    /// Pointer moved while held
    pub fn drag_to(&mut self, sample: PointerSample) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        self.pos = sample.pos - drag.offset;

        let travel = (sample.pos - drag.start).abs();
        if travel.x > DRAG_MOVE_THRESHOLD || travel.y > DRAG_MOVE_THRESHOLD {
            drag.did_move = true;
        }

        drag.samples.push_back(sample);
        trim_samples(&mut drag.samples, sample.t_ms);
    }

    /// Turn a held body toward upright by at most π/2 rad/s
    pub fn drag_rotate(&mut self, dt_secs: f32) {
        if self.drag.is_none() {
            return;
        }
        let diff = shortest_angle_delta(self.angle, 0.0);
        let max_delta = DRAG_ROTATE_SPEED * dt_secs.max(0.0);
        if diff.abs() <= max_delta {
            self.angle = 0.0;
        } else {
            self.angle = normalize_angle(self.angle + diff.signum() * max_delta);
        }
    }

    /// Pointer released (or cancelled)
    pub fn end_drag(&mut self, sample: PointerSample) -> ReleaseOutcome {
        let Some(mut drag) = self.drag.take() else {
            return ReleaseOutcome::Ignored;
        };

        trim_samples(&mut drag.samples, sample.t_ms);
        self.vel = release_velocity(&drag.samples);
        self.frozen = false;
        self.last_release_at = Some(sample.t_ms);
        self.last_drag_moved = drag.did_move;

        if self.repair_allowed && !self.repair_fired {
            if let Some(anchor) = self.anchor {
                if self.pos.distance(anchor.original_center()) <= anchor.threshold {
                    self.repair_fired = true;
                    return ReleaseOutcome::Repair;
                }
            }
        }
        ReleaseOutcome::Released
    }

    /// Original rectangle, once, after the body has been held long enough
    pub fn take_due_hint(&mut self, now: f64) -> Option<Rect> {
        if !self.repair_allowed {
            return None;
        }
        let anchor = self.anchor?;
        let drag = self.drag.as_mut()?;
        if drag.hint_shown || now - drag.started_at < REPAIR_HINT_DELAY_MS {
            return None;
        }
        drag.hint_shown = true;
        Some(anchor.original_rect)
    }

    /// Whether a click arriving now is the tail end of a drag
    pub fn suppresses_click(&self, now: f64) -> bool {
        if self.drag.as_ref().is_some_and(|d| d.did_move) {
            return true;
        }
        self.last_drag_moved
            || self
                .last_release_at
                .is_some_and(|t| now < t + CLICK_SUPPRESS_MS)
    }

    /// Flag as repaired; the visual goes away after `delay_ms`
    pub fn mark_removed(&mut self, now: f64, delay_ms: f64) {
        self.removed = true;
        self.frozen = true;
        self.drag = None;
        self.removal_at = Some(now + delay_ms);
    }

    /// Removed and past its removal deadline
    pub fn removal_due(&self, now: f64) -> bool {
        self.removed && self.removal_at.is_none_or(|at| now >= at)
    }
}

/// Drop samples older than the velocity window, measured back from `now`
fn trim_samples(samples: &mut VecDeque<PointerSample>, now: f64) {
    while samples
        .front()
        .is_some_and(|s| now - s.t_ms > DRAG_VELOCITY_WINDOW_MS)
    {
        samples.pop_front();
    }
}

/// Throw velocity from the two most recent samples
fn release_velocity(samples: &VecDeque<PointerSample>) -> Vec2 {
    let n = samples.len();
    if n < 2 {
        return Vec2::ZERO;
    }
    let a = samples[n - 2];
    let b = samples[n - 1];
    let dt_secs = ((b.t_ms - a.t_ms) / 1000.0) as f32;
    if dt_secs <= 0.0 {
        return Vec2::ZERO;
    }
    ((b.pos - a.pos) / dt_secs * DRAG_RELEASE_SCALE)
        .clamp(Vec2::splat(-MAX_LINEAR_SPEED), Vec2::splat(MAX_LINEAR_SPEED))
}
