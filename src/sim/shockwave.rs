//! Blast impulses and the expanding shockwave that delivers them
//!
//! Every body gets a pending impulse when the explosion is set up, but stays
//! frozen until the wave front sweeps over it. At that moment the stored
//! impulse is applied together with a distance-decayed radial pulse and a
//! small angular kick, so the page comes apart from the origin outward.

use std::collections::HashSet;

use glam::Vec2;
use rand::Rng;

use super::body::{Body, BodyId, PendingImpulse};
use crate::consts::*;

/// Index and position of the corner closest to `point`
pub fn nearest_corner(body: &Body, point: Vec2) -> (usize, Vec2) {
    let corners = body.corners();
    let mut best = (0, corners[0]);
    let mut best_dist = f32::INFINITY;
    for (idx, corner) in corners.into_iter().enumerate() {
        let dist = corner.distance_squared(point);
        if dist < best_dist {
            best_dist = dist;
            best = (idx, corner);
        }
    }
    best
}

/// Rotation direction when the blast reaches corner `idx` first.
///
/// Top-left and bottom-right spin counter-clockwise (-1), the other two
/// clockwise (+1).
#[inline]
pub fn spin_sign(idx: usize) -> f32 {
    if idx % 2 == 0 { -1.0 } else { 1.0 }
}

/// Roll the blast impulse for a body sitting relative to `origin`.
///
/// Magnitude falls off with distance (floored at a few pixels so bodies on top
/// of the origin do not fly off at infinite speed). Inside that floor the
/// direction is shortened along with the offset.
pub fn pending_impulse<R: Rng + ?Sized>(
    body: &Body,
    origin: Vec2,
    strength: f32,
    rng: &mut R,
) -> PendingImpulse {
    let offset = body.pos - origin;
    let dist = offset.length().max(IMPULSE_MIN_DISTANCE);
    let dir = offset / dist;

    let base = IMPULSE_BASE_MIN + rng.random::<f32>() * IMPULSE_BASE_RANGE;
    let jitter = IMPULSE_JITTER_MIN + rng.random::<f32>() * IMPULSE_JITTER_RANGE;
    let j = base * strength * jitter / dist;

    PendingImpulse {
        dv: dir * (j / body.mass()),
        j,
        dir,
    }
}

/// Lever-arm torque of an impulse applied at the corner nearest `origin`
fn corner_torque(body: &Body, origin: Vec2, impulse: &PendingImpulse) -> (usize, f32) {
    let (idx, corner) = nearest_corner(body, origin);
    let r = corner - body.pos;
    (idx, r.perp_dot(impulse.dir * impulse.j))
}

/// Arm a freshly built body: store its blast impulse and give it the initial
/// spin it will carry once released
pub fn arm_body<R: Rng + ?Sized>(body: &mut Body, origin: Vec2, strength: f32, rng: &mut R) {
    let impulse = pending_impulse(body, origin, strength, rng);
    let (_, torque) = corner_torque(body, origin, &impulse);
    body.angular_vel += torque * IMPULSE_TORQUE_SCALE / body.inertia();
    body.angular_vel += (rng.random::<f32>() - 0.5) * SPAWN_SPIN_JITTER;
    body.pending = Some(impulse);
}

/// What one shockwave tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveTick {
    /// Bodies struck this tick
    pub hits: usize,
    /// The front has reached its maximum radius
    pub finished: bool,
}

/// A radial front expanding from the blast origin
#[derive(Debug, Clone)]
pub struct Shockwave {
    pub origin: Vec2,
    pub strength: f32,
    pub started_at: f64,
    pub duration_ms: f64,
    pub max_radius: f32,
    applied: HashSet<BodyId>,
}

impl Shockwave {
    /// Wave for a blast of `strength`, sized to a `viewport`-sized page
    pub fn new(origin: Vec2, strength: f32, viewport: Vec2, started_at: f64) -> Self {
        let duration_ms =
            (WAVE_MS_PER_STRENGTH * strength).clamp(WAVE_MIN_DURATION_MS, WAVE_MAX_DURATION_MS);
        let max_radius = viewport.x.max(viewport.y)
            * WAVE_RADIUS_FACTOR
            * WAVE_MAX_RADIUS_SCALE.min(strength / 2.0);

        Self {
            origin,
            strength,
            started_at,
            duration_ms: duration_ms as f64,
            max_radius: max_radius.max(0.0),
            applied: HashSet::new(),
        }
    }

    /// Fraction of the wave's lifetime elapsed, 0..=1
    pub fn progress(&self, now: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now - self.started_at) / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    pub fn front_radius(&self, now: f64) -> f32 {
        self.max_radius * self.progress(now)
    }

    /// Width of the active band around the front; narrows as the wave ages
    pub fn band_thickness(&self, now: f64) -> f32 {
        let p = self.progress(now);
        (WAVE_BAND_START * (1.0 - p) + WAVE_BAND_TAIL).max(WAVE_BAND_MIN)
    }

    /// Whether a point `dist` away from the origin is under the front
    pub fn in_band(&self, dist: f32, now: f64) -> bool {
        (dist - self.front_radius(now)).abs() <= self.band_thickness(now) / 2.0
    }

    pub fn is_applied(&self, id: BodyId) -> bool {
        self.applied.contains(&id)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Strike every unapplied body under the front
    pub fn advance<'a, R: Rng + ?Sized>(
        &mut self,
        now: f64,
        bodies: impl IntoIterator<Item = &'a mut Body>,
        rng: &mut R,
    ) -> WaveTick {
        let mut hits = 0;
        for body in bodies {
            if body.removed || self.applied.contains(&body.id) {
                continue;
            }
            let dist = body.pos.distance(self.origin);
            if self.in_band(dist, now) {
                self.strike(body, dist, rng);
                hits += 1;
            }
        }

        if hits > 0 {
            log::debug!(
                "shockwave r={:.0} struck {} bodies ({} total)",
                self.front_radius(now),
                hits,
                self.applied.len()
            );
        }

        WaveTick {
            hits,
            finished: self.progress(now) >= 1.0,
        }
    }

    /// Apply the stored impulse, the radial pulse and the angular kick
    fn strike<R: Rng + ?Sized>(&mut self, body: &mut Body, dist: f32, rng: &mut R) {
        self.applied.insert(body.id);

        // A held body keeps following the pointer; its blast is spent
        if body.is_dragging() {
            body.take_pending();
            return;
        }

        if let Some(impulse) = body.take_pending() {
            body.unfreeze();
            body.vel += impulse.dv;
            let (idx, torque) = corner_torque(body, self.origin, &impulse);
            body.angular_vel += spin_sign(idx) * torque.abs() * IMPULSE_TORQUE_SCALE / body.inertia();
        }

        let offset = body.pos - self.origin;
        let dir = if dist > 0.0 { offset / dist } else { Vec2::ZERO };
        let pulse = WAVE_PULSE * self.strength
            / (dist + WAVE_PULSE_DIST_OFFSET).max(WAVE_PULSE_MIN_DIST)
            / body.mass();
        body.vel += dir * pulse;
        body.vel.y -= pulse.abs() * WAVE_LIFT;

        let (idx, _) = nearest_corner(body, self.origin);
        let kick =
            WAVE_KICK * self.strength * (WAVE_KICK_MIN + rng.random::<f32>() * WAVE_KICK_RANGE);
        body.angular_vel += spin_sign(idx) * kick;
    }

    /// Release bodies the front never reached: unfreeze them with their
    /// stored impulse only. Returns how many were released.
    pub fn release_stragglers<'a>(&mut self, bodies: impl IntoIterator<Item = &'a mut Body>) -> usize {
        let mut released = 0;
        for body in bodies {
            if body.removed || !self.applied.insert(body.id) {
                continue;
            }
            if let Some(impulse) = body.take_pending() {
                if !body.is_dragging() {
                    body.unfreeze();
                    body.vel += impulse.dv;
                }
            }
            released += 1;
        }
        if released > 0 {
            log::debug!("shockwave ended short of {} bodies, released them", released);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rect;
    use crate::platform::PointerSample;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn body_at(id: u32, center: Vec2) -> Body {
        Body::new(BodyId(id), Rect::from_center(center, Vec2::new(40.0, 20.0))).with_frozen(true)
    }

    #[test]
    fn test_impulse_points_away_from_origin() {
        let mut rng = Pcg32::seed_from_u64(1);
        let body = body_at(1, Vec2::new(500.0, 600.0));
        let impulse = pending_impulse(&body, Vec2::new(500.0, 500.0), 1.0, &mut rng);
        assert!((impulse.dir - Vec2::new(0.0, 1.0)).length() < 1e-6);
        assert!(impulse.dv.x.abs() < 1e-6);
        assert!(impulse.dv.y > 0.0);
    }

    #[test]
    fn test_impulse_magnitude_range() {
        let mut rng = Pcg32::seed_from_u64(9);
        let body = body_at(1, Vec2::new(600.0, 500.0));
        for _ in 0..100 {
            let impulse = pending_impulse(&body, Vec2::new(500.0, 500.0), 2.0, &mut rng);
            // (300..1200) * 2 * (0.85..1.15) / 100
            assert!(impulse.j >= 300.0 * 2.0 * 0.85 / 100.0 - 1e-3);
            assert!(impulse.j <= 1200.0 * 2.0 * 1.15 / 100.0 + 1e-3);
        }
    }

    #[test]
    fn test_impulse_at_origin_is_finite() {
        let mut rng = Pcg32::seed_from_u64(3);
        let body = body_at(1, Vec2::new(500.0, 500.0));
        let impulse = pending_impulse(&body, Vec2::new(500.0, 500.0), 5.5, &mut rng);
        assert!(impulse.dv.is_finite());
        assert_eq!(impulse.dir, Vec2::ZERO);
    }

    #[test]
    fn test_spin_rule() {
        assert_eq!(spin_sign(0), -1.0);
        assert_eq!(spin_sign(1), 1.0);
        assert_eq!(spin_sign(2), -1.0);
        assert_eq!(spin_sign(3), 1.0);

        let body = body_at(1, Vec2::new(100.0, 100.0));
        assert_eq!(nearest_corner(&body, Vec2::new(0.0, 0.0)).0, 0);
        assert_eq!(nearest_corner(&body, Vec2::new(200.0, 0.0)).0, 1);
        assert_eq!(nearest_corner(&body, Vec2::new(200.0, 200.0)).0, 2);
        assert_eq!(nearest_corner(&body, Vec2::new(0.0, 200.0)).0, 3);
    }

    #[test]
    fn test_wave_shape() {
        let wave = Shockwave::new(Vec2::ZERO, 5.5, Vec2::new(800.0, 600.0), 1000.0);
        assert!((wave.duration_ms - 1400.0).abs() < 1e-6);
        assert!((wave.max_radius - 800.0 * 1.2 * 2.5).abs() < 1e-3);
        assert_eq!(wave.front_radius(1000.0), 0.0);
        assert!((wave.band_thickness(1000.0) - 86.0).abs() < 1e-4);
        assert!((wave.band_thickness(2400.0) - 12.0).abs() < 1e-4);

        let weak = Shockwave::new(Vec2::ZERO, 1.0, Vec2::new(800.0, 600.0), 0.0);
        assert!((weak.duration_ms - 420.0).abs() < 1e-6);
        assert!((weak.max_radius - 480.0).abs() < 1e-3);
    }

    #[test]
    fn test_struck_once_and_unfrozen() {
        let mut rng = Pcg32::seed_from_u64(5);
        let origin = Vec2::new(400.0, 500.0);
        let mut bodies = vec![body_at(1, Vec2::new(400.0, 520.0)), body_at(2, Vec2::new(400.0, 100.0))];
        for body in &mut bodies {
            arm_body(body, origin, 5.5, &mut rng);
        }
        let mut wave = Shockwave::new(origin, 5.5, Vec2::new(800.0, 600.0), 0.0);

        let tick = wave.advance(0.0, bodies.iter_mut(), &mut rng);
        assert_eq!(tick.hits, 1);
        assert!(!tick.finished);
        assert!(wave.is_applied(BodyId(1)));
        assert!(!bodies[0].frozen);
        assert!(bodies[0].pending.is_none());
        assert!(bodies[1].frozen);

        // Same band again: no further effect on the struck body
        let snapshot = (bodies[0].vel, bodies[0].angular_vel);
        let tick = wave.advance(0.0, bodies.iter_mut(), &mut rng);
        assert_eq!(tick.hits, 0);
        assert_eq!(snapshot, (bodies[0].vel, bodies[0].angular_vel));
    }

    #[test]
    fn test_front_sweeps_every_body_in_range() {
        let mut rng = Pcg32::seed_from_u64(11);
        let origin = Vec2::new(400.0, 480.0);
        let mut bodies: Vec<Body> = (0..20)
            .map(|i| body_at(i, Vec2::new(20.0 + i as f32 * 38.0, 30.0 + (i % 5) as f32 * 100.0)))
            .collect();
        for body in &mut bodies {
            arm_body(body, origin, 5.5, &mut rng);
        }
        let mut wave = Shockwave::new(origin, 5.5, Vec2::new(800.0, 600.0), 0.0);

        let mut now = 0.0;
        loop {
            let tick = wave.advance(now, bodies.iter_mut(), &mut rng);
            if tick.finished {
                break;
            }
            now += 16.0;
        }
        assert_eq!(wave.applied_count(), 20);
        assert!(bodies.iter().all(|b| !b.frozen && b.pending.is_none()));
    }

    #[test]
    fn test_dragged_body_stays_held() {
        let mut rng = Pcg32::seed_from_u64(2);
        let origin = Vec2::new(400.0, 500.0);
        let mut body = body_at(1, Vec2::new(400.0, 510.0));
        arm_body(&mut body, origin, 5.5, &mut rng);
        body.begin_drag(PointerSample::new(400.0, 510.0, 0.0));

        let mut wave = Shockwave::new(origin, 5.5, Vec2::new(800.0, 600.0), 0.0);
        wave.advance(0.0, std::iter::once(&mut body), &mut rng);
        assert!(wave.is_applied(BodyId(1)));
        assert!(body.frozen);
        assert_eq!(body.vel, Vec2::ZERO);
        assert!(body.pending.is_none());
    }

    #[test]
    fn test_stragglers_released_after_wave() {
        let mut rng = Pcg32::seed_from_u64(4);
        let origin = Vec2::new(0.0, 0.0);
        let mut far = body_at(1, Vec2::new(5000.0, 0.0));
        arm_body(&mut far, origin, 1.0, &mut rng);
        let mut wave = Shockwave::new(origin, 1.0, Vec2::new(800.0, 600.0), 0.0);

        let tick = wave.advance(1000.0, std::iter::once(&mut far), &mut rng);
        assert!(tick.finished);
        assert!(far.frozen);

        assert_eq!(wave.release_stragglers(std::iter::once(&mut far)), 1);
        assert!(!far.frozen);
        assert!(far.vel.x > 0.0);
        assert_eq!(wave.release_stragglers(std::iter::once(&mut far)), 0);
    }
}
