//! Rest detection
//!
//! A body lying almost flat on the floor with almost no motion is snapped to
//! an exact flat pose and taken out of the simulation. Without this, resting
//! bodies jitter forever as gravity and the floor impulse fight each other.

use std::f32::consts::PI;

use super::body::Body;
use super::collision::Arena;
use crate::consts::*;
use crate::normalize_angle;

/// Nearest multiple of π (the two "flat" orientations of a rectangle)
#[inline]
pub fn nearest_flat_angle(angle: f32) -> f32 {
    (angle / PI).round() * PI
}

/// Absolute angular distance to the nearest flat orientation
#[inline]
pub fn flat_deviation(angle: f32) -> f32 {
    normalize_angle(angle - nearest_flat_angle(angle)).abs()
}

/// Whether any corner is within the contact band of the floor
pub fn touches_floor(body: &Body, arena: &Arena) -> bool {
    let floor = arena.floor();
    body.corners()
        .iter()
        .any(|c| c.y >= floor - SETTLE_CONTACT_BAND)
}

/// Settle the body if it is resting flat on the floor.
///
/// Returns true when the body was settled by this call.
pub fn try_settle(body: &mut Body, arena: &Arena) -> bool {
    if body.settled {
        return false;
    }
    if !touches_floor(body, arena) {
        return false;
    }
    if body.vel.length() >= SETTLE_LINEAR_SPEED || body.angular_vel.abs() >= SETTLE_ANGULAR_SPEED {
        return false;
    }
    if flat_deviation(body.angle) >= SETTLE_ANGLE_TOLERANCE {
        return false;
    }

    body.angle = normalize_angle(nearest_flat_angle(body.angle));
    body.vel = glam::Vec2::ZERO;
    body.angular_vel = 0.0;

    // Drop (or lift) so the lowest corner sits exactly on the floor
    let lowest = body
        .corners()
        .iter()
        .fold(f32::NEG_INFINITY, |acc, c| acc.max(c.y));
    body.pos.y += arena.floor() - lowest;

    body.settled = true;
    log::trace!("body {} settled at {:?}", body.id, body.pos);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rect;
    use crate::sim::BodyId;
    use glam::Vec2;

    fn arena() -> Arena {
        Arena::new(Rect::new(0.0, 0.0, 800.0, 600.0))
    }

    fn resting_body(angle: f32) -> Body {
        let mut body = Body::new(BodyId(1), Rect::new(350.0, 549.5, 100.0, 50.0));
        body.angle = angle;
        body.vel = Vec2::new(0.3, 0.2);
        body.angular_vel = 0.01;
        body
    }

    #[test]
    fn test_flat_angles() {
        assert_eq!(nearest_flat_angle(0.2), 0.0);
        assert!((nearest_flat_angle(2.9) - PI).abs() < 1e-6);
        assert!((nearest_flat_angle(-3.0) + PI).abs() < 1e-6);
        assert!((flat_deviation(PI - 0.1) - 0.1).abs() < 1e-5);
        assert!((flat_deviation(PI / 2.0) - PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_settles_and_snaps_to_floor() {
        let arena = arena();
        let mut body = resting_body(0.1);
        assert!(try_settle(&mut body, &arena));
        assert!(body.settled);
        assert_eq!(body.angle, 0.0);
        assert_eq!(body.vel, Vec2::ZERO);
        assert_eq!(body.angular_vel, 0.0);
        let lowest = body.corners().iter().fold(f32::MIN, |a, c| a.max(c.y));
        assert!((lowest - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_upside_down_snaps_to_pi() {
        let arena = arena();
        let mut body = resting_body(-3.0);
        assert!(try_settle(&mut body, &arena));
        assert!((body.angle.abs() - PI).abs() < 1e-6);
        assert!(body.angle > 0.0);
    }

    #[test]
    fn test_does_not_settle_on_edge_or_while_moving() {
        let arena = arena();

        let mut on_edge = resting_body(PI / 2.0);
        assert!(!try_settle(&mut on_edge, &arena));

        let mut fast = resting_body(0.0);
        fast.vel = Vec2::new(0.0, 2.0);
        assert!(!try_settle(&mut fast, &arena));

        let mut spinning = resting_body(0.0);
        spinning.angular_vel = 0.05;
        assert!(!try_settle(&mut spinning, &arena));

        let mut airborne = resting_body(0.0);
        airborne.pos.y = 300.0;
        assert!(!try_settle(&mut airborne, &arena));
    }
}
