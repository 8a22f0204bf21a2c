//! Boundary collision detection and impulse response
//!
//! Bodies only ever collide with the four viewport planes. Each rectangle
//! corner is tested on its own so that a corner landing first produces a
//! lever-arm torque and the body topples instead of bouncing flat.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::Rect;
use crate::consts::*;

/// Surface response coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Downward acceleration (px / sim unit²)
    pub gravity: f32,
    /// Bounciness (0 = dead stop, 1 = elastic)
    pub restitution: f32,
    /// Share of tangential velocity removed per contact
    pub friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            restitution: RESTITUTION,
            friction: FRICTION,
        }
    }
}

/// The box bodies live in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub bounds: Rect,
    pub material: Material,
}

impl Arena {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            material: Material::default(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Y coordinate of the floor
    #[inline]
    pub fn floor(&self) -> f32 {
        self.bounds.max().y
    }
}

/// A corner poking through a boundary plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// The offending corner
    pub point: Vec2,
    /// Plane normal pointing back into the arena
    pub normal: Vec2,
    /// How far past the plane the corner is
    pub penetration: f32,
}

/// Collect a contact for every corner outside the arena.
///
/// A corner past two planes (outside a viewport corner) yields two contacts,
/// one per plane.
pub fn boundary_contacts(corners: &[Vec2; 4], bounds: &Rect) -> Vec<Contact> {
    let min = bounds.min;
    let max = bounds.max();
    let mut contacts = Vec::new();

    for &p in corners {
        if p.x < min.x {
            contacts.push(Contact {
                point: p,
                normal: Vec2::X,
                penetration: min.x - p.x,
            });
        } else if p.x > max.x {
            contacts.push(Contact {
                point: p,
                normal: Vec2::NEG_X,
                penetration: p.x - max.x,
            });
        }

        if p.y < min.y {
            contacts.push(Contact {
                point: p,
                normal: Vec2::Y,
                penetration: min.y - p.y,
            });
        } else if p.y > max.y {
            contacts.push(Contact {
                point: p,
                normal: Vec2::NEG_Y,
                penetration: p.y - max.y,
            });
        }
    }

    contacts
}

/// Velocity of a point on a rotating body: v + ω × r
#[inline]
pub fn point_velocity(vel: Vec2, angular_vel: f32, r: Vec2) -> Vec2 {
    vel + angular_vel * r.perp()
}

/// Result of resolving one contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResponse {
    /// Positional push out of the plane
    pub correction: Vec2,
    /// Linear velocity after impulse and friction
    pub vel: Vec2,
    /// Angular velocity after impulse
    pub angular_vel: f32,
    /// Normal impulse magnitude (0 when the contact was separating)
    pub impulse: f32,
}

/// Resolve a single contact against a body at `center`.
///
/// Only a share of the penetration is corrected so resting corners are not
/// forced upright. The restitution impulse only applies while the contact
/// point is closing on the plane; friction always applies.
pub fn resolve_contact(
    contact: &Contact,
    center: Vec2,
    vel: Vec2,
    angular_vel: f32,
    mass: f32,
    inertia: f32,
    material: &Material,
) -> ContactResponse {
    let n = contact.normal;
    let r = contact.point - center;
    let vn = point_velocity(vel, angular_vel, r).dot(n);

    let correction = n * (contact.penetration - CONTACT_SLOP).max(0.0) * POSITION_CORRECTION;

    let mut vel = vel;
    let mut angular_vel = angular_vel;
    let mut impulse = 0.0;

    if vn < 0.0 {
        let r_cross_n = r.perp_dot(n);
        let inv_mass = 1.0 / mass + (r_cross_n * r_cross_n) / inertia;
        impulse = if inv_mass > 1e-12 {
            -(1.0 + material.restitution) * vn / inv_mass
        } else {
            0.0
        };

        vel += n * impulse / mass;
        let torque = r.perp_dot(n * impulse);
        angular_vel += torque * TOPPLE_AMPLIFY / inertia;
    }

    // Tangential friction on the linear velocity
    let tangent = n.perp();
    let vt = vel.dot(tangent);
    vel -= tangent * vt * material.friction;

    ContactResponse {
        correction,
        vel,
        angular_vel,
        impulse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Rect {
        Rect::new(0.0, 0.0, 800.0, 600.0)
    }

    #[test]
    fn test_no_contacts_inside() {
        let corners = [
            Vec2::new(10.0, 10.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(20.0, 20.0),
            Vec2::new(10.0, 20.0),
        ];
        assert!(boundary_contacts(&corners, &bounds()).is_empty());
    }

    #[test]
    fn test_floor_contact_normal_points_up() {
        let corners = [
            Vec2::new(10.0, 590.0),
            Vec2::new(20.0, 590.0),
            Vec2::new(20.0, 603.0),
            Vec2::new(10.0, 601.0),
        ];
        let contacts = boundary_contacts(&corners, &bounds());
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].normal, Vec2::NEG_Y);
        assert!((contacts[0].penetration - 3.0).abs() < 1e-4);
        assert!((contacts[1].penetration - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_corner_outside_two_planes() {
        let corners = [
            Vec2::new(-2.0, -3.0),
            Vec2::new(20.0, 10.0),
            Vec2::new(20.0, 20.0),
            Vec2::new(10.0, 20.0),
        ];
        let contacts = boundary_contacts(&corners, &bounds());
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].normal, Vec2::X);
        assert_eq!(contacts[1].normal, Vec2::Y);
    }

    #[test]
    fn test_point_velocity_includes_rotation() {
        // Spinning clockwise on screen (positive angle, Y down) moves +X arm downward
        let v = point_velocity(Vec2::ZERO, 2.0, Vec2::new(10.0, 0.0));
        assert!((v - Vec2::new(0.0, 20.0)).length() < 1e-5);
    }

    #[test]
    fn test_head_on_contact_bounces_with_restitution() {
        // Contact directly below center: no lever arm, pure linear bounce
        let contact = Contact {
            point: Vec2::new(100.0, 610.0),
            normal: Vec2::NEG_Y,
            penetration: 10.0,
        };
        let material = Material::default();
        let response = resolve_contact(
            &contact,
            Vec2::new(100.0, 585.0),
            Vec2::new(0.0, 5.0),
            0.0,
            4.0,
            100.0,
            &material,
        );
        assert!((response.vel.y - (-3.0)).abs() < 1e-4);
        assert!(response.angular_vel.abs() < 1e-6);
        assert!((response.correction.y - (-4.75)).abs() < 1e-5);
        assert!(response.impulse > 0.0);
    }

    #[test]
    fn test_separating_contact_only_gets_friction() {
        let contact = Contact {
            point: Vec2::new(50.0, 601.0),
            normal: Vec2::NEG_Y,
            penetration: 1.0,
        };
        let response = resolve_contact(
            &contact,
            Vec2::new(100.0, 576.0),
            Vec2::new(10.0, -5.0),
            0.0,
            4.0,
            4000.0,
            &Material::default(),
        );
        assert_eq!(response.impulse, 0.0);
        assert!((response.vel.y - (-5.0)).abs() < 1e-5);
        assert!((response.vel.x - 10.0 * (1.0 - FRICTION)).abs() < 1e-4);
        assert!((response.correction.y - (-0.25)).abs() < 1e-6);
    }

    #[test]
    fn test_off_center_contact_induces_spin() {
        // Left corner lands first: pushes the left side up, body rolls
        let contact = Contact {
            point: Vec2::new(50.0, 601.0),
            normal: Vec2::NEG_Y,
            penetration: 1.0,
        };
        let response = resolve_contact(
            &contact,
            Vec2::new(100.0, 576.0),
            Vec2::new(0.0, 5.0),
            0.0,
            4.0,
            4166.7,
            &Material::default(),
        );
        assert!(response.angular_vel > 0.0);
        assert!(response.vel.y < 5.0);
    }
}
