//! DOM Explode - blast page elements into rigid bodies, then drag them home
//!
//! Core modules:
//! - `sim`: Rigid-body simulation (bodies, boundary collisions, settling, shockwave, repair graph)
//! - `explosion`: Orchestration (element selection, session state, frame loops)
//! - `platform`: Host abstraction (element tree, visuals, frame scheduling, browser bindings)
//! - `settings`: Configuration surface

pub mod error;
pub mod explosion;
pub mod platform;
pub mod settings;
pub mod sim;

pub use error::{ExplodeError, Result};
pub use explosion::{Explosion, ExplosionSession, TriggerReport};
pub use settings::{Blast, ExplosionSettings};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Simulation tuning constants
pub mod consts {
    use std::f32::consts::PI;

    /// Mass per square pixel of body area
    pub const MASS_PER_AREA: f32 = 0.0008;
    pub const MIN_MASS: f32 = 0.05;
    pub const MIN_INERTIA: f32 = 1e-4;

    /// Gravity (pixels per sim unit², positive Y is down)
    pub const GRAVITY: f32 = 1.2;
    pub const RESTITUTION: f32 = 0.6;
    pub const FRICTION: f32 = 0.22;

    /// Linear damping base, raised to dt each step
    pub const LINEAR_DAMPING: f32 = 0.995;
    /// Flat angular damping factor applied once per step
    pub const ANGULAR_DAMPING: f32 = 0.92;
    /// Per-axis linear speed clamp
    pub const MAX_LINEAR_SPEED: f32 = 5000.0;
    /// Angular speed clamp (~360°)
    pub const MAX_ANGULAR_SPEED: f32 = 6.28;

    /// Penetration allowed before positional correction kicks in
    pub const CONTACT_SLOP: f32 = 0.5;
    /// Fraction of the excess penetration corrected per contact
    pub const POSITION_CORRECTION: f32 = 0.5;
    /// Extra angular response on closing contacts so corner hits topple
    pub const TOPPLE_AMPLIFY: f32 = 1.1;

    /// Settling thresholds
    pub const SETTLE_LINEAR_SPEED: f32 = 1.0;
    pub const SETTLE_ANGULAR_SPEED: f32 = 0.02;
    pub const SETTLE_ANGLE_TOLERANCE: f32 = 0.35;
    /// Distance from the floor at which a corner counts as touching
    pub const SETTLE_CONTACT_BAND: f32 = 1.5;

    /// Drag rotation toward upright (radians per second)
    pub const DRAG_ROTATE_SPEED: f32 = PI / 2.0;
    /// Pointer history window for release velocity (ms)
    pub const DRAG_VELOCITY_WINDOW_MS: f64 = 500.0;
    /// Pixels/sec of pointer motion to sim velocity
    pub const DRAG_RELEASE_SCALE: f32 = 0.02;
    /// Pointer travel before a drag counts as a move (for click suppression)
    pub const DRAG_MOVE_THRESHOLD: f32 = 4.0;
    /// Clicks within this long after a release are swallowed (ms)
    pub const CLICK_SUPPRESS_MS: f64 = 120.0;
    /// Hold time before the repair hint outline appears (ms)
    pub const REPAIR_HINT_DELAY_MS: f64 = 2000.0;

    /// Repair snap distance (px)
    pub const REPAIR_DISTANCE: f32 = 20.0;
    /// Delay before a repaired body's visual is detached (ms)
    pub const REMOVAL_DELAY_MS: f64 = 520.0;
    /// Elements smaller than this in either dimension are ignored (px)
    pub const MIN_ELEMENT_SIZE: f32 = 4.0;

    /// Frame clamp (ms) to avoid spikes after tab suspension
    pub const FRAME_MIN_MS: f64 = 8.0;
    pub const FRAME_MAX_MS: f64 = 40.0;
    /// Wall-clock ms to simulation units (1.0 ≈ one 60 Hz frame)
    pub const SIM_UNITS_PER_MS: f32 = 0.06;

    /// Blast defaults
    pub const BLAST_STRENGTH: f32 = 5.5;
    pub const BLAST_STRENGTH_JITTER: f32 = 0.125;
    pub const BLAST_ORIGIN_X: f32 = 0.5;
    pub const BLAST_ORIGIN_Y: f32 = 0.8;
    pub const BLAST_ORIGIN_JITTER: f32 = 0.1;

    /// Initial impulse: base magnitude range and per-body jitter
    pub const IMPULSE_BASE_MIN: f32 = 300.0;
    pub const IMPULSE_BASE_RANGE: f32 = 900.0;
    pub const IMPULSE_JITTER_MIN: f32 = 0.85;
    pub const IMPULSE_JITTER_RANGE: f32 = 0.3;
    /// Distance floor for the inverse-distance falloff (px)
    pub const IMPULSE_MIN_DISTANCE: f32 = 8.0;
    /// Stored impulse torque scale
    pub const IMPULSE_TORQUE_SCALE: f32 = 0.02;
    /// Random angular velocity given to fresh bodies (±half)
    pub const SPAWN_SPIN_JITTER: f32 = 0.02;

    /// Shockwave timing and shape
    pub const WAVE_MS_PER_STRENGTH: f32 = 260.0;
    pub const WAVE_MIN_DURATION_MS: f32 = 420.0;
    pub const WAVE_MAX_DURATION_MS: f32 = 1400.0;
    pub const WAVE_RADIUS_FACTOR: f32 = 1.2;
    pub const WAVE_MAX_RADIUS_SCALE: f32 = 2.5;
    pub const WAVE_BAND_MIN: f32 = 12.0;
    pub const WAVE_BAND_START: f32 = 80.0;
    pub const WAVE_BAND_TAIL: f32 = 6.0;
    /// Pulse magnitude = PULSE * strength / max(PULSE_MIN_DIST, d + PULSE_DIST_OFFSET)
    pub const WAVE_PULSE: f32 = 1200.0;
    pub const WAVE_PULSE_MIN_DIST: f32 = 12.0;
    pub const WAVE_PULSE_DIST_OFFSET: f32 = 20.0;
    /// Upward share of the pulse
    pub const WAVE_LIFT: f32 = 0.08;
    /// Angular kick = KICK * strength * U(KICK_MIN, KICK_MIN + KICK_RANGE)
    pub const WAVE_KICK: f32 = 0.03;
    pub const WAVE_KICK_MIN: f32 = 0.6;
    pub const WAVE_KICK_RANGE: f32 = 0.8;
}

/// Normalize an angle to (-π, π]
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid maps the top of the range onto -π
    if a <= -PI {
        a += TAU;
    }
    a
}

/// Signed shortest rotation taking `from` to `to`
#[inline]
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    normalize_angle(to - from)
}

/// Axis-aligned rectangle in page coordinates (Y down)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner
    pub min: Vec2,
    /// Width and height
    pub size: Vec2,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            size: Vec2::new(width, height),
        }
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        self.min + self.size
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.min + self.size * 0.5
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.size.is_finite()
    }

    /// Rectangle of the given size centered on `center`
    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        Self {
            min: center - size * 0.5,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_normalize_angle_range() {
        assert!((normalize_angle(0.0)).abs() < 1e-6);
        assert!((normalize_angle(PI) - PI).abs() < 1e-6);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-6);
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((normalize_angle(PI / 2.0 + 2.0 * PI) - PI / 2.0).abs() < 1e-5);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
    }

    #[test]
    fn test_shortest_angle_delta_wraps() {
        let d = shortest_angle_delta(PI - 0.1, -PI + 0.1);
        assert!((d - 0.2).abs() < 1e-5);
        let d = shortest_angle_delta(0.5, 0.0);
        assert!((d + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rect_geometry() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(r.center(), Vec2::new(60.0, 45.0));
        assert_eq!(r.max(), Vec2::new(110.0, 70.0));
        assert_eq!(Rect::from_center(r.center(), r.size), r);
    }
}
