//! Rigid-body simulation module
//!
//! Everything here is host-agnostic and deterministic given a seeded RNG:
//! - Bodies step on a caller-supplied dt; no clocks are read
//! - Randomness comes in through `&mut impl Rng`
//! - No rendering or platform dependencies beyond element ids

pub mod body;
pub mod collision;
pub mod repair;
pub mod settle;
pub mod shockwave;

pub use body::{Body, BodyId, PendingImpulse, ReleaseOutcome, RepairAnchor};
pub use collision::{Arena, Contact, ContactResponse, Material, boundary_contacts, resolve_contact};
pub use repair::{NodeRole, NodeState, RepairGraph};
pub use settle::{nearest_flat_angle, touches_floor, try_settle};
pub use shockwave::{Shockwave, WaveTick, arm_body, nearest_corner, pending_impulse, spin_sign};
