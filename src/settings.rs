//! Explosion settings
//!
//! Persisted in LocalStorage on the web; defaults everywhere else.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Rect;
use crate::consts::*;
use crate::error::{ExplodeError, Result};
use crate::sim::{Arena, Material};

/// Blast parameters fixed for one explosion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blast {
    /// Page coordinates of the blast center
    pub origin: Vec2,
    pub strength: f32,
}

/// Explosion configuration surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplosionSettings {
    // === Blast ===
    /// Fixed blast strength; rolled around the default when unset
    pub blast_strength: Option<f32>,
    /// Fixed blast origin (page coordinates); near bottom-center when unset
    pub blast_origin: Option<Vec2>,

    // === Physics ===
    /// Bounciness off the viewport edges (0.0 - 1.0)
    pub restitution: f32,
    /// Tangential friction per contact (0.0 - 1.0)
    pub friction: f32,
    /// Downward acceleration (px / sim unit²)
    pub gravity: f32,

    // === Repair ===
    /// Max drop distance from the original center (px)
    pub repair_distance: f32,
    /// Delay before a repaired body's visual goes away (ms)
    pub removal_delay_ms: f32,

    // === Selection ===
    /// Elements smaller than this in either dimension stay put (px)
    pub min_element_size: f32,
    /// Element ids never exploded (control panels, the fireworks canvas)
    pub excluded_ids: Vec<String>,
    /// Tags never exploded
    pub excluded_tags: Vec<String>,

    /// RNG seed; taken from the clock when unset
    pub seed: Option<u64>,
}

impl Default for ExplosionSettings {
    fn default() -> Self {
        Self {
            blast_strength: None,
            blast_origin: None,

            restitution: RESTITUTION,
            friction: FRICTION,
            gravity: GRAVITY,

            repair_distance: REPAIR_DISTANCE,
            removal_delay_ms: REMOVAL_DELAY_MS as f32,

            min_element_size: MIN_ELEMENT_SIZE,
            excluded_ids: ["fw-panel", "fw", "dnp-panel", "dnp-button", "dnp-toggle", "controls-wrap"]
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_tags: ["script", "style", "canvas"]
                .into_iter()
                .map(String::from)
                .collect(),

            seed: None,
        }
    }
}

fn check(name: &'static str, value: f32, ok: bool) -> Result<()> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ExplodeError::InvalidSetting { name, value })
    }
}

impl ExplosionSettings {
    /// Settings with a fixed RNG seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if let Some(strength) = self.blast_strength {
            check("blast_strength", strength, strength >= 0.0)?;
        }
        if let Some(origin) = self.blast_origin {
            check("blast_origin.x", origin.x, true)?;
            check("blast_origin.y", origin.y, true)?;
        }
        check("restitution", self.restitution, (0.0..=1.0).contains(&self.restitution))?;
        check("friction", self.friction, (0.0..=1.0).contains(&self.friction))?;
        check("gravity", self.gravity, self.gravity >= 0.0)?;
        check("repair_distance", self.repair_distance, self.repair_distance >= 0.0)?;
        check("removal_delay_ms", self.removal_delay_ms, self.removal_delay_ms >= 0.0)?;
        check("min_element_size", self.min_element_size, self.min_element_size >= 0.0)?;
        Ok(())
    }

    /// Parse and validate; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Surface coefficients for the collision solver
    pub fn material(&self) -> Material {
        Material {
            gravity: self.gravity,
            restitution: self.restitution,
            friction: self.friction,
        }
    }

    /// Collision box for a page showing `viewport`
    pub fn arena(&self, viewport: Rect) -> Arena {
        Arena::new(viewport).with_material(self.material())
    }

    /// Whether an element is excluded by id or tag
    pub fn excludes(&self, tag: &str, dom_id: Option<&str>) -> bool {
        if self.excluded_tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return true;
        }
        dom_id.is_some_and(|id| self.excluded_ids.iter().any(|x| x == id))
    }

    /// Fix the blast for one explosion, rolling whatever is unset
    pub fn resolve_blast<R: Rng + ?Sized>(&self, viewport: Rect, rng: &mut R) -> Blast {
        let origin = self.blast_origin.unwrap_or_else(|| {
            let jitter_x = (rng.random::<f32>() * 2.0 - 1.0) * BLAST_ORIGIN_JITTER;
            let jitter_y = (rng.random::<f32>() * 2.0 - 1.0) * BLAST_ORIGIN_JITTER;
            viewport.min
                + Vec2::new(
                    viewport.width() * (BLAST_ORIGIN_X + jitter_x),
                    viewport.height() * (BLAST_ORIGIN_Y + jitter_y),
                )
        });
        let strength = self.blast_strength.unwrap_or_else(|| {
            let jitter = rng.random::<f32>() * 2.0 * BLAST_STRENGTH_JITTER - BLAST_STRENGTH_JITTER;
            BLAST_STRENGTH * (1.0 + jitter)
        });
        Blast { origin, strength }
    }

    /// LocalStorage key
    const STORAGE_KEY: &'static str = "dom_explode_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(settings) => {
                        log::info!("Loaded explosion settings from LocalStorage");
                        return settings;
                    }
                    Err(e) => log::warn!("Ignoring stored explosion settings: {}", e),
                }
            }
        }

        log::info!("Using default explosion settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            match self.to_json() {
                Ok(json) => {
                    let _ = storage.set_item(Self::STORAGE_KEY, &json);
                    log::info!("Explosion settings saved");
                }
                Err(e) => log::warn!("Could not serialize settings: {}", e),
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        log::debug!("No settings store on native ({}), using defaults", Self::STORAGE_KEY);
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_defaults_validate() {
        let settings = ExplosionSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.restitution, 0.6);
        assert_eq!(settings.repair_distance, 20.0);
        assert_eq!(settings.removal_delay_ms, 520.0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let settings = ExplosionSettings {
            restitution: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ExplodeError::InvalidSetting { name: "restitution", .. })
        ));

        let settings = ExplosionSettings {
            blast_strength: Some(f32::NAN),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = ExplosionSettings::from_json(r#"{"friction": 0.5, "seed": 42}"#).unwrap();
        assert_eq!(settings.friction, 0.5);
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.gravity, GRAVITY);
        assert!(settings.excluded_ids.iter().any(|id| id == "fw-panel"));

        let back = ExplosionSettings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            ExplosionSettings::from_json("{not json"),
            Err(ExplodeError::Settings(_))
        ));
        assert!(matches!(
            ExplosionSettings::from_json(r#"{"gravity": -1.0}"#),
            Err(ExplodeError::InvalidSetting { name: "gravity", .. })
        ));
    }

    #[test]
    fn test_resolve_blast_defaults_within_jitter() {
        let settings = ExplosionSettings::default();
        let viewport = Rect::new(0.0, 0.0, 1000.0, 800.0);
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..200 {
            let blast = settings.resolve_blast(viewport, &mut rng);
            assert!((400.0..=600.0).contains(&blast.origin.x));
            assert!((560.0..=720.0).contains(&blast.origin.y));
            assert!(blast.strength >= 5.5 * 0.875 - 1e-4);
            assert!(blast.strength <= 5.5 * 1.125 + 1e-4);
        }
    }

    #[test]
    fn test_resolve_blast_respects_fixed_values() {
        let settings = ExplosionSettings {
            blast_strength: Some(1.0),
            blast_origin: Some(Vec2::new(500.0, 500.0)),
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let blast = settings.resolve_blast(Rect::new(0.0, 0.0, 800.0, 600.0), &mut rng);
        assert_eq!(blast.origin, Vec2::new(500.0, 500.0));
        assert_eq!(blast.strength, 1.0);
    }

    #[test]
    fn test_exclusion_rules() {
        let settings = ExplosionSettings::default();
        assert!(settings.excludes("SCRIPT", None));
        assert!(settings.excludes("div", Some("fw-panel")));
        assert!(!settings.excludes("div", Some("content")));
        assert!(!settings.excludes("p", None));
    }
}
