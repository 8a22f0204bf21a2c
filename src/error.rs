//! Error types
//!
//! Per-element host failures are reported with these and then swallowed by the
//! orchestrator; nothing in the simulation core is fatal to the caller.

use thiserror::Error;

use crate::platform::ElementId;

/// Result type alias for explosion operations
pub type Result<T> = std::result::Result<T, ExplodeError>;

#[derive(Error, Debug)]
pub enum ExplodeError {
    /// Element vanished from the host tree
    #[error("element {0} is no longer attached")]
    Detached(ElementId),

    /// Bounding-box query failed or returned garbage
    #[error("geometry query failed for element {element}: {reason}")]
    Geometry { element: ElementId, reason: String },

    /// Computed-style query failed
    #[error("style query failed for element {element}: {reason}")]
    Style { element: ElementId, reason: String },

    /// Clone / style copy into a detached visual failed
    #[error("snapshot failed for element {element}: {reason}")]
    Snapshot { element: ElementId, reason: String },

    /// Configuration value out of range
    #[error("invalid setting {name}: {value}")]
    InvalidSetting { name: &'static str, value: f32 },

    /// Configuration JSON could not be parsed
    #[error("settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}
