//! Buffered playback configuration for an animation controller.

use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::clip::WrapMode;
use crate::error::{BindingError, Result};

/// Playback settings that stay valid while no evaluator exists and are
/// replayed onto each newly created evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub wrap_mode: WrapMode,
    pub speed: f32,
    pub enable_cull: bool,
    /// When set, `bounds` replaces the renderable's computed bounds.
    pub use_bounds: bool,
    /// Override box in the controller node's local space.
    pub bounds: Aabb,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            wrap_mode: WrapMode::Loop,
            speed: 1.0,
            enable_cull: true,
            use_bounds: false,
            bounds: Aabb::EMPTY,
        }
    }
}

impl ControllerConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: ControllerConfig = serde_json::from_str(s)?;
        if !cfg.speed.is_finite() {
            return Err(BindingError::InvalidSpeed(cfg.speed));
        }
        Ok(cfg)
    }
}
