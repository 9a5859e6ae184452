//! Culling Configuration
//!
//! Dispatch-time constants for both kernels. Values are plain data so they can
//! be persisted as JSON next to other renderer settings and tweaked without
//! touching code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{CullError, Result};

/// Default per-tile light capacity (K).
pub const MAX_VPLS_PER_TILE: u32 = 12;

/// Largest K the stack-allocated tile scratch can hold.
pub const MAX_TILE_CAPACITY: usize = 64;

/// Lights with a normalized distance ratio above this never influence a tile.
pub const MAX_RANGE_RATIO: f32 = 1.0;

/// Below this ratio a light is close enough that a shadow sample is taken.
pub const SHADOW_TEST_RATIO: f32 = 0.1;

/// Occlusion fraction above which a close light is treated as fully blocked.
pub const SHADOW_OCCLUSION_THRESHOLD: f32 = 0.5;

/// Concurrent invocations used by the visibility kernel's grid-stride loop.
pub const VISIBILITY_INVOCATIONS: u32 = 1024;

/// Configuration shared by the visibility and tiled VPL culling kernels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    /// Viewport width in pixels (one tile per pixel).
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Per-tile capacity K.
    pub max_vpls_per_tile: u32,
    /// Inclusive upper bound on distance / radius.
    pub max_range_ratio: f32,
    /// Ratio under which the stage-1 kernel samples shadows.
    pub shadow_test_ratio: f32,
    /// Occlusion fraction that rejects a close light.
    pub shadow_occlusion_threshold: f32,
    /// Total concurrent invocations (grid-stride step) for visibility culling.
    pub visibility_invocations: u32,
    /// Use `global * model` instead of `global` alone as the draw's transform.
    pub compose_model_transform: bool,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1920,
            viewport_height: 1080,
            max_vpls_per_tile: MAX_VPLS_PER_TILE,
            max_range_ratio: MAX_RANGE_RATIO,
            shadow_test_ratio: SHADOW_TEST_RATIO,
            shadow_occlusion_threshold: SHADOW_OCCLUSION_THRESHOLD,
            visibility_invocations: VISIBILITY_INVOCATIONS,
            compose_model_transform: false,
        }
    }
}

impl CullingConfig {
    /// Default config for the given viewport.
    pub fn for_viewport(width: u32, height: u32) -> Self {
        Self {
            viewport_width: width,
            viewport_height: height,
            ..Self::default()
        }
    }

    /// Set K and return self for chaining.
    pub fn with_max_vpls_per_tile(mut self, k: u32) -> Self {
        self.max_vpls_per_tile = k;
        self
    }

    /// Number of tiles (pixels) in the grid.
    pub fn tile_count(&self) -> usize {
        self.viewport_width as usize * self.viewport_height as usize
    }

    /// Per-tile capacity as a slot count.
    pub fn capacity(&self) -> usize {
        self.max_vpls_per_tile as usize
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize as pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the kernels cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(CullError::InvalidConfig(format!(
                "viewport must be non-zero, got {}x{}",
                self.viewport_width, self.viewport_height
            )));
        }
        if self.max_vpls_per_tile == 0 || self.capacity() > MAX_TILE_CAPACITY {
            return Err(CullError::InvalidConfig(format!(
                "max_vpls_per_tile must be in 1..={MAX_TILE_CAPACITY}, got {}",
                self.max_vpls_per_tile
            )));
        }
        if self.visibility_invocations == 0 {
            return Err(CullError::InvalidConfig(
                "visibility_invocations must be non-zero".to_string(),
            ));
        }
        let thresholds = [
            ("max_range_ratio", self.max_range_ratio),
            ("shadow_test_ratio", self.shadow_test_ratio),
            ("shadow_occlusion_threshold", self.shadow_occlusion_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(CullError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}
