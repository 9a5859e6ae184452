//! Virtual Point Light Arrays
//!
//! Lights are addressed by integer index into parallel arrays, the same
//! structure-of-arrays layout the GPU binds as separate storage buffers:
//!
//! | Array     | Element      | Bytes | Notes                          |
//! |-----------|--------------|-------|--------------------------------|
//! | positions | `vec4<f32>`  | 16    | World space, w = 1             |
//! | radii     | `f32`        | 4     | Effective influence distance   |
//! | colors    | `vec4<f32>`  | 16    | Only its magnitude is consumed |
//!
//! A separate, order-preserving candidate list names the lights already known
//! to be visible this frame.

use glam::{Vec3, Vec4};

use super::error::{CullError, Result};

/// Lower bound applied to every VPL's derived radius.
pub const MIN_VPL_RADIUS: f32 = 500.0;

/// Color components are clamped to this after intensity scaling.
pub const MAX_LIGHT_COLOR: f32 = 10000.0;

/// Light brightness below which the radius calculation treats a light as dark.
const LIGHT_MIN: f32 = 256.0 / 5.0;

/// Effective radius of a VPL from its intensity-scaled color.
///
/// `radius = sqrt(Imax * 256/5 - 1) * 2`, where `Imax` is the largest channel
/// after clamping to `[0, MAX_LIGHT_COLOR]`, never below `MIN_VPL_RADIUS`.
pub fn vpl_radius_from_color(color: Vec3) -> f32 {
    let clamped = color.clamp(Vec3::ZERO, Vec3::splat(MAX_LIGHT_COLOR));
    let derived = (clamped.max_element() * LIGHT_MIN - 1.0).max(0.0).sqrt() * 2.0;
    derived.max(MIN_VPL_RADIUS)
}

/// Per-frame VPL arrays. Immutable while a kernel runs.
#[derive(Clone, Debug, Default)]
pub struct VplLights {
    pub positions: Vec<Vec4>,
    pub radii: Vec<f32>,
    pub colors: Vec<Vec4>,
}

impl VplLights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    /// Append a light and return its index.
    pub fn push(&mut self, position: Vec3, radius: f32, color: Vec3) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position.extend(1.0));
        self.radii.push(radius);
        self.colors.push(color.extend(1.0));
        index
    }

    /// Append a light whose radius is derived from its color.
    pub fn push_with_derived_radius(&mut self, position: Vec3, color: Vec3) -> u32 {
        self.push(position, vpl_radius_from_color(color), color)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn position(&self, index: u32) -> Vec3 {
        self.positions[index as usize].truncate()
    }

    #[inline]
    pub fn radius(&self, index: u32) -> f32 {
        self.radii[index as usize]
    }

    /// Scalar intensity magnitude (length of the homogeneous color).
    #[inline]
    pub fn intensity(&self, index: u32) -> f32 {
        self.colors[index as usize].length()
    }

    /// Check the three arrays are index-aligned.
    pub fn validate(&self) -> Result<()> {
        CullError::check_len("vpl radii", self.positions.len(), self.radii.len())?;
        CullError::check_len("vpl colors", self.positions.len(), self.colors.len())
    }

    pub fn positions_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn radii_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.radii)
    }

    pub fn colors_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }
}

/// Compacted list of lights visible this frame, in upstream order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibleVplList {
    pub indices: Vec<u32>,
}

impl VisibleVplList {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    /// Every light in `lights`, in index order.
    pub fn all(lights: &VplLights) -> Self {
        Self::new((0..lights.len() as u32).collect())
    }

    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Reject candidates that point past the light arrays.
    pub fn validate_against(&self, lights: &VplLights) -> Result<()> {
        match self.indices.iter().find(|&&i| i as usize >= lights.len()) {
            Some(&index) => Err(CullError::LightIndexOutOfRange {
                index,
                light_count: lights.len(),
            }),
            None => Ok(()),
        }
    }

    pub fn indices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_arrays_aligned() {
        let mut lights = VplLights::new();
        assert_eq!(lights.push(Vec3::new(1.0, 2.0, 3.0), 4.0, Vec3::ONE), 0);
        assert_eq!(lights.push(Vec3::ZERO, 8.0, Vec3::X), 1);
        assert_eq!(lights.len(), 2);
        assert!(lights.validate().is_ok());
        assert_eq!(lights.position(0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(lights.radius(1), 8.0);
        assert_eq!(lights.positions_bytes().len(), 32);
    }

    #[test]
    fn test_intensity_is_color_magnitude() {
        let mut lights = VplLights::new();
        lights.colors.push(Vec4::new(3.0, 4.0, 0.0, 0.0));
        lights.positions.push(Vec4::W);
        lights.radii.push(1.0);
        assert_eq!(lights.intensity(0), 5.0);
    }

    #[test]
    fn test_validate_detects_misaligned_arrays() {
        let mut lights = VplLights::new();
        lights.push(Vec3::ZERO, 1.0, Vec3::ONE);
        lights.radii.pop();
        assert!(lights.validate().is_err());
    }

    #[test]
    fn test_radius_floor() {
        assert_eq!(vpl_radius_from_color(Vec3::ZERO), MIN_VPL_RADIUS);
        assert_eq!(vpl_radius_from_color(Vec3::splat(10.0)), MIN_VPL_RADIUS);
    }

    #[test]
    fn test_radius_from_bright_color() {
        let color = Vec3::new(5000.0, 10.0, 10.0);
        let expected = (5000.0f32 * 256.0 / 5.0 - 1.0).sqrt() * 2.0;
        assert!((vpl_radius_from_color(color) - expected).abs() < 1e-2);
        assert!(expected > MIN_VPL_RADIUS);
    }

    #[test]
    fn test_radius_clamps_overbright() {
        assert_eq!(
            vpl_radius_from_color(Vec3::splat(1.0e9)),
            vpl_radius_from_color(Vec3::splat(MAX_LIGHT_COLOR))
        );
    }

    #[test]
    fn test_visible_list_validation() {
        let mut lights = VplLights::new();
        lights.push(Vec3::ZERO, 1.0, Vec3::ONE);
        assert!(VisibleVplList::all(&lights).validate_against(&lights).is_ok());
        let bad = VisibleVplList::new(vec![0, 3]);
        assert!(matches!(
            bad.validate_against(&lights),
            Err(CullError::LightIndexOutOfRange { index: 3, light_count: 1 })
        ));
    }
}
