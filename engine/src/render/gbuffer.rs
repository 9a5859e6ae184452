//! Surface and Shadow Sampling Capabilities
//!
//! The tiled VPL kernel only needs three lookups from the outside world:
//! a surface position, a surface normal, and a single shadow sample. They are
//! expressed as traits so the selection core never depends on image or
//! texture machinery.
//!
//! [`GBuffer`] is the CPU-side implementation: two RGBA32F images sampled with
//! nearest filtering and clamp-to-edge addressing. Normals are stored encoded
//! in `[0, 1]` exactly like the G-buffer render target and decoded on sample.

use glam::{Vec2, Vec3, Vec4};

use super::error::{CullError, Result};

/// Position and normal lookups at a normalized screen coordinate.
pub trait SurfaceSampler: Sync {
    /// World-space surface position.
    fn sample_position(&self, tex_coords: Vec2) -> Vec3;

    /// World-space unit normal, already decoded to `[-1, 1]`.
    fn sample_normal(&self, tex_coords: Vec2) -> Vec3;
}

/// One cheap shadow sample.
pub trait ShadowSampler: Sync {
    /// Occlusion fraction in `[0, 1]` of `surface_pos` as seen from light
    /// `light`. `facing_dot` is `dot(light_pos - surface_pos, normal)`.
    fn sample_shadow_occlusion(
        &self,
        light: u32,
        radius: f32,
        surface_pos: Vec3,
        light_pos: Vec3,
        facing_dot: f32,
    ) -> f32;
}

/// Shadow sampler for scenes without shadow maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unshadowed;

impl ShadowSampler for Unshadowed {
    fn sample_shadow_occlusion(&self, _: u32, _: f32, _: Vec3, _: Vec3, _: f32) -> f32 {
        0.0
    }
}

impl<F> ShadowSampler for F
where
    F: Fn(u32, f32, Vec3, Vec3, f32) -> f32 + Sync,
{
    fn sample_shadow_occlusion(
        &self,
        light: u32,
        radius: f32,
        surface_pos: Vec3,
        light_pos: Vec3,
        facing_dot: f32,
    ) -> f32 {
        self(light, radius, surface_pos, light_pos, facing_dot)
    }
}

/// Map a stored normal from `[0, 1]` to a unit vector in `[-1, 1]`.
#[inline]
pub fn decode_normal(encoded: Vec3) -> Vec3 {
    (encoded * 2.0 - Vec3::ONE).normalize_or_zero()
}

/// Inverse of [`decode_normal`] for writing G-buffer normals.
#[inline]
pub fn encode_normal(normal: Vec3) -> Vec3 {
    normal.normalize_or_zero() * 0.5 + Vec3::splat(0.5)
}

/// Normalized coordinate at the center of pixel `(x, y)`.
#[inline]
pub fn tile_tex_coords(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    (Vec2::new(x as f32, y as f32) + Vec2::splat(0.5)) / Vec2::new(width as f32, height as f32)
}

/// CPU G-buffer holding world positions and encoded normals.
#[derive(Clone, Debug)]
pub struct GBuffer {
    width: u32,
    height: u32,
    positions: Vec<[f32; 4]>,
    normals: Vec<[f32; 4]>,
}

impl GBuffer {
    /// A `width × height` buffer with every texel at the origin facing +Y.
    pub fn new(width: u32, height: u32) -> Self {
        let texels = width as usize * height as usize;
        let up = encode_normal(Vec3::Y).extend(1.0).to_array();
        Self {
            width,
            height,
            positions: vec![[0.0, 0.0, 0.0, 1.0]; texels],
            normals: vec![up; texels],
        }
    }

    /// Wrap existing texel data (`normals` already encoded).
    pub fn from_texels(
        width: u32,
        height: u32,
        positions: Vec<[f32; 4]>,
        normals: Vec<[f32; 4]>,
    ) -> Result<Self> {
        let texels = width as usize * height as usize;
        CullError::check_len("gbuffer positions", texels, positions.len())?;
        CullError::check_len("gbuffer normals", texels, normals.len())?;
        Ok(Self {
            width,
            height,
            positions,
            normals,
        })
    }

    /// Fill every texel from a per-pixel closure returning `(position, normal)`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> (Vec3, Vec3)) -> Self {
        let mut gbuffer = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let (position, normal) = f(x, y);
                gbuffer.write(x, y, position, normal);
            }
        }
        gbuffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Store a texel; `normal` is given decoded and stored encoded.
    pub fn write(&mut self, x: u32, y: u32, position: Vec3, normal: Vec3) {
        let i = self.texel_index(x, y);
        self.positions[i] = position.extend(1.0).to_array();
        self.normals[i] = encode_normal(normal).extend(1.0).to_array();
    }

    /// Raw position texels (RGBA32F rows, top to bottom).
    pub fn position_texels(&self) -> &[[f32; 4]] {
        &self.positions
    }

    /// Raw encoded normal texels.
    pub fn normal_texels(&self) -> &[[f32; 4]] {
        &self.normals
    }

    #[inline]
    fn texel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Nearest texel for a normalized coordinate, clamped to the edge.
    #[inline]
    fn nearest(&self, tex_coords: Vec2) -> usize {
        let size = Vec2::new(self.width as f32, self.height as f32);
        let texel = (tex_coords * size).floor();
        let x = (texel.x.max(0.0) as u32).min(self.width.saturating_sub(1));
        let y = (texel.y.max(0.0) as u32).min(self.height.saturating_sub(1));
        self.texel_index(x, y)
    }
}

impl SurfaceSampler for GBuffer {
    fn sample_position(&self, tex_coords: Vec2) -> Vec3 {
        Vec4::from_array(self.positions[self.nearest(tex_coords)]).truncate()
    }

    fn sample_normal(&self, tex_coords: Vec2) -> Vec3 {
        decode_normal(Vec4::from_array(self.normals[self.nearest(tex_coords)]).truncate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_normal_maps_range() {
        assert_eq!(decode_normal(Vec3::new(0.5, 1.0, 0.5)), Vec3::Y);
        assert_eq!(decode_normal(Vec3::new(0.0, 0.5, 0.5)), Vec3::NEG_X);
    }

    #[test]
    fn test_decode_normal_renormalizes() {
        let n = decode_normal(Vec3::new(1.0, 1.0, 0.5));
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_encode_decode_inverse() {
        let n = Vec3::new(0.3, -0.8, 0.52).normalize();
        assert!((decode_normal(encode_normal(n)) - n).length() < 1e-5);
    }

    #[test]
    fn test_tile_tex_coords_pixel_center() {
        assert_eq!(tile_tex_coords(0, 0, 4, 2), Vec2::new(0.125, 0.25));
        assert_eq!(tile_tex_coords(3, 1, 4, 2), Vec2::new(0.875, 0.75));
    }

    #[test]
    fn test_gbuffer_samples_pixel_centers() {
        let gbuffer = GBuffer::from_fn(3, 2, |x, y| {
            (Vec3::new(x as f32, y as f32, 0.0), Vec3::Z)
        });
        for y in 0..2 {
            for x in 0..3 {
                let uv = tile_tex_coords(x, y, 3, 2);
                assert_eq!(gbuffer.sample_position(uv), Vec3::new(x as f32, y as f32, 0.0));
                assert!((gbuffer.sample_normal(uv) - Vec3::Z).length() < 1e-5);
            }
        }
    }

    #[test]
    fn test_gbuffer_clamps_out_of_range() {
        let gbuffer = GBuffer::from_fn(2, 2, |x, y| (Vec3::new(x as f32, y as f32, 0.0), Vec3::Y));
        assert_eq!(gbuffer.sample_position(Vec2::new(-1.0, 5.0)), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_texels_checks_size() {
        assert!(GBuffer::from_texels(2, 2, vec![[0.0; 4]; 4], vec![[0.0; 4]; 3]).is_err());
    }

    #[test]
    fn test_closure_shadow_sampler() {
        let sampler = |light: u32, _: f32, _: Vec3, _: Vec3, _: f32| if light == 1 { 1.0 } else { 0.0 };
        assert_eq!(sampler.sample_shadow_occlusion(1, 1.0, Vec3::ZERO, Vec3::ONE, 1.0), 1.0);
        assert_eq!(Unshadowed.sample_shadow_occlusion(1, 1.0, Vec3::ZERO, Vec3::ONE, 1.0), 0.0);
    }
}
