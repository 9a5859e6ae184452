//! Draw-Call Bounding Boxes
//!
//! Object-space axis-aligned bounding boxes, one per draw call, and the
//! transform that re-derives a world-space AABB from them.
//!
//! ## Memory Layout
//!
//! WGSL Layout (32 bytes, 2 rows of 16 bytes):
//!   Row 0 (offset 0-15):  min.xyz, min.w (unused)
//!   Row 1 (offset 16-31): max.xyz, max.w (unused)
//!
//! Matches the `Aabb` struct in `shaders/visibility_culling.wgsl`.

use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned bounding box stored as two `vec4` rows.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Aabb {
    /// Minimum corner (w unused)
    pub min: [f32; 4],
    /// Maximum corner (w unused)
    pub max: [f32; 4],
}

static_assertions::assert_eq_size!(Aabb, [u8; 32]);

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

impl Aabb {
    /// Create a box from its min and max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.extend(1.0).to_array(),
            max: max.extend(1.0).to_array(),
        }
    }

    /// Create a box from center position and half-extents.
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box enclosing every point in `points`.
    ///
    /// Returns `None` for an empty iterator.
    pub fn enclosing(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self::new(min, max))
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        Vec4::from_array(self.min).truncate()
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        Vec4::from_array(self.max).truncate()
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min() + self.max()) * 0.5
    }

    /// Half-extents of the box.
    #[inline]
    pub fn extents(&self) -> Vec3 {
        (self.max() - self.min()) * 0.5
    }

    /// A box is valid when min <= max on every axis.
    pub fn is_valid(&self) -> bool {
        self.min().cmple(self.max()).all()
    }

    /// The eight corners, bit i of the index selecting max on axis i.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min(), self.max());
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            )
        })
    }

    /// Transform the box and re-enclose it in a new axis-aligned box.
    ///
    /// All eight corners are transformed; transforming only min and max is
    /// wrong as soon as the matrix rotates or mirrors.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        Self::new(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn test_aabb_size() {
        assert_eq!(std::mem::size_of::<Aabb>(), 32);
    }

    #[test]
    fn test_center_and_extents() {
        let aabb = Aabb::from_center_extents(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.5));
        assert_eq!(aabb.center(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.extents(), Vec3::splat(0.5));
        assert!(aabb.is_valid());
    }

    #[test]
    fn test_corners_cover_box() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let corners = aabb.corners();
        assert_eq!(corners[0], Vec3::ZERO);
        assert_eq!(corners[7], Vec3::ONE);
        assert_eq!(Aabb::enclosing(corners), Some(aabb));
    }

    #[test]
    fn test_enclosing_empty() {
        assert_eq!(Aabb::enclosing(std::iter::empty()), None);
    }

    #[test]
    fn test_translation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, -5.0)));
        assert!(approx(moved.min(), Vec3::new(10.0, 0.0, -5.0)));
        assert!(approx(moved.max(), Vec3::new(11.0, 1.0, -4.0)));
    }

    #[test]
    fn test_rotation_reencloses_corners() {
        // A unit cube centered at the origin rotated 45° about Y grows to
        // sqrt(2) wide on X and Z. Transforming only min/max would give a
        // degenerate box of zero width on X.
        let aabb = Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(0.5));
        let rot = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let out = aabb.transformed(&rot);
        let half = std::f32::consts::SQRT_2 * 0.5;
        assert!(approx(out.min(), Vec3::new(-half, -0.5, -half)));
        assert!(approx(out.max(), Vec3::new(half, 0.5, half)));
        assert!(out.is_valid());
    }

    #[test]
    fn test_mirror_keeps_min_below_max() {
        let aabb = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(2.0, 3.0, 4.0));
        let out = aabb.transformed(&Mat4::from_scale(Vec3::new(-1.0, 1.0, 2.0)));
        assert!(approx(out.min(), Vec3::new(-2.0, 1.0, 2.0)));
        assert!(approx(out.max(), Vec3::new(-1.0, 3.0, 8.0)));
    }
}
