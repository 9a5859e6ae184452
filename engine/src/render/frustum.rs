//! View Frustum
//!
//! Six inward-facing planes extracted from a view-projection matrix
//! (Gribb-Hartmann). The projection is expected to map depth to [0, 1], the
//! convention of wgpu and `glam::Mat4::perspective_rh`.
//!
//! ## Plane Order
//!
//! | Index | Plane  |
//! |-------|--------|
//! | 0     | Left   |
//! | 1     | Right  |
//! | 2     | Bottom |
//! | 3     | Top    |
//! | 4     | Near   |
//! | 5     | Far    |

use glam::{Mat4, Vec3, Vec4};

use super::bounds::Aabb;

/// Number of frustum planes.
pub const FRUSTUM_PLANES: usize = 6;

/// Camera frustum as six normalized planes (xyz = inward normal, w = distance).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; FRUSTUM_PLANES],
}

impl Frustum {
    /// Extract the frustum from a combined view-projection matrix.
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    /// Signed distance from `point` to plane `i` (positive = inside).
    #[inline]
    pub fn signed_distance(&self, i: usize, point: Vec3) -> f32 {
        self.planes[i].truncate().dot(point) + self.planes[i].w
    }

    /// True if the point lies inside or on every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..FRUSTUM_PLANES).all(|i| self.signed_distance(i, point) >= 0.0)
    }

    /// Conservative AABB test.
    ///
    /// For each plane, the box corner farthest along the plane normal (the
    /// positive vertex) is tested; if it is behind any plane the whole box is
    /// outside. Boxes that straddle a plane count as visible.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let (lo, hi) = (aabb.min(), aabb.max());
        self.planes.iter().all(|plane| {
            let n = plane.truncate();
            let positive = Vec3::select(n.cmpge(Vec3::ZERO), hi, lo);
            n.dot(positive) + plane.w >= 0.0
        })
    }

    /// Planes as plain arrays for GPU upload.
    pub fn planes_array(&self) -> [[f32; 4]; FRUSTUM_PLANES] {
        self.planes.map(|p| p.to_array())
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 { plane / len } else { plane }
}
