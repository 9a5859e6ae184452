//! CPU Tiled VPL Culling Kernel
//!
//! Software rendition of `shaders/vpl_tile_culling.wgsl`. One tile per pixel:
//! each tile reconstructs its surface point from the G-buffer, scans the
//! visible-VPL candidate list once, and keeps the K nearest lights by
//! normalized distance ratio (distance / radius).
//!
//! Two variants share one selection core:
//!
//! - [`TileCullMode::NormalAndShadow`] (stage 1): rejects lights behind the
//!   surface plane and, for lights closer than `shadow_test_ratio`, lights
//!   whose single shadow sample reports more than `shadow_occlusion_threshold`
//!   occlusion.
//! - [`TileCullMode::RangeOnly`] (stage 2): range test only; never samples the
//!   normal buffer or shadows.
//!
//! Tiles run in parallel with rayon. Each tile owns a stack-allocated
//! [`NearestLights`] and writes only its own `K` output slots and count.

use glam::Vec3;
use rayon::prelude::*;

use super::culling_config::CullingConfig;
use super::error::{CullError, Result};
use super::gbuffer::{ShadowSampler, SurfaceSampler, Unshadowed, tile_tex_coords};
use super::tile_lights::{NearestLights, TileLightBuffer, store_tile};
use super::vpl_lights::{VisibleVplList, VplLights};

/// Which filters the tile kernel applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileCullMode {
    /// Back-face and close-range shadow rejection enabled.
    NormalAndShadow,
    /// Distance ratio only.
    RangeOnly,
}

impl TileCullMode {
    #[inline]
    pub fn filters_backface_and_shadow(self) -> bool {
        matches!(self, TileCullMode::NormalAndShadow)
    }
}

/// Ratio thresholds pulled out of the config once per dispatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileThresholds {
    pub max_range_ratio: f32,
    pub shadow_test_ratio: f32,
    pub shadow_occlusion_threshold: f32,
}

impl From<&CullingConfig> for TileThresholds {
    fn from(config: &CullingConfig) -> Self {
        Self {
            max_range_ratio: config.max_range_ratio,
            shadow_test_ratio: config.shadow_test_ratio,
            shadow_occlusion_threshold: config.shadow_occlusion_threshold,
        }
    }
}

impl Default for TileThresholds {
    fn default() -> Self {
        Self::from(&CullingConfig::default())
    }
}

/// Counters aggregated over every tile of a dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileCullStats {
    pub tiles: u64,
    /// Sum of per-tile counts.
    pub assigned: u64,
    /// Tiles that ended with K lights.
    pub saturated_tiles: u64,
    pub backface_rejected: u64,
    /// Out of range, or a degenerate radius.
    pub range_rejected: u64,
    pub shadow_rejected: u64,
    /// In range but no closer than any of the K kept lights.
    pub dropped: u64,
}

impl TileCullStats {
    pub fn merge(self, other: Self) -> Self {
        Self {
            tiles: self.tiles + other.tiles,
            assigned: self.assigned + other.assigned,
            saturated_tiles: self.saturated_tiles + other.saturated_tiles,
            backface_rejected: self.backface_rejected + other.backface_rejected,
            range_rejected: self.range_rejected + other.range_rejected,
            shadow_rejected: self.shadow_rejected + other.shadow_rejected,
            dropped: self.dropped + other.dropped,
        }
    }

    /// Mean lights per tile.
    pub fn average_per_tile(&self) -> f64 {
        if self.tiles == 0 {
            0.0
        } else {
            self.assigned as f64 / self.tiles as f64
        }
    }
}

/// Distance divided by radius, or `None` when the light has no usable radius.
///
/// Zero, negative and non-finite radii contribute nothing.
#[inline]
pub fn normalized_ratio(distance: f32, radius: f32) -> Option<f32> {
    if !(radius > 0.0) || !radius.is_finite() {
        return None;
    }
    let ratio = distance / radius;
    (!ratio.is_nan()).then_some(ratio)
}

/// Select the nearest lights for one surface point.
///
/// `normal` is ignored in [`TileCullMode::RangeOnly`].
#[allow(clippy::too_many_arguments)]
pub fn cull_tile(
    mode: TileCullMode,
    thresholds: &TileThresholds,
    capacity: usize,
    frag_pos: Vec3,
    normal: Vec3,
    lights: &VplLights,
    visible: &VisibleVplList,
    shadows: &dyn ShadowSampler,
    stats: &mut TileCullStats,
) -> NearestLights {
    let filter = mode.filters_backface_and_shadow();
    let mut nearest = NearestLights::new(capacity);

    for &light in &visible.indices {
        let light_pos = lights.position(light);
        let to_light = light_pos - frag_pos;

        // n·(l - p) < 0 puts the light on the far side of the surface plane.
        let facing = normal.dot(to_light);
        if filter && facing < 0.0 {
            stats.backface_rejected += 1;
            continue;
        }

        let radius = lights.radius(light);
        let ratio = match normalized_ratio(to_light.length(), radius) {
            Some(ratio) if ratio <= thresholds.max_range_ratio => ratio,
            _ => {
                stats.range_rejected += 1;
                continue;
            }
        };

        let Some(slot) = nearest.insertion_point(ratio) else {
            stats.dropped += 1;
            continue;
        };

        if filter && ratio < thresholds.shadow_test_ratio {
            let occlusion =
                shadows.sample_shadow_occlusion(light, radius, frag_pos, light_pos, facing);
            if occlusion > thresholds.shadow_occlusion_threshold {
                stats.shadow_rejected += 1;
                continue;
            }
        }

        nearest.insert_at(slot, light, ratio);
    }

    stats.tiles += 1;
    stats.assigned += nearest.len() as u64;
    if nearest.is_full() {
        stats.saturated_tiles += 1;
    }
    nearest
}

/// Run the tile kernel over the whole viewport.
pub fn cull_vpls(
    mode: TileCullMode,
    config: &CullingConfig,
    lights: &VplLights,
    visible: &VisibleVplList,
    surface: &dyn SurfaceSampler,
    shadows: &dyn ShadowSampler,
    out: &mut TileLightBuffer,
) -> Result<TileCullStats> {
    validate_dispatch(config, lights, visible, out)?;

    let width = config.viewport_width;
    let height = config.viewport_height;
    let capacity = config.capacity();
    let thresholds = TileThresholds::from(config);
    let filter = mode.filters_backface_and_shadow();

    if visible.is_empty() {
        log::debug!("vpl cull ({mode:?}): no visible lights, clearing {} tiles", out.tile_count());
    }

    let stats = out
        .indices
        .par_chunks_mut(capacity)
        .zip(out.counts.par_iter_mut())
        .enumerate()
        .map(|(tile, (slots, count))| {
            let x = (tile % width as usize) as u32;
            let y = (tile / width as usize) as u32;
            let tex_coords = tile_tex_coords(x, y, width, height);
            let frag_pos = surface.sample_position(tex_coords);
            let normal = if filter {
                surface.sample_normal(tex_coords)
            } else {
                Vec3::ZERO
            };

            let mut stats = TileCullStats::default();
            let nearest = cull_tile(
                mode,
                &thresholds,
                capacity,
                frag_pos,
                normal,
                lights,
                visible,
                shadows,
                &mut stats,
            );
            store_tile(slots, count, &nearest);
            stats
        })
        .reduce(TileCullStats::default, TileCullStats::merge);

    log::debug!(
        "vpl cull ({mode:?}): {} tiles, {:.2} lights/tile, {} saturated, rejected {} back-face / {} range / {} shadow, {} dropped",
        stats.tiles,
        stats.average_per_tile(),
        stats.saturated_tiles,
        stats.backface_rejected,
        stats.range_rejected,
        stats.shadow_rejected,
        stats.dropped
    );
    Ok(stats)
}

/// Stage 1: back-face and shadow aware selection.
pub fn cull_vpls_stage1(
    config: &CullingConfig,
    lights: &VplLights,
    visible: &VisibleVplList,
    surface: &dyn SurfaceSampler,
    shadows: &dyn ShadowSampler,
    out: &mut TileLightBuffer,
) -> Result<TileCullStats> {
    cull_vpls(
        TileCullMode::NormalAndShadow,
        config,
        lights,
        visible,
        surface,
        shadows,
        out,
    )
}

/// Stage 2: range-only selection.
pub fn cull_vpls_stage2(
    config: &CullingConfig,
    lights: &VplLights,
    visible: &VisibleVplList,
    surface: &dyn SurfaceSampler,
    out: &mut TileLightBuffer,
) -> Result<TileCullStats> {
    cull_vpls(
        TileCullMode::RangeOnly,
        config,
        lights,
        visible,
        surface,
        &Unshadowed,
        out,
    )
}

fn validate_dispatch(
    config: &CullingConfig,
    lights: &VplLights,
    visible: &VisibleVplList,
    out: &TileLightBuffer,
) -> Result<()> {
    config.validate()?;
    lights.validate()?;
    visible.validate_against(lights)?;

    let expected = (config.viewport_width, config.viewport_height);
    let actual = (out.tiles_x(), out.tiles_y());
    if expected != actual {
        return Err(CullError::ViewportMismatch { expected, actual });
    }
    if out.capacity() != config.capacity() {
        return Err(CullError::InvalidConfig(format!(
            "tile buffer holds {} lights per tile, config asks for {}",
            out.capacity(),
            config.capacity()
        )));
    }
    Ok(())
}
