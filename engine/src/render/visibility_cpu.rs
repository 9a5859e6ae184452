//! CPU Visibility Culling Kernel
//!
//! Software rendition of `shaders/visibility_culling.wgsl`. Each draw call's
//! object-space AABB is moved into world space, tested against the camera
//! frustum, and the result written into that draw's `instance_count`.
//!
//! The GPU kernel runs a fixed number of invocations that step through the
//! draw list by the total invocation count (grid-stride loop). The CPU path
//! keeps the exact same partition: chunk `k` of `commands.par_chunks_mut(stride)`
//! holds the `k`-th index visited by every invocation, so slot `j` of that
//! chunk belongs to invocation `j`. Chunks end at the draw count, which makes
//! the loop self-bounding no matter how many invocations are scheduled.

use glam::Mat4;
use rayon::prelude::*;

use super::bounds::Aabb;
use super::culling_config::CullingConfig;
use super::error::{CullError, Result};
use super::frustum::Frustum;
use super::indirect::DrawElementsIndirectCommand;

/// Read-only, index-aligned per-draw inputs.
#[derive(Clone, Copy, Debug)]
pub struct VisibilityInputs<'a> {
    /// Object-space bounds, one per draw.
    pub aabbs: &'a [Aabb],
    /// Per-draw global transform.
    pub global_transforms: &'a [Mat4],
    /// Optional per-instance model transforms, composed as `global * model`
    /// when `CullingConfig::compose_model_transform` is set.
    pub model_transforms: Option<&'a [Mat4]>,
}

impl<'a> VisibilityInputs<'a> {
    pub fn new(aabbs: &'a [Aabb], global_transforms: &'a [Mat4]) -> Self {
        Self {
            aabbs,
            global_transforms,
            model_transforms: None,
        }
    }

    /// Attach model transforms and return self for chaining.
    pub fn with_model_transforms(mut self, model_transforms: &'a [Mat4]) -> Self {
        self.model_transforms = Some(model_transforms);
        self
    }

    /// Number of draw calls described by these inputs.
    pub fn draw_count(&self) -> usize {
        self.aabbs.len()
    }

    /// Check every array is index-aligned with `draw_count`.
    pub fn validate(&self, draw_count: usize, compose_model_transform: bool) -> Result<()> {
        CullError::check_len("aabbs", draw_count, self.aabbs.len())?;
        CullError::check_len("global_transforms", draw_count, self.global_transforms.len())?;
        if compose_model_transform {
            let models = self.model_transforms.map_or(0, <[Mat4]>::len);
            CullError::check_len("model_transforms", draw_count, models)?;
        }
        Ok(())
    }

    /// World-space bounds of draw `i`.
    #[inline]
    pub fn world_aabb(&self, i: usize, compose_model_transform: bool) -> Aabb {
        let transform = match (compose_model_transform, self.model_transforms) {
            (true, Some(models)) => self.global_transforms[i] * models[i],
            _ => self.global_transforms[i],
        };
        self.aabbs[i].transformed(&transform)
    }
}

/// Visible / culled counts from one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibilityStats {
    pub visible: u32,
    pub culled: u32,
}

impl VisibilityStats {
    fn record(mut self, visible: bool) -> Self {
        if visible {
            self.visible += 1;
        } else {
            self.culled += 1;
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            visible: self.visible + other.visible,
            culled: self.culled + other.culled,
        }
    }

    /// Total draws processed.
    pub fn total(&self) -> u32 {
        self.visible + self.culled
    }
}

/// Indices visited by one invocation of a grid-stride loop.
///
/// Invocation `id` of `count` visits `id, id + count, id + 2*count, ...` while
/// below `n`. `count` must be non-zero.
pub fn grid_stride_indices(id: usize, count: usize, n: usize) -> impl Iterator<Item = usize> {
    (id..n).step_by(count)
}

/// Execute a single invocation of the visibility kernel.
pub fn run_visibility_invocation(
    invocation_id: usize,
    invocation_count: usize,
    inputs: &VisibilityInputs<'_>,
    frustum: &Frustum,
    compose_model_transform: bool,
    commands: &mut [DrawElementsIndirectCommand],
) -> VisibilityStats {
    grid_stride_indices(invocation_id, invocation_count, commands.len()).fold(
        VisibilityStats::default(),
        |stats, i| {
            let visible = frustum.intersects_aabb(&inputs.world_aabb(i, compose_model_transform));
            commands[i].set_visible(visible);
            stats.record(visible)
        },
    )
}

/// Run the visibility kernel over every draw command in parallel.
pub fn cull_draw_commands(
    inputs: &VisibilityInputs<'_>,
    frustum: &Frustum,
    commands: &mut [DrawElementsIndirectCommand],
    config: &CullingConfig,
) -> Result<VisibilityStats> {
    let compose = config.compose_model_transform;
    let stride = validate_dispatch(inputs, commands, config)?;
    if commands.is_empty() {
        return Ok(VisibilityStats::default());
    }

    let stats = commands
        .par_chunks_mut(stride)
        .enumerate()
        .map(|(pass, chunk)| {
            let base = pass * stride;
            chunk
                .iter_mut()
                .enumerate()
                .fold(VisibilityStats::default(), |stats, (invocation, cmd)| {
                    let aabb = inputs.world_aabb(base + invocation, compose);
                    let visible = frustum.intersects_aabb(&aabb);
                    cmd.set_visible(visible);
                    stats.record(visible)
                })
        })
        .reduce(VisibilityStats::default, VisibilityStats::merge);

    log::debug!(
        "visibility cull: {} visible, {} culled of {} draws ({} invocations)",
        stats.visible,
        stats.culled,
        commands.len(),
        stride
    );
    Ok(stats)
}

/// Serial reference: runs each invocation's grid-stride loop in turn.
pub fn cull_draw_commands_serial(
    inputs: &VisibilityInputs<'_>,
    frustum: &Frustum,
    commands: &mut [DrawElementsIndirectCommand],
    config: &CullingConfig,
) -> Result<VisibilityStats> {
    let stride = validate_dispatch(inputs, commands, config)?;
    let compose = config.compose_model_transform;
    Ok((0..stride)
        .map(|id| run_visibility_invocation(id, stride, inputs, frustum, compose, commands))
        .fold(VisibilityStats::default(), VisibilityStats::merge))
}

fn validate_dispatch(
    inputs: &VisibilityInputs<'_>,
    commands: &[DrawElementsIndirectCommand],
    config: &CullingConfig,
) -> Result<usize> {
    if config.visibility_invocations == 0 {
        return Err(CullError::InvalidConfig(
            "visibility_invocations must be non-zero".to_string(),
        ));
    }
    inputs.validate(commands.len(), config.compose_model_transform)?;
    Ok(config.visibility_invocations as usize)
}
