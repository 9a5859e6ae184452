//! Blocking GPU Culling Runner
//!
//! Owns a headless [`GpuContext`] and the compute pipelines, and runs one
//! kernel at a time end to end: upload, dispatch, wait, read back. Meant for
//! tools and CPU/GPU parity checks; a renderer records the dispatchers into
//! its own frame encoder instead.

use super::compute_pipelines::ComputePipelines;
use super::culling_config::CullingConfig;
use super::error::Result;
use super::frustum::Frustum;
use super::gbuffer::GBuffer;
use super::gpu_context::GpuContext;
use super::indirect::DrawElementsIndirectCommand;
use super::tile_lights::TileLightBuffer;
use super::visibility_cpu::VisibilityInputs;
use super::visibility_dispatch::{VisibilityGpuBuffers, dispatch_visibility_culling};
use super::vpl_cull_cpu::TileCullMode;
use super::vpl_cull_dispatch::{
    GBufferTextures, ShadowCubeArray, VplGpuBuffers, dispatch_vpl_culling,
};
use super::vpl_lights::{VisibleVplList, VplLights};

/// Shadow cubes plus the per-light layer table that indexes them.
pub struct GpuShadows<'a> {
    pub cubes: &'a ShadowCubeArray,
    pub layers: &'a [u32],
}

pub struct GpuCuller {
    pub context: GpuContext,
    pub pipelines: ComputePipelines,
    config: CullingConfig,
}

impl GpuCuller {
    pub fn new(context: GpuContext, config: CullingConfig) -> Result<Self> {
        config.validate()?;
        let pipelines = ComputePipelines::new(&context.device, &config);
        Ok(Self {
            context,
            pipelines,
            config,
        })
    }

    pub fn config(&self) -> &CullingConfig {
        &self.config
    }

    /// Run visibility culling and write the resulting instance counts back
    /// into `commands`.
    pub fn cull_draw_commands(
        &self,
        inputs: &VisibilityInputs<'_>,
        frustum: &Frustum,
        commands: &mut [DrawElementsIndirectCommand],
    ) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let device = &self.context.device;
        let buffers = VisibilityGpuBuffers::upload(device, inputs, commands, &self.config)?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("visibility_encoder"),
        });
        dispatch_visibility_culling(
            &mut encoder,
            device,
            &self.pipelines,
            &buffers,
            frustum,
            &self.config,
        );
        self.context.submit(encoder)?;

        let culled: Vec<DrawElementsIndirectCommand> =
            self.context.read_buffer(&buffers.commands, commands.len())?;
        commands.copy_from_slice(&culled);
        Ok(())
    }

    /// Run one tile culling stage and read back the per-tile lists.
    ///
    /// Stage 1 without `shadows` binds an unoccluded placeholder cube.
    pub fn cull_vpls(
        &self,
        mode: TileCullMode,
        lights: &VplLights,
        visible: &VisibleVplList,
        gbuffer: &GBuffer,
        shadows: Option<GpuShadows<'_>>,
    ) -> Result<TileLightBuffer> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let config = &self.config;

        let buffers = VplGpuBuffers::upload(
            device,
            lights,
            visible,
            shadows.as_ref().map(|s| s.layers),
            config,
        )?;
        let textures = GBufferTextures::upload(device, queue, gbuffer);
        let placeholder;
        let cubes = match (&shadows, mode) {
            (_, TileCullMode::RangeOnly) => None,
            (Some(s), TileCullMode::NormalAndShadow) => Some(s.cubes),
            (None, TileCullMode::NormalAndShadow) => {
                placeholder = ShadowCubeArray::unoccluded(device, queue)?;
                Some(&placeholder)
            }
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("vpl_cull_encoder"),
        });
        dispatch_vpl_culling(
            &mut encoder,
            device,
            &self.pipelines,
            mode,
            &buffers,
            &textures,
            cubes,
            config,
        )?;
        self.context.submit(encoder)?;

        let indices = self
            .context
            .read_buffer(&buffers.tile_indices, buffers.tile_count * buffers.capacity)?;
        let counts = self.context.read_buffer(&buffers.tile_counts, buffers.tile_count)?;
        TileLightBuffer::from_raw(
            config.viewport_width,
            config.viewport_height,
            buffers.capacity,
            indices,
            counts,
        )
    }
}
