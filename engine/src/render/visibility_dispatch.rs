//! Visibility Culling Compute Dispatcher
//!
//! Uploads the per-draw inputs and dispatches `visibility_culling.wgsl`.
//! The shader walks the command array with a grid stride, so the workgroup
//! count is derived from the configured invocation count rather than from
//! the draw count: `ceil(visibility_invocations / 256)` workgroups.
//!
//! The command buffer is created with `INDIRECT` usage so the culled commands
//! can feed `draw_indexed_indirect` directly.

use wgpu::util::DeviceExt;

use super::compute_pipelines::{ComputePipelines, VISIBILITY_UNIFORMS_SIZE, VISIBILITY_WORKGROUP_SIZE};
use super::culling_config::CullingConfig;
use super::error::Result;
use super::frustum::{FRUSTUM_PLANES, Frustum};
use super::gpu_context::create_storage_buffer;
use super::indirect::DrawElementsIndirectCommand;
use super::visibility_cpu::VisibilityInputs;

/// GPU-side uniforms matching `VisibilityUniforms` in visibility_culling.wgsl.
///
/// Layout (112 bytes):
/// - planes: array<vec4<f32>, 6>  (96 bytes)
/// - draw_count: u32              (4 bytes)
/// - compose_model_transform: u32 (4 bytes)
/// - _padding: [u32; 2]           (8 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VisibilityUniforms {
    pub planes: [[f32; 4]; FRUSTUM_PLANES],
    pub draw_count: u32,
    pub compose_model_transform: u32,
    pub _padding: [u32; 2],
}

const _: () = assert!(std::mem::size_of::<VisibilityUniforms>() as u64 == VISIBILITY_UNIFORMS_SIZE);

impl VisibilityUniforms {
    pub fn new(frustum: &Frustum, draw_count: u32, config: &CullingConfig) -> Self {
        Self {
            planes: frustum.planes_array(),
            draw_count,
            compose_model_transform: config.compose_model_transform as u32,
            _padding: [0; 2],
        }
    }
}

/// Workgroups needed for `invocations` concurrent invocations.
pub fn visibility_workgroup_count(invocations: u32) -> u32 {
    invocations.div_ceil(VISIBILITY_WORKGROUP_SIZE).max(1)
}

/// Per-frame GPU buffers for the visibility kernel.
pub struct VisibilityGpuBuffers {
    pub aabbs: wgpu::Buffer,
    pub global_transforms: wgpu::Buffer,
    /// `None` when no model transforms were supplied; the global buffer is
    /// bound in their place.
    pub model_transforms: Option<wgpu::Buffer>,
    /// Storage + indirect command buffer (read_write in the shader).
    pub commands: wgpu::Buffer,
    pub draw_count: u32,
}

impl VisibilityGpuBuffers {
    /// Validate and upload inputs and the initial command array.
    pub fn upload(
        device: &wgpu::Device,
        inputs: &VisibilityInputs<'_>,
        commands: &[DrawElementsIndirectCommand],
        config: &CullingConfig,
    ) -> Result<Self> {
        inputs.validate(commands.len(), config.compose_model_transform)?;

        let aabbs = create_storage_buffer(
            device,
            "visibility_aabbs",
            bytemuck::cast_slice(inputs.aabbs),
            wgpu::BufferUsages::empty(),
        );
        let global_transforms = create_storage_buffer(
            device,
            "visibility_global_transforms",
            bytemuck::cast_slice(inputs.global_transforms),
            wgpu::BufferUsages::empty(),
        );
        let model_transforms = inputs.model_transforms.map(|models| {
            create_storage_buffer(
                device,
                "visibility_model_transforms",
                bytemuck::cast_slice(models),
                wgpu::BufferUsages::empty(),
            )
        });
        let commands_buffer = create_storage_buffer(
            device,
            "visibility_commands",
            bytemuck::cast_slice(commands),
            wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_SRC,
        );

        Ok(Self {
            aabbs,
            global_transforms,
            model_transforms,
            commands: commands_buffer,
            draw_count: commands.len() as u32,
        })
    }
}

/// Dispatch visibility culling for the current frame.
///
/// # Arguments
/// - `encoder`: Command encoder to record the compute pass into
/// - `device`: GPU device for creating the uniform buffer and bind group
/// - `pipelines`: Compute pipelines (visibility_pipeline + layout)
/// - `buffers`: Uploaded draw inputs and the command buffer to update
/// - `frustum`: Camera frustum planes
/// - `config`: Invocation count and transform composition flag
pub fn dispatch_visibility_culling(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ComputePipelines,
    buffers: &VisibilityGpuBuffers,
    frustum: &Frustum,
    config: &CullingConfig,
) {
    if buffers.draw_count == 0 {
        return;
    }

    let uniforms = VisibilityUniforms::new(frustum, buffers.draw_count, config);
    let uniforms_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("visibility_uniforms_buffer"),
        contents: bytemuck::bytes_of(&uniforms),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let model_transforms = buffers
        .model_transforms
        .as_ref()
        .unwrap_or(&buffers.global_transforms);

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("visibility_bind_group"),
        layout: &pipelines.visibility_bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffers.aabbs.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: buffers.global_transforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: model_transforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: buffers.commands.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: uniforms_buffer.as_entire_binding(),
            },
        ],
    });

    let workgroups = visibility_workgroup_count(config.visibility_invocations);
    log::debug!(
        "visibility dispatch: {} draws, {} workgroups",
        buffers.draw_count,
        workgroups
    );

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("visibility_cull_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipelines.visibility_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}
