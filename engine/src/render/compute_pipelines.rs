//! Compute Pipeline Infrastructure Module
//!
//! Creates the three culling pipelines and their bind group layouts:
//! - Visibility: per-draw frustum test writing indirect instance counts
//! - VPL stage 1: nearest-light selection with back-face and shadow pruning
//! - VPL stage 2: nearest-light selection by range only
//!
//! Both VPL stages come from one shader module; K (`MAX_VPLS_PER_TILE`) is
//! baked in when the pipelines are built, so they must be rebuilt if the
//! configured capacity changes.

use super::culling_config::CullingConfig;
use super::shader_loader::{create_shader_module, visibility_culling_source, vpl_tile_culling_source};

/// Threads per workgroup in `visibility_culling.wgsl`.
pub const VISIBILITY_WORKGROUP_SIZE: u32 = 256;

/// Workgroup shape in `vpl_tile_culling.wgsl` (16:9, one thread per pixel).
pub const VPL_TILE_WORKGROUP: (u32, u32) = (16, 9);

/// Uniform block sizes, checked against the host structs in the dispatchers.
pub const VISIBILITY_UNIFORMS_SIZE: u64 = 112;
pub const VPL_TILE_UNIFORMS_SIZE: u64 = 32;

/// Holds all compute pipelines and their associated bind group layouts.
pub struct ComputePipelines {
    /// Visibility culling pipeline: frustum-tests AABBs, writes instance counts.
    pub visibility_pipeline: wgpu::ComputePipeline,
    /// Bind group layout for the visibility pipeline.
    pub visibility_bind_group_layout: wgpu::BindGroupLayout,

    /// Stage 1 tile culling pipeline (normal + shadow aware).
    pub vpl_stage1_pipeline: wgpu::ComputePipeline,
    /// Bind group layout for stage 1 (bindings 0..=11).
    pub vpl_stage1_bind_group_layout: wgpu::BindGroupLayout,

    /// Stage 2 tile culling pipeline (range only).
    pub vpl_stage2_pipeline: wgpu::ComputePipeline,
    /// Bind group layout for stage 2 (bindings 0..=7).
    pub vpl_stage2_bind_group_layout: wgpu::BindGroupLayout,

    /// K compiled into the tile pipelines.
    pub max_vpls_per_tile: u32,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

fn unfilterable_texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

/// Bindings shared by both VPL stages:
/// 0 positions, 1 radii, 2 visible count, 3 visible indices,
/// 4 tile indices (rw), 5 tile counts (rw), 6 uniforms, 7 G-buffer position.
fn vpl_common_entries() -> [wgpu::BindGroupLayoutEntry; 8] {
    [
        storage_entry(0, true),
        storage_entry(1, true),
        storage_entry(2, true),
        storage_entry(3, true),
        storage_entry(4, false),
        storage_entry(5, false),
        uniform_entry(6, VPL_TILE_UNIFORMS_SIZE),
        unfilterable_texture_entry(7, wgpu::TextureViewDimension::D2),
    ]
}

impl ComputePipelines {
    /// Build every culling pipeline from the embedded shaders.
    ///
    /// `config.max_vpls_per_tile` is compiled into the tile pipelines.
    pub fn new(device: &wgpu::Device, config: &CullingConfig) -> Self {
        let visibility_module =
            create_shader_module(device, "visibility_culling", &visibility_culling_source());
        let vpl_module =
            create_shader_module(device, "vpl_tile_culling", &vpl_tile_culling_source(config));

        // --- Visibility ---
        // @binding(0): storage<read> aabbs
        // @binding(1): storage<read> global_transforms
        // @binding(2): storage<read> model_transforms
        // @binding(3): storage<read_write> commands
        // @binding(4): uniform VisibilityUniforms
        let visibility_entries = [
            storage_entry(0, true),
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, false),
            uniform_entry(4, VISIBILITY_UNIFORMS_SIZE),
        ];
        let visibility_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("visibility_bind_group_layout"),
                entries: &visibility_entries,
            });
        let visibility_pipeline = create_pipeline(
            device,
            "visibility",
            &visibility_bind_group_layout,
            &visibility_module,
            "cs_cull_visibility",
        );

        // --- VPL stage 1 ---
        // common 0..=7, plus
        // @binding(8): texture_2d g_normal
        // @binding(9): texture_cube_array shadow_cubes
        // @binding(10): sampler (non-filtering)
        // @binding(11): storage<read> light_shadow_layers
        let mut stage1_entries = vpl_common_entries().to_vec();
        stage1_entries.push(unfilterable_texture_entry(8, wgpu::TextureViewDimension::D2));
        stage1_entries.push(unfilterable_texture_entry(
            9,
            wgpu::TextureViewDimension::CubeArray,
        ));
        stage1_entries.push(wgpu::BindGroupLayoutEntry {
            binding: 10,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            count: None,
        });
        stage1_entries.push(storage_entry(11, true));
        let vpl_stage1_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("vpl_stage1_bind_group_layout"),
                entries: &stage1_entries,
            });
        let vpl_stage1_pipeline = create_pipeline(
            device,
            "vpl_stage1",
            &vpl_stage1_bind_group_layout,
            &vpl_module,
            "cs_cull_vpls_stage1",
        );

        // --- VPL stage 2 ---
        let stage2_entries = vpl_common_entries();
        let vpl_stage2_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("vpl_stage2_bind_group_layout"),
                entries: &stage2_entries,
            });
        let vpl_stage2_pipeline = create_pipeline(
            device,
            "vpl_stage2",
            &vpl_stage2_bind_group_layout,
            &vpl_module,
            "cs_cull_vpls_stage2",
        );

        log::debug!("compute pipelines built (K = {})", config.max_vpls_per_tile);

        Self {
            visibility_pipeline,
            visibility_bind_group_layout,
            vpl_stage1_pipeline,
            vpl_stage1_bind_group_layout,
            vpl_stage2_pipeline,
            vpl_stage2_bind_group_layout,
            max_vpls_per_tile: config.max_vpls_per_tile,
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    name: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{name}_pipeline_layout")),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: Some(&layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}
