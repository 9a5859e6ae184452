//! Tiled VPL Culling Compute Dispatcher
//!
//! Uploads light arrays, the G-buffer and shadow cubes, and dispatches one of
//! the two entry points of `vpl_tile_culling.wgsl`.
//!
//! Workgroup count: `ceil(width / 16) × ceil(height / 9)`. The shader
//! bounds-checks against the viewport, so partial workgroups at the right
//! and bottom edges are harmless.
//!
//! Every in-viewport invocation writes its tile count, so the output buffers
//! need no clearing between frames.

use wgpu::util::DeviceExt;

use super::compute_pipelines::{ComputePipelines, VPL_TILE_UNIFORMS_SIZE, VPL_TILE_WORKGROUP};
use super::culling_config::CullingConfig;
use super::error::{CullError, Result};
use super::gbuffer::GBuffer;
use super::gpu_context::create_storage_buffer;
use super::vpl_cull_cpu::TileCullMode;
use super::vpl_lights::{VisibleVplList, VplLights};

/// Shadow layer value for lights without a shadow cube.
pub const NO_SHADOW_MAP: u32 = u32::MAX;

/// Fewest cubes a shadow array is allocated with. A six-layer texture is
/// taken for a single `Cube` view by the GLES backend.
pub const MIN_ALLOCATED_CUBES: u32 = 2;

/// GPU-side uniforms matching `TileUniforms` in vpl_tile_culling.wgsl.
///
/// Layout (32 bytes):
/// - viewport: vec2<u32>               (8 bytes)
/// - max_range_ratio: f32              (4 bytes)
/// - shadow_test_ratio: f32            (4 bytes)
/// - shadow_occlusion_threshold: f32   (4 bytes)
/// - _padding: [u32; 3]                (12 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VplTileUniforms {
    pub viewport: [u32; 2],
    pub max_range_ratio: f32,
    pub shadow_test_ratio: f32,
    pub shadow_occlusion_threshold: f32,
    pub _padding: [u32; 3],
}

const _: () = assert!(std::mem::size_of::<VplTileUniforms>() as u64 == VPL_TILE_UNIFORMS_SIZE);

impl From<&CullingConfig> for VplTileUniforms {
    fn from(config: &CullingConfig) -> Self {
        Self {
            viewport: [config.viewport_width, config.viewport_height],
            max_range_ratio: config.max_range_ratio,
            shadow_test_ratio: config.shadow_test_ratio,
            shadow_occlusion_threshold: config.shadow_occlusion_threshold,
            _padding: [0; 3],
        }
    }
}

/// Workgroups covering a `width × height` viewport.
pub fn vpl_tile_workgroup_counts(width: u32, height: u32) -> (u32, u32) {
    let (wx, wy) = VPL_TILE_WORKGROUP;
    (width.div_ceil(wx), height.div_ceil(wy))
}

/// Light arrays, candidate list and per-tile outputs on the GPU.
pub struct VplGpuBuffers {
    pub positions: wgpu::Buffer,
    pub radii: wgpu::Buffer,
    pub visible_count: wgpu::Buffer,
    pub visible_indices: wgpu::Buffer,
    /// Cube-array layer per light (`NO_SHADOW_MAP` when unshadowed).
    pub shadow_layers: wgpu::Buffer,
    /// Highest layer referenced by the table, if any light is shadowed.
    pub max_shadow_layer: Option<u32>,
    /// `tile * K + slot` output (COPY_SRC for readback).
    pub tile_indices: wgpu::Buffer,
    /// Count per tile (COPY_SRC for readback).
    pub tile_counts: wgpu::Buffer,
    pub tile_count: usize,
    pub capacity: usize,
}

impl VplGpuBuffers {
    /// Validate and upload one frame's light data; allocate tile outputs.
    ///
    /// `shadow_layers`, when given, maps each light to a cube in the shadow
    /// array. Without it no light is shadow-tested on the GPU.
    pub fn upload(
        device: &wgpu::Device,
        lights: &VplLights,
        visible: &VisibleVplList,
        shadow_layers: Option<&[u32]>,
        config: &CullingConfig,
    ) -> Result<Self> {
        config.validate()?;
        lights.validate()?;
        visible.validate_against(lights)?;

        let layers = match shadow_layers {
            Some(layers) => {
                CullError::check_len("shadow_layers", lights.len(), layers.len())?;
                layers.to_vec()
            }
            None => vec![NO_SHADOW_MAP; lights.len()],
        };
        let max_shadow_layer = highest_shadow_layer(&layers);

        let tile_count = config.tile_count();
        let capacity = config.capacity();
        let tile_indices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vpl_tile_indices"),
            size: (tile_count * capacity * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let tile_counts = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vpl_tile_counts"),
            size: (tile_count * std::mem::size_of::<u32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let none = wgpu::BufferUsages::empty();
        Ok(Self {
            positions: create_storage_buffer(device, "vpl_positions", lights.positions_bytes(), none),
            radii: create_storage_buffer(device, "vpl_radii", lights.radii_bytes(), none),
            visible_count: create_storage_buffer(
                device,
                "vpl_visible_count",
                bytemuck::bytes_of(&(visible.count() as u32)),
                none,
            ),
            visible_indices: create_storage_buffer(
                device,
                "vpl_visible_indices",
                visible.indices_bytes(),
                none,
            ),
            shadow_layers: create_storage_buffer(
                device,
                "vpl_shadow_layers",
                bytemuck::cast_slice(&layers),
                none,
            ),
            max_shadow_layer,
            tile_indices,
            tile_counts,
            tile_count,
            capacity,
        })
    }
}

/// G-buffer position and normal textures (RGBA32F, not filterable).
pub struct GBufferTextures {
    pub position: wgpu::Texture,
    pub position_view: wgpu::TextureView,
    pub normal: wgpu::Texture,
    pub normal_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GBufferTextures {
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, gbuffer: &GBuffer) -> Self {
        let (width, height) = (gbuffer.width(), gbuffer.height());
        let (position, position_view) = upload_rgba32f(
            device,
            queue,
            "gbuffer_position",
            width,
            height,
            bytemuck::cast_slice(gbuffer.position_texels()),
        );
        let (normal, normal_view) = upload_rgba32f(
            device,
            queue,
            "gbuffer_normal",
            width,
            height,
            bytemuck::cast_slice(gbuffer.normal_texels()),
        );
        Self {
            position,
            position_view,
            normal,
            normal_view,
            width,
            height,
        }
    }
}

fn upload_rgba32f(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    texels: &[u8],
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(16 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Highest cube layer in a shadow table, ignoring `NO_SHADOW_MAP`.
pub fn highest_shadow_layer(layers: &[u32]) -> Option<u32> {
    layers.iter().copied().filter(|&l| l != NO_SHADOW_MAP).max()
}

/// Reject a layer table that points past the end of the cube array.
pub fn check_shadow_layers(max_layer: Option<u32>, cube_count: u32) -> Result<()> {
    match max_layer {
        Some(layer) if layer >= cube_count => Err(CullError::InvalidConfig(format!(
            "shadow layer {layer} out of range for {cube_count} cubes"
        ))),
        _ => Ok(()),
    }
}

/// Texels for `cube_count` cubes padded out to the allocated cube count.
///
/// Padding cubes hold maximum depth, so they never occlude.
fn padded_cube_texels(
    face_size: u32,
    cube_count: u32,
    depths: &[f32],
) -> Result<(u32, Vec<f32>)> {
    let face_texels = (face_size * face_size) as usize;
    CullError::check_len(
        "shadow cube depths",
        face_texels * 6 * cube_count as usize,
        depths.len(),
    )?;
    let allocated = cube_count.max(MIN_ALLOCATED_CUBES);
    let mut texels = depths.to_vec();
    texels.resize(face_texels * 6 * allocated as usize, 1.0);
    Ok((allocated, texels))
}

/// Array of shadow cubes storing closest distance / radius per texel (R32F).
pub struct ShadowCubeArray {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    /// Cubes addressable through the layer table.
    pub cube_count: u32,
    /// Cubes backing the texture (at least `MIN_ALLOCATED_CUBES`).
    pub allocated_cubes: u32,
    pub face_size: u32,
}

impl ShadowCubeArray {
    /// Upload `cube_count` cubes of `face_size²` texels per face.
    ///
    /// `depths` is cube-major, then face (+X, -X, +Y, -Y, +Z, -Z), then rows.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        face_size: u32,
        cube_count: u32,
        depths: &[f32],
    ) -> Result<Self> {
        let face_size = face_size.max(1);
        let cube_count = cube_count.max(1);
        let (allocated_cubes, texels) = padded_cube_texels(face_size, cube_count, depths)?;
        let layers = allocated_cubes * 6;

        let size = wgpu::Extent3d {
            width: face_size,
            height: face_size,
            depth_or_array_layers: layers,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("vpl_shadow_cubes"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * face_size),
                rows_per_image: Some(face_size),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("vpl_shadow_cubes_view"),
            dimension: Some(wgpu::TextureViewDimension::CubeArray),
            array_layer_count: Some(layers),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("vpl_shadow_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Ok(Self {
            texture,
            view,
            sampler,
            cube_count,
            allocated_cubes,
            face_size,
        })
    }

    /// One addressable 1×1 cube at maximum depth, for frames without shadow maps.
    pub fn unoccluded(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Self> {
        Self::new(device, queue, 1, 1, &[1.0; 6])
    }
}

fn check_pipeline_capacity(pipelines: &ComputePipelines, config: &CullingConfig) -> Result<()> {
    if pipelines.max_vpls_per_tile != config.max_vpls_per_tile {
        return Err(CullError::InvalidConfig(format!(
            "pipelines were built for K = {}, config asks for {}",
            pipelines.max_vpls_per_tile, config.max_vpls_per_tile
        )));
    }
    Ok(())
}

fn check_viewport(gbuffer: &GBufferTextures, config: &CullingConfig) -> Result<()> {
    let expected = (config.viewport_width, config.viewport_height);
    let actual = (gbuffer.width, gbuffer.height);
    if expected != actual {
        return Err(CullError::ViewportMismatch { expected, actual });
    }
    Ok(())
}

/// Dispatch tiled VPL culling.
///
/// `shadows` is bound only for [`TileCullMode::NormalAndShadow`]; pass `None`
/// for range-only culling.
///
/// # Arguments
/// - `encoder`: Command encoder to record the compute pass into
/// - `device`: GPU device for the uniform buffer and bind group
/// - `pipelines`: Compute pipelines built with the same K as `config`
/// - `mode`: Stage 1 (normal + shadow) or stage 2 (range only)
/// - `buffers`: Light inputs and tile outputs
/// - `gbuffer`: Position and normal textures matching the viewport
/// - `shadows`: Shadow cube array (stage 1)
/// - `config`: Viewport and thresholds
#[allow(clippy::too_many_arguments)]
pub fn dispatch_vpl_culling(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ComputePipelines,
    mode: TileCullMode,
    buffers: &VplGpuBuffers,
    gbuffer: &GBufferTextures,
    shadows: Option<&ShadowCubeArray>,
    config: &CullingConfig,
) -> Result<()> {
    check_pipeline_capacity(pipelines, config)?;
    check_viewport(gbuffer, config)?;

    let uniforms = VplTileUniforms::from(config);
    let uniforms_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("vpl_tile_uniforms_buffer"),
        contents: bytemuck::bytes_of(&uniforms),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    // Bindings 0..=7 are shared by both entry points.
    let mut entries = vec![
        wgpu::BindGroupEntry {
            binding: 0,
            resource: buffers.positions.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 1,
            resource: buffers.radii.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 2,
            resource: buffers.visible_count.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 3,
            resource: buffers.visible_indices.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 4,
            resource: buffers.tile_indices.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 5,
            resource: buffers.tile_counts.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 6,
            resource: uniforms_buffer.as_entire_binding(),
        },
        wgpu::BindGroupEntry {
            binding: 7,
            resource: wgpu::BindingResource::TextureView(&gbuffer.position_view),
        },
    ];

    let (pipeline, layout, label) = match mode {
        TileCullMode::NormalAndShadow => {
            let shadows = shadows.ok_or_else(|| {
                CullError::InvalidConfig("stage 1 culling needs a shadow cube array".to_string())
            })?;
            check_shadow_layers(buffers.max_shadow_layer, shadows.cube_count)?;
            entries.extend([
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(&gbuffer.normal_view),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::TextureView(&shadows.view),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: wgpu::BindingResource::Sampler(&shadows.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 11,
                    resource: buffers.shadow_layers.as_entire_binding(),
                },
            ]);
            (
                &pipelines.vpl_stage1_pipeline,
                &pipelines.vpl_stage1_bind_group_layout,
                "vpl_stage1",
            )
        }
        TileCullMode::RangeOnly => (
            &pipelines.vpl_stage2_pipeline,
            &pipelines.vpl_stage2_bind_group_layout,
            "vpl_stage2",
        ),
    };

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label}_bind_group")),
        layout,
        entries: &entries,
    });

    let (wg_x, wg_y) = vpl_tile_workgroup_counts(config.viewport_width, config.viewport_height);
    log::debug!(
        "{label} dispatch: {}x{} tiles, {wg_x}x{wg_y} workgroups, K = {}",
        config.viewport_width,
        config.viewport_height,
        config.max_vpls_per_tile
    );

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&format!("{label}_pass")),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(wg_x, wg_y, 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_uniforms_size() {
        assert_eq!(std::mem::size_of::<VplTileUniforms>(), 32);
    }

    #[test]
    fn test_tile_uniforms_from_config() {
        let config = CullingConfig::for_viewport(640, 360);
        let u = VplTileUniforms::from(&config);
        assert_eq!(u.viewport, [640, 360]);
        assert_eq!(u.max_range_ratio, 1.0);
        assert_eq!(u.shadow_test_ratio, 0.1);
        assert_eq!(u.shadow_occlusion_threshold, 0.5);
    }

    #[test]
    fn test_highest_shadow_layer_skips_unshadowed() {
        assert_eq!(highest_shadow_layer(&[NO_SHADOW_MAP, 3, 1]), Some(3));
        assert_eq!(highest_shadow_layer(&[NO_SHADOW_MAP, NO_SHADOW_MAP]), None);
        assert_eq!(highest_shadow_layer(&[]), None);
    }

    #[test]
    fn test_shadow_layers_must_fit_cube_count() {
        assert!(check_shadow_layers(Some(2), 3).is_ok());
        assert!(check_shadow_layers(None, 1).is_ok());
        assert!(matches!(check_shadow_layers(Some(3), 3), Err(CullError::InvalidConfig(_))));
        // The unoccluded placeholder addresses one cube only.
        assert!(check_shadow_layers(Some(1), 1).is_err());
    }

    #[test]
    fn test_single_cube_is_padded_to_two() {
        let (allocated, texels) = padded_cube_texels(2, 1, &[0.25; 24]).unwrap();
        assert_eq!(allocated, MIN_ALLOCATED_CUBES);
        assert_eq!(texels.len(), 48);
        assert!(texels[..24].iter().all(|&d| d == 0.25));
        assert!(texels[24..].iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_larger_arrays_are_not_padded() {
        let (allocated, texels) = padded_cube_texels(1, 3, &[0.5; 18]).unwrap();
        assert_eq!(allocated, 3);
        assert_eq!(texels.len(), 18);
    }

    #[test]
    fn test_cube_depths_length_checked() {
        assert!(matches!(
            padded_cube_texels(2, 1, &[1.0; 23]),
            Err(CullError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_workgroup_counts_round_up() {
        // 1080p splits evenly into 16x9 groups
        assert_eq!(vpl_tile_workgroup_counts(1920, 1080), (120, 120));
        // Partial groups at the edges
        assert_eq!(vpl_tile_workgroup_counts(17, 10), (2, 2));
        assert_eq!(vpl_tile_workgroup_counts(1, 1), (1, 1));
    }
}
