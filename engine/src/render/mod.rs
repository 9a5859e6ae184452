//! Render Module
//!
//! GPU-driven culling for the deferred renderer: per-draw frustum culling of
//! indirect draw commands, and per-pixel selection of the nearest virtual
//! point lights. Every kernel has a rayon CPU rendition and a wgpu compute
//! rendition sharing the same data layout.

pub mod bounds;
pub mod compute_pipelines;
pub mod culling_config;
pub mod error;
pub mod frustum;
pub mod gbuffer;
pub mod gpu_context;
pub mod gpu_culler;
pub mod indirect;
pub mod shader_loader;
pub mod tile_lights;
pub mod visibility_cpu;
pub mod visibility_dispatch;
pub mod vpl_cull_cpu;
pub mod vpl_cull_dispatch;
pub mod vpl_lights;

// Re-export commonly used types for convenience
pub use bounds::Aabb;
pub use compute_pipelines::{ComputePipelines, VISIBILITY_WORKGROUP_SIZE, VPL_TILE_WORKGROUP};
pub use culling_config::{
    CullingConfig, MAX_RANGE_RATIO, MAX_TILE_CAPACITY, MAX_VPLS_PER_TILE,
    SHADOW_OCCLUSION_THRESHOLD, SHADOW_TEST_RATIO, VISIBILITY_INVOCATIONS,
};
pub use error::{CullError, Result};
pub use frustum::{FRUSTUM_PLANES, Frustum};
pub use gbuffer::{
    GBuffer, ShadowSampler, SurfaceSampler, Unshadowed, decode_normal, encode_normal,
    tile_tex_coords,
};
pub use gpu_context::{GpuContext, GpuContextConfig};
pub use gpu_culler::{GpuCuller, GpuShadows};
pub use indirect::DrawElementsIndirectCommand;
pub use shader_loader::{ShaderSource, create_shader_module, load_shader_file};
pub use tile_lights::{NearestLights, TileLightBuffer};
pub use visibility_cpu::{
    VisibilityInputs, VisibilityStats, cull_draw_commands, cull_draw_commands_serial,
    grid_stride_indices, run_visibility_invocation,
};
pub use visibility_dispatch::{VisibilityGpuBuffers, dispatch_visibility_culling};
pub use vpl_cull_cpu::{
    TileCullMode, TileCullStats, TileThresholds, cull_tile, cull_vpls, cull_vpls_stage1,
    cull_vpls_stage2, normalized_ratio,
};
pub use vpl_cull_dispatch::{
    GBufferTextures, MIN_ALLOCATED_CUBES, NO_SHADOW_MAP, ShadowCubeArray, VplGpuBuffers,
    check_shadow_layers, dispatch_vpl_culling, highest_shadow_layer,
};
pub use vpl_lights::{
    MAX_LIGHT_COLOR, MIN_VPL_RADIUS, VisibleVplList, VplLights, vpl_radius_from_color,
};
