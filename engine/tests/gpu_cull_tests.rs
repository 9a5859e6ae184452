//! GPU Culling Tests
//!
//! Runs the compute kernels on a headless device and compares them with the
//! CPU kernels. Each test returns early when no adapter is available.

use glam::{Mat4, Vec3};
use vpl_cull_engine::{
    Aabb, CullError, CullingConfig, DrawElementsIndirectCommand, Frustum, GBuffer, GpuContext,
    GpuContextConfig, GpuCuller, GpuShadows, NO_SHADOW_MAP, ShadowCubeArray, TileCullMode,
    TileLightBuffer, VisibilityInputs, VisibleVplList, VplLights, cull_draw_commands, cull_vpls,
};

fn culler(config: CullingConfig) -> Option<GpuCuller> {
    match GpuContext::new_headless(&GpuContextConfig::default()) {
        Ok(context) => Some(GpuCuller::new(context, config).unwrap()),
        Err(CullError::NoAdapter) => {
            eprintln!("no GPU adapter, skipping");
            None
        }
        Err(e) => panic!("GPU context creation failed: {e}"),
    }
}

/// Two tiles: a floor point at the origin and one far from every light.
fn two_tile_gbuffer() -> GBuffer {
    GBuffer::from_fn(2, 1, |x, _| {
        if x == 0 {
            (Vec3::ZERO, Vec3::Y)
        } else {
            (Vec3::new(100.0, 0.0, 0.0), Vec3::Y)
        }
    })
}

/// Light 0 below the floor, light 1 close above it, light 2 further up.
fn floor_lights() -> VplLights {
    let mut lights = VplLights::new();
    lights.push(Vec3::new(0.0, -1.0, 0.0), 10.0, Vec3::ONE);
    lights.push(Vec3::new(0.0, 0.5, 0.0), 10.0, Vec3::ONE);
    lights.push(Vec3::new(0.0, 3.0, 0.0), 10.0, Vec3::ONE);
    lights
}

#[test]
fn test_gpu_stage1_prunes_backface_and_shadowed_lights() {
    let config = CullingConfig::for_viewport(2, 1).with_max_vpls_per_tile(4);
    let Some(culler) = culler(config.clone()) else {
        return;
    };
    let lights = floor_lights();
    let visible = VisibleVplList::all(&lights);
    let gbuffer = two_tile_gbuffer();

    // Light 1 owns a cube whose closest depth is zero: fully occluded.
    let cubes = ShadowCubeArray::new(
        &culler.context.device,
        &culler.context.queue,
        1,
        1,
        &[0.0; 6],
    )
    .unwrap();
    let layers = [NO_SHADOW_MAP, 0, NO_SHADOW_MAP];
    let shadows = GpuShadows {
        cubes: &cubes,
        layers: &layers,
    };

    let stage1 = culler
        .cull_vpls(TileCullMode::NormalAndShadow, &lights, &visible, &gbuffer, Some(shadows))
        .unwrap();
    assert_eq!(stage1.tile(0, 0), Some(&[2][..]));
    assert_eq!(stage1.count(1, 0), Some(0));

    let mut cpu = TileLightBuffer::new(2, 1, config.capacity());
    let occluded = |light: u32, _: f32, _: Vec3, _: Vec3, _: f32| -> f32 {
        if light == 1 { 1.0 } else { 0.0 }
    };
    cull_vpls(
        TileCullMode::NormalAndShadow,
        &config,
        &lights,
        &visible,
        &gbuffer,
        &occluded,
        &mut cpu,
    )
    .unwrap();
    assert!(stage1.same_assignments(&cpu));

    let stage2 = culler
        .cull_vpls(TileCullMode::RangeOnly, &lights, &visible, &gbuffer, None)
        .unwrap();
    assert_eq!(stage2.tile(0, 0), Some(&[1, 0, 2][..]));
    assert_eq!(stage2.count(1, 0), Some(0));
}

#[test]
fn test_gpu_rejects_layer_past_cube_count() {
    let config = CullingConfig::for_viewport(2, 1).with_max_vpls_per_tile(4);
    let Some(culler) = culler(config) else {
        return;
    };
    let lights = floor_lights();
    let visible = VisibleVplList::all(&lights);
    let cubes = ShadowCubeArray::new(
        &culler.context.device,
        &culler.context.queue,
        1,
        1,
        &[1.0; 6],
    )
    .unwrap();
    assert_eq!(cubes.cube_count, 1);
    assert!(cubes.allocated_cubes >= 2);

    let layers = [NO_SHADOW_MAP, 1, NO_SHADOW_MAP];
    let result = culler.cull_vpls(
        TileCullMode::NormalAndShadow,
        &lights,
        &visible,
        &two_tile_gbuffer(),
        Some(GpuShadows {
            cubes: &cubes,
            layers: &layers,
        }),
    );
    assert!(matches!(result, Err(CullError::InvalidConfig(_))));
}

#[test]
fn test_gpu_visibility_matches_cpu() {
    let config = CullingConfig::default();
    let Some(culler) = culler(config.clone()) else {
        return;
    };
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    let frustum = Frustum::from_view_proj(&(proj * view));

    let aabbs = [Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE); 3];
    let transforms = [
        Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)),
        Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)),
        Mat4::from_translation(Vec3::new(-10.0, 0.0, -10.0)),
    ];
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let initial: Vec<_> = (0..3)
        .map(|i| DrawElementsIndirectCommand::new(36, i * 36, 0))
        .collect();

    let mut gpu = initial.clone();
    culler.cull_draw_commands(&inputs, &frustum, &mut gpu).unwrap();
    let mut cpu = initial;
    cull_draw_commands(&inputs, &frustum, &mut cpu, &config).unwrap();

    let counts: Vec<u32> = gpu.iter().map(|c| c.instance_count).collect();
    assert_eq!(counts, vec![1, 0, 1]);
    assert_eq!(gpu, cpu);
}
