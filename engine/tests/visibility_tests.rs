//! Visibility Culling Tests
//!
//! End-to-end checks of the indirect draw culling kernel: frustum
//! classification, transform handling, and agreement between the parallel
//! kernel and the single-invocation reference loop.

use glam::{Mat4, Quat, Vec3};
use vpl_cull_engine::{
    Aabb, CullingConfig, DrawElementsIndirectCommand, Frustum, VisibilityInputs,
    cull_draw_commands, cull_draw_commands_serial, run_visibility_invocation,
};

/// 90° square frustum at the origin looking down -Z, near 0.1, far 100.
fn camera() -> Frustum {
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    Frustum::from_view_proj(&(proj * view))
}

fn unit_box() -> Aabb {
    Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE)
}

fn commands(n: usize) -> Vec<DrawElementsIndirectCommand> {
    (0..n)
        .map(|i| DrawElementsIndirectCommand {
            count: 36,
            instance_count: 7,
            first_index: (i * 36) as u32,
            base_vertex: -(i as i32),
            base_instance: i as u32,
        })
        .collect()
}

fn instance_counts(commands: &[DrawElementsIndirectCommand]) -> Vec<u32> {
    commands.iter().map(|c| c.instance_count).collect()
}

/// Boxes scattered around the camera, some rotated, some behind it.
fn random_scene(n: usize, seed: u64) -> (Vec<Aabb>, Vec<Mat4>) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let aabbs = (0..n)
        .map(|_| {
            let half = Vec3::new(rng.f32(), rng.f32(), rng.f32()) * 3.0 + Vec3::splat(0.1);
            Aabb::from_center_extents(Vec3::ZERO, half)
        })
        .collect();
    let transforms = (0..n)
        .map(|_| {
            let pos = Vec3::new(
                rng.f32() * 120.0 - 60.0,
                rng.f32() * 40.0 - 20.0,
                rng.f32() * 160.0 - 120.0,
            );
            let rot = Quat::from_rotation_y(rng.f32() * std::f32::consts::TAU);
            Mat4::from_rotation_translation(rot, pos)
        })
        .collect();
    (aabbs, transforms)
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_inside_outside_straddling() {
    let aabbs = [unit_box(); 3];
    let transforms = [
        // fully inside
        Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)),
        // behind the camera
        Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)),
        // straddles the left plane (x = z at z = -10)
        Mat4::from_translation(Vec3::new(-10.0, 0.0, -10.0)),
    ];
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let mut cmds = commands(3);

    let stats = cull_draw_commands(&inputs, &camera(), &mut cmds, &CullingConfig::default())
        .unwrap();

    assert_eq!(instance_counts(&cmds), vec![1, 0, 1]);
    assert_eq!(stats.visible, 2);
    assert_eq!(stats.culled, 1);
    assert_eq!(stats.total(), 3);
}

#[test]
fn test_only_instance_count_is_written() {
    let aabbs = [unit_box(); 2];
    let transforms = [
        Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)),
        Mat4::from_translation(Vec3::new(0.0, 0.0, 50.0)),
    ];
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let original = commands(2);
    let mut cmds = original.clone();

    cull_draw_commands(&inputs, &camera(), &mut cmds, &CullingConfig::default()).unwrap();

    for (before, after) in original.iter().zip(&cmds) {
        assert_eq!(before.count, after.count);
        assert_eq!(before.first_index, after.first_index);
        assert_eq!(before.base_vertex, after.base_vertex);
        assert_eq!(before.base_instance, after.base_instance);
    }
    assert_eq!(instance_counts(&cmds), vec![1, 0]);
}

#[test]
fn test_beyond_far_plane_is_culled() {
    let aabbs = [unit_box()];
    let transforms = [Mat4::from_translation(Vec3::new(0.0, 0.0, -150.0))];
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let mut cmds = commands(1);
    cull_draw_commands(&inputs, &camera(), &mut cmds, &CullingConfig::default()).unwrap();
    assert_eq!(instance_counts(&cmds), vec![0]);
}

#[test]
fn test_rotation_reencloses_bounds() {
    // A long box lying along X just behind the camera. Rotated 90° about Y
    // its long axis points down -Z and reaches into the frustum; the
    // re-enclosed world box must see it.
    let aabbs = [Aabb::from_center_extents(Vec3::ZERO, Vec3::new(8.0, 0.5, 0.5))];
    let position = Vec3::new(0.0, 0.0, 5.0);
    let unrotated = [Mat4::from_translation(position)];
    let rotated = [Mat4::from_rotation_translation(
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        position,
    )];
    let mut cmds = commands(1);

    cull_draw_commands(
        &VisibilityInputs::new(&aabbs, &unrotated),
        &camera(),
        &mut cmds,
        &CullingConfig::default(),
    )
    .unwrap();
    assert_eq!(instance_counts(&cmds), vec![0]);

    cull_draw_commands(
        &VisibilityInputs::new(&aabbs, &rotated),
        &camera(),
        &mut cmds,
        &CullingConfig::default(),
    )
    .unwrap();
    assert_eq!(instance_counts(&cmds), vec![1]);
}

#[test]
fn test_model_transforms_ignored_unless_composed() {
    let aabbs = [unit_box()];
    let globals = [Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0))];
    // Moves the box 30 units behind the camera once composed.
    let models = [Mat4::from_translation(Vec3::new(0.0, 0.0, 30.0))];
    let inputs = VisibilityInputs::new(&aabbs, &globals).with_model_transforms(&models);
    let mut cmds = commands(1);

    cull_draw_commands(&inputs, &camera(), &mut cmds, &CullingConfig::default()).unwrap();
    assert_eq!(instance_counts(&cmds), vec![1]);

    let composed = CullingConfig {
        compose_model_transform: true,
        ..CullingConfig::default()
    };
    cull_draw_commands(&inputs, &camera(), &mut cmds, &composed).unwrap();
    assert_eq!(instance_counts(&cmds), vec![0]);
}

// ============================================================================
// Grid-stride behaviour
// ============================================================================

#[test]
fn test_parallel_matches_serial_for_any_invocation_count() {
    let (aabbs, transforms) = random_scene(517, 7);
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let frustum = camera();

    for invocations in [1, 3, 64, 256, 1024, 4096] {
        let config = CullingConfig {
            visibility_invocations: invocations,
            ..CullingConfig::default()
        };
        let mut parallel = commands(aabbs.len());
        let mut serial = commands(aabbs.len());
        let a = cull_draw_commands(&inputs, &frustum, &mut parallel, &config).unwrap();
        let b = cull_draw_commands_serial(&inputs, &frustum, &mut serial, &config).unwrap();
        assert_eq!(parallel, serial, "invocations = {invocations}");
        assert_eq!(a, b);
        assert_eq!(a.total(), aabbs.len() as u32);
    }
}

#[test]
fn test_scene_has_both_outcomes() {
    let (aabbs, transforms) = random_scene(517, 7);
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let mut cmds = commands(aabbs.len());
    let stats = cull_draw_commands(&inputs, &camera(), &mut cmds, &CullingConfig::default())
        .unwrap();
    assert!(stats.visible > 0);
    assert!(stats.culled > 0);
    assert!(cmds.iter().all(|c| c.instance_count <= 1));
}

#[test]
fn test_single_invocation_touches_only_its_stride() {
    let (aabbs, transforms) = random_scene(20, 3);
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let mut cmds = commands(20);

    let stats = run_visibility_invocation(2, 8, &inputs, &camera(), false, &mut cmds);

    assert_eq!(stats.total(), 3); // 2, 10, 18
    for (i, c) in cmds.iter().enumerate() {
        if i % 8 == 2 {
            assert!(c.instance_count <= 1);
        } else {
            assert_eq!(c.instance_count, 7, "index {i} should be untouched");
        }
    }
}

#[test]
fn test_rerun_is_idempotent() {
    let (aabbs, transforms) = random_scene(300, 11);
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let config = CullingConfig::default();
    let mut first = commands(300);
    cull_draw_commands(&inputs, &camera(), &mut first, &config).unwrap();
    let mut second = first.clone();
    cull_draw_commands(&inputs, &camera(), &mut second, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_zero_invocations_rejected() {
    let aabbs = [unit_box()];
    let transforms = [Mat4::IDENTITY];
    let inputs = VisibilityInputs::new(&aabbs, &transforms);
    let config = CullingConfig {
        visibility_invocations: 0,
        ..CullingConfig::default()
    };
    assert!(cull_draw_commands(&inputs, &camera(), &mut commands(1), &config).is_err());
}
