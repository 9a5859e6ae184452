//! Culling Bench
//!
//! Builds a deterministic synthetic frame (a field of boxes, a ground-plane
//! G-buffer and a few thousand VPLs), runs the visibility kernel and both
//! tile stages on the CPU, and logs timings and counters.
//!
//! Usage: `cull_bench [config.json] [--gpu]`
//!
//! With `--gpu` the same frame is also culled on a headless wgpu device and
//! the results are compared against the CPU kernels.

use std::time::Instant;

use glam::{Mat4, Quat, Vec3, Vec4, Vec4Swizzles};
use vpl_cull_engine::{
    Aabb, CullError, CullingConfig, DrawElementsIndirectCommand, Frustum, GBuffer, GpuContext,
    GpuContextConfig, GpuCuller, Result, TileCullMode, TileLightBuffer, Unshadowed,
    VisibilityInputs, VisibleVplList, VplLights, cull_draw_commands, cull_vpls, tile_tex_coords,
};

const SEED: u64 = 0x5eed_f00d;
const GRID: usize = 64;
const GRID_SPACING: f32 = 40.0;
const VPL_COUNT: usize = 4000;

struct Scene {
    view_proj: Mat4,
    aabbs: Vec<Aabb>,
    transforms: Vec<Mat4>,
    commands: Vec<DrawElementsIndirectCommand>,
    gbuffer: GBuffer,
    lights: VplLights,
    visible: VisibleVplList,
}

impl Scene {
    fn build(config: &CullingConfig) -> Self {
        let mut rng = fastrand::Rng::with_seed(SEED);
        let (width, height) = (config.viewport_width, config.viewport_height);

        let proj = Mat4::perspective_rh(
            60f32.to_radians(),
            width as f32 / height as f32,
            0.5,
            6000.0,
        );
        let eye = Vec3::new(0.0, 400.0, 900.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let view_proj = proj * view;
        let frustum = Frustum::from_view_proj(&view_proj);

        let half_field = GRID as f32 * GRID_SPACING * 0.5;
        let mut aabbs = Vec::with_capacity(GRID * GRID);
        let mut transforms = Vec::with_capacity(GRID * GRID);
        for gz in 0..GRID {
            for gx in 0..GRID {
                let half = Vec3::new(
                    2.0 + rng.f32() * 8.0,
                    2.0 + rng.f32() * 20.0,
                    2.0 + rng.f32() * 8.0,
                );
                aabbs.push(Aabb::from_center_extents(Vec3::new(0.0, half.y, 0.0), half));
                let pos = Vec3::new(
                    gx as f32 * GRID_SPACING - half_field,
                    0.0,
                    gz as f32 * GRID_SPACING - half_field,
                );
                let rot = Quat::from_rotation_y(rng.f32() * std::f32::consts::TAU);
                transforms.push(Mat4::from_rotation_translation(rot, pos));
            }
        }
        let commands = (0..aabbs.len())
            .map(|i| DrawElementsIndirectCommand::new(36, (i * 36) as u32, 0))
            .collect();

        // Ground plane at y = 0; pixels looking at the sky land far away.
        let inv_view_proj = view_proj.inverse();
        let gbuffer = GBuffer::from_fn(width, height, |x, y| {
            let uv = tile_tex_coords(x, y, width, height);
            let ndc_x = uv.x * 2.0 - 1.0;
            let ndc_y = 1.0 - uv.y * 2.0;
            let near = inv_view_proj * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
            let far = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
            let origin = near.xyz() / near.w;
            let dir = (far.xyz() / far.w - origin).normalize();
            if dir.y < -1e-4 {
                (origin + dir * (-origin.y / dir.y), Vec3::Y)
            } else {
                (origin + dir * 1.0e5, -dir)
            }
        });

        let mut lights = VplLights::with_capacity(VPL_COUNT);
        for _ in 0..VPL_COUNT {
            let pos = Vec3::new(
                rng.f32() * 3000.0 - 1500.0,
                5.0 + rng.f32() * 200.0,
                rng.f32() * 3000.0 - 1500.0,
            );
            let color = Vec3::new(rng.f32(), rng.f32(), rng.f32()) * 3000.0;
            lights.push_with_derived_radius(pos, color);
        }
        let visible = VisibleVplList::new(
            (0..lights.len() as u32)
                .filter(|&i| frustum.contains_point(lights.position(i)))
                .collect(),
        );

        Self {
            view_proj,
            aabbs,
            transforms,
            commands,
            gbuffer,
            lights,
            visible,
        }
    }

    fn inputs(&self) -> VisibilityInputs<'_> {
        VisibilityInputs::new(&self.aabbs, &self.transforms)
    }
}

struct CpuResults {
    commands: Vec<DrawElementsIndirectCommand>,
    stage1: TileLightBuffer,
    stage2: TileLightBuffer,
}

fn run_cpu(config: &CullingConfig, scene: &Scene) -> Result<CpuResults> {
    let frustum = Frustum::from_view_proj(&scene.view_proj);

    let mut commands = scene.commands.clone();
    let start = Instant::now();
    let stats = cull_draw_commands(&scene.inputs(), &frustum, &mut commands, config)?;
    log::info!(
        "cpu visibility: {} visible / {} culled in {:.2?}",
        stats.visible,
        stats.culled,
        start.elapsed()
    );

    let tiles = |mode| -> Result<TileLightBuffer> {
        let mut out = TileLightBuffer::new(
            config.viewport_width,
            config.viewport_height,
            config.capacity(),
        );
        let start = Instant::now();
        let stats = cull_vpls(
            mode,
            config,
            &scene.lights,
            &scene.visible,
            &scene.gbuffer,
            &Unshadowed,
            &mut out,
        )?;
        log::info!(
            "cpu {mode:?}: {} tiles, {:.2} lights/tile, {} saturated in {:.2?}",
            stats.tiles,
            stats.average_per_tile(),
            stats.saturated_tiles,
            start.elapsed()
        );
        if stats.saturated_tiles * 2 > stats.tiles {
            log::warn!(
                "most tiles are saturated at K = {}; nearer lights may be cut",
                config.max_vpls_per_tile
            );
        }
        Ok(out)
    };

    Ok(CpuResults {
        commands,
        stage1: tiles(TileCullMode::NormalAndShadow)?,
        stage2: tiles(TileCullMode::RangeOnly)?,
    })
}

fn run_gpu(config: &CullingConfig, scene: &Scene, cpu: &CpuResults) -> Result<()> {
    let context = match GpuContext::new_headless(&GpuContextConfig::default()) {
        Ok(context) => context,
        Err(CullError::NoAdapter) => {
            log::warn!("no GPU adapter available, skipping GPU comparison");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let culler = GpuCuller::new(context, config.clone())?;
    let frustum = Frustum::from_view_proj(&scene.view_proj);

    let mut commands = scene.commands.clone();
    let start = Instant::now();
    culler.cull_draw_commands(&scene.inputs(), &frustum, &mut commands)?;
    let mismatched = commands
        .iter()
        .zip(&cpu.commands)
        .filter(|(gpu, cpu)| gpu.instance_count != cpu.instance_count)
        .count();
    log::info!(
        "gpu visibility in {:.2?}: {mismatched} of {} draws differ from cpu",
        start.elapsed(),
        commands.len()
    );

    for (mode, expected) in [
        (TileCullMode::NormalAndShadow, &cpu.stage1),
        (TileCullMode::RangeOnly, &cpu.stage2),
    ] {
        let start = Instant::now();
        let gpu = culler.cull_vpls(mode, &scene.lights, &scene.visible, &scene.gbuffer, None)?;
        let elapsed = start.elapsed();
        if gpu.same_assignments(expected) {
            log::info!("gpu {mode:?} in {elapsed:.2?}: matches cpu");
        } else {
            let differing = (0..gpu.tile_count())
                .filter(|&t| gpu.tile_by_index(t) != expected.tile_by_index(t))
                .count();
            log::warn!(
                "gpu {mode:?} in {elapsed:.2?}: {differing} of {} tiles differ from cpu",
                gpu.tile_count()
            );
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let mut use_gpu = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--gpu" {
            use_gpu = true;
        } else {
            config_path = Some(arg);
        }
    }

    let config = match config_path {
        Some(path) => {
            log::info!("loading config from {path}");
            CullingConfig::load(&path)?
        }
        None => CullingConfig::for_viewport(480, 270),
    };
    config.validate()?;

    let start = Instant::now();
    let scene = Scene::build(&config);
    log::info!(
        "scene: {} draws, {} vpls ({} visible), {}x{} tiles, built in {:.2?}",
        scene.aabbs.len(),
        scene.lights.len(),
        scene.visible.count(),
        config.viewport_width,
        config.viewport_height,
        start.elapsed()
    );
    if scene.visible.is_empty() {
        log::warn!("no VPLs inside the view frustum");
    }

    let cpu = run_cpu(&config, &scene)?;
    if use_gpu {
        run_gpu(&config, &scene, &cpu)?;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
