//! Fusion demo - reconstructs a synthetic sphere from an orbiting depth camera.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>    JSON fusion config (default: built-in demo config)
//!   --frames <N>       Frames to fuse (default: 120)
//!   --decay-every <N>  Run decay every N frames, 0 = never (default: 30)
//!   --save-config <PATH>  Write the effective config and exit

use std::process::ExitCode;
use std::time::Instant;

use glam::Vec3;

use voxfuse::core::logging;
use voxfuse::sensor::{Calibration, Image, Intrinsics, TrackingState, View};
use voxfuse::{DenseMapper, FusionConfig, RenderState};

const SPHERE_CENTER: Vec3 = Vec3::ZERO;
const SPHERE_RADIUS: f32 = 0.3;
const ORBIT_RADIUS: f32 = 1.2;

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(120);
    let decay_every = parse_usize_arg(&args, "--decay-every").unwrap_or(30);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => match FusionConfig::load(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path);
                config
            }
            Err(e) => {
                log::error!("Failed to load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => demo_config(),
    };

    if let Some(path) = parse_str_arg(&args, "--save-config") {
        return match config.save(&path) {
            Ok(()) => {
                log::info!("Wrote config to {}", path);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Failed to write config {}: {}", path, e);
                ExitCode::FAILURE
            }
        };
    }

    match run(config, frames, decay_every) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fusion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: FusionConfig, frames: usize, decay_every: usize) -> voxfuse::core::Result<()> {
    let intrinsics = Intrinsics::new(160.0, 160.0, 80.0, 60.0, 160, 120);
    let calibration = Calibration::depth_only(intrinsics);

    let mut mapper = DenseMapper::new(config)?;
    let mut scene = mapper.create_scene()?;
    let mut render_state = RenderState::new();

    log::info!("Fusing {} frames of a {}m sphere", frames, SPHERE_RADIUS);
    let start = Instant::now();

    for frame in 0..frames {
        let angle = frame as f32 / frames.max(1) as f32 * std::f32::consts::TAU;
        let eye = Vec3::new(angle.cos() * ORBIT_RADIUS, 0.2, angle.sin() * ORBIT_RADIUS);
        let tracking = TrackingState::look_at(eye, SPHERE_CENTER, Vec3::Y);

        let view = View::new(calibration, render_sphere(&intrinsics, &tracking));
        let stats = mapper.process_frame(&view, &tracking, &mut scene, &mut render_state)?;

        log::info!(
            "Frame {:>4}: {:>5} new blocks, {:>5} visible, {:>8} voxels fused",
            frame,
            stats.newly_allocated,
            stats.visible_blocks,
            stats.voxels_updated
        );

        if decay_every > 0 && (frame + 1) % decay_every == 0 {
            let decay = mapper.decay_with_config(&mut scene);
            log::info!("Decay after frame {}: removed {} of {} blocks", frame, decay.removed, decay.scanned);
        }
    }

    let stats = scene.stats();
    log::info!(
        "Done in {:.2}s: {} blocks allocated, {} resident, {} swapped out, {} pool blocks free",
        start.elapsed().as_secs_f32(),
        stats.allocated_entries,
        stats.resident_blocks,
        stats.swapped_out_blocks,
        stats.free_blocks
    );

    if let Err(problem) = scene.check_invariants() {
        log::error!("Scene invariant violated: {}", problem);
    }
    Ok(())
}

/// Smaller volume than the session default, sized for the demo sphere
fn demo_config() -> FusionConfig {
    FusionConfig {
        voxel_size: 0.01,
        truncation_distance: 0.04,
        bucket_count: 0x2_0000,
        excess_capacity: 0x8000,
        block_capacity: 0x1_0000,
        ..Default::default()
    }
}

/// Ray-cast the sphere into a depth image (z along the optical axis)
fn render_sphere(intrinsics: &Intrinsics, tracking: &TrackingState) -> Image<f32> {
    let center = tracking.world_to_camera().transform_point3(SPHERE_CENTER);

    Image::from_fn(intrinsics.width, intrinsics.height, |u, v| {
        let dir = intrinsics.unproject(u as f32, v as f32, 1.0);
        let d = dir.normalize();

        // |t*d - c|^2 = r^2
        let b = d.dot(center);
        let disc = b * b - center.length_squared() + SPHERE_RADIUS * SPHERE_RADIUS;
        if disc < 0.0 {
            return f32::NAN;
        }
        let t = b - disc.sqrt();
        if t <= 0.0 { f32::NAN } else { (d * t).z }
    })
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
