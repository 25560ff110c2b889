use criterion::{criterion_group, criterion_main, Criterion, black_box};

use glam::Mat4;

use voxfuse::fusion::{FusionConfig, ReconstructionEngine};
use voxfuse::sensor::{Calibration, Image, Intrinsics, TrackingState, View};
use voxfuse::voxel::{BlockCoord, Scene, SceneParams};

fn bench_config(threads: usize) -> FusionConfig {
    FusionConfig {
        voxel_size: 0.01,
        truncation_distance: 0.04,
        bucket_count: 0x2_0000,
        excess_capacity: 0x8000,
        block_capacity: 0x1_0000,
        threads,
        ..Default::default()
    }
}

/// Tilted plane so the surface crosses many blocks
fn plane_view() -> View {
    let intrinsics = Intrinsics::new(160.0, 160.0, 80.0, 60.0, 160, 120);
    let depth = Image::from_fn(160, 120, |u, _| 1.0 + u as f32 * 0.005);
    View::new(Calibration::depth_only(intrinsics), depth)
}

fn bench_allocate(c: &mut Criterion) {
    let engine = ReconstructionEngine::new(bench_config(0)).unwrap();
    let view = plane_view();
    let pose = TrackingState::identity();

    c.bench_function("allocate_from_depth_160x120", |b| {
        let mut scene = engine.create_scene().unwrap();
        b.iter(|| {
            scene.reset();
            engine.allocate_from_depth(&mut scene, black_box(&view), &pose, false).unwrap()
        });
    });
}

fn bench_integrate(c: &mut Criterion) {
    let view = plane_view();
    let pose = TrackingState::identity();

    for threads in [1, 0] {
        let engine = ReconstructionEngine::new(bench_config(threads)).unwrap();
        let mut scene = engine.create_scene().unwrap();
        engine.allocate_from_depth(&mut scene, &view, &pose, false).unwrap();

        let name = if threads == 1 { "integrate_sequential" } else { "integrate_parallel" };
        c.bench_function(name, |b| {
            b.iter(|| engine.integrate_into_scene(&mut scene, black_box(&view), &pose).unwrap());
        });
    }
}

fn bench_visibility(c: &mut Criterion) {
    let engine = ReconstructionEngine::new(bench_config(0)).unwrap();
    let view = plane_view();
    let mut scene = engine.create_scene().unwrap();
    engine.allocate_from_depth(&mut scene, &view, &TrackingState::identity(), false).unwrap();
    let turned = TrackingState::new(Mat4::from_rotation_y(0.3));

    c.bench_function("update_visibility", |b| {
        b.iter(|| engine.allocate_from_depth(&mut scene, &view, black_box(&turned), true).unwrap());
    });
}

fn bench_hash_insert(c: &mut Criterion) {
    let params = SceneParams {
        block_side: 8,
        voxel_size: 0.01,
        bucket_count: 0x1_0000,
        excess_capacity: 0x4000,
        block_capacity: 0x4000,
    };
    let mut scene = Scene::new(&params).unwrap();

    c.bench_function("hash_insert_4096", |b| {
        b.iter(|| {
            scene.reset();
            for i in 0..4096i32 {
                let coord = BlockCoord::new(i % 16, (i / 16) % 16, i / 256);
                let _ = black_box(scene.allocate_block(coord));
            }
        });
    });
}

criterion_group!(benches, bench_allocate, bench_integrate, bench_visibility, bench_hash_insert);
criterion_main!(benches);
