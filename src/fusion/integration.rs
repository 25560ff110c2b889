//! Depth (and color) integration into visible blocks
//!
//! Every voxel of every visible resident block is projected into the depth
//! image and fused independently, so blocks are processed in parallel with
//! no locking.

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use crate::core::Result;
use crate::fusion::engine::{ReconstructionEngine, UpdateMask};
use crate::fusion::stats::FrameStats;
use crate::sensor::{ColorImage, DepthImage, Intrinsics, TrackingState, View};
use crate::voxel::{BlockCoord, BlockGeometry, Scene, TsdfVoxel};

/// Result of one integration pass
#[derive(Clone, Debug, Default)]
pub struct IntegrationReport {
    /// Voxel counters (integration fields only)
    pub stats: FrameStats,
    /// Voxels fused this pass
    pub updated: UpdateMask,
}

/// Color stream registered to the depth camera
struct ColorSource<'a> {
    intrinsics: Intrinsics,
    image: &'a ColorImage,
    depth_to_color: Mat4,
}

/// Everything a block update reads
struct IntegrationContext<'a> {
    geometry: BlockGeometry,
    world_to_camera: Mat4,
    intrinsics: Intrinsics,
    depth: &'a DepthImage,
    depth_range: (f32, f32),
    mu: f32,
    max_weight: u16,
    color: Option<ColorSource<'a>>,
}

#[derive(Clone, Copy, Default)]
struct VoxelCounts {
    updated: usize,
    out_of_image: usize,
    invalid_depth: usize,
    outside_band: usize,
}

impl IntegrationContext<'_> {
    fn is_valid_depth(&self, depth: f32) -> bool {
        depth.is_finite() && depth >= self.depth_range.0 && depth <= self.depth_range.1
    }

    fn integrate_block(&self, coord: BlockCoord, voxels: &mut [TsdfVoxel]) -> (VoxelCounts, Vec<bool>) {
        let mut counts = VoxelCounts::default();
        let mut updated = vec![false; voxels.len()];
        let max_color_weight = self.max_weight.min(u8::MAX as u16) as u8;

        for (i, voxel) in voxels.iter_mut().enumerate() {
            let world = self.geometry.voxel_center(coord, i);
            let camera = self.world_to_camera.transform_point3(world);

            let Some(pixel) = self.intrinsics.project_to_pixel(camera) else {
                counts.out_of_image += 1;
                continue;
            };
            let depth = self.depth.get(pixel.x, pixel.y).copied().unwrap_or(f32::NAN);
            if !self.is_valid_depth(depth) {
                counts.invalid_depth += 1;
                continue;
            }

            let eta = depth - camera.z;
            if eta.abs() > self.mu {
                counts.outside_band += 1;
                continue;
            }

            voxel.fuse_sdf(eta / self.mu, self.max_weight);
            updated[i] = true;
            counts.updated += 1;

            if let Some(sample) = self.color_sample(camera) {
                voxel.fuse_color(sample, max_color_weight);
            }
        }

        (counts, updated)
    }

    fn color_sample(&self, camera: Vec3) -> Option<[u8; 3]> {
        let color = self.color.as_ref()?;
        let in_color = color.depth_to_color.transform_point3(camera);
        let pixel = color.intrinsics.project_to_pixel(in_color)?;
        color.image.get(pixel.x, pixel.y).copied()
    }
}

impl ReconstructionEngine {
    /// Fuse the view's depth into every visible resident block.
    ///
    /// Color is fused as well when enabled in the configuration and the
    /// view carries a calibrated color image.
    pub fn integrate_into_scene(&self, scene: &mut Scene, view: &View, tracking: &TrackingState) -> Result<IntegrationReport> {
        view.validate()?;
        tracking.validate()?;

        let config = self.config();
        let color = match (config.integrate_color, &view.color, &view.calibration.color) {
            (true, Some(image), Some(intrinsics)) => Some(ColorSource {
                intrinsics: *intrinsics,
                image,
                depth_to_color: view.calibration.depth_to_color,
            }),
            _ => None,
        };

        let (geometry, pool, index) = scene.parts_mut();
        let ctx = IntegrationContext {
            geometry: *geometry,
            world_to_camera: tracking.world_to_camera(),
            intrinsics: view.calibration.depth,
            depth: &view.depth,
            depth_range: config.depth_range,
            mu: config.truncation_distance,
            max_weight: config.max_weight,
            color,
        };

        let mut targets: Vec<Option<BlockCoord>> = vec![None; pool.capacity() as usize];
        for &id in index.visible() {
            let entry = index.entry(id);
            if let Some(block) = entry.block() {
                targets[block.index()] = Some(entry.coord);
            }
        }

        let (counts, masks): (Vec<VoxelCounts>, Vec<Option<Vec<bool>>>) = self.backend().install(|| {
            pool.par_blocks_mut()
                .zip(targets.par_iter())
                .map(|(voxels, target)| match target {
                    Some(coord) => {
                        let (counts, updated) = ctx.integrate_block(*coord, voxels);
                        (counts, Some(updated))
                    }
                    None => (VoxelCounts::default(), None),
                })
                .unzip()
        });

        let mut stats = FrameStats::default();
        for c in &counts {
            stats.voxels_updated += c.updated;
            stats.voxels_out_of_image += c.out_of_image;
            stats.voxels_invalid_depth += c.invalid_depth;
            stats.voxels_outside_band += c.outside_band;
        }

        log::debug!(
            "Integration: {} voxels fused, {} outside band, {} off-image, {} invalid depth",
            stats.voxels_updated,
            stats.voxels_outside_band,
            stats.voxels_out_of_image,
            stats.voxels_invalid_depth
        );

        Ok(IntegrationReport {
            stats,
            updated: UpdateMask::new(masks),
        })
    }
}
