//! Block allocation from depth
//!
//! Phase 1 back-projects every valid depth pixel in parallel and walks the
//! blocks its truncation segment crosses, probing the hash read-only.
//! Phase 2 commits the missing blocks serially, in image order, so bucket
//! and excess assignment is reproducible. Visibility is recomputed last.

use std::collections::HashSet;

use rayon::prelude::*;

use crate::core::Result;
use crate::fusion::engine::ReconstructionEngine;
use crate::fusion::stats::FrameStats;
use crate::math::Ray;
use crate::sensor::{TrackingState, View};
use crate::voxel::{AllocationFailure, BlockCoord, EntryId, Scene};

/// Blocks crossed by the truncation segments of one image row
#[derive(Default)]
struct RowCandidates {
    /// Block and its entry at lookup time, in pixel order
    blocks: Vec<(BlockCoord, Option<EntryId>)>,
    valid_pixels: usize,
    invalid_pixels: usize,
}

impl ReconstructionEngine {
    /// Allocate the blocks the observed surface needs and refresh visibility.
    ///
    /// With `visibility_only` no block is inserted; only the visibility set
    /// is recomputed for the new pose.
    pub fn allocate_from_depth(
        &self,
        scene: &mut Scene,
        view: &View,
        tracking: &TrackingState,
        visibility_only: bool,
    ) -> Result<FrameStats> {
        view.validate()?;
        tracking.validate()?;

        let rows = self.collect_candidates(scene, view, tracking);

        let mut stats = FrameStats::default();
        let mut seen = HashSet::new();
        for row in &rows {
            stats.valid_pixels += row.valid_pixels;
            stats.invalid_pixels += row.invalid_pixels;

            for &(coord, found) in &row.blocks {
                if !seen.insert(coord) {
                    continue;
                }
                stats.candidate_blocks += 1;
                if found.is_some() {
                    stats.already_allocated += 1;
                    continue;
                }
                if visibility_only {
                    continue;
                }
                match scene.allocate_block(coord) {
                    Ok(_) => stats.newly_allocated += 1,
                    Err(AllocationFailure::PoolExhausted) => stats.pool_exhausted += 1,
                    Err(AllocationFailure::ExcessExhausted) => stats.excess_exhausted += 1,
                }
            }
        }

        if stats.pool_exhausted > 0 || stats.excess_exhausted > 0 {
            log::warn!(
                "Dropped {} block allocations (pool full: {}, excess list full: {})",
                stats.pool_exhausted + stats.excess_exhausted,
                stats.pool_exhausted,
                stats.excess_exhausted
            );
        }

        stats.visible_blocks = self.update_visibility(scene, view, tracking);

        log::debug!(
            "Allocation: {} valid pixels, {} candidate blocks, {} new, {} visible",
            stats.valid_pixels,
            stats.candidate_blocks,
            stats.newly_allocated,
            stats.visible_blocks
        );
        Ok(stats)
    }

    /// Phase 1: per-row candidate blocks, no mutation of the scene
    fn collect_candidates(&self, scene: &Scene, view: &View, tracking: &TrackingState) -> Vec<RowCandidates> {
        let config = self.config();
        let mu = config.truncation_distance;
        let block_extent = scene.geometry().block_extent();
        let intrinsics = view.calibration.depth;
        let pose = tracking.pose;
        let index = scene.index();

        self.backend().install(|| {
            (0..view.depth.height())
                .into_par_iter()
                .map(|y| {
                    let mut row = RowCandidates::default();
                    for (x, &depth) in view.depth.row(y).iter().enumerate() {
                        if !config.is_valid_depth(depth) {
                            row.invalid_pixels += 1;
                            continue;
                        }
                        row.valid_pixels += 1;

                        // Segment of +-mu along the viewing ray around the measurement
                        let point = intrinsics.unproject(x as f32, y as f32, depth);
                        let scale = mu / point.length();
                        let start = pose.transform_point3(point * (1.0 - scale));
                        let end = pose.transform_point3(point * (1.0 + scale));
                        let Some((ray, length)) = Ray::between(start, end) else {
                            continue;
                        };

                        for cell in ray.grid_cells(length, block_extent) {
                            let coord = BlockCoord::from(cell);
                            if row.blocks.last().is_some_and(|(last, _)| *last == coord) {
                                continue;
                            }
                            row.blocks.push((coord, index.find(coord)));
                        }
                    }
                    row
                })
                .collect()
        })
    }

    /// Mark every allocated block whose bounds meet the camera frustum
    /// within the valid depth range. Returns the size of the visibility set.
    fn update_visibility(&self, scene: &mut Scene, view: &View, tracking: &TrackingState) -> usize {
        let frustum = view.calibration.depth.frustum(self.config().depth_range);
        let world_to_camera = tracking.world_to_camera();
        let geometry = *scene.geometry();
        let index = scene.index();

        let visible: Vec<EntryId> = self.backend().install(|| {
            index
                .occupied()
                .par_iter()
                .copied()
                .filter(|&id| {
                    let bounds = geometry.block_bounds(index.entry(id).coord).transformed(&world_to_camera);
                    frustum.intersects_aabb(&bounds)
                })
                .collect()
        });

        let count = visible.len();
        scene.index_mut().set_visible(visible);
        count
    }
}
