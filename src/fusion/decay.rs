//! Removal of weakly observed, stale blocks

use rayon::prelude::*;

use crate::fusion::engine::ReconstructionEngine;
use crate::fusion::stats::DecayStats;
use crate::streaming::SwapManager;
use crate::voxel::{BlockCoord, BlockIndex, BlockSummary, EntryId, Residency, Scene};

/// Outcome of a decay pass
#[derive(Clone, Debug, Default)]
pub struct DecayReport {
    pub stats: DecayStats,
    /// Coordinates whose blocks were removed
    pub removed: Vec<BlockCoord>,
}

impl ReconstructionEngine {
    /// Deallocate every block whose voxels all have weight at most
    /// `max_weight` and age at least `min_age`.
    ///
    /// Resident blocks are judged from the pool. Swapped-out blocks are judged
    /// from the summary `store` kept when they were evicted; those it holds no
    /// summary for are kept. Callers drop the removed coordinates from `store`.
    pub fn decay(&self, scene: &mut Scene, max_weight: u16, min_age: u16, store: &dyn SwapManager) -> DecayReport {
        let index = scene.index();
        let pool = scene.pool();

        let mut resident: Vec<(EntryId, BlockIndex)> = Vec::new();
        let mut doomed: Vec<EntryId> = Vec::new();
        let mut scanned = 0;
        for id in index.occupied_ids() {
            let entry = index.entry(id);
            scanned += 1;
            match entry.residency {
                Residency::Resident(block) => resident.push((id, block)),
                Residency::SwappedOut => {
                    if store
                        .block_summary(entry.coord)
                        .is_some_and(|s| s.is_stale(max_weight, min_age))
                    {
                        doomed.push(id);
                    }
                }
                Residency::Unallocated => {}
            }
        }

        let stale: Vec<EntryId> = self.backend().install(|| {
            resident
                .par_iter()
                .filter(|(_, block)| BlockSummary::of(pool.block(*block)).is_stale(max_weight, min_age))
                .map(|(id, _)| *id)
                .collect()
        });
        doomed.extend(stale);

        let removed = scene.deallocate_many(&doomed);

        if removed.is_empty() {
            log::debug!("Decay: scanned {} blocks, none removed", scanned);
        } else {
            log::info!(
                "Decay: removed {} of {} blocks (weight <= {}, age >= {})",
                removed.len(),
                scanned,
                max_weight,
                min_age
            );
        }

        DecayReport {
            stats: DecayStats {
                scanned,
                removed: removed.len(),
            },
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::config::FusionConfig;
    use crate::streaming::{HostSwapCache, NoSwap};

    fn engine() -> ReconstructionEngine {
        ReconstructionEngine::new(FusionConfig {
            bucket_count: 64,
            excess_capacity: 8,
            block_capacity: 8,
            threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn set_block(scene: &mut Scene, coord: BlockCoord, weight: u16, age: u16) {
        let id = scene.allocate_block(coord).unwrap();
        let block = scene.index().entry(id).block().unwrap();
        for v in scene.pool_mut().block_mut(block) {
            v.weight = weight;
            v.age = age;
        }
    }

    #[test]
    fn test_removes_weak_stale_blocks() {
        let engine = engine();
        let mut scene = engine.create_scene().unwrap();
        set_block(&mut scene, BlockCoord::new(0, 0, 0), 1, 40);
        set_block(&mut scene, BlockCoord::new(1, 0, 0), 0, 30);

        let report = engine.decay(&mut scene, 1, 30, &NoSwap);
        assert_eq!(report.stats.scanned, 2);
        assert_eq!(report.stats.removed, 2);
        assert!(scene.find(BlockCoord::new(0, 0, 0)).is_none());

        let stats = scene.stats();
        assert_eq!(stats.allocated_entries, 0);
        assert_eq!(stats.free_blocks, 8);
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_keeps_confident_or_recent_blocks() {
        let engine = engine();
        let mut scene = engine.create_scene().unwrap();

        // Heavy
        set_block(&mut scene, BlockCoord::new(0, 0, 0), 5, 100);
        // Recently seen
        set_block(&mut scene, BlockCoord::new(1, 0, 0), 1, 3);
        // One strong voxel keeps the whole block
        set_block(&mut scene, BlockCoord::new(2, 0, 0), 1, 100);
        let id = scene.find(BlockCoord::new(2, 0, 0)).unwrap();
        let block = scene.index().entry(id).block().unwrap();
        scene.pool_mut().block_mut(block)[17].weight = 9;

        let report = engine.decay(&mut scene, 1, 30, &NoSwap);
        assert_eq!(report.stats.removed, 0);
        assert_eq!(scene.stats().allocated_entries, 3);
    }

    #[test]
    fn test_swapped_out_block_without_summary_is_kept() {
        let engine = engine();
        let mut scene = engine.create_scene().unwrap();
        set_block(&mut scene, BlockCoord::new(0, 0, 0), 0, 100);
        let id = scene.find(BlockCoord::new(0, 0, 0)).unwrap();
        scene.evict_block(id).unwrap();

        let report = engine.decay(&mut scene, 1, 30, &NoSwap);
        assert_eq!(report.stats.scanned, 1);
        assert_eq!(report.stats.removed, 0);
        assert_eq!(scene.index().entry(id).residency, Residency::SwappedOut);
    }

    #[test]
    fn test_judges_swapped_out_blocks_by_summary() {
        let engine = engine();
        let mut scene = engine.create_scene().unwrap();
        let mut cache = HostSwapCache::new(16);
        set_block(&mut scene, BlockCoord::new(0, 0, 0), 1, 40);
        set_block(&mut scene, BlockCoord::new(1, 0, 0), 6, 40);
        let ids: Vec<_> = [BlockCoord::new(0, 0, 0), BlockCoord::new(1, 0, 0)]
            .iter()
            .map(|&c| scene.find(c).unwrap())
            .collect();
        cache.swap_out(&mut scene, &ids).unwrap();
        assert_eq!(scene.stats().swapped_out_blocks, 2);

        let report = engine.decay(&mut scene, 1, 30, &cache);
        assert_eq!(report.stats.scanned, 2);
        assert_eq!(report.removed, vec![BlockCoord::new(0, 0, 0)]);
        assert!(scene.find(BlockCoord::new(0, 0, 0)).is_none());
        assert_eq!(scene.index().entry(ids[1]).residency, Residency::SwappedOut);
        assert_eq!(scene.stats().free_blocks, 8);
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_freed_entries_are_reusable() {
        let engine = engine();
        let mut scene = engine.create_scene().unwrap();
        for x in 0..8 {
            set_block(&mut scene, BlockCoord::new(x, 0, 0), 0, 50);
        }
        assert_eq!(scene.stats().free_blocks, 0);

        engine.decay(&mut scene, 0, 50, &NoSwap);
        for x in 10..18 {
            scene.allocate_block(BlockCoord::new(x, 0, 0)).unwrap();
        }
        scene.check_invariants().unwrap();
    }
}
