//! Scene - the persistent reconstruction state
//!
//! Owns the voxel block pool, the spatial hash index and the free lists of
//! both. Capacity is fixed for the lifetime of the session; `reset` empties
//! the scene without releasing the arenas.

use std::collections::HashSet;

use glam::Vec3;

use crate::core::{Error, Result};
use crate::voxel::block::{BlockCoord, BlockGeometry, MAX_BLOCK_SIDE};
use crate::voxel::block_pool::{BlockIndex, VoxelBlockPool};
use crate::voxel::hash_index::{EntryId, InsertError, Residency, SpatialHashIndex};
use crate::voxel::voxel::TsdfVoxel;

/// Capacity and layout of a scene
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneParams {
    /// Voxels per block edge
    pub block_side: u32,
    /// Voxel edge length in meters
    pub voxel_size: f32,
    /// Primary hash buckets (power of two)
    pub bucket_count: u32,
    /// Overflow entries shared by all buckets
    pub excess_capacity: u32,
    /// Blocks in the working pool
    pub block_capacity: u32,
}

/// Why a block could not be allocated this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationFailure {
    /// No free block in the pool
    PoolExhausted,
    /// Primary bucket taken and no free excess entry
    ExcessExhausted,
}

/// Occupancy counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub allocated_entries: usize,
    pub resident_blocks: u32,
    pub swapped_out_blocks: usize,
    pub free_blocks: u32,
    pub free_excess_entries: u32,
}

/// Sparse voxel volume addressed through a spatial hash
pub struct Scene {
    geometry: BlockGeometry,
    pool: VoxelBlockPool,
    index: SpatialHashIndex,
}

impl Scene {
    /// Create an empty scene
    pub fn new(params: &SceneParams) -> Result<Self> {
        if params.block_side == 0 || !params.block_side.is_power_of_two() || params.block_side > MAX_BLOCK_SIDE {
            return Err(Error::InvalidConfig(format!(
                "block side must be a power of two in 1..={}, got {}",
                MAX_BLOCK_SIDE, params.block_side
            )));
        }
        if !(params.voxel_size.is_finite() && params.voxel_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "voxel size must be finite and positive, got {}",
                params.voxel_size
            )));
        }

        let geometry = BlockGeometry::new(params.block_side, params.voxel_size);
        let pool = VoxelBlockPool::new(params.block_capacity, geometry.voxels_per_block())?;
        let index = SpatialHashIndex::new(params.bucket_count, params.excess_capacity)?;

        log::info!(
            "Created scene: {} buckets, {} excess entries, {} blocks of {}^3 voxels ({}m)",
            params.bucket_count,
            params.excess_capacity,
            params.block_capacity,
            params.block_side,
            geometry.block_extent()
        );

        Ok(Self { geometry, pool, index })
    }

    /// Return every block to the free lists
    pub fn reset(&mut self) {
        self.pool.reset();
        self.index.reset();
        log::debug!("Scene reset");
    }

    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    pub fn pool(&self) -> &VoxelBlockPool {
        &self.pool
    }

    pub fn index(&self) -> &SpatialHashIndex {
        &self.index
    }

    #[cfg(test)]
    pub(crate) fn pool_mut(&mut self) -> &mut VoxelBlockPool {
        &mut self.pool
    }

    pub(crate) fn index_mut(&mut self) -> &mut SpatialHashIndex {
        &mut self.index
    }

    /// Split borrow for passes that read the index while writing voxels
    pub(crate) fn parts_mut(&mut self) -> (&BlockGeometry, &mut VoxelBlockPool, &mut SpatialHashIndex) {
        (&self.geometry, &mut self.pool, &mut self.index)
    }

    /// Entry holding a block coordinate
    pub fn find(&self, coord: BlockCoord) -> Option<EntryId> {
        self.index.find(coord)
    }

    /// Materialize a block that is not yet in the index.
    ///
    /// Already present coordinates return their existing entry.
    pub fn allocate_block(&mut self, coord: BlockCoord) -> std::result::Result<EntryId, AllocationFailure> {
        if let Some(id) = self.index.find(coord) {
            return Ok(id);
        }
        let block = self.pool.allocate().ok_or(AllocationFailure::PoolExhausted)?;
        match self.index.insert(coord, Residency::Resident(block)) {
            Ok(id) => {
                log::trace!("Allocated block {:?} -> entry {} / pool {}", coord, id.0, block.0);
                Ok(id)
            }
            Err(InsertError::ExcessExhausted) => {
                self.pool.release(block);
                Err(AllocationFailure::ExcessExhausted)
            }
        }
    }

    /// Remove a block from the index and reset its storage.
    ///
    /// Returns the coordinate it held.
    pub fn deallocate(&mut self, id: EntryId) -> Option<BlockCoord> {
        let entry = self.index.remove(id)?;
        if let Residency::Resident(block) = entry.residency {
            self.pool.release(block);
        }
        Some(entry.coord)
    }

    /// Remove many blocks at once. Returns the coordinates that were held.
    pub fn deallocate_many(&mut self, ids: &[EntryId]) -> Vec<BlockCoord> {
        let removed = self.index.remove_many(ids);
        for entry in &removed {
            if let Residency::Resident(block) = entry.residency {
                self.pool.release(block);
            }
        }
        removed.into_iter().map(|e| e.coord).collect()
    }

    /// Release a resident block's storage, keeping its entry as swapped out.
    ///
    /// Callers copy the voxels out first; they are reset here.
    pub fn evict_block(&mut self, id: EntryId) -> Option<BlockCoord> {
        let entry = *self.index.entry(id);
        let block = entry.block()?;
        self.pool.release(block);
        self.index.entry_mut(id).residency = Residency::SwappedOut;
        Some(entry.coord)
    }

    /// Bring a swapped-out block back into the pool
    pub fn restore_block(&mut self, id: EntryId, voxels: &[TsdfVoxel]) -> std::result::Result<BlockIndex, AllocationFailure> {
        debug_assert_eq!(self.index.entry(id).residency, Residency::SwappedOut);
        debug_assert_eq!(voxels.len(), self.geometry.voxels_per_block());
        let block = self.pool.allocate().ok_or(AllocationFailure::PoolExhausted)?;
        self.pool.block_mut(block).copy_from_slice(voxels);
        self.index.entry_mut(id).residency = Residency::Resident(block);
        Ok(block)
    }

    /// Voxels of a resident block
    pub fn block_voxels(&self, coord: BlockCoord) -> Option<&[TsdfVoxel]> {
        let id = self.index.find(coord)?;
        let block = self.index.entry(id).block()?;
        Some(self.pool.block(block))
    }

    /// Voxel containing a world position, if its block is resident
    pub fn voxel_at(&self, pos: Vec3) -> Option<&TsdfVoxel> {
        let (coord, local) = self.geometry.locate_voxel(pos);
        self.block_voxels(coord).map(|voxels| &voxels[local])
    }

    /// Entries in the current visibility set
    pub fn visible_entries(&self) -> &[EntryId] {
        self.index.visible()
    }

    /// Coordinates of every allocated block
    pub fn allocated_coords(&self) -> Vec<BlockCoord> {
        self.index
            .occupied_ids()
            .map(|id| self.index.entry(id).coord)
            .collect()
    }

    pub fn stats(&self) -> SceneStats {
        let swapped_out_blocks = self
            .index
            .occupied_ids()
            .filter(|&id| self.index.entry(id).residency == Residency::SwappedOut)
            .count();
        SceneStats {
            allocated_entries: self.index.occupied_count(),
            resident_blocks: self.pool.allocated_count(),
            swapped_out_blocks,
            free_blocks: self.pool.free_count(),
            free_excess_entries: self.index.excess_free_count(),
        }
    }

    /// Verify the structural invariants of pool and index.
    ///
    /// Checks that no coordinate appears twice, that every occupied entry is
    /// reachable from its bucket, that pool blocks and resident entries map
    /// one-to-one and that the free-list sizes add up.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut coords = HashSet::new();
        let mut blocks = HashSet::new();
        let mut excess_used = 0u32;

        for id in self.index.occupied_ids() {
            let entry = self.index.entry(id);
            if !coords.insert(entry.coord) {
                return Err(format!("coordinate {:?} stored twice", entry.coord));
            }
            if self.index.find(entry.coord) != Some(id) {
                return Err(format!("entry {} for {:?} unreachable from its bucket", id.0, entry.coord));
            }
            if !self.index.is_primary(id) {
                excess_used += 1;
            }
            if let Residency::Resident(block) = entry.residency {
                if !blocks.insert(block) {
                    return Err(format!("pool block {} owned twice", block.0));
                }
                if !self.pool.is_in_use(block) {
                    return Err(format!("entry {} points at free pool block {}", id.0, block.0));
                }
            }
        }

        if blocks.len() as u32 != self.pool.allocated_count() {
            return Err(format!(
                "{} resident entries but {} pool blocks in use",
                blocks.len(),
                self.pool.allocated_count()
            ));
        }
        if excess_used + self.index.excess_free_count() != self.index.excess_capacity() {
            return Err(format!(
                "{} excess entries used + {} free != capacity {}",
                excess_used,
                self.index.excess_free_count(),
                self.index.excess_capacity()
            ));
        }
        let scanned = self.index.entries().iter().filter(|e| e.is_occupied()).count();
        if scanned != self.index.occupied_count() {
            return Err(format!(
                "{} occupied entries but {} listed",
                scanned,
                self.index.occupied_count()
            ));
        }
        for &id in self.index.visible() {
            if !self.index.entry(id).is_occupied() {
                return Err(format!("visible entry {} is unallocated", id.0));
            }
        }
        Ok(())
    }
}
