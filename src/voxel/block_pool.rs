//! Voxel Block Pool - fixed-capacity arena of voxel blocks
//!
//! - Fixed capacity chosen at session start, never grows
//! - Blocks are handed out and reclaimed by index through a free list
//! - Reclaimed blocks are reset to empty voxels before reuse

use rayon::prelude::*;
use rayon::slice::ChunksMut;

use crate::core::{Error, Result};
use crate::voxel::voxel::TsdfVoxel;

/// Index of a block's storage inside the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(pub u32);

impl BlockIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of equally sized voxel blocks
pub struct VoxelBlockPool {
    /// Voxel storage, `capacity * block_voxels` entries
    voxels: Vec<TsdfVoxel>,
    /// Voxels per block
    block_voxels: usize,
    /// Capacity in number of blocks
    capacity: u32,
    /// Whether each block is currently handed out
    in_use: Vec<bool>,
    /// Stack of free block indices, lowest index on top
    free_blocks: Vec<u32>,
}

impl VoxelBlockPool {
    /// Create a new pool with given capacity
    pub fn new(capacity: u32, block_voxels: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("voxel block pool capacity must be non-zero".into()));
        }
        if block_voxels == 0 {
            return Err(Error::InvalidConfig("voxel blocks must hold at least one voxel".into()));
        }

        let voxels = vec![TsdfVoxel::EMPTY; capacity as usize * block_voxels];

        log::info!(
            "Created voxel block pool: {} blocks, {}MB",
            capacity,
            voxels.len() * std::mem::size_of::<TsdfVoxel>() / 1024 / 1024
        );

        Ok(Self {
            voxels,
            block_voxels,
            capacity,
            in_use: vec![false; capacity as usize],
            free_blocks: (0..capacity).rev().collect(),
        })
    }

    /// Take a free block, or `None` when the pool is exhausted
    pub fn allocate(&mut self) -> Option<BlockIndex> {
        let idx = self.free_blocks.pop()?;
        self.in_use[idx as usize] = true;
        Some(BlockIndex(idx))
    }

    /// Return a block to the free list, resetting its voxels
    pub fn release(&mut self, block: BlockIndex) {
        let idx = block.index();
        if !self.in_use[idx] {
            log::warn!("Released voxel block {} twice", idx);
            return;
        }
        self.block_mut(block).fill(TsdfVoxel::EMPTY);
        self.in_use[idx] = false;
        self.free_blocks.push(block.0);
    }

    /// Return every block to the free list without freeing the arena
    pub fn reset(&mut self) {
        self.voxels.par_iter_mut().for_each(|v| *v = TsdfVoxel::EMPTY);
        self.in_use.fill(false);
        self.free_blocks.clear();
        self.free_blocks.extend((0..self.capacity).rev());
    }

    /// Voxels of one block
    pub fn block(&self, block: BlockIndex) -> &[TsdfVoxel] {
        let start = block.index() * self.block_voxels;
        &self.voxels[start..start + self.block_voxels]
    }

    /// Mutable voxels of one block
    pub fn block_mut(&mut self, block: BlockIndex) -> &mut [TsdfVoxel] {
        let start = block.index() * self.block_voxels;
        &mut self.voxels[start..start + self.block_voxels]
    }

    /// Parallel iterator over every block's voxels, in index order
    pub fn par_blocks_mut(&mut self) -> ChunksMut<'_, TsdfVoxel> {
        self.voxels.par_chunks_mut(self.block_voxels)
    }

    /// Check if a block is handed out
    pub fn is_in_use(&self, block: BlockIndex) -> bool {
        self.in_use.get(block.index()).copied().unwrap_or(false)
    }

    /// Get capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Voxels per block
    pub fn block_voxels(&self) -> usize {
        self.block_voxels
    }

    /// Number of free blocks
    pub fn free_count(&self) -> u32 {
        self.free_blocks.len() as u32
    }

    /// Number of blocks handed out
    pub fn allocated_count(&self) -> u32 {
        self.capacity - self.free_count()
    }

    /// Get pool utilization percentage
    pub fn utilization(&self) -> f32 {
        self.allocated_count() as f32 / self.capacity as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(matches!(VoxelBlockPool::new(0, 512), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let mut pool = VoxelBlockPool::new(3, 8).unwrap();
        assert_eq!(pool.allocate(), Some(BlockIndex(0)));
        assert_eq!(pool.allocate(), Some(BlockIndex(1)));
        assert_eq!(pool.allocate(), Some(BlockIndex(2)));
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.utilization(), 100.0);
    }

    #[test]
    fn test_release_resets_and_reuses() {
        let mut pool = VoxelBlockPool::new(2, 8).unwrap();
        let block = pool.allocate().unwrap();
        pool.block_mut(block)[3].fuse_sdf(0.5, 10);
        assert!(pool.block(block)[3].is_observed());

        pool.release(block);
        assert_eq!(pool.free_count(), 2);
        assert!(!pool.is_in_use(block));
        assert!(pool.block(block).iter().all(|v| *v == TsdfVoxel::EMPTY));

        assert_eq!(pool.allocate(), Some(block));
    }

    #[test]
    fn test_double_release_is_ignored() {
        let mut pool = VoxelBlockPool::new(2, 8).unwrap();
        let block = pool.allocate().unwrap();
        pool.release(block);
        pool.release(block);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_reset() {
        let mut pool = VoxelBlockPool::new(4, 8).unwrap();
        for _ in 0..4 {
            let block = pool.allocate().unwrap();
            pool.block_mut(block)[0].fuse_sdf(-0.2, 10);
        }
        pool.reset();
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.allocated_count(), 0);
        assert!(pool.block(BlockIndex(2)).iter().all(|v| !v.is_observed()));
    }

    #[test]
    fn test_par_blocks_mut_covers_pool() {
        let mut pool = VoxelBlockPool::new(5, 8).unwrap();
        assert_eq!(pool.par_blocks_mut().count(), 5);
    }
}
