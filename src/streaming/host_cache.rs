//! In-memory swap cache of compressed blocks
//!
//! Blocks leaving the working pool are archived with rkyv and compressed
//! with LZ4. At most `transfer_limit` blocks move in each direction per call.

use std::collections::HashMap;

use rkyv::{Archive, Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::streaming::SwapManager;
use crate::voxel::{BlockCoord, BlockSummary, EntryId, Residency, Scene, TsdfVoxel};

/// Archived form of one block
#[derive(Archive, Deserialize, Serialize)]
pub struct SwappedBlock {
    pub coord: BlockCoord,
    pub voxels: Vec<TsdfVoxel>,
}

/// Serialize and compress a block
pub fn compress_block(block: &SwappedBlock) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(block)
        .map_err(|e| Error::Swap(format!("failed to archive block: {}", e)))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Decompress and deserialize a block
pub fn decompress_block(data: &[u8]) -> Result<SwappedBlock> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Swap(format!("LZ4 decompression failed: {}", e)))?;

    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(decompressed.len());
    aligned.extend_from_slice(&decompressed);

    let archived = rkyv::access::<ArchivedSwappedBlock, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Swap(format!("corrupt block record: {}", e)))?;
    rkyv::deserialize::<SwappedBlock, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Swap(format!("corrupt block record: {}", e)))
}

/// Compressed block plus the summary decay needs without decompressing
struct StoredBlock {
    data: Vec<u8>,
    summary: BlockSummary,
}

/// Swap manager holding evicted blocks in host memory
pub struct HostSwapCache {
    store: HashMap<BlockCoord, StoredBlock>,
    transfer_limit: usize,
}

impl HostSwapCache {
    pub fn new(transfer_limit: u32) -> Self {
        Self {
            store: HashMap::new(),
            transfer_limit: transfer_limit.max(1) as usize,
        }
    }

    /// Blocks currently held
    pub fn stored_blocks(&self) -> usize {
        self.store.len()
    }

    /// Compressed bytes currently held
    pub fn stored_bytes(&self) -> usize {
        self.store.values().map(|b| b.data.len()).sum()
    }

    pub fn contains(&self, coord: BlockCoord) -> bool {
        self.store.contains_key(&coord)
    }
}

impl SwapManager for HostSwapCache {
    fn swap_in(&mut self, scene: &mut Scene, ids: &[EntryId]) -> Result<usize> {
        let mut restored = 0;

        for &id in ids.iter().take(self.transfer_limit) {
            let entry = *scene.index().entry(id);
            if entry.residency != Residency::SwappedOut {
                continue;
            }

            let Some(record) = self.store.remove(&entry.coord) else {
                log::warn!("No stored record for swapped-out block {:?}; dropping it", entry.coord);
                scene.deallocate(id);
                continue;
            };

            let block = match decompress_block(&record.data) {
                Ok(block) => block,
                Err(e) => {
                    scene.deallocate(id);
                    return Err(e);
                }
            };
            if block.coord != entry.coord || block.voxels.len() != scene.geometry().voxels_per_block() {
                scene.deallocate(id);
                return Err(Error::Swap(format!("record for {:?} does not match its entry", entry.coord)));
            }

            if scene.restore_block(id, &block.voxels).is_err() {
                self.store.insert(entry.coord, record);
                return Err(Error::Swap(format!(
                    "pool exhausted after restoring {} blocks",
                    restored
                )));
            }
            restored += 1;
        }

        if restored > 0 {
            log::debug!("Swapped in {} blocks ({} still stored)", restored, self.store.len());
        }
        Ok(restored)
    }

    fn swap_out(&mut self, scene: &mut Scene, ids: &[EntryId]) -> Result<usize> {
        let mut stored = 0;

        for &id in ids.iter().take(self.transfer_limit) {
            let entry = *scene.index().entry(id);
            let Some(block) = entry.block() else {
                continue;
            };

            let voxels = scene.pool().block(block);
            let summary = BlockSummary::of(voxels);
            let data = compress_block(&SwappedBlock {
                coord: entry.coord,
                voxels: voxels.to_vec(),
            })?;
            self.store.insert(entry.coord, StoredBlock { data, summary });
            scene.evict_block(id);
            stored += 1;
        }

        if stored > 0 {
            log::debug!(
                "Swapped out {} blocks ({} stored, {} bytes)",
                stored,
                self.store.len(),
                self.stored_bytes()
            );
        }
        Ok(stored)
    }

    fn block_summary(&self, coord: BlockCoord) -> Option<BlockSummary> {
        self.store.get(&coord).map(|b| b.summary)
    }

    fn forget(&mut self, coords: &[BlockCoord]) {
        for coord in coords {
            self.store.remove(coord);
        }
    }

    fn clear(&mut self) {
        self.store.clear();
    }
}
