//! Block residency between the working pool and secondary storage

pub mod host_cache;

pub use host_cache::HostSwapCache;

use crate::core::Result;
use crate::voxel::{BlockCoord, BlockSummary, EntryId, Scene};

/// Moves cold blocks out of the working pool and back in.
///
/// Called once per frame after integration. Errors are treated as
/// non-fatal by the mapper: affected blocks keep their current residency.
pub trait SwapManager: Send {
    /// Whether the mapper should drive this manager at all
    fn is_active(&self) -> bool {
        true
    }

    /// Bring swapped-out entries back into the pool. Returns blocks restored.
    fn swap_in(&mut self, scene: &mut Scene, ids: &[EntryId]) -> Result<usize>;

    /// Move resident entries out of the pool. Returns blocks stored.
    fn swap_out(&mut self, scene: &mut Scene, ids: &[EntryId]) -> Result<usize>;

    /// Weight and age extremes of a stored block, if this manager holds it
    fn block_summary(&self, _coord: BlockCoord) -> Option<BlockSummary> {
        None
    }

    /// Drop stored records for coordinates removed from the scene
    fn forget(&mut self, coords: &[BlockCoord]);

    /// Drop every stored record
    fn clear(&mut self);
}

/// Keeps every block resident
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSwap;

impl SwapManager for NoSwap {
    fn is_active(&self) -> bool {
        false
    }

    fn swap_in(&mut self, _scene: &mut Scene, _ids: &[EntryId]) -> Result<usize> {
        Ok(0)
    }

    fn swap_out(&mut self, _scene: &mut Scene, _ids: &[EntryId]) -> Result<usize> {
        Ok(0)
    }

    fn forget(&mut self, _coords: &[BlockCoord]) {}

    fn clear(&mut self) {}
}
