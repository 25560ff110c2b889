//! Voxel data structures and the sparse hashed volume

pub mod voxel;
pub mod block;
pub mod block_pool;
pub mod hash_index;
pub mod scene;

pub use voxel::{BlockSummary, TsdfVoxel};
pub use block::{BlockCoord, BlockGeometry, MAX_BLOCK_SIDE};
pub use block_pool::{BlockIndex, VoxelBlockPool};
pub use hash_index::{EntryId, HashEntry, Residency, SpatialHashIndex};
pub use scene::{AllocationFailure, Scene, SceneParams, SceneStats};
