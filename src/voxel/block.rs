//! Voxel block addressing
//!
//! A block is a cube of `side^3` voxels addressed by an integer block
//! coordinate (block position in units of the block edge length).

use glam::{IVec3, UVec3, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

use crate::math::Aabb;

/// Largest supported block side, in voxels
pub const MAX_BLOCK_SIDE: u32 = 16;

/// Integer coordinate identifying a voxel block
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Deserialize, Serialize)]
pub struct BlockCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockCoord {
    /// Create a new block coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for BlockCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Physical layout shared by every block of a scene
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockGeometry {
    /// Voxels per block edge (power of two)
    pub side: u32,
    /// Edge length of one voxel in meters
    pub voxel_size: f32,
}

impl BlockGeometry {
    pub fn new(side: u32, voxel_size: f32) -> Self {
        Self { side, voxel_size }
    }

    /// Voxels stored per block
    pub fn voxels_per_block(&self) -> usize {
        (self.side * self.side * self.side) as usize
    }

    /// Edge length of one block in meters
    pub fn block_extent(&self) -> f32 {
        self.side as f32 * self.voxel_size
    }

    /// Block containing a world position
    pub fn block_at(&self, pos: Vec3) -> BlockCoord {
        (pos / self.block_extent()).floor().as_ivec3().into()
    }

    /// World-space minimum corner of a block
    pub fn block_origin(&self, coord: BlockCoord) -> Vec3 {
        coord.as_ivec3().as_vec3() * self.block_extent()
    }

    /// World-space bounds of a block
    pub fn block_bounds(&self, coord: BlockCoord) -> Aabb {
        let origin = self.block_origin(coord);
        Aabb::new(origin, origin + Vec3::splat(self.block_extent()))
    }

    /// Linear index of a voxel inside a block, x fastest
    pub fn local_index(&self, local: UVec3) -> usize {
        debug_assert!(local.x < self.side && local.y < self.side && local.z < self.side);
        ((local.z * self.side + local.y) * self.side + local.x) as usize
    }

    /// Inverse of [`Self::local_index`]
    pub fn local_coords(&self, index: usize) -> UVec3 {
        let index = index as u32;
        UVec3::new(
            index % self.side,
            (index / self.side) % self.side,
            index / (self.side * self.side),
        )
    }

    /// World-space center of a voxel
    pub fn voxel_center(&self, coord: BlockCoord, index: usize) -> Vec3 {
        let local = self.local_coords(index).as_vec3();
        self.block_origin(coord) + (local + Vec3::splat(0.5)) * self.voxel_size
    }

    /// Block and in-block voxel index containing a world position
    pub fn locate_voxel(&self, pos: Vec3) -> (BlockCoord, usize) {
        let global = (pos / self.voxel_size).floor().as_ivec3();
        let side = self.side as i32;
        let block = IVec3::new(
            global.x.div_euclid(side),
            global.y.div_euclid(side),
            global.z.div_euclid(side),
        );
        let local = (global - block * side).as_uvec3();
        (block.into(), self.local_index(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> BlockGeometry {
        BlockGeometry::new(8, 0.01)
    }

    #[test]
    fn test_block_at() {
        let g = geometry();
        assert_eq!(g.block_at(Vec3::new(0.01, 0.01, 0.01)), BlockCoord::new(0, 0, 0));
        assert_eq!(g.block_at(Vec3::new(0.1, 0.0, 2.01)), BlockCoord::new(1, 0, 25));
        assert_eq!(g.block_at(Vec3::new(-0.01, -0.09, 0.0)), BlockCoord::new(-1, -2, 0));
    }

    #[test]
    fn test_block_bounds() {
        let g = geometry();
        let bounds = g.block_bounds(BlockCoord::new(1, -1, 0));
        assert!((bounds.min - Vec3::new(0.08, -0.08, 0.0)).length() < 1e-6);
        assert!((bounds.max - Vec3::new(0.16, 0.0, 0.08)).length() < 1e-6);
    }

    #[test]
    fn test_local_index_roundtrip_corners() {
        let g = geometry();
        assert_eq!(g.local_index(UVec3::ZERO), 0);
        assert_eq!(g.local_index(UVec3::new(1, 0, 0)), 1);
        assert_eq!(g.local_index(UVec3::new(0, 1, 0)), 8);
        assert_eq!(g.local_index(UVec3::new(0, 0, 1)), 64);
        assert_eq!(g.local_coords(511), UVec3::splat(7));
        assert_eq!(g.voxels_per_block(), 512);
    }

    #[test]
    fn test_voxel_center() {
        let g = geometry();
        let center = g.voxel_center(BlockCoord::new(0, 0, 1), g.local_index(UVec3::new(1, 2, 3)));
        assert!((center - Vec3::new(0.015, 0.025, 0.115)).length() < 1e-6);
    }

    #[test]
    fn test_locate_voxel_negative() {
        let g = geometry();
        let (block, index) = g.locate_voxel(Vec3::new(-0.005, 0.005, 0.085));
        assert_eq!(block, BlockCoord::new(-1, 0, 1));
        assert_eq!(g.local_coords(index), UVec3::new(7, 0, 0));
    }
}
