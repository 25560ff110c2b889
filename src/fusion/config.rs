//! Fusion session configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::voxel::{MAX_BLOCK_SIDE, SceneParams};

/// Configuration of one reconstruction session.
///
/// Capacities are fixed for the session's lifetime; thresholds can be
/// changed between frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Voxels per block edge. Power of two, at most 16.
    pub block_side: u32,
    /// Voxel edge length in meters.
    pub voxel_size: f32,
    /// Truncation band half-width in meters.
    pub truncation_distance: f32,
    /// Integration saturation weight.
    pub max_weight: u16,
    /// Valid sensor depth (near, far) in meters.
    pub depth_range: (f32, f32),
    /// Primary hash buckets. Power of two.
    pub bucket_count: u32,
    /// Overflow entries shared by all buckets.
    pub excess_capacity: u32,
    /// Voxel blocks in working memory.
    pub block_capacity: u32,
    /// Fuse color when the view carries a color image.
    pub integrate_color: bool,
    /// Blocks whose strongest voxel weight is at most this are decay candidates.
    pub decay_max_weight: u16,
    /// Blocks untouched for at least this many visible frames are decay candidates.
    pub decay_min_age: u16,
    /// Move blocks that leave the view to the host swap cache.
    pub swapping: bool,
    /// Maximum blocks moved per direction per frame when swapping.
    pub swap_transfer_limit: u32,
    /// Worker threads for data-parallel passes. 0 = all cores, 1 = sequential.
    pub threads: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            block_side: 8,
            voxel_size: 0.005,           // 5mm voxels, 4cm blocks
            truncation_distance: 0.02,
            max_weight: 100,
            depth_range: (0.2, 3.0),
            bucket_count: 0x10_0000,
            excess_capacity: 0x2_0000,
            block_capacity: 0x4_0000,    // ~1.6GB of voxels at 8^3
            integrate_color: false,
            decay_max_weight: 1,
            decay_min_age: 30,
            swapping: false,
            swap_transfer_limit: 0x4000,
            threads: 0,
        }
    }
}

impl FusionConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: FusionConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.block_side == 0 || !self.block_side.is_power_of_two() || self.block_side > MAX_BLOCK_SIDE {
            return invalid(format!(
                "block_side must be a power of two in 1..={}, got {}",
                MAX_BLOCK_SIDE, self.block_side
            ));
        }
        if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
            return invalid(format!("voxel_size must be positive, got {}", self.voxel_size));
        }
        if !(self.truncation_distance.is_finite() && self.truncation_distance > 0.0) {
            return invalid(format!(
                "truncation_distance must be positive, got {}",
                self.truncation_distance
            ));
        }
        if self.max_weight == 0 {
            return invalid("max_weight must be non-zero".into());
        }
        let (near, far) = self.depth_range;
        if !(near.is_finite() && far.is_finite() && near > 0.0 && far > near) {
            return invalid(format!("depth_range must satisfy 0 < near < far, got {:?}", self.depth_range));
        }
        if self.bucket_count == 0 || !self.bucket_count.is_power_of_two() {
            return invalid(format!(
                "bucket_count must be a non-zero power of two, got {}",
                self.bucket_count
            ));
        }
        if self.block_capacity == 0 {
            return invalid("block_capacity must be non-zero".into());
        }
        if self.swapping && self.swap_transfer_limit == 0 {
            return invalid("swap_transfer_limit must be non-zero when swapping".into());
        }
        Ok(())
    }

    /// Scene layout and capacity
    pub fn scene_params(&self) -> SceneParams {
        SceneParams {
            block_side: self.block_side,
            voxel_size: self.voxel_size,
            bucket_count: self.bucket_count,
            excess_capacity: self.excess_capacity,
            block_capacity: self.block_capacity,
        }
    }

    /// Check a depth measurement against the valid sensor range
    pub fn is_valid_depth(&self, depth: f32) -> bool {
        depth.is_finite() && depth >= self.depth_range.0 && depth <= self.depth_range.1
    }
}
