//! Truncated signed distance voxel

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

/// Single TSDF voxel - exactly 12 bytes
///
/// `sdf` is normalized to the truncation band, so it stays in [-1, 1].
/// It is meaningless while `weight == 0`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct TsdfVoxel {
    /// Normalized truncated signed distance (positive = in front of surface)
    pub sdf: f32,
    /// Accumulated depth weight, capped at the session's max weight
    pub weight: u16,
    /// Frames since this voxel was last fused while its block was visible
    pub age: u16,
    /// Accumulated RGB color
    pub color: [u8; 3],
    /// Accumulated color weight
    pub color_weight: u8,
}

impl TsdfVoxel {
    /// Unobserved voxel
    pub const EMPTY: TsdfVoxel = TsdfVoxel {
        sdf: 1.0,
        weight: 0,
        age: 0,
        color: [0; 3],
        color_weight: 0,
    };

    /// Check if any depth sample was fused into this voxel
    pub fn is_observed(&self) -> bool {
        self.weight > 0
    }

    /// Fuse one normalized distance sample.
    ///
    /// The running average divides by the uncapped weight, then the stored
    /// weight saturates at `max_weight`.
    pub fn fuse_sdf(&mut self, sample: f32, max_weight: u16) {
        let old_weight = self.weight as f32;
        let fused = (self.sdf * old_weight + sample) / (old_weight + 1.0);
        self.sdf = fused.clamp(-1.0, 1.0);
        self.weight = self.weight.saturating_add(1).min(max_weight);
        self.age = 0;
    }

    /// Fuse one color sample, with the color weight saturating at `max_weight`
    pub fn fuse_color(&mut self, sample: [u8; 3], max_weight: u8) {
        let old_weight = self.color_weight as f32;
        for (channel, &value) in self.color.iter_mut().zip(sample.iter()) {
            let fused = (*channel as f32 * old_weight + value as f32) / (old_weight + 1.0);
            *channel = fused.round().clamp(0.0, 255.0) as u8;
        }
        self.color_weight = self.color_weight.saturating_add(1).min(max_weight);
    }

    /// One more frame without an update
    pub fn grow_older(&mut self) {
        self.age = self.age.saturating_add(1);
    }
}

impl Default for TsdfVoxel {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Weight and age extremes of one block, enough to judge it for decay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    /// Largest voxel weight in the block
    pub max_weight: u16,
    /// Smallest voxel age in the block
    pub min_age: u16,
}

impl BlockSummary {
    pub fn of(voxels: &[TsdfVoxel]) -> Self {
        voxels.iter().fold(
            Self { max_weight: 0, min_age: u16::MAX },
            |acc, v| Self {
                max_weight: acc.max_weight.max(v.weight),
                min_age: acc.min_age.min(v.age),
            },
        )
    }

    /// Every voxel has weight at most `max_weight` and age at least `min_age`
    pub fn is_stale(&self, max_weight: u16, min_age: u16) -> bool {
        self.max_weight <= max_weight && self.min_age >= min_age
    }
}
