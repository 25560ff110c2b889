//! Per-frame and per-decay counters

/// Counters for one processed frame.
///
/// Every soft failure of the frame lands here instead of an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Depth pixels inside the valid range
    pub valid_pixels: usize,
    /// Depth pixels skipped (NaN, non-positive or out of range)
    pub invalid_pixels: usize,
    /// Distinct blocks touched by back-projected ray segments
    pub candidate_blocks: usize,
    /// Candidates that were already in the index
    pub already_allocated: usize,
    /// Candidates newly inserted this frame
    pub newly_allocated: usize,
    /// Candidates dropped because the excess list was full
    pub excess_exhausted: usize,
    /// Candidates dropped because the block pool was full
    pub pool_exhausted: usize,
    /// Entries in the visibility set after allocation
    pub visible_blocks: usize,
    /// Voxels whose distance and weight were updated
    pub voxels_updated: usize,
    /// Voxels projecting outside the depth image
    pub voxels_out_of_image: usize,
    /// Voxels projecting onto an invalid depth pixel
    pub voxels_invalid_depth: usize,
    /// Voxels farther than the truncation band from the measured surface
    pub voxels_outside_band: usize,
    /// Blocks brought back from the swap cache
    pub swapped_in: usize,
    /// Blocks moved to the swap cache
    pub swapped_out: usize,
    /// Swap calls that reported an error
    pub swap_failures: usize,
}

/// Counters for one decay pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecayStats {
    /// Resident blocks inspected
    pub scanned: usize,
    /// Blocks deallocated
    pub removed: usize,
}

impl FrameStats {
    /// Add another pass's counters into this one
    pub fn merge(&mut self, other: &FrameStats) {
        self.valid_pixels += other.valid_pixels;
        self.invalid_pixels += other.invalid_pixels;
        self.candidate_blocks += other.candidate_blocks;
        self.already_allocated += other.already_allocated;
        self.newly_allocated += other.newly_allocated;
        self.excess_exhausted += other.excess_exhausted;
        self.pool_exhausted += other.pool_exhausted;
        self.visible_blocks += other.visible_blocks;
        self.voxels_updated += other.voxels_updated;
        self.voxels_out_of_image += other.voxels_out_of_image;
        self.voxels_invalid_depth += other.voxels_invalid_depth;
        self.voxels_outside_band += other.voxels_outside_band;
        self.swapped_in += other.swapped_in;
        self.swapped_out += other.swapped_out;
        self.swap_failures += other.swap_failures;
    }
}
