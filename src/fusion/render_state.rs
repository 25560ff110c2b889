//! State shared with the raycasting / visualization engine

use glam::Mat4;

use crate::voxel::EntryId;

/// Visible-block snapshot for renderers and the next pose estimate.
///
/// Refreshed by every allocation pass; entries removed by a later decay
/// pass stay listed until the next refresh, so readers check occupancy.
#[derive(Clone, Debug, Default)]
pub struct RenderState {
    /// Visible hash entries, in table order
    pub visible_entries: Vec<EntryId>,
    /// Camera-to-world pose the snapshot was computed for
    pub pose: Mat4,
    /// Frames processed in this session
    pub frame_count: u64,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_count(&self) -> usize {
        self.visible_entries.len()
    }
}
