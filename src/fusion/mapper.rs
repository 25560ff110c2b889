//! Dense mapper - sequences one frame of fusion
//!
//! allocate -> integrate -> swap -> age bookkeeping -> render state refresh.
//! Frames are processed strictly one after another by the single owner of
//! the scene.

use crate::core::Result;
use crate::fusion::config::FusionConfig;
use crate::fusion::engine::ReconstructionEngine;
use crate::fusion::render_state::RenderState;
use crate::fusion::stats::{DecayStats, FrameStats};
use crate::sensor::{TrackingState, View};
use crate::streaming::{HostSwapCache, NoSwap, SwapManager};
use crate::voxel::{EntryId, Residency, Scene};

/// Session state of the mapper
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapperState {
    Idle,
    Processing,
}

/// Orchestrates the reconstruction engine and the swap manager
pub struct DenseMapper {
    engine: ReconstructionEngine,
    swap: Box<dyn SwapManager>,
    state: MapperState,
}

impl DenseMapper {
    /// Mapper with the swap manager selected by `config.swapping`
    pub fn new(config: FusionConfig) -> Result<Self> {
        let swap: Box<dyn SwapManager> = if config.swapping {
            Box::new(HostSwapCache::new(config.swap_transfer_limit))
        } else {
            Box::new(NoSwap)
        };
        Self::with_swap_manager(config, swap)
    }

    pub fn with_swap_manager(config: FusionConfig, swap: Box<dyn SwapManager>) -> Result<Self> {
        let engine = ReconstructionEngine::new(config)?;
        log::info!(
            "Dense mapper ready: {} worker threads, swapping {}",
            engine.backend().threads(),
            if swap.is_active() { "on" } else { "off" }
        );
        Ok(Self {
            engine,
            swap,
            state: MapperState::Idle,
        })
    }

    pub fn engine(&self) -> &ReconstructionEngine {
        &self.engine
    }

    pub fn config(&self) -> &FusionConfig {
        self.engine.config()
    }

    pub fn state(&self) -> MapperState {
        self.state
    }

    /// Empty scene sized for this mapper
    pub fn create_scene(&self) -> Result<Scene> {
        self.engine.create_scene()
    }

    /// Fuse one frame into the scene.
    ///
    /// Malformed input is rejected before anything is touched. Swap
    /// failures are logged and counted, never returned.
    pub fn process_frame(
        &mut self,
        view: &View,
        tracking: &TrackingState,
        scene: &mut Scene,
        render_state: &mut RenderState,
    ) -> Result<FrameStats> {
        view.validate()?;
        tracking.validate()?;

        self.state = MapperState::Processing;
        let result = self.run_frame(view, tracking, scene);
        self.state = MapperState::Idle;

        let stats = result?;
        Self::refresh_render_state(scene, tracking, render_state);
        render_state.frame_count += 1;

        log::debug!(
            "Frame {}: {} new blocks, {} visible, {} voxels fused",
            render_state.frame_count,
            stats.newly_allocated,
            stats.visible_blocks,
            stats.voxels_updated
        );
        Ok(stats)
    }

    fn run_frame(&mut self, view: &View, tracking: &TrackingState, scene: &mut Scene) -> Result<FrameStats> {
        let mut stats = self.engine.allocate_from_depth(scene, view, tracking, false)?;

        let report = self.engine.integrate_into_scene(scene, view, tracking)?;
        stats.merge(&report.stats);

        if self.swap.is_active() {
            self.reconcile_residency(scene, &mut stats);
        }

        // Pool slots refilled by swap-in carry no update flags, so restored
        // blocks age like any other visible block missed this frame
        self.engine.age_untouched(scene, &report.updated);
        Ok(stats)
    }

    /// Restore visible swapped-out blocks and store resident invisible ones
    fn reconcile_residency(&mut self, scene: &mut Scene, stats: &mut FrameStats) {
        let index = scene.index();
        let wanted: Vec<EntryId> = index
            .visible()
            .iter()
            .copied()
            .filter(|&id| index.entry(id).residency == Residency::SwappedOut)
            .collect();
        let cold: Vec<EntryId> = index
            .occupied_ids()
            .filter(|&id| {
                let entry = index.entry(id);
                !entry.visible && entry.block().is_some()
            })
            .collect();

        if !wanted.is_empty() {
            match self.swap.swap_in(scene, &wanted) {
                Ok(n) => stats.swapped_in += n,
                Err(e) => {
                    log::warn!("Swap-in failed: {}", e);
                    stats.swap_failures += 1;
                }
            }
        }
        if !cold.is_empty() {
            match self.swap.swap_out(scene, &cold) {
                Ok(n) => stats.swapped_out += n,
                Err(e) => {
                    log::warn!("Swap-out failed: {}", e);
                    stats.swap_failures += 1;
                }
            }
        }
    }

    /// Recompute visibility for a new pose without allocating or fusing
    pub fn update_visible_list(
        &mut self,
        view: &View,
        tracking: &TrackingState,
        scene: &mut Scene,
        render_state: &mut RenderState,
    ) -> Result<FrameStats> {
        let stats = self.engine.allocate_from_depth(scene, view, tracking, true)?;
        Self::refresh_render_state(scene, tracking, render_state);
        Ok(stats)
    }

    /// Empty the scene and drop every swapped-out record
    pub fn reset_scene(&mut self, scene: &mut Scene) {
        self.engine.reset_scene(scene);
        self.swap.clear();
    }

    /// Remove weak, stale blocks, resident or swapped out, and their stored records
    pub fn decay(&mut self, scene: &mut Scene, max_weight: u16, min_age: u16) -> DecayStats {
        let report = self.engine.decay(scene, max_weight, min_age, self.swap.as_ref());
        self.swap.forget(&report.removed);
        report.stats
    }

    /// Decay with the configured thresholds
    pub fn decay_with_config(&mut self, scene: &mut Scene) -> DecayStats {
        let config = self.engine.config();
        let (max_weight, min_age) = (config.decay_max_weight, config.decay_min_age);
        self.decay(scene, max_weight, min_age)
    }

    fn refresh_render_state(scene: &Scene, tracking: &TrackingState, render_state: &mut RenderState) {
        render_state.visible_entries.clear();
        render_state.visible_entries.extend_from_slice(scene.visible_entries());
        render_state.pose = tracking.pose;
    }
}
