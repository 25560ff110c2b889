//! Reconstruction engine - allocation, integration and decay over a scene
//!
//! The passes live in sibling modules as `impl ReconstructionEngine`
//! blocks; this module holds the shared state and scene bookkeeping.

use rayon::prelude::*;

use crate::core::Result;
use crate::fusion::backend::ExecutionBackend;
use crate::fusion::config::FusionConfig;
use crate::voxel::Scene;

/// Voxels fused during one integration pass, per pool block
#[derive(Clone, Debug, Default)]
pub struct UpdateMask {
    blocks: Vec<Option<Vec<bool>>>,
}

impl UpdateMask {
    pub(crate) fn new(blocks: Vec<Option<Vec<bool>>>) -> Self {
        Self { blocks }
    }

    /// Whether voxel `voxel` of pool block `block` was fused
    pub fn is_updated(&self, block: usize, voxel: usize) -> bool {
        self.blocks
            .get(block)
            .and_then(|b| b.as_ref())
            .is_some_and(|b| b[voxel])
    }

    /// Number of fused voxels
    pub fn count(&self) -> usize {
        self.blocks
            .iter()
            .flatten()
            .map(|b| b.iter().filter(|&&u| u).count())
            .sum()
    }
}

/// Depth fusion passes over a sparse hashed scene
pub struct ReconstructionEngine {
    config: FusionConfig,
    backend: ExecutionBackend,
}

impl ReconstructionEngine {
    /// Validate the configuration and start the worker pool
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        let backend = ExecutionBackend::new(config.threads)?;
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn backend(&self) -> &ExecutionBackend {
        &self.backend
    }

    /// Empty scene sized by this engine's configuration
    pub fn create_scene(&self) -> Result<Scene> {
        Scene::new(&self.config.scene_params())
    }

    /// Return every block of the scene to the free lists
    pub fn reset_scene(&self, scene: &mut Scene) {
        scene.reset();
    }

    /// Age every voxel of a visible block that was not fused this frame
    pub fn age_untouched(&self, scene: &mut Scene, updated: &UpdateMask) {
        let (_, pool, index) = scene.parts_mut();

        let mut visible = vec![false; pool.capacity() as usize];
        for &id in index.visible() {
            if let Some(block) = index.entry(id).block() {
                visible[block.index()] = true;
            }
        }

        self.backend.install(|| {
            pool.par_blocks_mut()
                .enumerate()
                .filter(|(block, _)| visible[*block])
                .for_each(|(block, voxels)| {
                    for (i, voxel) in voxels.iter_mut().enumerate() {
                        if !updated.is_updated(block, i) {
                            voxel.grow_older();
                        }
                    }
                });
        });
    }
}
