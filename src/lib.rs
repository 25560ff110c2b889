//! Voxfuse - real-time volumetric depth fusion on a sparse hashed voxel grid

pub mod core;
pub mod math;
pub mod voxel;
pub mod sensor;
pub mod fusion;
pub mod streaming;

pub use fusion::{DenseMapper, FusionConfig, ReconstructionEngine, RenderState};
pub use sensor::{Calibration, Intrinsics, TrackingState, View};
pub use voxel::Scene;
