//! Depth fusion pipeline: allocation, integration, decay and orchestration

pub mod config;
pub mod backend;
pub mod stats;
pub mod render_state;
pub mod engine;
pub mod allocation;
pub mod integration;
pub mod decay;
pub mod mapper;

pub use config::FusionConfig;
pub use backend::ExecutionBackend;
pub use stats::{DecayStats, FrameStats};
pub use render_state::RenderState;
pub use engine::{ReconstructionEngine, UpdateMask};
pub use integration::IntegrationReport;
pub use decay::DecayReport;
pub use mapper::{DenseMapper, MapperState};
