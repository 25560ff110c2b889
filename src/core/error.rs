//! Error types for the fusion engine

use thiserror::Error;

/// Main error type for the engine
///
/// Only session-level misconfiguration and malformed frame input surface
/// here. Per-pixel, per-voxel and per-block soft failures are counted in
/// the frame statistics instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed view: {0}")]
    MalformedView(String),

    #[error("Invalid pose: {0}")]
    InvalidPose(String),

    #[error("Swap error: {0}")]
    Swap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
