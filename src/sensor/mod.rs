//! Sensor-side inputs: calibrated RGB-D frames and camera poses

pub mod image;
pub mod intrinsics;
pub mod view;
pub mod tracking;

pub use image::{ColorImage, DepthImage, Image};
pub use intrinsics::{Calibration, Intrinsics};
pub use view::View;
pub use tracking::TrackingState;
