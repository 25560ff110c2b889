//! One calibrated RGB-D frame

use crate::core::{Error, Result};
use crate::sensor::image::{ColorImage, DepthImage};
use crate::sensor::intrinsics::Calibration;

/// Depth map, optional color map and calibration of one frame.
///
/// Immutable for the duration of one frame's processing.
#[derive(Clone, Debug)]
pub struct View {
    pub calibration: Calibration,
    pub depth: DepthImage,
    pub color: Option<ColorImage>,
}

impl View {
    /// Depth-only view
    pub fn new(calibration: Calibration, depth: DepthImage) -> Self {
        Self { calibration, depth, color: None }
    }

    /// View with a color image
    pub fn with_color(calibration: Calibration, depth: DepthImage, color: ColorImage) -> Self {
        Self { calibration, depth, color: Some(color) }
    }

    /// Reject frames whose images disagree with their calibration.
    ///
    /// Runs before anything touches the scene, so a malformed frame leaves
    /// the reconstruction untouched.
    pub fn validate(&self) -> Result<()> {
        let depth_k = &self.calibration.depth;
        if !depth_k.is_valid() {
            return Err(Error::MalformedView(format!("invalid depth intrinsics {:?}", depth_k)));
        }
        if self.depth.size() != depth_k.size() {
            return Err(Error::MalformedView(format!(
                "depth image is {}x{} but calibration expects {}x{}",
                self.depth.width(),
                self.depth.height(),
                depth_k.width,
                depth_k.height
            )));
        }

        match (&self.color, &self.calibration.color) {
            (Some(color), Some(color_k)) => {
                if !color_k.is_valid() {
                    return Err(Error::MalformedView(format!("invalid color intrinsics {:?}", color_k)));
                }
                if color.size() != color_k.size() {
                    return Err(Error::MalformedView(format!(
                        "color image is {}x{} but calibration expects {}x{}",
                        color.width(),
                        color.height(),
                        color_k.width,
                        color_k.height
                    )));
                }
                if !self.calibration.depth_to_color.is_finite() {
                    return Err(Error::MalformedView("depth-to-color transform is not finite".into()));
                }
            }
            (Some(_), None) => {
                return Err(Error::MalformedView("color image without color calibration".into()));
            }
            (None, _) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::image::Image;
    use crate::sensor::intrinsics::Intrinsics;

    fn intrinsics() -> Intrinsics {
        Intrinsics::new(50.0, 50.0, 32.0, 24.0, 64, 48)
    }

    #[test]
    fn test_valid_depth_only() {
        let view = View::new(Calibration::depth_only(intrinsics()), Image::filled(64, 48, 2.0));
        assert!(view.validate().is_ok());
    }

    #[test]
    fn test_depth_size_mismatch() {
        let view = View::new(Calibration::depth_only(intrinsics()), Image::filled(32, 48, 2.0));
        assert!(matches!(view.validate(), Err(Error::MalformedView(_))));
    }

    #[test]
    fn test_color_size_mismatch() {
        let view = View::with_color(
            Calibration::registered(intrinsics()),
            Image::filled(64, 48, 2.0),
            Image::filled(64, 24, [0, 0, 0]),
        );
        assert!(matches!(view.validate(), Err(Error::MalformedView(_))));
    }

    #[test]
    fn test_color_without_calibration() {
        let view = View::with_color(
            Calibration::depth_only(intrinsics()),
            Image::filled(64, 48, 2.0),
            Image::filled(64, 48, [0, 0, 0]),
        );
        assert!(view.validate().is_err());
    }

    #[test]
    fn test_color_calibration_without_image_is_fine() {
        let view = View::new(Calibration::registered(intrinsics()), Image::filled(64, 48, 2.0));
        assert!(view.validate().is_ok());
    }
}
