//! Camera pose supplied by the tracker

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::core::{Error, Result};

/// Tolerance on R^T R = I for an accepted pose
const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

/// Camera pose for the current frame.
///
/// Camera space follows the sensor convention: +z forward along the optical
/// axis, +x right, +y down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingState {
    /// Camera-to-world rigid transform
    pub pose: Mat4,
}

impl TrackingState {
    pub fn new(pose: Mat4) -> Self {
        Self { pose }
    }

    /// Camera at the world origin looking down +z
    pub fn identity() -> Self {
        Self::new(Mat4::IDENTITY)
    }

    /// Camera at `position` looking at `target`, with `up` as the world up
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(right);

        let mut pose = Mat4::from_mat3(Mat3::from_cols(right, down, forward));
        pose.w_axis = position.extend(1.0);
        Self::new(pose)
    }

    /// World-to-camera transform
    pub fn world_to_camera(&self) -> Mat4 {
        self.pose.inverse()
    }

    /// Camera center in world space
    pub fn position(&self) -> Vec3 {
        self.pose.w_axis.truncate()
    }

    /// Reject transforms that are not rigid.
    pub fn validate(&self) -> Result<()> {
        if !self.pose.is_finite() {
            return Err(Error::InvalidPose("pose contains non-finite values".into()));
        }
        if self.pose.row(3) != Vec4::new(0.0, 0.0, 0.0, 1.0) {
            return Err(Error::InvalidPose(format!(
                "bottom row must be (0, 0, 0, 1), got {:?}",
                self.pose.row(3)
            )));
        }
        let r = Mat3::from_mat4(self.pose);
        let error = (r.transpose() * r - Mat3::IDENTITY).to_cols_array()
            .iter()
            .fold(0.0f32, |acc, v| acc.max(v.abs()));
        if error > ORTHONORMAL_TOLERANCE {
            return Err(Error::InvalidPose(format!(
                "rotation block is not orthonormal (error {:.2e})",
                error
            )));
        }
        if r.determinant() < 0.0 {
            return Err(Error::InvalidPose("rotation block is a reflection".into()));
        }
        Ok(())
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_valid() {
        assert!(TrackingState::identity().validate().is_ok());
    }

    #[test]
    fn test_rejects_scale() {
        let state = TrackingState::new(Mat4::from_scale(Vec3::splat(2.0)));
        assert!(matches!(state.validate(), Err(Error::InvalidPose(_))));
    }

    #[test]
    fn test_rejects_projective_row() {
        let mut pose = Mat4::IDENTITY;
        pose.x_axis.w = 0.5;
        assert!(TrackingState::new(pose).validate().is_err());
    }

    #[test]
    fn test_rejects_nan() {
        let mut pose = Mat4::IDENTITY;
        pose.w_axis.x = f32::NAN;
        assert!(TrackingState::new(pose).validate().is_err());
    }

    #[test]
    fn test_look_at() {
        let state = TrackingState::look_at(Vec3::new(0.0, 0.0, -2.0), Vec3::ZERO, Vec3::NEG_Y);
        assert!(state.validate().is_ok());
        assert_eq!(state.position(), Vec3::new(0.0, 0.0, -2.0));

        // The optical axis points at the target
        let ahead = state.pose.transform_point3(Vec3::new(0.0, 0.0, 2.0));
        assert!(ahead.length() < 1e-5);
    }
}
