//! Pinhole calibration of an RGB-D sensor

use glam::{Mat4, UVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::Frustum;

/// Pinhole camera intrinsics (pixels)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl Intrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self { fx, fy, cx, cy, width, height }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Check the parameters describe a usable camera
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0
            && self.cx.is_finite() && self.cy.is_finite()
            && self.width > 0 && self.height > 0
    }

    /// Project a camera-space point to continuous pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Vec2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Nearest pixel for a camera-space point, if it lands inside the image
    pub fn project_to_pixel(&self, p: Vec3) -> Option<UVec2> {
        let uv = self.project(p)?;
        let px = (uv + Vec2::splat(0.5)).floor();
        if px.x < 0.0 || px.y < 0.0 || px.x >= self.width as f32 || px.y >= self.height as f32 {
            return None;
        }
        Some(px.as_uvec2())
    }

    /// Camera-space point at pixel (u, v) with z-depth `depth`
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        Vec3::new(
            (u - self.cx) / self.fx * depth,
            (v - self.cy) / self.fy * depth,
            depth,
        )
    }

    /// Camera-space frustum over the image, limited to a depth range
    pub fn frustum(&self, depth_range: (f32, f32)) -> Frustum {
        Frustum::from_pinhole(
            Vec2::new(self.fx, self.fy),
            Vec2::new(self.cx, self.cy),
            self.size().as_vec2(),
            depth_range,
        )
    }
}

/// Calibration of a depth sensor with an optional color camera
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Depth camera intrinsics
    pub depth: Intrinsics,
    /// Color camera intrinsics, when a color stream is present
    pub color: Option<Intrinsics>,
    /// Rigid transform from depth-camera space to color-camera space
    pub depth_to_color: Mat4,
}

impl Calibration {
    /// Depth-only sensor
    pub fn depth_only(depth: Intrinsics) -> Self {
        Self {
            depth,
            color: None,
            depth_to_color: Mat4::IDENTITY,
        }
    }

    /// Color camera sharing the depth camera's optics and pose
    pub fn registered(depth: Intrinsics) -> Self {
        Self {
            depth,
            color: Some(depth),
            depth_to_color: Mat4::IDENTITY,
        }
    }
}
