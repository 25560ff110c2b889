//! Camera frustum for block visibility

use crate::core::types::{Vec2, Vec3};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Plane through `point` with the given normal; normal is normalized
    fn through(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, distance: -normal.dot(point) }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
///
/// Planes live in camera space (+z forward, +x right, +y down), normals
/// pointing inward.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Build the frustum of a pinhole camera.
    ///
    /// `focal` and `principal` are in pixels, `size` is the image size in
    /// pixels and `depth_range` the valid (near, far) depth in meters.
    pub fn from_pinhole(focal: Vec2, principal: Vec2, size: Vec2, depth_range: (f32, f32)) -> Self {
        let (near, far) = depth_range;

        // u = fx * x / z + cx >= 0  <=>  fx * x + cx * z >= 0
        let left = Plane::through(Vec3::new(focal.x, 0.0, principal.x), Vec3::ZERO);
        // u <= width  <=>  (width - cx) * z - fx * x >= 0
        let right = Plane::through(Vec3::new(-focal.x, 0.0, size.x - principal.x), Vec3::ZERO);
        let top = Plane::through(Vec3::new(0.0, focal.y, principal.y), Vec3::ZERO);
        let bottom = Plane::through(Vec3::new(0.0, -focal.y, size.y - principal.y), Vec3::ZERO);

        let near = Plane::through(Vec3::Z, Vec3::new(0.0, 0.0, near));
        let far = Plane::through(Vec3::NEG_Z, Vec3::new(0.0, 0.0, far));

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Find the corner most aligned with plane normal (p-vertex)
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            // If p-vertex is outside, AABB is completely outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
