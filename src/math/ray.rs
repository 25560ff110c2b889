//! Ray type and grid traversal

use crate::core::types::{IVec3, Vec3};

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for slab and grid stepping
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vec3::new(
                1.0 / direction.x,
                1.0 / direction.y,
                1.0 / direction.z,
            ),
        }
    }

    /// Ray from `start` towards `end`, together with the segment length.
    ///
    /// Returns `None` for a degenerate segment.
    pub fn between(start: Vec3, end: Vec3) -> Option<(Ray, f32)> {
        let delta = end - start;
        let length = delta.length();
        if !length.is_finite() || length <= f32::EPSILON {
            return None;
        }
        Some((Ray::new(start, delta / length), length))
    }

    /// Visit every cell of a uniform grid the segment `[0, t_max]` passes
    /// through, in order (3D DDA).
    ///
    /// Cell `c` covers `[c * cell_size, (c + 1) * cell_size)` on each axis.
    pub fn grid_cells(&self, t_max: f32, cell_size: f32) -> GridTraversal {
        let grid_origin = self.origin / cell_size;
        let cell = grid_origin.floor().as_ivec3();

        let mut step = IVec3::ZERO;
        let mut t_next = Vec3::splat(f32::INFINITY);
        let mut t_delta = Vec3::splat(f32::INFINITY);

        for axis in 0..3 {
            let d = self.direction[axis];
            if d > 0.0 {
                step[axis] = 1;
                t_delta[axis] = cell_size * self.inv_direction[axis];
                t_next[axis] = (cell[axis] as f32 + 1.0 - grid_origin[axis]) * t_delta[axis];
            } else if d < 0.0 {
                step[axis] = -1;
                t_delta[axis] = -cell_size * self.inv_direction[axis];
                t_next[axis] = (grid_origin[axis] - cell[axis] as f32) * t_delta[axis];
            }
        }

        // A segment crosses at most one boundary per axis per cell length
        let crossings = (t_max / cell_size).ceil().max(0.0) as u32 + 1;

        GridTraversal {
            cell,
            step,
            t_next,
            t_delta,
            t_max,
            remaining: 3 * crossings + 1,
        }
    }
}

/// Iterator over the grid cells touched by a ray segment
#[derive(Clone, Debug)]
pub struct GridTraversal {
    cell: IVec3,
    step: IVec3,
    t_next: Vec3,
    t_delta: Vec3,
    t_max: f32,
    remaining: u32,
}

impl Iterator for GridTraversal {
    type Item = IVec3;

    fn next(&mut self) -> Option<IVec3> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.cell;

        let axis = if self.t_next.x <= self.t_next.y && self.t_next.x <= self.t_next.z {
            0
        } else if self.t_next.y <= self.t_next.z {
            1
        } else {
            2
        };

        if self.t_next[axis] > self.t_max {
            self.remaining = 0;
        } else {
            self.cell[axis] += self.step[axis];
            self.t_next[axis] += self.t_delta[axis];
            self.remaining -= 1;
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_degenerate() {
        assert!(Ray::between(Vec3::ONE, Vec3::ONE).is_none());
        let (ray, len) = Ray::between(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_eq!(ray.direction, Vec3::Z);
        assert_eq!(len, 2.0);
    }

    #[test]
    fn test_grid_cells_axis_aligned() {
        let (ray, len) = Ray::between(Vec3::new(0.5, 0.5, 0.5), Vec3::new(0.5, 0.5, 3.5)).unwrap();
        let cells: Vec<_> = ray.grid_cells(len, 1.0).collect();
        assert_eq!(
            cells,
            vec![
                IVec3::new(0, 0, 0),
                IVec3::new(0, 0, 1),
                IVec3::new(0, 0, 2),
                IVec3::new(0, 0, 3),
            ]
        );
    }

    #[test]
    fn test_grid_cells_negative_direction() {
        let (ray, len) = Ray::between(Vec3::new(0.5, 0.5, 0.5), Vec3::new(-1.5, 0.5, 0.5)).unwrap();
        let cells: Vec<_> = ray.grid_cells(len, 1.0).collect();
        assert_eq!(
            cells,
            vec![IVec3::new(0, 0, 0), IVec3::new(-1, 0, 0), IVec3::new(-2, 0, 0)]
        );
    }

    #[test]
    fn test_grid_cells_diagonal_is_connected() {
        let (ray, len) = Ray::between(Vec3::new(0.1, 0.2, 0.3), Vec3::new(3.7, 2.9, 1.4)).unwrap();
        let cells: Vec<_> = ray.grid_cells(len, 1.0).collect();

        assert_eq!(cells.first(), Some(&IVec3::new(0, 0, 0)));
        assert_eq!(cells.last(), Some(&IVec3::new(3, 2, 1)));
        // Consecutive cells share a face
        for pair in cells.windows(2) {
            let d = (pair[1] - pair[0]).abs();
            assert_eq!(d.x + d.y + d.z, 1);
        }
    }

    #[test]
    fn test_grid_cells_within_single_cell() {
        let (ray, len) = Ray::between(Vec3::new(0.1, 0.1, 0.1), Vec3::new(0.2, 0.2, 0.2)).unwrap();
        let cells: Vec<_> = ray.grid_cells(len, 1.0).collect();
        assert_eq!(cells, vec![IVec3::ZERO]);
    }
}
