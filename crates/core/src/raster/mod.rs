//! Rasterisation of continuous primitives into integer voxel coordinates.
//!
//! Every function returns a lazy iterator. Nothing here knows about grid
//! bounds: callers draw the results through a framebuffer, which drops
//! out-of-bounds coordinates one voxel at a time.

use glam::{IVec3, Vec3};

/// Small tolerance added to half-voxel distance tests.
pub const VOXEL_EPSILON: f32 = 1e-4;

/// Edge length of a single voxel in grid units.
pub const VOXEL_UNIT_SIZE: f32 = 1.0;

/// Distance from the ideal sphere surface within which a voxel is treated as
/// part of the surface.
pub const SPHERE_SURFACE_TOLERANCE: f32 = VOXEL_UNIT_SIZE * 0.5 + VOXEL_EPSILON;

/// Integer 3-D Bresenham walk from `p1` to `p2`, both endpoints included.
///
/// Endpoints are floored before walking.
pub fn voxel_line(p1: Vec3, p2: Vec3) -> LineVoxels {
    LineVoxels::new(p1.floor().as_ivec3(), p2.floor().as_ivec3())
}

/// Voxels of the axis-aligned box spanning `[floor(min), ceil(max)]`.
///
/// With `fill == false` only the six outer faces are produced, each
/// coordinate exactly once.
pub fn voxel_box(min: Vec3, max: Vec3, fill: bool) -> impl Iterator<Item = IVec3> {
    let lo = min.floor().as_ivec3();
    let hi = max.ceil().as_ivec3();
    cube_coords(lo, hi).filter(move |voxel| {
        fill || voxel.cmpeq(lo).any() || voxel.cmpeq(hi).any()
    })
}

/// Voxels approximating a sphere.
///
/// Each candidate in the bounding cube of `center ± radius` is scored by its
/// signed distance to the ideal surface (negative inside). Filled spheres keep
/// everything below [`SPHERE_SURFACE_TOLERANCE`]; shells keep only the
/// candidates whose absolute distance is below it, so a shell is always a
/// subset of the matching filled sphere.
pub fn voxel_sphere(center: Vec3, radius: f32, fill: bool) -> impl Iterator<Item = IVec3> {
    let lo = (center - Vec3::splat(radius)).floor().as_ivec3();
    let hi = (center + Vec3::splat(radius)).ceil().as_ivec3();
    cube_coords(lo, hi).filter(move |voxel| {
        let surface_distance = voxel.as_vec3().distance(center) - radius;
        if fill {
            surface_distance < SPHERE_SURFACE_TOLERANCE
        } else {
            surface_distance.abs() < SPHERE_SURFACE_TOLERANCE
        }
    })
}

/// Every integer coordinate in the inclusive box `[lo, hi]`, x-major.
fn cube_coords(lo: IVec3, hi: IVec3) -> impl Iterator<Item = IVec3> {
    (lo.x..=hi.x).flat_map(move |x| {
        (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| IVec3::new(x, y, z)))
    })
}

/// Iterator produced by [`voxel_line`].
///
/// Walks in `i64` so that endpoints anywhere in the `i32` range cannot
/// overflow the doubled error terms.
#[derive(Debug, Clone)]
pub struct LineVoxels {
    current: [i64; 3],
    step: [i64; 3],
    delta: [i64; 3],
    error: [i64; 3],
    driver: usize,
    remaining: u64,
}

impl LineVoxels {
    fn new(start: IVec3, end: IVec3) -> Self {
        let start = start.to_array().map(i64::from);
        let end = end.to_array().map(i64::from);
        let diff = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
        let delta = diff.map(i64::abs);
        let step = diff.map(|d| if d < 0 { -1 } else { 1 });

        // Ties prefer x, then y.
        let driver = if delta[0] >= delta[1] && delta[0] >= delta[2] {
            0
        } else if delta[1] >= delta[2] {
            1
        } else {
            2
        };

        let mut error = [0; 3];
        for axis in 0..3 {
            if axis != driver {
                error[axis] = 2 * delta[axis] - delta[driver];
            }
        }

        Self {
            current: start,
            step,
            delta,
            error,
            driver,
            remaining: delta[driver].unsigned_abs() + 1,
        }
    }
}

impl Iterator for LineVoxels {
    type Item = IVec3;

    fn next(&mut self) -> Option<IVec3> {
        if self.remaining == 0 {
            return None;
        }
        // Every visited coordinate lies between the two i32 endpoints.
        let [x, y, z] = self.current;
        let out = IVec3::new(x as i32, y as i32, z as i32);
        self.remaining -= 1;

        if self.remaining > 0 {
            let driver = self.driver;
            let driver_step = 2 * self.delta[driver];
            for axis in 0..3 {
                if axis == driver {
                    continue;
                }
                if self.error[axis] > 0 {
                    self.current[axis] += self.step[axis];
                    self.error[axis] -= driver_step;
                }
                self.error[axis] += 2 * self.delta[axis];
            }
            self.current[driver] += self.step[driver];
        }

        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (len, Some(len))
    }
}

impl ExactSizeIterator for LineVoxels {}
