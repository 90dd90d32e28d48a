//! Off-screen voxel stores and the capability contract shared by every
//! backend.

use std::borrow::Cow;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    raster::{voxel_box, voxel_line, voxel_sphere},
    BlendMode, Colour, Grid, Result, VoxelError,
};

pub mod cpu;
pub mod kernel;
pub mod set;

pub use cpu::CpuFramebuffer;
pub use kernel::{HostKernel, KernelFramebuffer, KernelHandle, SharedKernel, VoxelKernel};
pub use set::FramebufferSet;

/// Parameters for [`Framebuffer::draw_combined`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombineOptions {
    /// Weight of the first source; the second receives `1 - alpha`.
    pub alpha: f32,
}

impl CombineOptions {
    pub fn alpha(alpha: f32) -> Self {
        Self { alpha }
    }

    pub(crate) fn clamped_alpha(&self) -> f32 {
        if self.alpha.is_nan() {
            0.0
        } else {
            self.alpha.clamp(0.0, 1.0)
        }
    }
}

/// Capability contract implemented by every framebuffer backend.
///
/// Coordinates are continuous and floored to a voxel before use. Per-voxel
/// drawing silently ignores anything outside the grid, so primitives that
/// leave the display still paint their in-bounds part.
pub trait Framebuffer: Send {
    /// Slot this buffer occupies inside its [`FramebufferSet`].
    fn index(&self) -> usize;

    fn grid(&self) -> Grid;

    fn set_voxel(&mut self, pt: Vec3, colour: Colour);

    /// Saturating add of `colour` onto the voxel at `pt`.
    fn add_to_voxel(&mut self, pt: Vec3, colour: Colour);

    fn get_voxel(&self, pt: Vec3) -> Option<Colour>;

    fn clear(&mut self, colour: Colour) -> Result<()>;

    /// Dense x-major view of every voxel. Software buffers lend their
    /// storage; accelerated buffers read back from the kernel.
    fn voxels(&self) -> Result<Cow<'_, [Colour]>>;

    /// Writes `a * alpha + b * (1 - alpha)` into this buffer.
    fn draw_combined(
        &mut self,
        a: &dyn Framebuffer,
        b: &dyn Framebuffer,
        options: CombineOptions,
    ) -> Result<()>;

    /// Draws every voxel of `source` into this buffer with `blend`.
    fn draw_framebuffer(&mut self, source: &dyn Framebuffer, blend: BlendMode) -> Result<()>;

    fn draw_point(&mut self, pt: Vec3, colour: Colour, blend: BlendMode) {
        match blend {
            BlendMode::Overwrite => self.set_voxel(pt, colour),
            BlendMode::Additive => self.add_to_voxel(pt, colour),
        }
    }

    fn draw_line(&mut self, p1: Vec3, p2: Vec3, colour: Colour, blend: BlendMode) {
        for voxel in voxel_line(p1, p2) {
            self.draw_point(voxel.as_vec3(), colour, blend);
        }
    }

    fn draw_aabb(&mut self, min: Vec3, max: Vec3, colour: Colour, fill: bool, blend: BlendMode) {
        for voxel in voxel_box(min, max, fill) {
            self.draw_point(voxel.as_vec3(), colour, blend);
        }
    }

    fn draw_sphere(
        &mut self,
        center: Vec3,
        radius: f32,
        colour: Colour,
        fill: bool,
        blend: BlendMode,
    ) {
        for voxel in voxel_sphere(center, radius, fill) {
            self.draw_point(voxel.as_vec3(), colour, blend);
        }
    }

    /// Immutable copy of the whole colour grid.
    fn snapshot(&self) -> Result<VoxelSnapshot> {
        Ok(VoxelSnapshot {
            size: self.grid().size(),
            voxels: self.voxels()?.into_owned(),
        })
    }
}

/// Frozen copy of a framebuffer handed to the broadcast layer.
///
/// `voxels` is dense and x-major: index `x * N * N + y * N + z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelSnapshot {
    pub size: usize,
    pub voxels: Vec<Colour>,
}

impl VoxelSnapshot {
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<Colour> {
        if x >= self.size || y >= self.size || z >= self.size {
            return None;
        }
        self.voxels.get((x * self.size + y) * self.size + z).copied()
    }

    /// True when every voxel is pure black.
    pub fn is_dark(&self) -> bool {
        self.voxels.iter().all(|c| *c == Colour::BLACK)
    }
}

pub(crate) fn ensure_len(grid: Grid, actual: usize) -> Result<()> {
    if actual != grid.num_voxels() {
        return Err(VoxelError::GridMismatch {
            expected: grid.num_voxels(),
            actual,
        });
    }
    Ok(())
}

pub(crate) fn combine_voxel(a: Colour, b: Colour, alpha: f32) -> Colour {
    (a * alpha + b * (1.0 - alpha)).clamp_channels()
}
