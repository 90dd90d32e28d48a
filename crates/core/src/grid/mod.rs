use std::ops::{Add, Mul};

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::{Result, VoxelError};

/// Dimensions of a cubic voxel display. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Grid {
    size: usize,
}

impl Grid {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || i32::try_from(size).is_err() {
            return Err(VoxelError::InvalidConfig(format!(
                "grid size must be between 1 and {}, got {size}",
                i32::MAX
            )));
        }
        if size.checked_mul(size).and_then(|n| n.checked_mul(size)).is_none() {
            return Err(VoxelError::InvalidConfig(format!(
                "grid size {size} holds more voxels than can be addressed"
            )));
        }
        Ok(Self { size })
    }

    /// Number of voxels along each axis.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_voxels(&self) -> usize {
        self.size * self.size * self.size
    }

    /// Inclusive integer bounds covering every voxel of the display.
    pub fn bounds(&self) -> (IVec3, IVec3) {
        (IVec3::ZERO, IVec3::splat(self.size as i32 - 1))
    }

    /// Checks whether a continuous point lands inside the grid once each
    /// component is floored.
    pub fn contains(&self, pt: Vec3) -> bool {
        self.index_of(pt).is_some()
    }

    /// Maps a continuous point to its dense storage index, flooring each
    /// component first.
    pub fn index_of(&self, pt: Vec3) -> Option<usize> {
        if !pt.is_finite() {
            return None;
        }
        let floored = pt.floor();
        let limit = self.size as f32;
        if floored.min_element() < 0.0 || floored.max_element() >= limit {
            return None;
        }
        self.index_of_voxel(floored.as_ivec3())
    }

    /// Dense storage index of an integer voxel coordinate. Storage is
    /// x-major: `x * N * N + y * N + z`.
    pub fn index_of_voxel(&self, voxel: IVec3) -> Option<usize> {
        let n = self.size as i32;
        if voxel.min_element() < 0 || voxel.max_element() >= n {
            return None;
        }
        let (x, y, z) = (voxel.x as usize, voxel.y as usize, voxel.z as usize);
        Some((x * self.size + y) * self.size + z)
    }

    /// Inverse of [`Grid::index_of_voxel`].
    pub fn voxel_at(&self, index: usize) -> Option<IVec3> {
        if index >= self.num_voxels() {
            return None;
        }
        let z = index % self.size;
        let y = (index / self.size) % self.size;
        let x = index / (self.size * self.size);
        Some(IVec3::new(x as i32, y as i32, z as i32))
    }
}

/// Normalised linear RGB colour; every channel lives in `[0, 1]`.
///
/// Deserialising clamps, and every framebuffer clamps on store, so values
/// built with [`Colour::new`] only leave the range in intermediate maths.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "ColourChannels")]
pub struct Colour {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Colour {
    pub const BLACK: Colour = Colour::new(0.0, 0.0, 0.0);
    pub const WHITE: Colour = Colour::new(1.0, 1.0, 1.0);

    /// Builds a colour without clamping. Use [`Colour::clamped`] for
    /// untrusted input.
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn clamped(r: f32, g: f32, b: f32) -> Self {
        Self::new(clamp_unit(r), clamp_unit(g), clamp_unit(b))
    }

    /// Same colour with each channel pulled back into `[0, 1]`; NaN becomes 0.
    pub fn clamp_channels(self) -> Colour {
        Colour::clamped(self.r, self.g, self.b)
    }

    pub fn set(&mut self, other: Colour) {
        *self = other;
    }

    /// Component-wise sum clamped back into `[0, 1]`.
    pub fn saturating_add(self, other: Colour) -> Colour {
        Colour::clamped(self.r + other.r, self.g + other.g, self.b + other.b)
    }

    pub fn lerp(self, other: Colour, t: f32) -> Colour {
        let t = clamp_unit(t);
        self * (1.0 - t) + other * t
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Raw wire form of [`Colour`], clamped on conversion.
#[derive(Deserialize)]
struct ColourChannels {
    #[serde(default)]
    r: f32,
    #[serde(default)]
    g: f32,
    #[serde(default)]
    b: f32,
}

impl From<ColourChannels> for Colour {
    fn from(raw: ColourChannels) -> Self {
        Colour::clamped(raw.r, raw.g, raw.b)
    }
}

impl From<[f32; 3]> for Colour {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Colour::clamped(r, g, b)
    }
}

impl Add for Colour {
    type Output = Colour;

    fn add(self, rhs: Colour) -> Colour {
        Colour::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl Mul<f32> for Colour {
    type Output = Colour;

    fn mul(self, rhs: f32) -> Colour {
        Colour::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}

/// Rule for combining a drawn colour with what a voxel already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Overwrite,
    /// Saturating component-wise sum.
    Additive,
}

impl BlendMode {
    pub fn apply(self, existing: Colour, incoming: Colour) -> Colour {
        match self {
            BlendMode::Overwrite => incoming.clamp_channels(),
            BlendMode::Additive => existing.saturating_add(incoming),
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_grid() {
        assert!(Grid::new(0).is_err());
    }

    #[test]
    fn rejects_sizes_whose_volume_overflows() {
        let side = (usize::MAX as f64).cbrt() as usize + 2;
        if i32::try_from(side).is_ok() {
            assert!(matches!(Grid::new(side), Err(VoxelError::InvalidConfig(_))));
        }
        assert!(Grid::new(i32::MAX as usize).is_err());
        assert_eq!(Grid::new(1024).unwrap().num_voxels(), 1 << 30);
    }

    #[test]
    fn floors_before_bounds_test() {
        let grid = Grid::new(4).unwrap();
        assert!(grid.contains(Vec3::new(3.9, 0.0, 0.2)));
        assert!(!grid.contains(Vec3::new(4.0, 0.0, 0.0)));
        assert!(!grid.contains(Vec3::new(-0.1, 1.0, 1.0)));
        assert_eq!(grid.index_of(Vec3::new(1.7, 2.2, 3.5)), Some(16 + 8 + 3));
    }

    #[test]
    fn voxel_index_round_trips() {
        let grid = Grid::new(5).unwrap();
        for index in 0..grid.num_voxels() {
            let voxel = grid.voxel_at(index).unwrap();
            assert_eq!(grid.index_of_voxel(voxel), Some(index));
        }
        assert_eq!(grid.voxel_at(grid.num_voxels()), None);
    }

    #[test]
    fn additive_blend_saturates() {
        let base = Colour::new(0.8, 0.1, 1.0);
        let out = BlendMode::Additive.apply(base, Colour::new(0.5, 0.2, 0.3));
        assert_eq!(out.r, 1.0);
        assert!((out.g - 0.3).abs() < 1e-6);
        assert_eq!(out.b, 1.0);
        assert_eq!(BlendMode::Overwrite.apply(base, Colour::BLACK), Colour::BLACK);
    }

    #[test]
    fn clamps_untrusted_channels() {
        let colour = Colour::from([2.0, -1.0, f32::NAN]);
        assert_eq!(colour, Colour::new(1.0, 0.0, 0.0));
        assert_eq!(Colour::new(1.5, 0.25, -2.0).clamp_channels(), Colour::new(1.0, 0.25, 0.0));
        assert_eq!(
            BlendMode::Overwrite.apply(Colour::BLACK, Colour::new(3.0, -1.0, 0.5)),
            Colour::new(1.0, 0.0, 0.5)
        );
    }

    #[test]
    fn deserialising_clamps_channels() {
        let colour: Colour = serde_json::from_str(r#"{"r": 5, "g": -3, "b": 0.5}"#).unwrap();
        assert_eq!(colour, Colour::new(1.0, 0.0, 0.5));
        let colour: Colour = serde_json::from_str(r#"{"g": 0.25}"#).unwrap();
        assert_eq!(colour, Colour::new(0.0, 0.25, 0.0));
    }
}
