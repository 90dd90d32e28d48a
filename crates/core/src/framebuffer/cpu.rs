use std::borrow::Cow;

use glam::Vec3;

use super::{combine_voxel, ensure_len, CombineOptions, Framebuffer};
use crate::{BlendMode, Colour, Grid, Result};

/// Software framebuffer holding the whole grid in host memory.
#[derive(Debug, Clone)]
pub struct CpuFramebuffer {
    index: usize,
    grid: Grid,
    voxels: Vec<Colour>,
}

impl CpuFramebuffer {
    pub fn new(index: usize, grid: Grid) -> Self {
        Self {
            index,
            grid,
            voxels: vec![Colour::BLACK; grid.num_voxels()],
        }
    }
}

impl Framebuffer for CpuFramebuffer {
    fn index(&self) -> usize {
        self.index
    }

    fn grid(&self) -> Grid {
        self.grid
    }

    fn set_voxel(&mut self, pt: Vec3, colour: Colour) {
        if let Some(i) = self.grid.index_of(pt) {
            self.voxels[i] = colour.clamp_channels();
        }
    }

    fn add_to_voxel(&mut self, pt: Vec3, colour: Colour) {
        if let Some(i) = self.grid.index_of(pt) {
            self.voxels[i] = self.voxels[i].saturating_add(colour);
        }
    }

    fn get_voxel(&self, pt: Vec3) -> Option<Colour> {
        self.grid.index_of(pt).map(|i| self.voxels[i])
    }

    fn clear(&mut self, colour: Colour) -> Result<()> {
        self.voxels.fill(colour.clamp_channels());
        Ok(())
    }

    fn voxels(&self) -> Result<Cow<'_, [Colour]>> {
        Ok(Cow::Borrowed(&self.voxels))
    }

    fn draw_combined(
        &mut self,
        a: &dyn Framebuffer,
        b: &dyn Framebuffer,
        options: CombineOptions,
    ) -> Result<()> {
        let alpha = options.clamped_alpha();
        let a = a.voxels()?;
        let b = b.voxels()?;
        ensure_len(self.grid, a.len())?;
        ensure_len(self.grid, b.len())?;

        for ((dst, a), b) in self.voxels.iter_mut().zip(a.iter()).zip(b.iter()) {
            *dst = combine_voxel(*a, *b, alpha);
        }
        Ok(())
    }

    fn draw_framebuffer(&mut self, source: &dyn Framebuffer, blend: BlendMode) -> Result<()> {
        let source = source.voxels()?;
        ensure_len(self.grid, source.len())?;

        for (dst, src) in self.voxels.iter_mut().zip(source.iter()) {
            *dst = blend.apply(*dst, *src);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(size: usize) -> CpuFramebuffer {
        CpuFramebuffer::new(2, Grid::new(size).unwrap())
    }

    #[test]
    fn set_and_read_back() {
        let mut fb = build(4);
        let colour = Colour::new(0.2, 0.4, 0.6);
        fb.set_voxel(Vec3::new(1.0, 2.0, 3.0), colour);
        assert_eq!(fb.get_voxel(Vec3::new(1.5, 2.9, 3.0)), Some(colour));
        assert_eq!(fb.get_voxel(Vec3::ZERO), Some(Colour::BLACK));
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut fb = build(3);
        fb.set_voxel(Vec3::new(3.0, 0.0, 0.0), Colour::WHITE);
        fb.add_to_voxel(Vec3::new(0.0, -0.5, 0.0), Colour::WHITE);
        assert!(fb.snapshot().unwrap().is_dark());
    }

    #[test]
    fn partially_visible_sphere_paints_visible_part() {
        let mut fb = build(4);
        fb.draw_sphere(Vec3::ZERO, 1.0, Colour::WHITE, true, BlendMode::Overwrite);
        assert_eq!(fb.get_voxel(Vec3::ZERO), Some(Colour::WHITE));
        assert_eq!(fb.get_voxel(Vec3::new(1.0, 0.0, 0.0)), Some(Colour::WHITE));
        assert_eq!(fb.get_voxel(Vec3::new(2.0, 0.0, 0.0)), Some(Colour::BLACK));
    }

    #[test]
    fn line_paints_collinear_voxels() {
        let mut fb = build(5);
        fb.draw_line(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Colour::WHITE, BlendMode::Overwrite);
        let snapshot = fb.snapshot().unwrap();
        let lit = snapshot.voxels.iter().filter(|c| **c == Colour::WHITE).count();
        assert_eq!(lit, 4);
        for x in 0..4 {
            assert_eq!(snapshot.get(x, 0, 0), Some(Colour::WHITE));
        }
    }

    #[test]
    fn degenerate_line_paints_one_voxel() {
        let mut fb = build(4);
        let p = Vec3::new(2.3, 1.0, 3.7);
        fb.draw_line(p, p, Colour::WHITE, BlendMode::Overwrite);
        let snapshot = fb.snapshot().unwrap();
        let lit = snapshot.voxels.iter().filter(|c| **c != Colour::BLACK).count();
        assert_eq!(lit, 1);
        assert_eq!(snapshot.get(2, 1, 3), Some(Colour::WHITE));
    }

    #[test]
    fn stores_clamped_colours() {
        let mut fb = build(2);
        fb.set_voxel(Vec3::ONE, Colour::new(2.0, -0.5, 0.5));
        assert_eq!(fb.get_voxel(Vec3::ONE), Some(Colour::new(1.0, 0.0, 0.5)));

        fb.clear(Colour::new(-1.0, f32::NAN, 7.0)).unwrap();
        let voxels = fb.voxels().unwrap();
        assert!(voxels.iter().all(|c| *c == Colour::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn additive_points_saturate() {
        let mut fb = build(2);
        let half = Colour::new(0.6, 0.6, 0.0);
        fb.draw_point(Vec3::ONE, half, BlendMode::Additive);
        fb.draw_point(Vec3::ONE, half, BlendMode::Additive);
        assert_eq!(fb.get_voxel(Vec3::ONE), Some(Colour::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn combines_two_sources() {
        let grid = Grid::new(2).unwrap();
        let mut a = CpuFramebuffer::new(0, grid);
        let mut b = CpuFramebuffer::new(1, grid);
        let mut out = CpuFramebuffer::new(2, grid);
        a.clear(Colour::new(1.0, 0.0, 0.0)).unwrap();
        b.clear(Colour::new(0.0, 0.0, 1.0)).unwrap();

        out.draw_combined(&a, &b, CombineOptions::alpha(0.25)).unwrap();
        let voxel = out.get_voxel(Vec3::ZERO).unwrap();
        assert!((voxel.r - 0.25).abs() < 1e-6);
        assert!((voxel.b - 0.75).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_sources() {
        let mut out = build(2);
        let small = build(1);
        assert!(out.draw_framebuffer(&small, BlendMode::Additive).is_err());
    }
}
