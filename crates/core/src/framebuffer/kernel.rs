use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use glam::Vec3;

use super::{combine_voxel, ensure_len, CombineOptions, Framebuffer};
use crate::{BlendMode, Colour, Grid, Result, VoxelError};

/// Opaque identifier of a voxel buffer living inside a [`VoxelKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u64);

/// Accelerated per-voxel arithmetic backend.
///
/// Implementations own the storage behind each handle (device textures,
/// shared memory, ...). Indices are dense x-major grid indices that have
/// already been bounds-checked by the framebuffer.
pub trait VoxelKernel: Send {
    fn allocate(&mut self, voxel_count: usize) -> Result<KernelHandle>;

    fn release(&mut self, handle: KernelHandle);

    fn fill(&mut self, handle: KernelHandle, colour: Colour) -> Result<()>;

    fn write(
        &mut self,
        handle: KernelHandle,
        index: usize,
        colour: Colour,
        blend: BlendMode,
    ) -> Result<()>;

    fn read(&self, handle: KernelHandle, index: usize) -> Result<Colour>;

    /// Stores `a * alpha + b * (1 - alpha)` into `handle`.
    fn blend(&mut self, handle: KernelHandle, a: &[Colour], b: &[Colour], alpha: f32)
        -> Result<()>;

    /// Draws `source` over `handle` voxel by voxel.
    fn composite(&mut self, handle: KernelHandle, source: &[Colour], blend: BlendMode)
        -> Result<()>;

    fn download(&self, handle: KernelHandle) -> Result<Vec<Colour>>;
}

/// Kernel shared by every accelerated framebuffer of an engine.
pub type SharedKernel = Arc<Mutex<dyn VoxelKernel>>;

/// Framebuffer whose storage lives behind a [`VoxelKernel`].
pub struct KernelFramebuffer {
    index: usize,
    grid: Grid,
    handle: KernelHandle,
    kernel: SharedKernel,
}

impl KernelFramebuffer {
    pub fn new(index: usize, grid: Grid, kernel: SharedKernel) -> Result<Self> {
        let handle = lock(&kernel)?.allocate(grid.num_voxels())?;
        tracing::debug!(slot = index, handle = handle.0, "allocated kernel framebuffer");
        Ok(Self {
            index,
            grid,
            handle,
            kernel,
        })
    }

    pub fn handle(&self) -> KernelHandle {
        self.handle
    }

    fn write(&mut self, pt: Vec3, colour: Colour, blend: BlendMode) {
        let Some(voxel) = self.grid.index_of(pt) else {
            return;
        };
        let outcome = lock(&self.kernel)
            .and_then(|mut kernel| kernel.write(self.handle, voxel, colour, blend));
        if let Err(err) = outcome {
            tracing::warn!(slot = self.index, %err, "kernel voxel write failed");
        }
    }
}

impl Framebuffer for KernelFramebuffer {
    fn index(&self) -> usize {
        self.index
    }

    fn grid(&self) -> Grid {
        self.grid
    }

    fn set_voxel(&mut self, pt: Vec3, colour: Colour) {
        self.write(pt, colour, BlendMode::Overwrite);
    }

    fn add_to_voxel(&mut self, pt: Vec3, colour: Colour) {
        self.write(pt, colour, BlendMode::Additive);
    }

    fn get_voxel(&self, pt: Vec3) -> Option<Colour> {
        let voxel = self.grid.index_of(pt)?;
        match lock(&self.kernel).and_then(|kernel| kernel.read(self.handle, voxel)) {
            Ok(colour) => Some(colour),
            Err(err) => {
                tracing::warn!(slot = self.index, %err, "kernel voxel read failed");
                None
            }
        }
    }

    fn clear(&mut self, colour: Colour) -> Result<()> {
        lock(&self.kernel)?.fill(self.handle, colour.clamp_channels())
    }

    fn voxels(&self) -> Result<Cow<'_, [Colour]>> {
        let voxels = lock(&self.kernel)?.download(self.handle)?;
        Ok(Cow::Owned(voxels))
    }

    fn draw_combined(
        &mut self,
        a: &dyn Framebuffer,
        b: &dyn Framebuffer,
        options: CombineOptions,
    ) -> Result<()> {
        // Read back before taking the lock: sibling buffers share this kernel.
        let a = a.voxels()?;
        let b = b.voxels()?;
        ensure_len(self.grid, a.len())?;
        ensure_len(self.grid, b.len())?;
        lock(&self.kernel)?.blend(self.handle, &a, &b, options.clamped_alpha())
    }

    fn draw_framebuffer(&mut self, source: &dyn Framebuffer, blend: BlendMode) -> Result<()> {
        let source = source.voxels()?;
        ensure_len(self.grid, source.len())?;
        lock(&self.kernel)?.composite(self.handle, &source, blend)
    }
}

impl Drop for KernelFramebuffer {
    fn drop(&mut self) {
        if let Ok(mut kernel) = self.kernel.lock() {
            kernel.release(self.handle);
        }
    }
}

impl fmt::Debug for KernelFramebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelFramebuffer")
            .field("index", &self.index)
            .field("grid", &self.grid)
            .field("handle", &self.handle)
            .finish()
    }
}

fn lock(kernel: &SharedKernel) -> Result<MutexGuard<'_, dyn VoxelKernel + 'static>> {
    kernel
        .lock()
        .map_err(|_| VoxelError::kernel("kernel lock has been poisoned"))
}

/// Reference kernel that performs the per-voxel arithmetic on the host.
///
/// Used when no device backend is injected, and by tests.
#[derive(Debug, Default)]
pub struct HostKernel {
    next_handle: u64,
    buffers: HashMap<KernelHandle, Vec<Colour>>,
}

impl HostKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh host kernel for sharing between framebuffers.
    pub fn shared() -> SharedKernel {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn buffer(&self, handle: KernelHandle) -> Result<&Vec<Colour>> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| VoxelError::kernel(format!("unknown handle {}", handle.0)))
    }

    fn buffer_mut(&mut self, handle: KernelHandle) -> Result<&mut Vec<Colour>> {
        self.buffers
            .get_mut(&handle)
            .ok_or_else(|| VoxelError::kernel(format!("unknown handle {}", handle.0)))
    }
}

impl VoxelKernel for HostKernel {
    fn allocate(&mut self, voxel_count: usize) -> Result<KernelHandle> {
        let handle = KernelHandle(self.next_handle);
        self.next_handle += 1;
        self.buffers.insert(handle, vec![Colour::BLACK; voxel_count]);
        Ok(handle)
    }

    fn release(&mut self, handle: KernelHandle) {
        self.buffers.remove(&handle);
    }

    fn fill(&mut self, handle: KernelHandle, colour: Colour) -> Result<()> {
        self.buffer_mut(handle)?.fill(colour.clamp_channels());
        Ok(())
    }

    fn write(
        &mut self,
        handle: KernelHandle,
        index: usize,
        colour: Colour,
        blend: BlendMode,
    ) -> Result<()> {
        let voxel = self
            .buffer_mut(handle)?
            .get_mut(index)
            .ok_or_else(|| VoxelError::kernel(format!("voxel index {index} out of range")))?;
        *voxel = blend.apply(*voxel, colour);
        Ok(())
    }

    fn read(&self, handle: KernelHandle, index: usize) -> Result<Colour> {
        self.buffer(handle)?
            .get(index)
            .copied()
            .ok_or_else(|| VoxelError::kernel(format!("voxel index {index} out of range")))
    }

    fn blend(
        &mut self,
        handle: KernelHandle,
        a: &[Colour],
        b: &[Colour],
        alpha: f32,
    ) -> Result<()> {
        let target = self.buffer_mut(handle)?;
        for ((dst, a), b) in target.iter_mut().zip(a).zip(b) {
            *dst = combine_voxel(*a, *b, alpha);
        }
        Ok(())
    }

    fn composite(
        &mut self,
        handle: KernelHandle,
        source: &[Colour],
        blend: BlendMode,
    ) -> Result<()> {
        let target = self.buffer_mut(handle)?;
        for (dst, src) in target.iter_mut().zip(source) {
            *dst = blend.apply(*dst, *src);
        }
        Ok(())
    }

    fn download(&self, handle: KernelHandle) -> Result<Vec<Colour>> {
        self.buffer(handle).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::CpuFramebuffer;

    fn build(kernel: &SharedKernel, index: usize, size: usize) -> KernelFramebuffer {
        KernelFramebuffer::new(index, Grid::new(size).unwrap(), kernel.clone()).unwrap()
    }

    #[test]
    fn forwards_voxel_writes_to_kernel() {
        let kernel = HostKernel::shared();
        let mut fb = build(&kernel, 0, 3);
        let colour = Colour::new(0.1, 0.2, 0.3);

        fb.set_voxel(Vec3::new(2.0, 1.0, 0.0), colour);
        fb.add_to_voxel(Vec3::new(2.0, 1.0, 0.0), colour);
        fb.set_voxel(Vec3::new(9.0, 0.0, 0.0), Colour::WHITE);

        let voxel = fb.get_voxel(Vec3::new(2.0, 1.0, 0.0)).unwrap();
        assert!((voxel.b - 0.6).abs() < 1e-6);
        let lit = fb.voxels().unwrap().iter().filter(|c| **c != Colour::BLACK).count();
        assert_eq!(lit, 1);
    }

    #[test]
    fn combines_across_backends() {
        let kernel = HostKernel::shared();
        let grid = Grid::new(2).unwrap();
        let mut a = build(&kernel, 0, 2);
        let mut b = CpuFramebuffer::new(2, grid);
        let mut out = build(&kernel, 1, 2);
        a.clear(Colour::WHITE).unwrap();
        b.clear(Colour::BLACK).unwrap();

        out.draw_combined(&a, &b, CombineOptions::alpha(0.5)).unwrap();
        assert_eq!(out.get_voxel(Vec3::ONE), Some(Colour::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn releases_handles_on_drop() {
        let kernel = Arc::new(Mutex::new(HostKernel::new()));
        let shared: SharedKernel = kernel.clone();
        {
            let _fb = build(&shared, 0, 2);
            assert_eq!(kernel.lock().unwrap().live_buffers(), 1);
        }
        assert_eq!(kernel.lock().unwrap().live_buffers(), 0);
    }

    #[test]
    fn stores_clamped_colours() {
        let kernel = HostKernel::shared();
        let mut fb = build(&kernel, 0, 2);
        fb.set_voxel(Vec3::ZERO, Colour::new(4.0, -1.0, 0.25));
        assert_eq!(fb.get_voxel(Vec3::ZERO), Some(Colour::new(1.0, 0.0, 0.25)));

        fb.clear(Colour::new(1.5, 1.5, -3.0)).unwrap();
        let voxels = fb.voxels().unwrap();
        assert!(voxels.iter().all(|c| *c == Colour::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn failed_reads_yield_none() {
        let kernel = HostKernel::shared();
        let fb = build(&kernel, 0, 2);
        kernel.lock().unwrap().release(fb.handle());
        assert_eq!(fb.get_voxel(Vec3::ZERO), None);
    }

    #[test]
    fn degenerate_line_paints_one_voxel() {
        let kernel = HostKernel::shared();
        let mut fb = build(&kernel, 0, 3);
        let p = Vec3::new(1.0, 2.5, 0.0);
        fb.draw_line(p, p, Colour::WHITE, BlendMode::Additive);
        let voxels = fb.voxels().unwrap();
        assert_eq!(voxels.iter().filter(|c| **c != Colour::BLACK).count(), 1);
        assert_eq!(fb.get_voxel(Vec3::new(1.0, 2.0, 0.0)), Some(Colour::WHITE));
    }

    #[test]
    fn unknown_handle_is_a_kernel_error() {
        let mut kernel = HostKernel::new();
        let err = kernel.fill(KernelHandle(42), Colour::WHITE).unwrap_err();
        assert!(format!("{err}").contains("unknown handle 42"));
    }
}
