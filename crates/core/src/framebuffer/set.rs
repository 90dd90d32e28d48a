use super::{CombineOptions, CpuFramebuffer, Framebuffer, KernelFramebuffer, SharedKernel};
use crate::{BlendMode, Colour, Grid, Result, VoxelError};

pub const KERNEL_FRAMEBUFFER_0: usize = 0;
pub const KERNEL_FRAMEBUFFER_1: usize = 1;
pub const CPU_FRAMEBUFFER_0: usize = 2;
pub const CPU_FRAMEBUFFER_1: usize = 3;

/// Number of framebuffers owned by a set.
pub const FRAMEBUFFER_COUNT: usize = 4;

/// The four framebuffers an engine renders through: two kernel-backed and two
/// software buffers, addressed by slot index.
pub struct FramebufferSet {
    grid: Grid,
    kernel: SharedKernel,
    buffers: Vec<Box<dyn Framebuffer>>,
}

impl FramebufferSet {
    pub fn new(grid: Grid, kernel: SharedKernel) -> Result<Self> {
        let buffers = allocate(grid, &kernel)?;
        Ok(Self {
            grid,
            kernel,
            buffers,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Replaces all four buffers with freshly allocated ones of the new size.
    /// On failure the existing buffers are left untouched.
    pub fn reallocate(&mut self, grid: Grid) -> Result<()> {
        let buffers = allocate(grid, &self.kernel)?;
        self.buffers = buffers;
        self.grid = grid;
        Ok(())
    }

    /// The other half of the double buffer `slot` belongs to.
    pub fn other_slot(slot: usize) -> Option<usize> {
        match slot {
            KERNEL_FRAMEBUFFER_0 => Some(KERNEL_FRAMEBUFFER_1),
            KERNEL_FRAMEBUFFER_1 => Some(KERNEL_FRAMEBUFFER_0),
            CPU_FRAMEBUFFER_0 => Some(CPU_FRAMEBUFFER_1),
            CPU_FRAMEBUFFER_1 => Some(CPU_FRAMEBUFFER_0),
            _ => None,
        }
    }

    /// First buffer of the pair an animator renders into.
    pub fn primary_slot(cpu_only: bool) -> usize {
        if cpu_only {
            CPU_FRAMEBUFFER_0
        } else {
            KERNEL_FRAMEBUFFER_0
        }
    }

    /// Second buffer of the pair, used for the incoming animator of a crossfade.
    pub fn secondary_slot(cpu_only: bool) -> usize {
        if cpu_only {
            CPU_FRAMEBUFFER_1
        } else {
            KERNEL_FRAMEBUFFER_1
        }
    }

    /// First slot, kernel buffers preferred, that is neither `a` nor `b`.
    pub fn free_slot(a: usize, b: usize) -> usize {
        [
            KERNEL_FRAMEBUFFER_0,
            KERNEL_FRAMEBUFFER_1,
            CPU_FRAMEBUFFER_0,
            CPU_FRAMEBUFFER_1,
        ]
        .into_iter()
        .find(|slot| *slot != a && *slot != b)
        .unwrap_or(CPU_FRAMEBUFFER_1)
    }

    pub fn get(&self, slot: usize) -> Result<&dyn Framebuffer> {
        self.buffers
            .get(slot)
            .map(|fb| fb.as_ref())
            .ok_or(VoxelError::UnknownFramebuffer(slot))
    }

    pub fn get_mut(&mut self, slot: usize) -> Result<&mut dyn Framebuffer> {
        match self.buffers.get_mut(slot) {
            Some(fb) => {
                let fb: &mut dyn Framebuffer = fb.as_mut();
                Ok(fb)
            }
            None => Err(VoxelError::UnknownFramebuffer(slot)),
        }
    }

    pub fn clear_all(&mut self, colour: Colour) -> Result<()> {
        for fb in &mut self.buffers {
            fb.clear(colour)?;
        }
        Ok(())
    }

    /// Blends slots `a` and `b` into `target`. Blending into one of the
    /// sources is rejected and leaves every buffer untouched.
    pub fn combine(
        &mut self,
        target: usize,
        a: usize,
        b: usize,
        options: CombineOptions,
    ) -> Result<()> {
        if target == a || target == b {
            tracing::error!(slot = target, a, b, "refusing to combine a framebuffer into itself");
            return Err(VoxelError::SelfBlend { target });
        }
        let (dst, sources) = self.split(target, &[a, b])?;
        dst.draw_combined(sources[0], sources[1], options)
    }

    /// Draws `source` into `target` using `blend`.
    pub fn draw_framebuffer(
        &mut self,
        target: usize,
        source: usize,
        blend: BlendMode,
    ) -> Result<()> {
        if target == source {
            tracing::error!(slot = target, "refusing to draw a framebuffer into itself");
            return Err(VoxelError::SelfBlend { target });
        }
        let (dst, sources) = self.split(target, &[source])?;
        dst.draw_framebuffer(sources[0], blend)
    }

    /// Borrows `target` mutably alongside shared borrows of `sources`, none of
    /// which may equal `target`.
    fn split<'a>(
        &'a mut self,
        target: usize,
        sources: &[usize],
    ) -> Result<(&'a mut dyn Framebuffer, Vec<&'a dyn Framebuffer>)> {
        for slot in sources.iter().copied().chain([target]) {
            if slot >= self.buffers.len() {
                return Err(VoxelError::UnknownFramebuffer(slot));
            }
        }

        let mut dst = None;
        let mut shared: Vec<Option<&'a dyn Framebuffer>> = vec![None; self.buffers.len()];
        for (slot, fb) in self.buffers.iter_mut().enumerate() {
            if slot == target {
                let fb: &'a mut dyn Framebuffer = &mut **fb;
                dst = Some(fb);
            } else {
                shared[slot] = Some(&**fb);
            }
        }

        let dst = dst.ok_or(VoxelError::UnknownFramebuffer(target))?;
        let sources = sources
            .iter()
            .map(|slot| shared[*slot].ok_or(VoxelError::SelfBlend { target }))
            .collect::<Result<Vec<_>>>()?;
        Ok((dst, sources))
    }
}

fn allocate(grid: Grid, kernel: &SharedKernel) -> Result<Vec<Box<dyn Framebuffer>>> {
    Ok(vec![
        Box::new(KernelFramebuffer::new(KERNEL_FRAMEBUFFER_0, grid, kernel.clone())?),
        Box::new(KernelFramebuffer::new(KERNEL_FRAMEBUFFER_1, grid, kernel.clone())?),
        Box::new(CpuFramebuffer::new(CPU_FRAMEBUFFER_0, grid)),
        Box::new(CpuFramebuffer::new(CPU_FRAMEBUFFER_1, grid)),
    ])
}

impl std::fmt::Debug for FramebufferSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramebufferSet")
            .field("grid", &self.grid)
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
