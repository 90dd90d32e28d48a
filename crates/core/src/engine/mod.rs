//! The display engine: owns the framebuffers and animators and turns one tick
//! of elapsed time into one finished frame.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value;

use crate::{
    framebuffer::FramebufferSet, AnimatorRegistry, Colour, CombineOptions, DisplayConfig,
    FramePlan, Grid, HostKernel, Result, SharedKernel, VoxelSnapshot,
};

pub const DEFAULT_BRIGHTNESS_MULTIPLIER: f32 = 1.0;

/// Frame-level state of a voxel display.
#[derive(Debug)]
pub struct VoxelEngine {
    grid: Grid,
    framebuffers: FramebufferSet,
    animators: AnimatorRegistry,
    brightness: f32,
    frame_counter: u64,
    output_slot: usize,
}

impl VoxelEngine {
    /// Builds an engine rendering through `kernel`, with the built-in
    /// animators registered.
    pub fn new(grid: Grid, kernel: SharedKernel) -> Result<Self> {
        Self::with_animators(grid, kernel, AnimatorRegistry::with_builtins())
    }

    pub fn with_animators(
        grid: Grid,
        kernel: SharedKernel,
        animators: AnimatorRegistry,
    ) -> Result<Self> {
        let framebuffers = FramebufferSet::new(grid, kernel)?;
        let output_slot = animators
            .current()
            .map(|tag| FramebufferSet::primary_slot(animators.renders_to_cpu_only(tag)))
            .unwrap_or_else(|| FramebufferSet::primary_slot(false));
        tracing::info!(grid_size = grid.size(), "voxel engine ready");
        Ok(Self {
            grid,
            framebuffers,
            animators,
            brightness: DEFAULT_BRIGHTNESS_MULTIPLIER,
            frame_counter: 0,
            output_slot,
        })
    }

    /// Builds an engine from configuration, using the host reference kernel.
    pub fn from_config(config: &DisplayConfig) -> Result<Self> {
        config.validate()?;
        let mut engine = Self::new(Grid::new(config.grid_size)?, HostKernel::shared())?;
        engine.set_global_brightness(config.brightness);
        engine.set_crossfade_time(config.crossfade_secs);
        for (tag, animator_config) in &config.animators {
            if let Some(animator) = engine.animators.get_mut(tag) {
                if let Err(err) = animator.set_config(animator_config) {
                    tracing::warn!(animator = %tag, %err, "ignoring animator config");
                }
            } else {
                tracing::warn!(animator = %tag, "config given for unknown animator");
            }
        }
        if !engine.animators.set_animator(&config.initial_animator, None) {
            tracing::warn!(animator = %config.initial_animator, "unknown initial animator");
        }
        // The first animator is shown directly, not faded in.
        engine.animators.abandon_transition();
        Ok(engine)
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot holding the most recently finished frame.
    pub fn output_slot(&self) -> usize {
        self.output_slot
    }

    pub fn animators(&self) -> &AnimatorRegistry {
        &self.animators
    }

    pub fn animators_mut(&mut self) -> &mut AnimatorRegistry {
        &mut self.animators
    }

    pub fn framebuffers(&self) -> &FramebufferSet {
        &self.framebuffers
    }

    /// See [`AnimatorRegistry::set_animator`]. Takes effect on the next
    /// rendered frame.
    pub fn set_animator(&mut self, tag: &str, config: Option<&Value>) -> bool {
        self.animators.set_animator(tag, config)
    }

    pub fn set_crossfade_time(&mut self, secs: f32) {
        self.animators.set_crossfade_time(secs);
    }

    pub fn set_global_brightness(&mut self, brightness: f32) {
        self.brightness = if brightness.is_nan() {
            0.0
        } else {
            brightness.clamp(0.0, 1.0)
        };
    }

    pub fn clear_all(&mut self, colour: Colour) -> Result<()> {
        self.framebuffers.clear_all(colour)
    }

    /// Reallocates every framebuffer for a new grid size. Any transition in
    /// flight is abandoned.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        let grid = Grid::new(size)?;
        self.framebuffers.reallocate(grid)?;
        self.grid = grid;
        self.animators.abandon_transition();
        tracing::info!(grid_size = size, "voxel grid resized");
        Ok(())
    }

    /// Renders one frame worth `dt` seconds and returns the slot holding it.
    ///
    /// During a crossfade the outgoing animator renders first, then the
    /// incoming one, then both are blended into a third slot.
    pub async fn render_frame(&mut self, dt: f32) -> Result<usize> {
        let output = match self.animators.frame_plan() {
            FramePlan::Idle => {
                let slot = FramebufferSet::primary_slot(false);
                self.framebuffers.get_mut(slot)?.clear(Colour::BLACK)?;
                slot
            }
            FramePlan::Steady { current } => {
                let cpu_only = self.animators.renders_to_cpu_only(&current);
                let slot = FramebufferSet::primary_slot(cpu_only);
                self.render_animator(&current, slot, dt).await?;
                slot
            }
            FramePlan::Crossfade {
                previous,
                current,
                percent,
            } => {
                let previous_slot =
                    FramebufferSet::primary_slot(self.animators.renders_to_cpu_only(&previous));
                let current_slot =
                    FramebufferSet::secondary_slot(self.animators.renders_to_cpu_only(&current));
                self.render_animator(&previous, previous_slot, dt).await?;
                self.render_animator(&current, current_slot, dt).await?;

                let output = FramebufferSet::free_slot(previous_slot, current_slot);
                self.framebuffers.combine(
                    output,
                    current_slot,
                    previous_slot,
                    CombineOptions::alpha(percent),
                )?;
                output
            }
        };

        self.animators.advance(dt);
        self.output_slot = output;
        Ok(output)
    }

    /// Copy of the most recently finished frame.
    pub fn output_snapshot(&self) -> Result<VoxelSnapshot> {
        self.framebuffers.get(self.output_slot)?.snapshot()
    }

    /// Marks the current frame as published.
    pub(crate) fn finish_frame(&mut self) -> u64 {
        let published = self.frame_counter;
        self.frame_counter += 1;
        published
    }

    /// Clears `slot` and lets `tag` draw into it. A failing or panicking
    /// animator leaves the slot cleared.
    async fn render_animator(&mut self, tag: &str, slot: usize, dt: f32) -> Result<()> {
        let surface = self.framebuffers.get_mut(slot)?;
        surface.clear(Colour::BLACK)?;

        let Some(animator) = self.animators.get_mut(tag) else {
            return Ok(());
        };

        let failed = match AssertUnwindSafe(animator.render(dt, surface))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                tracing::warn!(animator = tag, slot, %err, "animator failed to render");
                true
            }
            Err(_) => {
                tracing::warn!(animator = tag, slot, "animator panicked while rendering");
                true
            }
        };

        if failed {
            self.framebuffers.get_mut(slot)?.clear(Colour::BLACK)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::BoxFuture;
    use glam::Vec3;
    use serde_json::json;

    use super::*;
    use crate::{
        animation::registry::tests::RecordingAnimator, framebuffer::set::CPU_FRAMEBUFFER_0,
        Animator, Framebuffer, VoxelError,
    };

    const RED: Colour = Colour::new(1.0, 0.0, 0.0);
    const BLUE: Colour = Colour::new(0.0, 0.0, 1.0);

    fn engine() -> VoxelEngine {
        let mut animators = AnimatorRegistry::new();
        let (red, _) = RecordingAnimator::new(RED);
        let (mut blue, _) = RecordingAnimator::new(BLUE);
        blue.cpu_only = true;
        animators.register("red", red);
        animators.register("blue", blue);
        VoxelEngine::with_animators(Grid::new(3).unwrap(), HostKernel::shared(), animators)
            .unwrap()
    }

    fn centre(snapshot: &VoxelSnapshot) -> Colour {
        snapshot.get(1, 1, 1).unwrap()
    }

    struct Panicker;

    fn explode() -> Result<()> {
        panic!("animator exploded")
    }

    impl Animator for Panicker {
        fn render<'a>(
            &'a mut self,
            _dt: f32,
            surface: &'a mut dyn Framebuffer,
        ) -> BoxFuture<'a, Result<()>> {
            async move {
                surface.set_voxel(Vec3::ZERO, Colour::WHITE);
                explode()
            }
            .boxed()
        }

        fn set_config(&mut self, _config: &Value) -> Result<()> {
            Err(VoxelError::msg("no config"))
        }

        fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn steady_frame_shows_current_animator() {
        let mut engine = engine();
        let slot = engine.render_frame(0.016).await.unwrap();
        assert_eq!(slot, FramebufferSet::primary_slot(false));
        assert_eq!(centre(&engine.output_snapshot().unwrap()), RED);
    }

    #[tokio::test]
    async fn crossfade_starts_from_previous_and_ends_on_current() {
        let mut engine = engine();
        engine.set_crossfade_time(1.0);
        engine.render_frame(0.1).await.unwrap();
        assert!(engine.set_animator("blue", None));

        engine.render_frame(0.5).await.unwrap();
        assert_eq!(centre(&engine.output_snapshot().unwrap()), RED);

        engine.render_frame(0.5).await.unwrap();
        let halfway = centre(&engine.output_snapshot().unwrap());
        assert!((halfway.r - 0.5).abs() < 1e-6 && (halfway.b - 0.5).abs() < 1e-6);
        assert!(engine.animators().previous().is_none());

        let slot = engine.render_frame(0.5).await.unwrap();
        assert_eq!(slot, CPU_FRAMEBUFFER_0);
        assert_eq!(centre(&engine.output_snapshot().unwrap()), BLUE);
    }

    #[tokio::test]
    async fn crossfade_output_never_aliases_a_source() {
        let mut engine = engine();
        engine.set_animator("blue", None);
        let slot = engine.render_frame(0.0).await.unwrap();
        assert_ne!(slot, FramebufferSet::primary_slot(false));
        assert_ne!(slot, FramebufferSet::secondary_slot(true));
    }

    #[tokio::test]
    async fn panicking_animator_produces_a_dark_frame() {
        let mut animators = AnimatorRegistry::new();
        animators.register("panic", Panicker);
        let mut engine =
            VoxelEngine::with_animators(Grid::new(2).unwrap(), HostKernel::shared(), animators)
                .unwrap();

        engine.render_frame(0.016).await.unwrap();
        assert!(engine.output_snapshot().unwrap().is_dark());
    }

    #[tokio::test]
    async fn resize_abandons_transition() {
        let mut engine = engine();
        engine.set_animator("blue", None);
        engine.resize(5).unwrap();

        assert!(!engine.animators().is_transitioning());
        engine.render_frame(0.016).await.unwrap();
        let snapshot = engine.output_snapshot().unwrap();
        assert_eq!(snapshot.size, 5);
        assert_eq!(snapshot.voxels.len(), 125);
        assert_eq!(snapshot.get(4, 4, 4), Some(BLUE));
    }

    #[test]
    fn brightness_is_clamped() {
        let mut engine = engine();
        engine.set_global_brightness(1.7);
        assert_eq!(engine.brightness(), 1.0);
        engine.set_global_brightness(-0.2);
        assert_eq!(engine.brightness(), 0.0);
    }

    #[test]
    fn clear_all_paints_every_slot() {
        let mut engine = engine();
        engine.clear_all(BLUE).unwrap();
        for slot in 0..4 {
            let fb = engine.framebuffers().get(slot).unwrap();
            assert_eq!(fb.get_voxel(Vec3::ONE), Some(BLUE));
        }
    }

    #[test]
    fn builds_from_config() {
        let config: DisplayConfig = serde_json::from_value(json!({
            "grid_size": 4,
            "brightness": 0.5,
            "initial_animator": "shape-waves",
            "animators": {"colour": {"repeat": true}}
        }))
        .unwrap();
        let engine = VoxelEngine::from_config(&config).unwrap();

        assert_eq!(engine.grid().size(), 4);
        assert_eq!(engine.brightness(), 0.5);
        assert_eq!(engine.animators().current(), Some("shape-waves"));
        assert!(!engine.animators().is_transitioning());
    }
}
