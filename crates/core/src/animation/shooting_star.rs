use std::collections::VecDeque;

use futures_util::{future::BoxFuture, FutureExt};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Animator;
use crate::{BlendMode, Colour, Framebuffer, Grid, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShootingStarConfig {
    pub colour: Colour,
    pub start_position: Vec3,
    /// Voxels per second.
    pub velocity: Vec3,
    /// Number of past positions kept as a fading tail.
    pub tail_length: usize,
}

impl Default for ShootingStarConfig {
    fn default() -> Self {
        Self {
            colour: Colour::WHITE,
            start_position: Vec3::ZERO,
            velocity: Vec3::new(4.0, 2.0, 1.0),
            tail_length: 4,
        }
    }
}

/// A single bright voxel streaking across the display with an additive tail.
/// It respawns at its start once it has left the grid for good.
#[derive(Debug)]
pub struct ShootingStarAnimator {
    config: ShootingStarConfig,
    position: Vec3,
    trail: VecDeque<Vec3>,
}

impl Default for ShootingStarAnimator {
    fn default() -> Self {
        Self::new(ShootingStarConfig::default())
    }
}

impl ShootingStarAnimator {
    pub fn new(config: ShootingStarConfig) -> Self {
        Self {
            position: config.start_position,
            trail: VecDeque::new(),
            config,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn reset(&mut self) {
        self.position = self.config.start_position;
        self.trail.clear();
    }

    fn advance(&mut self, dt: f32, grid: Grid) {
        self.position += self.config.velocity * dt.max(0.0);
        self.trail.push_front(self.position);
        self.trail.truncate(self.config.tail_length + 1);

        if !grid.contains(self.position) && !heading_into(grid, self.position, self.config.velocity)
        {
            // Keep drawing until the whole tail has left as well.
            if self.trail.iter().all(|pt| !grid.contains(*pt)) {
                tracing::trace!("shooting star left the display, respawning");
                self.reset();
            }
        }
    }

    fn draw(&self, surface: &mut dyn Framebuffer) {
        let segments = self.trail.len().max(1) as f32;
        if let Some(head) = self.trail.front() {
            surface.draw_point(*head, self.config.colour, BlendMode::Additive);
        }
        for (i, pair) in self.trail.iter().collect::<Vec<_>>().windows(2).enumerate() {
            let fade = 1.0 - (i + 1) as f32 / segments;
            surface.draw_line(*pair[0], *pair[1], self.config.colour * fade, BlendMode::Additive);
        }
    }
}

impl Animator for ShootingStarAnimator {
    fn render<'a>(
        &'a mut self,
        dt: f32,
        surface: &'a mut dyn Framebuffer,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.advance(dt, surface.grid());
            self.draw(surface);
            Ok(())
        }
        .boxed()
    }

    fn set_config(&mut self, config: &Value) -> Result<()> {
        self.config = serde_json::from_value(config.clone())?;
        self.reset();
        Ok(())
    }

    fn stop(&mut self) {
        self.reset();
    }

    fn renders_to_cpu_only(&self) -> bool {
        true
    }
}

/// Slab test: does the ray from `origin` along `velocity` reach the display?
fn heading_into(grid: Grid, origin: Vec3, velocity: Vec3) -> bool {
    let max = Vec3::splat(grid.size() as f32);
    let mut t_near = 0.0_f32;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let (o, v, hi) = (origin[axis], velocity[axis], max[axis]);
        if v.abs() <= f32::EPSILON {
            if o < 0.0 || o >= hi {
                return false;
            }
            continue;
        }
        let (t0, t1) = ((0.0 - o) / v, (hi - o) / v);
        let (t0, t1) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return false;
        }
    }
    true
}
