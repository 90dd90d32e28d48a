use futures_util::{future::BoxFuture, FutureExt};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Animator;
use crate::{BlendMode, Colour, Framebuffer, Result};

const MIN_WAVE_SPACING: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeWaveConfig {
    /// Wave origin; the middle of the display when unset.
    pub center: Option<Vec3>,
    /// Growth of every wave radius, in voxels per second.
    pub speed: f32,
    /// Radial distance between consecutive waves.
    pub spacing: f32,
    pub colours: Vec<Colour>,
    pub brightness: f32,
}

impl Default for ShapeWaveConfig {
    fn default() -> Self {
        Self {
            center: None,
            speed: 3.0,
            spacing: 2.0,
            colours: vec![
                Colour::new(1.0, 0.0, 0.0),
                Colour::new(0.0, 1.0, 0.0),
                Colour::new(0.0, 0.0, 1.0),
            ],
            brightness: 1.0,
        }
    }
}

/// Concentric spherical shells growing out of a single point, each one a
/// step further through the colour list.
#[derive(Debug, Default)]
pub struct ShapeWaveAnimator {
    config: ShapeWaveConfig,
    time_secs: f32,
}

impl ShapeWaveAnimator {
    pub fn new(config: ShapeWaveConfig) -> Self {
        Self {
            config,
            time_secs: 0.0,
        }
    }

    /// Radius and colour of every wave visible inside a display of `size`.
    pub fn waves(&self, size: usize) -> Vec<(Vec3, f32, Colour)> {
        let config = &self.config;
        if config.colours.is_empty() || !(config.spacing >= MIN_WAVE_SPACING) {
            return Vec::new();
        }

        let center = config
            .center
            .unwrap_or_else(|| Vec3::splat((size as f32 - 1.0) * 0.5));
        // Distance to the farthest corner of the display.
        let far = Vec3::splat(size as f32 - 1.0);
        let reach = center.abs().max((far - center).abs()).length();

        let travelled = (self.time_secs * config.speed).max(0.0);
        if !reach.is_finite() || !travelled.is_finite() {
            return Vec::new();
        }
        let emitted = (travelled / config.spacing).floor() as i64;
        let offset = travelled - emitted as f32 * config.spacing;
        let len = config.colours.len() as i64;

        let mut waves = Vec::new();
        let mut k = 0_i64;
        loop {
            let radius = offset + k as f32 * config.spacing;
            if radius > reach {
                break;
            }
            let colour = config.colours[(emitted - k).rem_euclid(len) as usize];
            waves.push((center, radius, colour * config.brightness.clamp(0.0, 1.0)));
            k += 1;
        }
        waves
    }
}

impl Animator for ShapeWaveAnimator {
    fn render<'a>(
        &'a mut self,
        dt: f32,
        surface: &'a mut dyn Framebuffer,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.time_secs += dt.max(0.0);
            for (center, radius, colour) in self.waves(surface.grid().size()) {
                surface.draw_sphere(center, radius, colour, false, BlendMode::Additive);
            }
            Ok(())
        }
        .boxed()
    }

    fn set_config(&mut self, config: &Value) -> Result<()> {
        self.config = serde_json::from_value(config.clone())?;
        Ok(())
    }

    fn stop(&mut self) {
        self.time_secs = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{CpuFramebuffer, Grid};

    #[test]
    fn waves_step_through_colours() {
        let mut anim = ShapeWaveAnimator::new(ShapeWaveConfig {
            center: Some(Vec3::ZERO),
            speed: 1.0,
            spacing: 2.0,
            colours: vec![Colour::WHITE, Colour::new(1.0, 0.0, 0.0)],
            brightness: 1.0,
        });
        anim.time_secs = 2.5;

        let waves = anim.waves(4);
        assert!((waves[0].1 - 0.5).abs() < 1e-6);
        assert_eq!(waves[0].2, Colour::new(1.0, 0.0, 0.0));
        assert!((waves[1].1 - 2.5).abs() < 1e-6);
        assert_eq!(waves[1].2, Colour::WHITE);
    }

    #[test]
    fn empty_colour_list_draws_nothing() {
        let mut anim = ShapeWaveAnimator::default();
        anim.set_config(&json!({"colours": []})).unwrap();
        assert!(anim.waves(8).is_empty());
    }

    #[tokio::test]
    async fn renders_shells_into_surface() {
        let mut fb = CpuFramebuffer::new(0, Grid::new(6).unwrap());
        let mut anim = ShapeWaveAnimator::default();

        anim.render(0.4, &mut fb).await.unwrap();
        let snapshot = fb.snapshot().unwrap();
        assert!(!snapshot.is_dark());
        assert!(snapshot
            .voxels
            .iter()
            .all(|c| c.r <= 1.0 && c.g <= 1.0 && c.b <= 1.0));
    }
}
