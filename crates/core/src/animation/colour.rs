use futures_util::{future::BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Animator;
use crate::{Colour, Framebuffer, Result};

/// Configuration for [`ColourAnimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColourConfig {
    pub colour_start: Colour,
    pub colour_end: Colour,
    pub start_time_secs: f32,
    pub end_time_secs: f32,
    /// Ping-pong between the two colours instead of holding the end colour.
    pub repeat: bool,
}

impl Default for ColourConfig {
    fn default() -> Self {
        Self {
            colour_start: Colour::BLACK,
            colour_end: Colour::WHITE,
            start_time_secs: 0.0,
            end_time_secs: 2.0,
            repeat: false,
        }
    }
}

/// Fades the whole display from one colour to another.
#[derive(Debug, Default)]
pub struct ColourAnimator {
    config: ColourConfig,
    time_secs: f32,
}

impl ColourAnimator {
    pub fn new(config: ColourConfig) -> Self {
        Self {
            config,
            time_secs: 0.0,
        }
    }

    pub fn config(&self) -> &ColourConfig {
        &self.config
    }

    /// Colour shown at the current animation time.
    pub fn current_colour(&self) -> Colour {
        let ColourConfig {
            colour_start,
            colour_end,
            start_time_secs,
            end_time_secs,
            repeat,
        } = self.config;

        let duration = end_time_secs - start_time_secs;
        if duration <= 0.0 {
            return if self.time_secs >= start_time_secs {
                colour_end
            } else {
                colour_start
            };
        }

        let progress = ((self.time_secs - start_time_secs) / duration).max(0.0);
        let t = if repeat {
            let phase = progress % 2.0;
            if phase <= 1.0 {
                phase
            } else {
                2.0 - phase
            }
        } else {
            progress.min(1.0)
        };
        colour_start.lerp(colour_end, t)
    }
}

impl Animator for ColourAnimator {
    fn render<'a>(
        &'a mut self,
        dt: f32,
        surface: &'a mut dyn Framebuffer,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.time_secs += dt.max(0.0);
            surface.clear(self.current_colour())
        }
        .boxed()
    }

    fn set_config(&mut self, config: &Value) -> Result<()> {
        self.config = serde_json::from_value(config.clone())?;
        self.time_secs = 0.0;
        Ok(())
    }

    fn stop(&mut self) {
        self.time_secs = 0.0;
    }
}
