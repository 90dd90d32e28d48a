//! Pluggable animators and the registry that switches between them.

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::{Framebuffer, Result};

pub mod colour;
pub mod registry;
pub mod shape_wave;
pub mod shooting_star;

pub use colour::{ColourAnimator, ColourConfig};
pub use registry::{AnimatorRegistry, Crossfade, FramePlan, DEFAULT_CROSSFADE_TIME_SECS};
pub use shape_wave::{ShapeWaveAnimator, ShapeWaveConfig};
pub use shooting_star::{ShootingStarAnimator, ShootingStarConfig};

pub const ANIM_COLOUR: &str = "colour";
pub const ANIM_SHAPE_WAVES: &str = "shape-waves";
pub const ANIM_SHOOTING_STAR: &str = "shooting-star";

/// A module that paints one frame of voxels at a time.
///
/// The surface handed to [`Animator::render`] is only valid for the returned
/// future; animators must not keep it around. The engine clears the surface
/// before every call.
pub trait Animator: Send {
    /// Advances the animation by `dt` seconds and draws the result.
    fn render<'a>(
        &'a mut self,
        dt: f32,
        surface: &'a mut dyn Framebuffer,
    ) -> BoxFuture<'a, Result<()>>;

    /// Applies a JSON configuration. Missing fields take their defaults.
    fn set_config(&mut self, config: &Value) -> Result<()>;

    /// Resets internal state once the animator is no longer shown.
    fn stop(&mut self);

    /// Whether the animator needs a software framebuffer rather than a
    /// kernel-backed one.
    fn renders_to_cpu_only(&self) -> bool {
        false
    }
}
