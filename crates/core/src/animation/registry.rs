use std::{collections::HashMap, fmt};

use serde_json::Value;

use super::{
    Animator, ColourAnimator, ShapeWaveAnimator, ShootingStarAnimator, ANIM_COLOUR,
    ANIM_SHAPE_WAVES, ANIM_SHOOTING_STAR,
};

pub const DEFAULT_CROSSFADE_TIME_SECS: f32 = 1.0;

/// An in-flight transition away from `previous`.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossfade {
    pub previous: String,
    pub elapsed_secs: f32,
    pub total_secs: f32,
}

impl Crossfade {
    /// Weight of the incoming animator, in `[0, 1]`.
    pub fn percent(&self) -> f32 {
        if self.total_secs <= 0.0 {
            return 1.0;
        }
        (self.elapsed_secs / self.total_secs).clamp(0.0, 1.0)
    }
}

/// What has to be rendered on the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePlan {
    /// Nothing registered yet.
    Idle,
    Steady {
        current: String,
    },
    Crossfade {
        previous: String,
        current: String,
        percent: f32,
    },
}

/// Persistent animator instances keyed by type tag, plus the crossfade state
/// machine deciding which of them render each tick.
pub struct AnimatorRegistry {
    animators: HashMap<String, Box<dyn Animator>>,
    current: Option<String>,
    crossfade: Option<Crossfade>,
    crossfade_secs: f32,
}

impl AnimatorRegistry {
    pub fn new() -> Self {
        Self {
            animators: HashMap::new(),
            current: None,
            crossfade: None,
            crossfade_secs: DEFAULT_CROSSFADE_TIME_SECS,
        }
    }

    /// Registry holding every built-in animator, showing the colour fade.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ANIM_COLOUR, ColourAnimator::default());
        registry.register(ANIM_SHAPE_WAVES, ShapeWaveAnimator::default());
        registry.register(ANIM_SHOOTING_STAR, ShootingStarAnimator::default());
        registry
    }

    /// Adds an animator under `tag`. The first registration becomes current.
    /// Re-registering a tag stops and replaces the old instance.
    pub fn register(&mut self, tag: impl Into<String>, animator: impl Animator + 'static) {
        let tag = tag.into();
        if let Some(mut replaced) = self.animators.insert(tag.clone(), Box::new(animator)) {
            replaced.stop();
        }
        if self.current.is_none() {
            self.current = Some(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.animators.contains_key(tag)
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.animators.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn previous(&self) -> Option<&str> {
        self.crossfade.as_ref().map(|c| c.previous.as_str())
    }

    pub fn crossfade(&self) -> Option<&Crossfade> {
        self.crossfade.as_ref()
    }

    pub fn is_transitioning(&self) -> bool {
        self.crossfade.is_some()
    }

    pub fn crossfade_secs(&self) -> f32 {
        self.crossfade_secs
    }

    /// Sets the duration of future transitions. A transition already running
    /// keeps its own duration.
    pub fn set_crossfade_time(&mut self, secs: f32) {
        self.crossfade_secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut dyn Animator> {
        match self.animators.get_mut(tag) {
            Some(animator) => {
                let animator: &mut dyn Animator = animator.as_mut();
                Some(animator)
            }
            None => None,
        }
    }

    pub fn renders_to_cpu_only(&self, tag: &str) -> bool {
        self.animators
            .get(tag)
            .map(|animator| animator.renders_to_cpu_only())
            .unwrap_or(false)
    }

    /// Makes `tag` the current animator, crossfading from the old one.
    ///
    /// Returns `false` without touching any state when `tag` is unknown.
    /// Switching during a transition stops the animator that was fading out
    /// and restarts the fade from the animator that was current. A supplied
    /// config is forwarded even when `tag` is already current.
    pub fn set_animator(&mut self, tag: &str, config: Option<&Value>) -> bool {
        if !self.contains(tag) {
            tracing::debug!(animator = tag, "ignoring unknown animator");
            return false;
        }

        if self.current.as_deref() != Some(tag) {
            if let Some(outgoing) = self.current.replace(tag.to_string()) {
                if let Some(stale) = self.crossfade.take() {
                    if stale.previous != tag {
                        self.stop(&stale.previous);
                    }
                }
                tracing::debug!(
                    from = %outgoing,
                    to = tag,
                    secs = self.crossfade_secs,
                    "starting crossfade"
                );
                self.crossfade = Some(Crossfade {
                    previous: outgoing,
                    elapsed_secs: 0.0,
                    total_secs: self.crossfade_secs,
                });
            }
        }

        if let Some(config) = config {
            if let Some(animator) = self.get_mut(tag) {
                if let Err(err) = animator.set_config(config) {
                    tracing::warn!(animator = tag, %err, "rejected animator config");
                }
            }
        }

        true
    }

    pub fn frame_plan(&self) -> FramePlan {
        match (&self.current, &self.crossfade) {
            (None, _) => FramePlan::Idle,
            (Some(current), None) => FramePlan::Steady {
                current: current.clone(),
            },
            (Some(current), Some(crossfade)) => FramePlan::Crossfade {
                previous: crossfade.previous.clone(),
                current: current.clone(),
                percent: crossfade.percent(),
            },
        }
    }

    /// Moves an active transition forward by `dt` seconds, finishing it once
    /// its duration has elapsed.
    pub fn advance(&mut self, dt: f32) {
        let finished = match self.crossfade.as_mut() {
            Some(crossfade) => {
                crossfade.elapsed_secs += dt.max(0.0);
                crossfade.elapsed_secs >= crossfade.total_secs
            }
            None => false,
        };

        if finished {
            if let Some(done) = self.crossfade.take() {
                tracing::debug!(previous = %done.previous, "crossfade finished");
                self.stop(&done.previous);
            }
        }
    }

    /// Drops any transition and resets both animators involved.
    pub fn abandon_transition(&mut self) {
        if let Some(stale) = self.crossfade.take() {
            tracing::debug!(previous = %stale.previous, "abandoning crossfade");
            self.stop(&stale.previous);
            if let Some(current) = self.current.clone() {
                self.stop(&current);
            }
        }
    }

    fn stop(&mut self, tag: &str) {
        if let Some(animator) = self.animators.get_mut(tag) {
            animator.stop();
        }
    }
}

impl Default for AnimatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnimatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatorRegistry")
            .field("animators", &self.tags())
            .field("current", &self.current)
            .field("crossfade", &self.crossfade)
            .field("crossfade_secs", &self.crossfade_secs)
            .finish()
    }
}
