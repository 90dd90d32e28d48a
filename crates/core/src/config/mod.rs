use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    animation::{ANIM_COLOUR, DEFAULT_CROSSFADE_TIME_SECS},
    engine::DEFAULT_BRIGHTNESS_MULTIPLIER,
    Result, VoxelError,
};

pub const DEFAULT_GRID_SIZE: usize = 8;
pub const DEFAULT_POLLING_FREQUENCY_HZ: f64 = 60.0;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.display.validate()?;
        self.scheduler.validate()
    }
}

/// Configuration of the display itself and the animators shown on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Voxels along each edge of the cube.
    pub grid_size: usize,
    pub brightness: f32,
    pub crossfade_secs: f32,
    pub initial_animator: String,
    /// Per-animator JSON configs, keyed by animator tag.
    pub animators: HashMap<String, Value>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            brightness: DEFAULT_BRIGHTNESS_MULTIPLIER,
            crossfade_secs: DEFAULT_CROSSFADE_TIME_SECS,
            initial_animator: ANIM_COLOUR.to_string(),
            animators: HashMap::new(),
        }
    }
}

impl DisplayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(VoxelError::InvalidConfig(
                "grid_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Frame loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub target_fps: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_POLLING_FREQUENCY_HZ,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return Err(VoxelError::InvalidConfig(format!(
                "target_fps must be a positive number, got {}",
                self.target_fps
            )));
        }
        self.target_interval().map(|_| ())
    }

    /// Time budget for a single frame. Fails when the rate is so low that
    /// the interval does not fit in a [`Duration`].
    pub fn target_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(1.0 / self.target_fps).map_err(|err| {
            VoxelError::InvalidConfig(format!(
                "target_fps {} gives an unusable frame interval: {err}",
                self.target_fps
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_display_hardware() {
        let config = AppConfig::default();
        assert_eq!(config.display.grid_size, 8);
        assert_eq!(config.display.initial_animator, "colour");
        assert_eq!(config.display.crossfade_secs, 1.0);
        assert_eq!(config.scheduler.target_fps, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_value(json!({
            "display": {"grid_size": 16, "animators": {"colour": {"repeat": true}}}
        }))
        .unwrap();
        assert_eq!(config.display.grid_size, 16);
        assert_eq!(config.display.brightness, 1.0);
        assert_eq!(config.display.animators["colour"], json!({"repeat": true}));
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = AppConfig::default();
        config.display.grid_size = 0;
        assert!(matches!(config.validate(), Err(VoxelError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.scheduler.target_fps = 0.0;
        assert!(config.validate().is_err());
        config.scheduler.target_fps = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_rates_too_slow_for_a_duration() {
        let scheduler = SchedulerConfig { target_fps: 1e-30 };
        assert!(matches!(scheduler.validate(), Err(VoxelError::InvalidConfig(_))));
        assert!(scheduler.target_interval().is_err());
    }

    #[test]
    fn interval_follows_fps() {
        let scheduler = SchedulerConfig { target_fps: 50.0 };
        assert_eq!(scheduler.target_interval().unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("voxel-config-{}.json", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"scheduler": {{"target_fps": 30}}}}"#).unwrap();
        drop(file);

        let config = AppConfig::from_json_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.scheduler.target_fps, 30.0);
        assert!(AppConfig::from_json_file(&path).is_err());
    }
}
