//! `cloudstrike.yaml` viewer configuration.
//!
//! Every tunable has a default, so an empty file (or no file) yields the
//! stock game feel.

use std::num::NonZeroUsize;
use std::path::Path;

use serde::Deserialize;

use crate::pointcloud::{DEFAULT_DECIMATION_STRIDE, DEFAULT_POINT_SIZE};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub catalog_url: String,
    pub assets: AssetConfig,
    pub camera: CameraConfig,
    pub enemies: EnemyConfig,
    pub score: ScoreConfig,
    /// JSONL file receiving every flushed game event.
    pub event_log: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            catalog_url: "http://localhost:8000".to_string(),
            assets: AssetConfig::default(),
            camera: CameraConfig::default(),
            enemies: EnemyConfig::default(),
            score: ScoreConfig::default(),
            event_log: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub decimation_stride: usize,
    pub point_size: f32,
    /// Path (or bare name on PATH) of the external Draco decoder tool.
    pub draco_decoder: String,
    pub draco_version: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            decimation_stride: DEFAULT_DECIMATION_STRIDE,
            point_size: DEFAULT_POINT_SIZE,
            draco_decoder: "draco_decoder".to_string(),
            draco_version: "1.5.7".to_string(),
        }
    }
}

impl AssetConfig {
    pub fn stride(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.decimation_stride)
            .ok_or_else(|| ConfigError::Invalid("assets.decimation_stride must be at least 1".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Units per frame.
    pub move_speed: f32,
    /// Radius of the play area around the origin.
    pub max_distance: f32,
    /// Radians per pixel of mouse movement.
    pub look_sensitivity: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 0.05,
            max_distance: 5.0,
            look_sensitivity: 0.002,
            fov_degrees: 75.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnemyConfig {
    pub spawn_interval_ms: f64,
    pub spawn_radius: f32,
    pub spawn_height_min: f32,
    pub spawn_height_max: f32,
    /// Units per frame.
    pub speed: f32,
    /// Radians per frame around the enemy's forward axis.
    pub spin: f32,
    pub breach_distance: f32,
    /// Half edge length of the enemy hit box.
    pub half_extent: f32,
    pub seed: u32,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            spawn_interval_ms: 1200.0,
            spawn_radius: 2.0,
            spawn_height_min: -0.5,
            spawn_height_max: 0.5,
            speed: 0.015,
            spin: 0.1,
            breach_distance: 0.1,
            half_extent: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub hit_reward: u32,
    pub breach_penalty: u32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            hit_reward: 10,
            breach_penalty: 5,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error reading cloudstrike.yaml: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse cloudstrike.yaml: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ViewerConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ViewerConfig = serde_yaml::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.assets.stride()?;
        if self.camera.max_distance <= 0.0 {
            return Err(ConfigError::Invalid("camera.max_distance must be positive".into()));
        }
        if self.enemies.spawn_height_min > self.enemies.spawn_height_max {
            return Err(ConfigError::Invalid(
                "enemies.spawn_height_min must not exceed spawn_height_max".into(),
            ));
        }
        if self.enemies.breach_distance < 0.0 {
            return Err(ConfigError::Invalid("enemies.breach_distance must not be negative".into()));
        }
        Ok(())
    }
}

/// Load and parse a `cloudstrike.yaml` file.
pub fn load_config(path: &Path) -> Result<ViewerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    ViewerConfig::from_yaml_str(&contents)
}
