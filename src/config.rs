//! TOML configuration.
//!
//! Every section is optional; anything left out falls back to the defaults below.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{
    error::OverlayError,
    pipeline::metadata::DEFAULT_METADATA_CAPACITY,
    types::{DetectorKind, Facing, Rotation},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub pipeline: PipelineConfig,
    pub camera: CameraConfig,
    pub models: ModelsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame metadata entries kept before the oldest is dropped.
    pub metadata_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub back_index: u32,
    pub front_index: u32,
    pub initial_facing: Facing,
    /// Sensor-to-display rotation reported for frames from each camera.
    pub back_rotation_degrees: i32,
    pub front_rotation_degrees: i32,
}

impl CameraConfig {
    pub fn index(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Back => self.back_index,
            Facing::Front => self.front_index,
        }
    }

    pub fn rotation_degrees(&self, facing: Facing) -> i32 {
        match facing {
            Facing::Back => self.back_rotation_degrees,
            Facing::Front => self.front_rotation_degrees,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "ModelConfig::face")]
    pub face: ModelConfig,
    #[serde(default = "ModelConfig::hand")]
    pub hand: ModelConfig,
    #[serde(default = "ModelConfig::pose")]
    pub pose: ModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            face: ModelConfig::face(),
            hand: ModelConfig::hand(),
            pose: ModelConfig::pose(),
        }
    }
}

impl ModelsConfig {
    pub fn get(&self, detector: DetectorKind) -> &ModelConfig {
        match detector {
            DetectorKind::Face => &self.face,
            DetectorKind::Hand => &self.hand,
            DetectorKind::Pose => &self.pose,
        }
    }
}

/// One landmark model. Output is read as `max_results` consecutive lists of
/// `landmark_count` landmarks, `values_per_landmark` floats each, with x and y first
/// and expressed in input pixels.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub url: Option<String>,
    pub input_size: u32,
    pub landmark_count: usize,
    #[serde(default = "default_values_per_landmark")]
    pub values_per_landmark: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Results whose presence score (second model output) falls below this are dropped.
    #[serde(default = "default_min_presence")]
    pub min_presence: f32,
}

fn default_values_per_landmark() -> usize {
    3
}

fn default_max_results() -> usize {
    1
}

fn default_min_presence() -> f32 {
    0.5
}

impl ModelConfig {
    fn face() -> Self {
        Self {
            path: PathBuf::from("models").join("face_landmark.onnx"),
            url: None,
            input_size: 192,
            landmark_count: 468,
            values_per_landmark: 3,
            max_results: 1,
            min_presence: default_min_presence(),
        }
    }

    fn hand() -> Self {
        Self {
            path: PathBuf::from("models").join("hand_landmark.onnx"),
            url: None,
            input_size: 224,
            landmark_count: 21,
            values_per_landmark: 3,
            max_results: 2,
            min_presence: default_min_presence(),
        }
    }

    fn pose() -> Self {
        Self {
            path: PathBuf::from("models").join("pose_landmark.onnx"),
            url: None,
            input_size: 256,
            landmark_count: 33,
            values_per_landmark: 5,
            max_results: 1,
            min_presence: default_min_presence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub snapshot_path: PathBuf,
    pub snapshot_interval_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("overlay.png"),
            snapshot_interval_ms: 500,
        }
    }
}

impl OutputConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

impl OverlayConfig {
    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let text = fs::read_to_string(path).map_err(|source| OverlayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, OverlayError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.pipeline.metadata_capacity == 0 {
            return Err(OverlayError::InvalidConfig(
                "pipeline.metadata_capacity must be greater than 0".to_string(),
            ));
        }

        for (name, degrees) in [
            ("back", self.camera.back_rotation_degrees),
            ("front", self.camera.front_rotation_degrees),
        ] {
            if Rotation::from_degrees(degrees).is_none() {
                return Err(OverlayError::InvalidConfig(format!(
                    "camera.{name}_rotation_degrees must be 0, 90, 180 or 270 (got {degrees})"
                )));
            }
        }

        for detector in DetectorKind::ALL {
            let model = self.models.get(detector);
            if model.input_size == 0 || model.landmark_count == 0 || model.max_results == 0 {
                return Err(OverlayError::InvalidConfig(format!(
                    "models.{detector}: input_size, landmark_count and max_results must be positive"
                )));
            }
            if model.values_per_landmark < 2 {
                return Err(OverlayError::InvalidConfig(format!(
                    "models.{detector}.values_per_landmark must be at least 2"
                )));
            }
        }

        Ok(())
    }
}
