use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::infer::decode::DEFAULT_ANCHOR_COUNT;
use crate::infer::mapper::InputCrop;
use crate::infer::suppression::SuppressionMode;

pub const CONFIG_PATH_ENV: &str = "FACEBOX_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuppressionConfig {
    pub anchor_count: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub mode: SuppressionMode,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            anchor_count: DEFAULT_ANCHOR_COUNT,
            confidence_threshold: 0.75,
            iou_threshold: 0.3,
            mode: SuppressionMode::TopBox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub suppression: SuppressionConfig,
    pub input_crop: InputCrop,
    pub clip_to_display: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            suppression: SuppressionConfig::default(),
            input_crop: InputCrop::Full,
            clip_to_display: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.suppression;
        if s.anchor_count == 0 {
            return Err(Error::Config("anchorCount must be positive".into()));
        }
        if !(0.0..1.0).contains(&s.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidenceThreshold {} outside [0, 1)",
                s.confidence_threshold
            )));
        }
        if !(s.iou_threshold > 0.0 && s.iou_threshold <= 1.0) {
            return Err(Error::Config(format!("iouThreshold {} outside (0, 1]", s.iou_threshold)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub addr: String,
    pub models_dir: PathBuf,
    pub max_fps: u32,
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            models_dir: PathBuf::from("models"),
            max_fps: 15,
            max_message_bytes: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Reads `FACEBOX_CONFIG` (if set) and the `FACEBOX_*` overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::from_sources(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// File first, then environment overrides, then validation.
    pub fn from_sources(file: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&data).map_err(|source| Error::Parse { path: path.to_path_buf(), source })
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = env("FACEBOX_ADDR") {
            self.server.addr = addr;
        }
        if let Some(dir) = env("FACEBOX_MODELS_DIR") {
            self.server.models_dir = PathBuf::from(dir);
        }
        if let Some(v) = env("FACEBOX_MAX_FPS") {
            self.server.max_fps = parse_env("FACEBOX_MAX_FPS", &v)?;
        }
        if let Some(v) = env("FACEBOX_CONFIDENCE") {
            self.pipeline.suppression.confidence_threshold = parse_env("FACEBOX_CONFIDENCE", &v)?;
        }
        if let Some(v) = env("FACEBOX_IOU") {
            self.pipeline.suppression.iou_threshold = parse_env("FACEBOX_IOU", &v)?;
        }
        if let Some(v) = env("FACEBOX_MODE") {
            self.pipeline.suppression.mode = v.parse().map_err(Error::Config)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.server.max_fps == 0 {
            return Err(Error::Config("maxFps must be positive".into()));
        }
        if self.server.max_message_bytes == 0 {
            return Err(Error::Config("maxMessageBytes must be positive".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err| Error::Config(format!("{key}={value:?}: {err}")))
}
