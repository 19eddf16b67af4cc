use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    pipeline::PublisherConfig,
    pose::{AngleMode, NO_POSE},
};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub publisher: PublisherSection,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Flip frames horizontally so the stream behaves like a mirror.
    #[serde(default = "default_true")]
    pub mirror: bool,
    /// Serve this image instead of opening a device.
    #[serde(default)]
    pub still_image: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: AngleMode,
    /// Overrides the tolerance implied by `mode`.
    #[serde(default)]
    pub tolerance_degrees: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_initial_pose")]
    pub initial_pose: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublisherSection {
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_boundary")]
    pub boundary: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub image: Option<PathBuf>,
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_true() -> bool { true }
fn default_model_path() -> PathBuf { PathBuf::from("models/pose_landmark_full.onnx") }
fn default_min_pose_score() -> f32 { 0.5 }
fn default_intra_threads() -> usize { 2 }
fn default_catalog_path() -> PathBuf { PathBuf::from("data/pose.json") }
fn default_initial_pose() -> String { NO_POSE.to_string() }
fn default_max_fps() -> u32 { 30 }
fn default_jpeg_quality() -> u8 { 80 }
fn default_boundary() -> String { "frame".to_string() }
fn default_watch_interval_ms() -> u64 { 500 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            mirror: default_true(),
            still_image: None,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            min_pose_score: default_min_pose_score(),
            intra_threads: default_intra_threads(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            initial_pose: default_initial_pose(),
        }
    }
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            max_fps: default_max_fps(),
            jpeg_quality: default_jpeg_quality(),
            boundary: default_boundary(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_watch_interval_ms(),
        }
    }
}

impl PublisherSection {
    pub fn to_publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            max_fps: self.max_fps,
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
            boundary: self.boundary.clone(),
        }
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl ClassifierConfig {
    pub fn tolerance(&self) -> f32 {
        self.tolerance_degrees
            .unwrap_or_else(|| self.mode.default_tolerance())
    }
}

impl Config {
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|err| Error::ParseConfig(err, origin.to_path_buf()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|err| Error::ReadFile(err, path.to_path_buf()))?;
        Self::from_toml_str(&content, path)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
