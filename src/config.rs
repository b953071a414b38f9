use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "footfall.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_history() -> i32 {
    500
}

fn default_var_threshold() -> f64 {
    16.0
}

fn default_detect_shadows() -> bool {
    true
}

fn default_warmup_frames() -> u64 {
    50
}

/// Background model tuning. The model needs `warmup_frames` or so before its
/// masks are trustworthy; early masks are noisy and that cost is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default = "default_history")]
    pub history: i32,
    #[serde(default = "default_var_threshold")]
    pub var_threshold: f64,
    #[serde(default = "default_detect_shadows")]
    pub detect_shadows: bool,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            history: default_history(),
            var_threshold: default_var_threshold(),
            detect_shadows: default_detect_shadows(),
            warmup_frames: default_warmup_frames(),
        }
    }
}

fn default_kernel_size() -> i32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefinerConfig {
    #[serde(default = "default_kernel_size")]
    pub kernel_size: i32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            kernel_size: default_kernel_size(),
        }
    }
}

/// Which raster contours are traced from.
///
/// `Dilated` traces the refined mask as-is, so shadow pixels (the segmenter's
/// intermediate value) still count as object area. `Thresholded` binarises at
/// `shadow_threshold` first, dropping shadows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContourSource {
    #[default]
    Dilated,
    Thresholded,
}

fn default_min_area() -> f64 {
    400.0
}

fn default_max_area() -> f64 {
    50_000.0
}

fn default_shadow_threshold() -> f64 {
    220.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    #[serde(default = "default_max_area")]
    pub max_area: f64,
    #[serde(default)]
    pub contour_source: ContourSource,
    #[serde(default = "default_shadow_threshold")]
    pub shadow_threshold: f64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            max_area: default_max_area(),
            contour_source: ContourSource::default(),
            shadow_threshold: default_shadow_threshold(),
        }
    }
}

fn default_distance_threshold() -> f64 {
    160.0
}

fn default_max_frames_to_skip() -> u32 {
    30
}

fn default_max_trace_length() -> usize {
    5
}

fn default_max_tracks() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    #[serde(default = "default_max_frames_to_skip")]
    pub max_frames_to_skip: u32,
    #[serde(default = "default_max_trace_length")]
    pub max_trace_length: usize,
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            max_frames_to_skip: default_max_frames_to_skip(),
            max_trace_length: default_max_trace_length(),
            max_tracks: default_max_tracks(),
        }
    }
}

fn default_output_dir() -> String {
    "Output_Video".to_string()
}

fn default_output_fps() -> f64 {
    20.0
}

fn default_fourcc() -> String {
    "MJPG".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_output_fps")]
    pub fps: f64,
    #[serde(default = "default_fourcc")]
    pub fourcc: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            fps: default_output_fps(),
            fourcc: default_fourcc(),
        }
    }
}

fn default_key_wait_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_key_wait_ms")]
    pub key_wait_ms: u64,
    #[serde(default)]
    pub gate_to_roi: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            key_wait_ms: default_key_wait_ms(),
            gate_to_roi: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub refiner: RefinerConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    /// Loads `footfall.toml` from the working directory, or defaults if it
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        if !Path::new(DEFAULT_CONFIG_PATH).exists() {
            return Ok(Self::default());
        }
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let blobs = &self.blobs;
        if blobs.min_area < 0.0 || blobs.min_area >= blobs.max_area {
            return Err(ConfigError::Invalid(format!(
                "blobs.min_area ({}) must be non-negative and below blobs.max_area ({})",
                blobs.min_area, blobs.max_area
            )));
        }

        let kernel = self.refiner.kernel_size;
        if kernel < 1 || kernel % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "refiner.kernel_size must be odd and positive, got {kernel}"
            )));
        }

        let fourcc = &self.output.fourcc;
        if fourcc.len() != 4 || !fourcc.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "output.fourcc must be four ASCII characters, got {fourcc:?}"
            )));
        }

        if self.output.fps <= 0.0 {
            return Err(ConfigError::Invalid("output.fps must be positive".into()));
        }

        if self.tracker.max_trace_length < 2 {
            return Err(ConfigError::Invalid(
                "tracker.max_trace_length must be at least 2".into(),
            ));
        }

        Ok(())
    }
}
