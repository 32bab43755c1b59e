use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use turnstile_core::DistanceMetric;
use turnstile_sinks::RemoteConfig;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "TURNSTILE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Kiosk configuration.
///
/// Layered as built-in defaults, then an optional TOML file, then
/// `TURNSTILE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Logical capture device index (`/dev/video<index>`).
    pub camera_index: usize,
    /// Requested capture width; the driver may pick another.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Root of the reference dataset (one subdirectory per person).
    pub dataset_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detector model file stem inside `model_dir`.
    pub detector_model: String,
    /// Recognition model file stem inside `model_dir`.
    pub recognition_model: String,
    pub distance_metric: DistanceMetric,
    /// Largest distance still accepted as a match.
    pub match_distance_threshold: f32,
    /// Run identity matching on every N-th frame.
    pub recognition_every_n_frames: u64,
    /// Pixels added on each side of the face box before matching.
    pub crop_padding: u32,
    /// Detections smaller than this on either side are ignored.
    pub min_face_size: u32,
    pub local_log_file: PathBuf,
    pub supabase_url: String,
    pub supabase_key: String,
    pub logs_table: String,
    pub members_table: String,
    pub remote_timeout_secs: u64,
    /// Annotated frames are written here when set.
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_every_n_frames: u64,
    /// Font for the status overlay; common system fonts are tried when unset.
    pub overlay_font: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frame_width: 960,
            frame_height: 540,
            dataset_dir: PathBuf::from("dataset"),
            model_dir: default_model_dir(),
            detector_model: "det_10g".to_string(),
            recognition_model: "w600k_r50".to_string(),
            distance_metric: DistanceMetric::Cosine,
            match_distance_threshold: 0.35,
            recognition_every_n_frames: 10,
            crop_padding: 15,
            min_face_size: 70,
            local_log_file: PathBuf::from("logs/entry_logs.csv"),
            supabase_url: String::new(),
            supabase_key: String::new(),
            logs_table: "entry_logs".to_string(),
            members_table: "premium_members".to_string(),
            remote_timeout_secs: 5,
            snapshot_path: None,
            snapshot_every_n_frames: 15,
            overlay_font: None,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `$TURNSTILE_CONFIG`), then apply
    /// `TURNSTILE_*` overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let file = path.map(Path::to_path_buf).or(from_env);

        let mut config = match file {
            Some(file) => {
                tracing::info!(path = %file.display(), "loading config file");
                Self::from_file(&file)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `TURNSTILE_*` variables supplied by `lookup`.
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env = Env(&lookup);
        env.parse("TURNSTILE_CAMERA_INDEX", &mut self.camera_index);
        env.parse("TURNSTILE_FRAME_WIDTH", &mut self.frame_width);
        env.parse("TURNSTILE_FRAME_HEIGHT", &mut self.frame_height);
        env.path("TURNSTILE_DATASET_DIR", &mut self.dataset_dir);
        env.path("TURNSTILE_MODEL_DIR", &mut self.model_dir);
        env.string("TURNSTILE_DETECTOR_MODEL", &mut self.detector_model);
        env.string("TURNSTILE_RECOGNITION_MODEL", &mut self.recognition_model);
        env.parse("TURNSTILE_DISTANCE_METRIC", &mut self.distance_metric);
        env.parse("TURNSTILE_MATCH_THRESHOLD", &mut self.match_distance_threshold);
        env.parse("TURNSTILE_RECOGNITION_EVERY_N", &mut self.recognition_every_n_frames);
        env.parse("TURNSTILE_CROP_PADDING", &mut self.crop_padding);
        env.parse("TURNSTILE_MIN_FACE_SIZE", &mut self.min_face_size);
        env.path("TURNSTILE_LOG_FILE", &mut self.local_log_file);
        env.string("TURNSTILE_SUPABASE_URL", &mut self.supabase_url);
        env.string("TURNSTILE_SUPABASE_KEY", &mut self.supabase_key);
        env.string("TURNSTILE_LOGS_TABLE", &mut self.logs_table);
        env.string("TURNSTILE_MEMBERS_TABLE", &mut self.members_table);
        env.parse("TURNSTILE_REMOTE_TIMEOUT_SECS", &mut self.remote_timeout_secs);
        env.parse("TURNSTILE_SNAPSHOT_EVERY_N", &mut self.snapshot_every_n_frames);
        if let Some(v) = lookup("TURNSTILE_SNAPSHOT_PATH") {
            self.snapshot_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = lookup("TURNSTILE_OVERLAY_FONT") {
            self.overlay_font = (!v.is_empty()).then(|| PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recognition_every_n_frames == 0 {
            return Err(ConfigError::Invalid(
                "recognition_every_n_frames must be at least 1".into(),
            ));
        }
        if !self.match_distance_threshold.is_finite() || self.match_distance_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "match_distance_threshold must be a positive number, got {}",
                self.match_distance_threshold
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.snapshot_every_n_frames == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_every_n_frames must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", self.detector_model))
    }

    /// Path to the ArcFace recognition model.
    pub fn recognition_model_path(&self) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", self.recognition_model))
    }

    pub fn remote(&self) -> RemoteConfig {
        RemoteConfig {
            url: self.supabase_url.clone(),
            key: self.supabase_key.clone(),
            logs_table: self.logs_table.clone(),
            members_table: self.members_table.clone(),
            timeout: Duration::from_secs(self.remote_timeout_secs),
        }
    }
}

/// `$XDG_DATA_HOME/turnstile/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("turnstile/models")
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn parse<T: FromStr>(&self, key: &str, slot: &mut T)
    where
        T::Err: std::fmt::Display,
    {
        let Some(raw) = (self.0)(key) else {
            return;
        };
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(e) => tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment override"),
        }
    }

    fn string(&self, key: &str, slot: &mut String) {
        if let Some(v) = (self.0)(key) {
            *slot = v;
        }
    }

    fn path(&self, key: &str, slot: &mut PathBuf) {
        if let Some(v) = (self.0)(key).filter(|v| !v.is_empty()) {
            *slot = PathBuf::from(v);
        }
    }
}
