pub mod capture;
pub mod display;
pub mod inference;
pub mod session;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::{ChannelOrder, InputGeometry};

pub use capture::Frame;
pub use session::{Session, SessionStats, StopSignal};

/// Environment variable prefix for configuration overrides, e.g.
/// `POTHOLE__SCHEDULER__SKIP_INTERVAL=3`.
pub const ENV_PREFIX: &str = "POTHOLE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub model: ModelConfig,
    pub scheduler: SchedulerConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// `http(s)://` MJPEG endpoint, a `/dev/video*` path, or `auto`.
    pub endpoint: String,
    /// Bytes requested from the transport per read.
    pub chunk_size: usize,
    /// Upper bound on bytes held while waiting for an end-of-image marker.
    pub max_buffer_bytes: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Used when the model does not declare a concrete spatial input shape.
    pub fallback_geometry: InputGeometry,
    /// Channel order fed to the model; frames are decoded as RGB.
    pub channel_order: ChannelOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the classifier on every Nth decoded frame.
    pub skip_interval: u32,
    /// Confidences strictly above this are labelled as potholes.
    pub confidence_threshold: f32,
    pub on_classifier_error: ClassifierFallback,
}

/// What the session shows after a failed classifier call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierFallback {
    /// Keep displaying the last good result.
    #[default]
    RetainLast,
    /// Keep the last result but flag it as stale on screen.
    MarkStale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://192.168.4.1:81/stream".into(),
            chunk_size: 8192,
            max_buffer_bytes: 4 * 1024 * 1024,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pothole_model.onnx"),
            fallback_geometry: InputGeometry::default(),
            channel_order: ChannelOrder::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            skip_interval: 5,
            confidence_threshold: 0.8,
            on_classifier_error: ClassifierFallback::RetainLast,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "Pothole Detection".into(),
            width: 800,
            height: 600,
        }
    }
}

impl Config {
    /// Layer an optional TOML file and `POTHOLE__*` environment variables over
    /// the defaults, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.scheduler.skip_interval == 0 {
            return invalid("scheduler.skip_interval must be at least 1".into());
        }
        let threshold = self.scheduler.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid(format!(
                "scheduler.confidence_threshold must be within [0, 1], got {threshold}"
            ));
        }
        if self.stream.chunk_size == 0 {
            return invalid("stream.chunk_size must be positive".into());
        }
        if self.stream.max_buffer_bytes < self.stream.chunk_size {
            return invalid(format!(
                "stream.max_buffer_bytes ({}) must be at least stream.chunk_size ({})",
                self.stream.max_buffer_bytes, self.stream.chunk_size
            ));
        }
        let geometry = self.model.fallback_geometry;
        if geometry.height == 0 || geometry.width == 0 {
            return invalid(format!(
                "model.fallback_geometry must be non-empty, got {}x{}",
                geometry.height, geometry.width
            ));
        }
        if self.stream.endpoint.trim().is_empty() {
            return invalid("stream.endpoint must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.scheduler.skip_interval, 5);
        assert_eq!(config.scheduler.confidence_threshold, 0.8);
        assert_eq!(config.model.fallback_geometry, InputGeometry::new(128, 128));
        assert_eq!(config.stream.chunk_size, 8192);
        assert_eq!(config.model.channel_order, ChannelOrder::Bgr);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_skip_interval() {
        let mut config = Config::default();
        config.scheduler.skip_interval = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let mut config = Config::default();
        config.scheduler.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.scheduler.confidence_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_buffer_smaller_than_chunk() {
        let mut config = Config::default();
        config.stream.max_buffer_bytes = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.display.title, "Pothole Detection");
    }

    #[test]
    fn parses_toml_overrides() {
        let toml = r#"
            [scheduler]
            skip_interval = 3
            on_classifier_error = "mark-stale"

            [model]
            fallback_geometry = { height = 96, width = 160 }
            channel_order = "rgb"
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.scheduler.skip_interval, 3);
        assert_eq!(config.scheduler.confidence_threshold, 0.8);
        assert_eq!(
            config.scheduler.on_classifier_error,
            ClassifierFallback::MarkStale
        );
        assert_eq!(config.model.fallback_geometry, InputGeometry::new(96, 160));
        assert_eq!(config.model.channel_order, ChannelOrder::Rgb);
    }
}
