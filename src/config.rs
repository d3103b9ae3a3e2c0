use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::posture::{
    EngineSettings, DEFAULT_ALERT_SECONDS, DEFAULT_SLOUCH_RATIO, DEFAULT_SMOOTHING_FRAMES,
};
use crate::Error;

pub const DEFAULT_CONFIG_PATH: &str = "posture-sentinel.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera_id: i32,
    pub model_path: String,
    /// Smoothed neck ratio below this counts as slouching.
    pub slouch_ratio: f64,
    /// Seconds of unbroken slouching before the alert fires.
    pub alert_seconds: f64,
    /// Frames averaged into the smoothed ratio.
    pub smoothing_frames: usize,
    /// Detector presence score below which a frame has no body.
    pub presence_threshold: f32,
    pub tone_frequency_hz: f32,
    pub tone_duration_ms: u64,
    pub window_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_id: 0,
            model_path: "models/pose_landmark.onnx".to_string(),
            slouch_ratio: DEFAULT_SLOUCH_RATIO,
            alert_seconds: DEFAULT_ALERT_SECONDS,
            smoothing_frames: DEFAULT_SMOOTHING_FRAMES,
            presence_threshold: 0.5,
            tone_frequency_hz: 1000.0,
            tone_duration_ms: 500,
            window_title: "SlouchStopper".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.slouch_ratio.is_finite() || self.slouch_ratio <= 0.0 {
            return Err(Error::Config(format!(
                "slouch_ratio must be a positive number, got {}",
                self.slouch_ratio
            )));
        }
        self.alert_after()?;
        if self.smoothing_frames == 0 {
            return Err(Error::Config("smoothing_frames must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.presence_threshold) {
            return Err(Error::Config(format!(
                "presence_threshold must be in [0, 1], got {}",
                self.presence_threshold
            )));
        }
        if !self.tone_frequency_hz.is_finite() || self.tone_frequency_hz <= 0.0 {
            return Err(Error::Config(format!(
                "tone_frequency_hz must be positive, got {}",
                self.tone_frequency_hz
            )));
        }
        if self.tone_duration_ms == 0 {
            return Err(Error::Config("tone_duration_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `alert_seconds` as a duration; negative, non-finite or overflowing values are rejected.
    pub fn alert_after(&self) -> Result<Duration, Error> {
        Duration::try_from_secs_f64(self.alert_seconds).map_err(|e| {
            Error::Config(format!(
                "alert_seconds must be a non-negative duration, got {}: {}",
                self.alert_seconds, e
            ))
        })
    }

    pub fn engine_settings(&self) -> Result<EngineSettings, Error> {
        Ok(EngineSettings {
            slouch_ratio: self.slouch_ratio,
            alert_after: self.alert_after()?,
            smoothing_frames: self.smoothing_frames,
        })
    }

    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.slouch_ratio, 0.5);
        assert_eq!(config.alert_seconds, 5.0);
        assert_eq!(config.smoothing_frames, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_settings() {
        let config = Config {
            alert_seconds: 2.5,
            smoothing_frames: 3,
            ..Config::default()
        };
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.alert_after, Duration::from_millis(2500));
        assert_eq!(settings.smoothing_frames, 3);
        assert_eq!(settings.slouch_ratio, 0.5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            camera_id: 2,
            slouch_ratio: 0.6,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "alert_seconds = 8.0\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.alert_seconds, 8.0);
        assert_eq!(config.smoothing_frames, 10);
        assert_eq!(config.window_title, "SlouchStopper");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            Config {
                slouch_ratio: 0.0,
                ..Config::default()
            },
            Config {
                slouch_ratio: f64::NAN,
                ..Config::default()
            },
            Config {
                alert_seconds: -1.0,
                ..Config::default()
            },
            Config {
                alert_seconds: f64::INFINITY,
                ..Config::default()
            },
            Config {
                alert_seconds: 1e20,
                ..Config::default()
            },
            Config {
                smoothing_frames: 0,
                ..Config::default()
            },
            Config {
                presence_threshold: 1.5,
                ..Config::default()
            },
            Config {
                tone_frequency_hz: 0.0,
                ..Config::default()
            },
            Config {
                tone_duration_ms: 0,
                ..Config::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "smoothing_frames = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        fs::write(&path, "smoothing_frames = \"ten\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::TomlDe(_))));
    }

    #[test]
    fn test_alert_seconds_beyond_duration_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "alert_seconds = 1e20\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        let config = Config {
            alert_seconds: 1e20,
            ..Config::default()
        };
        assert!(matches!(config.engine_settings(), Err(Error::Config(_))));
    }
}
