use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matching::domain::match_cache::CachePolicy;
use crate::matching::infrastructure::distance_verifier::DEFAULT_MATCH_THRESHOLD;
use crate::shared::constants::{
    DEFAULT_BLUR_INTENSITY, DEFAULT_COMPOSITOR_WORKERS, DEFAULT_CONFIDENCE, DEFAULT_REFRESH_HZ,
    DETECTION_INTERVAL_MS, RECORDING_CONTAINER, RECORDING_FPS, SNAPSHOT_JPEG_QUALITY,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for a live redaction session.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum detector score for a face to be considered.
    pub confidence: f64,
    /// Blur strength; non-positive values mean the default.
    pub blur_intensity: f64,
    pub detection_interval_ms: u64,
    /// Compositor ticks per second.
    pub refresh_hz: u32,
    /// Passes allowed to run at once. Two or more lets resolution passes
    /// overlap while a verifier call is outstanding.
    pub compositor_workers: usize,
    pub recording_fps: u32,
    pub recording_container: String,
    pub snapshot_jpeg_quality: u8,
    pub cache_policy: CachePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_timeout_ms: Option<u64>,
    /// Distance bound for the local verifier, in quantized units.
    pub match_threshold: f64,
    pub outlines: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            blur_intensity: DEFAULT_BLUR_INTENSITY,
            detection_interval_ms: DETECTION_INTERVAL_MS,
            refresh_hz: DEFAULT_REFRESH_HZ,
            compositor_workers: DEFAULT_COMPOSITOR_WORKERS,
            recording_fps: RECORDING_FPS,
            recording_container: RECORDING_CONTAINER.to_string(),
            snapshot_jpeg_quality: SNAPSHOT_JPEG_QUALITY,
            cache_policy: CachePolicy::default(),
            verifier_timeout_ms: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            outlines: true,
        }
    }
}

impl SessionConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ZkRedact").join("config.json"))
    }

    /// Reads `path`, or the default location when `None`. A missing file at
    /// the default location yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let config: Self =
            serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if !(0.0..=1.0).contains(&self.confidence) {
            return invalid("confidence", "must be within 0..=1");
        }
        if self.detection_interval_ms == 0 {
            return invalid("detection_interval_ms", "must be positive");
        }
        if self.refresh_hz == 0 {
            return invalid("refresh_hz", "must be positive");
        }
        if self.compositor_workers == 0 {
            return invalid("compositor_workers", "must be at least 1");
        }
        if self.recording_fps == 0 {
            return invalid("recording_fps", "must be positive");
        }
        if self.recording_container.trim().is_empty() {
            return invalid("recording_container", "must name a container");
        }
        if !(1..=100).contains(&self.snapshot_jpeg_quality) {
            return invalid("snapshot_jpeg_quality", "must be within 1..=100");
        }
        if let CachePolicy::Lru { capacity: 0 } = self.cache_policy {
            return invalid("cache_policy", "lru capacity must be at least 1");
        }
        if self.verifier_timeout_ms == Some(0) {
            return invalid("verifier_timeout_ms", "must be positive when set");
        }
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return invalid("match_threshold", "must be a non-negative number");
        }
        Ok(())
    }

    /// Blur strength after the non-positive fallback.
    pub fn effective_blur_intensity(&self) -> f64 {
        if self.blur_intensity.is_finite() && self.blur_intensity > 0.0 {
            self.blur_intensity
        } else {
            DEFAULT_BLUR_INTENSITY
        }
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }

    pub fn verifier_timeout(&self) -> Option<Duration> {
        self.verifier_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_relative_eq!(config.confidence, 0.5);
        assert_relative_eq!(config.blur_intensity, 8.0);
        assert_eq!(config.detection_interval(), Duration::from_millis(200));
        assert_eq!(config.refresh_hz, 60);
        assert_eq!(config.compositor_workers, 2);
        assert_eq!(config.recording_fps, 30);
        assert_eq!(config.recording_container, "mp4");
        assert_eq!(config.snapshot_jpeg_quality, 95);
        assert_eq!(config.cache_policy, CachePolicy::Unbounded);
        assert!(config.verifier_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "confidence": 0.8, "cache_policy": { "kind": "lru", "capacity": 64 } }"#,
        )
        .unwrap();

        let config = SessionConfig::load(Some(&path)).unwrap();
        assert_relative_eq!(config.confidence, 0.8);
        assert_eq!(config.cache_policy, CachePolicy::Lru { capacity: 64 });
        assert_eq!(config.refresh_hz, 60);
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = SessionConfig {
            verifier_timeout_ms: Some(1500),
            cache_policy: CachePolicy::Ttl { seconds: 600 },
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionConfig::load(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ confidence: ").unwrap();
        assert!(matches!(
            SessionConfig::load(Some(&path)).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[rstest]
    #[case::confidence(SessionConfig { confidence: 1.5, ..Default::default() }, "confidence")]
    #[case::interval(SessionConfig { detection_interval_ms: 0, ..Default::default() }, "detection_interval_ms")]
    #[case::workers(SessionConfig { compositor_workers: 0, ..Default::default() }, "compositor_workers")]
    #[case::lru(SessionConfig { cache_policy: CachePolicy::Lru { capacity: 0 }, ..Default::default() }, "cache_policy")]
    #[case::quality(SessionConfig { snapshot_jpeg_quality: 0, ..Default::default() }, "snapshot_jpeg_quality")]
    #[case::threshold(SessionConfig { match_threshold: f64::NAN, ..Default::default() }, "match_threshold")]
    fn test_validation_rejects(#[case] config: SessionConfig, #[case] expected: &str) {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected invalid {expected}, got {other:?}"),
        }
    }

    #[rstest]
    #[case(0.0, 8.0)]
    #[case(-3.0, 8.0)]
    #[case(f64::NAN, 8.0)]
    #[case(12.0, 12.0)]
    fn test_blur_intensity_fallback(#[case] configured: f64, #[case] effective: f64) {
        let config = SessionConfig {
            blur_intensity: configured,
            ..Default::default()
        };
        assert_relative_eq!(config.effective_blur_intensity(), effective);
    }
}
