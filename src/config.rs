use crate::engine::estimator::DisplayTimeSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pacing config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid pacing config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables for the frame pipeline. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub display_time_source: DisplayTimeSource,
    /// Seconds of wall time between fps log lines.
    pub fps_report_interval_secs: f64,
    /// Multiplier applied to every predicted translation.
    pub player_scale: f32,
    pub units_per_meter: f32,
    pub near_clip: f32,
    pub far_clip: f32,
    pub eye_resolution: [u32; 2],
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            display_time_source: DisplayTimeSource::LocalClock,
            fps_report_interval_secs: 10.0,
            player_scale: 1.0,
            units_per_meter: 1.0,
            near_clip: 0.1,
            far_clip: 1000.0,
            eye_resolution: [1440, 1600],
        }
    }
}

impl PacingConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        log::info!(
            "[config] loaded {} (display time source {:?})",
            path.display(),
            config.display_time_source
        );
        Ok(config)
    }

    pub(crate) fn fps_report_interval_ns(&self) -> i64 {
        (self.fps_report_interval_secs.max(0.0) * 1_000_000_000.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PacingConfig::from_json("{}").expect("empty object is valid");
        assert_eq!(config, PacingConfig::default());
        assert_eq!(config.display_time_source, DisplayTimeSource::LocalClock);
    }

    #[test]
    fn runtime_timestamp_toggle_parses() {
        let config = PacingConfig::from_json(
            r#"{ "display_time_source": "runtime", "player_scale": 1.25 }"#,
        )
        .expect("config should parse");
        assert_eq!(config.display_time_source, DisplayTimeSource::Runtime);
        assert_eq!(config.player_scale, 1.25);
        assert_eq!(config.fps_report_interval_secs, 10.0);
    }

    #[test]
    fn unknown_source_is_rejected() {
        let err = PacingConfig::from_json(r#"{ "display_time_source": "oracle" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "near_clip": 0.5, "far_clip": 250.0 }}"#).expect("write config");

        let config = PacingConfig::load(file.path()).expect("config should load");
        assert_eq!(config.near_clip, 0.5);
        assert_eq!(config.far_clip, 250.0);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.json");
        let err = PacingConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn report_interval_converts_to_nanoseconds() {
        let config = PacingConfig {
            fps_report_interval_secs: 0.5,
            ..PacingConfig::default()
        };
        assert_eq!(config.fps_report_interval_ns(), 500_000_000);
    }
}
