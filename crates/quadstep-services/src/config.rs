//! Engine configuration stored as TOML under the user config directory

use std::io;
use std::path::{Path, PathBuf};

use quadstep_core::{TimingMode, TrackSettings, TRACKS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Euclidean probability pattern applied to a track at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EuclideanPreset {
    pub track: usize,
    pub length: u8,
    pub beats: u8,
    #[serde(default)]
    pub rotation: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bpm: f64,
    pub timing: TimingMode,
    /// Sleep between scheduler polls
    pub poll_interval_ms: u64,
    /// Capacity of the outgoing MIDI queue
    pub midi_queue: usize,
    /// Fixed seed for probability and random step modes
    pub seed: Option<u64>,
    /// Seconds the host runs before stopping; 0 runs until killed
    pub run_seconds: u64,
    pub tracks: Vec<TrackSettings>,
    pub euclidean: Vec<EuclideanPreset>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            timing: TimingMode::RebaseToNow,
            poll_interval_ms: 1,
            midi_queue: 256,
            seed: None,
            run_seconds: 0,
            tracks: (0..TRACKS).map(TrackSettings::for_track).collect(),
            euclidean: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Settings for a track, falling back to its defaults when not configured
    pub fn track_settings(&self, track: usize) -> TrackSettings {
        self.tracks
            .get(track)
            .copied()
            .unwrap_or_else(|| TrackSettings::for_track(track))
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quadstep")
        .join("config.toml")
}

/// Load from the default location
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`; a missing file yields the defaults
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(EngineConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config = toml::from_str(&text)?;
    info!(path = %path.display(), "Config loaded");
    Ok(config)
}

pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text)?;
    info!(path = %path.display(), "Config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadstep_core::ScaleMode;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("quadstep-test-{}-{name}", std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from(&scratch_path("missing")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.tracks.len(), TRACKS);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            bpm = 96.0
            timing = "FixedPeriod"

            [[tracks]]
            midi_channel = 10
            scale = "Minor"

            [[euclidean]]
            track = 1
            length = 8
            beats = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.bpm, 96.0);
        assert_eq!(config.timing, TimingMode::FixedPeriod);
        assert_eq!(config.poll_interval_ms, 1);
        assert_eq!(config.tracks.len(), 1);
        assert_eq!(config.tracks[0].midi_channel, 10);
        assert_eq!(config.tracks[0].scale, ScaleMode::Minor);
        assert!(config.tracks[0].enabled);
        assert_eq!(config.track_settings(3), TrackSettings::for_track(3));
        assert_eq!(config.euclidean[0].rotation, 0);
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let path = scratch_path("bad");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "bpm = [oops").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch_path("save");
        let mut config = EngineConfig::default();
        config.bpm = 140.0;
        config.seed = Some(7);
        config.euclidean.push(EuclideanPreset { track: 0, length: 5, beats: 2, rotation: 1 });
        save_config_to(&config, &path).unwrap();

        assert_eq!(load_config_from(&path).unwrap(), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
