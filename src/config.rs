// Sequencer configuration
// Loaded from a RON file; every field falls back to its default.

use crate::midi::queue::DEFAULT_DRAIN_INTERVAL_MS;
use crate::timing::Tempo;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub bpm: f64,
    /// Clock ticks per beat (4 = sixteenth notes)
    pub ticks_per_beat: u32,
    /// 0.0 (straight) to 0.9
    pub swing: f64,
    pub midi_drain_interval_ms: f64,
    /// Note length of drum-machine MIDI channels
    pub default_note_duration_ms: f64,
    /// Client name announced to the MIDI backend
    pub client_name: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            ticks_per_beat: 4,
            swing: 0.0,
            midi_drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            default_note_duration_ms: 100.0,
            client_name: "stepgrid".to_string(),
        }
    }
}

impl SequencerConfig {
    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm)
    }

    /// Clock interval in milliseconds: 60000 / (bpm * ticks_per_beat)
    pub fn tick_interval_ms(&self) -> f64 {
        self.tempo().tick_interval_ms(self.ticks_per_beat)
    }

    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(source)?)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::default())?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron(&source)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// `<config dir>/stepgrid/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stepgrid").join("config.ron"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tick_interval() {
        let config = SequencerConfig::default();
        assert!((config.tick_interval_ms() - 125.0).abs() < 1e-9);

        let config = SequencerConfig {
            bpm: 150.0,
            ticks_per_beat: 2,
            ..SequencerConfig::default()
        };
        assert!((config.tick_interval_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = SequencerConfig::from_ron("(bpm: 90.0, swing: 0.2)").unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.swing, 0.2);
        assert_eq!(config.ticks_per_beat, 4);
        assert_eq!(config.client_name, "stepgrid");
    }

    #[test]
    fn test_invalid_ron() {
        let result = SequencerConfig::from_ron("(bpm: \"fast\")");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ron");

        assert_eq!(
            SequencerConfig::load_or_default(&path).unwrap(),
            SequencerConfig::default()
        );

        let config = SequencerConfig {
            bpm: 98.0,
            client_name: "studio".to_string(),
            ..SequencerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SequencerConfig::load(&path).unwrap(), config);
    }
}
