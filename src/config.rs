// Engine configuration - capacities and resolution, stored as RON

use crate::sequencer::timeline::{DEFAULT_TPQN, Tick};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sizes everything the audio thread pre-allocates.
/// `tpqn` is fixed for the lifetime of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks per quarter note
    pub tpqn: Tick,
    /// Block size assumed until a device calls `start_processing`
    pub default_max_block_size: usize,
    /// MIDI events per block and per graph node
    pub event_capacity: usize,
    /// Sequence note-offs that may be waiting across blocks
    pub pending_note_off_capacity: usize,
    /// Live note commands queued towards the audio thread
    pub sample_note_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tpqn: DEFAULT_TPQN,
            default_max_block_size: 4096,
            event_capacity: 1024,
            pending_note_off_capacity: 1024,
            sample_note_queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tpqn <= 0 {
            return Err(ConfigError::Invalid(format!("tpqn must be positive, got {}", self.tpqn)));
        }
        let capacities = [
            ("default_max_block_size", self.default_max_block_size),
            ("event_capacity", self.event_capacity),
            ("pending_note_off_capacity", self.pending_note_off_capacity),
            ("sample_note_queue_capacity", self.sample_note_queue_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Read and validate a RON file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&text)?;
        config.validate()?;
        tracing::info!(path = %path.display(), ?config, "engine config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.validate()?;
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }
}
