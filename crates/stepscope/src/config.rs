//! Settings loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! [playback]
//! interval_ms = 800
//!
//! [display]
//! max_elements = 30
//! summary_sample = 6
//!
//! [network]
//! max_neurons_per_layer = 16
//!
//! [engine]
//! command = ["python3", "tracer.py"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub display: DisplayConfig,
    pub network: NetworkConfig,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackConfig {
    /// Autoplay cadence (ms)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl PlaybackConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplayConfig {
    /// Containers with more leaf elements than this render as a summary
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Elements kept in a computed summary's sample
    #[serde(default = "default_summary_sample")]
    pub summary_sample: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            summary_sample: default_summary_sample(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_max_neurons_per_layer")]
    pub max_neurons_per_layer: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_neurons_per_layer: default_max_neurons_per_layer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Program and arguments; the source text is written to its stdin
    #[serde(default = "default_engine_command")]
    pub command: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
        }
    }
}

fn default_interval_ms() -> u64 {
    800
}

fn default_max_elements() -> usize {
    30
}

fn default_summary_sample() -> usize {
    6
}

fn default_max_neurons_per_layer() -> usize {
    16
}

fn default_engine_command() -> Vec<String> {
    vec!["python3".to_owned(), "tracer.py".to_owned()]
}
