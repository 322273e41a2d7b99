use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::spawner::{DEFAULT_BATCH_SIZE, DEFAULT_INTERVAL_TICKS};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_folder: PathBuf,
    pub batch: BatchConfig,
    pub startup_delay_ticks: u32,
    pub join_visibility_delay_ticks: u32,
    pub reload_delay_ticks: u32,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub interval_ticks: u32,
}

/// Settings for the headless host the binary runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub worlds: Vec<String>,
    pub tick_millis: u64,
    /// Names that hold every permission.
    pub operators: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("plugins/HoloFX"),
            batch: BatchConfig::default(),
            startup_delay_ticks: 20,
            join_visibility_delay_ticks: 1,
            reload_delay_ticks: 20,
            server: ServerConfig::default(),
        }
    }
}
impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BATCH_SIZE,
            interval_ticks: DEFAULT_INTERVAL_TICKS,
        }
    }
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worlds: vec!["world".to_owned()],
            tick_millis: 50,
            operators: vec![],
        }
    }
}

impl Config {
    /// Reads `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(path)(e)),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn holograms_dir(&self) -> PathBuf {
        self.data_folder.join("holograms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = Config::parse("batch: {size: 12}\nserver: {operators: [alice]}\n").unwrap();
        assert_eq!(config.batch.size, 12);
        assert_eq!(config.batch.interval_ticks, DEFAULT_INTERVAL_TICKS);
        assert_eq!(config.server.operators, ["alice"]);
        assert_eq!(config.server.worlds, ["world"]);
        assert_eq!(config.startup_delay_ticks, 20);
        assert_eq!(config.holograms_dir(), Path::new("plugins/HoloFX/holograms"));
    }

    #[test]
    fn missing_or_empty_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(&dir.path().join("config.yml")).unwrap(), Config::default());
        assert_eq!(Config::parse("").unwrap(), Config::default());
        assert!(Config::parse("batch: nope").is_err());
    }
}
