//! Simple configuration persistence for SONA
//!
//! Stores playback and upload settings as `key=value` lines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interval between position ticks while playing
    pub tick_interval_ms: u64,
    /// Resolution of the waveform overview handed to renderers
    pub waveform_points: usize,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Folder holding the bundled demo tracks
    pub demo_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: 33,
            waveform_points: 1000,
            max_upload_bytes: 10 * 1024 * 1024,
            demo_dir: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sona")
            .join("config.txt")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Parse config from simple key=value format
    ///
    /// Unknown keys and unparsable values keep their defaults.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "tick_interval_ms" => {
                    if let Ok(v) = value.parse() {
                        config.tick_interval_ms = v;
                    }
                }
                "waveform_points" => {
                    if let Ok(v) = value.parse() {
                        config.waveform_points = v;
                    }
                }
                "max_upload_bytes" => {
                    if let Ok(v) = value.parse() {
                        config.max_upload_bytes = v;
                    }
                }
                "demo_dir" => {
                    if !value.is_empty() {
                        config.demo_dir = Some(PathBuf::from(value));
                    }
                }
                unknown => {
                    tracing::debug!(key = unknown, "ignoring unknown config key");
                }
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# SONA Configuration".to_string(),
            format!("tick_interval_ms={}", self.tick_interval_ms),
            format!("waveform_points={}", self.waveform_points),
            format!("max_upload_bytes={}", self.max_upload_bytes),
        ];

        if let Some(ref dir) = self.demo_dir {
            lines.push(format!("demo_dir={}", dir.display()));
        }

        lines.join("\n")
    }
}
