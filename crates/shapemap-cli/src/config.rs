//! Configuration management for the CLI
//!
//! This module handles loading configuration from:
//! - Default values
//! - Configuration files (TOML/YAML/JSON)
//! - An explicit `--config` path or `SHAPEMAP_CONFIG`
//!
//! The `[mapper]` table is the engine configuration itself, so every engine
//! setting can be tuned from the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use shapemap_core::MapperConfig;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings
    pub mapper: MapperConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Use colored output by default
    pub color: bool,

    /// Show progress indicators
    pub progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `-v` nor `RUST_LOG` is given
    pub level: Option<String>,

    /// Log format (compact, full, json)
    pub format: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: true,
            progress: true,
        }
    }
}

/// File formats understood by [`Config::from_file`] and the schema loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml,
    Json,
}

impl FileFormat {
    /// Guess the format from a file extension; unknown extensions read as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::Toml,
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Yaml => "YAML",
            Self::Json => "JSON",
        }
    }
}

/// Parse `content` according to the extension of `path`
pub fn parse_file<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    let format = FileFormat::from_path(path);
    let invalid = |e: String| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to parse file");
        Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: format!("{} ({})", format.name(), e),
        }
    };
    match format {
        FileFormat::Toml => toml::from_str(content).map_err(|e| invalid(e.to_string())),
        FileFormat::Yaml => serde_yaml::from_str(content).map_err(|e| invalid(e.to_string())),
        FileFormat::Json => serde_json::from_str(content).map_err(|e| invalid(e.to_string())),
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = parse_file(path, &content)?;
        config
            .mapper
            .validate()
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "Loaded configuration");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        match file {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Location of the per-user configuration file
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shapemap").join("config.toml"))
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".shapemap.toml"),
            PathBuf::from("shapemap.toml"),
            PathBuf::from(".shapemap.yaml"),
        ];

        if let Some(user) = Self::user_config_path() {
            paths.push(user);
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".shapemap.toml"));
        }

        paths
    }

    /// Serialize in the given format
    pub fn render(&self, format: FileFormat) -> Result<String> {
        match format {
            FileFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| Error::config(format!("Failed to serialize as TOML: {}", e))),
            FileFormat::Yaml => Ok(serde_yaml::to_string(self)?),
            FileFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.render(FileFormat::from_path(path))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}
