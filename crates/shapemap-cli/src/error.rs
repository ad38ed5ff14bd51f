//! Error types and handling for the CLI
//!
//! This module provides error types and utilities for handling
//! various failure modes in the CLI application.

use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from shapemap-core
    #[error("{0}")]
    Core(#[from] shapemap_core::Error),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Invalid file format
    #[error("Invalid file format for {}: expected {}", path.display(), expected)]
    InvalidFormat { path: PathBuf, expected: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema named on the command line is not in the schema file
    #[error("Schema '{}' not found in {}", name, path.display())]
    SchemaNotFound { name: String, path: PathBuf },

    /// An input record does not fit the source schema
    #[error("Record {index} is invalid: {message}")]
    InvalidRecord { index: usize, message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(e) if e.is_plan_time() => 2,
            Self::Core(_) => 3,
            Self::FileNotFound { .. } => 4,
            Self::InvalidFormat { .. } => 5,
            Self::Config(_) => 6,
            Self::SchemaNotFound { .. } => 7,
            Self::InvalidRecord { .. } => 8,
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::Other { .. } => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::SchemaNotFound { .. })
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_have_their_own_exit_code() {
        let plan = Error::from(shapemap_core::Error::MissingBinding {
            target_shape: "Account".to_string(),
            field: "id".to_string(),
        });
        let call = Error::from(shapemap_core::Error::UnexpectedNull {
            field: "name".to_string(),
            target_type: "string".to_string(),
        });
        assert_eq!(plan.exit_code(), 2);
        assert_eq!(call.exit_code(), 3);
    }

    #[test]
    fn test_format_without_color() {
        let err = Error::SchemaNotFound {
            name: "Person".to_string(),
            path: PathBuf::from("schemas.toml"),
        };
        assert_eq!(
            format_error(&err, false),
            "Error: Schema 'Person' not found in schemas.toml"
        );
        assert!(err.should_show_help());
    }
}
