//! Error types for the Shapemap core library
//!
//! This module defines the error handling system for Shapemap,
//! using thiserror for ergonomic error definitions and anyhow for flexible error contexts.
//!
//! Errors fall in two groups. Plan-time errors (`MissingBinding`,
//! `UnsupportedConversion`, `UnknownField`) are raised synchronously to the
//! caller that triggers planning. Call-time errors (`TargetConstruction`,
//! `Conversion`, `UnexpectedNull`, `Shape`) are raised by an actual transform.
//! `CompileFailure` is produced by background upgrades and only ever logged.

use crate::tier::TierKind;
use thiserror::Error;

/// Main error type for Shapemap operations
#[derive(Error, Debug)]
pub enum Error {
    /// A mandatory constructor slot has no source field, override, or default
    #[error("Missing binding: {target_shape}.{field} has no source field, override or default")]
    MissingBinding { target_shape: String, field: String },

    /// No converter path exists between two declared types
    #[error("Unsupported conversion from {source_type} to {target_type} for field '{field}'")]
    UnsupportedConversion {
        source_type: String,
        target_type: String,
        field: String,
    },

    /// A specialization attempt could not produce a tier
    #[error("Compile failure ({tier}): {message}")]
    CompileFailure { tier: TierKind, message: String },

    /// Building the target instance failed on every construction strategy
    #[error("Target construction failed for {target_shape}: {message}")]
    TargetConstruction {
        target_shape: String,
        message: String,
        #[source]
        source: Option<ShapeError>,
    },

    /// A null reached a non-nullable field with no substitution available
    #[error("Unexpected null for non-nullable field '{field}' of type {target_type}")]
    UnexpectedNull { field: String, target_type: String },

    /// A resolved converter rejected a concrete value
    #[error("Conversion failed for field '{field}': {source}")]
    Conversion {
        field: String,
        #[source]
        source: ConversionError,
    },

    /// Shape declaration or instance mismatch
    #[error("Shape error: {source}")]
    Shape {
        #[from]
        source: ShapeError,
    },

    /// An override refers to a field the target shape does not expose
    #[error("Unknown field '{field}' on shape {shape}")]
    UnknownField { shape: String, field: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while declaring shapes or touching instances through them
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    /// The instance handed to an accessor is not of the shape's type
    #[error("Instance is not a {expected}")]
    InstanceMismatch { expected: String },

    /// A record was read through a schema it was not built from
    #[error("Record schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// A constructor argument was requested but not supplied
    #[error("Constructor argument '{name}' is missing")]
    MissingArgument { name: String },

    /// A constructor argument name is not one of the declared slots
    #[error("Constructor has no slot named '{name}'")]
    UnknownSlot { name: String },

    /// A value did not have the declared type
    #[error("Field '{field}' expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Two declarations share one name
    #[error("Duplicate declaration of '{name}'")]
    Duplicate { name: String },

    /// The shape cannot be constructed
    #[error("Shape {shape} has no constructor")]
    NotConstructible { shape: String },

    /// Constructor closure reported a failure of its own
    #[error("{message}")]
    Custom { message: String },
}

/// Errors raised by a single value conversion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Text could not be parsed as the target type
    #[error("cannot parse '{input}' as {target}")]
    Parse { input: String, target: String },

    /// Numeric value outside the target range
    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: String },

    /// The value does not have the type the converter was built for
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Wrapped value of an unexpected wrapper type
    #[error("expected wrapper {expected}, found {found}")]
    WrapperMismatch { expected: String, found: String },

    /// No converter exists for the runtime type of a dynamic value
    #[error("no conversion from {source_type} to {target_type}")]
    Unsupported {
        source_type: String,
        target_type: String,
    },
}

impl ShapeError {
    /// Create a custom error from a constructor closure
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the error is raised while planning rather than while transforming
    pub fn is_plan_time(&self) -> bool {
        matches!(
            self,
            Self::MissingBinding { .. } | Self::UnsupportedConversion { .. } | Self::UnknownField { .. }
        )
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}
