//! Error types for reshape-core

use thiserror::Error;

use crate::format::Format;
use crate::schema::FieldKind;

/// Result type alias for reshape-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in reshape-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Input is structurally invalid for its declared or detected format
    #[error("invalid {format} input: {message}")]
    Format {
        /// Format the input was parsed as
        format: Format,
        /// Description of the problem
        message: String,
    },

    /// A field value could not be converted to its target kind
    #[error("cannot convert '{value}' to {kind}: {message}")]
    Coercion {
        /// Raw value, as text
        value: String,
        /// Kind the value was being converted to
        kind: FieldKind,
        /// Why the conversion failed
        message: String,
    },

    /// Malformed field path
    #[error("invalid field path '{path}': {message}")]
    InvalidPath {
        /// The offending path
        path: String,
        /// Description of the problem
        message: String,
    },

    /// Upload exceeds a configured size limit
    #[error("{format} upload of {size} bytes exceeds the limit of {limit} bytes")]
    UploadTooLarge {
        /// Format of the upload
        format: Format,
        /// Upload size in bytes
        size: u64,
        /// Applicable limit in bytes
        limit: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format(format: Format, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            message: message.into(),
        }
    }

    /// True for errors caused by the shape of the input rather than by IO
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}
