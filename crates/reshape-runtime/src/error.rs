//! Runtime error types

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while fetching, hashing and converting watched sources
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client could not be configured
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Request could not be sent or its body could not be read
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("{url} returned {status}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status
        status: reqwest::StatusCode,
    },

    /// URL could not be parsed or resolved
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },

    /// Shutdown was signalled while work was in flight
    #[error("cancelled by shutdown")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing, mapping or configuration error from the core
    #[error(transparent)]
    Core(#[from] reshape_core::Error),

    /// Failure reported by an executor or catalog implementation
    #[error("{context}: {message}")]
    External {
        /// Step that failed
        context: &'static str,
        /// Error chain reported by the collaborator
        message: String,
    },
}

impl Error {
    /// Whether this error came from a shutdown rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn external(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::External {
            context,
            message: format!("{source:#}"),
        }
    }
}
