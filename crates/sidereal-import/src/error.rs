//! Error types for sidereal-import.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`ImportError`].
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors that can occur while importing a template.
#[derive(Debug, Error)]
pub enum ImportError {
    // ─────────────────────────────────────────────────────────────────────────
    // Input validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The artifact was produced by a builder we cannot import from.
    #[error(
        "unsupported artifact type {builder_id:?}: only artifacts from the QEMU or file \
         builders and the Artifice post-processor can be imported"
    )]
    UnsupportedArtifact {
        /// Builder identifier carried by the artifact.
        builder_id: String,
    },

    /// The artifact does not reference any disk image.
    #[error("artifact does not contain any disk image file")]
    MissingImage,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Remote errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to read the local image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Object storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Compute provider error.
    #[error("compute provider error: {0}")]
    Compute(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider reported that template registration failed.
    #[error("template registration failed: {detail}")]
    RegistrationFailed {
        /// Failure detail reported by the provider.
        detail: String,
    },

    /// Registration did not complete before the deadline.
    #[error("template registration did not complete within {limit:?}")]
    RegistrationTimeout {
        /// Deadline that was exceeded.
        limit: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Workflow outcomes
    // ─────────────────────────────────────────────────────────────────────────
    /// The import was cancelled by the caller.
    #[error("import cancelled")]
    Cancelled,

    /// A step halted the import without reporting an error.
    #[error("import halted")]
    Halted,

    /// The workflow finished without a resolvable outcome.
    #[error("inconsistent workflow state: {0}")]
    Inconsistent(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ImportError {
    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a compute provider error.
    #[must_use]
    pub fn compute(msg: impl Into<String>) -> Self {
        Self::Compute(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error represents a caller-initiated stop.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<figment::Error> for ImportError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}
