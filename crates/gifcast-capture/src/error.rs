//! Error types for capture operations

use thiserror::Error;

/// Errors that can occur while capturing
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The source cannot report damage
    ///
    /// Change notification is mandatory: without it the producer has no way
    /// to know what to copy. This is raised at construction, never later.
    #[error("Capture extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// Capture area is empty or lies outside the source
    #[error("Invalid capture area: {0}")]
    InvalidArea(String),

    /// Reading pixels from the source failed
    #[error("Capture source failed: {0}")]
    SourceFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O operation failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

impl CaptureError {
    /// Create a missing-extension error
    pub(crate) fn extension_unavailable(msg: impl Into<String>) -> Self {
        Self::ExtensionUnavailable(msg.into())
    }

    /// Create an invalid area error
    pub(crate) fn invalid_area(msg: impl Into<String>) -> Self {
        Self::InvalidArea(msg.into())
    }

    /// Create a source failure
    pub fn source_failed(msg: impl Into<String>) -> Self {
        Self::SourceFailed(msg.into())
    }
}
