//! Error types for recording sessions

use gifcast_capture::CaptureError;
use gifcast_gifenc::GifError;
use thiserror::Error;

/// Errors that can occur during a recording session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session could not be set up
    ///
    /// Raised before any frame is captured. A partially created output file
    /// has already been removed.
    #[error("Session setup failed: {0}")]
    Setup(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session ended before a single frame was encoded
    #[error("No image to encode")]
    NothingRecorded,

    /// Malformed spool data
    #[error("Invalid spool data: {0}")]
    Spool(String),

    /// The encoder worker thread panicked
    #[error("Encoder worker panicked: {0}")]
    WorkerPanicked(String),

    /// GIF encoding failed
    #[error("GIF encoding failed: {0}")]
    Gif(#[from] GifError),

    /// Capture failed
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// I/O operation failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create a setup error
    pub(crate) fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Create an invalid state error
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a spool format error
    pub(crate) fn spool(msg: impl Into<String>) -> Self {
        Self::Spool(msg.into())
    }

    /// Check if this error came from the output or spill storage
    #[must_use]
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Gif(e) => e.is_io(),
            Self::Capture(CaptureError::Io(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::setup("could not open out.gif");
        assert_eq!(err.to_string(), "Session setup failed: could not open out.gif");

        let err = SessionError::NothingRecorded;
        assert_eq!(err.to_string(), "No image to encode");
    }

    #[test]
    fn test_error_helpers() {
        let err = SessionError::invalid_state("not recording");
        assert!(matches!(err, SessionError::InvalidState(_)));

        let err = SessionError::spool("bad magic");
        assert!(matches!(err, SessionError::Spool(_)));
        assert!(!err.is_io());
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: SessionError = GifError::from(io).into();
        assert!(matches!(err, SessionError::Gif(_)));
        assert!(err.is_io());

        let err: SessionError = std::io::Error::new(std::io::ErrorKind::Other, "x").into();
        assert!(err.is_io());
    }
}
