//! Error types for GIF encoding
//!
//! Provides typed errors that library users can match and handle specifically.

use thiserror::Error;

/// Errors that can occur while writing a GIF stream
///
/// All encoder operations return `Result<T, GifError>`. Once an I/O error
/// has been returned the encoder refuses any further work.
///
/// # Examples
///
/// ```
/// use gifcast_gifenc::{GifEncoder, GifError};
///
/// match GifEncoder::open(70_000, 10, Vec::new()) {
///     Err(GifError::DimensionsTooLarge { width, .. }) => assert_eq!(width, 70_000),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum GifError {
    /// Canvas does not fit the 16-bit fields of the container
    #[error("Canvas {width}x{height} exceeds the 65535 pixel limit")]
    DimensionsTooLarge {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Canvas or frame has a zero dimension
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Operation called in the wrong encoder state
    ///
    /// Examples: a frame before the palette, a second palette, any call
    /// after `close()`. These are contract violations by the caller.
    #[error("Invalid encoder state: {0}")]
    InvalidState(String),

    /// Frame rectangle leaves the logical screen
    #[error("Frame {x},{y} {width}x{height} outside canvas {canvas_width}x{canvas_height}")]
    FrameOutOfBounds {
        /// Frame left edge
        x: u32,
        /// Frame top edge
        y: u32,
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
        /// Canvas width
        canvas_width: u32,
        /// Canvas height
        canvas_height: u32,
    },

    /// Writing to the sink failed
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for GIF encoding
///
/// This is a convenience alias for `Result<T, GifError>`.
pub type Result<T> = std::result::Result<T, GifError>;

impl GifError {
    /// Create an invalid state error
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether this error came from the sink rather than from misuse
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GifError::DimensionsTooLarge {
            width: 70000,
            height: 5,
        };
        assert_eq!(err.to_string(), "Canvas 70000x5 exceeds the 65535 pixel limit");

        let err = GifError::invalid_state("palette already set");
        assert_eq!(err.to_string(), "Invalid encoder state: palette already set");
    }

    #[test]
    fn test_error_helpers() {
        let err = GifError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(err.is_io());

        let err = GifError::invalid_state("closed");
        assert!(!err.is_io());
        assert!(matches!(err, GifError::InvalidState(_)));
    }
}
