//! # gifcast-capture
//!
//! Damage-driven screen capture for gifcast. A [`FrameProducer`] listens
//! to change notifications from a [`CaptureSource`], coalesces them into a
//! region of disjoint rectangles, and copies only those pixels into
//! timestamped [`Snapshot`]s at a bounded frame rate.
//!
//! # Features
//!
//! - **Damage Coalescing**: Overlapping notifications merge into one disjoint region
//! - **Frame Pacing**: Idle/armed timer, immediate first frame after a quiet period
//! - **Partial Copies**: Snapshots hold only the changed bounding box
//! - **Cursor Overlay**: Optional pointer compositing with an image cache (`cursor` feature)
//! - **Buffer Reuse**: Snapshot memory comes from a pluggable [`BufferPool`]
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gifcast_capture::{CaptureConfig, FrameProducer, HeapPool, MemorySource};
//! use gifcast_gifenc::{PixelFormat, Rect};
//!
//! # fn main() -> Result<(), gifcast_capture::CaptureError> {
//! let source = MemorySource::new(320, 240, PixelFormat::Bgrx32);
//!
//! let mut producer = FrameProducer::new(
//!     Box::new(source.clone()),
//!     Rect::from_size(320, 240),
//!     &CaptureConfig::default(),
//!     Arc::new(HeapPool),
//! )?;
//!
//! let first = producer.start()?;
//! assert_eq!(first.bounds(), Rect::from_size(320, 240));
//!
//! // Something drew; the timer is armed so the damage waits for the tick
//! source.fill_rect(Rect::new(10, 10, 20, 20), 0x00FF_0000);
//! assert!(producer.on_damage(Rect::new(10, 10, 20, 20), false)?.is_none());
//!
//! let next = producer.on_timer()?.expect("damage pending");
//! assert_eq!(next.bounds(), Rect::new(10, 10, 20, 20));
//! # Ok(())
//! # }
//! ```
//!
//! # Coordinate Spaces
//!
//! Damage and cursor positions arrive in source coordinates. Everything the
//! producer hands out (regions, snapshot origins) is relative to the
//! top-left corner of the capture area.
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cursor` | Yes | Pointer overlay |
//! | `full` | No | All features |

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod damage;
pub mod error;
pub mod producer;
pub mod snapshot;
pub mod source;

// =============================================================================
// FEATURE-GATED MODULES
// =============================================================================

#[cfg(feature = "cursor")]
#[cfg_attr(docsrs, doc(cfg(feature = "cursor")))]
pub mod cursor;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{CaptureConfig, CaptureConfigBuilder};
pub use damage::{DamageStats, DamageTracker, Region};
pub use error::{CaptureError, Result};
pub use producer::{FrameProducer, ProducerStats};
pub use snapshot::{BufferPool, HeapPool, Raster, Snapshot};
pub use source::{CaptureSource, CursorImage, MemorySource, SourceCapabilities};

#[cfg(feature = "cursor")]
pub use cursor::{CursorOverlay, CursorStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_capabilities() {
        let caps = SourceCapabilities::default();
        assert!(caps.damage);
        assert!(!caps.cursor);
    }
}
