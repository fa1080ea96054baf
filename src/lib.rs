//! # gifcast
//!
//! Damage-driven screen recording to streaming animated GIF for Rust.
//!
//! This crate provides a unified interface to the gifcast libraries:
//!
//! - **[`gifenc`]** - Palette quantization, dithering, LZW and the streaming GIF writer
//! - **[`capture`]** - Damage tracking, capture sources and the frame producer
//! - **[`session`]** - Job queue, encoder worker, GIF/spool sinks and the tokio driver
//!
//! # Features
//!
//! All features are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! gifcast = "0.1"
//!
//! # Encoder only
//! gifcast = { version = "0.1", default-features = false, features = ["gifenc"] }
//!
//! # All features including sub-crate features
//! gifcast = { version = "0.1", features = ["full"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `gifenc` | Yes | Streaming GIF encoder |
//! | `capture` | Yes | Damage-driven frame producer |
//! | `session` | Yes | Recording sessions |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ## Encoding frames directly
//!
//! ```rust
//! use gifcast::gifenc::{ByteOrder, GifEncoder, Palette, Rect};
//!
//! # fn main() -> Result<(), gifcast::gifenc::GifError> {
//! let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]], ByteOrder::Rgb, false);
//!
//! let mut encoder = GifEncoder::open(2, 2, Vec::new())?;
//! encoder.set_palette(palette)?;
//! encoder.add_frame(Rect::new(0, 0, 2, 2), 10, &[0, 1, 1, 0], 2)?;
//! encoder.close()?;
//!
//! let bytes = encoder.into_inner();
//! assert_eq!(&bytes[..6], b"GIF89a");
//! # Ok(())
//! # }
//! ```
//!
//! ## Recording a Session
//!
//! ```rust,ignore
//! use gifcast::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any CaptureSource; MemorySource stands in for a real display
//!     let source = MemorySource::new(640, 480, PixelFormat::native_xrgb());
//!     let config = SessionConfig::builder().looping(true).build();
//!     let mut session = Session::create_gif("capture.gif", config, Box::new(source))?;
//!
//!     // Feed damage events from the windowing system into the channel
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     # drop(tx);
//!     drive(&mut session, rx).await?;
//!
//!     let stats = session.finish()?;
//!     println!("{} frames", stats.frames_processed);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            gifcast                               │
//! ├──────────────────────┬─────────────────────┬─────────────────────┤
//! │   gifcast-capture    │   gifcast-session   │   gifcast-gifenc    │
//! │                      │                     │                     │
//! │  FrameProducer       │  Session            │  Palette            │
//! │  DamageTracker       │  JobQueue           │  ErrorDiffusion     │
//! │  CaptureSource       │  GifSink/SpoolSink  │  GifEncoder         │
//! └──────────┬───────────┴──────────┬──────────┴──────────┬──────────┘
//!            │                      │                     │
//!            ▼                      ▼                     ▼
//!     damage + pixels      worker thread + spill     .gif byte stream
//! ```
//!
//! # Related Crates
//!
//! You can also use the individual crates directly:
//!
//! - [`gifcast-gifenc`](https://crates.io/crates/gifcast-gifenc) - Encoder only
//! - [`gifcast-capture`](https://crates.io/crates/gifcast-capture) - Producer only
//! - [`gifcast-session`](https://crates.io/crates/gifcast-session) - Sessions

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Streaming animated GIF encoding.
///
/// - Exact or median-cut palettes with a transparent slot
/// - Error-diffusion dithering with delta detection
/// - Per-frame LZW compression into 255-byte sub-blocks
///
/// See [`gifcast_gifenc`] documentation for details.
#[cfg(feature = "gifenc")]
#[cfg_attr(docsrs, doc(cfg(feature = "gifenc")))]
pub use gifcast_gifenc as gifenc;

/// Damage-driven frame capture.
///
/// - Disjoint damage regions with bounding-box fallback
/// - Idle/armed frame timer
/// - Optional cursor compositing
///
/// See [`gifcast_capture`] documentation for details.
#[cfg(feature = "capture")]
#[cfg_attr(docsrs, doc(cfg(feature = "capture")))]
pub use gifcast_capture as capture;

/// Recording sessions.
///
/// - Non-blocking producer to worker job queue with disk spill
/// - GIF and spool frame sinks
/// - Tokio event driver
///
/// See [`gifcast_session`] documentation for details.
#[cfg(feature = "session")]
#[cfg_attr(docsrs, doc(cfg(feature = "session")))]
pub use gifcast_session as session;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use gifcast::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "gifenc")]
    pub use gifcast_gifenc::{DelayRounding, GifEncoder, GifError, Palette, PixelFormat, Rect};

    #[cfg(feature = "capture")]
    pub use gifcast_capture::{CaptureConfig, CaptureError, CaptureSource, FrameProducer, MemorySource, Snapshot};

    #[cfg(feature = "session")]
    pub use gifcast_session::{
        drive, CacheConfig, CaptureEvent, FrameSink, GifSink, Session, SessionConfig, SessionError,
        SessionState,
    };
}
