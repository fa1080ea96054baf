//! # gifcast-session
//!
//! Recording sessions for gifcast. A [`Session`] connects a
//! [`FrameProducer`](gifcast_capture::FrameProducer) to a background encoder
//! thread through a [`JobQueue`], and the worker streams every snapshot into
//! a [`FrameSink`]: an animated GIF, or a raw spool for later replay.
//!
//! # Features
//!
//! - **Non-blocking Producer**: Capture never waits for the encoder
//! - **Bounded Memory**: Queued snapshots spill to temporary files past a budget
//! - **Streaming Output**: GIF frames are written while recording is in progress
//! - **Spool Format**: Raw recordings that [`replay`] turns into any sink
//! - **Tokio Driver**: [`drive`] runs a session from a channel of [`CaptureEvent`]s
//!
//! # Quick Start
//!
//! ```rust
//! use gifcast_capture::MemorySource;
//! use gifcast_gifenc::{PixelFormat, Rect};
//! use gifcast_session::{Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let source = MemorySource::new(64, 48, PixelFormat::Bgrx32);
//!
//! let config = SessionConfig::builder().looping(true).build();
//! let mut session = Session::create_gif(dir.path().join("out.gif"), config, Box::new(source.clone()))?;
//! session.start()?;
//!
//! source.fill_rect(Rect::new(8, 8, 16, 16), 0x0000_FF00);
//! session.on_damage(Rect::new(8, 8, 16, 16), false)?;
//! session.on_timer()?;
//!
//! let stats = session.finish()?;
//! println!("{} frames in {:?}", stats.frames_processed, stats.duration);
//! # Ok(())
//! # }
//! ```
//!
//! # Threads
//!
//! The producer runs wherever the caller delivers events. The worker is a
//! dedicated thread named `gifcast-encoder` that owns the sink, the palette
//! and the shadow image. The job queue and its buffer free-list are the only
//! state the two share.
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cursor` | Yes | Pointer overlay in recordings |
//! | `full` | No | All features |

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod driver;
pub mod error;
pub mod job;
pub mod queue;
pub mod session;
pub mod sink;
pub mod spool;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{CacheConfig, CacheConfigBuilder, SessionConfig, SessionConfigBuilder};
pub use driver::{drive, CaptureEvent};
pub use error::{Result, SessionError};
pub use job::Job;
pub use queue::{JobQueue, QueueStats};
pub use session::{Session, SessionState, SessionStats};
pub use sink::{FrameSink, GifSink};
pub use spool::{read_header, replay, write_header, Endian, ReplayStats, SpoolHeader, SpoolSink};
