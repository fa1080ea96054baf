//! Tokio Event Driver
//!
//! Runs a [`Session`] from a channel of capture events. The frame timer is
//! only armed while the producer wants ticks, so an idle screen costs no
//! wakeups.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gifcast_capture::MemorySource;
//! use gifcast_gifenc::{PixelFormat, Rect};
//! use gifcast_session::{drive, CaptureEvent, Session, SessionConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MemorySource::new(320, 200, PixelFormat::Bgrx32);
//! let mut session = Session::create_gif("out.gif", SessionConfig::default(), Box::new(source))?;
//!
//! let (tx, rx) = mpsc::channel(64);
//! tokio::spawn(async move {
//!     let _ = tx.send(CaptureEvent::Damage { rect: Rect::new(0, 0, 10, 10), more: false }).await;
//!     let _ = tx.send(CaptureEvent::Stop).await;
//! });
//!
//! drive(&mut session, rx).await?;
//! session.finish()?;
//! # Ok(())
//! # }
//! ```

use gifcast_gifenc::Rect;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::{Session, SessionState};

/// Event delivered by the capture collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Pixels changed (`rect` in source coordinates)
    ///
    /// `more` is set when further rectangles of the same batch follow.
    Damage { rect: Rect, more: bool },

    /// Pointer moved or its image changed
    CursorChanged,

    /// Stop recording
    Stop,
}

/// Record until [`CaptureEvent::Stop`] arrives or the channel closes
///
/// Starts the session if needed and stops it before returning. The worker
/// may still be encoding afterwards; call [`Session::finish`] to wait for it.
pub async fn drive(session: &mut Session, mut events: mpsc::Receiver<CaptureEvent>) -> Result<()> {
    if matches!(session.state(), SessionState::Created | SessionState::Preparing) {
        session.start()?;
    }

    let result = event_loop(session, &mut events).await;
    let stopped = session.stop();
    result.and(stopped)
}

async fn event_loop(session: &mut Session, events: &mut mpsc::Receiver<CaptureEvent>) -> Result<()> {
    let interval = session.frame_interval();
    let mut deadline: Option<Instant> = None;

    while session.is_recording() {
        if !session.is_timer_active() {
            deadline = None;
        } else if deadline.is_none() {
            deadline = Some(Instant::now() + interval);
        }

        tokio::select! {
            event = events.recv() => match event {
                Some(CaptureEvent::Damage { rect, more }) => session.on_damage(rect, more)?,
                Some(CaptureEvent::CursorChanged) => session.on_cursor_changed()?,
                Some(CaptureEvent::Stop) => {
                    info!("Stop requested");
                    return Ok(());
                }
                None => {
                    debug!("Event channel closed");
                    return Ok(());
                }
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                session.on_timer()?;

                // Keep the tick phase; skip ticks that were missed entirely
                let now = Instant::now();
                deadline = deadline.map(|d| {
                    let next = d + interval;
                    if next <= now {
                        now + interval
                    } else {
                        next
                    }
                });
            }
        }
    }

    Ok(())
}
