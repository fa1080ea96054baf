//! Recording Session
//!
//! A [`Session`] owns the frame producer, the job queue and the encoder
//! worker thread. The caller drives the producer from its event loop
//! ([`driver::drive`](crate::driver::drive) does this on tokio); the worker
//! drains the queue into a [`FrameSink`].
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Preparing -> Recording -> Stopping -> Finished
//!     \__________\____________\___________\______> Error
//! ```
//!
//! `prepare` queues the palette snapshot, `start` begins recording, `stop`
//! queues the final job. The worker keeps running after `stop` until it has
//! encoded everything queued; [`Session::is_active`] turns false once it is
//! done. [`Session::finish`] joins the worker and returns the outcome.
//!
//! # Examples
//!
//! ```rust
//! use gifcast_capture::MemorySource;
//! use gifcast_gifenc::{PixelFormat, Rect};
//! use gifcast_session::{Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("demo.gif");
//!
//! let source = MemorySource::new(32, 32, PixelFormat::Bgrx32);
//! let mut session = Session::create_gif(&path, SessionConfig::default(), Box::new(source.clone()))?;
//!
//! session.start()?;
//! source.fill_rect(Rect::new(4, 4, 8, 8), 0x00FF_0000);
//! session.on_damage(Rect::new(4, 4, 8, 8), false)?;
//! session.on_timer()?;
//! session.stop()?;
//!
//! let stats = session.finish()?;
//! assert_eq!(stats.frames_processed, 2);
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gifcast_capture::{BufferPool, CaptureSource, DamageStats, FrameProducer, ProducerStats, Snapshot};
use gifcast_gifenc::Rect;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::job::Job;
use crate::queue::{JobQueue, QueueStats};
use crate::sink::{FrameSink, GifSink};
use crate::spool::SpoolSink;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Worker running, nothing queued
    Created,

    /// Palette snapshot queued
    Preparing,

    /// Producer running
    Recording,

    /// Stop queued, worker draining
    Stopping,

    /// Output closed successfully
    Finished,

    /// Recording failed
    Error,
}

impl SessionState {
    /// Whether the state can no longer change
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// Session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Snapshots handed to the sink by the worker
    pub frames_processed: u64,

    /// Producer counters
    pub producer: ProducerStats,

    /// Damage accumulation counters
    pub damage: DamageStats,

    /// Job queue counters
    pub queue: QueueStats,

    /// Time between start and stop (or now, while recording)
    pub duration: Duration,
}

/// State shared with the worker thread
struct Shared {
    state: RwLock<SessionState>,
    error: Mutex<Option<String>>,
    finished: AtomicBool,
    frames: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Created),
            error: Mutex::new(None),
            finished: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        }
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write();
        if !state.is_terminal() && *state != next {
            debug!("Session state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Keep the first error and move to `Error`
    fn fail(&self, message: String) {
        {
            let mut error = self.error.lock();
            if error.is_none() {
                *error = Some(message);
            }
        }
        self.set_state(SessionState::Error);
    }
}

/// Marks the worker as finished when it exits, including by panic
struct FinishGuard(Arc<Shared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.fail("encoder worker panicked".to_string());
        }
        self.0.finished.store(true, Ordering::Release);
    }
}

/// A recording in progress
pub struct Session {
    producer: FrameProducer,
    queue: Arc<JobQueue>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<()>>>,
    area: Rect,
    output: Option<PathBuf>,
    stop_requested: bool,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl Session {
    /// Create a session recording `source` into `sink`
    ///
    /// Validates the configuration, clips the area to the source and spawns
    /// the encoder worker.
    pub fn new(
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| SessionError::InvalidConfig(issues.join("; ")))?;

        let area = resolve_area(&config, source.as_ref())?;
        let queue = Arc::new(JobQueue::new(config.cache.clone()));
        let pool: Arc<dyn BufferPool> = queue.clone();
        let producer = FrameProducer::new(source, area, &config.capture, pool)?;

        let shared = Arc::new(Shared::new());
        let worker = {
            let queue = Arc::clone(&queue);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("gifcast-encoder".to_string())
                .spawn(move || run_worker(&queue, sink, shared))
                .map_err(|e| SessionError::setup(format!("cannot spawn encoder thread: {e}")))?
        };

        info!(
            "Session created: {}x{} at ({}, {}), frame interval {:?}",
            area.width,
            area.height,
            area.x,
            area.y,
            producer.interval()
        );

        Ok(Self {
            producer,
            queue,
            shared,
            worker: Some(worker),
            area,
            output: None,
            stop_requested: false,
            started_at: None,
            stopped_at: None,
        })
    }

    /// Create a session writing an animated GIF to `path`
    ///
    /// The file is removed again if the session cannot be set up, and when
    /// the recording fails.
    pub fn create_gif(
        path: impl AsRef<Path>,
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
    ) -> Result<Self> {
        let area = resolve_area(&config, source.as_ref())?;
        let looping = config.looping;
        let delay = config.delay;

        Self::with_output(path.as_ref(), config, source, move |file| -> Box<dyn FrameSink> {
            Box::new(
                GifSink::new(BufWriter::new(file), area.width, area.height)
                    .with_looping(looping)
                    .with_delay(delay),
            )
        })
    }

    /// Create a session writing the raw spool format to `path`
    ///
    /// The spool can later be turned into a GIF with
    /// [`replay`](crate::spool::replay).
    pub fn create_spool(
        path: impl AsRef<Path>,
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
    ) -> Result<Self> {
        let area = resolve_area(&config, source.as_ref())?;

        Self::with_output(path.as_ref(), config, source, move |file| -> Box<dyn FrameSink> {
            Box::new(SpoolSink::new(BufWriter::new(file), area.width, area.height))
        })
    }

    fn with_output(
        path: &Path,
        config: SessionConfig,
        source: Box<dyn CaptureSource>,
        make_sink: impl FnOnce(File) -> Box<dyn FrameSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| SessionError::InvalidConfig(issues.join("; ")))?;

        let file = File::create(path)
            .map_err(|e| SessionError::setup(format!("cannot create {}: {e}", path.display())))?;

        match Self::new(config, source, make_sink(file)) {
            Ok(mut session) => {
                session.output = Some(path.to_path_buf());
                Ok(session)
            }
            Err(e) => {
                remove_file(path);
                Err(e)
            }
        }
    }

    /// Queue the palette snapshot
    ///
    /// Called by [`Session::start`] if needed. Preparing early moves the
    /// palette computation out of the recording's first frames.
    pub fn prepare(&mut self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Created {
            return Err(SessionError::invalid_state(format!(
                "cannot prepare in state {state:?}"
            )));
        }

        let snapshot = self
            .producer
            .capture_full()
            .map_err(|e| self.fail(e.into()))?;
        self.submit(Job::Quantize(snapshot))?;
        self.shared.set_state(SessionState::Preparing);
        Ok(())
    }

    /// Start recording
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Created => self.prepare()?,
            SessionState::Preparing => {}
            state => {
                return Err(SessionError::invalid_state(format!(
                    "cannot start in state {state:?}"
                )))
            }
        }

        let first = self.producer.start().map_err(|e| self.fail(e.into()))?;
        self.started_at = Some(first.timestamp);
        self.submit(Job::Encode(first))?;
        self.shared.set_state(SessionState::Recording);

        info!("Recording started");
        Ok(())
    }

    /// Forward a damage notification (`rect` in source coordinates)
    ///
    /// Ignored unless recording.
    pub fn on_damage(&mut self, rect: Rect, more: bool) -> Result<()> {
        if !self.is_recording() {
            return Ok(());
        }
        let snapshot = self
            .producer
            .on_damage(rect, more)
            .map_err(|e| self.fail(e.into()))?;
        self.submit_snapshot(snapshot)
    }

    /// Forward a pointer move or cursor image change
    pub fn on_cursor_changed(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Ok(());
        }
        let snapshot = self
            .producer
            .on_cursor_changed()
            .map_err(|e| self.fail(e.into()))?;
        self.submit_snapshot(snapshot)
    }

    /// Forward a frame timer tick
    pub fn on_timer(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Ok(());
        }
        let snapshot = self.producer.on_timer().map_err(|e| self.fail(e.into()))?;
        self.submit_snapshot(snapshot)
    }

    /// Stop recording
    ///
    /// Queues the final job; the worker keeps encoding what is queued.
    /// Calling it again does nothing.
    pub fn stop(&mut self) -> Result<()> {
        if self.stop_requested {
            return Ok(());
        }
        self.stop_requested = true;
        self.producer.stop();

        let now = Instant::now();
        self.stopped_at = Some(now);
        self.shared.set_state(SessionState::Stopping);
        self.submit(Job::Quit(now))?;

        info!("Recording stopped, {} jobs left to encode", self.queue.len());
        Ok(())
    }

    /// Stop if needed and wait for the worker
    ///
    /// Returns the statistics of a successful recording. On failure a GIF
    /// or spool file created by the session is removed.
    pub fn finish(mut self) -> Result<SessionStats> {
        self.stop()?;

        match self.join() {
            Ok(()) => Ok(self.stats()),
            Err(e) => {
                if let Some(path) = self.output.take() {
                    remove_file(&path);
                }
                Err(e)
            }
        }
    }

    /// Whether the worker is still running
    ///
    /// Stays true after [`Session::stop`] until every queued job has been
    /// encoded and the sink closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.shared.finished.load(Ordering::Acquire)
    }

    /// Whether the producer is accepting events
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Whether [`Session::on_timer`] should be called
    #[must_use]
    pub fn is_timer_active(&self) -> bool {
        self.is_recording() && self.producer.is_timer_active()
    }

    /// Timer period
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.producer.interval()
    }

    /// Recorded area in source coordinates
    #[must_use]
    pub fn area(&self) -> Rect {
        self.area
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// First error that moved the session to [`SessionState::Error`]
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.shared.error.lock().clone()
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let duration = match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };

        SessionStats {
            frames_processed: self.shared.frames.load(Ordering::Relaxed),
            producer: self.producer.stats().clone(),
            damage: self.producer.damage_stats().clone(),
            queue: self.queue.stats(),
            duration,
        }
    }

    fn submit_snapshot(&mut self, snapshot: Option<Snapshot>) -> Result<()> {
        match snapshot {
            Some(snapshot) => self.submit(Job::Encode(snapshot)),
            None => Ok(()),
        }
    }

    fn submit(&mut self, job: Job) -> Result<()> {
        match self.queue.push(job) {
            Ok(()) => Ok(()),
            // The worker already failed; finish() reports it
            Err(_) if self.shared.state().is_terminal() => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Abort the recording after a producer-side failure
    fn fail(&mut self, err: SessionError) -> SessionError {
        error!("Recording failed: {}", err);
        self.shared.fail(err.to_string());
        self.producer.stop();
        self.queue.abort();
        err
    }

    fn join(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Err(SessionError::invalid_state("encoder worker already joined"));
        };

        match worker.join() {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                self.shared.fail(format!("encoder worker panicked: {message}"));
                Err(SessionError::WorkerPanicked(message))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }

        debug!("Dropping active session, waiting for the encoder");
        if let Err(e) = self.stop() {
            warn!("Failed to stop session on drop: {}", e);
        }
        if let Err(e) = self.join() {
            warn!("Session ended with error on drop: {}", e);
            if let Some(path) = self.output.take() {
                remove_file(&path);
            }
        }
    }
}

fn resolve_area(config: &SessionConfig, source: &dyn CaptureSource) -> Result<Rect> {
    let (width, height) = source.size();
    let wanted = config.area.unwrap_or(Rect::from_size(width, height));

    wanted.clip(width, height).ok_or_else(|| {
        SessionError::setup(format!(
            "area {wanted:?} lies outside the {width}x{height} source"
        ))
    })
}

fn remove_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Removed incomplete output {}", path.display()),
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(queue: &JobQueue, sink: Box<dyn FrameSink>, shared: Arc<Shared>) -> Result<()> {
    let _guard = FinishGuard(Arc::clone(&shared));
    // Dropped before the guard, so the output is closed once is_active() is false
    let mut sink = sink;

    let result = drain(queue, sink.as_mut(), &shared);
    match &result {
        Ok(()) => {
            shared.set_state(SessionState::Finished);
            info!(
                "Encoder worker finished after {} frames",
                shared.frames.load(Ordering::Relaxed)
            );
        }
        Err(e) => {
            queue.abort();
            shared.fail(e.to_string());
            match e {
                SessionError::NothingRecorded => warn!("Encoder worker stopped: {}", e),
                _ => error!("Encoder worker failed: {}", e),
            }
        }
    }

    result
}

fn drain(queue: &JobQueue, sink: &mut dyn FrameSink, shared: &Shared) -> Result<()> {
    loop {
        let Some(job) = queue.pop()? else {
            let reason = shared
                .error
                .lock()
                .clone()
                .unwrap_or_else(|| "job queue closed before stop".to_string());
            return Err(SessionError::invalid_state(format!("recording aborted: {reason}")));
        };

        debug!("Worker job: {}", job.kind());
        match job {
            Job::Quantize(snapshot) => {
                sink.setup(&snapshot)?;
                queue.release(snapshot.raster.into_vec());
            }
            Job::Encode(snapshot) => {
                sink.process(&snapshot)?;
                shared.frames.fetch_add(1, Ordering::Relaxed);
                queue.release(snapshot.raster.into_vec());
            }
            Job::Quit(timestamp) => return sink.close(timestamp),
        }
    }
}
