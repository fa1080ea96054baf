//! Frame Sinks
//!
//! A [`FrameSink`] is the consumer end of a recording. The encoder worker
//! feeds it every job in queue order:
//!
//! 1. `setup` once, with a snapshot of the whole capture area
//! 2. `process` for every recorded snapshot
//! 3. `close` once, with the time recording stopped
//!
//! [`GifSink`] turns the stream into an animated GIF, and
//! [`SpoolSink`](crate::spool::SpoolSink) stores it raw for later replay.

use std::io::Write;
use std::time::Instant;

use gifcast_capture::Snapshot;
use gifcast_gifenc::{DelayRounding, EncoderStats, ErrorDiffusion, GifEncoder, Palette, Rect};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

/// Maximum colors taken from the first snapshot; one entry stays reserved
/// for transparency
const MAX_COLORS: usize = 255;

/// Consumer of recorded snapshots
pub trait FrameSink: Send {
    /// Prepare for recording, using a snapshot of the whole area
    fn setup(&mut self, first: &Snapshot) -> Result<()>;

    /// Consume one recorded snapshot
    fn process(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Finish the recording at `timestamp`
    fn close(&mut self, timestamp: Instant) -> Result<()>;
}

/// Frame held back until the next frame's timestamp is known
#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    /// Changed area, if the frame changed anything
    area: Option<Rect>,

    /// When the frame was captured
    timestamp: Instant,
}

/// Animated GIF output
///
/// The palette is computed once from the setup snapshot. Every later
/// snapshot is delta-dithered against the image shown so far: unchanged
/// pixels become transparent and only the bounding box of real changes is
/// stored.
///
/// A frame's delay is the time until the next visible change, so each
/// frame is written one step late: when the next change arrives, or when
/// the sink is closed.
pub struct GifSink<W: Write + Send> {
    /// Output, until the encoder takes it over in setup
    writer: Option<W>,

    /// Encoder, after setup
    encoder: Option<GifEncoder<W>>,

    /// Canvas width
    width: u32,

    /// Canvas height
    height: u32,

    /// Emit the loop extension
    looping: bool,

    /// Frame delay conversion
    delay: DelayRounding,

    /// Ditherer state
    dither: ErrorDiffusion,

    /// Palette indices of the image shown so far
    shadow: Vec<u8>,

    /// Indices of the frame waiting to be written
    pending: Vec<u8>,

    /// Indices of the frame being built
    scratch: Vec<u8>,

    /// Frame waiting to be written
    pending_frame: Option<PendingFrame>,

    /// Snapshots that changed nothing visible
    skipped: u64,
}

impl<W: Write + Send> GifSink<W> {
    /// Create a sink for a `width` x `height` recording
    #[must_use]
    pub fn new(writer: W, width: u32, height: u32) -> Self {
        Self {
            writer: Some(writer),
            encoder: None,
            width,
            height,
            looping: false,
            delay: DelayRounding::default(),
            dither: ErrorDiffusion::new(),
            shadow: Vec::new(),
            pending: Vec::new(),
            scratch: Vec::new(),
            pending_frame: None,
            skipped: 0,
        }
    }

    /// Loop the animation forever
    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Use custom delay rounding
    #[must_use]
    pub fn with_delay(mut self, delay: DelayRounding) -> Self {
        self.delay = delay;
        self
    }

    /// Encoder statistics, after setup
    #[must_use]
    pub fn stats(&self) -> Option<&EncoderStats> {
        self.encoder.as_ref().map(GifEncoder::stats)
    }

    /// Snapshots that changed nothing visible
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> Option<W> {
        match self.encoder {
            Some(encoder) => Some(encoder.into_inner()),
            None => self.writer,
        }
    }

    /// Dither `snapshot` into the scratch buffer
    ///
    /// Returns the area that actually changed.
    fn encode_image(&mut self, snapshot: &Snapshot) -> Result<Option<Rect>> {
        let Some(encoder) = self.encoder.as_ref() else {
            return Err(SessionError::invalid_state("process called before setup"));
        };
        let Some(palette) = encoder.palette() else {
            return Err(SessionError::invalid_state("encoder has no palette"));
        };

        let canvas = Rect::from_size(self.width, self.height);
        if !canvas.contains_rect(&snapshot.bounds()) {
            return Err(SessionError::invalid_state(format!(
                "snapshot {:?} outside {}x{} canvas",
                snapshot.bounds(),
                self.width,
                self.height
            )));
        }
        if snapshot.raster.format().byte_order() != palette.byte_order() {
            return Err(SessionError::invalid_state("snapshot pixel format changed during recording"));
        }

        let Some(extents) = snapshot.region.extents() else {
            return Ok(None);
        };

        let width = self.width as usize;
        let transparent = palette.alpha_index().unwrap_or_default();

        // Everything in the extents that the region does not overwrite stays transparent
        for y in extents.y..extents.bottom() {
            let start = y as usize * width + extents.x as usize;
            self.scratch[start..start + extents.width as usize].fill(transparent);
        }

        let mut changed: Option<Rect> = None;
        for rect in snapshot.region.rects() {
            let at = rect.y as usize * width + rect.x as usize;
            let area = self.dither.dither_delta(
                &mut self.scratch[at..],
                width,
                &mut self.shadow[at..],
                width,
                palette,
                snapshot.view(*rect),
            );

            if let Some(area) = area {
                let area = area.offset(rect.x, rect.y);
                changed = Some(changed.map_or(area, |c| c.merge(&area)));
            }
        }

        Ok(changed)
    }

    /// Write the pending frame, shown until `until`
    fn write_pending(&mut self, until: Instant) -> Result<()> {
        let Some(PendingFrame {
            area: Some(area),
            timestamp,
        }) = self.pending_frame
        else {
            return Ok(());
        };
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(SessionError::invalid_state("write before setup"));
        };

        let elapsed = until.saturating_duration_since(timestamp);
        if elapsed < self.delay.minimum {
            warn!("Frame shown for only {:?}", elapsed);
        }
        let delay = self.delay.centiseconds(elapsed);

        let offset = area.y as usize * self.width as usize + area.x as usize;
        encoder.add_frame(area, delay, &self.pending[offset..], self.width as usize)?;

        debug!("Wrote frame {:?}, delay {} cs", area, delay);
        Ok(())
    }
}

impl<W: Write + Send> FrameSink for GifSink<W> {
    fn setup(&mut self, first: &Snapshot) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(SessionError::invalid_state("GIF sink already set up"));
        };

        let mut encoder = GifEncoder::open(self.width, self.height, writer)?;
        let palette = Palette::quantize(first.raster.as_raster_ref(), true, MAX_COLORS);
        let transparent = palette.alpha_index().unwrap_or_default();
        info!(
            "GIF palette: {} colors for {}x{}",
            palette.num_colors(),
            self.width,
            self.height
        );

        encoder.set_palette(palette)?;
        if self.looping {
            encoder.set_looping()?;
        }

        let len = self.width as usize * self.height as usize;
        self.shadow = vec![transparent; len];
        self.pending = vec![transparent; len];
        self.scratch = vec![transparent; len];
        self.encoder = Some(encoder);

        Ok(())
    }

    fn process(&mut self, snapshot: &Snapshot) -> Result<()> {
        let changed = self.encode_image(snapshot)?;

        match (self.pending_frame, changed) {
            // First frame: nothing to flush yet
            (None, area) => {
                std::mem::swap(&mut self.pending, &mut self.scratch);
                self.pending_frame = Some(PendingFrame {
                    area,
                    timestamp: snapshot.timestamp,
                });
            }
            (Some(_), Some(area)) => {
                self.write_pending(snapshot.timestamp)?;
                std::mem::swap(&mut self.pending, &mut self.scratch);
                self.pending_frame = Some(PendingFrame {
                    area: Some(area),
                    timestamp: snapshot.timestamp,
                });
            }
            (Some(_), None) => {
                self.skipped += 1;
            }
        }

        Ok(())
    }

    fn close(&mut self, timestamp: Instant) -> Result<()> {
        if self.encoder.is_none() {
            return Err(SessionError::NothingRecorded);
        }

        self.write_pending(timestamp)?;
        self.pending_frame = None;

        let Some(encoder) = self.encoder.as_mut() else {
            return Err(SessionError::NothingRecorded);
        };
        if encoder.stats().frames_written == 0 {
            return Err(SessionError::NothingRecorded);
        }
        encoder.close()?;

        let stats = encoder.stats();
        info!(
            "GIF closed: {} frames, {} bytes, {} snapshots skipped",
            stats.frames_written, stats.bytes_written, self.skipped
        );
        Ok(())
    }
}
