//! Streaming GIF Encoder
//!
//! Writes an animated GIF one frame at a time. Only the current frame's
//! index data is ever held by the caller; the encoder itself keeps nothing
//! but the palette and the LZW dictionary.
//!
//! # State Machine
//!
//! ```text
//! open() ──> HeaderWritten ──set_palette()──> PaletteWritten ──add_frame()──> Frames ──close()──> Closed
//!                                               │  set_looping()                 │ add_frame()
//!                                               └────────┘                       └──────┘
//! ```
//!
//! Any I/O failure moves the encoder to `Failed`, after which every call
//! returns [`GifError::InvalidState`].
//!
//! # Usage
//!
//! ```rust
//! use gifcast_gifenc::{ByteOrder, GifEncoder, Palette, Rect};
//!
//! # fn main() -> Result<(), gifcast_gifenc::GifError> {
//! let mut encoder = GifEncoder::open(2, 2, Vec::new())?;
//! encoder.set_palette(Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]], ByteOrder::Rgb, false))?;
//! encoder.set_looping()?;
//! encoder.add_frame(Rect::new(0, 0, 2, 2), 10, &[0, 1, 1, 0], 2)?;
//! encoder.close()?;
//!
//! let bytes = encoder.into_inner();
//! assert_eq!(&bytes[..6], b"GIF89a");
//! assert_eq!(bytes.last(), Some(&0x3B));
//! # Ok(())
//! # }
//! ```

use std::io::{self, Write};

use tracing::{debug, info};

use crate::error::{GifError, Result};
use crate::lzw::LzwEncoder;
use crate::palette::{Palette, TRANSPARENT_COLOR};
use crate::pixel::Rect;

const SIGNATURE: &[u8; 6] = b"GIF89a";
const EXTENSION_INTRODUCER: u8 = 0x21;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

/// Global color table present
const GLOBAL_TABLE_FLAG: u8 = 0x80;
/// Color resolution field set to 8 bits per primary
const COLOR_RESOLUTION: u8 = 0x70;
/// Disposal method 1: leave the frame in place
const DISPOSAL_KEEP: u8 = 1 << 2;
const TRANSPARENCY_FLAG: u8 = 0x01;

/// Encoder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Signature written, waiting for the palette
    HeaderWritten,
    /// Screen descriptor and color table written
    PaletteWritten,
    /// At least one frame written
    Frames,
    /// Trailer written and sink flushed
    Closed,
    /// A write failed; the stream is unusable
    Failed,
}

/// Encoder statistics
#[derive(Debug, Clone, Default)]
pub struct EncoderStats {
    /// Frames written
    pub frames_written: u64,

    /// Total bytes handed to the sink
    pub bytes_written: u64,

    /// Pixels compressed across all frames
    pub pixels_encoded: u64,
}

/// Streaming animated GIF writer
pub struct GifEncoder<W: Write> {
    sink: W,
    width: u16,
    height: u16,
    state: EncoderState,
    palette: Option<Palette>,
    lzw: LzwEncoder,
    stats: EncoderStats,
}

impl<W: Write> GifEncoder<W> {
    /// Start a GIF stream with the given logical screen size
    ///
    /// Writes the signature immediately.
    pub fn open(width: u32, height: u32, mut sink: W) -> Result<Self> {
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(GifError::DimensionsTooLarge { width, height });
        };
        if w == 0 || h == 0 {
            return Err(GifError::InvalidDimensions { width, height });
        }

        sink.write_all(SIGNATURE)?;
        debug!("Opened {}x{} GIF stream", width, height);

        Ok(Self {
            sink,
            width: w,
            height: h,
            state: EncoderState::HeaderWritten,
            palette: None,
            lzw: LzwEncoder::new(),
            stats: EncoderStats {
                bytes_written: SIGNATURE.len() as u64,
                ..EncoderStats::default()
            },
        })
    }

    /// Register the global palette
    ///
    /// Writes the logical screen descriptor and the global color table.
    /// Only valid once, right after `open()`.
    pub fn set_palette(&mut self, palette: Palette) -> Result<()> {
        self.expect_state(&[EncoderState::HeaderWritten], "set_palette")?;

        let table_size = palette.table_size();
        let size_bits = table_size.trailing_zeros() as u8 - 1;

        let mut out = Vec::with_capacity(7 + table_size * 3);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.push(GLOBAL_TABLE_FLAG | COLOR_RESOLUTION | size_bits);
        out.push(0); // background color index
        out.push(0); // pixel aspect ratio

        for color in palette.colors() {
            out.extend_from_slice(color);
        }
        if palette.has_alpha() {
            out.extend_from_slice(&TRANSPARENT_COLOR);
        }
        out.resize(7 + table_size * 3, 0);

        self.write(&out)?;
        debug!(
            "Wrote color table: {} colors, alpha {}, {} entries",
            palette.num_colors(),
            palette.has_alpha(),
            table_size
        );

        self.palette = Some(palette);
        self.state = EncoderState::PaletteWritten;
        Ok(())
    }

    /// Mark the animation as looping forever
    ///
    /// Must be called after the palette and before the first frame.
    pub fn set_looping(&mut self) -> Result<()> {
        self.expect_state(&[EncoderState::PaletteWritten], "set_looping")?;

        let mut out = Vec::with_capacity(19);
        out.extend_from_slice(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, 11]);
        out.extend_from_slice(b"NETSCAPE2.0");
        out.extend_from_slice(&[3, 1, 0, 0, 0]);

        self.write(&out)
    }

    /// Append one frame
    ///
    /// `data` holds one palette index per pixel of `frame`, rows `stride`
    /// bytes apart. `delay_cs` is the display time in centiseconds.
    pub fn add_frame(&mut self, frame: Rect, delay_cs: u16, data: &[u8], stride: usize) -> Result<()> {
        self.expect_state(&[EncoderState::PaletteWritten, EncoderState::Frames], "add_frame")?;
        self.check_frame(frame, data, stride)?;

        let (transparent_flag, transparent_index, code_size) = match &self.palette {
            Some(palette) => match palette.alpha_index() {
                Some(index) => (TRANSPARENCY_FLAG, index, palette.code_size()),
                None => (0, 0, palette.code_size()),
            },
            None => return Err(GifError::invalid_state("add_frame called without a palette")),
        };

        let mut header = Vec::with_capacity(19);
        header.extend_from_slice(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, 4]);
        header.push(DISPOSAL_KEEP | transparent_flag);
        header.extend_from_slice(&delay_cs.to_le_bytes());
        header.push(transparent_index);
        header.push(0);

        header.push(IMAGE_SEPARATOR);
        for value in [frame.x, frame.y, frame.width, frame.height] {
            header.extend_from_slice(&(value as u16).to_le_bytes());
        }
        header.push(0); // no local table, not interlaced
        header.push(code_size);

        self.write(&header)?;

        let width = frame.width as usize;
        let pixels = data
            .chunks(stride)
            .take(frame.height as usize)
            .flat_map(|row| row[..width].iter().copied());

        match self.lzw.encode_blocks(code_size, pixels, &mut self.sink) {
            Ok(written) => self.stats.bytes_written += written,
            Err(e) => return Err(self.fail(e)),
        }

        self.stats.frames_written += 1;
        self.stats.pixels_encoded += frame.area();
        self.state = EncoderState::Frames;

        debug!(
            "Frame {}: {}x{} at {},{} delay {}cs",
            self.stats.frames_written, frame.width, frame.height, frame.x, frame.y, delay_cs
        );
        Ok(())
    }

    /// Write the trailer and flush the sink
    pub fn close(&mut self) -> Result<()> {
        self.expect_state(
            &[
                EncoderState::HeaderWritten,
                EncoderState::PaletteWritten,
                EncoderState::Frames,
            ],
            "close",
        )?;

        self.write(&[TRAILER])?;
        if let Err(e) = self.sink.flush() {
            return Err(self.fail(e));
        }

        self.state = EncoderState::Closed;
        self.palette = None;
        info!(
            "GIF stream closed: {} frames, {} bytes",
            self.stats.frames_written, self.stats.bytes_written
        );
        Ok(())
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Registered palette, if any
    #[must_use]
    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref()
    }

    /// Logical screen size
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (u32::from(self.width), u32::from(self.height))
    }

    /// Encoder statistics
    #[must_use]
    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }

    /// Borrow the sink
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Recover the sink
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn expect_state(&self, allowed: &[EncoderState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GifError::invalid_state(format!(
                "{operation} not allowed in state {:?}",
                self.state
            )))
        }
    }

    fn check_frame(&self, frame: Rect, data: &[u8], stride: usize) -> Result<()> {
        if frame.is_empty() {
            return Err(GifError::InvalidDimensions {
                width: frame.width,
                height: frame.height,
            });
        }

        let (canvas_width, canvas_height) = self.size();
        if !Rect::from_size(canvas_width, canvas_height).contains_rect(&frame) {
            return Err(GifError::FrameOutOfBounds {
                x: frame.x,
                y: frame.y,
                width: frame.width,
                height: frame.height,
                canvas_width,
                canvas_height,
            });
        }

        let width = frame.width as usize;
        let needed = stride
            .checked_mul(frame.height as usize - 1)
            .and_then(|rows| rows.checked_add(width));
        if stride < width || needed.map_or(true, |needed| data.len() < needed) {
            return Err(GifError::invalid_state(format!(
                "frame data of {} bytes with stride {stride} cannot hold {}x{}",
                data.len(),
                frame.width,
                frame.height
            )));
        }

        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.sink.write_all(bytes) {
            Ok(()) => {
                self.stats.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, e: io::Error) -> GifError {
        self.state = EncoderState::Failed;
        GifError::Io(e)
    }
}
