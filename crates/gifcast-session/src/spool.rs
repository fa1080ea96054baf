//! Spool Format
//!
//! Raw recordings for debugging and offline encoding. A spool file stores
//! exactly what the producer captured, so it can later be replayed into any
//! [`FrameSink`] with the original timing.
//!
//! # Layout
//!
//! ```text
//! header:  "GifcastSpool" │ endian 'L'|'B' │ width u32 │ height u32 │ bpp u8 │ layout u8
//! record:  elapsed ms u64 │ n u32 │ n × (x, y, w, h: i32) │ pixel rows of each rect
//! end:     elapsed ms u64 │ 0 u32
//! ```
//!
//! Integers are written in host byte order; readers accept both tags.
//! The job queue spills snapshots to disk using the same record encoding.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use gifcast_capture::{Raster, Region, Snapshot};
use gifcast_gifenc::{PixelFormat, Rect};
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::sink::FrameSink;

/// File identification
pub const MAGIC: &[u8; 12] = b"GifcastSpool";

/// Upper bound on rectangles per record
const MAX_RECTS: u32 = 1 << 16;

/// Byte order of a spool stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Little-endian integers, tag `L`
    Little,
    /// Big-endian integers, tag `B`
    Big,
}

impl Endian {
    /// Byte order of this host
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Little => b'L',
            Self::Big => b'B',
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'L' => Some(Self::Little),
            b'B' => Some(Self::Big),
            _ => None,
        }
    }

    fn read_u32<R: Read>(self, reader: &mut R) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(match self {
            Self::Little => u32::from_le_bytes(buf),
            Self::Big => u32::from_be_bytes(buf),
        })
    }

    fn read_i32<R: Read>(self, reader: &mut R) -> io::Result<i32> {
        self.read_u32(reader).map(|v| v as i32)
    }

    fn read_u64<R: Read>(self, reader: &mut R) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        Ok(match self {
            Self::Little => u64::from_le_bytes(buf),
            Self::Big => u64::from_be_bytes(buf),
        })
    }
}

/// Spool file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoolHeader {
    /// Recorded area width
    pub width: u32,

    /// Recorded area height
    pub height: u32,

    /// Pixel layout of all records
    pub format: PixelFormat,
}

fn layout_code(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Bgrx32 => 0,
        PixelFormat::Xrgb32 => 1,
        PixelFormat::Rgbx32 => 2,
        PixelFormat::Rgb24 => 3,
        PixelFormat::Bgr24 => 4,
    }
}

fn layout_from_code(code: u8) -> Option<PixelFormat> {
    match code {
        0 => Some(PixelFormat::Bgrx32),
        1 => Some(PixelFormat::Xrgb32),
        2 => Some(PixelFormat::Rgbx32),
        3 => Some(PixelFormat::Rgb24),
        4 => Some(PixelFormat::Bgr24),
        _ => None,
    }
}

/// Write a spool header in host byte order
pub fn write_header<W: Write>(writer: &mut W, header: &SpoolHeader) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&[Endian::native().tag()])?;
    writer.write_all(&header.width.to_ne_bytes())?;
    writer.write_all(&header.height.to_ne_bytes())?;
    writer.write_all(&[
        header.format.bytes_per_pixel() as u8,
        layout_code(header.format),
    ])
}

/// Read a spool header
pub fn read_header<R: Read>(reader: &mut R) -> Result<(SpoolHeader, Endian)> {
    let mut magic = [0u8; 13];
    reader.read_exact(&mut magic)?;
    if &magic[..12] != MAGIC {
        return Err(SessionError::spool("not a gifcast spool"));
    }
    let Some(endian) = Endian::from_tag(magic[12]) else {
        return Err(SessionError::spool(format!("unknown byte order tag {:#04x}", magic[12])));
    };

    let width = endian.read_u32(reader)?;
    let height = endian.read_u32(reader)?;

    let mut layout = [0u8; 2];
    reader.read_exact(&mut layout)?;
    let Some(format) = layout_from_code(layout[1]) else {
        return Err(SessionError::spool(format!("unknown pixel layout {}", layout[1])));
    };
    if usize::from(layout[0]) != format.bytes_per_pixel() {
        return Err(SessionError::spool(format!(
            "{} bytes per pixel do not match {:?}",
            layout[0], format
        )));
    }
    if width == 0 || height == 0 {
        return Err(SessionError::spool(format!("empty {width}x{height} recording")));
    }

    Ok((SpoolHeader { width, height, format }, endian))
}

/// Write one snapshot record, returning the bytes written
pub(crate) fn write_record<W: Write>(writer: &mut W, millis: u64, snapshot: &Snapshot) -> io::Result<u64> {
    let rects = snapshot.region.rects();
    let bpp = snapshot.raster.format().bytes_per_pixel();

    writer.write_all(&millis.to_ne_bytes())?;
    writer.write_all(&(rects.len() as u32).to_ne_bytes())?;
    for rect in rects {
        for v in [rect.x, rect.y, rect.width, rect.height] {
            writer.write_all(&(v as i32).to_ne_bytes())?;
        }
    }

    let mut written = 12 + 16 * rects.len() as u64;
    for rect in rects {
        let view = snapshot.view(*rect);
        for y in 0..rect.height {
            writer.write_all(view.row(y))?;
        }
        written += rect.area() * bpp as u64;
    }

    Ok(written)
}

/// Write the end-of-stream marker
pub(crate) fn write_end<W: Write>(writer: &mut W, millis: u64) -> io::Result<()> {
    writer.write_all(&millis.to_ne_bytes())?;
    writer.write_all(&0u32.to_ne_bytes())
}

/// One decoded record
#[derive(Debug)]
pub(crate) enum Record {
    /// Captured pixels
    Frame {
        millis: u64,
        region: Region,
        raster: Raster,
        origin: (u32, u32),
    },
    /// End of stream
    End { millis: u64 },
}

/// Read one record whose rectangles must lie inside `bounds`
pub(crate) fn read_record<R: Read>(
    reader: &mut R,
    endian: Endian,
    format: PixelFormat,
    bounds: Rect,
) -> Result<Record> {
    let millis = endian.read_u64(reader)?;
    let count = endian.read_u32(reader)?;
    if count == 0 {
        return Ok(Record::End { millis });
    }
    if count > MAX_RECTS {
        return Err(SessionError::spool(format!("{count} rectangles in one record")));
    }

    let mut rects = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut v = [0i32; 4];
        for value in &mut v {
            *value = endian.read_i32(reader)?;
        }
        let [x, y, w, h] = v.map(|v| u32::try_from(v).ok());
        let (Some(x), Some(y), Some(w), Some(h)) = (x, y, w, h) else {
            return Err(SessionError::spool(format!("negative rectangle {v:?}")));
        };

        let rect = Rect::new(x, y, w, h);
        if rect.is_empty() || !bounds.contains_rect(&rect) {
            return Err(SessionError::spool(format!("rectangle {rect:?} outside {bounds:?}")));
        }
        rects.push(rect);
    }

    let Some(extents) = rects.iter().copied().reduce(|a, b| a.merge(&b)) else {
        return Err(SessionError::spool("record without rectangles"));
    };

    let bpp = format.bytes_per_pixel();
    let mut raster = Raster::zeroed(extents.width, extents.height, format);
    let stride = raster.stride();
    let data = raster.data_mut();
    for rect in &rects {
        let row_len = rect.width as usize * bpp;
        for y in rect.y..rect.bottom() {
            let start = (y - extents.y) as usize * stride + (rect.x - extents.x) as usize * bpp;
            reader.read_exact(&mut data[start..start + row_len])?;
        }
    }

    Ok(Record::Frame {
        millis,
        region: Region::from_rects(rects),
        raster,
        origin: (extents.x, extents.y),
    })
}

/// Frame sink writing the spool format
pub struct SpoolSink<W: Write + Send> {
    writer: W,
    width: u32,
    height: u32,
    start: Option<Instant>,
    records: u64,
    bytes: u64,
}

impl<W: Write + Send> SpoolSink<W> {
    /// Create a sink for a `width` x `height` recording
    #[must_use]
    pub fn new(writer: W, width: u32, height: u32) -> Self {
        Self {
            writer,
            width,
            height,
            start: None,
            records: 0,
            bytes: 0,
        }
    }

    /// Records written so far
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Pixel and record bytes written so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Get the underlying writer
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn elapsed_millis(&self, timestamp: Instant) -> Result<u64> {
        let Some(start) = self.start else {
            return Err(SessionError::invalid_state("spool sink used before setup"));
        };
        Ok(timestamp.saturating_duration_since(start).as_millis() as u64)
    }
}

impl<W: Write + Send> FrameSink for SpoolSink<W> {
    fn setup(&mut self, first: &Snapshot) -> Result<()> {
        if self.start.is_some() {
            return Err(SessionError::invalid_state("spool sink already set up"));
        }

        write_header(
            &mut self.writer,
            &SpoolHeader {
                width: self.width,
                height: self.height,
                format: first.raster.format(),
            },
        )?;
        self.start = Some(first.timestamp);

        debug!("Spooling {}x{} recording", self.width, self.height);
        Ok(())
    }

    fn process(&mut self, snapshot: &Snapshot) -> Result<()> {
        let millis = self.elapsed_millis(snapshot.timestamp)?;
        self.bytes += write_record(&mut self.writer, millis, snapshot)?;
        self.records += 1;
        Ok(())
    }

    fn close(&mut self, timestamp: Instant) -> Result<()> {
        if self.records == 0 {
            return Err(SessionError::NothingRecorded);
        }

        let millis = self.elapsed_millis(timestamp)?;
        write_end(&mut self.writer, millis)?;
        self.writer.flush()?;

        info!("Spool closed: {} records, {} ms", self.records, millis);
        Ok(())
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    /// Records fed to the sink
    pub frames: u64,

    /// Recorded duration
    pub duration: Duration,
}

/// Feed a spool stream into `sink`, keeping the recorded timing
///
/// The first record is also used for [`FrameSink::setup`].
pub fn replay<R: Read>(mut reader: R, sink: &mut dyn FrameSink) -> Result<ReplayStats> {
    let (header, endian) = read_header(&mut reader)?;
    let bounds = Rect::from_size(header.width, header.height);
    let base = Instant::now();
    let mut stats = ReplayStats::default();

    info!(
        "Replaying {}x{} {:?} spool",
        header.width, header.height, header.format
    );

    loop {
        match read_record(&mut reader, endian, header.format, bounds)? {
            Record::Frame {
                millis,
                region,
                raster,
                origin,
            } => {
                let snapshot = Snapshot {
                    raster,
                    origin,
                    region,
                    timestamp: base + Duration::from_millis(millis),
                };
                if stats.frames == 0 {
                    sink.setup(&snapshot)?;
                }
                sink.process(&snapshot)?;
                stats.frames += 1;
            }
            Record::End { millis } => {
                stats.duration = Duration::from_millis(millis);
                sink.close(base + stats.duration)?;
                return Ok(stats);
            }
        }
    }
}
