//! Capture Sources
//!
//! The [`CaptureSource`] trait is the boundary to whatever actually owns
//! the pixels: a window system, a compositor stream or an in-memory
//! framebuffer. Capability negotiation happens on the source's side before
//! it is handed to the producer; the producer only inspects the result.
//!
//! Change notifications are pushed by the surrounding event loop into
//! [`FrameProducer`](crate::FrameProducer); sources only answer queries.

use std::sync::Arc;

use gifcast_gifenc::{PixelFormat, Rect};
use parking_lot::Mutex;

use crate::error::{CaptureError, Result};

/// What a source can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Source reports changed rectangles
    pub damage: bool,

    /// Source exposes the pointer position and cursor image
    pub cursor: bool,
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self {
            damage: true,
            cursor: false,
        }
    }
}

/// Cursor image in premultiplied ARGB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32,

    /// Hotspot offset within the image
    pub hotspot: (i32, i32),

    /// `width * height` pixels as `0xAARRGGBB`, premultiplied
    pub pixels: Vec<u32>,

    /// Serial number identifying this image
    pub serial: u64,
}

/// A live pixel source
pub trait CaptureSource: Send {
    /// Size of the whole source
    fn size(&self) -> (u32, u32);

    /// Layout of the pixels written by [`CaptureSource::copy_rect`]
    fn pixel_format(&self) -> PixelFormat;

    /// Negotiated capabilities
    fn capabilities(&self) -> SourceCapabilities;

    /// Copy `rect` (source coordinates) into `dst`, rows `dst_stride` apart
    fn copy_rect(&mut self, rect: Rect, dst: &mut [u8], dst_stride: usize) -> Result<()>;

    /// Pointer position in source coordinates, if the pointer is on it
    fn pointer(&mut self) -> Option<(i32, i32)> {
        None
    }

    /// Serial of the current cursor image
    fn cursor_serial(&mut self) -> Option<u64> {
        None
    }

    /// Current cursor image
    fn cursor_image(&mut self) -> Option<CursorImage> {
        None
    }
}

struct Framebuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    capabilities: SourceCapabilities,
    pointer: Option<(i32, i32)>,
    cursor: Option<CursorImage>,
    copies: u64,
}

impl Framebuffer {
    fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride() + x as usize * self.format.bytes_per_pixel()
    }
}

/// In-memory framebuffer source
///
/// Clones share the same framebuffer, so a test or a synthetic scene can
/// keep drawing after handing a clone to the producer.
///
/// # Examples
///
/// ```rust
/// use gifcast_capture::{CaptureSource, MemorySource};
/// use gifcast_gifenc::{PixelFormat, Rect};
///
/// let source = MemorySource::new(4, 4, PixelFormat::Bgrx32);
/// source.fill_rect(Rect::new(1, 1, 2, 2), 0x00FF_0000);
///
/// let mut copy = source.clone();
/// let mut dst = vec![0u8; 8];
/// copy.copy_rect(Rect::new(1, 1, 2, 1), &mut dst, 8).unwrap();
/// assert_eq!(&dst[..4], &[0, 0, 0xFF, 0]);
/// ```
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<Framebuffer>>,
}

impl MemorySource {
    /// Create a black framebuffer
    #[must_use]
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            inner: Arc::new(Mutex::new(Framebuffer {
                width,
                height,
                format,
                data: vec![0; len],
                capabilities: SourceCapabilities::default(),
                pointer: None,
                cursor: None,
                copies: 0,
            })),
        }
    }

    /// Override the reported capabilities
    #[must_use]
    pub fn with_capabilities(self, capabilities: SourceCapabilities) -> Self {
        self.inner.lock().capabilities = capabilities;
        self
    }

    /// Fill a rectangle with one color, clipped to the framebuffer
    pub fn fill_rect(&self, rect: Rect, rgb: u32) {
        let mut fb = self.inner.lock();
        let Some(rect) = rect.clip(fb.width, fb.height) else {
            return;
        };

        let bpp = fb.format.bytes_per_pixel();
        let format = fb.format;
        for y in rect.y..rect.bottom() {
            let start = fb.offset(rect.x, y);
            let end = start + rect.width as usize * bpp;
            for pixel in fb.data[start..end].chunks_exact_mut(bpp) {
                format.write_rgb(pixel, rgb);
            }
        }
    }

    /// Set one pixel
    pub fn set_pixel(&self, x: u32, y: u32, rgb: u32) {
        self.fill_rect(Rect::new(x, y, 1, 1), rgb);
    }

    /// Read one pixel as `0x00RRGGBB`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let fb = self.inner.lock();
        let start = fb.offset(x, y);
        fb.format.read_rgb(&fb.data[start..start + fb.format.bytes_per_pixel()])
    }

    /// Move the pointer (`None` hides it)
    pub fn set_pointer(&self, position: Option<(i32, i32)>) {
        self.inner.lock().pointer = position;
    }

    /// Replace the cursor image
    pub fn set_cursor(&self, cursor: Option<CursorImage>) {
        self.inner.lock().cursor = cursor;
    }

    /// Number of `copy_rect` calls served
    #[must_use]
    pub fn copy_count(&self) -> u64 {
        self.inner.lock().copies
    }
}

impl CaptureSource for MemorySource {
    fn size(&self) -> (u32, u32) {
        let fb = self.inner.lock();
        (fb.width, fb.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.inner.lock().format
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.inner.lock().capabilities
    }

    fn copy_rect(&mut self, rect: Rect, dst: &mut [u8], dst_stride: usize) -> Result<()> {
        let mut fb = self.inner.lock();
        if rect.is_empty() || !Rect::from_size(fb.width, fb.height).contains_rect(&rect) {
            return Err(CaptureError::source_failed(format!(
                "{rect:?} outside {}x{} framebuffer",
                fb.width, fb.height
            )));
        }

        let row = rect.width as usize * fb.format.bytes_per_pixel();
        let needed = dst_stride * (rect.height as usize - 1) + row;
        if dst_stride < row || dst.len() < needed {
            return Err(CaptureError::source_failed(format!(
                "destination of {} bytes cannot hold {rect:?}",
                dst.len()
            )));
        }

        for (i, y) in (rect.y..rect.bottom()).enumerate() {
            let start = fb.offset(rect.x, y);
            dst[i * dst_stride..i * dst_stride + row].copy_from_slice(&fb.data[start..start + row]);
        }
        fb.copies += 1;

        Ok(())
    }

    fn pointer(&mut self) -> Option<(i32, i32)> {
        self.inner.lock().pointer
    }

    fn cursor_serial(&mut self) -> Option<u64> {
        self.inner.lock().cursor.as_ref().map(|c| c.serial)
    }

    fn cursor_image(&mut self) -> Option<CursorImage> {
        self.inner.lock().cursor.clone()
    }
}
