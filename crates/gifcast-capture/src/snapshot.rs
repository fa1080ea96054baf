//! Raster snapshots handed from the producer to the encoder
//!
//! A [`Snapshot`] owns a copy of the changed pixels, the damage region
//! they belong to and the time they were taken. Pixel buffers come from a
//! [`BufferPool`] so the consumer can hand them back for reuse.

use std::time::Instant;

use gifcast_gifenc::{pixel::required_len, PixelFormat, RasterRef, Rect};

use crate::damage::Region;

/// Owned truecolor raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl Raster {
    /// Wrap a pixel buffer
    ///
    /// # Panics
    ///
    /// Panics if `data` cannot hold `height` rows of `stride` bytes.
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32, stride: usize, format: PixelFormat) -> Self {
        assert!(stride >= width as usize * format.bytes_per_pixel());
        assert!(data.len() >= required_len(width, height, stride, format));
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    /// Tightly packed raster of the given size
    #[must_use]
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self::new(vec![0; stride * height as usize], width, height, stride, format)
    }

    /// Raster width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Raster height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between rows
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel layout
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel memory
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel memory
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrowed view of the whole raster
    #[must_use]
    pub fn as_raster_ref(&self) -> RasterRef<'_> {
        RasterRef::new(&self.data, self.width, self.height, self.stride, self.format)
    }

    /// Give the buffer back
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// A timestamped copy of the changed part of the capture area
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Pixels of the region's bounding box
    pub raster: Raster,

    /// Position of the raster's top-left pixel in the capture area
    pub origin: (u32, u32),

    /// Changed pixels, in capture-area coordinates
    pub region: Region,

    /// When the pixels were copied
    pub timestamp: Instant,
}

impl Snapshot {
    /// Area covered by the raster, in capture-area coordinates
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.origin.0, self.origin.1, self.raster.width(), self.raster.height())
    }

    /// View of `rect` (capture-area coordinates) inside the raster
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not inside [`Snapshot::bounds`].
    #[must_use]
    pub fn view(&self, rect: Rect) -> RasterRef<'_> {
        self.raster
            .as_raster_ref()
            .view(rect.relative_to(self.origin.0, self.origin.1))
    }
}

/// Source of reusable pixel buffers
pub trait BufferPool: Send + Sync {
    /// A buffer of exactly `len` bytes; contents are unspecified
    fn acquire(&self, len: usize) -> Vec<u8>;

    /// Return a buffer for reuse
    fn release(&self, buffer: Vec<u8>);
}

/// Pool that always allocates and never keeps anything
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPool;

impl BufferPool for HeapPool {
    fn acquire(&self, len: usize) -> Vec<u8> {
        vec![0; len]
    }

    fn release(&self, _buffer: Vec<u8>) {}
}
