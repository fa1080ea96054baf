//! Pixel Geometry and Raster Views
//!
//! Rectangles, truecolor pixel layouts and borrowed raster views shared by
//! the quantizer, the ditherer and the capture side of the pipeline.
//!
//! # Usage
//!
//! ```rust
//! use gifcast_gifenc::{PixelFormat, RasterRef, Rect};
//!
//! // 2x2 BGRx raster with a 16 byte row stride
//! let data = vec![0u8; 32];
//! let raster = RasterRef::new(&data, 2, 2, 16, PixelFormat::Bgrx32);
//!
//! let corner = raster.view(Rect::new(1, 1, 1, 1));
//! assert_eq!(corner.width(), 1);
//! ```

/// An axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: u32,

    /// Y coordinate of top-left corner
    pub y: u32,

    /// Rectangle width
    pub width: u32,

    /// Rectangle height
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle anchored at the origin
    #[must_use]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the rectangle covers no pixels
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge, saturating at `u32::MAX`
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `u32::MAX`
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    const fn right_wide(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    const fn bottom_wide(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Calculate area of the rectangle
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if rectangle contains a point
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && (x as u64) < self.right_wide()
            && y >= self.y
            && (y as u64) < self.bottom_wide()
    }

    /// Check if `other` lies entirely inside this rectangle
    #[must_use]
    pub const fn contains_rect(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right_wide() <= self.right_wide()
            && other.bottom_wide() <= self.bottom_wide()
    }

    /// Check if this rectangle overlaps with another
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as u64) < other.right_wide()
            && self.right_wide() > other.x as u64
            && (self.y as u64) < other.bottom_wide()
            && self.bottom_wide() > other.y as u64
    }

    /// Common area of two rectangles
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }

        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        Some(Self::new(x, y, x2 - x, y2 - y))
    }

    /// Bounding box of two rectangles
    ///
    /// Empty rectangles do not contribute.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());

        Self {
            x,
            y,
            width: x2 - x,
            height: y2 - y,
        }
    }

    /// Clip rectangle to `0..width` x `0..height`
    #[must_use]
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        self.intersect(&Self::from_size(width, height))
    }

    /// Parts of this rectangle not covered by `other`
    ///
    /// Yields at most four disjoint rectangles: full-width bands above and
    /// below `other`, then the left and right pieces of the middle band.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Vec<Self> {
        let Some(hole) = self.intersect(other) else {
            return if self.is_empty() { Vec::new() } else { vec![*self] };
        };

        let mut pieces = Vec::with_capacity(4);

        if hole.y > self.y {
            pieces.push(Self::new(self.x, self.y, self.width, hole.y - self.y));
        }
        if hole.bottom() < self.bottom() {
            pieces.push(Self::new(
                self.x,
                hole.bottom(),
                self.width,
                self.bottom() - hole.bottom(),
            ));
        }
        if hole.x > self.x {
            pieces.push(Self::new(self.x, hole.y, hole.x - self.x, hole.height));
        }
        if hole.right() < self.right() {
            pieces.push(Self::new(
                hole.right(),
                hole.y,
                self.right() - hole.right(),
                hole.height,
            ));
        }

        pieces
    }

    /// Move the rectangle by a positive offset
    #[must_use]
    pub const fn offset(&self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Express the rectangle relative to `origin`
    ///
    /// The rectangle must not start above or left of `origin`.
    #[must_use]
    pub fn relative_to(&self, origin_x: u32, origin_y: u32) -> Self {
        debug_assert!(self.x >= origin_x && self.y >= origin_y);
        Self::new(self.x - origin_x, self.y - origin_y, self.width, self.height)
    }
}

/// Order of the three color bytes inside a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Red first
    Rgb,
    /// Blue first
    Bgr,
}

/// Memory layout of a truecolor pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes: B, G, R, unused (xRGB32 on little-endian hosts)
    Bgrx32,
    /// 4 bytes: unused, R, G, B (xRGB32 on big-endian hosts)
    Xrgb32,
    /// 4 bytes: R, G, B, unused
    Rgbx32,
    /// 3 bytes: R, G, B
    Rgb24,
    /// 3 bytes: B, G, R
    Bgr24,
}

impl PixelFormat {
    /// Bytes per pixel
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgrx32 | Self::Xrgb32 | Self::Rgbx32 => 4,
            Self::Rgb24 | Self::Bgr24 => 3,
        }
    }

    /// Offset of the color triplet inside a pixel
    #[must_use]
    pub const fn triplet_offset(self) -> usize {
        match self {
            Self::Xrgb32 => 1,
            _ => 0,
        }
    }

    /// Order of the color triplet
    #[must_use]
    pub const fn byte_order(self) -> ByteOrder {
        match self {
            Self::Bgrx32 | Self::Bgr24 => ByteOrder::Bgr,
            Self::Xrgb32 | Self::Rgbx32 | Self::Rgb24 => ByteOrder::Rgb,
        }
    }

    /// Native 32-bit xRGB layout of this host
    #[must_use]
    pub const fn native_xrgb() -> Self {
        if cfg!(target_endian = "little") {
            Self::Bgrx32
        } else {
            Self::Xrgb32
        }
    }

    /// Read the color of one pixel as `0x00RRGGBB`
    #[must_use]
    pub fn read_rgb(self, pixel: &[u8]) -> u32 {
        let t = &pixel[self.triplet_offset()..];
        match self.byte_order() {
            ByteOrder::Rgb => pack_rgb(t[0], t[1], t[2]),
            ByteOrder::Bgr => pack_rgb(t[2], t[1], t[0]),
        }
    }

    /// Write `0x00RRGGBB` into one pixel, leaving padding bytes alone
    pub fn write_rgb(self, pixel: &mut [u8], rgb: u32) {
        let [r, g, b] = unpack_rgb(rgb);
        let t = &mut pixel[self.triplet_offset()..];
        match self.byte_order() {
            ByteOrder::Rgb => {
                t[0] = r;
                t[1] = g;
                t[2] = b;
            }
            ByteOrder::Bgr => {
                t[0] = b;
                t[1] = g;
                t[2] = r;
            }
        }
    }
}

/// Pack channels into `0x00RRGGBB`
#[must_use]
pub const fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Split `0x00RRGGBB` into `[r, g, b]`
#[must_use]
pub const fn unpack_rgb(rgb: u32) -> [u8; 3] {
    [(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]
}

/// Borrowed view of a truecolor raster
#[derive(Debug, Clone, Copy)]
pub struct RasterRef<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl<'a> RasterRef<'a> {
    /// Wrap pixel memory
    ///
    /// # Panics
    ///
    /// Panics if `stride` is shorter than a row or `data` cannot hold
    /// `height` rows.
    #[must_use]
    pub fn new(data: &'a [u8], width: u32, height: u32, stride: usize, format: PixelFormat) -> Self {
        let row = width as usize * format.bytes_per_pixel();
        assert!(stride >= row, "stride {stride} shorter than row of {row} bytes");
        assert!(
            data.len() >= required_len(width, height, stride, format),
            "raster buffer of {} bytes too small for {width}x{height}",
            data.len()
        );

        Self {
            data,
            width,
            height,
            stride,
            format,
        }
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

    /// Bytes between the starts of two rows
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
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Pixel bytes of row `y` (exactly `width * bpp` bytes)
    #[must_use]
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Color of the pixel at `(x, y)` as `0x00RRGGBB`
    #[must_use]
    pub fn rgb_at(&self, x: u32, y: u32) -> u32 {
        let bpp = self.format.bytes_per_pixel();
        let start = x as usize * bpp;
        self.format.read_rgb(&self.row(y)[start..start + bpp])
    }

    /// Sub-view covering `rect`
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not inside the raster.
    #[must_use]
    pub fn view(&self, rect: Rect) -> RasterRef<'a> {
        assert!(
            Rect::from_size(self.width, self.height).contains_rect(&rect),
            "view {rect:?} outside {}x{} raster",
            self.width,
            self.height
        );

        let start = rect.y as usize * self.stride + rect.x as usize * self.format.bytes_per_pixel();
        let len = required_len(rect.width, rect.height, self.stride, self.format);

        RasterRef {
            data: &self.data[start..start + len],
            width: rect.width,
            height: rect.height,
            stride: self.stride,
            format: self.format,
        }
    }
}

/// Minimum buffer length for a raster with the given geometry
#[must_use]
pub fn required_len(width: u32, height: u32, stride: usize, format: PixelFormat) -> usize {
    if width == 0 || height == 0 {
        0
    } else {
        stride * (height as usize - 1) + width as usize * format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_basic() {
        let rect = Rect::new(10, 20, 100, 50);

        assert_eq!(rect.area(), 5000);
        assert!(rect.contains(50, 40));
        assert!(!rect.contains(0, 0));
        assert!(!rect.contains(110, 20));
        assert!(Rect::new(3, 3, 0, 9).is_empty());
    }

    #[test]
    fn test_rect_edges_near_u32_max() {
        let canvas = Rect::from_size(4, 4);
        let far = Rect::new(u32::MAX, 0, 1, 1);

        assert_eq!(far.right(), u32::MAX);
        assert!(!canvas.contains_rect(&far));
        assert!(!canvas.overlaps(&far));
        assert_eq!(far.clip(4, 4), None);

        let wide = Rect::new(u32::MAX - 1, u32::MAX - 1, 4, 4);
        assert!(wide.contains(u32::MAX, u32::MAX));
        assert!(wide.overlaps(&Rect::new(u32::MAX, u32::MAX, 1, 1)));
        assert!(!Rect::new(0, 0, u32::MAX, u32::MAX).contains_rect(&wide));
    }

    #[test]
    fn test_rect_merge_and_intersect() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);

        assert_eq!(a.merge(&b), Rect::new(0, 0, 150, 150));
        assert_eq!(a.intersect(&b), Some(Rect::new(50, 50, 50, 50)));
        assert_eq!(a.intersect(&Rect::new(100, 0, 5, 5)), None);
        assert_eq!(Rect::default().merge(&b), b);
    }

    #[test]
    fn test_rect_clip() {
        let clipped = Rect::new(900, 500, 200, 200).clip(1000, 600);
        assert_eq!(clipped, Some(Rect::new(900, 500, 100, 100)));
        assert_eq!(Rect::new(1000, 0, 5, 5).clip(1000, 600), None);
    }

    #[test]
    fn test_rect_subtract() {
        let outer = Rect::new(0, 0, 10, 10);
        let hole = Rect::new(3, 4, 2, 2);

        let pieces = outer.subtract(&hole);
        assert_eq!(pieces.len(), 4);

        let total: u64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(total, 100 - 4);
        for (i, a) in pieces.iter().enumerate() {
            assert!(!a.overlaps(&hole));
            for b in &pieces[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }

        assert!(hole.subtract(&outer).is_empty());
        assert_eq!(outer.subtract(&Rect::new(20, 20, 1, 1)), vec![outer]);
    }

    #[test]
    fn test_pixel_format_roundtrip() {
        let mut px = [0u8; 4];
        PixelFormat::Bgrx32.write_rgb(&mut px, 0x0011_2233);
        assert_eq!(px, [0x33, 0x22, 0x11, 0]);
        assert_eq!(PixelFormat::Bgrx32.read_rgb(&px), 0x0011_2233);

        let mut px = [0xFFu8; 4];
        PixelFormat::Xrgb32.write_rgb(&mut px, 0x0011_2233);
        assert_eq!(px, [0xFF, 0x11, 0x22, 0x33]);
        assert_eq!(PixelFormat::Xrgb32.read_rgb(&px), 0x0011_2233);
    }

    #[test]
    fn test_raster_view() {
        // 3x2 RGB raster, stride padded to 10
        let mut data = vec![0u8; 20];
        PixelFormat::Rgb24.write_rgb(&mut data[10 + 6..], 0x00AB_CDEF);

        let raster = RasterRef::new(&data, 3, 2, 10, PixelFormat::Rgb24);
        assert_eq!(raster.rgb_at(2, 1), 0x00AB_CDEF);

        let view = raster.view(Rect::new(2, 1, 1, 1));
        assert_eq!(view.rgb_at(0, 0), 0x00AB_CDEF);
        assert_eq!(view.row(0).len(), 3);
    }

    #[test]
    #[should_panic]
    fn test_raster_too_small() {
        let data = vec![0u8; 7];
        let _ = RasterRef::new(&data, 2, 1, 8, PixelFormat::Bgrx32);
    }
}
