//! Cursor Overlay
//!
//! Most capture sources deliver window contents without the pointer. The
//! overlay tracks the pointer position and cursor image, turns every move
//! into damage covering the old and the new cursor box, and paints the
//! cursor into each snapshot.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gifcast_capture::cursor::CursorOverlay;
//!
//! let mut overlay = CursorOverlay::new();
//!
//! // Poll the source; damage comes back in capture-area coordinates
//! if let Some(rect) = overlay.update(&mut source, area) {
//!     tracker.add(rect);
//! }
//!
//! // After copying pixels into a snapshot
//! overlay.composite(&mut snapshot, area);
//! ```

use std::sync::Arc;

use gifcast_gifenc::Rect;

use crate::snapshot::Snapshot;
use crate::source::{CaptureSource, CursorImage};

/// Cursor overlay statistics
#[derive(Debug, Clone, Default)]
pub struct CursorStats {
    /// Pointer moves observed
    pub position_updates: u64,

    /// Cursor image changes observed
    pub image_updates: u64,

    /// Image changes served from the cache
    pub cache_hits: u64,

    /// Snapshots the cursor was painted into
    pub composites: u64,
}

impl CursorStats {
    /// Fraction of image changes served from the cache
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.image_updates == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.image_updates as f64
        }
    }
}

/// Tracks the pointer and paints it into snapshots
pub struct CursorOverlay {
    /// Pointer position in source coordinates
    position: Option<(i32, i32)>,

    /// Serial of the current image
    serial: Option<u64>,

    /// Current image
    image: Option<Arc<CursorImage>>,

    /// Recently seen images, oldest first
    image_cache: Vec<Arc<CursorImage>>,

    /// Maximum cache entries
    max_cache_entries: usize,

    /// Statistics
    stats: CursorStats,
}

impl CursorOverlay {
    /// Create an overlay with no cursor
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: None,
            serial: None,
            image: None,
            image_cache: Vec::new(),
            max_cache_entries: 8,
            stats: CursorStats::default(),
        }
    }

    /// Create with custom cache size
    #[must_use]
    pub fn with_cache_size(max_entries: usize) -> Self {
        Self {
            max_cache_entries: max_entries.max(1),
            ..Self::new()
        }
    }

    /// Poll the source for pointer and cursor changes
    ///
    /// Returns the damage caused by the change (old and new cursor boxes,
    /// clipped to `area` and relative to it), or `None` if nothing moved.
    pub fn update(&mut self, source: &mut dyn CaptureSource, area: Rect) -> Option<Rect> {
        let position = source.pointer();
        let serial = source.cursor_serial();

        if position == self.position && serial == self.serial {
            return None;
        }

        let before = self.bounds(area);

        if position != self.position {
            self.position = position;
            self.stats.position_updates += 1;
        }

        if serial != self.serial {
            self.serial = serial;
            self.stats.image_updates += 1;
            let image = match serial {
                Some(serial) => match self.cached(serial) {
                    Some(image) => Some(image),
                    None => source.cursor_image().map(|image| {
                        let image = Arc::new(image);
                        self.cache_image(Arc::clone(&image));
                        image
                    }),
                },
                None => None,
            };
            self.image = image;
        }

        let after = self.bounds(area);
        match (before, after) {
            (Some(a), Some(b)) => Some(a.merge(&b)),
            (a, b) => a.or(b),
        }
    }

    /// Cursor box in capture-area coordinates, if visible inside `area`
    #[must_use]
    pub fn bounds(&self, area: Rect) -> Option<Rect> {
        let ((x, y), image) = (self.position?, self.image.as_ref()?);

        let left = i64::from(x) - i64::from(image.hotspot.0) - i64::from(area.x);
        let top = i64::from(y) - i64::from(image.hotspot.1) - i64::from(area.y);
        let right = (left + i64::from(image.width)).min(i64::from(area.width));
        let bottom = (top + i64::from(image.height)).min(i64::from(area.height));
        let (left, top) = (left.max(0), top.max(0));

        if left >= right || top >= bottom {
            return None;
        }

        Some(Rect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Paint the cursor into the snapshot's raster
    pub fn composite(&mut self, snapshot: &mut Snapshot, area: Rect) {
        let (Some(cursor_box), Some(image)) = (self.bounds(area), self.image.as_ref()) else {
            return;
        };
        let Some(target) = cursor_box.intersect(&snapshot.bounds()) else {
            return;
        };
        let Some((x, y)) = self.position else {
            return;
        };

        // Top-left of the cursor image in capture-area coordinates
        let image_left = i64::from(x) - i64::from(image.hotspot.0) - i64::from(area.x);
        let image_top = i64::from(y) - i64::from(image.hotspot.1) - i64::from(area.y);

        let format = snapshot.raster.format();
        let bpp = format.bytes_per_pixel();
        let stride = snapshot.raster.stride();
        let (origin_x, origin_y) = snapshot.origin;
        let data = snapshot.raster.data_mut();

        for ty in target.y..target.bottom() {
            let iy = (i64::from(ty) - image_top) as usize;
            for tx in target.x..target.right() {
                let ix = (i64::from(tx) - image_left) as usize;
                let argb = image.pixels[iy * image.width as usize + ix];
                let alpha = argb >> 24;
                if alpha == 0 {
                    continue;
                }

                let at = (ty - origin_y) as usize * stride + (tx - origin_x) as usize * bpp;
                let pixel = &mut data[at..at + bpp];
                let blended = blend_over(argb, format.read_rgb(pixel));
                format.write_rgb(pixel, blended);
            }
        }

        self.stats.composites += 1;
    }

    /// Current pointer position
    #[must_use]
    pub fn position(&self) -> Option<(i32, i32)> {
        self.position
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &CursorStats {
        &self.stats
    }

    fn cached(&mut self, serial: u64) -> Option<Arc<CursorImage>> {
        let image = self.image_cache.iter().find(|c| c.serial == serial).cloned();
        if image.is_some() {
            self.stats.cache_hits += 1;
        }
        image
    }

    fn cache_image(&mut self, image: Arc<CursorImage>) {
        // Remove oldest if at capacity
        if self.image_cache.len() >= self.max_cache_entries {
            self.image_cache.remove(0);
        }
        self.image_cache.push(image);
    }
}

impl Default for CursorOverlay {
    fn default() -> Self {
        Self::new()
    }
}

/// Premultiplied `src` over opaque `dst`
fn blend_over(src: u32, dst: u32) -> u32 {
    let inverse = 255 - (src >> 24);
    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        (s + (d * inverse + 127) / 255).min(255)
    };
    (channel(16) << 16) | (channel(8) << 8) | channel(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::Region;
    use crate::snapshot::Raster;
    use crate::source::MemorySource;
    use gifcast_gifenc::PixelFormat;
    use std::time::Instant;

    fn arrow(serial: u64) -> CursorImage {
        CursorImage {
            width: 2,
            height: 2,
            hotspot: (1, 1),
            pixels: vec![0xFFFF_FFFF, 0x0000_0000, 0x8080_0000, 0xFF00_00FF],
            serial,
        }
    }

    #[test]
    fn test_update_reports_old_and_new_boxes() {
        let source = MemorySource::new(20, 20, PixelFormat::Bgrx32);
        let mut handle = source.clone();
        let area = Rect::new(0, 0, 20, 20);
        let mut overlay = CursorOverlay::new();

        assert_eq!(overlay.update(&mut handle, area), None);

        source.set_cursor(Some(arrow(1)));
        source.set_pointer(Some((5, 5)));
        assert_eq!(overlay.update(&mut handle, area), Some(Rect::new(4, 4, 2, 2)));
        assert_eq!(overlay.update(&mut handle, area), None);

        source.set_pointer(Some((10, 6)));
        assert_eq!(overlay.update(&mut handle, area), Some(Rect::new(4, 4, 7, 3)));

        source.set_pointer(None);
        assert_eq!(overlay.update(&mut handle, area), Some(Rect::new(9, 5, 2, 2)));
        assert_eq!(overlay.stats().position_updates, 3);
    }

    #[test]
    fn test_bounds_clipped_to_area() {
        let source = MemorySource::new(50, 50, PixelFormat::Bgrx32);
        let mut handle = source.clone();
        let area = Rect::new(10, 10, 20, 20);
        let mut overlay = CursorOverlay::new();

        source.set_cursor(Some(arrow(1)));
        source.set_pointer(Some((10, 10)));
        assert_eq!(overlay.update(&mut handle, area), Some(Rect::new(0, 0, 1, 1)));

        source.set_pointer(Some((40, 40)));
        assert_eq!(overlay.update(&mut handle, area), Some(Rect::new(0, 0, 1, 1)));
        assert_eq!(overlay.bounds(area), None);
    }

    #[test]
    fn test_image_cache() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32);
        let mut handle = source.clone();
        let area = Rect::new(0, 0, 10, 10);
        let mut overlay = CursorOverlay::with_cache_size(2);
        source.set_pointer(Some((3, 3)));

        for serial in [1, 2, 1, 3, 1] {
            source.set_cursor(Some(arrow(serial)));
            overlay.update(&mut handle, area);
        }

        let stats = overlay.stats();
        assert_eq!(stats.image_updates, 5);
        // 3 pushes 1 out of the cache
        assert_eq!(stats.cache_hits, 1);
        assert!((stats.cache_hit_rate() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_composite_blends() {
        let source = MemorySource::new(8, 8, PixelFormat::Bgrx32);
        let mut handle = source.clone();
        let area = Rect::new(0, 0, 8, 8);
        let mut overlay = CursorOverlay::new();
        source.set_cursor(Some(arrow(1)));
        source.set_pointer(Some((3, 3)));
        overlay.update(&mut handle, area);

        let mut raster = Raster::zeroed(4, 4, PixelFormat::Bgrx32);
        for pixel in raster.data_mut().chunks_exact_mut(4) {
            PixelFormat::Bgrx32.write_rgb(pixel, 0x0000_FF00);
        }
        let mut snapshot = Snapshot {
            raster,
            origin: (1, 1),
            region: Region::from_rect(Rect::new(1, 1, 4, 4)),
            timestamp: Instant::now(),
        };

        overlay.composite(&mut snapshot, area);
        let view = snapshot.raster.as_raster_ref();

        // Cursor occupies (2,2)-(3,3) in area coordinates -> (1,1)-(2,2) in the raster
        assert_eq!(view.rgb_at(1, 1), 0x00FF_FFFF);
        assert_eq!(view.rgb_at(2, 1), 0x0000_FF00);
        assert_eq!(view.rgb_at(1, 2), 0x0080_7F00);
        assert_eq!(view.rgb_at(2, 2), 0x0000_00FF);
        assert_eq!(view.rgb_at(0, 0), 0x0000_FF00);
        assert_eq!(overlay.stats().composites, 1);
    }
}
