//! Error-Diffusion Dithering
//!
//! Maps truecolor rasters onto a [`Palette`] with forward error diffusion,
//! either into a plain index buffer or as a delta against the running
//! full-frame index buffer.
//!
//! The quantization error of each channel is spread over the neighbours
//! with integer weights over 256: 113 to the right, 23 below-left, 79 below
//! and 41 below-right. Accumulated error is scaled back with `>> 8`.
//!
//! # Usage
//!
//! ```rust
//! use gifcast_gifenc::{ErrorDiffusion, Palette, PixelFormat, RasterRef};
//!
//! let pixels = [255u8, 255, 255, 0, 0, 0, 0, 0];
//! let raster = RasterRef::new(&pixels, 2, 1, 8, PixelFormat::Bgrx32);
//! let palette = Palette::quantize(raster, true, 255);
//!
//! let mut dither = ErrorDiffusion::new();
//! let mut target = [0u8; 2];
//! let mut full = [palette.alpha_index().unwrap_or(0); 2];
//!
//! let changed = dither.dither_delta(&mut target, 2, &mut full, 2, &palette, raster);
//! assert!(changed.is_some());
//!
//! // Nothing changed the second time around
//! let changed = dither.dither_delta(&mut target, 2, &mut full, 2, &palette, raster);
//! assert!(changed.is_none());
//! ```

use crate::palette::Palette;
use crate::pixel::{pack_rgb, unpack_rgb, ByteOrder, RasterRef, Rect};

const FACTOR_RIGHT: i32 = 113;
const FACTOR_BELOW_LEFT: i32 = 23;
const FACTOR_BELOW: i32 = 79;
const FACTOR_BELOW_RIGHT: i32 = 41;

/// Reusable error rows for dithering
///
/// Keeping one instance per worker avoids reallocating the rows for every
/// frame.
#[derive(Debug, Default)]
pub struct ErrorDiffusion {
    this_error: Vec<i32>,
    next_error: Vec<i32>,
}

impl ErrorDiffusion {
    /// Create an empty ditherer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dither `src` into `target`, one palette index per pixel
    ///
    /// # Panics
    ///
    /// Panics if `src` is empty, `target` is too small for `src` at
    /// `target_stride`, or the byte orders of `src` and `palette` differ.
    pub fn dither(&mut self, target: &mut [u8], target_stride: usize, palette: &Palette, src: RasterRef<'_>) {
        check_preconditions(palette, src);
        check_index_buffer(target.len(), target_stride, src);

        self.diffuse(palette, src, |x, y, index| {
            target[y * target_stride + x] = index;
        });
    }

    /// Dither `src` against the running full-frame buffer
    ///
    /// Pixels whose index matches `full` become transparent in `target`.
    /// All other pixels are written to both buffers. Returns the bounding
    /// box of the changed pixels relative to `src`, or `None` when nothing
    /// changed.
    ///
    /// # Panics
    ///
    /// Same as [`ErrorDiffusion::dither`], plus when `full` is too small or
    /// `palette` has no transparent index.
    pub fn dither_delta(
        &mut self,
        target: &mut [u8],
        target_stride: usize,
        full: &mut [u8],
        full_stride: usize,
        palette: &Palette,
        src: RasterRef<'_>,
    ) -> Option<Rect> {
        check_preconditions(palette, src);
        check_index_buffer(target.len(), target_stride, src);
        check_index_buffer(full.len(), full_stride, src);
        assert!(palette.has_alpha(), "delta dithering needs a palette with a transparent index");
        let transparent = palette.alpha_index().unwrap_or_default();

        let mut bounds: Option<(usize, usize, usize, usize)> = None;

        self.diffuse(palette, src, |x, y, index| {
            let shadow = &mut full[y * full_stride + x];
            let out = &mut target[y * target_stride + x];

            if *shadow == index {
                *out = transparent;
                return;
            }

            *shadow = index;
            *out = index;
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
            });
        });

        bounds.map(|(x1, y1, x2, y2)| {
            Rect::new(x1 as u32, y1 as u32, (x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32)
        })
    }

    fn diffuse(&mut self, palette: &Palette, src: RasterRef<'_>, mut emit: impl FnMut(usize, usize, u8)) {
        let width = src.width() as usize;
        let format = src.format();
        let bpp = format.bytes_per_pixel();
        let offset = format.triplet_offset();
        let order = format.byte_order();

        let len = (width + 2) * 3;
        self.this_error.clear();
        self.this_error.resize(len, 0);
        self.next_error.clear();
        self.next_error.resize(len, 0);

        for y in 0..src.height() {
            let row = src.row(y);
            let mut err = [0i32; 3];
            self.next_error[..6].fill(0);

            for x in 0..width {
                let sample = &row[x * bpp + offset..x * bpp + offset + 3];
                let carried = &self.this_error[3 + 3 * x..6 + 3 * x];

                let mut value = [0i32; 3];
                for c in 0..3 {
                    value[c] = (((err[c] + carried[c]) >> 8) + i32::from(sample[c])).clamp(0, 255);
                }

                let (index, chosen) = palette.lookup(to_rgb(order, value));
                emit(x, y as usize, index);

                let chosen = from_rgb(order, chosen);
                let next = &mut self.next_error[3 * x..3 * x + 9];
                for c in 0..3 {
                    let e = value[c] - chosen[c];
                    next[c] += FACTOR_BELOW_LEFT * e;
                    next[c + 3] += FACTOR_BELOW * e;
                    next[c + 6] = FACTOR_BELOW_RIGHT * e;
                    err[c] = FACTOR_RIGHT * e;
                }
            }

            std::mem::swap(&mut self.this_error, &mut self.next_error);
        }
    }
}

fn to_rgb(order: ByteOrder, t: [i32; 3]) -> u32 {
    match order {
        ByteOrder::Rgb => pack_rgb(t[0] as u8, t[1] as u8, t[2] as u8),
        ByteOrder::Bgr => pack_rgb(t[2] as u8, t[1] as u8, t[0] as u8),
    }
}

fn from_rgb(order: ByteOrder, rgb: u32) -> [i32; 3] {
    let [r, g, b] = unpack_rgb(rgb).map(i32::from);
    match order {
        ByteOrder::Rgb => [r, g, b],
        ByteOrder::Bgr => [b, g, r],
    }
}

fn check_preconditions(palette: &Palette, src: RasterRef<'_>) {
    assert!(
        src.width() > 0 && src.height() > 0,
        "cannot dither an empty {}x{} raster",
        src.width(),
        src.height()
    );
    assert_eq!(
        src.format().byte_order(),
        palette.byte_order(),
        "raster byte order does not match the palette"
    );
}

fn check_index_buffer(len: usize, stride: usize, src: RasterRef<'_>) {
    let width = src.width() as usize;
    assert!(stride >= width, "index stride {stride} shorter than width {width}");
    assert!(
        len >= stride * (src.height() as usize - 1) + width,
        "index buffer of {len} bytes too small for {}x{}",
        src.width(),
        src.height()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;

    const W: u32 = 8;
    const H: u32 = 6;

    fn test_raster() -> Vec<u8> {
        let mut data = vec![0u8; (W * H * 4) as usize];
        for (i, pixel) in data.chunks_exact_mut(4).enumerate() {
            let rgb = match i % 5 {
                0 => 0x0000_0000,
                1 => 0x00FF_0000,
                2 => 0x0000_FF00,
                3 => 0x0012_3456,
                _ => 0x00FF_FFFF,
            };
            PixelFormat::Bgrx32.write_rgb(pixel, rgb);
        }
        data
    }

    #[test]
    fn test_exact_palette_maps_losslessly() {
        let data = test_raster();
        let raster = RasterRef::new(&data, W, H, (W * 4) as usize, PixelFormat::Bgrx32);
        let palette = Palette::quantize(raster, false, 255);

        let mut target = vec![0u8; (W * H) as usize];
        ErrorDiffusion::new().dither(&mut target, W as usize, &palette, raster);

        for y in 0..H {
            for x in 0..W {
                let index = target[(y * W + x) as usize];
                let [r, g, b] = palette.colors()[index as usize];
                assert_eq!(pack_rgb(r, g, b), raster.rgb_at(x, y));
            }
        }
    }

    #[test]
    fn test_delta_is_idempotent() {
        let data = test_raster();
        let raster = RasterRef::new(&data, W, H, (W * 4) as usize, PixelFormat::Bgrx32);
        let palette = Palette::quantize(raster, true, 255);
        let alpha = palette.alpha_index().expect("alpha");

        let mut dither = ErrorDiffusion::new();
        let mut target = vec![0u8; (W * H) as usize];
        let mut full = vec![alpha; (W * H) as usize];

        let first = dither.dither_delta(&mut target, W as usize, &mut full, W as usize, &palette, raster);
        assert_eq!(first, Some(Rect::new(0, 0, W, H)));

        let second = dither.dither_delta(&mut target, W as usize, &mut full, W as usize, &palette, raster);
        assert_eq!(second, None);
        assert!(target.iter().all(|&i| i == alpha));
    }

    #[test]
    fn test_single_pixel_change() {
        let mut data = test_raster();
        let stride = (W * 4) as usize;
        let palette = Palette::quantize(RasterRef::new(&data, W, H, stride, PixelFormat::Bgrx32), true, 255);
        let alpha = palette.alpha_index().expect("alpha");

        let mut dither = ErrorDiffusion::new();
        let mut target = vec![0u8; (W * H) as usize];
        let mut full = vec![alpha; (W * H) as usize];
        let raster = RasterRef::new(&data, W, H, stride, PixelFormat::Bgrx32);
        dither.dither_delta(&mut target, W as usize, &mut full, W as usize, &palette, raster);

        // (3, 2) holds color index 4 of the pattern; swap it for another palette color
        let offset = 2 * stride + 3 * 4;
        let old = PixelFormat::Bgrx32.read_rgb(&data[offset..offset + 4]);
        let new = if old == 0x0012_3456 { 0x00FF_0000 } else { 0x0012_3456 };
        PixelFormat::Bgrx32.write_rgb(&mut data[offset..offset + 4], new);

        let raster = RasterRef::new(&data, W, H, stride, PixelFormat::Bgrx32);
        let changed = dither.dither_delta(&mut target, W as usize, &mut full, W as usize, &palette, raster);
        assert_eq!(changed, Some(Rect::new(3, 2, 1, 1)));
        assert_ne!(target[(2 * W + 3) as usize], alpha);
        assert_eq!(target.iter().filter(|&&i| i != alpha).count(), 1);
    }

    #[test]
    fn test_target_stride_respected() {
        let data = test_raster();
        let raster = RasterRef::new(&data, W, H, (W * 4) as usize, PixelFormat::Bgrx32);
        let palette = Palette::quantize(raster, false, 255);

        let stride = W as usize + 3;
        let mut target = vec![0xEEu8; stride * H as usize];
        ErrorDiffusion::new().dither(&mut target, stride, &palette, raster);

        for y in 0..H as usize {
            assert!(target[y * stride + W as usize..(y + 1) * stride].iter().all(|&b| b == 0xEE));
        }
    }

    #[test]
    fn test_error_diffusion_mixes_gray() {
        let data = vec![128u8; 16 * 16 * 3];
        let raster = RasterRef::new(&data, 16, 16, 48, PixelFormat::Rgb24);
        let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]], ByteOrder::Rgb, false);

        let mut target = vec![0u8; 256];
        ErrorDiffusion::new().dither(&mut target, 16, &palette, raster);

        let white = target.iter().filter(|&&i| i == 1).count();
        assert!((90..=166).contains(&white), "white pixels: {white}");
    }

    #[test]
    #[should_panic]
    fn test_byte_order_mismatch() {
        let data = vec![0u8; 12];
        let raster = RasterRef::new(&data, 1, 1, 4, PixelFormat::Bgrx32);
        let palette = Palette::from_colors(vec![[0, 0, 0]], ByteOrder::Rgb, false);

        let mut target = [0u8; 1];
        ErrorDiffusion::new().dither(&mut target, 1, &palette, raster);
    }
}
