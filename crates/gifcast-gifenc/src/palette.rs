//! Palette Quantization
//!
//! Reduces a truecolor raster to at most 256 indexed colors. The palette is
//! built once per recording from the first full frame and never changes
//! afterwards.
//!
//! # How It Works
//!
//! Distinct colors are counted first. If they fit, the palette holds
//! exactly those colors and every pixel maps back losslessly. Otherwise a
//! population-weighted median cut splits the color space into `max_colors`
//! boxes and each box contributes its weighted mean.
//!
//! Lookups hit an exact-match map first and fall back to a precomputed
//! nearest-color table with 5 bits per channel.
//!
//! # Usage
//!
//! ```rust
//! use gifcast_gifenc::{Palette, PixelFormat, RasterRef};
//!
//! let pixels = [0u8, 0, 0, 0, 255, 255, 255, 0];
//! let raster = RasterRef::new(&pixels, 2, 1, 8, PixelFormat::Bgrx32);
//!
//! let palette = Palette::quantize(raster, true, 255);
//! assert_eq!(palette.num_colors(), 2);
//! assert_eq!(palette.alpha_index(), Some(2));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::pixel::{pack_rgb, unpack_rgb, ByteOrder, RasterRef};

/// Maximum number of entries in a GIF color table
pub const MAX_TABLE_SIZE: usize = 256;

/// Smallest color table the encoder writes
pub const MIN_TABLE_SIZE: usize = 4;

/// Color stored in the slot reserved for transparency
pub const TRANSPARENT_COLOR: [u8; 3] = [0xBA, 0xDB, 0x01];

/// Bits kept per channel in the nearest-color table
const CELL_BITS: u32 = 5;
const CELL_COUNT: usize = 1 << (3 * CELL_BITS);

/// Indexed color palette
///
/// Immutable after construction. Entries are RGB; [`Palette::byte_order`]
/// records the triplet order of the rasters it was built for.
#[derive(Clone)]
pub struct Palette {
    /// Palette entries in index order
    colors: Vec<[u8; 3]>,

    /// Whether index `colors.len()` is reserved for transparency
    alpha: bool,

    /// Triplet order of the source rasters
    byte_order: ByteOrder,

    /// Exact color -> index
    exact: HashMap<u32, u8>,

    /// 15-bit cell -> nearest index
    nearest: Box<[u8]>,
}

impl Palette {
    /// Build a palette from explicit colors
    ///
    /// # Panics
    ///
    /// Panics if `colors` is empty or the colors plus the alpha slot do not
    /// fit in 256 entries.
    #[must_use]
    pub fn from_colors(colors: Vec<[u8; 3]>, byte_order: ByteOrder, alpha: bool) -> Self {
        assert!(!colors.is_empty(), "palette needs at least one color");
        assert!(
            colors.len() + usize::from(alpha) <= MAX_TABLE_SIZE,
            "{} colors do not fit a color table",
            colors.len()
        );

        let mut exact = HashMap::with_capacity(colors.len());
        for (index, color) in colors.iter().enumerate() {
            exact.entry(pack_rgb(color[0], color[1], color[2])).or_insert(index as u8);
        }

        let nearest = build_nearest_table(&colors);

        Self {
            colors,
            alpha,
            byte_order,
            exact,
            nearest,
        }
    }

    /// Quantize a raster into at most `max_colors` colors
    ///
    /// `max_colors` is clamped to what the color table can hold, which is
    /// 255 when `alpha` reserves a slot.
    #[must_use]
    pub fn quantize(raster: RasterRef<'_>, alpha: bool, max_colors: usize) -> Self {
        let limit = max_colors.clamp(1, MAX_TABLE_SIZE - usize::from(alpha));
        let format = raster.format();
        let bpp = format.bytes_per_pixel();

        let mut histogram: HashMap<u32, u32> = HashMap::new();
        for y in 0..raster.height() {
            for pixel in raster.row(y).chunks_exact(bpp) {
                *histogram.entry(format.read_rgb(pixel)).or_insert(0) += 1;
            }
        }

        let mut entries: Vec<(u32, u32)> = histogram.into_iter().collect();
        entries.sort_unstable_by_key(|&(color, _)| color);

        let colors = if entries.is_empty() {
            vec![[0, 0, 0]]
        } else if entries.len() <= limit {
            entries.iter().map(|&(color, _)| unpack_rgb(color)).collect()
        } else {
            median_cut(entries.clone(), limit)
        };

        debug!(
            "Quantized {} distinct colors into {} palette entries",
            entries.len(),
            colors.len()
        );

        Self::from_colors(colors, format.byte_order(), alpha)
    }

    /// Number of real colors (excluding the transparent slot)
    #[must_use]
    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    /// Whether a transparent index is reserved
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.alpha
    }

    /// Index of the transparent slot
    #[must_use]
    pub fn alpha_index(&self) -> Option<u8> {
        self.alpha.then(|| self.colors.len() as u8)
    }

    /// Triplet order of the rasters this palette expects
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Palette entries in index order
    #[must_use]
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Entries used by the palette including the transparent slot
    #[must_use]
    pub fn used_entries(&self) -> usize {
        self.colors.len() + usize::from(self.alpha)
    }

    /// Size of the written color table (power of two, at least 4)
    #[must_use]
    pub fn table_size(&self) -> usize {
        self.used_entries().next_power_of_two().max(MIN_TABLE_SIZE)
    }

    /// LZW minimum code size for this palette
    #[must_use]
    pub fn code_size(&self) -> u8 {
        self.table_size().trailing_zeros() as u8
    }

    /// Map a color to its palette index
    ///
    /// Returns the index and the `0x00RRGGBB` color stored at that index.
    #[must_use]
    pub fn lookup(&self, rgb: u32) -> (u8, u32) {
        let index = match self.exact.get(&rgb) {
            Some(&index) => index,
            None => self.nearest[cell_of(rgb)],
        };
        let [r, g, b] = self.colors[index as usize];
        (index, pack_rgb(r, g, b))
    }
}

impl fmt::Debug for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Palette")
            .field("num_colors", &self.colors.len())
            .field("alpha", &self.alpha)
            .field("byte_order", &self.byte_order)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Palette {
    fn eq(&self, other: &Self) -> bool {
        self.colors == other.colors && self.alpha == other.alpha && self.byte_order == other.byte_order
    }
}

fn cell_of(rgb: u32) -> usize {
    let [r, g, b] = unpack_rgb(rgb);
    let shift = 8 - CELL_BITS;
    ((r as usize >> shift) << (2 * CELL_BITS)) | ((g as usize >> shift) << CELL_BITS) | (b as usize >> shift)
}

fn build_nearest_table(colors: &[[u8; 3]]) -> Box<[u8]> {
    let shift = 8 - CELL_BITS;
    let half = 1i32 << (shift - 1);
    let mask = (1usize << CELL_BITS) - 1;

    (0..CELL_COUNT)
        .map(|cell| {
            let r = (((cell >> (2 * CELL_BITS)) & mask) as i32) << shift | half;
            let g = (((cell >> CELL_BITS) & mask) as i32) << shift | half;
            let b = ((cell & mask) as i32) << shift | half;

            let mut best = 0usize;
            let mut best_distance = i32::MAX;
            for (index, color) in colors.iter().enumerate() {
                let dr = r - i32::from(color[0]);
                let dg = g - i32::from(color[1]);
                let db = b - i32::from(color[2]);
                let distance = dr * dr + dg * dg + db * db;
                if distance < best_distance {
                    best_distance = distance;
                    best = index;
                }
            }
            best as u8
        })
        .collect()
}

/// A box of the median cut: a range of the entry list plus its widest channel
struct ColorBox {
    range: Range<usize>,
    channel: usize,
    spread: u8,
}

impl ColorBox {
    fn new(entries: &[(u32, u32)], range: Range<usize>) -> Self {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for &(color, _) in &entries[range.clone()] {
            let rgb = unpack_rgb(color);
            for c in 0..3 {
                min[c] = min[c].min(rgb[c]);
                max[c] = max[c].max(rgb[c]);
            }
        }

        let (channel, spread) = (0..3)
            .map(|c| (c, max[c] - min[c]))
            .max_by_key(|&(c, spread)| (spread, std::cmp::Reverse(c)))
            .unwrap_or((0, 0));

        Self { range, channel, spread }
    }
}

fn median_cut(mut entries: Vec<(u32, u32)>, max_colors: usize) -> Vec<[u8; 3]> {
    let mut boxes = vec![ColorBox::new(&entries, 0..entries.len())];

    while boxes.len() < max_colors {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.range.len() > 1)
            .max_by_key(|(i, b)| (b.spread, std::cmp::Reverse(*i)))
            .map(|(i, _)| i);
        let Some(index) = candidate else {
            break;
        };

        let ColorBox { range, channel, .. } = boxes.swap_remove(index);
        let slice = &mut entries[range.clone()];
        slice.sort_by_key(|&(color, _)| (unpack_rgb(color)[channel], color));

        let total: u64 = slice.iter().map(|&(_, count)| u64::from(count)).sum();
        let mut seen = 0u64;
        let mut split = slice.len() / 2;
        for (i, &(_, count)) in slice.iter().enumerate() {
            seen += u64::from(count);
            if seen * 2 >= total {
                split = i + 1;
                break;
            }
        }
        let split = range.start + split.clamp(1, slice.len() - 1);

        boxes.push(ColorBox::new(&entries, range.start..split));
        boxes.push(ColorBox::new(&entries, split..range.end));
    }

    boxes.sort_by_key(|b| b.range.start);
    boxes.iter().map(|b| weighted_mean(&entries[b.range.clone()])).collect()
}

fn weighted_mean(entries: &[(u32, u32)]) -> [u8; 3] {
    let mut sums = [0u64; 3];
    let mut total = 0u64;
    for &(color, count) in entries {
        let rgb = unpack_rgb(color);
        for c in 0..3 {
            sums[c] += u64::from(rgb[c]) * u64::from(count);
        }
        total += u64::from(count);
    }

    let total = total.max(1);
    sums.map(|sum| ((sum + total / 2) / total) as u8)
}
