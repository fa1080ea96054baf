//! # gifcast-gifenc
//!
//! Streaming animated GIF encoder built for screen recording: palette
//! quantization, error-diffusion dithering with frame deltas, and a
//! variable-width LZW compressor that writes straight into the container.
//!
//! This crate is part of the [gifcast](https://github.com/gifcast/gifcast)
//! workspace. The capture and session crates build on it, but it is usable
//! on its own for any indexed-color animation.
//!
//! # Features
//!
//! - **Palette Quantization**: Exact palettes for simple content, weighted median cut otherwise
//! - **Delta Dithering**: Only pixels that differ from the previous frame are emitted
//! - **Streaming Output**: One frame at a time, never the whole animation in memory
//! - **Transparency**: Unchanged pixels become transparent so frames stack
//! - **Looping**: Optional NETSCAPE2.0 infinite loop extension
//!
//! # Quick Start
//!
//! ```rust
//! use gifcast_gifenc::{ErrorDiffusion, GifEncoder, Palette, PixelFormat, RasterRef, Rect};
//!
//! # fn main() -> Result<(), gifcast_gifenc::GifError> {
//! // A 4x4 BGRx frame: black with one white pixel
//! let mut pixels = vec![0u8; 4 * 4 * 4];
//! pixels[..3].copy_from_slice(&[255, 255, 255]);
//! let raster = RasterRef::new(&pixels, 4, 4, 16, PixelFormat::Bgrx32);
//!
//! let palette = Palette::quantize(raster, true, 255);
//! let transparent = palette.alpha_index().unwrap_or(0);
//!
//! let mut encoder = GifEncoder::open(4, 4, Vec::new())?;
//! encoder.set_palette(palette.clone())?;
//!
//! let mut dither = ErrorDiffusion::new();
//! let mut full = vec![transparent; 16];
//! let mut frame = vec![0u8; 16];
//!
//! if let Some(changed) = dither.dither_delta(&mut frame, 4, &mut full, 4, &palette, raster) {
//!     let offset = (changed.y * 4 + changed.x) as usize;
//!     encoder.add_frame(changed, 10, &frame[offset..], 4)?;
//! }
//!
//! encoder.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Container Layout
//!
//! ```text
//! GIF89a │ screen descriptor │ global color table │ [NETSCAPE2.0]
//!        │ { graphic control │ image descriptor │ LZW sub-blocks }* │ 0x3B
//! ```
//!
//! Frames use disposal method 1 (keep), so every frame only has to cover
//! the rectangle that changed.

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod dither;
pub mod encoder;
pub mod error;
pub mod lzw;
pub mod palette;
pub mod pixel;
pub mod timing;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use dither::ErrorDiffusion;
pub use encoder::{EncoderState, EncoderStats, GifEncoder};
pub use error::{GifError, Result};
pub use lzw::LzwEncoder;
pub use palette::Palette;
pub use pixel::{pack_rgb, unpack_rgb, ByteOrder, PixelFormat, RasterRef, Rect};
pub use timing::DelayRounding;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
