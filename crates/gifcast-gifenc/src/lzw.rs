//! Variable-Width LZW Compression
//!
//! GIF flavoured LZW: codes are packed LSB first, widths grow from
//! `code_size + 1` up to 12 bits, and the dictionary is cleared with a
//! CLEAR code once the 12-bit code space is exhausted.
//!
//! The dictionary lives in an open-addressing hash table of 5003 slots
//! keyed by `(prefix << 8) | byte`. Every call starts with a fresh
//! dictionary, so each frame is independently decodable.

use std::io::{self, Write};

const HASH_SIZE: usize = 5003;
const HASH_STEP: usize = 0xF;
const MAX_CODE_WIDTH: u32 = 12;
const MAX_CODE: u32 = (1 << MAX_CODE_WIDTH) - 1;
const EMPTY: u32 = u32::MAX;

/// Longest data sub-block of the container
pub const MAX_SUB_BLOCK: usize = 255;

#[derive(Debug, Clone, Copy)]
struct Slot {
    key: u32,
    code: u32,
}

const EMPTY_SLOT: Slot = Slot { key: EMPTY, code: 0 };

/// Destination for packed code bytes
trait ByteSink {
    fn put(&mut self, byte: u8) -> io::Result<()>;
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// Splits a byte stream into length-prefixed sub-blocks
struct SubBlocks<'w, W: Write> {
    sink: &'w mut W,
    block: [u8; MAX_SUB_BLOCK],
    len: usize,
    written: u64,
}

impl<'w, W: Write> SubBlocks<'w, W> {
    fn new(sink: &'w mut W) -> Self {
        Self {
            sink,
            block: [0; MAX_SUB_BLOCK],
            len: 0,
            written: 0,
        }
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.len > 0 {
            self.sink.write_all(&[self.len as u8])?;
            self.sink.write_all(&self.block[..self.len])?;
            self.written += 1 + self.len as u64;
            self.len = 0;
        }
        Ok(())
    }

    /// Write the last block and the zero-length terminator
    fn finish(mut self) -> io::Result<u64> {
        self.flush_block()?;
        self.sink.write_all(&[0])?;
        Ok(self.written + 1)
    }
}

impl<W: Write> ByteSink for SubBlocks<'_, W> {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        if self.len == MAX_SUB_BLOCK {
            self.flush_block()?;
        }
        self.block[self.len] = byte;
        self.len += 1;
        Ok(())
    }
}

/// LSB-first code packer
struct BitPacker<'s, S: ByteSink> {
    sink: &'s mut S,
    acc: u32,
    bits: u32,
}

impl<'s, S: ByteSink> BitPacker<'s, S> {
    fn new(sink: &'s mut S) -> Self {
        Self { sink, acc: 0, bits: 0 }
    }

    fn push(&mut self, code: u32, width: u32) -> io::Result<()> {
        self.acc |= code << self.bits;
        self.bits += width;
        while self.bits >= 8 {
            self.sink.put(self.acc as u8)?;
            self.acc >>= 8;
            self.bits -= 8;
        }
        Ok(())
    }

    /// Pad the last partial byte with zero bits
    fn flush(&mut self) -> io::Result<()> {
        if self.bits > 0 {
            self.sink.put(self.acc as u8)?;
            self.acc = 0;
            self.bits = 0;
        }
        Ok(())
    }
}

/// Reusable LZW compressor
///
/// Holds the hash table so consecutive frames do not reallocate it.
pub struct LzwEncoder {
    table: Box<[Slot]>,
}

impl LzwEncoder {
    /// Create a compressor with an empty dictionary
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: vec![EMPTY_SLOT; HASH_SIZE].into_boxed_slice(),
        }
    }

    /// Compress `pixels` into container sub-blocks followed by the terminator
    ///
    /// The minimum code size byte is not written. Returns the number of
    /// bytes written to `sink`.
    pub fn encode_blocks<W: Write>(
        &mut self,
        code_size: u8,
        pixels: impl IntoIterator<Item = u8>,
        sink: &mut W,
    ) -> io::Result<u64> {
        let mut blocks = SubBlocks::new(sink);
        self.compress(code_size, pixels, &mut blocks)?;
        blocks.finish()
    }

    /// Compress `pixels` into a raw code stream without sub-block framing
    #[must_use]
    pub fn encode_to_vec(&mut self, code_size: u8, pixels: impl IntoIterator<Item = u8>) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.compress(code_size, pixels, &mut out);
        out
    }

    fn reset(&mut self) {
        self.table.fill(EMPTY_SLOT);
    }

    fn compress<S: ByteSink>(
        &mut self,
        code_size: u8,
        pixels: impl IntoIterator<Item = u8>,
        sink: &mut S,
    ) -> io::Result<()> {
        debug_assert!((2..=8).contains(&code_size));

        let clear = 1u32 << code_size;
        let end = clear + 1;
        let first_width = u32::from(code_size) + 1;

        let mut out = BitPacker::new(sink);
        let mut width = first_width;
        let mut next_code = end + 1;

        self.reset();
        out.push(clear, width)?;

        let mut pixels = pixels.into_iter();
        let Some(first) = pixels.next() else {
            out.push(end, width)?;
            return out.flush();
        };

        let mut prefix = u32::from(first);

        'pixels: for pixel in pixels {
            let byte = u32::from(pixel);
            debug_assert!(byte < clear, "index {byte} outside code size {code_size}");

            let key = (prefix << 8) | byte;
            let mut slot = (prefix ^ (byte << 4)) as usize % HASH_SIZE;
            loop {
                let entry = self.table[slot];
                if entry.key == key {
                    prefix = entry.code;
                    continue 'pixels;
                }
                if entry.key == EMPTY {
                    break;
                }
                slot = (slot + HASH_STEP) % HASH_SIZE;
            }

            self.table[slot] = Slot { key, code: next_code };
            out.push(prefix, width)?;
            next_code += 1;
            prefix = byte;

            if width < MAX_CODE_WIDTH {
                if next_code > 1 << width {
                    width += 1;
                }
            } else if next_code > MAX_CODE {
                out.push(clear, width)?;
                self.reset();
                width = first_width;
                next_code = end + 1;
            }
        }

        out.push(prefix, width)?;
        // The decoder adds one more entry on reading the last code
        if next_code == 1 << width && width < MAX_CODE_WIDTH {
            width += 1;
        }
        out.push(end, width)?;
        out.flush()
    }
}

impl Default for LzwEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(code_size: u8, data: &[u8]) -> Vec<u8> {
        weezl::decode::Decoder::new(weezl::BitOrder::Lsb, code_size)
            .decode(data)
            .expect("valid lzw stream")
    }

    fn noise(len: usize, modulo: u32) -> Vec<u8> {
        let mut state = 0x1234_5678u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % modulo) as u8
            })
            .collect()
    }

    #[test]
    fn test_single_pixel() {
        let mut encoder = LzwEncoder::new();
        let data = encoder.encode_to_vec(2, [3u8]);

        // CLEAR(4), 3, END(5) at 3 bits each, packed LSB first
        assert_eq!(data, vec![0x5C, 0x01]);
        assert_eq!(decode(2, &data), vec![3]);
    }

    #[test]
    fn test_roundtrip_runs() {
        let pixels: Vec<u8> = (0..5000).map(|i| ((i / 37) % 4) as u8).collect();

        let mut encoder = LzwEncoder::new();
        let data = encoder.encode_to_vec(2, pixels.iter().copied());
        assert!(data.len() < pixels.len() / 2);
        assert_eq!(decode(2, &data), pixels);
    }

    #[test]
    fn test_roundtrip_forces_clear() {
        // High-entropy input exhausts the 12-bit code space several times
        let pixels = noise(200_000, 256);

        let mut encoder = LzwEncoder::new();
        let data = encoder.encode_to_vec(8, pixels.iter().copied());
        assert_eq!(decode(8, &data), pixels);

        // Small alphabets hit the width transitions at different points
        for (code_size, modulo) in [(2u8, 3u32), (3, 7), (5, 20)] {
            let pixels = noise(60_000, modulo);
            let data = encoder.encode_to_vec(code_size, pixels.iter().copied());
            assert_eq!(decode(code_size, &data), pixels, "code size {code_size}");
        }
    }

    /// Split a raw code stream into `(code, width)` pairs, growing the width
    /// on the same schedule as the compressor
    fn unpack(code_size: u8, data: &[u8]) -> Vec<(u32, u32)> {
        let clear = 1u32 << code_size;
        let end = clear + 1;
        let first_width = u32::from(code_size) + 1;

        let mut codes = Vec::new();
        let (mut width, mut next_code) = (first_width, end + 1);
        let (mut acc, mut bits) = (0u32, 0u32);
        let mut bytes = data.iter();

        loop {
            while bits < width {
                let byte = bytes.next().expect("stream ended before END");
                acc |= u32::from(*byte) << bits;
                bits += 8;
            }
            let code = acc & ((1 << width) - 1);
            acc >>= width;
            bits -= width;
            codes.push((code, width));

            if code == end {
                return codes;
            }
            if code == clear {
                width = first_width;
                next_code = end + 1;
            } else {
                next_code += 1;
                if width < MAX_CODE_WIDTH && next_code > 1 << width {
                    width += 1;
                }
            }
        }
    }

    #[test]
    fn test_clear_at_code_space_exhaustion() {
        let mut encoder = LzwEncoder::new();

        for (code_size, modulo) in [(8u8, 256u32), (2, 4)] {
            let clear = 1u32 << code_size;
            let per_dictionary = (MAX_CODE + 1 - (clear + 2)) as usize;

            let pixels = noise(200_000, modulo);
            let codes = unpack(code_size, &encoder.encode_to_vec(code_size, pixels.iter().copied()));

            let clears: Vec<usize> = codes
                .iter()
                .enumerate()
                .filter(|(_, (code, _))| *code == clear)
                .map(|(i, _)| i)
                .collect();
            assert!(clears.len() >= 3, "code size {code_size}: {} clears", clears.len());
            assert_eq!(clears[0], 0);
            assert_eq!(codes[0], (clear, u32::from(code_size) + 1));

            for pair in clears.windows(2) {
                assert_eq!(pair[1] - pair[0] - 1, per_dictionary, "code size {code_size}");
                assert_eq!(codes[pair[1]].1, MAX_CODE_WIDTH);
                assert_eq!(codes[pair[1] - 1].1, MAX_CODE_WIDTH);
            }
        }

        // 9, 10 and 11 bit codes fill up before the first 12 bit code
        let pixels = noise(10_000, 256);
        let codes = unpack(8, &encoder.encode_to_vec(8, pixels.iter().copied()));
        let widths: Vec<u32> = codes[1..=3838].iter().map(|&(_, width)| width).collect();
        assert_eq!(widths.iter().filter(|&&w| w == 9).count(), 255);
        assert_eq!(widths.iter().filter(|&&w| w == 10).count(), 512);
        assert_eq!(widths.iter().filter(|&&w| w == 11).count(), 1024);
        assert_eq!(widths.iter().filter(|&&w| w == 12).count(), 2047);
        assert_eq!(codes[3839], (256, MAX_CODE_WIDTH));
    }

    #[test]
    fn test_encoder_reuse_resets_dictionary() {
        let pixels = noise(10_000, 16);

        let mut encoder = LzwEncoder::new();
        let first = encoder.encode_to_vec(4, pixels.iter().copied());
        let second = encoder.encode_to_vec(4, pixels.iter().copied());
        assert_eq!(first, second);
    }

    #[test]
    fn test_sub_blocks() {
        let pixels = noise(4096, 256);

        let mut encoder = LzwEncoder::new();
        let raw = encoder.encode_to_vec(8, pixels.iter().copied());

        let mut framed = Vec::new();
        let written = encoder
            .encode_blocks(8, pixels.iter().copied(), &mut framed)
            .expect("vec write");
        assert_eq!(written, framed.len() as u64);

        let mut unframed = Vec::new();
        let mut pos = 0;
        loop {
            let len = framed[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            assert!(len <= MAX_SUB_BLOCK);
            unframed.extend_from_slice(&framed[pos..pos + len]);
            pos += len;
        }
        assert_eq!(pos, framed.len());
        assert_eq!(unframed, raw);
    }
}
