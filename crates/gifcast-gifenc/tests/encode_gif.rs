//! End-to-end checks of the written container against a reference decoder.

use std::io::Cursor;

use gifcast_gifenc::{
    pack_rgb, ByteOrder, ErrorDiffusion, GifEncoder, Palette, PixelFormat, RasterRef, Rect,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn decoder_for(bytes: &[u8]) -> gif::Decoder<Cursor<&[u8]>> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    options.read_info(Cursor::new(bytes)).expect("valid gif header")
}

#[test]
fn test_two_color_animation_layout() {
    init_tracing();
    let palette = Palette::from_colors(vec![[0, 0, 0], [255, 255, 255]], ByteOrder::Rgb, false);

    let checker: Vec<u8> = (0..16).map(|i| ((i + i / 4) % 2) as u8).collect();
    let inner = [1u8, 1, 0, 0];

    let mut encoder = GifEncoder::open(4, 4, Vec::new()).expect("open");
    encoder.set_palette(palette).expect("palette");
    encoder.add_frame(Rect::new(0, 0, 4, 4), 100, &checker, 4).expect("frame 1");
    encoder.add_frame(Rect::new(1, 1, 2, 2), 50, &inner, 2).expect("frame 2");
    encoder.close().expect("close");
    let bytes = encoder.into_inner();

    assert_eq!(&bytes[..6], b"GIF89a");
    assert_eq!(bytes[10] & 0x07, 1, "4 entry global table");
    assert_eq!(&bytes[13..25], &[0, 0, 0, 255, 255, 255, 0, 0, 0, 0, 0, 0]);
    assert_eq!(bytes.last(), Some(&0x3B));

    let mut decoder = decoder_for(&bytes);
    assert_eq!((decoder.width(), decoder.height()), (4, 4));
    assert_eq!(
        decoder.global_palette().map(<[u8]>::len),
        Some(12),
        "black, white and two padding entries"
    );

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().expect("frame decodes") {
        frames.push((
            Rect::new(
                u32::from(frame.left),
                u32::from(frame.top),
                u32::from(frame.width),
                u32::from(frame.height),
            ),
            frame.delay,
            frame.transparent,
            frame.dispose,
            frame.buffer.to_vec(),
        ));
    }

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].0, Rect::new(0, 0, 4, 4));
    assert_eq!(frames[0].1, 100);
    assert_eq!(frames[0].2, None);
    assert_eq!(frames[0].3, gif::DisposalMethod::Keep);
    assert_eq!(frames[0].4, checker);
    assert_eq!(frames[1].0, Rect::new(1, 1, 2, 2));
    assert_eq!(frames[1].1, 50);
    assert_eq!(frames[1].4, inner.to_vec());
}

#[test]
fn test_looping_is_infinite() {
    init_tracing();
    let palette = Palette::from_colors(vec![[10, 20, 30]], ByteOrder::Bgr, true);

    let mut encoder = GifEncoder::open(1, 1, Vec::new()).expect("open");
    encoder.set_palette(palette).expect("palette");
    encoder.set_looping().expect("looping");
    encoder.add_frame(Rect::new(0, 0, 1, 1), 1, &[0], 1).expect("frame");
    encoder.close().expect("close");
    let bytes = encoder.into_inner();

    let mut decoder = decoder_for(&bytes);
    let frame = decoder.read_next_frame().expect("decodes").expect("one frame");
    assert_eq!(frame.transparent, Some(1));
    assert!(decoder.read_next_frame().expect("decodes").is_none());
    assert_eq!(decoder.repeat(), gif::Repeat::Infinite);
}

/// Encodes a sequence of rasters as delta frames and recomposes them.
#[test]
fn test_delta_frames_recompose_source() {
    init_tracing();
    const W: u32 = 24;
    const H: u32 = 16;
    let stride = (W * 4) as usize;

    let scene = |step: u32| -> Vec<u8> {
        let mut data = vec![0u8; stride * H as usize];
        for y in 0..H {
            for x in 0..W {
                let moving = x >= step * 4 && x < step * 4 + 5 && (4..9).contains(&y);
                let rgb = if moving {
                    0x00E0_4010
                } else {
                    pack_rgb((x * 10) as u8, (y / 8 * 100 + 20) as u8, 0x80)
                };
                let at = y as usize * stride + x as usize * 4;
                PixelFormat::Bgrx32.write_rgb(&mut data[at..at + 4], rgb);
            }
        }
        data
    };

    let first = scene(0);
    let palette = Palette::quantize(RasterRef::new(&first, W, H, stride, PixelFormat::Bgrx32), true, 255);
    let transparent = palette.alpha_index().expect("alpha");

    let mut encoder = GifEncoder::open(W, H, Vec::new()).expect("open");
    encoder.set_palette(palette.clone()).expect("palette");

    let mut dither = ErrorDiffusion::new();
    let mut full = vec![transparent; (W * H) as usize];
    let mut frame = vec![0u8; (W * H) as usize];
    let mut emitted = Vec::new();

    for step in 0..4 {
        let data = scene(step);
        let raster = RasterRef::new(&data, W, H, stride, PixelFormat::Bgrx32);
        if let Some(changed) = dither.dither_delta(&mut frame, W as usize, &mut full, W as usize, &palette, raster) {
            let offset = (changed.y * W + changed.x) as usize;
            encoder.add_frame(changed, 4, &frame[offset..], W as usize).expect("frame");
            emitted.push(changed);
        }
    }
    encoder.close().expect("close");
    let bytes = encoder.into_inner();

    assert_eq!(emitted.len(), 4);
    assert_eq!(emitted[0], Rect::new(0, 0, W, H));
    assert!(emitted[1..].iter().all(|r| r.height == 5 && r.y == 4));

    // Recompose with disposal "keep" and transparency
    let mut canvas = vec![transparent; (W * H) as usize];
    let mut decoder = decoder_for(&bytes);
    while let Some(frame) = decoder.read_next_frame().expect("frame decodes") {
        for row in 0..usize::from(frame.height) {
            for col in 0..usize::from(frame.width) {
                let index = frame.buffer[row * usize::from(frame.width) + col];
                if Some(index) != frame.transparent {
                    let at = (usize::from(frame.top) + row) * W as usize + usize::from(frame.left) + col;
                    canvas[at] = index;
                }
            }
        }
    }

    let last = scene(3);
    let raster = RasterRef::new(&last, W, H, stride, PixelFormat::Bgrx32);
    for y in 0..H {
        for x in 0..W {
            let [r, g, b] = palette.colors()[canvas[(y * W + x) as usize] as usize];
            assert_eq!(pack_rgb(r, g, b), raster.rgb_at(x, y), "pixel {x},{y}");
        }
    }
}
