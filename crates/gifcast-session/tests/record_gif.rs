//! Recordings decoded with a reference GIF decoder.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Write};
use std::thread;
use std::time::{Duration, Instant};

use gifcast_capture::MemorySource;
use gifcast_gifenc::{PixelFormat, Rect};
use gifcast_session::{read_header, replay, GifSink, Session, SessionConfig, SessionError, SessionState};

const BLACK: u32 = 0x0000_0000;
const WHITE: u32 = 0x00FF_FFFF;
const RED: u32 = 0x00FF_0000;
const BLUE: u32 = 0x0000_00FF;

struct DecodedFrame {
    rect: Rect,
    delay: u16,
    transparent: Option<u8>,
    indices: Vec<u8>,
}

fn decode(bytes: &[u8]) -> (gif::Repeat, Vec<u8>, Vec<DecodedFrame>) {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(Cursor::new(bytes)).expect("valid gif header");

    let palette = decoder.global_palette().expect("global palette").to_vec();
    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().expect("frame decodes") {
        frames.push(DecodedFrame {
            rect: Rect::new(
                u32::from(frame.left),
                u32::from(frame.top),
                u32::from(frame.width),
                u32::from(frame.height),
            ),
            delay: frame.delay,
            transparent: frame.transparent,
            indices: frame.buffer.to_vec(),
        });
    }

    (decoder.repeat(), palette, frames)
}

fn wait_inactive(session: &Session) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.is_active() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_recorded_gif_decodes() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recording.gif");

    let source = MemorySource::new(32, 32, PixelFormat::Bgrx32);
    source.fill_rect(Rect::new(16, 0, 16, 32), WHITE);

    let config = SessionConfig::builder().looping(true).build();
    let mut session =
        Session::create_gif(&path, config, Box::new(source.clone())).expect("session");
    session.start().expect("start");

    thread::sleep(Duration::from_millis(30));
    source.fill_rect(Rect::new(4, 4, 4, 4), WHITE);
    session.on_damage(Rect::new(4, 4, 4, 4), false).expect("damage");
    session.on_timer().expect("tick");

    thread::sleep(Duration::from_millis(30));
    let stats = session.finish().expect("finish");
    assert_eq!(stats.frames_processed, 2);

    let bytes = std::fs::read(&path).expect("gif written");
    let (repeat, palette, frames) = decode(&bytes);

    assert_eq!(repeat, gif::Repeat::Infinite);
    assert_eq!(&palette[..6], &[0, 0, 0, 255, 255, 255]);
    assert_eq!(frames.len(), 2);

    let first = &frames[0];
    assert_eq!(first.rect, Rect::from_size(32, 32));
    assert_eq!(first.transparent, Some(2));
    assert!(first.delay >= 3, "first frame delay {}", first.delay);
    assert_eq!(first.indices[0], 0);
    assert_eq!(first.indices[16], 1);

    let second = &frames[1];
    assert_eq!(second.rect, Rect::new(4, 4, 4, 4));
    assert!(second.delay >= 3, "second frame delay {}", second.delay);
    assert!(second.indices.iter().all(|&i| i == 1));
}

#[test]
fn test_unchanged_ticks_write_no_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("static.gif");

    let source = MemorySource::new(16, 16, PixelFormat::Bgr24);
    let mut session = Session::create_gif(&path, SessionConfig::default(), Box::new(source.clone()))
        .expect("session");
    session.start().expect("start");

    // Damage reported, but the pixels are what they were
    for _ in 0..3 {
        session.on_damage(Rect::new(0, 0, 8, 8), false).expect("damage");
        session.on_timer().expect("tick");
    }
    session.finish().expect("finish");

    let bytes = std::fs::read(&path).expect("gif written");
    let (repeat, _, frames) = decode(&bytes);
    assert_eq!(repeat, gif::Repeat::Finite(0));
    assert_eq!(frames.len(), 1);
}

/// Writer that rejects every write
struct FullDisk;

impl Write for FullDisk {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "device full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_write_failure_moves_to_error() {
    let source = MemorySource::new(16, 16, PixelFormat::Bgrx32);
    let sink = GifSink::new(FullDisk, 16, 16);
    let mut session = Session::new(SessionConfig::default(), Box::new(source.clone()), Box::new(sink))
        .expect("session");

    session.start().expect("start");
    wait_inactive(&session);

    assert!(!session.is_active());
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.error().expect("error recorded").contains("device full"));

    // Late events are ignored
    source.fill_rect(Rect::new(0, 0, 4, 4), WHITE);
    session.on_damage(Rect::new(0, 0, 4, 4), false).expect("ignored");

    let err = session.finish().expect_err("recording failed");
    assert!(err.is_io());
}

#[test]
fn test_spool_replays_into_gif() {
    let dir = tempfile::tempdir().expect("tempdir");
    let spool_path = dir.path().join("recording.spool");
    let gif_path = dir.path().join("replayed.gif");

    let source = MemorySource::new(24, 16, PixelFormat::Bgrx32);
    source.fill_rect(Rect::new(0, 0, 8, 16), RED);
    source.fill_rect(Rect::new(8, 0, 8, 16), BLUE);

    let mut session =
        Session::create_spool(&spool_path, SessionConfig::default(), Box::new(source.clone()))
            .expect("session");
    session.start().expect("start");

    thread::sleep(Duration::from_millis(20));
    source.fill_rect(Rect::new(16, 0, 8, 8), RED);
    session.on_damage(Rect::new(16, 0, 8, 8), false).expect("damage");
    session.on_timer().expect("tick");

    thread::sleep(Duration::from_millis(20));
    source.fill_rect(Rect::new(0, 8, 8, 8), BLUE);
    session.on_damage(Rect::new(0, 8, 8, 8), false).expect("damage");
    session.on_timer().expect("tick");

    session.finish().expect("finish");

    let mut reader = BufReader::new(File::open(&spool_path).expect("spool written"));
    let (header, _) = read_header(&mut reader).expect("header");
    assert_eq!((header.width, header.height), (24, 16));
    assert_eq!(header.format, PixelFormat::Bgrx32);

    let reader = BufReader::new(File::open(&spool_path).expect("spool written"));
    let mut sink = GifSink::new(BufWriter::new(File::create(&gif_path).expect("gif")), 24, 16);
    let stats = replay(reader, &mut sink).expect("replay");
    assert_eq!(stats.frames, 3);
    assert!(stats.duration >= Duration::from_millis(40));
    drop(sink);

    let bytes = std::fs::read(&gif_path).expect("gif written");
    let (_, palette, frames) = decode(&bytes);

    // Black, blue and red, sorted by packed value
    assert_eq!(&palette[..9], &[0, 0, 0, 0, 0, 255, 255, 0, 0]);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].rect, Rect::new(16, 0, 8, 8));
    assert_eq!(frames[2].rect, Rect::new(0, 8, 8, 8));
    assert!(frames[1].delay >= 2);
    assert!(frames[1].indices.iter().all(|&i| i == 2));
    assert!(frames[2].indices.iter().all(|&i| i == 1));
}

#[test]
fn test_empty_spool_is_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nothing.spool");

    let source = MemorySource::new(8, 8, PixelFormat::Bgrx32);
    let session =
        Session::create_spool(&path, SessionConfig::default(), Box::new(source)).expect("session");

    assert!(matches!(session.finish(), Err(SessionError::NothingRecorded)));
    assert!(!path.exists());
}
