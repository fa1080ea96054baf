//! Synthetic Recording Example
//!
//! Records a bouncing square with a moving pointer into an animated GIF,
//! driving the session from a tokio channel the way a windowing-system
//! integration would.
//!
//! # Running
//!
//! ```bash
//! cargo run --example record_synthetic -- [OUTPUT] [SECONDS]
//! ```
//!
//! With `--features cursor` (default) the pointer is composited in.

use std::time::Duration;

use gifcast_capture::{CaptureConfig, CursorImage, MemorySource, SourceCapabilities};
use gifcast_gifenc::{PixelFormat, Rect};
use gifcast_session::{drive, CaptureEvent, Session, SessionConfig};
use tokio::sync::mpsc;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const SQUARE: u32 = 24;
const BACKGROUND: u32 = 0x0020_2830;
const SQUARE_COLOR: u32 = 0x00E0_6040;

fn arrow() -> CursorImage {
    // 8x8 white triangle
    let pixels = (0..64)
        .map(|i| if i % 8 <= i / 8 { 0xFFFF_FFFF } else { 0 })
        .collect();
    CursorImage {
        width: 8,
        height: 8,
        hotspot: (0, 0),
        pixels,
        serial: 1,
    }
}

/// Move the square and pointer, reporting every change
async fn animate(scene: MemorySource, events: mpsc::Sender<CaptureEvent>, duration: Duration) {
    let (mut x, mut y) = (0i64, 0i64);
    let (mut dx, mut dy) = (3i64, 2i64);
    let mut ticker = tokio::time::interval(Duration::from_millis(30));
    let end = tokio::time::Instant::now() + duration;

    while tokio::time::Instant::now() < end {
        ticker.tick().await;

        let old = Rect::new(x as u32, y as u32, SQUARE, SQUARE);
        x += dx;
        y += dy;
        if x <= 0 || x + i64::from(SQUARE) >= i64::from(WIDTH) {
            dx = -dx;
        }
        if y <= 0 || y + i64::from(SQUARE) >= i64::from(HEIGHT) {
            dy = -dy;
        }
        x = x.clamp(0, i64::from(WIDTH - SQUARE));
        y = y.clamp(0, i64::from(HEIGHT - SQUARE));
        let new = Rect::new(x as u32, y as u32, SQUARE, SQUARE);

        scene.fill_rect(old, BACKGROUND);
        scene.fill_rect(new, SQUARE_COLOR);
        scene.set_pointer(Some(((x * 2) as i32 % WIDTH as i32, 60)));

        let sent = events
            .send(CaptureEvent::Damage { rect: old, more: true })
            .await
            .and(events.send(CaptureEvent::Damage { rect: new, more: false }).await)
            .and(events.send(CaptureEvent::CursorChanged).await);
        if sent.is_err() {
            return;
        }
    }

    let _ = events.send(CaptureEvent::Stop).await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "synthetic.gif".to_string());
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(3);

    println!("gifcast Synthetic Recording Example");
    println!("===================================");

    let scene = MemorySource::new(WIDTH, HEIGHT, PixelFormat::native_xrgb()).with_capabilities(
        SourceCapabilities {
            damage: true,
            cursor: true,
        },
    );
    scene.fill_rect(Rect::from_size(WIDTH, HEIGHT), BACKGROUND);
    scene.fill_rect(Rect::from_size(SQUARE, SQUARE), SQUARE_COLOR);
    scene.set_cursor(Some(arrow()));

    let config = SessionConfig::builder()
        .looping(true)
        .capture(
            CaptureConfig::builder()
                .frame_interval(Duration::from_millis(40))
                .record_cursor(true)
                .build(),
        )
        .build();

    let mut session = Session::create_gif(&output, config, Box::new(scene.clone()))?;
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(animate(scene, tx, Duration::from_secs(seconds)));

    drive(&mut session, rx).await?;
    println!("\nRecording stopped, waiting for the encoder...");

    let stats = session.finish()?;
    println!("\nWrote {output}");
    println!("  Snapshots encoded: {}", stats.frames_processed);
    println!("  Damage events:     {}", stats.producer.damage_events);
    println!("  Bytes copied:      {}", stats.producer.bytes_copied);
    println!("  Timer idled:       {} times", stats.producer.idle_transitions);
    println!("  Jobs spilled:      {}", stats.queue.spilled);
    println!("  Duration:          {:?}", stats.duration);

    Ok(())
}
