//! Spool Replay Example
//!
//! Converts a raw spool recording (written by `Session::create_spool`) into
//! an animated GIF, keeping the recorded timing.
//!
//! # Running
//!
//! ```bash
//! cargo run --example replay_spool -- INPUT.spool OUTPUT.gif [--loop]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom};

use gifcast_session::{read_header, replay, GifSink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(input), Some(output)) = (args.first(), args.get(1)) else {
        eprintln!("usage: replay_spool INPUT.spool OUTPUT.gif [--loop]");
        std::process::exit(2);
    };
    let looping = args.iter().any(|a| a == "--loop");

    let mut reader = BufReader::new(File::open(input)?);
    let (header, endian) = read_header(&mut reader)?;
    println!(
        "{input}: {}x{} {:?}, {:?} endian",
        header.width, header.height, header.format, endian
    );
    reader.seek(SeekFrom::Start(0))?;

    let writer = BufWriter::new(File::create(output)?);
    let mut sink = GifSink::new(writer, header.width, header.height).with_looping(looping);
    let stats = replay(reader, &mut sink)?;

    println!("Wrote {output}");
    println!("  Records:   {}", stats.frames);
    println!("  Skipped:   {}", sink.skipped());
    if let Some(encoder) = sink.stats() {
        println!("  Frames:    {}", encoder.frames_written);
        println!("  Bytes:     {}", encoder.bytes_written);
    }
    println!("  Duration:  {:?}", stats.duration);

    Ok(())
}
