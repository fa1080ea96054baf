//! Work items passed from the producer to the encoder worker

use std::time::Instant;

use gifcast_capture::Snapshot;

/// One unit of encoder work
#[derive(Debug)]
pub enum Job {
    /// Build the palette and set up the sink from a full-area snapshot
    Quantize(Snapshot),

    /// Encode a recorded snapshot
    Encode(Snapshot),

    /// Finish the recording; recording stopped at the given time
    Quit(Instant),
}

impl Job {
    /// Snapshot carried by the job
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Quantize(s) | Self::Encode(s) => Some(s),
            Self::Quit(_) => None,
        }
    }

    /// Pixel memory held by the job
    #[must_use]
    pub fn pixel_bytes(&self) -> usize {
        self.snapshot().map_or(0, |s| s.raster.data().len())
    }

    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Quantize(_) => "quantize",
            Self::Encode(_) => "encode",
            Self::Quit(_) => "quit",
        }
    }
}
