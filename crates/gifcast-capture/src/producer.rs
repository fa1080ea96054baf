//! Frame Producer
//!
//! Turns change notifications from a [`CaptureSource`] into timestamped
//! [`Snapshot`]s of only the changed pixels.
//!
//! # Timing
//!
//! The producer runs a simple two-state machine around a frame timer:
//!
//! - **Idle**: the first damage notification that is not flagged `more`
//!   takes a snapshot immediately and arms the timer.
//! - **Armed**: damage is only accumulated. Each timer tick takes one
//!   snapshot of everything accumulated since the last one. A tick with
//!   nothing pending disarms the timer.
//!
//! The event loop that owns the producer is responsible for actually
//! calling [`FrameProducer::on_timer`] every [`FrameProducer::interval`]
//! while [`FrameProducer::is_timer_active`] returns true.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gifcast_gifenc::{PixelFormat, Rect};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
#[cfg(feature = "cursor")]
use crate::cursor::CursorOverlay;
use crate::damage::{DamageStats, DamageTracker, Region};
use crate::error::{CaptureError, Result};
use crate::snapshot::{BufferPool, Raster, Snapshot};
use crate::source::CaptureSource;

/// Frame producer statistics
#[derive(Debug, Clone, Default)]
pub struct ProducerStats {
    /// Snapshots taken
    pub snapshots: u64,

    /// Damage notifications received while running
    pub damage_events: u64,

    /// Cursor change notifications received while running
    pub cursor_events: u64,

    /// Pixel bytes copied out of the source
    pub bytes_copied: u64,

    /// Times the timer went idle
    pub idle_transitions: u64,
}

/// Damage-driven snapshot producer for one capture area
pub struct FrameProducer {
    /// Pixel source
    source: Box<dyn CaptureSource>,

    /// Captured area in source coordinates
    area: Rect,

    /// Pixel layout of the source
    format: PixelFormat,

    /// Minimum time between snapshots
    interval: Duration,

    /// Snapshot buffers
    pool: Arc<dyn BufferPool>,

    /// Pending damage in area coordinates
    damage: DamageTracker,

    /// Pointer overlay, when recording the cursor
    #[cfg(feature = "cursor")]
    cursor: Option<CursorOverlay>,

    /// Between start() and stop()
    running: bool,

    /// Frame timer armed
    timer_active: bool,

    /// Statistics
    stats: ProducerStats,
}

impl FrameProducer {
    /// Create a producer for `area` (source coordinates)
    ///
    /// The area is clipped to the source. Fails if the source cannot report
    /// damage or if nothing of the area lies on the source.
    pub fn new(
        source: Box<dyn CaptureSource>,
        area: Rect,
        config: &CaptureConfig,
        pool: Arc<dyn BufferPool>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| CaptureError::InvalidConfig(issues.join("; ")))?;

        let capabilities = source.capabilities();
        if !capabilities.damage {
            return Err(CaptureError::extension_unavailable(
                "source does not report damage",
            ));
        }

        let (width, height) = source.size();
        let area = area.clip(width, height).ok_or_else(|| {
            CaptureError::invalid_area(format!("{area:?} does not intersect {width}x{height} source"))
        })?;

        let record_cursor = config.record_cursor && capabilities.cursor;
        if config.record_cursor && !capabilities.cursor {
            warn!("Source has no cursor support, recording without pointer");
        } else if record_cursor && cfg!(not(feature = "cursor")) {
            warn!("Cursor overlay not compiled in, recording without pointer");
        }

        let format = source.pixel_format();

        info!(
            "Frame producer ready: {}x{} at ({}, {}), {:?}, interval {:?}",
            area.width, area.height, area.x, area.y, format, config.frame_interval
        );

        Ok(Self {
            source,
            area,
            format,
            interval: config.frame_interval,
            pool,
            damage: DamageTracker::with_max_rects(area.width, area.height, config.max_region_rects),
            #[cfg(feature = "cursor")]
            cursor: record_cursor
                .then(|| CursorOverlay::with_cache_size(config.cursor_cache_entries)),
            running: false,
            timer_active: false,
            stats: ProducerStats::default(),
        })
    }

    /// Snapshot of the whole area, outside the damage cycle
    ///
    /// Used to build the palette before recording starts.
    pub fn capture_full(&mut self) -> Result<Snapshot> {
        self.refresh_cursor();
        self.snapshot_region(Region::from_rect(self.damage.bounds()))
    }

    /// Start recording
    ///
    /// Returns the first snapshot, covering the whole area, and arms the
    /// timer.
    pub fn start(&mut self) -> Result<Snapshot> {
        self.running = true;
        self.refresh_cursor();
        self.damage.mark_full_damage();

        let snapshot = self.snapshot()?;
        self.timer_active = true;

        debug!("Frame producer started");
        Ok(snapshot)
    }

    /// Handle a damage notification (`rect` in source coordinates)
    ///
    /// `more` signals that further notifications of the same batch follow.
    /// Returns a snapshot if the timer was idle and the batch is complete.
    pub fn on_damage(&mut self, rect: Rect, more: bool) -> Result<Option<Snapshot>> {
        if !self.running {
            return Ok(None);
        }
        self.stats.damage_events += 1;

        let local = rect
            .intersect(&self.area)
            .map(|r| r.relative_to(self.area.x, self.area.y));
        if let Some(local) = local {
            self.damage.add(local);
        }

        if more {
            return Ok(None);
        }
        self.kick()
    }

    /// Handle a pointer move or cursor image change
    pub fn on_cursor_changed(&mut self) -> Result<Option<Snapshot>> {
        if !self.running || !self.cursor_enabled() {
            return Ok(None);
        }
        self.stats.cursor_events += 1;

        self.refresh_cursor();
        self.kick()
    }

    /// Handle a timer tick
    ///
    /// Returns `None` and disarms the timer when nothing changed since the
    /// last snapshot.
    pub fn on_timer(&mut self) -> Result<Option<Snapshot>> {
        if !self.running || !self.timer_active {
            return Ok(None);
        }

        self.refresh_cursor();

        if !self.damage.has_damage() {
            debug!("No damage, frame timer idle");
            self.timer_active = false;
            self.stats.idle_transitions += 1;
            return Ok(None);
        }

        self.snapshot().map(Some)
    }

    /// Stop recording and drop pending damage
    pub fn stop(&mut self) {
        if self.running {
            debug!(
                "Frame producer stopped after {} snapshots",
                self.stats.snapshots
            );
        }
        self.running = false;
        self.timer_active = false;
        self.damage.take();
    }

    /// Whether [`FrameProducer::on_timer`] should be called
    #[must_use]
    pub fn is_timer_active(&self) -> bool {
        self.timer_active
    }

    /// Whether the producer is between start and stop
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the pointer is painted into snapshots
    #[must_use]
    pub fn cursor_enabled(&self) -> bool {
        #[cfg(feature = "cursor")]
        {
            self.cursor.is_some()
        }
        #[cfg(not(feature = "cursor"))]
        {
            false
        }
    }

    /// Captured area in source coordinates
    #[must_use]
    pub fn area(&self) -> Rect {
        self.area
    }

    /// Pixel layout of snapshots
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Minimum time between snapshots
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Damage accumulated since the last snapshot, in area coordinates
    #[must_use]
    pub fn pending(&self) -> &Region {
        self.damage.pending()
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    /// Get damage statistics
    #[must_use]
    pub fn damage_stats(&self) -> &DamageStats {
        self.damage.stats()
    }

    /// Snapshot now if the timer is idle
    fn kick(&mut self) -> Result<Option<Snapshot>> {
        if self.timer_active || !self.damage.has_damage() {
            return Ok(None);
        }

        let snapshot = self.snapshot()?;
        self.timer_active = true;
        Ok(Some(snapshot))
    }

    fn snapshot(&mut self) -> Result<Snapshot> {
        let region = self.damage.take();
        self.snapshot_region(region)
    }

    fn snapshot_region(&mut self, region: Region) -> Result<Snapshot> {
        let Some(extents) = region.extents() else {
            return Err(CaptureError::invalid_area("snapshot of empty region"));
        };

        let bpp = self.format.bytes_per_pixel();
        let stride = extents.width as usize * bpp;
        let mut buffer = self.pool.acquire(stride * extents.height as usize);

        for rect in region.rects() {
            let at = (rect.y - extents.y) as usize * stride + (rect.x - extents.x) as usize * bpp;
            let source_rect = rect.offset(self.area.x, self.area.y);

            if let Err(e) = self.source.copy_rect(source_rect, &mut buffer[at..], stride) {
                self.pool.release(buffer);
                return Err(e);
            }
            self.stats.bytes_copied += rect.area() * bpp as u64;
        }

        let mut snapshot = Snapshot {
            raster: Raster::new(buffer, extents.width, extents.height, stride, self.format),
            origin: (extents.x, extents.y),
            region,
            timestamp: Instant::now(),
        };
        self.composite_cursor(&mut snapshot);

        self.stats.snapshots += 1;
        debug!(
            "Snapshot {}: {} rects, extents {:?}",
            self.stats.snapshots,
            snapshot.region.len(),
            extents
        );

        Ok(snapshot)
    }

    #[cfg(feature = "cursor")]
    fn refresh_cursor(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            if let Some(rect) = cursor.update(self.source.as_mut(), self.area) {
                self.damage.add(rect);
            }
        }
    }

    #[cfg(not(feature = "cursor"))]
    fn refresh_cursor(&mut self) {}

    #[cfg(feature = "cursor")]
    fn composite_cursor(&mut self, snapshot: &mut Snapshot) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.composite(snapshot, self.area);
        }
    }

    #[cfg(not(feature = "cursor"))]
    fn composite_cursor(&mut self, _snapshot: &mut Snapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::HeapPool;
    use crate::source::{MemorySource, SourceCapabilities};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn producer(source: &MemorySource, area: Rect) -> FrameProducer {
        FrameProducer::new(
            Box::new(source.clone()),
            area,
            &CaptureConfig::default(),
            Arc::new(HeapPool),
        )
        .expect("producer")
    }

    #[test]
    fn test_requires_damage_support() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32).with_capabilities(
            SourceCapabilities {
                damage: false,
                cursor: false,
            },
        );

        let result = FrameProducer::new(
            Box::new(source),
            Rect::from_size(10, 10),
            &CaptureConfig::default(),
            Arc::new(HeapPool),
        );
        assert!(matches!(result, Err(CaptureError::ExtensionUnavailable(_))));
    }

    #[test]
    fn test_area_clipped_to_source() {
        let source = MemorySource::new(50, 40, PixelFormat::Bgrx32);
        assert_eq!(
            producer(&source, Rect::new(10, 10, 100, 100)).area(),
            Rect::new(10, 10, 40, 30)
        );

        let result = FrameProducer::new(
            Box::new(source),
            Rect::new(60, 0, 10, 10),
            &CaptureConfig::default(),
            Arc::new(HeapPool),
        );
        assert!(matches!(result, Err(CaptureError::InvalidArea(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32);
        let config = CaptureConfig::builder().max_region_rects(0).build();
        let result = FrameProducer::new(
            Box::new(source),
            Rect::from_size(10, 10),
            &config,
            Arc::new(HeapPool),
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }

    #[test]
    fn test_start_takes_full_snapshot() {
        let source = MemorySource::new(20, 20, PixelFormat::Rgb24);
        source.fill_rect(Rect::new(5, 5, 2, 2), 0x00AB_CDEF);

        let mut producer = producer(&source, Rect::new(4, 4, 8, 8));
        let snapshot = producer.start().expect("start");

        assert_eq!(snapshot.bounds(), Rect::new(0, 0, 8, 8));
        assert_eq!(snapshot.region.area(), 64);
        assert_eq!(snapshot.view(Rect::new(1, 1, 1, 1)).rgb_at(0, 0), 0x00AB_CDEF);
        assert_eq!(snapshot.view(Rect::new(0, 0, 1, 1)).rgb_at(0, 0), 0);
        assert!(producer.is_timer_active());
        assert!(producer.pending().is_empty());
    }

    #[test]
    fn test_damage_ignored_before_start() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32);
        let mut producer = producer(&source, Rect::from_size(10, 10));

        assert!(producer.on_damage(Rect::new(0, 0, 5, 5), false).unwrap().is_none());
        assert!(producer.on_timer().unwrap().is_none());
        assert_eq!(producer.stats().damage_events, 0);
    }

    #[test]
    fn test_damage_coalesced_until_tick() {
        let source = MemorySource::new(100, 100, PixelFormat::Bgrx32);
        let mut producer = producer(&source, Rect::from_size(100, 100));
        producer.start().expect("start");

        for i in 0..5 {
            let snapshot = producer.on_damage(Rect::new(i * 10, i * 5, 4, 4), false).unwrap();
            assert!(snapshot.is_none());
        }

        let snapshot = producer.on_timer().unwrap().expect("snapshot");
        assert_eq!(snapshot.region.extents(), Some(Rect::new(0, 0, 44, 24)));
        assert_eq!(snapshot.region.area(), 5 * 16);
        assert_eq!(snapshot.bounds(), Rect::new(0, 0, 44, 24));

        // Nothing new: the timer goes idle
        assert!(producer.on_timer().unwrap().is_none());
        assert!(!producer.is_timer_active());
        assert_eq!(producer.stats().idle_transitions, 1);
    }

    #[test]
    fn test_idle_damage_snapshots_immediately() {
        let source = MemorySource::new(30, 30, PixelFormat::Bgrx32);
        let mut producer = producer(&source, Rect::new(10, 10, 10, 10));
        producer.start().expect("start");
        assert!(producer.on_timer().unwrap().is_none());

        // Batch in progress
        assert!(producer.on_damage(Rect::new(0, 0, 12, 12), true).unwrap().is_none());
        assert!(!producer.is_timer_active());

        // Outside the area, but it ends the batch
        assert!(producer.on_damage(Rect::new(25, 25, 2, 2), false).unwrap().is_some());
        assert!(producer.is_timer_active());
        assert_eq!(producer.stats().snapshots, 2);
    }

    #[test]
    fn test_damage_outside_area_ignored() {
        let source = MemorySource::new(30, 30, PixelFormat::Bgrx32);
        let mut producer = producer(&source, Rect::new(10, 10, 10, 10));
        producer.start().expect("start");
        producer.on_timer().unwrap();

        assert!(producer.on_damage(Rect::new(0, 0, 5, 5), false).unwrap().is_none());
        assert!(!producer.is_timer_active());

        let snapshot = producer.on_damage(Rect::new(18, 18, 5, 5), false).unwrap().expect("snapshot");
        assert_eq!(snapshot.region.rects(), &[Rect::new(8, 8, 2, 2)]);
    }

    #[test]
    fn test_stop_drops_pending() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32);
        let mut producer = producer(&source, Rect::from_size(10, 10));
        producer.start().expect("start");
        producer.on_damage(Rect::new(1, 1, 1, 1), false).unwrap();

        producer.stop();
        assert!(!producer.is_running());
        assert!(!producer.is_timer_active());
        assert!(producer.pending().is_empty());
        assert!(producer.on_damage(Rect::new(1, 1, 1, 1), false).unwrap().is_none());
    }

    struct BrokenSource;

    impl CaptureSource for BrokenSource {
        fn size(&self) -> (u32, u32) {
            (8, 8)
        }

        fn pixel_format(&self) -> PixelFormat {
            PixelFormat::Bgrx32
        }

        fn capabilities(&self) -> SourceCapabilities {
            SourceCapabilities::default()
        }

        fn copy_rect(&mut self, _rect: Rect, _dst: &mut [u8], _dst_stride: usize) -> Result<()> {
            Err(CaptureError::source_failed("window destroyed"))
        }
    }

    #[derive(Default)]
    struct CountingPool {
        released: AtomicUsize,
    }

    impl BufferPool for CountingPool {
        fn acquire(&self, len: usize) -> Vec<u8> {
            vec![0; len]
        }

        fn release(&self, _buffer: Vec<u8>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_copy_failure_releases_buffer() {
        let pool = Arc::new(CountingPool::default());
        let mut producer = FrameProducer::new(
            Box::new(BrokenSource),
            Rect::from_size(8, 8),
            &CaptureConfig::default(),
            pool.clone(),
        )
        .expect("producer");

        assert!(matches!(producer.start(), Err(CaptureError::SourceFailed(_))));
        assert_eq!(pool.released.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "cursor")]
    #[test]
    fn test_cursor_motion_creates_damage() {
        use crate::source::CursorImage;

        let source = MemorySource::new(40, 40, PixelFormat::Bgrx32).with_capabilities(
            SourceCapabilities {
                damage: true,
                cursor: true,
            },
        );
        source.set_cursor(Some(CursorImage {
            width: 3,
            height: 3,
            hotspot: (0, 0),
            pixels: vec![0xFFFF_0000; 9],
            serial: 1,
        }));
        source.set_pointer(Some((5, 5)));

        let config = CaptureConfig::builder().record_cursor(true).build();
        let mut producer = FrameProducer::new(
            Box::new(source.clone()),
            Rect::from_size(40, 40),
            &config,
            Arc::new(HeapPool),
        )
        .expect("producer");
        assert!(producer.cursor_enabled());

        let snapshot = producer.start().expect("start");
        assert_eq!(snapshot.view(Rect::new(6, 6, 1, 1)).rgb_at(0, 0), 0x00FF_0000);
        assert!(producer.on_timer().unwrap().is_none());

        source.set_pointer(Some((20, 5)));
        let snapshot = producer.on_cursor_changed().unwrap().expect("snapshot");
        assert_eq!(snapshot.region.extents(), Some(Rect::new(5, 5, 18, 3)));
        assert_eq!(snapshot.region.area(), 54);
        // Old position shows the background again
        assert_eq!(snapshot.view(Rect::new(5, 5, 1, 1)).rgb_at(0, 0), 0);
        assert_eq!(snapshot.view(Rect::new(21, 6, 1, 1)).rgb_at(0, 0), 0x00FF_0000);
    }

    #[test]
    fn test_cursor_requires_source_support() {
        let source = MemorySource::new(10, 10, PixelFormat::Bgrx32);
        let config = CaptureConfig::builder().record_cursor(true).build();
        let producer = FrameProducer::new(
            Box::new(source),
            Rect::from_size(10, 10),
            &config,
            Arc::new(HeapPool),
        )
        .expect("producer");

        assert!(!producer.cursor_enabled());
    }
}
