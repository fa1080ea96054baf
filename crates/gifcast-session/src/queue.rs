//! Job Queue
//!
//! FIFO between the producer and the encoder worker. Pushing never waits
//! for the worker; popping blocks until a job arrives.
//!
//! The queue also owns the snapshot buffer free-list. Pooled buffers and
//! queued snapshots share one memory budget. When a push would exceed it,
//! pooled buffers are dropped first; if that is not enough the snapshot is
//! written to a temporary file and read back when its turn comes.
//!
//! Spill files are split at a configurable size and deleted as soon as
//! every record in them has been handed out. The worker reads records
//! through its own handle after releasing the queue lock, so a push never
//! waits on a read.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Instant;

use gifcast_capture::{BufferPool, Snapshot};
use gifcast_gifenc::{PixelFormat, Rect};
use parking_lot::{Condvar, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{Result, SessionError};
use crate::job::Job;
use crate::spool::{read_record, write_record, Endian, Record};

/// Maximum buffers kept in the free-list
const MAX_FREE_BUFFERS: usize = 16;

/// Job queue statistics
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Jobs pushed
    pub pushed: u64,

    /// Jobs popped
    pub popped: u64,

    /// Jobs written to spill files
    pub spilled: u64,

    /// Bytes written to spill files
    pub spilled_bytes: u64,

    /// Spill files created
    pub spill_files: u64,

    /// Buffers handed out again from the free-list
    pub recycled_buffers: u64,

    /// Highest in-memory snapshot bytes queued at once
    pub peak_queued_bytes: usize,
}

/// A snapshot waiting on disk
#[derive(Debug)]
struct SpilledJob {
    quantize: bool,
    timestamp: Instant,
    format: PixelFormat,
    extents: Rect,
    segment: u64,
    offset: u64,
    len: u64,
}

#[derive(Debug)]
enum Entry {
    Memory(Job),
    Disk(SpilledJob),
}

/// One spill file
struct Segment {
    id: u64,
    /// Write handle, the file is deleted when this is dropped
    file: NamedTempFile,
    /// Independent read handle with its own cursor
    reader: Arc<Mutex<File>>,
    len: u64,
    /// Records not yet read back
    live: usize,
}

struct Inner {
    entries: VecDeque<Entry>,
    free: Vec<Vec<u8>>,
    free_bytes: usize,
    queued_bytes: usize,
    segments: VecDeque<Segment>,
    next_segment: u64,
    spill_bytes: u64,
    closed: bool,
    stats: QueueStats,
}

impl Inner {
    fn memory_bytes(&self) -> usize {
        self.free_bytes + self.queued_bytes
    }
}

/// Producer to worker job FIFO with memory budget and disk spill
pub struct JobQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    config: CacheConfig,
    epoch: Instant,
}

impl JobQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                free: Vec::new(),
                free_bytes: 0,
                queued_bytes: 0,
                segments: VecDeque::new(),
                next_segment: 0,
                spill_bytes: 0,
                closed: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
            config,
            epoch: Instant::now(),
        }
    }

    /// Append a job
    ///
    /// Fails if the queue was closed or a needed spill failed.
    pub fn push(&self, job: Job) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SessionError::invalid_state("job queue closed"));
        }

        let bytes = job.pixel_bytes();
        let limit = self.config.max_memory_bytes;

        if self.config.spill_to_disk && bytes > 0 && inner.memory_bytes() + bytes > limit {
            while inner.memory_bytes() + bytes > limit {
                let Some(buffer) = inner.free.pop() else {
                    break;
                };
                inner.free_bytes -= buffer.capacity();
            }
        }

        let entry = if self.config.spill_to_disk && bytes > 0 && inner.memory_bytes() + bytes > limit {
            Entry::Disk(self.spill(&mut inner, job)?)
        } else {
            inner.queued_bytes += bytes;
            inner.stats.peak_queued_bytes = inner.stats.peak_queued_bytes.max(inner.queued_bytes);
            Entry::Memory(job)
        };

        inner.stats.pushed += 1;
        inner.entries.push_back(entry);
        drop(inner);

        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest job, waiting for one if the queue is empty
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Result<Option<Job>> {
        let mut inner = self.inner.lock();
        let (spilled, reader) = loop {
            if let Some(entry) = inner.entries.pop_front() {
                inner.stats.popped += 1;
                match entry {
                    Entry::Memory(job) => {
                        inner.queued_bytes -= job.pixel_bytes();
                        return Ok(Some(job));
                    }
                    Entry::Disk(spilled) => {
                        let reader = Self::take_record(&mut inner, &spilled)?;
                        break (spilled, reader);
                    }
                }
            }

            if inner.closed {
                return Ok(None);
            }
            self.available.wait(&mut inner);
        };
        drop(inner);

        Self::unspill(spilled, &reader).map(Some)
    }

    /// Reject further pushes; queued jobs can still be popped
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Close the queue and drop everything in it
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.entries.clear();
        inner.queued_bytes = 0;
        inner.segments.clear();
        inner.spill_bytes = 0;
        inner.free.clear();
        inner.free_bytes = 0;
        drop(inner);

        self.available.notify_all();
    }

    /// Whether pushes are rejected
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Jobs waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if no job is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Pixel bytes held in memory, queued and pooled
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.inner.lock().memory_bytes()
    }

    /// Bytes in live spill files
    #[must_use]
    pub fn spill_bytes(&self) -> u64 {
        self.inner.lock().spill_bytes
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats.clone()
    }

    fn spill(&self, inner: &mut Inner, job: Job) -> Result<SpilledJob> {
        let (quantize, snapshot) = match job {
            Job::Quantize(s) => (true, s),
            Job::Encode(s) => (false, s),
            Job::Quit(_) => return Err(SessionError::invalid_state("quit jobs are never spilled")),
        };
        let Some(extents) = snapshot.region.extents() else {
            return Err(SessionError::invalid_state("snapshot without damage"));
        };

        let format = snapshot.raster.format();
        let record_len = 12 + 16 * snapshot.region.len() as u64 + snapshot.region.area() * format.bytes_per_pixel() as u64;
        if inner.spill_bytes + record_len > self.config.max_spill_total_bytes {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "spill limit of {} bytes reached",
                    self.config.max_spill_total_bytes
                ),
            )
            .into());
        }

        let max_file = self.config.max_spill_file_bytes;
        let start_new = inner
            .segments
            .back()
            .map_or(true, |s| s.len > 0 && s.len + record_len > max_file);
        if start_new {
            let file = match &self.config.spill_dir {
                Some(dir) => NamedTempFile::new_in(dir)?,
                None => NamedTempFile::new()?,
            };
            let reader = Arc::new(Mutex::new(file.reopen()?));
            let id = inner.next_segment;
            inner.next_segment += 1;
            inner.segments.push_back(Segment {
                id,
                file,
                reader,
                len: 0,
                live: 0,
            });
            inner.stats.spill_files += 1;
            debug!("Opened spill file {}", id);
        }

        if inner.stats.spilled == 0 {
            warn!(
                "Encoder is falling behind, spilling snapshots to disk (memory budget {} bytes)",
                self.config.max_memory_bytes
            );
        }

        let millis = snapshot.timestamp.saturating_duration_since(self.epoch).as_millis() as u64;
        let Some(segment) = inner.segments.back_mut() else {
            return Err(SessionError::invalid_state("no spill file"));
        };
        let offset = segment.len;
        segment.file.as_file_mut().seek(SeekFrom::Start(offset))?;
        let mut writer = BufWriter::new(segment.file.as_file_mut());
        let written = write_record(&mut writer, millis, &snapshot)?;
        writer.flush()?;
        drop(writer);

        segment.len += written;
        segment.live += 1;
        let id = segment.id;

        inner.spill_bytes += written;
        inner.stats.spilled += 1;
        inner.stats.spilled_bytes += written;

        Ok(SpilledJob {
            quantize,
            timestamp: snapshot.timestamp,
            format,
            extents,
            segment: id,
            offset,
            len: written,
        })
    }

    /// Account for a spilled record leaving the queue and hand out its reader
    ///
    /// A fully consumed segment is dropped from the list here; the returned
    /// handle keeps its data readable until the caller is done.
    fn take_record(inner: &mut Inner, spilled: &SpilledJob) -> Result<Arc<Mutex<File>>> {
        let Some(index) = inner.segments.iter().position(|s| s.id == spilled.segment) else {
            return Err(SessionError::invalid_state(format!(
                "spill file {} missing",
                spilled.segment
            )));
        };

        let segment = &mut inner.segments[index];
        let reader = Arc::clone(&segment.reader);
        segment.live -= 1;
        if segment.live == 0 {
            if let Some(done) = inner.segments.remove(index) {
                inner.spill_bytes -= done.len;
                debug!("Spill file {} consumed", done.id);
            }
        }

        Ok(reader)
    }

    fn unspill(spilled: SpilledJob, reader: &Mutex<File>) -> Result<Job> {
        let file = reader.lock();
        let mut handle: &File = &file;
        handle.seek(SeekFrom::Start(spilled.offset))?;
        let mut records = BufReader::new(handle.take(spilled.len));
        let record = read_record(&mut records, Endian::native(), spilled.format, spilled.extents);
        drop(records);
        drop(file);

        let Record::Frame {
            region,
            raster,
            origin,
            ..
        } = record?
        else {
            return Err(SessionError::spool("spill record without pixels"));
        };

        let snapshot = Snapshot {
            raster,
            origin,
            region,
            timestamp: spilled.timestamp,
        };
        Ok(if spilled.quantize {
            Job::Quantize(snapshot)
        } else {
            Job::Encode(snapshot)
        })
    }
}

impl BufferPool for JobQueue {
    fn acquire(&self, len: usize) -> Vec<u8> {
        let mut inner = self.inner.lock();
        let Some(index) = inner.free.iter().position(|b| b.capacity() >= len) else {
            return vec![0; len];
        };

        let mut buffer = inner.free.swap_remove(index);
        inner.free_bytes -= buffer.capacity();
        inner.stats.recycled_buffers += 1;
        drop(inner);

        buffer.resize(len, 0);
        buffer
    }

    fn release(&self, buffer: Vec<u8>) {
        let mut inner = self.inner.lock();
        let capacity = buffer.capacity();
        if inner.closed
            || inner.free.len() >= MAX_FREE_BUFFERS
            || inner.memory_bytes() + capacity > self.config.max_memory_bytes
        {
            return;
        }

        inner.free_bytes += capacity;
        inner.free.push(buffer);
    }
}
