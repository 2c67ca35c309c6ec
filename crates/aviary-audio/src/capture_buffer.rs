use aviary_foundation::AudioError;
use aviary_telemetry::{FpsTracker, PipelineMetrics};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Capacity is rounded up to this boundary.
const ALIGNMENT: usize = 2048;

/// Per-buffer allocation ceiling.
pub const MAX_BUFFER_BYTES: usize = 1 << 30;

/// Readers re-check the wall clock at most this often while waiting.
const READ_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Misaligned-write warnings are rate limited to one per this interval.
const MISALIGN_LOG_INTERVAL: Duration = Duration::from_secs(10);

struct BufferState {
    data: Vec<u8>,
    write_index: usize,
    /// Wall-clock time of the oldest byte in the buffer. None until the
    /// first write arrives.
    start_time: Option<SystemTime>,
    last_misalign_log: Option<Instant>,
    write_rate: FpsTracker,
}

/// Circular PCM buffer with wall-clock indexing.
///
/// One writer and any number of readers share the buffer through a single
/// mutex. Readers asking for a window that has not fully elapsed yet block
/// on a condvar signalled by each write, re-checking the clock on a coarse
/// interval.
pub struct CaptureBuffer {
    state: Mutex<BufferState>,
    written: Condvar,
    source: String,
    sample_rate: usize,
    bytes_per_sample: usize,
    capacity: usize,
    buffer_duration: Duration,
    metrics: Arc<PipelineMetrics>,
}

/// Round a byte count up to the capacity alignment boundary.
pub(crate) fn aligned_capacity(duration_seconds: usize, sample_rate: usize, bytes_per_sample: usize) -> usize {
    let raw = duration_seconds * sample_rate * bytes_per_sample;
    raw.div_ceil(ALIGNMENT) * ALIGNMENT
}

impl CaptureBuffer {
    pub(crate) fn new(
        duration_seconds: usize,
        sample_rate: usize,
        bytes_per_sample: usize,
        source: &str,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let capacity = aligned_capacity(duration_seconds, sample_rate, bytes_per_sample);
        Self {
            state: Mutex::new(BufferState {
                data: vec![0u8; capacity],
                write_index: 0,
                start_time: None,
                last_misalign_log: None,
                write_rate: FpsTracker::new(),
            }),
            written: Condvar::new(),
            source: source.to_string(),
            sample_rate,
            bytes_per_sample,
            capacity,
            buffer_duration: Duration::from_secs(duration_seconds as u64),
            metrics,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn duration(&self) -> Duration {
        self.buffer_duration
    }

    /// Append PCM bytes at the write index, wrapping at capacity.
    ///
    /// On wrap the buffer start time is pulled forward so that
    /// `now - start_time` stays approximately equal to the buffer duration.
    /// Misaligned lengths are counted and logged but never dropped.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        let mut state = self.state.lock();

        if data.len() % self.bytes_per_sample != 0 {
            self.metrics.record_misaligned_write();
            let should_log = state
                .last_misalign_log
                .map_or(true, |t| t.elapsed() >= MISALIGN_LOG_INTERVAL);
            if should_log {
                state.last_misalign_log = Some(Instant::now());
                warn!(
                    source = %self.source,
                    len = data.len(),
                    bytes_per_sample = self.bytes_per_sample,
                    "audio data length not aligned with sample size"
                );
            }
        }

        if state.start_time.is_none() {
            state.start_time = Some(SystemTime::now());
        }

        // Oversized writes keep only the newest full window.
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let write_index = state.write_index;
        let tail_room = self.capacity - write_index;
        let wrapped = data.len() > tail_room;
        if wrapped {
            state.data[write_index..].copy_from_slice(&data[..tail_room]);
            let rest = &data[tail_room..];
            state.data[..rest.len()].copy_from_slice(rest);
            state.write_index = rest.len();
        } else {
            state.data[write_index..write_index + data.len()].copy_from_slice(data);
            state.write_index = (write_index + data.len()) % self.capacity;
        }

        if wrapped || (state.write_index == 0 && data.len() == tail_room) {
            state.start_time = Some(SystemTime::now() - self.buffer_duration);
            self.metrics.record_capture_wraparound();
            debug!(source = %self.source, "capture buffer wrapped, start time adjusted");
        }

        self.metrics.record_capture_write();
        if let Some(fps) = state.write_rate.tick() {
            self.metrics.update_capture_write_fps(fps);
        }
        drop(state);
        self.written.notify_all();
    }

    /// Copy out the bytes covering `[requested_start, requested_start + duration)`.
    ///
    /// Blocks until the wall clock passes the end of the window, waking on
    /// each write and on a coarse timeout. `cancel` aborts the wait.
    pub fn read_segment(
        &self,
        requested_start: SystemTime,
        duration: Duration,
        cancel: &AtomicBool,
    ) -> Result<Vec<u8>, AudioError> {
        let secs = duration.as_secs() as usize;
        if secs == 0 {
            self.metrics.record_segment_read(false);
            return Err(AudioError::InvalidSegmentSpan {
                source_name: self.source.clone(),
            });
        }
        let requested_end = requested_start + duration;

        let mut state = self.state.lock();
        loop {
            if cancel.load(Ordering::Relaxed) {
                self.metrics.record_segment_read(false);
                return Err(AudioError::ReadCancelled {
                    source_name: self.source.clone(),
                });
            }

            let now = SystemTime::now();
            if now < requested_end {
                // Window not fully elapsed; wait for more writes or the clock.
                self.written.wait_for(&mut state, READ_WAIT_INTERVAL);
                continue;
            }

            let Some(start_time) = state.start_time else {
                self.metrics.record_segment_read(false);
                return Err(AudioError::SegmentOutsideWindow {
                    source_name: self.source.clone(),
                });
            };

            // Re-derived inside the loop: a wrap during the wait moves the
            // buffer start time forward.
            let start_offset = match requested_start.duration_since(start_time) {
                Ok(offset) => offset,
                Err(_) => {
                    self.metrics.record_segment_read(false);
                    return Err(AudioError::SegmentOutsideWindow {
                        source_name: self.source.clone(),
                    });
                }
            };

            let bytes_per_second = self.sample_rate * self.bytes_per_sample;
            let start_index = (start_offset.as_secs() as usize * bytes_per_second) % self.capacity;
            let segment_len = secs * bytes_per_second;
            let end_index = (start_index + segment_len) % self.capacity;

            let mut segment = Vec::with_capacity(segment_len);
            if start_index < end_index {
                segment.extend_from_slice(&state.data[start_index..end_index]);
            } else {
                // Wrapped window: splice the two half-ranges.
                segment.extend_from_slice(&state.data[start_index..]);
                segment.extend_from_slice(&state.data[..end_index]);
            }

            self.metrics.record_segment_read(true);
            return Ok(segment);
        }
    }
}
