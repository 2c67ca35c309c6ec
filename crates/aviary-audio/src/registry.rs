use crate::capture_buffer::{aligned_capacity, CaptureBuffer, MAX_BUFFER_BYTES};
use aviary_foundation::AudioError;
use aviary_telemetry::PipelineMetrics;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Owns every capture buffer and the per-source reference counts.
///
/// Multiple subsystems may share a source; allocation and release go through
/// the reference counts so `allocate_if_needed` stays idempotent and a buffer
/// is only torn down when its last user releases it.
pub struct BufferRegistry {
    buffers: RwLock<HashMap<String, Arc<CaptureBuffer>>>,
    source_refs: Mutex<HashMap<String, usize>>,
    metrics: Arc<PipelineMetrics>,
}

impl BufferRegistry {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            source_refs: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn validate(
        duration_seconds: i64,
        sample_rate: i64,
        bytes_per_sample: i64,
        source: &str,
    ) -> Result<(), AudioError> {
        if duration_seconds <= 0 {
            return Err(AudioError::InvalidDuration {
                seconds: duration_seconds,
            });
        }
        if sample_rate <= 0 {
            return Err(AudioError::InvalidSampleRate { hz: sample_rate });
        }
        if bytes_per_sample <= 0 {
            return Err(AudioError::InvalidBytesPerSample {
                n: bytes_per_sample,
            });
        }
        if source.is_empty() {
            return Err(AudioError::EmptySource);
        }
        let requested = aligned_capacity(
            duration_seconds as usize,
            sample_rate as usize,
            bytes_per_sample as usize,
        );
        if requested > MAX_BUFFER_BYTES {
            return Err(AudioError::BufferTooLarge {
                requested,
                max: MAX_BUFFER_BYTES,
            });
        }
        Ok(())
    }

    /// Allocate a buffer for `source`, failing if one already exists.
    pub fn allocate(
        &self,
        duration_seconds: i64,
        sample_rate: i64,
        bytes_per_sample: i64,
        source: &str,
    ) -> Result<(), AudioError> {
        Self::validate(duration_seconds, sample_rate, bytes_per_sample, source)?;

        let mut buffers = self.buffers.write();
        if buffers.contains_key(source) {
            warn!(source, "buffer allocation blocked: buffer already exists");
            return Err(AudioError::BufferAlreadyExists {
                source_name: source.to_string(),
            });
        }

        let buffer = Arc::new(CaptureBuffer::new(
            duration_seconds as usize,
            sample_rate as usize,
            bytes_per_sample as usize,
            source,
            self.metrics.clone(),
        ));
        info!(source, capacity = buffer.capacity(), "capture buffer allocated");
        buffers.insert(source.to_string(), buffer);
        drop(buffers);

        self.acquire_source_reference(source);
        Ok(())
    }

    /// Allocate a buffer for `source` only if none exists yet. Repeated calls
    /// are no-ops.
    pub fn allocate_if_needed(
        &self,
        duration_seconds: i64,
        sample_rate: i64,
        bytes_per_sample: i64,
        source: &str,
    ) -> Result<(), AudioError> {
        {
            let buffers = self.buffers.read();
            if buffers.contains_key(source) {
                return Ok(());
            }
        }
        match self.allocate(duration_seconds, sample_rate, bytes_per_sample, source) {
            // Lost the race to another allocator; the buffer exists, which is
            // what the caller asked for.
            Err(AudioError::BufferAlreadyExists { .. }) => Ok(()),
            other => other,
        }
    }

    /// Allocate buffers for every source, collecting all failures.
    pub fn init_all(
        &self,
        duration_seconds: i64,
        sample_rate: i64,
        bytes_per_sample: i64,
        sources: &[String],
    ) -> Result<(), AudioError> {
        if sources.is_empty() {
            return Err(AudioError::EmptySource);
        }
        for source in sources {
            self.allocate_if_needed(duration_seconds, sample_rate, bytes_per_sample, source)?;
        }
        Ok(())
    }

    /// Remove the buffer for `source` and release its reference.
    pub fn remove(&self, source: &str) -> Result<(), AudioError> {
        let removed = self.buffers.write().remove(source);
        if removed.is_none() {
            return Err(AudioError::BufferNotFound {
                source_name: source.to_string(),
            });
        }
        self.release_source_reference(source);
        Ok(())
    }

    pub fn has(&self, source: &str) -> bool {
        self.buffers.read().contains_key(source)
    }

    pub fn get(&self, source: &str) -> Option<Arc<CaptureBuffer>> {
        self.buffers.read().get(source).cloned()
    }

    pub fn write_to(&self, source: &str, data: &[u8]) -> Result<(), AudioError> {
        let buffer = self.get(source).ok_or_else(|| AudioError::BufferNotFound {
            source_name: source.to_string(),
        })?;
        buffer.write(data);
        Ok(())
    }

    pub fn read_segment_from(
        &self,
        source: &str,
        requested_start: SystemTime,
        duration: Duration,
        cancel: &AtomicBool,
    ) -> Result<Vec<u8>, AudioError> {
        let buffer = self.get(source).ok_or_else(|| AudioError::BufferNotFound {
            source_name: source.to_string(),
        })?;
        buffer.read_segment(requested_start, duration, cancel)
    }

    pub fn acquire_source_reference(&self, source: &str) {
        let mut refs = self.source_refs.lock();
        *refs.entry(source.to_string()).or_insert(0) += 1;
    }

    pub fn release_source_reference(&self, source: &str) {
        let mut refs = self.source_refs.lock();
        match refs.get_mut(source) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                refs.remove(source);
            }
            None => {}
        }
    }

    pub fn source_reference_count(&self, source: &str) -> usize {
        self.source_refs.lock().get(source).copied().unwrap_or(0)
    }

    pub fn sources(&self) -> Vec<String> {
        self.buffers.read().keys().cloned().collect()
    }
}
