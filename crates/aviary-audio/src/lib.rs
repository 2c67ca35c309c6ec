//! Capture layer: per-source circular PCM buffers with wall-clock indexed
//! segment extraction.
//!
//! The registry owns every buffer; writers push raw PCM as it arrives and
//! readers block until the wall clock has passed the window they asked for.

pub mod capture_buffer;
pub mod registry;

pub use capture_buffer::{CaptureBuffer, MAX_BUFFER_BYTES};
pub use registry::BufferRegistry;
