//! Buffer registry tests: allocation guard, idempotency, reference counts.

use aviary_audio::BufferRegistry;
use aviary_foundation::{AudioError, Categorized, ErrorKind};
use aviary_telemetry::PipelineMetrics;
use std::sync::Arc;

fn registry() -> BufferRegistry {
    BufferRegistry::new(Arc::new(PipelineMetrics::default()))
}

#[test]
fn allocate_if_needed_is_idempotent() {
    let reg = registry();
    for _ in 0..5 {
        reg.allocate_if_needed(60, 48_000, 2, "hw:0").unwrap();
    }
    assert!(reg.has("hw:0"));
    assert_eq!(reg.sources().len(), 1);
    // The single real allocation acquired exactly one reference.
    assert_eq!(reg.source_reference_count("hw:0"), 1);
}

#[test]
fn double_allocation_is_refused() {
    let reg = registry();
    reg.allocate(60, 48_000, 2, "rtsp://cam/stream").unwrap();
    let err = reg.allocate(60, 48_000, 2, "rtsp://cam/stream").unwrap_err();
    assert!(matches!(err, AudioError::BufferAlreadyExists { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn parameters_must_be_strictly_positive() {
    let reg = registry();
    assert!(matches!(
        reg.allocate(0, 48_000, 2, "hw:0").unwrap_err(),
        AudioError::InvalidDuration { .. }
    ));
    assert!(matches!(
        reg.allocate(60, 0, 2, "hw:0").unwrap_err(),
        AudioError::InvalidSampleRate { .. }
    ));
    assert!(matches!(
        reg.allocate(60, 48_000, 0, "hw:0").unwrap_err(),
        AudioError::InvalidBytesPerSample { .. }
    ));
    assert!(matches!(
        reg.allocate(60, 48_000, 2, "").unwrap_err(),
        AudioError::EmptySource
    ));
}

#[test]
fn oversized_allocation_is_refused() {
    let reg = registry();
    // 4 hours at 192kHz stereo-width samples exceeds the 1 GiB ceiling.
    let err = reg.allocate(4 * 3600, 192_000, 2, "hw:0").unwrap_err();
    assert!(matches!(err, AudioError::BufferTooLarge { .. }));
    assert_eq!(err.kind(), ErrorKind::System);
    assert!(!reg.has("hw:0"));
}

#[test]
fn remove_unknown_source_fails() {
    let reg = registry();
    let err = reg.remove("missing").unwrap_err();
    assert!(matches!(err, AudioError::BufferNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn remove_releases_the_source_reference() {
    let reg = registry();
    reg.allocate(60, 48_000, 2, "hw:1").unwrap();
    assert_eq!(reg.source_reference_count("hw:1"), 1);
    reg.remove("hw:1").unwrap();
    assert!(!reg.has("hw:1"));
    assert_eq!(reg.source_reference_count("hw:1"), 0);
}

#[test]
fn shared_source_survives_one_release() {
    let reg = registry();
    reg.allocate(60, 48_000, 2, "hw:2").unwrap();
    reg.acquire_source_reference("hw:2");
    assert_eq!(reg.source_reference_count("hw:2"), 2);
    reg.release_source_reference("hw:2");
    assert_eq!(reg.source_reference_count("hw:2"), 1);
}

#[test]
fn write_to_missing_buffer_fails() {
    let reg = registry();
    assert!(matches!(
        reg.write_to("nope", &[0u8; 4]).unwrap_err(),
        AudioError::BufferNotFound { .. }
    ));
}
