use std::time::Duration;
use thiserror::Error;

/// Category assigned to every pipeline error.
///
/// The job queue consults only this value when deciding whether a failed
/// action may be rescheduled. Anything not listed as retryable is abandoned
/// on first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: bad path, bad parameter, out-of-range value.
    Validation,
    /// Missing resource: file, source, consumer.
    NotFound,
    /// ACL or filesystem permission denied.
    Permission,
    /// Deadline exceeded or cancellation observed.
    Timeout,
    /// DNS, connect or transport failure.
    Network,
    /// HTTP 408/429/5xx and gateway timeouts.
    HttpTransient,
    /// Other 4xx responses.
    HttpPermanent,
    /// Non-zero exit from an external program.
    CommandExecution,
    /// Datastore read/write failed.
    Storage,
    /// Resource exhaustion or OS-level failure.
    System,
}

impl ErrorKind {
    /// Whether the job queue may reschedule a failure of this kind.
    ///
    /// Command execution is deliberately non-retryable: a script with a
    /// logic error will not succeed on retry and may duplicate side effects.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::HttpTransient | ErrorKind::Storage
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Permission => "permission",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::HttpTransient => "http-transient",
            ErrorKind::HttpPermanent => "http-permanent",
            ErrorKind::CommandExecution => "command-execution",
            ErrorKind::Storage => "storage",
            ErrorKind::System => "system",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every component error enum so the job queue and telemetry
/// can classify failures without knowing concrete types.
pub trait Categorized {
    fn kind(&self) -> ErrorKind;
}

/// Errors raised by the capture layer.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("invalid capture buffer duration: {seconds}s, must be greater than 0")]
    InvalidDuration { seconds: i64 },

    #[error("invalid sample rate: {hz} Hz, must be greater than 0")]
    InvalidSampleRate { hz: i64 },

    #[error("invalid bytes per sample: {n}, must be greater than 0")]
    InvalidBytesPerSample { n: i64 },

    #[error("empty source name provided for capture buffer allocation")]
    EmptySource,

    #[error("requested capture buffer size too large: {requested} bytes (max {max})")]
    BufferTooLarge { requested: usize, max: usize },

    #[error("capture buffer already exists for source: {source_name}")]
    BufferAlreadyExists { source_name: String },

    #[error("no capture buffer found for source: {source_name}")]
    BufferNotFound { source_name: String },

    #[error("requested segment start predates the buffer window for source: {source_name}")]
    SegmentOutsideWindow { source_name: String },

    #[error("requested segment span is not positive for source: {source_name}")]
    InvalidSegmentSpan { source_name: String },

    #[error("segment read cancelled for source: {source_name}")]
    ReadCancelled { source_name: String },
}

impl Categorized for AudioError {
    fn kind(&self) -> ErrorKind {
        match self {
            AudioError::InvalidDuration { .. }
            | AudioError::InvalidSampleRate { .. }
            | AudioError::InvalidBytesPerSample { .. }
            | AudioError::EmptySource
            | AudioError::BufferAlreadyExists { .. }
            | AudioError::SegmentOutsideWindow { .. }
            | AudioError::InvalidSegmentSpan { .. } => ErrorKind::Validation,
            AudioError::BufferNotFound { .. } => ErrorKind::NotFound,
            AudioError::BufferTooLarge { .. } => ErrorKind::System,
            AudioError::ReadCancelled { .. } => ErrorKind::Timeout,
        }
    }
}

/// Top-level application errors that end the process or force a state change.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("component {component} failed to stop within {timeout:?}")]
    ShutdownTimeout { component: String, timeout: Duration },

    #[error("fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl Categorized for AppError {
    fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) | AppError::InvalidTransition { .. } => ErrorKind::Validation,
            AppError::ShutdownTimeout { .. } => ErrorKind::Timeout,
            AppError::ShutdownRequested | AppError::Fatal(_) => ErrorKind::System,
        }
    }
}
