//! Foundation layer for the aviary pipeline.
//!
//! Holds the pieces every other crate leans on: the error taxonomy with
//! explicit retryability, the clock abstraction for deterministic tests,
//! the pipeline state machine, and process shutdown handling.

pub mod clock;
pub mod error;
pub mod shutdown;
pub mod state;

pub use clock::{real_clock, test_clock, Clock, RealClock, SharedClock, TestClock};
pub use error::{AppError, AudioError, Categorized, ErrorKind};
pub use shutdown::{ShutdownGuard, ShutdownHandler};
pub use state::{PipelineState, StateManager};
