pub mod backoff;
pub mod error;

pub use backoff::{BackoffSchedule, FixedDelay, StepSchedule};
pub use error::{LineError, Result};
