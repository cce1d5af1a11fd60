//! Per-account connection management
//!
//! The registry is the single source of truth for which connection
//! attempt owns an account's slot; the session module runs one
//! account's lifecycle task against it. Ownership is arbitrated purely
//! by connection-id comparison: an attempt that loses its slot backs
//! out without touching shared state.

pub mod registry;
pub mod session;

use std::time::Duration;

use linekeeper::StepSchedule;

pub use registry::{ConnectionRegistry, SessionHandles};

/// Timing knobs for one session's lifecycle
///
/// Defaults match production behavior; tests compress them to keep the
/// suite fast.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// Receive poll window; the outbound queue drains on each expiry
    pub poll: Duration,
    /// Silence bound after which we volunteer a keepalive ack
    pub keepalive_horizon: Duration,
    /// Total-silence bound after which the connection is torn down
    pub dead_air_horizon: Duration,
    /// Budget for validating the cached session token
    pub token_budget: Duration,
    /// Budget for a single proxy probe
    pub probe_budget: Duration,
    /// Budget for the transport greeting after connect
    pub greeting_budget: Duration,
    /// Delay ladder for proxy probing
    pub proxy_backoff: StepSchedule,
    /// Token refresh attempts before the session gives up
    pub refresh_attempts: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(200),
            keepalive_horizon: Duration::from_secs(30),
            dead_air_horizon: Duration::from_secs(120),
            token_budget: Duration::from_secs(3),
            probe_budget: Duration::from_secs(5),
            greeting_budget: Duration::from_secs(5),
            proxy_backoff: StepSchedule::proxy_default(),
            refresh_attempts: 2,
        }
    }
}
