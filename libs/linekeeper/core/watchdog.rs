//! Liveness tracking for a streaming connection
//!
//! Two horizons are watched independently:
//!
//! - the **keepalive horizon**: if the server has not pinged within this
//!   window, the client should volunteer an acknowledgement so the server
//!   side does not time the session out;
//! - the **dead-air horizon**: if *nothing* has arrived within this much
//!   longer window, the connection is presumed wedged and must be torn
//!   down for a full reconnect.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct PingWatchdog {
    keepalive_horizon: Duration,
    dead_air_horizon: Duration,
    last_message: Instant,
    last_keepalive: Instant,
}

impl PingWatchdog {
    /// Start both clocks at "now"
    pub fn new(keepalive_horizon: Duration, dead_air_horizon: Duration) -> Self {
        let now = Instant::now();
        Self {
            keepalive_horizon,
            dead_air_horizon,
            last_message: now,
            last_keepalive: now,
        }
    }

    /// Record inbound traffic of any kind
    pub fn note_message(&mut self) {
        self.last_message = Instant::now();
    }

    /// Record a server keepalive (or our own volunteered ack)
    pub fn note_keepalive(&mut self) {
        self.last_keepalive = Instant::now();
    }

    /// True when a proactive keepalive ack should be sent
    pub fn ack_due(&self) -> bool {
        self.last_keepalive.elapsed() > self.keepalive_horizon
    }

    /// True when the connection has gone silent past the teardown bound
    pub fn dead_air(&self) -> bool {
        self.last_message.elapsed() > self.dead_air_horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_watchdog_is_quiet() {
        let dog = PingWatchdog::new(Duration::from_secs(30), Duration::from_secs(120));
        assert!(!dog.ack_due());
        assert!(!dog.dead_air());
    }

    #[test]
    fn ack_comes_due_before_dead_air() {
        let mut dog = PingWatchdog::new(Duration::from_millis(5), Duration::from_millis(200));
        sleep(Duration::from_millis(20));
        assert!(dog.ack_due());
        assert!(!dog.dead_air());

        dog.note_keepalive();
        assert!(!dog.ack_due());
    }

    #[test]
    fn dead_air_trips_without_traffic() {
        let mut dog = PingWatchdog::new(Duration::from_millis(5), Duration::from_millis(10));
        sleep(Duration::from_millis(30));
        assert!(dog.dead_air());

        dog.note_message();
        assert!(!dog.dead_air());
    }
}
