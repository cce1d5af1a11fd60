//! Graceful shutdown coordination

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;

/// Process-wide stop flag for the supervisor and its sessions
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Install a Ctrl+C handler that flips the flag
    pub fn listen_for_ctrl_c(&self) {
        let flag = Arc::clone(&self.flag);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, stopping");
                flag.store(false, Ordering::Release);
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Sleep in short slices so a stop request cuts the wait short
    pub async fn sleep_while_running(&self, duration: Duration) {
        let slice = Duration::from_millis(100);
        let mut elapsed = Duration::ZERO;
        while elapsed < duration && self.is_running() {
            let step = slice.min(duration - elapsed);
            tokio::time::sleep(step).await;
            elapsed += step;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
