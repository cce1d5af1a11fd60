use std::time::Duration;

/// Trait for retry delay ladders
///
/// Implementations decide how long to wait before attempt `n` of a
/// transport-level retry, or whether to give up entirely.
pub trait BackoffSchedule: Send + Sync {
    /// Delay to apply before the given attempt (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long, then try again
    /// * `None` - The ladder is exhausted; stop retrying
    fn delay(&self, attempt: usize) -> Option<Duration>;

    /// Total number of attempts this schedule allows, if bounded
    fn max_attempts(&self) -> Option<usize> {
        None
    }
}

/// A finite ladder of explicit delays
///
/// Each rung is the wait applied before that attempt; once the rungs run
/// out the schedule is exhausted. Used for the proxy probe ladder, where
/// the operator wants a fixed, predictable sequence rather than an
/// open-ended exponential curve.
#[derive(Debug, Clone)]
pub struct StepSchedule {
    steps: Vec<Duration>,
}

impl StepSchedule {
    pub fn new(steps: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Seconds-based convenience constructor
    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)))
    }

    /// The ladder used before opening a proxied game connection:
    /// immediate, then 15s, 30s, 60s, 120s.
    pub fn proxy_default() -> Self {
        Self::from_secs(&[0, 15, 30, 60, 120])
    }
}

impl BackoffSchedule for StepSchedule {
    fn delay(&self, attempt: usize) -> Option<Duration> {
        self.steps.get(attempt).copied()
    }

    fn max_attempts(&self) -> Option<usize> {
        Some(self.steps.len())
    }
}

/// Constant delay between attempts, optionally bounded
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl BackoffSchedule for FixedDelay {
    fn delay(&self, attempt: usize) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }

    fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_schedule_walks_the_ladder_then_exhausts() {
        let schedule = StepSchedule::from_secs(&[0, 15, 30, 60, 120]);

        let expected = [0u64, 15, 30, 60, 120];
        for (attempt, secs) in expected.iter().enumerate() {
            assert_eq!(schedule.delay(attempt), Some(Duration::from_secs(*secs)));
        }
        assert_eq!(schedule.delay(5), None);
        assert_eq!(schedule.max_attempts(), Some(5));
    }

    #[test]
    fn fixed_delay_respects_attempt_cap() {
        let schedule = FixedDelay::new(Duration::from_millis(250), Some(3));

        assert!(schedule.delay(0).is_some());
        assert!(schedule.delay(2).is_some());
        assert!(schedule.delay(3).is_none());
    }

    #[test]
    fn unbounded_fixed_delay_never_exhausts() {
        let schedule = FixedDelay::new(Duration::from_secs(1), None);
        assert_eq!(schedule.delay(1_000), Some(Duration::from_secs(1)));
        assert_eq!(schedule.max_attempts(), None);
    }
}
