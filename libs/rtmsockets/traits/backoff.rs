use std::time::Duration;

/// Trait for defining retry delays
///
/// Implement this trait to control how long a retry loop waits
/// between attempts. The session manager keeps three independent
/// policies: handshake, socket writes and socket reads.
pub trait RetryPolicy: Send + Sync {
    /// Get the delay before the next attempt
    ///
    /// # Arguments
    /// * `attempt` - The retry attempt number (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before retrying
    /// * `None` - Stop retrying
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Check if we should keep retrying
    ///
    /// # Arguments
    /// * `attempt` - The current retry attempt number
    fn should_retry(&self, attempt: usize) -> bool;
}

/// Exponential backoff strategy
///
/// Delays grow exponentially: initial_delay * 2^attempt.
/// By default the delay is capped at max_delay. An escalating backoff
/// instead gives up as soon as the next delay would exceed max_delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
    escalate_past_max: bool,
}

impl ExponentialBackoff {
    /// Create a new capped exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - The delay before the first retry
    /// * `max_delay` - The maximum delay between retries
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            escalate_past_max: false,
        }
    }

    /// Create a backoff that stops once the next delay would exceed `ceiling`
    ///
    /// With 1s and 30s this yields 1s, 2s, 4s, 8s, 16s and then `None`.
    /// A zero initial delay is raised to one nanosecond so the sequence
    /// still reaches the ceiling.
    pub fn escalating(initial_delay: Duration, ceiling: Duration) -> Self {
        Self {
            initial_delay: initial_delay.max(Duration::from_nanos(1)),
            max_delay: ceiling,
            max_attempts: None,
            escalate_past_max: true,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Uncapped delay for an attempt, saturating instead of overflowing
    fn raw_delay(&self, attempt: usize) -> Duration {
        u32::try_from(attempt)
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }

        let delay = self.raw_delay(attempt);
        if delay > self.max_delay {
            if self.escalate_past_max {
                return None;
            }
            return Some(self.max_delay);
        }
        Some(delay)
    }

    fn should_retry(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Fixed delay strategy
///
/// Always waits the same amount of time between attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    ///
    /// # Arguments
    /// * `delay` - The fixed delay between attempts
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self { delay, max_attempts }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn should_retry(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Never retry strategy
#[derive(Debug, Clone)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn should_retry(&self, _attempt: usize) -> bool {
        false
    }
}
