use std::time::Duration;

use rand::Rng;

use epochsweep_api::prelude::*;

/// Bounded attempts with capped exponential backoff between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_BOUND,
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_ms: u64, cap_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_ms,
            cap_ms,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0)
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay before attempt number `attempt + 1`, where `attempt` counts the
    /// attempts already made (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = bounded_exponential_backoff_ms(self.base_ms, attempt.saturating_sub(1), self.cap_ms);
        Duration::from_millis(jitter(ms))
    }
}

pub fn bounded_exponential_backoff_ms(base_ms: u64, streak: u32, cap_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let clamped = streak.min(8);
    base_ms
        .saturating_mul(1u64 << clamped)
        .min(cap_ms.max(base_ms))
}

// up to +10%
fn jitter(ms: u64) -> u64 {
    if ms == 0 {
        return 0;
    }
    ms + rand::thread_rng().gen_range(0..=ms / 10)
}
