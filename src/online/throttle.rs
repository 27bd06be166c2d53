//! Adaptive batching for the online indexer (spec §4.11): grows the batch
//! size after a cheap commit, shrinks it after a conflict/timeout, so a
//! background build backs off under write contention instead of starving
//! the foreground workload. Grounded on `core::transaction::TransactionRunner`'s
//! own exponential-backoff loop, generalized from delay to batch size.

use std::time::{Duration, Instant};

use crate::core::config::Config;

#[derive(Debug, Clone, Copy)]
pub struct ThrottleDecision {
    pub batch_size: usize,
    pub delay_before_next: Duration,
}

/// Tracks the current batch size for one online build/scrub run and adjusts
/// it after every attempt.
pub struct AdaptiveThrottle {
    min_batch_size: usize,
    max_batch_size: usize,
    batch_size: usize,
    consecutive_successes: u32,
    last_attempt: Option<Instant>,
}

impl AdaptiveThrottle {
    pub fn new(config: &Config) -> Self {
        AdaptiveThrottle {
            min_batch_size: config.online_min_batch_size,
            max_batch_size: config.online_max_batch_size,
            batch_size: config.online_initial_batch_size,
            consecutive_successes: 0,
            last_attempt: None,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Call after a batch commits successfully within `elapsed`. Doubles the
    /// batch size after three consecutive fast commits, capped at the
    /// configured maximum.
    pub fn on_success(&mut self, elapsed: Duration) -> ThrottleDecision {
        self.last_attempt = Some(Instant::now());
        if elapsed < Duration::from_millis(200) {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= 3 {
                self.batch_size = (self.batch_size * 2).min(self.max_batch_size);
                self.consecutive_successes = 0;
            }
        } else {
            self.consecutive_successes = 0;
        }
        ThrottleDecision { batch_size: self.batch_size, delay_before_next: Duration::ZERO }
    }

    /// Call after a batch hits a conflict or exceeds the transaction size
    /// limit. Halves the batch size, never below the configured minimum, and
    /// asks for a short cooldown before retrying.
    pub fn on_contention(&mut self) -> ThrottleDecision {
        self.consecutive_successes = 0;
        self.batch_size = (self.batch_size / 2).max(self.min_batch_size);
        ThrottleDecision { batch_size: self.batch_size, delay_before_next: Duration::from_millis(50) }
    }
}
