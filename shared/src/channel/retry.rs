use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay before the first reconnection attempt under the default policy.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// How long to wait before reconnecting, and whether to keep trying.
///
/// `Fixed` retries forever on the same delay. `Exponential` doubles (by
/// `multiplier`) up to `max_ms`, optionally jittered into `[d/2, d]`, and can
/// give up after `max_attempts` consecutive failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    Fixed {
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
    Exponential {
        #[serde(default = "default_initial_ms")]
        initial_ms: u64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default)]
        jitter: bool,
        #[serde(default)]
        max_attempts: Option<u32>,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnection attempt number `attempt` (1-based, counted
    /// since the last successful open). `None` means stop retrying.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed { delay_ms } => Some(Duration::from_millis(*delay_ms)),
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
                jitter,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt > max) {
                    return None;
                }

                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let scaled = (*initial_ms as f64) * multiplier.powi(exponent);
                let capped = if scaled.is_finite() {
                    scaled.min(*max_ms as f64) as u64
                } else {
                    *max_ms
                };

                let delay = if *jitter && capped > 1 {
                    rand::thread_rng().gen_range(capped / 2..=capped)
                } else {
                    capped
                };

                Some(Duration::from_millis(delay))
            }
        }
    }
}

fn default_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_initial_ms() -> u64 {
    1_000
}

fn default_max_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}
