//! Bounded retry with exponential backoff for network failures

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{AuthErrorKind, CredentialError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first
  pub attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 3,
      base_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(5),
    }
  }
}

impl RetryPolicy {
  pub fn new(attempts: u32, base_delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      base_delay,
      ..Self::default()
    }
  }

  /// Delay before retry number `retry` (1-based)
  pub fn delay_for(&self, retry: u32) -> Duration {
    let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Run `op` until it succeeds, fails with anything other than a network
  /// error, runs out of attempts, or would sleep past `deadline`
  pub fn run<T, F>(&self, deadline: Option<Instant>, mut op: F) -> Result<T, CredentialError>
  where
    F: FnMut(u32) -> Result<T, CredentialError>,
  {
    let mut attempt = 1;
    loop {
      match op(attempt) {
        Err(err) if err.is(AuthErrorKind::NetworkError) && attempt < self.attempts => {
          let delay = self.delay_for(attempt);
          if deadline.is_some_and(|d| Instant::now() + delay >= d) {
            return Err(err);
          }
          debug!(attempt, ?delay, "Network error, retrying");
          thread::sleep(delay);
          attempt += 1;
        }
        result => return result,
      }
    }
  }
}
