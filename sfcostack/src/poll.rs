// SFC-Ostack: Service Function Chains on OpenStack
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Polling and Retrying
//!
//! The cloud offers no notifications, so every wait is a busy loop with a large sleep in between.

use log::*;
use std::fmt::Display;
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
const DEFAULT_POLL_TIMEOUT_S: u64 = 600;

/// Interval and timeout of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Time to sleep between two probes
    pub interval: Duration,
    /// Give up after this time
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_S),
        }
    }
}

impl PollSettings {
    /// Create new poll settings
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Call `probe` until it returns `Ok(Some(_))`, sleeping `interval` between two calls. Returns
/// `Ok(None)` if the timeout elapsed, or the first error returned by the probe. The probe is
/// called at least once.
pub fn poll_until<T, E, F>(settings: PollSettings, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let start = Instant::now();
    loop {
        if let Some(result) = probe()? {
            return Ok(Some(result));
        }
        if start.elapsed() + settings.interval > settings.timeout {
            return Ok(None);
        }
        sleep(settings.interval);
    }
}

/// # Connection Error
///
/// All attempts to reach a remote target failed.
#[derive(Debug, Error)]
#[error("Cannot connect to {target} after {attempts} attempts: {last_error}")]
pub struct ConnectionError {
    /// Description of the target
    pub target: String,
    /// Number of attempts made
    pub attempts: usize,
    /// Error of the last attempt
    pub last_error: String,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one attempt is made)
    pub max_attempts: usize,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound of the delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the attempt with the given index (starting at 0)
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31) as u32).unwrap_or(u32::MAX);
        self.initial_delay.checked_mul(factor).unwrap_or(self.max_delay).min(self.max_delay)
    }
}

/// Call `op` until it succeeds, at most `policy.max_attempts` times. The operation receives the
/// index of the current attempt.
pub fn retry_with_backoff<T, E, F>(
    policy: &RetryPolicy,
    target: impl AsRef<str>,
    mut op: F,
) -> Result<T, ConnectionError>
where
    E: Display,
    F: FnMut(usize) -> Result<T, E>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 0..attempts {
        match op(attempt) {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = e.to_string();
                if attempt + 1 < attempts {
                    let delay = policy.delay(attempt);
                    debug!(
                        "[{}] attempt {} failed: {}. Retry in {:?}",
                        target.as_ref(),
                        attempt + 1,
                        last_error,
                        delay
                    );
                    sleep(delay);
                }
            }
        }
    }
    error!("[{}] giving up after {} attempts", target.as_ref(), attempts);
    Err(ConnectionError { target: target.as_ref().to_string(), attempts, last_error })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn poll_returns_value() {
        let settings = PollSettings::new(Duration::from_millis(1), Duration::from_secs(1));
        let mut calls = 0;
        let result: Result<Option<usize>, ()> = poll_until(settings, || {
            calls += 1;
            Ok(if calls == 3 { Some(calls) } else { None })
        });
        assert_eq!(result, Ok(Some(3)));
    }

    #[test]
    fn poll_timeout() {
        let settings = PollSettings::new(Duration::from_millis(5), Duration::from_millis(20));
        let mut calls = 0;
        let result: Result<Option<()>, ()> = poll_until(settings, || {
            calls += 1;
            Ok(None)
        });
        assert_eq!(result, Ok(None));
        assert!(calls >= 1);
        assert!(calls <= 6);
    }

    #[test]
    fn poll_error() {
        let settings = PollSettings::new(Duration::from_millis(1), Duration::from_secs(1));
        let result: Result<Option<()>, &str> = poll_until(settings, || Err("broken"));
        assert_eq!(result, Err("broken"));
    }

    #[test]
    fn backoff_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
        assert_eq!(policy.delay(100), Duration::from_secs(5));
    }

    #[test]
    fn retry_succeeds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result = retry_with_backoff(&policy, "test", |attempt| {
            if attempt < 2 {
                Err("refused")
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn retry_is_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let mut calls = 0;
        let err = retry_with_backoff(&policy, "10.0.0.1:22", |_| -> Result<(), &str> {
            calls += 1;
            Err("refused")
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.target, "10.0.0.1:22");
        assert_eq!(err.last_error, "refused");
    }
}
